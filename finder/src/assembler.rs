use crate::ordering::{COMRADE_ORDER, order};
use rating::{ComradeCount, PlayerId, PlayerProfile};
use std::collections::HashSet;

/// Final comrade list: one profile per counted id (never the subject), with
/// `shared_count` from `counts`, in comrade order.
pub fn assemble(
    subject: &PlayerId,
    counts: &ComradeCount,
    profiles: Vec<PlayerProfile>,
) -> Vec<PlayerProfile> {
    let mut seen = HashSet::with_capacity(profiles.len());
    let mut assembled: Vec<PlayerProfile> = profiles
        .into_iter()
        .filter(|profile| &profile.id != subject)
        .filter_map(|profile| {
            let count = *counts.get(&profile.id)?;
            seen.insert(profile.id.clone())
                .then(|| profile.with_shared_count(count))
        })
        .collect();

    order(&mut assembled, &COMRADE_ORDER);
    assembled
}
