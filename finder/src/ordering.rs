//! Multi-key ordering of comrade profiles.
//!
//! Keys are compared in chain order, the first unequal key deciding. The whole
//! chain is then reversed, which puts the highest `shared_count` first and
//! also orders ties on the text keys in reverse lexicographic order.

use rating::PlayerProfile;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    SharedCount,
    Name,
    Surname,
    Patronymic,
}

impl SortKey {
    pub fn compare(self, a: &PlayerProfile, b: &PlayerProfile) -> Ordering {
        match self {
            SortKey::SharedCount => a.shared_count.cmp(&b.shared_count),
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Surname => a.surname.cmp(&b.surname),
            SortKey::Patronymic => a.patronymic.cmp(&b.patronymic),
        }
    }
}

/// The chain used for the comrade list.
pub const COMRADE_ORDER: [SortKey; 4] = [
    SortKey::SharedCount,
    SortKey::Name,
    SortKey::Surname,
    SortKey::Patronymic,
];

/// Lexicographic comparison over `chain`, before reversal.
pub fn compare_chain(chain: &[SortKey], a: &PlayerProfile, b: &PlayerProfile) -> Ordering {
    chain
        .iter()
        .map(|key| key.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

// TODO: confirm with the product owner whether only `shared_count` should be
// descending; the text tie-breaks currently come out Z to A.
pub fn order(profiles: &mut [PlayerProfile], chain: &[SortKey]) {
    profiles.sort_by(|a, b| compare_chain(chain, a, b).reverse());
}
