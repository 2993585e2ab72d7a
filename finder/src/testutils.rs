use crate::context::RequestContext;
use async_trait::async_trait;
use rating::{EventParticipation, PlayerId, PlayerProfile, RatingProvider, UpstreamError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn ctx(timeout: Duration) -> RequestContext {
    RequestContext::new(&CancellationToken::new(), timeout)
}

/// In-memory rating provider. Unknown rosters and event lists fail, unknown
/// profiles come back as an empty record set.
#[derive(Default)]
pub struct FakeProvider {
    events: HashMap<PlayerId, Vec<EventParticipation>>,
    rosters: HashMap<EventParticipation, Vec<PlayerId>>,
    profiles: HashMap<PlayerId, PlayerProfile>,
    latency: Duration,
    event_calls: AtomicUsize,
    roster_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a FakeProvider);

impl<'a> InFlight<'a> {
    fn enter(provider: &'a FakeProvider) -> Self {
        let now = provider.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        provider.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(provider)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, player: &str, events: Vec<EventParticipation>) -> Self {
        self.events.insert(player.to_string(), events);
        self
    }

    pub fn with_roster(mut self, event: EventParticipation, players: &[&str]) -> Self {
        self.rosters
            .insert(event, players.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_profile(mut self, profile: PlayerProfile) -> Self {
        self.profiles.insert(profile.id.clone(), profile);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn roster_calls(&self) -> usize {
        self.roster_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl RatingProvider for FakeProvider {
    async fn list_events(
        &self,
        player: &PlayerId,
    ) -> Result<Vec<EventParticipation>, UpstreamError> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.events
            .get(player)
            .cloned()
            .ok_or_else(|| UpstreamError::RetriesExceeded {
                path: format!("api/players/{player}/tournaments.json"),
            })
    }

    async fn list_roster(
        &self,
        event: &EventParticipation,
    ) -> Result<Vec<PlayerId>, UpstreamError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(self);
        self.wait().await;
        self.rosters
            .get(event)
            .cloned()
            .ok_or_else(|| UpstreamError::RetriesExceeded {
                path: format!(
                    "api/tournaments/{}/recaps/{}.json",
                    event.event_id, event.team_id
                ),
            })
    }

    async fn fetch_profile(&self, player: &PlayerId) -> Result<PlayerProfile, UpstreamError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(self);
        self.wait().await;
        self.profiles
            .get(player)
            .cloned()
            .ok_or_else(|| UpstreamError::EmptyProfile(player.clone()))
    }
}
