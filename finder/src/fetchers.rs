//! Pool fetchers backed by the rating provider.

use crate::pool::Fetcher;
use async_trait::async_trait;
use rating::{EventParticipation, PlayerId, PlayerProfile, RatingProvider, UpstreamError};
use std::sync::Arc;

pub struct RosterFetcher {
    provider: Arc<dyn RatingProvider>,
}

impl RosterFetcher {
    pub fn new(provider: Arc<dyn RatingProvider>) -> Self {
        RosterFetcher { provider }
    }
}

#[async_trait]
impl Fetcher for RosterFetcher {
    type Item = EventParticipation;
    type Output = Vec<PlayerId>;
    type Error = UpstreamError;

    async fn fetch(&self, event: &EventParticipation) -> Result<Vec<PlayerId>, UpstreamError> {
        self.provider.list_roster(event).await
    }
}

pub struct ProfileFetcher {
    provider: Arc<dyn RatingProvider>,
}

impl ProfileFetcher {
    pub fn new(provider: Arc<dyn RatingProvider>) -> Self {
        ProfileFetcher { provider }
    }
}

#[async_trait]
impl Fetcher for ProfileFetcher {
    type Item = PlayerId;
    type Output = PlayerProfile;
    type Error = UpstreamError;

    async fn fetch(&self, player: &PlayerId) -> Result<PlayerProfile, UpstreamError> {
        self.provider.fetch_profile(player).await
    }
}
