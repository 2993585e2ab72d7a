use crate::types::{EventParticipation, PlayerId, PlayerProfile};
use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {path}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
    },
    #[error("{path} still failing after retries")]
    RetriesExceeded { path: String },
    #[error("no profile records returned for player {0}")]
    EmptyProfile(PlayerId),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The upstream operations the comrade pipeline depends on.
#[async_trait]
pub trait RatingProvider: Send + Sync {
    /// All team/event participations of a player, across every season.
    async fn list_events(
        &self,
        player: &PlayerId,
    ) -> Result<Vec<EventParticipation>, UpstreamError>;

    /// Player ids on one team's roster for one event.
    async fn list_roster(&self, event: &EventParticipation)
    -> Result<Vec<PlayerId>, UpstreamError>;

    async fn fetch_profile(&self, player: &PlayerId) -> Result<PlayerProfile, UpstreamError>;
}
