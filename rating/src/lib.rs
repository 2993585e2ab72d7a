//! Access to the upstream rating service: the player, roster and event data
//! the comrade pipeline is computed from.

pub mod client;
pub mod config;
pub mod provider;
pub mod types;

pub use client::RatingClient;
pub use provider::{RatingProvider, UpstreamError};
pub use types::{ComradeCount, EventParticipation, PlayerId, PlayerProfile};
