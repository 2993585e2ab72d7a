const BASE_DELAY: u64 = 500;
const MAX_DELAY: u64 = 30_000;

use crate::config::UpstreamConfig;
use crate::provider::{RatingProvider, UpstreamError};
use crate::types::{EventParticipation, PlayerId, PlayerProfile, null_as_default};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tokio::time::{Duration, sleep};
use url::Url;

#[derive(Deserialize)]
struct Season {
    #[serde(default, deserialize_with = "null_as_default")]
    tournaments: Vec<EventParticipation>,
}

#[derive(Deserialize)]
struct RosterEntry {
    idplayer: Option<PlayerId>,
}

/// HTTP implementation of [`RatingProvider`] against the public rating API.
#[derive(Clone)]
pub struct RatingClient {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl RatingClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(RatingClient {
            client,
            base_url: config.base_url.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let url = self.base_url.join(path)?;
        let mut retries = 0;

        loop {
            let response = match self.client.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(method = "GET", path, error = %e, "upstream request failed");
                    return Err(e.into());
                }
            };

            let status = response.status();
            tracing::debug!(method = "GET", path, status = status.as_u16(), "upstream request");

            if status == StatusCode::OK {
                return Ok(response.json::<T>().await?);
            }

            if !RETRIABLE_STATUS_CODES.contains(&status) {
                return Err(UpstreamError::Status {
                    status,
                    path: path.to_string(),
                });
            }

            if retries >= self.max_retries {
                return Err(UpstreamError::RetriesExceeded {
                    path: path.to_string(),
                });
            }

            sleep(backoff(retries)).await;
            retries += 1;
        }
    }
}

/// Wait before retry number `retries + 1`.
fn backoff(retries: u32) -> Duration {
    let millis = BASE_DELAY.saturating_mul(2_u64.saturating_pow(retries));
    Duration::from_millis(millis.min(MAX_DELAY))
}

#[async_trait]
impl RatingProvider for RatingClient {
    async fn list_events(
        &self,
        player: &PlayerId,
    ) -> Result<Vec<EventParticipation>, UpstreamError> {
        let seasons: HashMap<String, Season> = self
            .get_json(&format!("api/players/{player}/tournaments.json"))
            .await?;

        Ok(seasons
            .into_values()
            .flat_map(|season| season.tournaments)
            .collect())
    }

    async fn list_roster(
        &self,
        event: &EventParticipation,
    ) -> Result<Vec<PlayerId>, UpstreamError> {
        let entries: Vec<RosterEntry> = self
            .get_json(&format!(
                "api/tournaments/{}/recaps/{}.json",
                event.event_id, event.team_id
            ))
            .await?;

        Ok(entries.into_iter().filter_map(|e| e.idplayer).collect())
    }

    async fn fetch_profile(&self, player: &PlayerId) -> Result<PlayerProfile, UpstreamError> {
        let records: Vec<PlayerProfile> = self
            .get_json(&format!("api/players/{player}.json"))
            .await?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::EmptyProfile(player.clone()))
    }
}
