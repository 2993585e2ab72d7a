use crate::context::RequestContext;
use crate::service::{ComradeService, ComradesError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Shared by every request handled by the router.
#[derive(Clone)]
pub struct ApiState {
    service: Arc<ComradeService>,
    // Parent of every request context; cancelling it aborts in-flight requests.
    requests: CancellationToken,
    request_timeout: Duration,
}

impl ApiState {
    pub fn new(
        service: Arc<ComradeService>,
        requests: CancellationToken,
        request_timeout: Duration,
    ) -> Self {
        ApiState {
            service,
            requests,
            request_timeout,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/comrades/{id}", get(handler))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves, then waits for
/// in-flight requests to complete.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(addr = ?listener.local_addr().ok(), "serving comrades API");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

fn is_player_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

async fn handler(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !is_player_id(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let ctx = RequestContext::new(&state.requests, state.request_timeout);
    match state.service.compute_comrades(&ctx, &id).await {
        Ok(comrades) => Json(comrades).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for ComradesError {
    fn into_response(self) -> Response {
        let status = match self {
            ComradesError::EventListing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ComradesError::Cancelled { .. } | ComradesError::Stopped(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ComradesError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        };

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_cache::MokaProfileStore;
    use crate::service::ServiceSettings;
    use crate::testutils::FakeProvider;
    use axum::body::Body;
    use axum::http::Request;
    use rating::{EventParticipation, PlayerProfile};
    use tower::ServiceExt;

    fn state(provider: FakeProvider, request_timeout: Duration) -> ApiState {
        let service = ComradeService::new(
            Arc::new(provider),
            Arc::new(MokaProfileStore::new(100)),
            ServiceSettings {
                roster_workers: 2,
                profile_workers: 2,
                cache_ttl: Duration::from_secs(60),
            },
        );
        ApiState::new(Arc::new(service), CancellationToken::new(), request_timeout)
    }

    fn provider() -> FakeProvider {
        FakeProvider::new()
            .with_events(
                "123",
                vec![
                    EventParticipation::new("T1", "Team1"),
                    EventParticipation::new("T2", "Team2"),
                ],
            )
            .with_roster(EventParticipation::new("T1", "Team1"), &["123", "456", "789"])
            .with_roster(EventParticipation::new("T2", "Team2"), &["123", "456"])
            .with_profile(PlayerProfile::new("456", "Ivan", "Petrov", "Ivanovich"))
            .with_profile(PlayerProfile::new("789", "Pyotr", "Ivanov", "Sergeevich"))
    }

    async fn request(state: ApiState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_comrades_json() {
        let (status, json) = request(state(provider(), Duration::from_secs(5)), "/comrades/123").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!([
                {"idplayer": "456", "name": "Ivan", "surname": "Petrov", "patronymic": "Ivanovich", "games": 2},
                {"idplayer": "789", "name": "Pyotr", "surname": "Ivanov", "patronymic": "Sergeevich", "games": 1},
            ])
        );
    }

    #[tokio::test]
    async fn test_non_numeric_id_not_found() {
        let (status, _) = request(state(provider(), Duration::from_secs(5)), "/comrades/abc").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_event_listing_failure() {
        let (status, json) = request(state(provider(), Duration::from_secs(5)), "/comrades/999").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            json["error_message"]
                .as_str()
                .unwrap()
                .contains("could not list events for player 999")
        );
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let provider = provider().with_latency(Duration::from_secs(60));
        let (status, json) = request(state(provider, Duration::from_millis(50)), "/comrades/123").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["error_message"], "request deadline exceeded");
    }

    #[tokio::test]
    async fn test_stopped_service_unavailable() {
        let state = state(provider(), Duration::from_secs(5));
        state.service.shutdown();

        let (status, json) = request(state, "/comrades/123").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json["error_message"],
            "comrades service is shutting down: worker pool roster is shut down"
        );
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            state(provider(), Duration::from_secs(5)),
            shutdown.clone().cancelled_owned(),
        ));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server must stop after shutdown")
            .unwrap()
            .unwrap();
    }
}
