//! Finds the comrades of a player: everyone who played on the same team in
//! at least one event, ranked by how many events they shared.

pub mod aggregator;
pub mod api;
pub mod assembler;
pub mod config;
pub mod context;
pub mod fetchers;
pub mod metrics_defs;
pub mod ordering;
pub mod pool;
pub mod profile_cache;
pub mod resolver;
pub mod service;

#[cfg(test)]
mod testutils;

use crate::api::{ApiError, ApiState};
use crate::config::{Config, ValidationError};
use crate::context::RequestContext;
use crate::service::{ComradeService, ComradesError};
use rating::{PlayerProfile, RatingClient, UpstreamError};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
    #[error("upstream client error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Comrades(#[from] ComradesError),
}

fn build_service(config: &Config) -> Result<Arc<ComradeService>, FinderError> {
    config.validate()?;
    let provider = Arc::new(RatingClient::new(&config.upstream)?);
    Ok(Arc::new(ComradeService::from_config(provider, config)))
}

/// Serves the comrades API until `shutdown` resolves.
///
/// On shutdown the listener stops accepting, readiness turns false, and
/// in-flight requests get `shutdown_timeout_secs` to finish before they are
/// cancelled.
pub async fn run<F>(config: Config, shutdown: F) -> Result<(), FinderError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let service = build_service(&config)?;

    let requests = CancellationToken::new();
    let stopping = CancellationToken::new();
    let ready = Arc::new(AtomicBool::new(true));

    if let Some(admin_listener) = config.admin_listener.clone() {
        let ready = ready.clone();
        let stopping = stopping.clone();
        let admin_service =
            AdminService::<_, FinderError>::new(move || ready.load(Ordering::Relaxed));
        tokio::spawn(async move {
            let result = run_http_service(
                &admin_listener.host,
                admin_listener.port,
                admin_service,
                stopping.cancelled_owned(),
            )
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "admin listener failed");
            }
        });
    }

    let listener =
        TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
    let state = ApiState::new(
        service.clone(),
        requests.clone(),
        Duration::from_secs(config.request_timeout_secs),
    );

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let stop_accepting = {
        let requests = requests.clone();
        let stopping = stopping.clone();
        let ready = ready.clone();
        async move {
            shutdown.await;
            tracing::info!(?shutdown_timeout, "shutting down");
            ready.store(false, Ordering::Relaxed);
            stopping.cancel();
            tokio::spawn(async move {
                tokio::time::sleep(shutdown_timeout).await;
                requests.cancel();
            });
        }
    };

    api::serve(listener, state, stop_accepting).await?;

    requests.cancel();
    stopping.cancel();
    service.shutdown();
    tracing::info!("comrades service stopped");
    Ok(())
}

/// Computes the comrades of one player outside of the HTTP server.
pub async fn lookup(config: Config, player: String) -> Result<Vec<PlayerProfile>, FinderError> {
    let service = build_service(&config)?;
    let ctx = RequestContext::new(
        &CancellationToken::new(),
        Duration::from_secs(config.request_timeout_secs),
    );

    let result = service.compute_comrades(&ctx, &player).await;
    service.shutdown();
    Ok(result?)
}
