use crate::aggregator::ComradeAggregator;
use crate::assembler::assemble;
use crate::config::Config;
use crate::context::{ContextError, RequestContext};
use crate::fetchers::{ProfileFetcher, RosterFetcher};
use crate::metrics_defs::{COMRADES_FOUND, REQUEST_DURATION};
use crate::pool::{PoolStopped, WorkerPool};
use crate::profile_cache::{MokaProfileStore, ProfileStore};
use crate::resolver::ProfileResolver;
use rating::{ComradeCount, PlayerId, PlayerProfile, RatingProvider, UpstreamError};
use shared::histogram;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum ComradesError {
    #[error("could not list events for player {player}: {source}")]
    EventListing {
        player: PlayerId,
        #[source]
        source: UpstreamError,
    },
    #[error("request cancelled")]
    Cancelled { partial: Vec<PlayerProfile> },
    #[error("request deadline exceeded")]
    DeadlineExceeded { partial: Vec<PlayerProfile> },
    #[error("comrades service is shutting down: {0}")]
    Stopped(#[from] PoolStopped),
}

impl ComradesError {
    fn interrupted(cause: ContextError, partial: Vec<PlayerProfile>) -> Self {
        match cause {
            ContextError::Cancelled => ComradesError::Cancelled { partial },
            ContextError::DeadlineExceeded => ComradesError::DeadlineExceeded { partial },
        }
    }

    /// Profiles assembled before the request was interrupted.
    pub fn partial(&self) -> &[PlayerProfile] {
        match self {
            ComradesError::EventListing { .. } | ComradesError::Stopped(_) => &[],
            ComradesError::Cancelled { partial } | ComradesError::DeadlineExceeded { partial } => {
                partial
            }
        }
    }
}

/// Tuning for the two worker pools and the profile cache.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub roster_workers: usize,
    pub profile_workers: usize,
    pub cache_ttl: Duration,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        ServiceSettings {
            roster_workers: config.pools.roster_workers,
            profile_workers: config.pools.profile_workers,
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
        }
    }
}

/// Computes the ranked comrades of a player.
///
/// Owns the long-lived roster and profile pools, so one instance should be
/// shared by every request.
pub struct ComradeService {
    provider: Arc<dyn RatingProvider>,
    aggregator: ComradeAggregator,
    resolver: ProfileResolver,
}

impl ComradeService {
    pub fn new(
        provider: Arc<dyn RatingProvider>,
        store: Arc<dyn ProfileStore>,
        settings: ServiceSettings,
    ) -> Self {
        let roster_pool = WorkerPool::new(
            "roster",
            settings.roster_workers,
            RosterFetcher::new(provider.clone()),
        );
        let profile_pool = WorkerPool::new(
            "profile",
            settings.profile_workers,
            ProfileFetcher::new(provider.clone()),
        );

        ComradeService {
            provider,
            aggregator: ComradeAggregator::new(roster_pool),
            resolver: ProfileResolver::new(profile_pool, store, settings.cache_ttl),
        }
    }

    /// Builds a service with the in-process moka profile cache.
    pub fn from_config(provider: Arc<dyn RatingProvider>, config: &Config) -> Self {
        let store = Arc::new(MokaProfileStore::new(config.cache.max_capacity));
        Self::new(provider, store, ServiceSettings::from(config))
    }

    pub async fn compute_comrades(
        &self,
        ctx: &RequestContext,
        subject: &PlayerId,
    ) -> Result<Vec<PlayerProfile>, ComradesError> {
        let started = Instant::now();
        let result = self.run(ctx, subject).await;
        histogram!(REQUEST_DURATION).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(comrades) => {
                histogram!(COMRADES_FOUND).record(comrades.len() as f64);
                tracing::debug!(player = %subject, comrades = comrades.len(), "comrades computed");
            }
            Err(e) => {
                tracing::warn!(
                    player = %subject,
                    error = %e,
                    partial = e.partial().len(),
                    "comrades request failed"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        subject: &PlayerId,
    ) -> Result<Vec<PlayerProfile>, ComradesError> {
        let events = tokio::select! {
            biased;
            _ = ctx.done() => None,
            events = self.provider.list_events(subject) => Some(events),
        };
        let events = match events {
            Some(Ok(events)) => events,
            Some(Err(source)) => {
                return Err(ComradesError::EventListing {
                    player: subject.clone(),
                    source,
                });
            }
            None => return Err(interrupted(ctx, Vec::new())),
        };
        tracing::debug!(player = %subject, events = events.len(), "events listed");

        let counts: ComradeCount = self.aggregator.aggregate(ctx, subject, events).await?;
        if ctx.is_done() {
            return Err(interrupted(ctx, Vec::new()));
        }

        let profiles = self.resolver.resolve(ctx, &counts).await?;
        let comrades = assemble(subject, &counts, profiles);
        if ctx.is_done() {
            return Err(interrupted(ctx, comrades));
        }

        Ok(comrades)
    }

    /// Stops the worker pools. Requests still running return partial results.
    pub fn shutdown(&self) {
        self.aggregator.shutdown();
        self.resolver.shutdown();
    }
}

fn interrupted(ctx: &RequestContext, partial: Vec<PlayerProfile>) -> ComradesError {
    ComradesError::interrupted(ctx.err().unwrap_or(ContextError::Cancelled), partial)
}
