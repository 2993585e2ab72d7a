use crate::context::RequestContext;
use crate::fetchers::ProfileFetcher;
use crate::metrics_defs::{PROFILE_CACHE_HIT, PROFILE_CACHE_MISS, PROFILE_CACHE_WRITE_FAILED};
use crate::pool::{PoolStopped, WorkerPool};
use crate::profile_cache::ProfileStore;
use rating::{ComradeCount, PlayerProfile};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

/// Resolves comrade profiles, cache first, upstream through the profile pool on a miss.
pub struct ProfileResolver {
    pool: WorkerPool<ProfileFetcher>,
    store: Arc<dyn ProfileStore>,
    ttl: Duration,
}

impl ProfileResolver {
    pub fn new(pool: WorkerPool<ProfileFetcher>, store: Arc<dyn ProfileStore>, ttl: Duration) -> Self {
        ProfileResolver { pool, store, ttl }
    }

    /// Profiles for every id in `counts` that could be resolved, with
    /// `shared_count` taken from `counts`. Ids whose profile could not be
    /// fetched are left out. Each id is visited once, so there are no duplicates.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        counts: &ComradeCount,
    ) -> Result<Vec<PlayerProfile>, PoolStopped> {
        let mut profiles = Vec::with_capacity(counts.len());
        let mut misses = Vec::new();

        for (id, &count) in counts {
            if ctx.is_done() {
                return Ok(profiles);
            }
            match self.store.get(id) {
                Ok(Some(profile)) => {
                    counter!(PROFILE_CACHE_HIT).increment(1);
                    profiles.push(profile.with_shared_count(count));
                }
                Ok(None) => {
                    counter!(PROFILE_CACHE_MISS).increment(1);
                    misses.push(id.clone());
                }
                Err(e) => {
                    tracing::warn!(player = %id, error = %e, "profile cache read failed");
                    counter!(PROFILE_CACHE_MISS).increment(1);
                    misses.push(id.clone());
                }
            }
        }

        if misses.is_empty() {
            return Ok(profiles);
        }

        let mut results = self.pool.submit(ctx, misses);
        while let Some(outcome) = results.next().await {
            let (Some(profile), Some(&count)) = (outcome.result, counts.get(&outcome.item)) else {
                continue;
            };

            if let Err(e) = self.store.set(&outcome.item, profile.clone(), self.ttl) {
                tracing::warn!(player = %outcome.item, error = %e, "profile cache write failed");
                counter!(PROFILE_CACHE_WRITE_FAILED).increment(1);
            }
            profiles.push(profile.with_shared_count(count));
        }
        results.finish()?;

        Ok(profiles)
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_cache::{CacheError, MokaProfileStore};
    use crate::testutils::{FakeProvider, ctx};
    use rating::PlayerId;

    struct BrokenStore;

    impl ProfileStore for BrokenStore {
        fn get(&self, _id: &PlayerId) -> Result<Option<PlayerProfile>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }

        fn set(&self, _id: &PlayerId, _profile: PlayerProfile, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn profile(id: &str, name: &str) -> PlayerProfile {
        PlayerProfile::new(id, name, "Surname", "Patronymic")
    }

    fn provider() -> Arc<FakeProvider> {
        Arc::new(
            FakeProvider::new()
                .with_profile(profile("456", "Ivan"))
                .with_profile(profile("789", "Pyotr")),
        )
    }

    fn resolver(
        provider: Arc<FakeProvider>,
        store: Arc<dyn ProfileStore>,
        ttl: Duration,
    ) -> ProfileResolver {
        ProfileResolver::new(
            WorkerPool::new("profile", 2, ProfileFetcher::new(provider)),
            store,
            ttl,
        )
    }

    fn sorted(mut profiles: Vec<PlayerProfile>) -> Vec<PlayerProfile> {
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    #[tokio::test]
    async fn test_misses_are_fetched_and_cached() {
        let provider = provider();
        let store = Arc::new(MokaProfileStore::new(100));
        let resolver = resolver(provider.clone(), store.clone(), Duration::from_secs(60));
        let counts = ComradeCount::from([("456".into(), 2), ("789".into(), 1)]);

        let profiles = resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();

        assert_eq!(
            sorted(profiles),
            vec![
                profile("456", "Ivan").with_shared_count(2),
                profile("789", "Pyotr").with_shared_count(1),
            ]
        );
        assert_eq!(provider.profile_calls(), 2);
        assert_eq!(store.get(&"456".to_string()).unwrap(), Some(profile("456", "Ivan")));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MokaProfileStore::new(100));
        store
            .set(&"456".to_string(), profile("456", "Cached"), Duration::from_secs(60))
            .unwrap();
        let resolver = resolver(provider.clone(), store, Duration::from_secs(60));

        let profiles = resolver
            .resolve(
                &ctx(Duration::from_secs(5)),
                &ComradeCount::from([("456".into(), 4)]),
            )
            .await
            .unwrap();

        assert_eq!(profiles, vec![profile("456", "Cached").with_shared_count(4)]);
        assert_eq!(provider.profile_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_resolve_within_ttl_is_served_from_cache() {
        let provider = provider();
        let store = Arc::new(MokaProfileStore::new(100));
        let resolver = resolver(provider.clone(), store, Duration::from_secs(60));
        let counts = ComradeCount::from([("456".into(), 2), ("789".into(), 1)]);

        let first = resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();
        let second = resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();

        assert_eq!(sorted(first), sorted(second));
        assert_eq!(provider.profile_calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_fetched_again() {
        let provider = provider();
        let store = Arc::new(MokaProfileStore::new(100));
        let resolver = resolver(provider.clone(), store.clone(), Duration::from_millis(50));
        let counts = ComradeCount::from([("456".into(), 1)]);

        resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get(&"456".to_string()).unwrap(), None);

        let profiles = resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();
        assert_eq!(profiles, vec![profile("456", "Ivan").with_shared_count(1)]);
        assert_eq!(provider.profile_calls(), 2);
        assert!(store.get(&"456".to_string()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_ids_are_dropped() {
        let provider = provider();
        let resolver = resolver(
            provider.clone(),
            Arc::new(MokaProfileStore::new(100)),
            Duration::from_secs(60),
        );
        let counts = ComradeCount::from([("456".into(), 2), ("000".into(), 7)]);

        let profiles = resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();

        assert_eq!(profiles, vec![profile("456", "Ivan").with_shared_count(2)]);
        assert_eq!(provider.profile_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_failures_are_not_fatal() {
        let provider = provider();
        let resolver = resolver(provider.clone(), Arc::new(BrokenStore), Duration::from_secs(60));
        let counts = ComradeCount::from([("456".into(), 2), ("789".into(), 1)]);

        let profiles = resolver.resolve(&ctx(Duration::from_secs(5)), &counts).await.unwrap();

        assert_eq!(profiles.len(), 2);
        assert_eq!(provider.profile_calls(), 2);
    }

    #[tokio::test]
    async fn test_deadline_yields_partial_result() {
        let provider = Arc::new(
            FakeProvider::new()
                .with_profile(profile("456", "Ivan"))
                .with_latency(Duration::from_secs(60)),
        );
        let store = Arc::new(MokaProfileStore::new(100));
        store
            .set(&"789".to_string(), profile("789", "Cached"), Duration::from_secs(60))
            .unwrap();
        let resolver = resolver(provider, store, Duration::from_secs(60));
        let counts = ComradeCount::from([("456".into(), 2), ("789".into(), 1)]);

        let profiles = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve(&ctx(Duration::from_millis(50)), &counts),
        )
        .await
        .expect("resolve must return once the deadline passes")
        .unwrap();

        assert!(profiles.len() <= 1);
        assert!(profiles.iter().all(|p| p.id == "789"));
    }

    #[tokio::test]
    async fn test_stopped_pool_is_an_error() {
        let provider = provider();
        let store = Arc::new(MokaProfileStore::new(100));
        store
            .set(&"789".to_string(), profile("789", "Cached"), Duration::from_secs(60))
            .unwrap();
        let resolver = resolver(provider.clone(), store, Duration::from_secs(60));
        resolver.shutdown();

        // Cache hits alone never touch the pool.
        let hits = resolver
            .resolve(
                &ctx(Duration::from_secs(5)),
                &ComradeCount::from([("789".into(), 1)]),
            )
            .await;
        assert_eq!(hits, Ok(vec![profile("789", "Cached").with_shared_count(1)]));

        let result = resolver
            .resolve(
                &ctx(Duration::from_secs(5)),
                &ComradeCount::from([("456".into(), 2), ("789".into(), 1)]),
            )
            .await;
        assert_eq!(result, Err(PoolStopped("profile")));
        assert_eq!(provider.profile_calls(), 0);
    }
}
