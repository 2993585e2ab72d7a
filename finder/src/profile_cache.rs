// Process-wide profile cache. Entries expire individually, so a profile that is
// written again gets a fresh TTL.
use moka::sync::Cache;
use moka::Expiry;
use rating::{PlayerId, PlayerProfile};
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store consulted before fetching profiles upstream.
///
/// Implementations must be safe to share between concurrent requests.
pub trait ProfileStore: Send + Sync {
    /// A non-expired profile, or `None` on a miss.
    fn get(&self, id: &PlayerId) -> Result<Option<PlayerProfile>, CacheError>;

    fn set(&self, id: &PlayerId, profile: PlayerProfile, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct CachedProfile {
    profile: PlayerProfile,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<PlayerId, CachedProfile> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &PlayerId,
        value: &CachedProfile,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &PlayerId,
        value: &CachedProfile,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MokaProfileStore {
    cache: Cache<PlayerId, CachedProfile>,
}

impl MokaProfileStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        MokaProfileStore { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl ProfileStore for MokaProfileStore {
    fn get(&self, id: &PlayerId) -> Result<Option<PlayerProfile>, CacheError> {
        Ok(self.cache.get(id).map(|cached| cached.profile))
    }

    fn set(&self, id: &PlayerId, profile: PlayerProfile, ttl: Duration) -> Result<(), CacheError> {
        self.cache.insert(id.clone(), CachedProfile { profile, ttl });
        Ok(())
    }
}
