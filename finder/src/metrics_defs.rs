//! Metrics definitions for the comrade finder.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PROFILE_CACHE_HIT: MetricDef = MetricDef {
    name: "profile_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of profile lookups served from the cache",
};

pub const PROFILE_CACHE_MISS: MetricDef = MetricDef {
    name: "profile_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of profile lookups that missed the cache (including failed reads)",
};

pub const PROFILE_CACHE_WRITE_FAILED: MetricDef = MetricDef {
    name: "profile_cache.write_failed",
    metric_type: MetricType::Counter,
    description: "Number of profiles that could not be written back to the cache",
};

pub const POOL_FETCH_FAILED: MetricDef = MetricDef {
    name: "pool.fetch.failed",
    metric_type: MetricType::Counter,
    description: "Number of work items whose upstream fetch failed, tagged by pool",
};

pub const POOL_IN_FLIGHT: MetricDef = MetricDef {
    name: "pool.in_flight",
    metric_type: MetricType::Gauge,
    description: "Number of upstream fetches currently running, tagged by pool",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to compute the comrades of one player in seconds",
};

pub const COMRADES_FOUND: MetricDef = MetricDef {
    name: "comrades.found",
    metric_type: MetricType::Histogram,
    description: "Number of comrade profiles returned per request",
};

// All metrics must be listed here so they can be described at startup.
pub const ALL_METRICS: &[MetricDef] = &[
    PROFILE_CACHE_HIT,
    PROFILE_CACHE_MISS,
    PROFILE_CACHE_WRITE_FAILED,
    POOL_FETCH_FAILED,
    POOL_IN_FLIGHT,
    REQUEST_DURATION,
    COMRADES_FOUND,
];
