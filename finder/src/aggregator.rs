use crate::context::RequestContext;
use crate::fetchers::RosterFetcher;
use crate::pool::{PoolStopped, WorkerPool};
use rating::{ComradeCount, EventParticipation, PlayerId};

/// Counts how many events every teammate shared with a player.
pub struct ComradeAggregator {
    pool: WorkerPool<RosterFetcher>,
}

impl ComradeAggregator {
    pub fn new(pool: WorkerPool<RosterFetcher>) -> Self {
        ComradeAggregator { pool }
    }

    /// Resolves the roster of every event and counts co-occurrences.
    ///
    /// Drains the whole result stream, so events whose roster could not be
    /// fetched simply contribute nothing. Duplicate events are counted once per
    /// occurrence. The subject is never counted, even if a roster lists them.
    /// If `ctx` is done before the stream is drained the counts are partial.
    pub async fn aggregate(
        &self,
        ctx: &RequestContext,
        subject: &PlayerId,
        events: Vec<EventParticipation>,
    ) -> Result<ComradeCount, PoolStopped> {
        let mut counts = ComradeCount::new();
        let mut results = self.pool.submit(ctx, events);

        while let Some(outcome) = results.next().await {
            let Some(roster) = outcome.result else {
                continue;
            };
            for player in roster {
                if &player == subject {
                    continue;
                }
                *counts.entry(player).or_insert(0) += 1;
            }
        }
        results.finish()?;

        Ok(counts)
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
