//! Bounded fan-out/fan-in over a fixed set of long-lived workers.
//!
//! A pool owns `size` worker tasks for its whole lifetime. Every call to
//! [`WorkerPool::submit`] opens a batch: a bounded item queue and a bounded
//! result queue (both of capacity `size`) that only this batch uses. One
//! assignment per worker, up to the number of items, is queued on the pool's
//! dispatch queue. A worker that picks an assignment up drains the batch's item
//! queue until it is empty or the batch context is done, then drops its
//! result sender. The result stream closes when the last sender is gone, which
//! is the batch's join.
//!
//! Since every worker processes a single item at a time, at most `size`
//! fetches are in flight per pool, however many batches are open.

use crate::context::RequestContext;
use crate::metrics_defs::{POOL_FETCH_FAILED, POOL_IN_FLIGHT};
use async_trait::async_trait;
use shared::{counter, gauge};
use std::fmt::{Debug, Display};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One upstream lookup, applied by a pool to every item of a batch.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Item: Debug + Send + Sync + 'static;
    type Output: Send + 'static;
    type Error: Display + Send;

    async fn fetch(&self, item: &Self::Item) -> Result<Self::Output, Self::Error>;
}

/// A batch ended before every item was processed because its pool was shut down.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker pool {0} is shut down")]
pub struct PoolStopped(pub &'static str);

/// Result for one submitted item. `result` is `None` when the fetch failed.
#[derive(Debug)]
pub struct Outcome<I, O> {
    pub item: I,
    pub result: Option<O>,
}

type ItemQueue<I> = Arc<Mutex<mpsc::Receiver<I>>>;

struct Assignment<F: Fetcher> {
    items: ItemQueue<F::Item>,
    results: mpsc::Sender<Outcome<F::Item, F::Output>>,
    ctx: RequestContext,
}

type DispatchQueue<F> = Arc<Mutex<mpsc::UnboundedReceiver<Assignment<F>>>>;

pub struct WorkerPool<F: Fetcher> {
    name: &'static str,
    size: usize,
    dispatch: mpsc::UnboundedSender<Assignment<F>>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl<F: Fetcher> WorkerPool<F> {
    /// Spawns `size` workers (at least one) on the current runtime.
    pub fn new(name: &'static str, size: usize, fetcher: F) -> Self {
        let size = size.max(1);
        let fetcher = Arc::new(fetcher);
        let (dispatch, dispatch_rx) = mpsc::unbounded_channel();
        let dispatch_rx: DispatchQueue<F> = Arc::new(Mutex::new(dispatch_rx));
        let shutdown = CancellationToken::new();

        let workers = (0..size)
            .map(|id| {
                let worker = Worker {
                    id,
                    pool: name,
                    fetcher: fetcher.clone(),
                    dispatch: dispatch_rx.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::debug!(pool = name, size, "worker pool started");

        WorkerPool {
            name,
            size,
            dispatch,
            shutdown,
            workers,
        }
    }

    /// Fans `items` out to the workers. The returned stream yields one outcome
    /// per item in completion order, and ends early if `ctx` is done or the
    /// pool is shut down. [`BatchResults::finish`] tells the two apart.
    pub fn submit(
        &self,
        ctx: &RequestContext,
        items: Vec<F::Item>,
    ) -> BatchResults<F::Item, F::Output> {
        let (result_tx, result_rx) = mpsc::channel(self.size);
        let batch = BatchResults {
            results: result_rx,
            ctx: ctx.clone(),
            pool: self.name,
            stopped: self.shutdown.clone(),
            remaining: items.len(),
        };

        if items.is_empty() {
            return batch;
        }
        if self.shutdown.is_cancelled() {
            tracing::error!(pool = self.name, "worker pool is shut down, dropping batch");
            return batch;
        }

        let (item_tx, item_rx) = mpsc::channel(self.size);
        let item_rx: ItemQueue<F::Item> = Arc::new(Mutex::new(item_rx));

        for _ in 0..self.size.min(items.len()) {
            let assignment = Assignment {
                items: item_rx.clone(),
                results: result_tx.clone(),
                ctx: ctx.clone(),
            };
            if self.dispatch.send(assignment).is_err() {
                tracing::error!(pool = self.name, "worker pool is shut down, dropping batch");
                break;
            }
        }

        tokio::spawn(feed(ctx.clone(), items, item_tx));

        batch
    }

    /// Stops every worker once its current item completes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && self.workers.iter().any(|w| !w.is_finished())
    }
}

impl<F: Fetcher> Drop for WorkerPool<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Pushes a batch's items into its queue, then closes the queue by dropping the sender.
async fn feed<I>(ctx: RequestContext, items: Vec<I>, tx: mpsc::Sender<I>) {
    for item in items {
        tokio::select! {
            biased;
            _ = ctx.done() => return,
            sent = tx.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

/// Unordered results of one submitted batch.
pub struct BatchResults<I, O> {
    results: mpsc::Receiver<Outcome<I, O>>,
    ctx: RequestContext,
    pool: &'static str,
    stopped: CancellationToken,
    remaining: usize,
}

impl<I, O> BatchResults<I, O> {
    /// Next completed outcome. `None` once every worker on the batch has
    /// finished, or as soon as the batch context is done.
    pub async fn next(&mut self) -> Option<Outcome<I, O>> {
        let outcome = tokio::select! {
            biased;
            outcome = self.results.recv() => outcome,
            _ = self.ctx.done() => None,
        };
        if outcome.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
        outcome
    }

    /// Call once `next` returned `None`. Fails when items were left
    /// unprocessed because the pool shut down; a batch cut short by its own
    /// context is left for the caller to report through the context.
    pub fn finish(&self) -> Result<(), PoolStopped> {
        if self.remaining > 0 && self.stopped.is_cancelled() && !self.ctx.is_done() {
            return Err(PoolStopped(self.pool));
        }
        Ok(())
    }
}

struct Worker<F: Fetcher> {
    id: usize,
    pool: &'static str,
    fetcher: Arc<F>,
    dispatch: DispatchQueue<F>,
    shutdown: CancellationToken,
}

impl<F: Fetcher> Worker<F> {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => None,
                assignment = async { self.dispatch.lock().await.recv().await } => assignment,
            };
            let Some(assignment) = next else { break };
            self.process(assignment).await;
        }
        tracing::debug!(pool = self.pool, worker = self.id, "worker stopped");
    }

    async fn process(&self, assignment: Assignment<F>) {
        let Assignment {
            items,
            results,
            ctx,
        } = assignment;

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.done() => None,
                _ = self.shutdown.cancelled() => None,
                item = async { items.lock().await.recv().await } => item,
            };
            let Some(item) = next else { break };

            gauge!(POOL_IN_FLIGHT, "pool" => self.pool).increment(1.0);
            let fetched = tokio::select! {
                biased;
                _ = ctx.done() => None,
                fetched = self.fetcher.fetch(&item) => Some(fetched),
            };
            gauge!(POOL_IN_FLIGHT, "pool" => self.pool).decrement(1.0);

            // Cancelled mid-fetch; the upstream call is dropped with its future.
            let Some(fetched) = fetched else { break };

            let result = match fetched {
                Ok(output) => Some(output),
                Err(e) => {
                    tracing::warn!(pool = self.pool, item = ?item, error = %e, "fetch failed");
                    counter!(POOL_FETCH_FAILED, "pool" => self.pool).increment(1);
                    None
                }
            };

            let sent = tokio::select! {
                biased;
                _ = ctx.done() => false,
                sent = results.send(Outcome { item, result }) => sent.is_ok(),
            };
            if !sent {
                break;
            }
        }
    }
}
