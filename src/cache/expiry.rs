//! Write-through cache updates with expiry-driven eviction.
//!
//! Every stored graph with a finite expiry gets an eviction timer that
//! deletes it `grace` after it expired. Storing the graph again replaces the
//! timer.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use oxigraph::model::NamedNode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::AbortHandle;

use super::{CacheError, CachedGraph, SemanticCache};
use crate::lifecycle::WorkerPool;
use crate::observability::metrics;
use crate::rdf::is_far_future;

struct EvictionTimer {
    generation: u64,
    handle: AbortHandle,
}

struct Inner {
    cache: Arc<dyn SemanticCache>,
    workers: WorkerPool,
    grace: Duration,
    timers: DashMap<NamedNode, EvictionTimer>,
    generation: AtomicU64,
}

/// Shared entry point for every cache write.
#[derive(Clone)]
pub struct CacheUpdater {
    inner: Arc<Inner>,
}

impl CacheUpdater {
    pub fn new(cache: Arc<dyn SemanticCache>, workers: WorkerPool, grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                workers,
                grace,
                timers: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<dyn SemanticCache> {
        &self.inner.cache
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.inner.workers
    }

    /// Replace a named graph and (re)schedule its eviction. Blocking.
    pub fn store(&self, entry: CachedGraph) -> Result<(), CacheError> {
        let name = entry.name.clone();
        let expiry = entry.expiry;
        self.inner.cache.put_named_graph(entry)?;
        self.schedule_eviction(name, expiry);
        metrics::set_cached_graphs(self.inner.cache.named_graph_count());
        Ok(())
    }

    /// Delete a named graph and its eviction timer. Blocking.
    pub fn remove(&self, name: &NamedNode) -> Result<bool, CacheError> {
        if let Some((_, timer)) = self.inner.timers.remove(name) {
            timer.handle.abort();
        }
        let removed = self.inner.cache.delete_named_graph(name)?;
        metrics::set_cached_graphs(self.inner.cache.named_graph_count());
        Ok(removed)
    }

    /// Number of pending eviction timers.
    pub fn pending_evictions(&self) -> usize {
        self.inner.timers.len()
    }

    fn schedule_eviction(&self, name: NamedNode, expiry: SystemTime) {
        if is_far_future(expiry) {
            if let Some((_, timer)) = self.inner.timers.remove(&name) {
                timer.handle.abort();
            }
            return;
        }

        let delay = expiry
            .duration_since(SystemTime::now())
            .unwrap_or_default()
            + self.inner.grace;
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);

        // The entry stays locked until the timer is recorded, so the task
        // cannot look for it too early.
        match self.inner.timers.entry(name.clone()) {
            Entry::Occupied(mut occupied) => {
                let handle = self.spawn_eviction(name, generation, delay);
                let previous = occupied.insert(EvictionTimer { generation, handle });
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_eviction(name, generation, delay);
                vacant.insert(EvictionTimer { generation, handle });
            }
        }
    }

    fn spawn_eviction(&self, name: NamedNode, generation: u64, delay: Duration) -> AbortHandle {
        let inner = Arc::clone(&self.inner);
        self.inner
            .workers
            .spawn(async move {
                tokio::time::sleep(delay).await;
                let current = inner
                    .timers
                    .remove_if(&name, |_, timer| timer.generation == generation)
                    .is_some();
                if !current {
                    return;
                }
                match inner.cache.delete_named_graph(&name) {
                    Ok(_) => tracing::debug!(graph = %name, "Evicted expired graph"),
                    Err(e) => tracing::warn!(graph = %name, error = %e, "Failed to evict expired graph"),
                }
                metrics::set_cached_graphs(inner.cache.named_graph_count());
            })
            .abort_handle()
    }
}
