//! Internal worker pool.
//!
//! Back-end sends and cache calls run here, never on the IO runtime that
//! drives HTTP connections, so a slow origin cannot stall response writing.

use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Cloneable handle to the internal worker runtime.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    handle: Handle,
}

impl WorkerPool {
    /// Build a dedicated multi-threaded runtime for internal tasks.
    ///
    /// The returned [`Runtime`] must outlive every clone of the pool and be
    /// dropped outside of any async context.
    pub fn build(threads: usize) -> std::io::Result<(Runtime, WorkerPool)> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name("ssp-worker").enable_all();
        if threads > 0 {
            builder.worker_threads(threads);
        }
        let runtime = builder.build()?;
        let pool = WorkerPool::new(runtime.handle().clone());
        Ok((runtime, pool))
    }

    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Pool sharing the caller's runtime.
    ///
    /// # Panics
    /// Panics when called outside of a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}
