//! Execution strategies for asynchronous requests.
//!
//! Two interchangeable strategies exist: a dedicated worker pool, and a
//! one-shot deferred callback on the caller's runtime. Both refuse work
//! while paused; the dispatcher then runs the request inline.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::AsyncStrategy;
use crate::error::{HgfsError, HgfsResult};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait AsyncExecutor: Send + Sync {
    /// Queue `job`. A refused job is handed back so the caller can run
    /// it inline.
    fn submit(&self, job: Job) -> Result<(), Job>;

    fn pause(&self);

    fn resume(&self);

    /// Accepting work.
    fn is_active(&self) -> bool;

    fn shutdown(&self);
}

/// Worker pool backed by a dedicated multi-thread runtime. Jobs run on
/// its blocking pool, which is bounded by the worker count.
pub struct ThreadPoolExecutor {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    paused: AtomicBool,
}

impl ThreadPoolExecutor {
    pub fn new(workers: usize) -> HgfsResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("hgfs-worker")
            .enable_all()
            .build()
            .map_err(HgfsError::Io)?;
        let handle = runtime.handle().clone();
        info!("async thread pool started with {} workers", workers.max(1));
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            paused: AtomicBool::new(false),
        })
    }
}

impl AsyncExecutor for ThreadPoolExecutor {
    fn submit(&self, job: Job) -> Result<(), Job> {
        if !self.is_active() {
            return Err(job);
        }
        self.handle.spawn_blocking(job);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        debug!("thread pool paused");
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        debug!("thread pool resumed");
    }

    fn is_active(&self) -> bool {
        !self.paused.load(Ordering::SeqCst) && self.runtime.lock().is_some()
    }

    fn shutdown(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            info!("async thread pool stopped");
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One-shot callbacks scheduled on the runtime that created the
/// executor.
pub struct DeferredExecutor {
    handle: Option<Handle>,
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl DeferredExecutor {
    /// Bind to the current runtime. Without one every job runs inline.
    pub fn new() -> Self {
        let handle = Handle::try_current().ok();
        if handle.is_none() {
            warn!("no runtime for deferred execution, requests will run inline");
        }
        Self {
            handle,
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }
}

impl Default for DeferredExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncExecutor for DeferredExecutor {
    fn submit(&self, job: Job) -> Result<(), Job> {
        match &self.handle {
            Some(handle) if self.is_active() => {
                handle.spawn_blocking(job);
                Ok(())
            }
            _ => Err(job),
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.handle.is_some()
            && !self.paused.load(Ordering::SeqCst)
            && !self.stopped.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Executor for `strategy`; `None` means run everything inline.
pub fn build(strategy: AsyncStrategy) -> HgfsResult<Option<Box<dyn AsyncExecutor>>> {
    Ok(match strategy {
        AsyncStrategy::ThreadPool { workers } => Some(Box::new(ThreadPoolExecutor::new(workers)?)),
        AsyncStrategy::Deferred => Some(Box::new(DeferredExecutor::new())),
        AsyncStrategy::Disabled => None,
    })
}
