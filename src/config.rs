//! Engine configuration

use crate::error::{HgfsError, HgfsResult};

/// Largest packet the engine accepts or produces.
pub const HGFS_LARGE_PACKET_MAX: u32 = 0xF800;

/// How async-capable requests are executed once both ends negotiated
/// asynchronous I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStrategy {
    /// Dedicated pool of worker threads.
    ThreadPool { workers: usize },
    /// One-shot callback scheduled on the caller's runtime.
    Deferred,
    /// Always execute inline on the transport thread.
    Disabled,
}

impl Default for AsyncStrategy {
    fn default() -> Self {
        AsyncStrategy::ThreadPool { workers: 4 }
    }
}

/// Limits and feature switches for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cached (descriptor-holding) nodes per session.
    pub max_cached_open_nodes: usize,
    /// Cached nodes holding a server lock, per session.
    pub max_cached_locked_nodes: usize,
    /// Sessions a single transport session may own.
    pub max_sessions_per_transport: usize,
    /// Consecutive inactivity sweeps before a session is closed.
    pub max_inactivity_sweeps: u32,
    pub initial_node_slots: usize,
    pub initial_search_slots: usize,
    pub max_packet_size: u32,
    pub oplocks_enabled: bool,
    pub notifications_enabled: bool,
    pub async_strategy: AsyncStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cached_open_nodes: 30,
            max_cached_locked_nodes: 10,
            max_sessions_per_transport: 1024,
            max_inactivity_sweeps: 4,
            initial_node_slots: 100,
            initial_search_slots: 100,
            max_packet_size: HGFS_LARGE_PACKET_MAX,
            oplocks_enabled: true,
            notifications_enabled: true,
            async_strategy: AsyncStrategy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> HgfsResult<()> {
        if self.max_cached_open_nodes == 0 {
            return Err(HgfsError::InvalidParameter(
                "max_cached_open_nodes must be non-zero".into(),
            ));
        }
        if self.max_cached_locked_nodes > self.max_cached_open_nodes {
            return Err(HgfsError::InvalidParameter(format!(
                "locked node bound {} exceeds cache bound {}",
                self.max_cached_locked_nodes, self.max_cached_open_nodes
            )));
        }
        if self.max_sessions_per_transport == 0 || self.max_inactivity_sweeps == 0 {
            return Err(HgfsError::InvalidParameter(
                "session bounds must be non-zero".into(),
            ));
        }
        if self.initial_node_slots == 0 || self.initial_search_slots == 0 {
            return Err(HgfsError::InvalidParameter(
                "initial table sizes must be non-zero".into(),
            ));
        }
        if let AsyncStrategy::ThreadPool { workers: 0 } = self.async_strategy {
            return Err(HgfsError::InvalidParameter(
                "thread pool needs at least one worker".into(),
            ));
        }
        Ok(())
    }
}
