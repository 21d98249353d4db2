//! One logical protocol session.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::engine::ServerContext;
use crate::hgfs::handle_table::NodeTable;
use crate::hgfs::notify::SubscriberId;
use crate::hgfs::policy::ShareInfo;
use crate::hgfs::protocol::header::SESSION_HEADER_SIZE;
use crate::hgfs::search_table::SearchTable;
use crate::hgfs::session_state::{
    AsyncCounter, Capability, InactivityTracker, Lifecycle, SessionFlags, capability_table,
};
use crate::hgfs::transport::TransportSession;

/// Room reserved in a reply for the header and fixed reply fields.
const REPLY_OVERHEAD: usize = SESSION_HEADER_SIZE + 16;

pub struct Session {
    id: u64,
    lifecycle: Mutex<Lifecycle>,
    max_packet_size: u32,
    flags: SessionFlags,
    capabilities: Vec<Capability>,
    activity: InactivityTracker,
    pending: AsyncCounter,
    transport: Weak<TransportSession>,
    server: Arc<ServerContext>,
    pub(crate) nodes: Mutex<NodeTable>,
    pub(crate) searches: Mutex<SearchTable>,
    watches: Mutex<Vec<SubscriberId>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &format_args!("{:#x}", self.id))
            .field("lifecycle", &*self.lifecycle.lock())
            .field("flags", &self.flags)
            .field("max_packet_size", &self.max_packet_size)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        id: u64,
        max_packet_size: u32,
        flags: SessionFlags,
        transport: Weak<TransportSession>,
        server: Arc<ServerContext>,
    ) -> HgfsResult<Self> {
        let config = &server.config;
        let nodes = NodeTable::new(
            config.initial_node_slots,
            config.max_cached_open_nodes,
            config.max_cached_locked_nodes,
        )?;
        let searches = SearchTable::new(config.initial_search_slots)?;

        Ok(Self {
            id,
            lifecycle: Mutex::new(Lifecycle::Open),
            max_packet_size,
            flags,
            capabilities: capability_table(flags),
            activity: InactivityTracker::default(),
            pending: AsyncCounter::default(),
            transport,
            server,
            nodes: Mutex::new(nodes),
            searches: Mutex::new(searches),
            watches: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }

    /// Largest data payload a single read or write may carry.
    pub fn max_io_size(&self) -> usize {
        (self.max_packet_size as usize).saturating_sub(REPLY_OVERHEAD)
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn server(&self) -> &Arc<ServerContext> {
        &self.server
    }

    pub fn is_open(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Open
    }

    /// Mark the session closed. Returns false if it already was.
    pub(crate) fn close(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Closed {
            return false;
        }
        *lifecycle = Lifecycle::Closed;
        info!("session {:#x} closed", self.id);
        true
    }

    pub fn touch(&self) {
        self.activity.touch();
    }

    pub(crate) fn sweep(&self) -> u32 {
        self.activity.sweep()
    }

    pub fn pending_requests(&self) -> u32 {
        self.pending.pending()
    }

    /// Count an asynchronous request until the guard is dropped.
    pub fn begin_async(self: &Arc<Self>) -> AsyncGuard {
        self.pending.begin();
        AsyncGuard {
            session: self.clone(),
        }
    }

    /// Block until every asynchronous request has completed.
    pub fn wait_idle(&self) {
        self.pending.wait_idle();
    }

    pub fn transport(&self) -> Option<Arc<TransportSession>> {
        self.transport.upgrade()
    }

    /// Send a packet that answers no request (change notification).
    pub fn send_unsolicited(&self, packet: Bytes) -> HgfsResult<()> {
        if !self.flags.contains(SessionFlags::CHANGENOTIFY) {
            return Err(HgfsError::NotSupported(
                "session did not negotiate change notification".into(),
            ));
        }
        let transport = self
            .transport()
            .ok_or_else(|| HgfsError::Transport("transport session is gone".into()))?;
        transport.send(packet)
    }

    pub(crate) fn add_watch(&self, id: SubscriberId) {
        self.watches.lock().push(id);
    }

    /// Forget a watch; false if this session does not own it.
    pub(crate) fn remove_watch(&self, id: SubscriberId) -> bool {
        let mut watches = self.watches.lock();
        match watches.iter().position(|w| *w == id) {
            Some(pos) => {
                watches.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop nodes and searches whose share is gone or moved.
    pub(crate) fn invalidate(&self, shares: &[ShareInfo]) -> (usize, usize) {
        let platform = self.server.platform.as_ref();
        let nodes = self.nodes.lock().invalidate(platform, |node| {
            shares
                .iter()
                .any(|s| s.name == node.share_name && s.root.to_string_lossy() == node.share_root)
        });
        let searches = self.searches.lock().invalidate(|search| {
            shares
                .iter()
                .any(|s| s.name == search.share_name && s.root == search.share_root)
        });
        if nodes + searches > 0 {
            info!(
                "session {:#x}: invalidated {} nodes and {} searches",
                self.id, nodes, searches
            );
        }
        (nodes, searches)
    }

    /// Close cached descriptors; the nodes stay open.
    pub(crate) fn flush_cache(&self) {
        self.nodes
            .lock()
            .flush_cache(self.server.platform.as_ref());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let platform = self.server.platform.as_ref();
        let nodes = self.nodes.get_mut().close_all(platform);
        let searches = self.searches.get_mut().close_all();
        for watch in self.watches.get_mut().drain(..) {
            if let Err(e) = self.server.notify.unsubscribe(watch) {
                warn!("failed to remove watch {}: {}", watch, e);
            }
        }
        debug!(
            "session {:#x} torn down ({} nodes, {} searches)",
            self.id, nodes, searches
        );
    }
}

/// Keeps a session's async counter raised while a request is queued.
pub struct AsyncGuard {
    session: Arc<Session>,
}

impl Drop for AsyncGuard {
    fn drop(&mut self) {
        self.session.pending.end();
    }
}
