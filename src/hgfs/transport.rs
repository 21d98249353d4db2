//! Transport sessions: one per connected channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;
use bytes::Bytes;
use log::{debug, info};
use parking_lot::Mutex;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::engine::ServerContext;
use crate::hgfs::policy::ShareInfo;
use crate::hgfs::session::Session;
use crate::hgfs::session_state::{Lifecycle, SessionFlags};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelCaps: u32 {
        /// Replies may be sent from a thread other than the receiver.
        const ASYNC = 1 << 0;
        /// The channel carries server-initiated packets.
        const NOTIFY = 1 << 1;
    }
}

/// The transport's side of the callback table.
pub trait Channel: Send + Sync {
    fn send(&self, packet: Bytes) -> HgfsResult<()>;

    fn capabilities(&self) -> ChannelCaps;

    /// A worker thread starts sending on this channel.
    fn register_thread(&self) {}

    fn unregister_thread(&self) {}
}

pub struct TransportSession {
    id: u64,
    channel: Arc<dyn Channel>,
    capabilities: ChannelCaps,
    lifecycle: Mutex<Lifecycle>,
    sessions: Mutex<Vec<Arc<Session>>>,
    default_session: Mutex<Option<u64>>,
    in_flight_sends: AtomicUsize,
    server: Arc<ServerContext>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl TransportSession {
    pub(crate) fn new(id: u64, channel: Arc<dyn Channel>, server: Arc<ServerContext>) -> Self {
        let capabilities = channel.capabilities();
        Self {
            id,
            channel,
            capabilities,
            lifecycle: Mutex::new(Lifecycle::Open),
            sessions: Mutex::new(Vec::new()),
            default_session: Mutex::new(None),
            in_flight_sends: AtomicUsize::new(0),
            server,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capabilities(&self) -> ChannelCaps {
        self.capabilities
    }

    pub fn supports_async(&self) -> bool {
        self.capabilities.contains(ChannelCaps::ASYNC)
    }

    pub fn is_open(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Open
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    fn negotiate(&self, requested: SessionFlags) -> SessionFlags {
        let mut flags = SessionFlags::MAXPACKETSIZE_VALID;
        if requested.contains(SessionFlags::CHANGENOTIFY)
            && self.capabilities.contains(ChannelCaps::NOTIFY)
            && self.server.notify.is_supported()
        {
            flags |= SessionFlags::CHANGENOTIFY;
        }
        if requested.contains(SessionFlags::OPLOCK) && self.server.config.oplocks_enabled {
            flags |= SessionFlags::OPLOCK;
        }
        if requested.contains(SessionFlags::ASYNC_IO)
            && self.supports_async()
            && self.server.executor.is_some()
        {
            flags |= SessionFlags::ASYNC_IO;
        }
        flags
    }

    /// Create a session, bounded by the per-transport limit.
    pub fn create_session(
        self: &Arc<Self>,
        max_packet_size: u32,
        requested: SessionFlags,
    ) -> HgfsResult<Arc<Session>> {
        if !self.is_open() {
            return Err(HgfsError::Transport(format!(
                "transport session {} is closed",
                self.id
            )));
        }

        let mut sessions = self.sessions.lock();
        if sessions.len() >= self.server.config.max_sessions_per_transport {
            info!(
                "transport session {}: session limit {} reached",
                self.id, self.server.config.max_sessions_per_transport
            );
            return Err(HgfsError::TooManySessions);
        }

        let limit = self.server.config.max_packet_size;
        let max_packet_size = match max_packet_size {
            0 => limit,
            n => n.min(limit),
        };
        let flags = self.negotiate(requested);
        let session = Arc::new(Session::new(
            self.server.new_session_id(),
            max_packet_size,
            flags,
            Arc::downgrade(self),
            self.server.clone(),
        )?);
        sessions.push(session.clone());

        info!(
            "transport session {}: created session {:#x} ({:?}, max packet {})",
            self.id,
            session.id(),
            flags,
            max_packet_size
        );
        Ok(session)
    }

    /// The session used by packets that carry no session id, created on
    /// first use.
    pub fn default_session(self: &Arc<Self>) -> HgfsResult<Arc<Session>> {
        let mut default = self.default_session.lock();
        if let Some(id) = *default {
            if let Ok(session) = self.lookup_session(id) {
                return Ok(session);
            }
        }
        let session = self.create_session(0, SessionFlags::all())?;
        *default = Some(session.id());
        Ok(session)
    }

    /// An open session by id.
    pub fn lookup_session(&self, id: u64) -> HgfsResult<Arc<Session>> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.id() == id && s.is_open())
            .cloned()
            .ok_or(HgfsError::StaleSession(id))
    }

    /// Close a session and drop it from the list. It is torn down once
    /// in-flight requests release it.
    pub fn close_session(&self, id: u64) -> HgfsResult<()> {
        let session = {
            let mut sessions = self.sessions.lock();
            let pos = sessions
                .iter()
                .position(|s| s.id() == id)
                .ok_or(HgfsError::StaleSession(id))?;
            sessions.remove(pos)
        };
        session.close();

        let mut default = self.default_session.lock();
        if *default == Some(id) {
            *default = None;
        }
        Ok(())
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// One inactivity sweep over every session. Idle sessions lose
    /// their cached descriptors; sessions idle for `max_sweeps`
    /// consecutive sweeps are closed. Returns the number closed.
    pub(crate) fn sweep_inactive(&self, max_sweeps: u32) -> usize {
        let mut closed = 0;
        for session in self.sessions() {
            if session.pending_requests() > 0 {
                session.touch();
                continue;
            }
            let idle = session.sweep();
            if idle == 0 {
                continue;
            }
            session.flush_cache();
            if idle >= max_sweeps {
                info!(
                    "transport session {}: closing session {:#x} after {} idle sweeps",
                    self.id,
                    session.id(),
                    idle
                );
                if self.close_session(session.id()).is_ok() {
                    closed += 1;
                }
            }
        }
        closed
    }

    pub(crate) fn invalidate(&self, shares: &[ShareInfo]) {
        for session in self.sessions() {
            session.invalidate(shares);
        }
    }

    /// Send a packet on the channel.
    pub fn send(&self, packet: Bytes) -> HgfsResult<()> {
        if !self.is_open() {
            return Err(HgfsError::Transport(format!(
                "transport session {} is closed",
                self.id
            )));
        }
        self.in_flight_sends.fetch_add(1, Ordering::SeqCst);
        self.channel.send(packet).inspect_err(|_| {
            self.in_flight_sends.fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// The channel is done with a packet handed to `send`.
    pub(crate) fn send_complete(&self) {
        let _ = self
            .in_flight_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn in_flight_sends(&self) -> usize {
        self.in_flight_sends.load(Ordering::SeqCst)
    }

    /// Close every session and refuse further traffic.
    pub(crate) fn disconnect(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Closed {
                return;
            }
            *lifecycle = Lifecycle::Closed;
        }
        let sessions: Vec<_> = self.sessions.lock().drain(..).collect();
        for session in &sessions {
            session.close();
        }
        *self.default_session.lock() = None;
        info!(
            "transport session {} disconnected ({} sessions closed)",
            self.id,
            sessions.len()
        );
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        debug!("transport session {} released", self.id);
    }
}
