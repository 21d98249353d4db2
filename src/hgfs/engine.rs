//! Engine entry points and the callback table transports register
//! against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use log::{info, warn};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::EngineConfig;
use crate::error::HgfsResult;
use crate::hgfs::dispatch;
use crate::hgfs::executor::{self, AsyncExecutor};
use crate::hgfs::notify::{NotificationBridge, NotifyBackend};
use crate::hgfs::platform::Platform;
use crate::hgfs::policy::SharePolicy;
use crate::hgfs::transport::{Channel, TransportSession};
use crate::hgfs::types::HandleCounter;
use crate::hgfs::utils::path_resolver::PathResolver;

/// Process-wide state shared by every transport and session.
pub struct ServerContext {
    pub config: EngineConfig,
    pub policy: Arc<dyn SharePolicy>,
    pub platform: Arc<dyn Platform>,
    pub resolver: PathResolver,
    pub notify: Arc<NotificationBridge>,
    pub executor: Option<Box<dyn AsyncExecutor>>,
    /// Monotonic handle numbering for nodes and searches.
    pub handles: HandleCounter,
    rng: Mutex<SmallRng>,
    next_transport_id: AtomicU64,
}

impl ServerContext {
    /// Session ids are random; collisions are not checked for.
    pub fn new_session_id(&self) -> u64 {
        let mut rng = self.rng.lock();
        loop {
            let id: u64 = rng.r#gen();
            if id != 0 {
                return id;
            }
        }
    }

    /// Whether async-capable requests can currently be queued.
    pub fn executor_active(&self) -> bool {
        self.executor.as_ref().is_some_and(|e| e.is_active())
    }
}

/// Callback table a transport drives.
pub trait ServerCallbacks: Send + Sync {
    /// A channel connected; returns its transport session.
    fn connect(&self, channel: Arc<dyn Channel>) -> HgfsResult<Arc<TransportSession>>;

    /// The channel went away: close every session of the transport.
    fn disconnect(&self, transport: &Arc<TransportSession>);

    /// The transport drops its reference.
    fn close(&self, transport: Arc<TransportSession>);

    /// One complete request packet.
    fn receive(&self, transport: &Arc<TransportSession>, packet: Bytes);

    /// The share list changed: drop objects of removed shares.
    fn invalidate_objects(&self);

    /// Periodic inactivity sweep. Returns the number of sessions closed.
    fn invalidate_inactive_sessions(&self) -> usize;

    /// The channel finished with a packet passed to `Channel::send`.
    fn send_complete(&self, transport: &TransportSession, packet: Bytes);

    /// Freeze (`true`) or thaw (`false`) around an external snapshot.
    fn quiesce(&self, freeze: bool);
}

pub struct HgfsServer {
    context: Arc<ServerContext>,
    transports: Mutex<Vec<Weak<TransportSession>>>,
}

impl HgfsServer {
    /// Process-wide startup.
    pub fn init(
        config: EngineConfig,
        policy: Arc<dyn SharePolicy>,
        platform: Arc<dyn Platform>,
        notifier: Arc<dyn NotifyBackend>,
    ) -> HgfsResult<Self> {
        config.validate()?;

        let executor = executor::build(config.async_strategy)?;
        let notify = NotificationBridge::new(notifier, config.notifications_enabled);
        notify.refresh_shares(&policy.shares());

        info!(
            "HGFS engine started ({} shares, async {:?}, notifications {})",
            policy.share_names().len(),
            config.async_strategy,
            notify.is_supported()
        );

        let context = Arc::new(ServerContext {
            resolver: PathResolver::new(policy.clone(), platform.clone()),
            config,
            policy,
            platform,
            notify,
            executor,
            handles: HandleCounter::default(),
            rng: Mutex::new(SmallRng::from_entropy()),
            next_transport_id: AtomicU64::new(1),
        });

        Ok(Self {
            context,
            transports: Mutex::new(Vec::new()),
        })
    }

    /// Process-wide shutdown: disconnect every transport, stop the
    /// executor and unregister shares from notification.
    pub fn exit(&self) {
        for transport in self.live_transports() {
            transport.disconnect();
        }
        self.transports.lock().clear();
        if let Some(executor) = &self.context.executor {
            executor.shutdown();
        }
        self.context.notify.shutdown();
        info!("HGFS engine stopped");
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Current value of the handle counter, for checkpointing.
    pub fn handle_counter(&self) -> u32 {
        self.context.handles.get()
    }

    /// Restore the handle counter from a checkpoint.
    pub fn set_handle_counter(&self, value: u32) {
        self.context.handles.set(value);
    }

    fn live_transports(&self) -> Vec<Arc<TransportSession>> {
        let mut transports = self.transports.lock();
        transports.retain(|t| t.strong_count() > 0);
        transports.iter().filter_map(Weak::upgrade).collect()
    }
}

impl ServerCallbacks for HgfsServer {
    fn connect(&self, channel: Arc<dyn Channel>) -> HgfsResult<Arc<TransportSession>> {
        let id = self.context.next_transport_id.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::new(TransportSession::new(id, channel, self.context.clone()));
        self.transports.lock().push(Arc::downgrade(&transport));
        info!(
            "transport session {} connected ({:?})",
            id,
            transport.capabilities()
        );
        Ok(transport)
    }

    fn disconnect(&self, transport: &Arc<TransportSession>) {
        transport.disconnect();
    }

    fn close(&self, transport: Arc<TransportSession>) {
        let id = transport.id();
        self.transports
            .lock()
            .retain(|t| t.upgrade().is_some_and(|t| t.id() != id));
        drop(transport);
    }

    fn receive(&self, transport: &Arc<TransportSession>, packet: Bytes) {
        dispatch::receive(&self.context, transport, packet);
    }

    fn invalidate_objects(&self) {
        let shares = self.context.policy.shares();
        self.context.notify.refresh_shares(&shares);
        for transport in self.live_transports() {
            transport.invalidate(&shares);
        }
    }

    fn invalidate_inactive_sessions(&self) -> usize {
        let max = self.context.config.max_inactivity_sweeps;
        self.live_transports()
            .iter()
            .map(|t| t.sweep_inactive(max))
            .sum()
    }

    fn send_complete(&self, transport: &TransportSession, packet: Bytes) {
        transport.send_complete();
        drop(packet);
    }

    fn quiesce(&self, freeze: bool) {
        if freeze {
            info!("freezing: pausing notifications and async execution");
            self.context.notify.pause();
            if let Some(executor) = &self.context.executor {
                executor.pause();
            }
            for transport in self.live_transports() {
                for session in transport.sessions() {
                    if session.pending_requests() > 0 {
                        info!(
                            "waiting for {} requests of session {:#x}",
                            session.pending_requests(),
                            session.id()
                        );
                    }
                    session.wait_idle();
                }
            }
        } else {
            info!("thawing: resuming async execution and notifications");
            if let Some(executor) = &self.context.executor {
                executor.resume();
            }
            self.context.notify.resume();
        }
    }
}

impl Drop for HgfsServer {
    fn drop(&mut self) {
        if let Some(executor) = &self.context.executor {
            if executor.is_active() {
                warn!("engine dropped without exit");
            }
        }
    }
}
