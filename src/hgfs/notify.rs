//! Change notification bridge.
//!
//! Keeps a registry of shared folders registered with the OS-level
//! notification backend, forwards client watches to it, and turns each
//! backend event into one spontaneous NOTIFY packet on the owning
//! session's transport.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::policy::ShareInfo;
use crate::hgfs::protocol::reply::NotifyPacket;
use crate::hgfs::session::Session;

pub type ShareHandle = u64;
pub type SubscriberId = u64;

bitflags! {
    /// Change kinds a watch subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NotifyMask: u32 {
        const FILE_NAME = 1 << 0;
        const DIR_NAME = 1 << 1;
        const ATTRIBUTES = 1 << 2;
        const SIZE = 1 << 3;
        const LAST_WRITE = 1 << 4;
        const LAST_ACCESS = 1 << 5;
        const CREATION = 1 << 6;
        const ADDED = 1 << 8;
        const REMOVED = 1 << 9;
        const RENAMED = 1 << 10;
    }
}

/// One change reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEvent {
    pub subscriber: SubscriberId,
    pub share_name: String,
    /// Path of the changed object below the share root.
    pub relative_path: PathBuf,
    pub mask: u32,
    /// The backend dropped events before this one.
    pub overflow: bool,
}

/// Receives events from a backend.
pub trait NotifySink: Send + Sync {
    fn deliver(&self, event: NotifyEvent);
}

/// OS-level change notification.
pub trait NotifyBackend: Send + Sync {
    fn attach(&self, sink: Weak<dyn NotifySink>);

    fn is_supported(&self) -> bool;

    fn register_share(&self, name: &str, root: &Path) -> HgfsResult<ShareHandle>;

    fn unregister_share(&self, share: ShareHandle) -> HgfsResult<()>;

    fn add_subscriber(
        &self,
        share: ShareHandle,
        relative: &Path,
        events: u32,
        recursive: bool,
    ) -> HgfsResult<SubscriberId>;

    fn remove_subscriber(&self, subscriber: SubscriberId) -> HgfsResult<()>;

    /// Stop generating events until `resume`.
    fn pause(&self);

    fn resume(&self);
}

/// Backend for hosts without change notification.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl NotifyBackend for NullNotifier {
    fn attach(&self, _sink: Weak<dyn NotifySink>) {}

    fn is_supported(&self) -> bool {
        false
    }

    fn register_share(&self, name: &str, _root: &Path) -> HgfsResult<ShareHandle> {
        Err(HgfsError::NotSupported(format!("notifications for {name}")))
    }

    fn unregister_share(&self, _share: ShareHandle) -> HgfsResult<()> {
        Ok(())
    }

    fn add_subscriber(
        &self,
        _share: ShareHandle,
        _relative: &Path,
        _events: u32,
        _recursive: bool,
    ) -> HgfsResult<SubscriberId> {
        Err(HgfsError::NotSupported("change notification".into()))
    }

    fn remove_subscriber(&self, _subscriber: SubscriberId) -> HgfsResult<()> {
        Err(HgfsError::NotSupported("change notification".into()))
    }

    fn pause(&self) {}

    fn resume(&self) {}
}

#[derive(Debug, Clone)]
pub struct MemorySubscriber {
    pub share: ShareHandle,
    pub relative: PathBuf,
    pub events: u32,
    pub recursive: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    shares: HashMap<ShareHandle, String>,
    subscribers: HashMap<SubscriberId, MemorySubscriber>,
    paused: bool,
    queued: Vec<NotifyEvent>,
}

/// In-process backend. Events are injected with `fire`; while paused
/// they queue up and are delivered in order on resume.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    state: Mutex<MemoryState>,
    sink: Mutex<Option<Weak<dyn NotifySink>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn dispatch(&self, events: Vec<NotifyEvent>) {
        let sink = self.sink.lock().as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => events.into_iter().for_each(|e| sink.deliver(e)),
            None => debug!("no notification sink attached, dropping {} events", events.len()),
        }
    }

    /// Report a change to `name` (relative to the watched directory).
    pub fn fire(
        &self,
        subscriber: SubscriberId,
        name: &Path,
        mask: u32,
        overflow: bool,
    ) -> HgfsResult<()> {
        let event = {
            let mut state = self.state.lock();
            let sub = state.subscribers.get(&subscriber).ok_or_else(|| {
                HgfsError::InvalidParameter(format!("unknown subscriber {subscriber}"))
            })?;
            if sub.events & mask == 0 {
                return Ok(());
            }
            let share_name = state.shares.get(&sub.share).cloned().unwrap_or_default();
            let event = NotifyEvent {
                subscriber,
                share_name,
                relative_path: sub.relative.join(name),
                mask,
                overflow,
            };
            if state.paused {
                state.queued.push(event);
                return Ok(());
            }
            event
        };
        self.dispatch(vec![event]);
        Ok(())
    }

    pub fn subscribers(&self) -> Vec<(SubscriberId, MemorySubscriber)> {
        let mut subs: Vec<_> = self
            .state
            .lock()
            .subscribers
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();
        subs.sort_by_key(|(id, _)| *id);
        subs
    }

    pub fn share_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.lock().shares.values().cloned().collect();
        names.sort();
        names
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

impl NotifyBackend for MemoryNotifier {
    fn attach(&self, sink: Weak<dyn NotifySink>) {
        *self.sink.lock() = Some(sink);
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn register_share(&self, name: &str, _root: &Path) -> HgfsResult<ShareHandle> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = state.next_id;
        state.shares.insert(handle, name.to_string());
        Ok(handle)
    }

    fn unregister_share(&self, share: ShareHandle) -> HgfsResult<()> {
        let mut state = self.state.lock();
        state.shares.remove(&share);
        state.subscribers.retain(|_, sub| sub.share != share);
        Ok(())
    }

    fn add_subscriber(
        &self,
        share: ShareHandle,
        relative: &Path,
        events: u32,
        recursive: bool,
    ) -> HgfsResult<SubscriberId> {
        let mut state = self.state.lock();
        if !state.shares.contains_key(&share) {
            return Err(HgfsError::InvalidParameter(format!("unknown share {share}")));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(
            id,
            MemorySubscriber {
                share,
                relative: relative.to_path_buf(),
                events,
                recursive,
            },
        );
        Ok(id)
    }

    fn remove_subscriber(&self, subscriber: SubscriberId) -> HgfsResult<()> {
        self.state
            .lock()
            .subscribers
            .remove(&subscriber)
            .map(|_| ())
            .ok_or_else(|| HgfsError::InvalidParameter(format!("unknown subscriber {subscriber}")))
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        let queued = {
            let mut state = self.state.lock();
            state.paused = false;
            std::mem::take(&mut state.queued)
        };
        self.dispatch(queued);
    }
}

#[derive(Debug)]
struct Route {
    session: Weak<Session>,
    share: String,
}

pub struct NotificationBridge {
    backend: Arc<dyn NotifyBackend>,
    /// Share name → backend handle.
    registry: Mutex<HashMap<String, ShareHandle>>,
    routes: Mutex<HashMap<SubscriberId, Route>>,
    next_packet_id: AtomicU32,
    enabled: bool,
}

impl fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("shares", &self.registry.lock().len())
            .field("routes", &self.routes.lock().len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl NotificationBridge {
    pub fn new(backend: Arc<dyn NotifyBackend>, enabled: bool) -> Arc<Self> {
        let bridge = Arc::new(Self {
            backend,
            registry: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            next_packet_id: AtomicU32::new(0),
            enabled,
        });
        let sink: Weak<dyn NotifySink> = Arc::downgrade(&bridge) as Weak<dyn NotifySink>;
        bridge.backend.attach(sink);
        bridge
    }

    pub fn is_supported(&self) -> bool {
        self.enabled && self.backend.is_supported()
    }

    /// Diff the registry against a fresh share list: shares that went
    /// away are unregistered, new ones registered.
    pub fn refresh_shares(&self, shares: &[ShareInfo]) {
        if !self.is_supported() {
            return;
        }

        let mut registry = self.registry.lock();

        let removed: Vec<String> = registry
            .keys()
            .filter(|name| !shares.iter().any(|s| &s.name == *name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(handle) = registry.remove(&name) {
                if let Err(e) = self.backend.unregister_share(handle) {
                    warn!("failed to unregister share {} from notifications: {}", name, e);
                }
                self.routes.lock().retain(|_, route| route.share != name);
                info!("share {} removed from notification registry", name);
            }
        }

        for share in shares {
            if registry.contains_key(&share.name) {
                continue;
            }
            match self.backend.register_share(&share.name, &share.root) {
                Ok(handle) => {
                    registry.insert(share.name.clone(), handle);
                    info!("share {} added to notification registry", share.name);
                }
                Err(e) => warn!("failed to register share {} for notifications: {}", share.name, e),
            }
        }
    }

    pub fn registered_shares(&self) -> Vec<String> {
        let mut names: Vec<_> = self.registry.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Watch `relative` inside `share` on behalf of `session`.
    pub fn subscribe(
        &self,
        session: &Arc<Session>,
        share: &str,
        relative: &Path,
        events: u32,
        recursive: bool,
    ) -> HgfsResult<SubscriberId> {
        if !self.is_supported() {
            return Err(HgfsError::NotSupported("change notification".into()));
        }
        let handle = self
            .registry
            .lock()
            .get(share)
            .copied()
            .ok_or_else(|| HgfsError::FileNotFound(share.to_string()))?;

        let id = self
            .backend
            .add_subscriber(handle, relative, events, recursive)?;
        self.routes.lock().insert(
            id,
            Route {
                session: Arc::downgrade(session),
                share: share.to_string(),
            },
        );
        debug!(
            "session {:#x} watching {}:{:?} as {}",
            session.id(),
            share,
            relative,
            id
        );
        Ok(id)
    }

    pub fn unsubscribe(&self, subscriber: SubscriberId) -> HgfsResult<()> {
        self.routes.lock().remove(&subscriber);
        self.backend.remove_subscriber(subscriber)
    }

    pub fn pause(&self) {
        self.backend.pause();
    }

    pub fn resume(&self) {
        self.backend.resume();
    }

    /// Unregister every share.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock();
        for (name, handle) in registry.drain() {
            if let Err(e) = self.backend.unregister_share(handle) {
                warn!("failed to unregister share {}: {}", name, e);
            }
        }
        self.routes.lock().clear();
    }
}

impl NotifySink for NotificationBridge {
    fn deliver(&self, event: NotifyEvent) {
        let route = self
            .routes
            .lock()
            .get(&event.subscriber)
            .and_then(|route| route.session.upgrade());
        let Some(session) = route else {
            debug!("event for stale subscriber {}", event.subscriber);
            return;
        };

        let packet = NotifyPacket {
            request_id: self.next_packet_id.fetch_add(1, Ordering::Relaxed),
            session_id: session.id(),
            watch_id: event.subscriber,
            share: &event.share_name,
            relative: &event.relative_path,
            mask: event.mask,
            overflow: event.overflow,
        }
        .encode();

        if let Err(e) = session.send_unsolicited(packet) {
            error!(
                "failed to send notification for subscriber {}: {}",
                event.subscriber, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct CountingSink(AtomicUsize, Mutex<Vec<NotifyEvent>>);

    impl NotifySink for CountingSink {
        fn deliver(&self, event: NotifyEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1.lock().push(event);
        }
    }

    #[test]
    fn paused_backend_queues_events_in_order() {
        let backend = MemoryNotifier::new();
        let sink = Arc::new(CountingSink::default());
        let weak: Weak<dyn NotifySink> = Arc::downgrade(&sink) as Weak<dyn NotifySink>;
        backend.attach(weak);

        let share = backend.register_share("docs", Path::new("/tmp")).unwrap();
        let sub = backend
            .add_subscriber(share, Path::new("dir"), NotifyMask::SIZE.bits(), false)
            .unwrap();

        backend.pause();
        backend.fire(sub, Path::new("a"), NotifyMask::SIZE.bits(), false).unwrap();
        backend.fire(sub, Path::new("b"), NotifyMask::SIZE.bits(), true).unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);

        backend.resume();
        let events = sink.1.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].relative_path, PathBuf::from("dir/a"));
        assert!(events[1].overflow);
        assert_eq!(events[1].share_name, "docs");
    }

    #[test]
    fn unmatched_mask_is_filtered() {
        let backend = MemoryNotifier::new();
        let sink = Arc::new(CountingSink::default());
        backend.attach(Arc::downgrade(&sink) as Weak<dyn NotifySink>);
        let share = backend.register_share("docs", Path::new("/tmp")).unwrap();
        let sub = backend
            .add_subscriber(share, Path::new(""), NotifyMask::ADDED.bits(), false)
            .unwrap();
        backend.fire(sub, Path::new("x"), NotifyMask::REMOVED.bits(), false).unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registry_follows_share_list() {
        let backend = Arc::new(MemoryNotifier::new());
        let bridge = NotificationBridge::new(backend.clone(), true);

        bridge.refresh_shares(&[ShareInfo::new("a", "/a"), ShareInfo::new("b", "/b")]);
        assert_eq!(bridge.registered_shares(), vec!["a", "b"]);

        bridge.refresh_shares(&[ShareInfo::new("b", "/b"), ShareInfo::new("c", "/c")]);
        assert_eq!(bridge.registered_shares(), vec!["b", "c"]);
        assert_eq!(backend.share_names(), vec!["b", "c"]);
    }

    #[test]
    fn disabled_bridge_registers_nothing() {
        let backend = Arc::new(MemoryNotifier::new());
        let bridge = NotificationBridge::new(backend.clone(), false);
        bridge.refresh_shares(&[ShareInfo::new("a", "/a")]);
        assert!(bridge.registered_shares().is_empty());
        assert!(!bridge.is_supported());
    }
}
