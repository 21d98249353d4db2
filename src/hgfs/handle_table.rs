//! Open-file handle table with a bounded descriptor cache.
//!
//! Every open file is a `FileNode`. A node holds an OS descriptor only
//! while it sits in the cache; the cache is bounded, and when it is
//! full the least recently used evictable node has its descriptor
//! closed. An evicted node stays open from the client's point of view
//! and is transparently reopened on its next use.

use std::collections::VecDeque;
use std::path::Path;

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::platform::{Platform, PlatformFile};
use crate::hgfs::policy::ShareInfo;
use crate::hgfs::slots::{SlotKey, Slots};
use crate::hgfs::types::{
    HandleCounter, HgfsHandle, LocalId, OpenDisposition, OpenInfo, OpenMode, OpenModeFlags,
    ServerLock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unused,
    InUseNotCached,
    InUseCached,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u32 {
        const APPEND = 1 << 0;
        const SEQUENTIAL = 1 << 1;
        /// The node is the root directory of a share.
        const SHARED_FOLDER_OPEN = 1 << 2;
    }
}

#[derive(Debug)]
pub struct FileNode {
    pub handle: HgfsHandle,
    pub utf8_name: String,
    pub local_id: LocalId,
    pub share_name: String,
    pub share_root: String,
    pub share_readable: bool,
    pub share_writable: bool,
    pub mode: OpenMode,
    pub state: NodeState,
    pub flags: NodeFlags,
    pub server_lock: ServerLock,
    descriptor: Option<Box<dyn PlatformFile>>,
}

impl FileNode {
    pub fn is_cached(&self) -> bool {
        self.state == NodeState::InUseCached
    }

    fn is_evictable(&self) -> bool {
        self.server_lock == ServerLock::None
            && !self.flags.contains(NodeFlags::SEQUENTIAL)
            && !self.descriptor.as_ref().is_some_and(|d| d.is_stateful())
    }

    fn reopen_info(&self) -> OpenInfo {
        OpenInfo {
            local_path: self.utf8_name.clone().into(),
            mode: self.mode,
            disposition: OpenDisposition::Open,
            server_lock: ServerLock::None,
        }
    }
}

/// A failed `allocate` hands the descriptor back so the caller can
/// close it.
#[derive(Debug)]
pub struct AllocError {
    pub error: HgfsError,
    pub descriptor: Box<dyn PlatformFile>,
}

fn try_copy(s: &str) -> HgfsResult<String> {
    let mut copy = String::new();
    copy.try_reserve_exact(s.len())
        .map_err(|_| HgfsError::OutOfMemory)?;
    copy.push_str(s);
    Ok(copy)
}

#[derive(Debug)]
pub struct NodeTable {
    nodes: Slots<FileNode>,
    /// Cached nodes, least recently used first.
    cache: VecDeque<SlotKey>,
    max_cached: usize,
    max_locked: usize,
    locked_cached: usize,
}

impl NodeTable {
    pub fn new(initial: usize, max_cached: usize, max_locked: usize) -> HgfsResult<Self> {
        Ok(Self {
            nodes: Slots::with_capacity(initial)?,
            cache: VecDeque::with_capacity(max_cached),
            max_cached,
            max_locked,
            locked_cached: 0,
        })
    }

    /// Take a node off the free list for a freshly opened descriptor.
    /// The node starts out `InUseNotCached`.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate(
        &mut self,
        counter: &HandleCounter,
        open: &OpenInfo,
        local_id: LocalId,
        descriptor: Box<dyn PlatformFile>,
        append: bool,
        share: &ShareInfo,
        shared_folder_open: bool,
    ) -> Result<HgfsHandle, AllocError> {
        let strings = (|| {
            Ok::<_, HgfsError>((
                try_copy(&open.local_path.to_string_lossy())?,
                try_copy(&share.name)?,
                try_copy(&share.root.to_string_lossy())?,
            ))
        })();
        let (utf8_name, share_name, share_root) = match strings {
            Ok(strings) => strings,
            Err(error) => return Err(AllocError { error, descriptor }),
        };

        let mut flags = NodeFlags::empty();
        if append {
            flags |= NodeFlags::APPEND;
        }
        if open.mode.flags.contains(OpenModeFlags::SEQUENTIAL) {
            flags |= NodeFlags::SEQUENTIAL;
        }
        if shared_folder_open {
            flags |= NodeFlags::SHARED_FOLDER_OPEN;
        }

        let handle = counter.next();
        let node = FileNode {
            handle,
            utf8_name,
            local_id,
            share_name,
            share_root,
            share_readable: share.readable,
            share_writable: share.writable,
            mode: open.mode,
            state: NodeState::InUseNotCached,
            flags,
            server_lock: open.server_lock,
            descriptor: None,
        };

        match self.nodes.try_insert(node) {
            Ok(key) => {
                if let Some(node) = self.nodes.get_mut(key) {
                    node.descriptor = Some(descriptor);
                }
                debug!("allocated node {} for {:?}", handle, open.local_path);
                Ok(handle)
            }
            Err((error, _)) => Err(AllocError { error, descriptor }),
        }
    }

    /// Linear scan over in-use nodes.
    fn key_of(&self, handle: HgfsHandle) -> Option<SlotKey> {
        self.nodes
            .iter()
            .find(|(_, node)| node.handle == handle)
            .map(|(key, _)| key)
    }

    pub fn lookup(&self, handle: HgfsHandle) -> HgfsResult<&FileNode> {
        self.key_of(handle)
            .and_then(|key| self.nodes.get(key))
            .ok_or(HgfsError::InvalidHandle(handle))
    }

    pub fn lookup_mut(&mut self, handle: HgfsHandle) -> HgfsResult<&mut FileNode> {
        let key = self.key_of(handle).ok_or(HgfsError::InvalidHandle(handle))?;
        self.nodes
            .get_mut(key)
            .ok_or(HgfsError::InvalidHandle(handle))
    }

    pub fn is_cached(&self, handle: HgfsHandle) -> bool {
        self.lookup(handle).is_ok_and(FileNode::is_cached)
    }

    /// Put a node at the most-recently-used end of the cache, evicting
    /// the least recently used evictable node if the cache is full.
    pub fn add_to_cache(&mut self, handle: HgfsHandle, platform: &dyn Platform) -> HgfsResult<()> {
        let key = self.key_of(handle).ok_or(HgfsError::InvalidHandle(handle))?;
        let (cached, locked) = match self.nodes.get(key) {
            Some(node) => (node.is_cached(), node.server_lock != ServerLock::None),
            None => return Err(HgfsError::InvalidHandle(handle)),
        };

        if cached {
            self.touch(key);
            return Ok(());
        }

        if locked && self.locked_cached >= self.max_locked {
            return Err(HgfsError::CacheFull);
        }

        if self.cache.len() >= self.max_cached {
            self.evict_lru(platform)?;
        }

        self.cache.push_back(key);
        if let Some(node) = self.nodes.get_mut(key) {
            node.state = NodeState::InUseCached;
        }
        if locked {
            self.locked_cached += 1;
        }
        Ok(())
    }

    fn touch(&mut self, key: SlotKey) {
        if let Some(pos) = self.cache.iter().position(|k| *k == key) {
            self.cache.remove(pos);
            self.cache.push_back(key);
        }
    }

    /// Close the descriptor of the least recently used node that holds
    /// no server lock, no stateful descriptor and is not sequential.
    /// Skipped nodes rotate to the most-recently-used end.
    fn evict_lru(&mut self, platform: &dyn Platform) -> HgfsResult<()> {
        for _ in 0..self.cache.len() {
            let Some(key) = self.cache.pop_front() else {
                break;
            };
            let evictable = self.nodes.get(key).is_some_and(FileNode::is_evictable);
            if !evictable {
                self.cache.push_back(key);
                continue;
            }

            self.cache.push_front(key);
            let handle = self.nodes.get(key).map(|n| n.handle);
            if let Some(handle) = handle {
                info!("evicting node {} from the descriptor cache", handle);
                if let Err(e) = self.remove_from_cache(handle, platform) {
                    warn!("failed to close evicted node {}: {}", handle, e);
                }
            }
            return Ok(());
        }

        warn!(
            "too many open nodes: {} cached, none evictable",
            self.cache.len()
        );
        Err(HgfsError::CacheFull)
    }

    /// Drop a node from the cache and close its descriptor. No-op for a
    /// node that is not cached. The bookkeeping is updated even when the
    /// close fails.
    pub fn remove_from_cache(
        &mut self,
        handle: HgfsHandle,
        platform: &dyn Platform,
    ) -> HgfsResult<()> {
        let Some(key) = self.key_of(handle) else {
            return Ok(());
        };
        let descriptor = match self.nodes.get_mut(key) {
            Some(node) if node.is_cached() => {
                node.state = NodeState::InUseNotCached;
                if node.server_lock != ServerLock::None {
                    self.locked_cached -= 1;
                }
                node.descriptor.take()
            }
            _ => return Ok(()),
        };
        if let Some(pos) = self.cache.iter().position(|k| *k == key) {
            self.cache.remove(pos);
        }

        match descriptor {
            Some(descriptor) => platform.close(descriptor).map_err(HgfsError::from),
            None => Ok(()),
        }
    }

    /// Return a node to the free list. A descriptor the node still holds
    /// is handed back for the caller to close.
    pub fn free(&mut self, handle: HgfsHandle) -> HgfsResult<Option<Box<dyn PlatformFile>>> {
        let key = self.key_of(handle).ok_or(HgfsError::InvalidHandle(handle))?;
        if let Some(pos) = self.cache.iter().position(|k| *k == key) {
            self.cache.remove(pos);
            if self
                .nodes
                .get(key)
                .is_some_and(|n| n.server_lock != ServerLock::None)
            {
                self.locked_cached -= 1;
            }
        }
        let node = self
            .nodes
            .remove(key)
            .ok_or(HgfsError::InvalidHandle(handle))?;
        debug!("freed node {}", handle);
        Ok(node.descriptor)
    }

    /// Remove from cache and free in one go (client close). The handle is
    /// gone once this returns `Ok`; a failed descriptor close is logged,
    /// not reported.
    pub fn close(&mut self, handle: HgfsHandle, platform: &dyn Platform) -> HgfsResult<()> {
        self.lookup(handle)?;
        if let Err(e) = self.remove_from_cache(handle, platform) {
            warn!("failed to close node {}: {}", handle, e);
        }
        if let Some(descriptor) = self.free(handle)? {
            if let Err(e) = platform.close(descriptor) {
                warn!("failed to close node {}: {}", handle, e);
            }
        }
        Ok(())
    }

    /// Descriptor for `handle`, reopening and re-caching an evicted node.
    pub fn descriptor(
        &mut self,
        handle: HgfsHandle,
        platform: &dyn Platform,
    ) -> HgfsResult<&mut (dyn PlatformFile + 'static)> {
        let key = self.key_of(handle).ok_or(HgfsError::InvalidHandle(handle))?;
        let needs_reopen = self
            .nodes
            .get(key)
            .is_some_and(|node| node.descriptor.is_none());

        if needs_reopen {
            let info = self
                .nodes
                .get(key)
                .map(FileNode::reopen_info)
                .ok_or(HgfsError::InvalidHandle(handle))?;
            let descriptor = platform.open(&info, None)?;
            debug!("reopened node {} ({:?})", handle, info.local_path);
            if let Some(node) = self.nodes.get_mut(key) {
                node.descriptor = Some(descriptor);
            }
        }

        if let Err(e) = self.add_to_cache(handle, platform) {
            if needs_reopen {
                let descriptor = self.nodes.get_mut(key).and_then(|n| n.descriptor.take());
                if let Some(descriptor) = descriptor {
                    if let Err(e) = platform.close(descriptor) {
                        warn!("failed to close reopened node {}: {}", handle, e);
                    }
                }
            }
            return Err(e);
        }

        self.nodes
            .get_mut(key)
            .and_then(|node| node.descriptor.as_deref_mut())
            .ok_or(HgfsError::InvalidHandle(handle))
    }

    pub fn can_grant_lock(&self) -> bool {
        self.locked_cached < self.max_locked
    }

    /// Change a node's server lock. Granting requires the node to be
    /// cached and room under the locked-node bound.
    pub fn set_server_lock(&mut self, handle: HgfsHandle, lock: ServerLock) -> HgfsResult<ServerLock> {
        let can_grant = self.can_grant_lock();
        let key = self.key_of(handle).ok_or(HgfsError::InvalidHandle(handle))?;
        let node = self
            .nodes
            .get_mut(key)
            .ok_or(HgfsError::InvalidHandle(handle))?;
        let was_locked = node.server_lock != ServerLock::None;
        let cached = node.is_cached();

        match (was_locked, lock != ServerLock::None) {
            (false, true) => {
                if !cached || !can_grant {
                    return Ok(node.server_lock);
                }
                node.server_lock = lock;
                self.locked_cached += 1;
            }
            (true, false) => {
                node.server_lock = ServerLock::None;
                if cached {
                    self.locked_cached -= 1;
                }
            }
            _ => node.server_lock = lock,
        }
        Ok(lock)
    }

    /// Some open node on `path` holds a server lock.
    pub fn has_server_lock(&self, path: &Path) -> bool {
        self.nodes
            .iter()
            .any(|(_, n)| n.server_lock != ServerLock::None && Path::new(&n.utf8_name) == path)
    }

    /// Rewrite the names of nodes at or below `from` after a rename.
    pub fn rename_nodes(&mut self, from: &Path, to: &Path) {
        for (_, node) in self.nodes.iter_mut() {
            let renamed = Path::new(&node.utf8_name)
                .strip_prefix(from)
                .ok()
                .map(|rest| {
                    if rest.as_os_str().is_empty() {
                        to.to_path_buf()
                    } else {
                        to.join(rest)
                    }
                });
            if let Some(new_name) = renamed {
                node.utf8_name = new_name.to_string_lossy().to_string();
            }
        }
    }

    /// Close and free every node whose share fails `keep`.
    pub fn invalidate(
        &mut self,
        platform: &dyn Platform,
        mut keep: impl FnMut(&FileNode) -> bool,
    ) -> usize {
        let stale: Vec<HgfsHandle> = self
            .nodes
            .iter()
            .filter(|(_, node)| !keep(node))
            .map(|(_, node)| node.handle)
            .collect();
        for handle in &stale {
            if let Err(e) = self.close(*handle, platform) {
                warn!("failed to close invalidated node {}: {}", handle, e);
            }
        }
        stale.len()
    }

    /// Close every descriptor held by the cache (inactive session).
    pub fn flush_cache(&mut self, platform: &dyn Platform) {
        let handles: Vec<HgfsHandle> = self
            .cache
            .iter()
            .filter_map(|key| self.nodes.get(*key))
            .filter(|node| node.is_evictable())
            .map(|node| node.handle)
            .collect();
        for handle in handles {
            if let Err(e) = self.remove_from_cache(handle, platform) {
                warn!("failed to close node {}: {}", handle, e);
            }
        }
    }

    pub fn close_all(&mut self, platform: &dyn Platform) -> usize {
        self.invalidate(platform, |_| false)
    }

    pub fn handles(&self) -> Vec<HgfsHandle> {
        self.nodes.iter().map(|(_, node)| node.handle).collect()
    }

    pub fn slot_of(&self, handle: HgfsHandle) -> Option<SlotKey> {
        self.key_of(handle)
    }

    pub fn state_at(&self, index: u32) -> NodeState {
        if self.nodes.is_vacant(index) {
            return NodeState::Unused;
        }
        self.nodes
            .iter()
            .find(|(key, _)| key.index() == index)
            .map(|(_, node)| node.state)
            .unwrap_or(NodeState::Unused)
    }

    pub fn free_head(&self) -> Option<u32> {
        self.nodes.free_head()
    }

    pub fn in_use(&self) -> usize {
        self.nodes.len()
    }

    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn locked_count(&self) -> usize {
        self.locked_cached
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;
    use crate::hgfs::test_support::MockPlatform;
    use crate::hgfs::types::AccessMode;

    fn open_info(path: &str, flags: OpenModeFlags, lock: ServerLock) -> OpenInfo {
        OpenInfo {
            local_path: PathBuf::from(path),
            mode: OpenMode {
                access: AccessMode::ReadWrite,
                flags,
            },
            disposition: OpenDisposition::Open,
            server_lock: lock,
        }
    }

    fn share() -> ShareInfo {
        ShareInfo::new("docs", "/share")
    }

    fn open(
        table: &mut NodeTable,
        counter: &HandleCounter,
        platform: &MockPlatform,
        path: &str,
    ) -> HgfsHandle {
        let handle = table
            .allocate(
                counter,
                &open_info(path, OpenModeFlags::empty(), ServerLock::None),
                LocalId::default(),
                platform.file(path),
                false,
                &share(),
                false,
            )
            .unwrap();
        table.add_to_cache(handle, platform).unwrap();
        handle
    }

    #[test]
    fn allocate_then_free_returns_node_to_free_list() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(4, 4, 2).unwrap();

        let h1 = table
            .allocate(
                &counter,
                &open_info("/share/a", OpenModeFlags::empty(), ServerLock::None),
                LocalId::default(),
                platform.file("/share/a"),
                false,
                &share(),
                false,
            )
            .unwrap();
        let slot = table.slot_of(h1).unwrap();
        assert_eq!(table.state_at(slot.index()), NodeState::InUseNotCached);
        assert_eq!(table.lookup(h1).unwrap().share_name, "docs");

        let leftover = table.free(h1).unwrap();
        assert!(leftover.is_some());
        assert_eq!(table.state_at(slot.index()), NodeState::Unused);
        assert_eq!(table.free_head(), Some(slot.index()));
        assert!(matches!(table.lookup(h1), Err(HgfsError::InvalidHandle(_))));
    }

    #[test]
    fn live_handles_are_unique_across_reuse_and_growth() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(2, 64, 2).unwrap();

        let mut live = Vec::new();
        for round in 0..5 {
            for i in 0..6 {
                live.push(open(&mut table, &counter, &platform, &format!("/share/{round}-{i}")));
            }
            for handle in live.drain(..3).collect::<Vec<_>>() {
                table.close(handle, &platform).unwrap();
            }
            let unique: HashSet<_> = table.handles().into_iter().collect();
            assert_eq!(unique.len(), table.in_use());
        }
        assert!(table.capacity() >= table.in_use());
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(8, 3, 1).unwrap();

        let a = open(&mut table, &counter, &platform, "/share/a");
        let b = open(&mut table, &counter, &platform, "/share/b");
        let c = open(&mut table, &counter, &platform, "/share/c");
        // a becomes most recently used
        table.add_to_cache(a, &platform).unwrap();

        let d = open(&mut table, &counter, &platform, "/share/d");
        assert_eq!(table.cached_count(), 3);
        assert!(!table.is_cached(b));
        assert!(table.is_cached(a) && table.is_cached(c) && table.is_cached(d));
        assert_eq!(platform.closed_paths(), vec![PathBuf::from("/share/b")]);
        // evicted node is still open for the client
        assert_eq!(table.lookup(b).unwrap().state, NodeState::InUseNotCached);
    }

    #[test]
    fn eviction_skips_locked_sequential_and_stateful_nodes() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(8, 4, 2).unwrap();

        let locked = table
            .allocate(
                &counter,
                &open_info("/share/locked", OpenModeFlags::empty(), ServerLock::Exclusive),
                LocalId::default(),
                platform.file("/share/locked"),
                false,
                &share(),
                false,
            )
            .unwrap();
        table.add_to_cache(locked, &platform).unwrap();
        assert_eq!(table.locked_count(), 1);

        let seq = table
            .allocate(
                &counter,
                &open_info("/share/seq", OpenModeFlags::SEQUENTIAL, ServerLock::None),
                LocalId::default(),
                platform.file("/share/seq"),
                false,
                &share(),
                false,
            )
            .unwrap();
        table.add_to_cache(seq, &platform).unwrap();

        let ctx = table
            .allocate(
                &counter,
                &open_info("/share/ctx", OpenModeFlags::empty(), ServerLock::None),
                LocalId::default(),
                platform.stateful_file("/share/ctx"),
                false,
                &share(),
                false,
            )
            .unwrap();
        table.add_to_cache(ctx, &platform).unwrap();

        let plain = open(&mut table, &counter, &platform, "/share/plain");
        let next = open(&mut table, &counter, &platform, "/share/next");

        assert!(!table.is_cached(plain));
        assert!(table.is_cached(locked) && table.is_cached(seq) && table.is_cached(ctx));
        assert!(table.is_cached(next));

        // nothing left that may be evicted
        table.set_server_lock(next, ServerLock::Shared).unwrap();
        let extra = table
            .allocate(
                &counter,
                &open_info("/share/extra", OpenModeFlags::empty(), ServerLock::None),
                LocalId::default(),
                platform.file("/share/extra"),
                false,
                &share(),
                false,
            )
            .unwrap();
        assert!(matches!(
            table.add_to_cache(extra, &platform),
            Err(HgfsError::CacheFull)
        ));
        assert!(table.cached_count() <= 4);
        assert!(table.locked_count() <= 2);
    }

    #[test]
    fn remove_from_cache_is_idempotent() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(4, 4, 1).unwrap();
        let a = open(&mut table, &counter, &platform, "/share/a");

        table.remove_from_cache(a, &platform).unwrap();
        table.remove_from_cache(a, &platform).unwrap();
        table.remove_from_cache(9999, &platform).unwrap();
        assert_eq!(platform.closed_paths().len(), 1);
        assert_eq!(table.cached_count(), 0);
    }

    #[test]
    fn close_frees_node_even_when_descriptor_close_fails() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(4, 4, 1).unwrap();
        let a = open(&mut table, &counter, &platform, "/share/a");

        platform.fail_close.store(true, std::sync::atomic::Ordering::SeqCst);
        table.close(a, &platform).unwrap();
        assert!(matches!(table.lookup(a), Err(HgfsError::InvalidHandle(_))));
        assert_eq!(table.cached_count(), 0);
        assert_eq!(table.in_use(), 0);
    }

    #[test]
    fn evicted_node_is_reopened_on_use() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(4, 1, 1).unwrap();
        let a = open(&mut table, &counter, &platform, "/share/a");
        let _b = open(&mut table, &counter, &platform, "/share/b");
        assert!(!table.is_cached(a));

        table.descriptor(a, &platform).unwrap();
        assert!(table.is_cached(a));
        assert_eq!(platform.opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn locked_bound_limits_grants() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(4, 4, 1).unwrap();
        let a = open(&mut table, &counter, &platform, "/share/a");
        let b = open(&mut table, &counter, &platform, "/share/b");

        assert_eq!(table.set_server_lock(a, ServerLock::Exclusive).unwrap(), ServerLock::Exclusive);
        assert_eq!(table.set_server_lock(b, ServerLock::Exclusive).unwrap(), ServerLock::None);
        assert!(table.has_server_lock(Path::new("/share/a")));

        table.set_server_lock(a, ServerLock::None).unwrap();
        assert_eq!(table.locked_count(), 0);
    }

    #[test]
    fn rename_updates_open_node_names() {
        let platform = MockPlatform::default();
        let counter = HandleCounter::default();
        let mut table = NodeTable::new(4, 4, 1).unwrap();
        let a = open(&mut table, &counter, &platform, "/share/dir/a");
        let other = open(&mut table, &counter, &platform, "/share/other");

        table.rename_nodes(Path::new("/share/dir"), Path::new("/share/moved"));
        assert_eq!(table.lookup(a).unwrap().utf8_name, "/share/moved/a");
        assert_eq!(table.lookup(other).unwrap().utf8_name, "/share/other");
    }
}
