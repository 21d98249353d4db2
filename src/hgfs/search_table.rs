//! Active directory searches.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::platform::Platform;
use crate::hgfs::slots::Slots;
use crate::hgfs::types::{DirEntry, HandleCounter, HgfsHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// The base namespace: the list of shares.
    Base,
    /// A host directory, scanned through the platform.
    RealDir,
    /// Entries produced by a caller-supplied enumerator.
    Virtual,
}

/// Produces the entries of a synthetic listing. Called again on restart.
pub type Enumerator = Box<dyn FnMut() -> HgfsResult<Vec<DirEntry>> + Send>;

pub struct Search {
    pub handle: HgfsHandle,
    pub utf8_dir: PathBuf,
    pub share_name: String,
    pub share_root: PathBuf,
    pub kind: SearchKind,
    /// `None` until the first read populates it.
    entries: Option<Vec<DirEntry>>,
    /// The client has read past the last entry.
    read_all: bool,
    enumerator: Option<Enumerator>,
}

impl fmt::Debug for Search {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Search")
            .field("handle", &self.handle)
            .field("utf8_dir", &self.utf8_dir)
            .field("share_name", &self.share_name)
            .field("kind", &self.kind)
            .field("entries", &self.entries.as_ref().map(Vec::len))
            .field("read_all", &self.read_all)
            .finish()
    }
}

impl Search {
    fn populate(&mut self, platform: &dyn Platform) -> HgfsResult<()> {
        let entries = match (self.kind, self.enumerator.as_mut()) {
            (SearchKind::RealDir, _) => platform.scan_dir(&self.utf8_dir)?,
            (_, Some(enumerate)) => enumerate()?,
            (_, None) => Vec::new(),
        };
        debug!(
            "search {} populated with {} entries",
            self.handle,
            entries.len()
        );
        self.entries = Some(entries);
        self.read_all = false;
        Ok(())
    }

    /// Discard scanned entries and scan again.
    pub fn restart(&mut self, platform: &dyn Platform) -> HgfsResult<()> {
        self.entries = None;
        self.populate(platform)
    }

    /// A second full read of an exhausted synthetic listing starts over
    /// so the client never sees a stale share list.
    fn needs_restart(&self, index: u32) -> bool {
        index == 0 && self.read_all && self.kind != SearchKind::RealDir
    }

    fn prepare(&mut self, index: u32, platform: &dyn Platform) -> HgfsResult<&[DirEntry]> {
        if self.entries.is_none() {
            self.populate(platform)?;
        } else if self.needs_restart(index) {
            debug!("restarting search {}", self.handle);
            self.restart(platform)?;
        }
        Ok(self.entries.as_deref().unwrap_or(&[]))
    }

    /// Entry at `index`, or `None` past the end.
    pub fn entry(&mut self, index: u32, platform: &dyn Platform) -> HgfsResult<Option<DirEntry>> {
        let entry = self.prepare(index, platform)?.get(index as usize).cloned();
        if entry.is_none() {
            self.read_all = true;
        }
        Ok(entry)
    }

    /// Entries from `start` to the end.
    pub fn entries_from(
        &mut self,
        start: u32,
        platform: &dyn Platform,
    ) -> HgfsResult<Vec<DirEntry>> {
        let entries = self
            .prepare(start, platform)?
            .get(start as usize..)
            .map(<[DirEntry]>::to_vec)
            .unwrap_or_default();
        Ok(entries)
    }

    /// Record that the client was handed the final entry.
    pub fn mark_read_all(&mut self) {
        self.read_all = true;
    }

    pub fn is_populated(&self) -> bool {
        self.entries.is_some()
    }
}

#[derive(Debug)]
pub struct SearchTable {
    searches: Slots<Search>,
}

impl SearchTable {
    pub fn new(initial: usize) -> HgfsResult<Self> {
        Ok(Self {
            searches: Slots::with_capacity(initial)?,
        })
    }

    fn insert(
        &mut self,
        counter: &HandleCounter,
        dir: &Path,
        share_name: &str,
        share_root: &Path,
        kind: SearchKind,
        enumerator: Option<Enumerator>,
    ) -> HgfsResult<HgfsHandle> {
        let mut share = String::new();
        share
            .try_reserve_exact(share_name.len())
            .map_err(|_| HgfsError::OutOfMemory)?;
        share.push_str(share_name);

        let handle = counter.next();
        self.searches.insert(Search {
            handle,
            utf8_dir: dir.to_path_buf(),
            share_name: share,
            share_root: share_root.to_path_buf(),
            kind,
            entries: None,
            read_all: false,
            enumerator,
        })?;
        debug!("allocated {:?} search {} for {:?}", kind, handle, dir);
        Ok(handle)
    }

    /// Search over a host directory; entries are scanned on first read.
    pub fn allocate_dir(
        &mut self,
        counter: &HandleCounter,
        dir: &Path,
        share_name: &str,
        share_root: &Path,
    ) -> HgfsResult<HgfsHandle> {
        self.insert(counter, dir, share_name, share_root, SearchKind::RealDir, None)
    }

    /// Search over the base namespace.
    pub fn allocate_base(
        &mut self,
        counter: &HandleCounter,
        enumerator: Enumerator,
    ) -> HgfsResult<HgfsHandle> {
        self.insert(
            counter,
            Path::new(""),
            "",
            Path::new(""),
            SearchKind::Base,
            Some(enumerator),
        )
    }

    /// Search over a synthetic listing inside a share.
    pub fn allocate_virtual(
        &mut self,
        counter: &HandleCounter,
        dir: &Path,
        share_name: &str,
        share_root: &Path,
        enumerator: Enumerator,
    ) -> HgfsResult<HgfsHandle> {
        self.insert(
            counter,
            dir,
            share_name,
            share_root,
            SearchKind::Virtual,
            Some(enumerator),
        )
    }

    pub fn lookup(&self, handle: HgfsHandle) -> HgfsResult<&Search> {
        self.searches
            .iter()
            .find(|(_, search)| search.handle == handle)
            .map(|(_, search)| search)
            .ok_or(HgfsError::InvalidHandle(handle))
    }

    pub fn lookup_mut(&mut self, handle: HgfsHandle) -> HgfsResult<&mut Search> {
        self.searches
            .iter_mut()
            .find(|(_, search)| search.handle == handle)
            .map(|(_, search)| search)
            .ok_or(HgfsError::InvalidHandle(handle))
    }

    pub fn free(&mut self, handle: HgfsHandle) -> HgfsResult<()> {
        let key = self
            .searches
            .iter()
            .find(|(_, search)| search.handle == handle)
            .map(|(key, _)| key)
            .ok_or(HgfsError::InvalidHandle(handle))?;
        self.searches.remove(key);
        debug!("freed search {}", handle);
        Ok(())
    }

    /// Free every search whose share fails `keep`. Base searches are
    /// never tied to a share and always survive.
    pub fn invalidate(&mut self, mut keep: impl FnMut(&Search) -> bool) -> usize {
        let stale: Vec<_> = self
            .searches
            .iter()
            .filter(|(_, search)| search.kind != SearchKind::Base && !keep(search))
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.searches.remove(*key);
        }
        stale.len()
    }

    pub fn close_all(&mut self) -> usize {
        let keys = self.searches.keys();
        for key in &keys {
            self.searches.remove(*key);
        }
        keys.len()
    }

    pub fn handles(&self) -> Vec<HgfsHandle> {
        self.searches.iter().map(|(_, s)| s.handle).collect()
    }

    pub fn free_head(&self) -> Option<u32> {
        self.searches.free_head()
    }

    pub fn in_use(&self) -> usize {
        self.searches.len()
    }
}
