//! In-memory platform used by unit tests to observe descriptor traffic.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::hgfs::platform::{Platform, PlatformFile};
use crate::hgfs::types::{AttrMask, DirEntry, FileAttr, LocalId, OpenInfo, VolumeInfo};

#[derive(Debug)]
pub struct MockFile {
    pub path: PathBuf,
    pub stateful: bool,
    closed: Arc<Mutex<Vec<PathBuf>>>,
}

impl PlatformFile for MockFile {
    fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
        Ok(0)
    }

    fn write_at(&mut self, data: &[u8], _offset: u64) -> io::Result<usize> {
        Ok(data.len())
    }

    fn attributes(&self) -> io::Result<FileAttr> {
        Ok(FileAttr::default())
    }

    fn set_attributes(&mut self, _attr: &FileAttr, _changes: AttrMask) -> io::Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn local_id(&self) -> LocalId {
        LocalId::default()
    }

    fn is_stateful(&self) -> bool {
        self.stateful
    }
}

#[derive(Debug, Default)]
pub struct MockPlatform {
    pub opens: AtomicUsize,
    pub closed: Arc<Mutex<Vec<PathBuf>>>,
    pub entries: Mutex<Vec<DirEntry>>,
    pub scans: AtomicUsize,
    /// Make every `close` report an error after dropping the file.
    pub fail_close: AtomicBool,
}

impl MockPlatform {
    pub fn file(&self, path: &str) -> Box<dyn PlatformFile> {
        Box::new(MockFile {
            path: PathBuf::from(path),
            stateful: false,
            closed: self.closed.clone(),
        })
    }

    pub fn stateful_file(&self, path: &str) -> Box<dyn PlatformFile> {
        Box::new(MockFile {
            path: PathBuf::from(path),
            stateful: true,
            closed: self.closed.clone(),
        })
    }

    pub fn closed_paths(&self) -> Vec<PathBuf> {
        self.closed.lock().clone()
    }
}

impl Drop for MockFile {
    fn drop(&mut self) {
        self.closed.lock().push(self.path.clone());
    }
}

fn unsupported<T>() -> io::Result<T> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

impl Platform for MockPlatform {
    fn open(&self, info: &OpenInfo, _create_perms: Option<u32>) -> io::Result<Box<dyn PlatformFile>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.file(&info.local_path.to_string_lossy()))
    }

    fn close(&self, file: Box<dyn PlatformFile>) -> io::Result<()> {
        drop(file);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::other("close failed"));
        }
        Ok(())
    }

    fn stat(&self, _path: &Path, _follow_symlinks: bool) -> io::Result<FileAttr> {
        Ok(FileAttr::default())
    }

    fn set_attributes(&self, _path: &Path, _attr: &FileAttr, _changes: AttrMask) -> io::Result<()> {
        Ok(())
    }

    fn scan_dir(&self, _path: &Path) -> io::Result<Vec<DirEntry>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().clone())
    }

    fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        unsupported()
    }

    fn remove_file(&self, _path: &Path) -> io::Result<()> {
        unsupported()
    }

    fn remove_dir(&self, _path: &Path) -> io::Result<()> {
        unsupported()
    }

    fn create_dir(&self, _path: &Path, _perms: Option<u32>) -> io::Result<()> {
        unsupported()
    }

    fn symlink(&self, _link: &Path, _target: &Path) -> io::Result<()> {
        unsupported()
    }

    fn read_link(&self, _path: &Path) -> io::Result<PathBuf> {
        unsupported()
    }

    fn volume_info(&self, _path: &Path) -> io::Result<VolumeInfo> {
        unsupported()
    }

    fn real_path(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}
