//! Platform I/O seam.
//!
//! The engine never touches the host filesystem directly; every syscall
//! goes through `Platform`. `LocalPlatform` is the `std::fs` backed
//! implementation used by the binary and the integration tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::file_info::FileInfo;
use crate::hgfs::types::{
    AttrMask, DirEntry, FileAttr, LocalId, OpenDisposition, OpenInfo, OpenModeFlags, VolumeInfo,
};
use crate::hgfs::utils::metadata::MetadataConverter;

/// An open host file (the OS descriptor held by a cached node).
pub trait PlatformFile: Send + std::fmt::Debug {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write all of `data`; files opened for append ignore `offset`.
    fn write_at(&mut self, data: &[u8], offset: u64) -> io::Result<usize>;

    fn attributes(&self) -> io::Result<FileAttr>;

    fn set_attributes(&mut self, attr: &FileAttr, changes: AttrMask) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;

    fn local_id(&self) -> LocalId;

    /// True when the descriptor carries OS state that a reopen would
    /// lose; such nodes are never evicted from the cache.
    fn is_stateful(&self) -> bool {
        false
    }
}

pub trait Platform: Send + Sync {
    /// Open `info.local_path`; `create_perms` are unix mode bits used
    /// when the file is created.
    fn open(&self, info: &OpenInfo, create_perms: Option<u32>) -> io::Result<Box<dyn PlatformFile>>;

    fn close(&self, file: Box<dyn PlatformFile>) -> io::Result<()>;

    fn stat(&self, path: &Path, follow_symlinks: bool) -> io::Result<FileAttr>;

    fn set_attributes(&self, path: &Path, attr: &FileAttr, changes: AttrMask) -> io::Result<()>;

    /// Entries of a directory, including `.` and `..`.
    fn scan_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn create_dir(&self, path: &Path, perms: Option<u32>) -> io::Result<()>;

    fn symlink(&self, link: &Path, target: &Path) -> io::Result<()>;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    fn volume_info(&self, path: &Path) -> io::Result<VolumeInfo>;

    /// Canonical form of an existing path.
    fn real_path(&self, path: &Path) -> io::Result<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPlatform;

impl LocalPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn read_only_disposition(opts: &mut fs::OpenOptions, disposition: OpenDisposition) {
    use std::os::unix::fs::OpenOptionsExt;

    let flags = match disposition {
        OpenDisposition::Open => 0,
        OpenDisposition::OpenEmpty => libc::O_TRUNC,
        OpenDisposition::OpenCreate => libc::O_CREAT,
        OpenDisposition::OpenCreateSafe => libc::O_CREAT | libc::O_EXCL,
        OpenDisposition::OpenCreateEmpty => libc::O_CREAT | libc::O_TRUNC,
    };
    opts.custom_flags(flags);
}

#[cfg(not(unix))]
fn read_only_disposition(opts: &mut fs::OpenOptions, disposition: OpenDisposition) {
    match disposition {
        OpenDisposition::Open => {}
        OpenDisposition::OpenEmpty => {
            opts.write(true).truncate(true);
        }
        OpenDisposition::OpenCreate => {
            opts.write(true).create(true);
        }
        OpenDisposition::OpenCreateSafe => {
            opts.write(true).create_new(true);
        }
        OpenDisposition::OpenCreateEmpty => {
            opts.write(true).create(true).truncate(true);
        }
    }
}

impl Platform for LocalPlatform {
    fn open(&self, info: &OpenInfo, create_perms: Option<u32>) -> io::Result<Box<dyn PlatformFile>> {
        let append = info.mode.flags.contains(OpenModeFlags::APPEND);

        let mut opts = fs::OpenOptions::new();
        opts.read(info.mode.access.reads());
        if info.mode.access.writes() {
            if append {
                opts.append(true);
            } else {
                opts.write(true);
            }
        }

        if info.mode.access.writes() {
            match info.disposition {
                OpenDisposition::Open => {}
                OpenDisposition::OpenEmpty => {
                    opts.truncate(true);
                }
                OpenDisposition::OpenCreate => {
                    opts.create(true);
                }
                OpenDisposition::OpenCreateSafe => {
                    opts.create_new(true);
                }
                OpenDisposition::OpenCreateEmpty => {
                    opts.create(true).truncate(true);
                }
            }
        } else {
            // std refuses create/truncate without write access; open(2) does not.
            read_only_disposition(&mut opts, info.disposition);
        }

        #[cfg(unix)]
        if let Some(perms) = create_perms {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(perms);
        }
        #[cfg(not(unix))]
        let _ = create_perms;

        let file = opts.open(&info.local_path)?;
        Ok(Box::new(FileInfo::from_file(
            file,
            info.local_path.clone(),
            append,
        )?))
    }

    fn close(&self, mut file: Box<dyn PlatformFile>) -> io::Result<()> {
        // Only descriptors that were written are synced.
        let result = file.sync();
        drop(file);
        result
    }

    fn stat(&self, path: &Path, follow_symlinks: bool) -> io::Result<FileAttr> {
        let metadata = if follow_symlinks {
            fs::metadata(path)?
        } else {
            fs::symlink_metadata(path)?
        };
        Ok(MetadataConverter::to_file_attr(&metadata))
    }

    fn set_attributes(&self, path: &Path, attr: &FileAttr, changes: AttrMask) -> io::Result<()> {
        if changes.contains(AttrMask::SIZE) {
            fs::OpenOptions::new().write(true).open(path)?.set_len(attr.size)?;
        }

        let perm_bits = AttrMask::SPECIAL_PERMS
            | AttrMask::OWNER_PERMS
            | AttrMask::GROUP_PERMS
            | AttrMask::OTHER_PERMS;
        if changes.intersects(perm_bits) {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(path, fs::Permissions::from_mode(attr.unix_mode()))?;
            }
        }

        if changes.intersects(AttrMask::ACCESS_TIME | AttrMask::WRITE_TIME) {
            let mut times = fs::FileTimes::new();
            if changes.contains(AttrMask::ACCESS_TIME) {
                times = times.set_accessed(MetadataConverter::from_nt_time(attr.access_time));
            }
            if changes.contains(AttrMask::WRITE_TIME) {
                times = times.set_modified(MetadataConverter::from_nt_time(attr.write_time));
            }
            fs::File::open(path)?.set_times(times)?;
        }

        Ok(())
    }

    fn scan_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = vec![
            DirEntry::new(".", self.stat(path, true)?),
            DirEntry::new("..", self.stat(path.parent().unwrap_or(path), true)?),
        ];

        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            match entry.path().symlink_metadata() {
                Ok(metadata) => {
                    names.push(DirEntry::new(name, MetadataConverter::to_file_attr(&metadata)))
                }
                // Entry vanished between readdir and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        names.sort_by(|a, b| a.name.cmp(&b.name));
        entries.extend(names);

        debug!("scanned {:?}: {} entries", path, entries.len());
        Ok(entries)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn create_dir(&self, path: &Path, perms: Option<u32>) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        if let Some(perms) = perms {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(perms);
        }
        #[cfg(not(unix))]
        let _ = perms;
        builder.create(path)
    }

    fn symlink(&self, link: &Path, target: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }

        #[cfg(not(unix))]
        {
            let _ = (link, target);
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn volume_info(&self, path: &Path) -> io::Result<VolumeInfo> {
        #[cfg(unix)]
        {
            use std::ffi::CString;
            use std::os::unix::ffi::OsStrExt;

            let c_path = CString::new(path.as_os_str().as_bytes())
                .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
            let mut stats = std::mem::MaybeUninit::<libc::statvfs>::uninit();
            // SAFETY: c_path is NUL-terminated and stats is only read after success.
            let rc = unsafe { libc::statvfs(c_path.as_ptr(), stats.as_mut_ptr()) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: statvfs returned 0, so the struct is initialised.
            let stats = unsafe { stats.assume_init() };
            let fragment = stats.f_frsize as u64;
            Ok(VolumeInfo {
                free_bytes: (stats.f_bavail as u64).saturating_mul(fragment),
                total_bytes: (stats.f_blocks as u64).saturating_mul(fragment),
            })
        }

        #[cfg(not(unix))]
        {
            let _ = path;
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    fn real_path(&self, path: &Path) -> io::Result<PathBuf> {
        path.canonicalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hgfs::types::{AccessMode, OpenMode, ServerLock};

    fn open_info(path: PathBuf, access: AccessMode, disposition: OpenDisposition) -> OpenInfo {
        OpenInfo {
            local_path: path,
            mode: OpenMode {
                access,
                flags: OpenModeFlags::empty(),
            },
            disposition,
            server_lock: ServerLock::None,
        }
    }

    #[test]
    fn create_write_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let platform = LocalPlatform::new();
        let path = dir.path().join("a.txt");

        let mut file = platform
            .open(
                &open_info(path.clone(), AccessMode::ReadWrite, OpenDisposition::OpenCreateSafe),
                Some(0o644),
            )
            .unwrap();
        file.write_at(b"hello", 0).unwrap();

        let mut buf = [0u8; 8];
        let n = file.read_at(&mut buf, 1).unwrap();
        assert_eq!(&buf[..n], b"ello");
        platform.close(file).unwrap();

        let err = platform
            .open(
                &open_info(path, AccessMode::ReadWrite, OpenDisposition::OpenCreateSafe),
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn read_only_open_may_create() {
        let dir = tempfile::tempdir().unwrap();
        let platform = LocalPlatform::new();
        let existing = dir.path().join("exists.txt");
        fs::write(&existing, b"kept").unwrap();

        let mut file = platform
            .open(
                &open_info(existing.clone(), AccessMode::ReadOnly, OpenDisposition::OpenCreate),
                None,
            )
            .unwrap();
        let mut buf = [0u8; 8];
        let n = file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"kept");
        platform.close(file).unwrap();

        let fresh = dir.path().join("new.txt");
        let file = platform
            .open(
                &open_info(fresh.clone(), AccessMode::ReadOnly, OpenDisposition::OpenCreateSafe),
                Some(0o600),
            )
            .unwrap();
        platform.close(file).unwrap();
        assert!(fresh.is_file());

        let err = platform
            .open(
                &open_info(existing, AccessMode::ReadOnly, OpenDisposition::OpenCreateSafe),
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn scan_dir_lists_dot_entries_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();

        let names: Vec<_> = LocalPlatform::new()
            .scan_dir(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![".", "..", "a", "b"]);
    }
}
