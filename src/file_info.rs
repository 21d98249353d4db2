use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use log::debug;

use crate::hgfs::platform::PlatformFile;
use crate::hgfs::types::{AttrMask, FileAttr, LocalId};
use crate::hgfs::utils::metadata::MetadataConverter;

/// A host file opened through `LocalPlatform`.
#[derive(Debug)]
pub struct FileInfo {
    pub file: fs::File,
    pub path: PathBuf,
    pub append: bool,
    local_id: LocalId,
    /// Written since the last sync.
    dirty: bool,
}

impl FileInfo {
    pub fn from_file(file: fs::File, path: PathBuf, append: bool) -> io::Result<Self> {
        let metadata = file.metadata()?;

        #[cfg(unix)]
        let local_id = {
            use std::os::unix::fs::MetadataExt;
            LocalId {
                volume_id: metadata.dev(),
                file_id: metadata.ino(),
            }
        };

        #[cfg(not(unix))]
        let local_id = {
            let _ = &metadata;
            LocalId::default()
        };

        debug!("Opened file: {:?}, id: {:?}", path, local_id);

        Ok(Self {
            file,
            path,
            append,
            local_id,
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl PlatformFile for FileInfo {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }

        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read(buf)
        }
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> io::Result<usize> {
        self.dirty = true;
        if self.append {
            self.file.write_all(data)?;
            return Ok(data.len());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.write_all_at(data, offset)?;
        }

        #[cfg(not(unix))]
        {
            use std::io::{Seek, SeekFrom};
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(data)?;
        }

        Ok(data.len())
    }

    fn attributes(&self) -> io::Result<FileAttr> {
        Ok(MetadataConverter::to_file_attr(&self.file.metadata()?))
    }

    fn set_attributes(&mut self, attr: &FileAttr, changes: AttrMask) -> io::Result<()> {
        if changes.contains(AttrMask::SIZE) {
            self.dirty = true;
            self.file.set_len(attr.size)?;
        }

        let perm_bits = AttrMask::SPECIAL_PERMS
            | AttrMask::OWNER_PERMS
            | AttrMask::GROUP_PERMS
            | AttrMask::OTHER_PERMS;
        if changes.intersects(perm_bits) {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                self.file
                    .set_permissions(fs::Permissions::from_mode(attr.unix_mode()))?;
            }
        }

        let mut times = fs::FileTimes::new();
        let mut touched = false;
        if changes.contains(AttrMask::ACCESS_TIME) {
            times = times.set_accessed(MetadataConverter::from_nt_time(attr.access_time));
            touched = true;
        }
        if changes.contains(AttrMask::WRITE_TIME) {
            times = times.set_modified(MetadataConverter::from_nt_time(attr.write_time));
            touched = true;
        }
        if touched {
            self.file.set_times(times)?;
        }

        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.dirty {
            self.file.sync_data()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn local_id(&self) -> LocalId {
        self.local_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_written_files_need_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"abc").unwrap();

        let file = fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut info = FileInfo::from_file(file, path, false).unwrap();
        let mut buf = [0u8; 3];
        info.read_at(&mut buf, 0).unwrap();
        assert!(!info.is_dirty());

        info.write_at(b"x", 0).unwrap();
        assert!(info.is_dirty());
        info.sync().unwrap();
        assert!(!info.is_dirty());
    }
}
