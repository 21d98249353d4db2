use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::error::{HgfsError, HgfsResult};

/// Wire-visible handle for an open file or an active search.
pub type HgfsHandle = u32;

/// Handle value never handed out to a client.
pub const HGFS_INVALID_HANDLE: HgfsHandle = u32::MAX;

/// Process-wide monotonic handle numbering.
///
/// Values are never reused until the counter wraps. External
/// checkpoint/restore logic persists and restores the counter through
/// `get`/`set`.
#[derive(Debug, Default)]
pub struct HandleCounter(AtomicU32);

impl HandleCounter {
    pub fn new(start: u32) -> Self {
        Self(AtomicU32::new(start))
    }

    /// Next handle value; skips the reserved invalid value on wrap.
    pub fn next(&self) -> HgfsHandle {
        loop {
            let value = self.0.fetch_add(1, Ordering::Relaxed);
            if value != HGFS_INVALID_HANDLE {
                return value;
            }
        }
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }
}

/// Requested access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AccessMode {
    ReadOnly = 0,
    WriteOnly = 1,
    ReadWrite = 2,
}

impl AccessMode {
    pub fn reads(&self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn writes(&self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

bitflags! {
    /// Modifier bits carried in the upper part of the wire mode word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenModeFlags: u32 {
        const APPEND = 1 << 4;
        const SEQUENTIAL = 1 << 7;
    }
}

/// Access mode plus modifiers, as decoded from the wire mode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: AccessMode,
    pub flags: OpenModeFlags,
}

impl OpenMode {
    pub const fn read_only() -> Self {
        Self {
            access: AccessMode::ReadOnly,
            flags: OpenModeFlags::empty(),
        }
    }

    pub fn from_wire(raw: u32) -> HgfsResult<Self> {
        let access = match raw & 0x3 {
            0 => AccessMode::ReadOnly,
            1 => AccessMode::WriteOnly,
            2 => AccessMode::ReadWrite,
            other => {
                return Err(HgfsError::InvalidParameter(format!(
                    "access mode {other}"
                )));
            }
        };
        Ok(Self {
            access,
            flags: OpenModeFlags::from_bits_truncate(raw & !0x3),
        })
    }

    pub fn to_wire(&self) -> u32 {
        self.access as u32 | self.flags.bits()
    }
}

/// What to do when the target does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OpenDisposition {
    /// Open existing, fail otherwise.
    Open = 0,
    /// Open existing and truncate, fail otherwise.
    OpenEmpty = 1,
    /// Open existing or create.
    OpenCreate = 2,
    /// Create, fail if it exists.
    OpenCreateSafe = 3,
    /// Open existing and truncate, or create.
    OpenCreateEmpty = 4,
}

impl TryFrom<u32> for OpenDisposition {
    type Error = HgfsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::OpenEmpty),
            2 => Ok(Self::OpenCreate),
            3 => Ok(Self::OpenCreateSafe),
            4 => Ok(Self::OpenCreateEmpty),
            other => Err(HgfsError::InvalidParameter(format!(
                "open disposition {other}"
            ))),
        }
    }
}

impl OpenDisposition {
    pub fn creates(&self) -> bool {
        matches!(
            self,
            Self::OpenCreate | Self::OpenCreateSafe | Self::OpenCreateEmpty
        )
    }

    pub fn truncates(&self) -> bool {
        matches!(self, Self::OpenEmpty | Self::OpenCreateEmpty)
    }
}

/// Server lock (oplock) held on behalf of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ServerLock {
    #[default]
    None = 0,
    Opportunistic = 1,
    Exclusive = 2,
    Shared = 3,
}

impl TryFrom<u32> for ServerLock {
    type Error = HgfsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Opportunistic),
            2 => Ok(Self::Exclusive),
            3 => Ok(Self::Shared),
            other => Err(HgfsError::InvalidParameter(format!("server lock {other}"))),
        }
    }
}

/// Everything the handle table needs to (re)open a file.
#[derive(Debug, Clone)]
pub struct OpenInfo {
    /// UTF-8 local path.
    pub local_path: std::path::PathBuf,
    pub mode: OpenMode,
    pub disposition: OpenDisposition,
    pub server_lock: ServerLock,
}

/// Host identity of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalId {
    pub volume_id: u64,
    pub file_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum FileType {
    #[default]
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl TryFrom<u32> for FileType {
    type Error = HgfsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Regular),
            1 => Ok(Self::Directory),
            2 => Ok(Self::Symlink),
            other => Err(HgfsError::InvalidParameter(format!("file type {other}"))),
        }
    }
}

bitflags! {
    /// Validity mask of an attribute record; also selects the fields a
    /// set-attributes request changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttrMask: u64 {
        const TYPE = 1 << 0;
        const SIZE = 1 << 1;
        const CREATE_TIME = 1 << 2;
        const ACCESS_TIME = 1 << 3;
        const WRITE_TIME = 1 << 4;
        const CHANGE_TIME = 1 << 5;
        const SPECIAL_PERMS = 1 << 6;
        const OWNER_PERMS = 1 << 7;
        const GROUP_PERMS = 1 << 8;
        const OTHER_PERMS = 1 << 9;
        const FLAGS = 1 << 10;
        const ALLOCATION_SIZE = 1 << 11;
        const USER_ID = 1 << 12;
        const GROUP_ID = 1 << 13;
        const FILE_ID = 1 << 14;
        const VOLUME_ID = 1 << 15;
        const EFFECTIVE_PERMS = 1 << 17;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttrFlags: u64 {
        const HIDDEN = 1 << 0;
        const READ_ONLY = 1 << 4;
    }
}

/// File attributes in protocol terms. Times are NT times (100ns ticks
/// since 1601-01-01).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttr {
    pub mask: AttrMask,
    pub file_type: FileType,
    pub size: u64,
    pub creation_time: u64,
    pub access_time: u64,
    pub write_time: u64,
    pub change_time: u64,
    pub special_perms: u8,
    pub owner_perms: u8,
    pub group_perms: u8,
    pub other_perms: u8,
    pub flags: AttrFlags,
    pub allocation_size: u64,
    pub user_id: u32,
    pub group_id: u32,
    pub file_id: u64,
    pub volume_id: u32,
    pub effective_perms: u8,
}

impl FileAttr {
    /// Attributes reported for synthetic directories (share list).
    pub fn virtual_dir() -> Self {
        Self {
            mask: AttrMask::TYPE
                | AttrMask::SIZE
                | AttrMask::OWNER_PERMS
                | AttrMask::GROUP_PERMS
                | AttrMask::OTHER_PERMS
                | AttrMask::EFFECTIVE_PERMS,
            file_type: FileType::Directory,
            size: 4192,
            owner_perms: 0o5,
            group_perms: 0o5,
            other_perms: 0o5,
            effective_perms: 0o5,
            ..Default::default()
        }
    }

    /// Unix mode bits from the permission fields.
    pub fn unix_mode(&self) -> u32 {
        (u32::from(self.special_perms & 0o7) << 9)
            | (u32::from(self.owner_perms & 0o7) << 6)
            | (u32::from(self.group_perms & 0o7) << 3)
            | u32::from(self.other_perms & 0o7)
    }
}

/// One directory entry as served by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attr: FileAttr,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, attr: FileAttr) -> Self {
        Self {
            name: name.into(),
            attr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeInfo {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_skips_invalid_handle_on_wrap() {
        let counter = HandleCounter::new(HGFS_INVALID_HANDLE - 1);
        assert_eq!(counter.next(), HGFS_INVALID_HANDLE - 1);
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn open_mode_keeps_modifiers() {
        let mode = OpenMode::from_wire(2 | OpenModeFlags::APPEND.bits()).unwrap();
        assert_eq!(mode.access, AccessMode::ReadWrite);
        assert!(mode.flags.contains(OpenModeFlags::APPEND));
        assert_eq!(OpenMode::from_wire(mode.to_wire()).unwrap(), mode);
        assert!(OpenMode::from_wire(3).is_err());
    }

    #[test]
    fn unix_mode_combines_permission_fields() {
        let attr = FileAttr {
            owner_perms: 6,
            group_perms: 4,
            other_perms: 4,
            ..Default::default()
        };
        assert_eq!(attr.unix_mode(), 0o644);
    }
}
