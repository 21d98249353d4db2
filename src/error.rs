//! HGFS error types
//!
//! `HgfsError` is what every engine function returns on failure;
//! `HgfsStatus` is the value that ends up in a reply header.

use std::io;

use thiserror::Error;

/// Result alias used across the engine.
pub type HgfsResult<T> = Result<T, HgfsError>;

/// Engine error kinds.
#[derive(Debug, Error)]
pub enum HgfsError {
    /// Malformed or undersized packet
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown or closed handle
    #[error("invalid handle {0}")]
    InvalidHandle(u32),

    /// Parameter out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed cross-platform name
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Share policy or path check refused the operation
    #[error("access denied")]
    AccessDenied,

    /// File or share does not exist
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Target already exists
    #[error("file exists: {0}")]
    FileExists(String),

    /// Path held under a server lock
    #[error("path busy: {0}")]
    PathBusy(String),

    /// Allocation failed
    #[error("out of memory")]
    OutOfMemory,

    /// Transport session already holds the maximum number of sessions
    #[error("too many sessions")]
    TooManySessions,

    /// Session id unknown or closed
    #[error("stale session {0:#x}")]
    StaleSession(u64),

    /// Operation not supported by this server or session
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Cache full with nothing evictable
    #[error("too many open files")]
    CacheFull,

    /// Transport refused a packet
    #[error("transport error: {0}")]
    Transport(String),

    /// Packing or bookkeeping failure with no more specific cause
    #[error("internal error: {0}")]
    Internal(String),

    /// Platform I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HgfsError {
    /// Wire status for this error.
    pub fn status(&self) -> HgfsStatus {
        match self {
            HgfsError::Protocol(_) => HgfsStatus::ProtocolError,
            HgfsError::InvalidHandle(_) => HgfsStatus::InvalidHandle,
            HgfsError::InvalidParameter(_) => HgfsStatus::InvalidParameter,
            HgfsError::InvalidName(_) => HgfsStatus::InvalidName,
            HgfsError::AccessDenied => HgfsStatus::AccessDenied,
            HgfsError::FileNotFound(_) => HgfsStatus::NoSuchFileOrDir,
            HgfsError::FileExists(_) => HgfsStatus::FileExists,
            HgfsError::PathBusy(_) => HgfsStatus::SharingViolation,
            HgfsError::OutOfMemory => HgfsStatus::GenericError,
            HgfsError::TooManySessions => HgfsStatus::TooManySessions,
            HgfsError::StaleSession(_) => HgfsStatus::StaleSession,
            HgfsError::NotSupported(_) => HgfsStatus::OperationNotSupported,
            HgfsError::CacheFull => HgfsStatus::GenericError,
            HgfsError::Transport(_) => HgfsStatus::TransportError,
            HgfsError::Internal(_) => HgfsStatus::GenericError,
            HgfsError::Io(e) => HgfsStatus::from_io(e),
        }
    }

    /// Host error code carried in the V4 `information` field.
    pub fn information(&self) -> u32 {
        match self {
            HgfsError::Io(e) => e.raw_os_error().map(|c| c as u32).unwrap_or(0),
            _ => 0,
        }
    }
}

/// Status codes placed in reply headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HgfsStatus {
    Success = 0,
    NoSuchFileOrDir = 1,
    InvalidHandle = 2,
    OperationNotPermitted = 3,
    FileExists = 4,
    NotDirectory = 5,
    DirNotEmpty = 6,
    ProtocolError = 7,
    AccessDenied = 8,
    InvalidName = 9,
    GenericError = 10,
    SharingViolation = 11,
    NoSpace = 12,
    OperationNotSupported = 13,
    NameTooLong = 14,
    InvalidParameter = 15,
    NotSameDevice = 16,
    StaleSession = 17,
    TooManySessions = 18,
    TransportError = 19,
}

impl HgfsStatus {
    /// Get the raw value
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Create from raw value
    pub fn from_u32(val: u32) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::NoSuchFileOrDir,
            2 => Self::InvalidHandle,
            3 => Self::OperationNotPermitted,
            4 => Self::FileExists,
            5 => Self::NotDirectory,
            6 => Self::DirNotEmpty,
            7 => Self::ProtocolError,
            8 => Self::AccessDenied,
            9 => Self::InvalidName,
            11 => Self::SharingViolation,
            12 => Self::NoSpace,
            13 => Self::OperationNotSupported,
            14 => Self::NameTooLong,
            15 => Self::InvalidParameter,
            16 => Self::NotSameDevice,
            17 => Self::StaleSession,
            18 => Self::TooManySessions,
            19 => Self::TransportError,
            _ => Self::GenericError,
        }
    }

    /// Translate a platform error.
    pub fn from_io(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => return Self::NoSuchFileOrDir,
            io::ErrorKind::PermissionDenied => return Self::AccessDenied,
            io::ErrorKind::AlreadyExists => return Self::FileExists,
            io::ErrorKind::InvalidInput => return Self::InvalidParameter,
            io::ErrorKind::Unsupported => return Self::OperationNotSupported,
            _ => {}
        }

        match e.raw_os_error() {
            Some(libc::ENOTDIR) => Self::NotDirectory,
            Some(libc::ENOTEMPTY) => Self::DirNotEmpty,
            Some(libc::ENAMETOOLONG) => Self::NameTooLong,
            Some(libc::EXDEV) => Self::NotSameDevice,
            Some(libc::ENOSPC) => Self::NoSpace,
            Some(libc::EPERM) => Self::OperationNotPermitted,
            _ => Self::GenericError,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl std::fmt::Display for HgfsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, *self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let e = HgfsError::Io(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(e.status(), HgfsStatus::NoSuchFileOrDir);

        let e = HgfsError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(e.status(), HgfsStatus::AccessDenied);
    }

    #[test]
    fn io_errors_map_by_errno() {
        let e = HgfsError::Io(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert_eq!(e.status(), HgfsStatus::DirNotEmpty);
        assert_eq!(e.information(), libc::ENOTEMPTY as u32);
    }

    #[test]
    fn taxonomy_maps_to_wire_status() {
        assert_eq!(HgfsError::PathBusy("x".into()).status(), HgfsStatus::SharingViolation);
        assert_eq!(HgfsError::StaleSession(7).status(), HgfsStatus::StaleSession);
        assert_eq!(HgfsError::OutOfMemory.status(), HgfsStatus::GenericError);
        assert_eq!(HgfsError::TooManySessions.status(), HgfsStatus::TooManySessions);
    }

    #[test]
    fn status_round_trips_known_values() {
        assert_eq!(HgfsStatus::from_u32(17), HgfsStatus::StaleSession);
        assert_eq!(HgfsStatus::from_u32(999), HgfsStatus::GenericError);
    }
}
