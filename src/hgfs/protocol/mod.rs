//! Wire protocol: opcodes, headers, typed requests and replies.

pub mod header;
pub mod reply;
pub mod request;
pub mod wire;

use crate::error::HgfsError;

pub use header::{HeaderKind, PacketHeader};
pub use reply::Reply;
pub use request::{NameRef, Request};

/// Protocol generation an opcode belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Generation {
    V1,
    V2,
    V3,
    V4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HgfsOp {
    Open = 0,
    Read = 1,
    Write = 2,
    Close = 3,
    SearchOpen = 4,
    SearchRead = 5,
    SearchClose = 6,
    GetAttr = 7,
    SetAttr = 8,
    CreateDir = 9,
    DeleteFile = 10,
    DeleteDir = 11,
    Rename = 12,
    QueryVolumeInfo = 13,
    OpenV2 = 14,
    GetAttrV2 = 15,
    SetAttrV2 = 16,
    SearchReadV2 = 17,
    CreateSymlink = 18,
    ServerLockChange = 19,
    CreateDirV2 = 20,
    DeleteFileV2 = 21,
    DeleteDirV2 = 22,
    RenameV2 = 23,
    OpenV3 = 24,
    ReadV3 = 25,
    WriteV3 = 26,
    CloseV3 = 27,
    SearchOpenV3 = 28,
    SearchReadV3 = 29,
    SearchCloseV3 = 30,
    GetAttrV3 = 31,
    SetAttrV3 = 32,
    CreateDirV3 = 33,
    DeleteFileV3 = 34,
    DeleteDirV3 = 35,
    RenameV3 = 36,
    QueryVolumeInfoV3 = 37,
    CreateSymlinkV3 = 38,
    ServerLockChangeV3 = 39,
    WriteWin32StreamV3 = 40,
    CreateSessionV4 = 41,
    DestroySessionV4 = 42,
    ReadFastV4 = 43,
    WriteFastV4 = 44,
    SetWatchV4 = 45,
    RemoveWatchV4 = 46,
    NotifyV4 = 47,
    SearchReadV4 = 48,
}

/// Static properties of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDescriptor {
    pub generation: Generation,
    /// Smallest payload (after the request header) the parser accepts.
    pub min_size: usize,
    /// May run on the async executor.
    pub async_capable: bool,
    pub supported: bool,
}

impl HgfsOp {
    pub const ALL: [HgfsOp; 49] = [
        HgfsOp::Open,
        HgfsOp::Read,
        HgfsOp::Write,
        HgfsOp::Close,
        HgfsOp::SearchOpen,
        HgfsOp::SearchRead,
        HgfsOp::SearchClose,
        HgfsOp::GetAttr,
        HgfsOp::SetAttr,
        HgfsOp::CreateDir,
        HgfsOp::DeleteFile,
        HgfsOp::DeleteDir,
        HgfsOp::Rename,
        HgfsOp::QueryVolumeInfo,
        HgfsOp::OpenV2,
        HgfsOp::GetAttrV2,
        HgfsOp::SetAttrV2,
        HgfsOp::SearchReadV2,
        HgfsOp::CreateSymlink,
        HgfsOp::ServerLockChange,
        HgfsOp::CreateDirV2,
        HgfsOp::DeleteFileV2,
        HgfsOp::DeleteDirV2,
        HgfsOp::RenameV2,
        HgfsOp::OpenV3,
        HgfsOp::ReadV3,
        HgfsOp::WriteV3,
        HgfsOp::CloseV3,
        HgfsOp::SearchOpenV3,
        HgfsOp::SearchReadV3,
        HgfsOp::SearchCloseV3,
        HgfsOp::GetAttrV3,
        HgfsOp::SetAttrV3,
        HgfsOp::CreateDirV3,
        HgfsOp::DeleteFileV3,
        HgfsOp::DeleteDirV3,
        HgfsOp::RenameV3,
        HgfsOp::QueryVolumeInfoV3,
        HgfsOp::CreateSymlinkV3,
        HgfsOp::ServerLockChangeV3,
        HgfsOp::WriteWin32StreamV3,
        HgfsOp::CreateSessionV4,
        HgfsOp::DestroySessionV4,
        HgfsOp::ReadFastV4,
        HgfsOp::WriteFastV4,
        HgfsOp::SetWatchV4,
        HgfsOp::RemoveWatchV4,
        HgfsOp::NotifyV4,
        HgfsOp::SearchReadV4,
    ];

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn descriptor(self) -> OpDescriptor {
        use Generation::*;
        use HgfsOp::*;
        use request::min_size as min;

        let (generation, async_capable) = match self {
            Open | Read | Write | SearchOpen | SearchRead | GetAttr | QueryVolumeInfo => (V1, true),
            Close | SearchClose | SetAttr | CreateDir | DeleteFile | DeleteDir | Rename => {
                (V1, false)
            }
            OpenV2 | GetAttrV2 | SearchReadV2 => (V2, true),
            SetAttrV2 | CreateSymlink | ServerLockChange | CreateDirV2 | DeleteFileV2
            | DeleteDirV2 | RenameV2 => (V2, false),
            OpenV3 | ReadV3 | WriteV3 | SearchOpenV3 | SearchReadV3 | GetAttrV3
            | QueryVolumeInfoV3 => (V3, true),
            CloseV3 | SearchCloseV3 | SetAttrV3 | CreateDirV3 | DeleteFileV3 | DeleteDirV3
            | RenameV3 | CreateSymlinkV3 | ServerLockChangeV3 | WriteWin32StreamV3 => (V3, false),
            SearchReadV4 => (V4, true),
            CreateSessionV4 | DestroySessionV4 | ReadFastV4 | WriteFastV4 | SetWatchV4
            | RemoveWatchV4 | NotifyV4 => (V4, false),
        };

        let supported = !matches!(self, WriteWin32StreamV3 | ReadFastV4 | WriteFastV4);

        OpDescriptor {
            generation,
            min_size: min(self),
            async_capable,
            supported,
        }
    }

    pub fn generation(self) -> Generation {
        self.descriptor().generation
    }
}

impl TryFrom<u32> for HgfsOp {
    type Error = HgfsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        HgfsOp::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| HgfsError::Protocol(format!("unknown opcode {value}")))
    }
}
