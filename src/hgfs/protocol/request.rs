//! Typed request payloads.
//!
//! Every opcode parses into one `Request` variant; opcodes of different
//! generations that mean the same operation share a variant. The
//! minimum payload sizes in `min_size` are built from the same field
//! widths the parsers consume.

use std::path::PathBuf;

use bitflags::bitflags;
use bytes::Bytes;

use super::HgfsOp;
use super::wire::{ATTR_V1_SIZE, ATTR_V2_SIZE, NAME_SIZE, NAME_V3_SIZE, Reader};
use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::types::{
    AttrMask, FileAttr, HgfsHandle, OpenDisposition, OpenMode, ServerLock,
};
use crate::hgfs::utils::cpname::CpName;

const U8: usize = 1;
const U32: usize = 4;
const U64: usize = 8;

bitflags! {
    /// Which optional fields of an open request are valid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenValid: u64 {
        const TYPE = 1 << 0;
        const FILE_NAME = 1 << 1;
        const MODE = 1 << 2;
        const FLAGS = 1 << 3;
        const SPECIAL_PERMS = 1 << 4;
        const OWNER_PERMS = 1 << 5;
        const GROUP_PERMS = 1 << 6;
        const OTHER_PERMS = 1 << 7;
        const SERVER_LOCK = 1 << 12;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestHints: u32 {
        /// The primary target is given by handle.
        const USE_FILE_DESC = 1 << 0;
        /// Rename: the target is given by handle.
        const USE_TARGET_FILE_DESC = 1 << 1;
    }
}

/// V1 set-attribute update bits.
const V1_UPDATE_SIZE: u8 = 1 << 0;
const V1_UPDATE_CREATE_TIME: u8 = 1 << 1;
const V1_UPDATE_ACCESS_TIME: u8 = 1 << 2;
const V1_UPDATE_WRITE_TIME: u8 = 1 << 3;
const V1_UPDATE_CHANGE_TIME: u8 = 1 << 4;
const V1_UPDATE_PERMS: u8 = 1 << 5;

pub const WRITE_FLAG_APPEND: u8 = 1 << 0;
pub const WATCH_FLAG_RECURSIVE: u32 = 1 << 0;

/// A request target named either by path or by open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRef {
    Path(CpName),
    Handle(HgfsHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub name: CpName,
    pub mode: OpenMode,
    pub disposition: OpenDisposition,
    /// Owner permission bits for a created file.
    pub owner_perms: Option<u8>,
    pub desired_lock: ServerLock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Open(OpenRequest),
    Read {
        handle: HgfsHandle,
        offset: u64,
        size: u32,
    },
    Write {
        handle: HgfsHandle,
        append: bool,
        offset: u64,
        data: Bytes,
    },
    Close {
        handle: HgfsHandle,
    },
    SearchOpen {
        dir: CpName,
    },
    SearchRead {
        search: HgfsHandle,
        index: u32,
    },
    SearchReadMulti {
        search: HgfsHandle,
        start: u32,
        capacity: u32,
    },
    SearchClose {
        search: HgfsHandle,
    },
    GetAttr {
        target: NameRef,
    },
    SetAttr {
        target: NameRef,
        attr: FileAttr,
        changes: AttrMask,
    },
    CreateDir {
        name: CpName,
        perms: Option<u32>,
    },
    Delete {
        target: NameRef,
        dir: bool,
    },
    Rename {
        from: NameRef,
        to: NameRef,
    },
    QueryVolumeInfo {
        name: CpName,
    },
    CreateSymlink {
        link: CpName,
        target: PathBuf,
    },
    ServerLockChange {
        handle: HgfsHandle,
        lock: ServerLock,
    },
    CreateSession {
        max_packet_size: u32,
        flags: u32,
    },
    DestroySession,
    SetWatch {
        target: NameRef,
        events: u32,
        recursive: bool,
    },
    RemoveWatch {
        watch: u64,
    },
}

/// Smallest payload accepted for `op`.
pub fn min_size(op: HgfsOp) -> usize {
    use HgfsOp::*;
    match op {
        Open => U32 + U32 + U8 + NAME_SIZE,
        Read => U32 + U64 + U32,
        Write => U32 + U8 + U64 + U32,
        Close | SearchOpen | SearchClose | GetAttr | DeleteFile | DeleteDir
        | QueryVolumeInfo => U32,
        SearchRead | SearchReadV2 => U32 + U32,
        SetAttr => U8 + ATTR_V1_SIZE + NAME_SIZE,
        CreateDir => U8 + NAME_SIZE,
        Rename | CreateSymlink => 2 * NAME_SIZE,
        OpenV2 => U64 + U32 + U32 + U8 + U32 + NAME_SIZE,
        GetAttrV2 | DeleteFileV2 | DeleteDirV2 => U32 + U32 + NAME_SIZE,
        SetAttrV2 => U32 + ATTR_V2_SIZE + U32 + NAME_SIZE,
        ServerLockChange => U32 + U32,
        CreateDirV2 => U64 + 4 * U8 + NAME_SIZE,
        RenameV2 => 3 * U32 + 2 * NAME_SIZE,
        OpenV3 => U64 + U32 + U32 + U8 + U32 + U64 + NAME_V3_SIZE,
        ReadV3 => U32 + U64 + U32 + U64,
        WriteV3 => U32 + U8 + U64 + U32 + U64,
        CloseV3 | SearchCloseV3 => U32 + U64,
        SearchOpenV3 | QueryVolumeInfoV3 => U64 + NAME_V3_SIZE,
        SearchReadV3 => 3 * U32 + U64,
        GetAttrV3 | DeleteFileV3 | DeleteDirV3 => U32 + U64 + NAME_V3_SIZE,
        SetAttrV3 => U32 + ATTR_V2_SIZE + U64 + NAME_V3_SIZE,
        CreateDirV3 => U64 + 4 * U8 + U64 + NAME_V3_SIZE,
        RenameV3 => U32 + U64 + 2 * NAME_V3_SIZE,
        CreateSymlinkV3 => U64 + 2 * NAME_V3_SIZE,
        ServerLockChangeV3 => U32 + U32 + U64,
        WriteWin32StreamV3 | ReadFastV4 | WriteFastV4 | NotifyV4 => 0,
        CreateSessionV4 => 4 * U32,
        DestroySessionV4 => U64,
        SetWatchV4 => U32 + U32 + U64 + NAME_V3_SIZE,
        RemoveWatchV4 => U64 + U64,
        SearchReadV4 => 4 * U32 + U64,
    }
}

fn name_ref_v3(handle: Option<HgfsHandle>, name: &[u8]) -> HgfsResult<NameRef> {
    match handle {
        Some(handle) => Ok(NameRef::Handle(handle)),
        None => Ok(NameRef::Path(CpName::parse(name)?)),
    }
}

fn name_ref_v2(use_handle: bool, handle: HgfsHandle, name: CpName) -> NameRef {
    if use_handle {
        NameRef::Handle(handle)
    } else {
        NameRef::Path(name)
    }
}

fn v1_update_mask(update: u8) -> AttrMask {
    let mut mask = AttrMask::empty();
    for (bit, attr) in [
        (V1_UPDATE_SIZE, AttrMask::SIZE),
        (V1_UPDATE_CREATE_TIME, AttrMask::CREATE_TIME),
        (V1_UPDATE_ACCESS_TIME, AttrMask::ACCESS_TIME),
        (V1_UPDATE_WRITE_TIME, AttrMask::WRITE_TIME),
        (V1_UPDATE_CHANGE_TIME, AttrMask::CHANGE_TIME),
        (V1_UPDATE_PERMS, AttrMask::OWNER_PERMS),
    ] {
        if update & bit != 0 {
            mask |= attr;
        }
    }
    mask
}

/// Mode word, disposition, optional owner perms and lock shared by
/// V2/V3 opens.
fn open_v2(r: &mut Reader, v3: bool) -> HgfsResult<OpenRequest> {
    let valid = OpenValid::from_bits_truncate(r.u64()?);
    let mode = OpenMode::from_wire(r.u32()?)?;
    let disposition = OpenDisposition::try_from(r.u32()?)?;
    let owner_perms = r.u8()?;
    let lock = r.u32()?;
    let name = if v3 {
        r.skip(U64)?;
        let (handle, name) = r.name_v3()?;
        if handle.is_some() {
            return Err(HgfsError::InvalidParameter("open by handle".into()));
        }
        CpName::parse(&name)?
    } else {
        r.cp_name()?
    };

    Ok(OpenRequest {
        name,
        mode: if valid.contains(OpenValid::MODE) {
            mode
        } else {
            OpenMode::read_only()
        },
        disposition: if valid.contains(OpenValid::FLAGS) {
            disposition
        } else {
            OpenDisposition::Open
        },
        owner_perms: valid.contains(OpenValid::OWNER_PERMS).then_some(owner_perms),
        desired_lock: if valid.contains(OpenValid::SERVER_LOCK) {
            ServerLock::try_from(lock)?
        } else {
            ServerLock::None
        },
    })
}

fn create_dir_perms(valid: u64, owner: u8, group: u8, other: u8) -> Option<u32> {
    let valid = OpenValid::from_bits_truncate(valid);
    valid.contains(OpenValid::OWNER_PERMS).then(|| {
        let group = if valid.contains(OpenValid::GROUP_PERMS) { group } else { owner };
        let other = if valid.contains(OpenValid::OTHER_PERMS) { other } else { owner };
        (u32::from(owner & 7) << 6) | (u32::from(group & 7) << 3) | u32::from(other & 7)
    })
}

impl Request {
    pub fn parse(op: HgfsOp, payload: Bytes) -> HgfsResult<Request> {
        use HgfsOp::*;
        let mut r = Reader::new(payload);

        let request = match op {
            Open => {
                let mode = OpenMode::from_wire(r.u32()?)?;
                let disposition = OpenDisposition::try_from(r.u32()?)?;
                let perms = r.u8()?;
                Request::Open(OpenRequest {
                    name: r.cp_name()?,
                    mode,
                    disposition,
                    owner_perms: Some(perms),
                    desired_lock: ServerLock::None,
                })
            }
            OpenV2 => Request::Open(open_v2(&mut r, false)?),
            OpenV3 => Request::Open(open_v2(&mut r, true)?),

            Read | ReadV3 => {
                let handle = r.u32()?;
                let offset = r.u64()?;
                let size = r.u32()?;
                Request::Read {
                    handle,
                    offset,
                    size,
                }
            }

            Write | WriteV3 => {
                let handle = r.u32()?;
                let flags = r.u8()?;
                let offset = r.u64()?;
                let size = r.u32()? as usize;
                if op == WriteV3 {
                    r.skip(U64)?;
                }
                Request::Write {
                    handle,
                    append: flags & WRITE_FLAG_APPEND != 0,
                    offset,
                    data: r.bytes(size)?,
                }
            }

            Close | CloseV3 => Request::Close { handle: r.u32()? },

            SearchOpen => Request::SearchOpen { dir: r.cp_name()? },
            SearchOpenV3 => {
                r.skip(U64)?;
                let (handle, name) = r.name_v3()?;
                if handle.is_some() {
                    return Err(HgfsError::InvalidParameter("search by handle".into()));
                }
                Request::SearchOpen {
                    dir: CpName::parse(&name)?,
                }
            }

            SearchRead | SearchReadV2 | SearchReadV3 => Request::SearchRead {
                search: r.u32()?,
                index: r.u32()?,
            },
            SearchReadV4 => {
                let search = r.u32()?;
                let _flags = r.u32()?;
                let capacity = r.u32()?;
                let start = r.u32()?;
                Request::SearchReadMulti {
                    search,
                    start,
                    capacity,
                }
            }

            SearchClose | SearchCloseV3 => Request::SearchClose { search: r.u32()? },

            GetAttr => Request::GetAttr {
                target: NameRef::Path(r.cp_name()?),
            },
            GetAttrV2 => {
                let hints = RequestHints::from_bits_truncate(r.u32()?);
                let handle = r.u32()?;
                let name = r.cp_name()?;
                Request::GetAttr {
                    target: name_ref_v2(hints.contains(RequestHints::USE_FILE_DESC), handle, name),
                }
            }
            GetAttrV3 => {
                let _hints = r.u32()?;
                r.skip(U64)?;
                let (handle, name) = r.name_v3()?;
                Request::GetAttr {
                    target: name_ref_v3(handle, &name)?,
                }
            }

            SetAttr => {
                let update = r.u8()?;
                let attr = r.attr_v1()?;
                Request::SetAttr {
                    target: NameRef::Path(r.cp_name()?),
                    attr,
                    changes: v1_update_mask(update),
                }
            }
            SetAttrV2 => {
                let hints = RequestHints::from_bits_truncate(r.u32()?);
                let attr = r.attr_v2()?;
                let handle = r.u32()?;
                let name = r.cp_name()?;
                Request::SetAttr {
                    target: name_ref_v2(hints.contains(RequestHints::USE_FILE_DESC), handle, name),
                    changes: attr.mask,
                    attr,
                }
            }
            SetAttrV3 => {
                let _hints = r.u32()?;
                let attr = r.attr_v2()?;
                r.skip(U64)?;
                let (handle, name) = r.name_v3()?;
                Request::SetAttr {
                    target: name_ref_v3(handle, &name)?,
                    changes: attr.mask,
                    attr,
                }
            }

            CreateDir => {
                let perms = r.u8()?;
                Request::CreateDir {
                    perms: Some(u32::from(perms & 7) * 0o111),
                    name: r.cp_name()?,
                }
            }
            CreateDirV2 | CreateDirV3 => {
                let valid = r.u64()?;
                let _special = r.u8()?;
                let owner = r.u8()?;
                let group = r.u8()?;
                let other = r.u8()?;
                let name = if op == CreateDirV3 {
                    r.skip(U64)?;
                    let (_, name) = r.name_v3()?;
                    CpName::parse(&name)?
                } else {
                    r.cp_name()?
                };
                Request::CreateDir {
                    name,
                    perms: create_dir_perms(valid, owner, group, other),
                }
            }

            DeleteFile | DeleteDir => Request::Delete {
                target: NameRef::Path(r.cp_name()?),
                dir: op == DeleteDir,
            },
            DeleteFileV2 | DeleteDirV2 => {
                let hints = RequestHints::from_bits_truncate(r.u32()?);
                let handle = r.u32()?;
                let name = r.cp_name()?;
                Request::Delete {
                    target: name_ref_v2(hints.contains(RequestHints::USE_FILE_DESC), handle, name),
                    dir: op == DeleteDirV2,
                }
            }
            DeleteFileV3 | DeleteDirV3 => {
                let _hints = r.u32()?;
                r.skip(U64)?;
                let (handle, name) = r.name_v3()?;
                Request::Delete {
                    target: name_ref_v3(handle, &name)?,
                    dir: op == DeleteDirV3,
                }
            }

            Rename => Request::Rename {
                from: NameRef::Path(r.cp_name()?),
                to: NameRef::Path(r.cp_name()?),
            },
            RenameV2 => {
                let hints = RequestHints::from_bits_truncate(r.u32()?);
                let src = r.u32()?;
                let dst = r.u32()?;
                let old = r.cp_name()?;
                let new = r.cp_name()?;
                Request::Rename {
                    from: name_ref_v2(hints.contains(RequestHints::USE_FILE_DESC), src, old),
                    to: name_ref_v2(
                        hints.contains(RequestHints::USE_TARGET_FILE_DESC),
                        dst,
                        new,
                    ),
                }
            }
            RenameV3 => {
                let _hints = r.u32()?;
                r.skip(U64)?;
                let (src, old) = r.name_v3()?;
                let (dst, new) = r.name_v3()?;
                Request::Rename {
                    from: name_ref_v3(src, &old)?,
                    to: name_ref_v3(dst, &new)?,
                }
            }

            QueryVolumeInfo => Request::QueryVolumeInfo { name: r.cp_name()? },
            QueryVolumeInfoV3 => {
                r.skip(U64)?;
                let (_, name) = r.name_v3()?;
                Request::QueryVolumeInfo {
                    name: CpName::parse(&name)?,
                }
            }

            CreateSymlink => {
                let link = r.cp_name()?;
                let target = CpName::lite_path(&r.name()?)?;
                Request::CreateSymlink { link, target }
            }
            CreateSymlinkV3 => {
                r.skip(U64)?;
                let (_, link) = r.name_v3()?;
                let (_, target) = r.name_v3()?;
                Request::CreateSymlink {
                    link: CpName::parse(&link)?,
                    target: CpName::lite_path(&target)?,
                }
            }

            ServerLockChange | ServerLockChangeV3 => Request::ServerLockChange {
                handle: r.u32()?,
                lock: ServerLock::try_from(r.u32()?)?,
            },

            CreateSessionV4 => {
                let _num_capabilities = r.u32()?;
                let max_packet_size = r.u32()?;
                let flags = r.u32()?;
                Request::CreateSession {
                    max_packet_size,
                    flags,
                }
            }
            DestroySessionV4 => Request::DestroySession,

            SetWatchV4 => {
                let flags = r.u32()?;
                let events = r.u32()?;
                r.skip(U64)?;
                let (handle, name) = r.name_v3()?;
                Request::SetWatch {
                    target: name_ref_v3(handle, &name)?,
                    events,
                    recursive: flags & WATCH_FLAG_RECURSIVE != 0,
                }
            }
            RemoveWatchV4 => Request::RemoveWatch { watch: r.u64()? },

            NotifyV4 => {
                return Err(HgfsError::Protocol(
                    "notify packets travel server to client only".into(),
                ));
            }
            WriteWin32StreamV3 | ReadFastV4 | WriteFastV4 => {
                return Err(HgfsError::NotSupported(format!("{op:?}")));
            }
        };

        Ok(request)
    }
}

/// Request payload builders, used by clients and tests.
pub mod build {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;
    use crate::hgfs::protocol::wire::{NAME_V3_USE_FILE_DESC, put_attr_v2, put_name};

    pub fn name_v3(out: &mut BytesMut, name: &[u8], handle: Option<HgfsHandle>) {
        out.put_u32_le(name.len() as u32);
        out.put_u32_le(if handle.is_some() { NAME_V3_USE_FILE_DESC } else { 0 });
        out.put_u32_le(0);
        out.put_u32_le(handle.unwrap_or(0));
        out.put_slice(name);
    }

    pub fn open_v1(mode: OpenMode, disposition: OpenDisposition, perms: u8, name: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(mode.to_wire());
        out.put_u32_le(disposition as u32);
        out.put_u8(perms);
        put_name(&mut out, name);
        out.freeze()
    }

    pub fn open_v3(
        mode: OpenMode,
        disposition: OpenDisposition,
        owner_perms: u8,
        lock: ServerLock,
        name: &[u8],
    ) -> Bytes {
        let mut out = BytesMut::new();
        let valid = OpenValid::MODE | OpenValid::FLAGS | OpenValid::OWNER_PERMS | OpenValid::SERVER_LOCK;
        out.put_u64_le(valid.bits());
        out.put_u32_le(mode.to_wire());
        out.put_u32_le(disposition as u32);
        out.put_u8(owner_perms);
        out.put_u32_le(lock as u32);
        out.put_u64_le(0);
        name_v3(&mut out, name, None);
        out.freeze()
    }

    pub fn read(handle: HgfsHandle, offset: u64, size: u32, v3: bool) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(handle);
        out.put_u64_le(offset);
        out.put_u32_le(size);
        if v3 {
            out.put_u64_le(0);
        }
        out.freeze()
    }

    pub fn write(handle: HgfsHandle, offset: u64, data: &[u8], append: bool, v3: bool) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(handle);
        out.put_u8(if append { WRITE_FLAG_APPEND } else { 0 });
        out.put_u64_le(offset);
        out.put_u32_le(data.len() as u32);
        if v3 {
            out.put_u64_le(0);
        }
        out.put_slice(data);
        out.freeze()
    }

    pub fn handle_only(handle: HgfsHandle, v3: bool) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(handle);
        if v3 {
            out.put_u64_le(0);
        }
        out.freeze()
    }

    pub fn name_v1(name: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        put_name(&mut out, name);
        out.freeze()
    }

    pub fn search_open_v3(name: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u64_le(0);
        name_v3(&mut out, name, None);
        out.freeze()
    }

    pub fn search_read(search: HgfsHandle, index: u32) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(search);
        out.put_u32_le(index);
        out.freeze()
    }

    pub fn search_read_v3(search: HgfsHandle, index: u32) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(search);
        out.put_u32_le(index);
        out.put_u32_le(0);
        out.put_u64_le(0);
        out.freeze()
    }

    pub fn search_read_v4(search: HgfsHandle, start: u32, capacity: u32) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(search);
        out.put_u32_le(0);
        out.put_u32_le(capacity);
        out.put_u32_le(start);
        out.put_u64_le(0);
        out.freeze()
    }

    pub fn get_attr_v3(name: &[u8], handle: Option<HgfsHandle>) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(0);
        out.put_u64_le(0);
        name_v3(&mut out, name, handle);
        out.freeze()
    }

    pub fn set_attr_v3(attr: &FileAttr, name: &[u8], handle: Option<HgfsHandle>) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(0);
        put_attr_v2(&mut out, attr);
        out.put_u64_le(0);
        name_v3(&mut out, name, handle);
        out.freeze()
    }

    pub fn delete_v3(name: &[u8], handle: Option<HgfsHandle>) -> Bytes {
        get_attr_v3(name, handle)
    }

    pub fn rename_v3(old: &[u8], new: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(0);
        out.put_u64_le(0);
        name_v3(&mut out, old, None);
        name_v3(&mut out, new, None);
        out.freeze()
    }

    pub fn create_dir_v3(owner_perms: u8, name: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u64_le(OpenValid::OWNER_PERMS.bits());
        out.put_u8(0);
        out.put_u8(owner_perms);
        out.put_u8(0);
        out.put_u8(0);
        out.put_u64_le(0);
        name_v3(&mut out, name, None);
        out.freeze()
    }

    pub fn create_symlink_v3(link: &[u8], target: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u64_le(0);
        name_v3(&mut out, link, None);
        name_v3(&mut out, target, None);
        out.freeze()
    }

    pub fn query_volume_v3(name: &[u8]) -> Bytes {
        search_open_v3(name)
    }

    pub fn server_lock_change(handle: HgfsHandle, lock: ServerLock) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(handle);
        out.put_u32_le(lock as u32);
        out.put_u64_le(0);
        out.freeze()
    }

    pub fn create_session(max_packet_size: u32, flags: u32) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(0);
        out.put_u32_le(max_packet_size);
        out.put_u32_le(flags);
        out.put_u32_le(0);
        out.freeze()
    }

    pub fn destroy_session() -> Bytes {
        Bytes::from_static(&[0; 8])
    }

    pub fn set_watch(name: &[u8], events: u32, recursive: bool) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(if recursive { WATCH_FLAG_RECURSIVE } else { 0 });
        out.put_u32_le(events);
        out.put_u64_le(0);
        name_v3(&mut out, name, None);
        out.freeze()
    }

    pub fn remove_watch(watch: u64) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u64_le(watch);
        out.put_u64_le(0);
        out.freeze()
    }
}
