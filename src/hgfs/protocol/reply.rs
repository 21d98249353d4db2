//! Typed replies and their wire encoding.

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};

use super::header::{HEADER_FLAG_REQUEST, put_session_header};
use super::wire::{ATTR_V2_SIZE, put_attr_v1, put_attr_v2, put_name};
use super::{Generation, HgfsOp};
use crate::error::{HgfsError, HgfsResult, HgfsStatus};
use crate::hgfs::session_state::{Capability, SessionFlags};
use crate::hgfs::types::{DirEntry, FileAttr, HgfsHandle, ServerLock, VolumeInfo};
use crate::hgfs::utils::cpname::CpName;

/// Fixed part of a SEARCH_READ_V4 reply.
pub const SEARCH_V4_REPLY_HEADER: usize = 4 + 4 + 4 + 8;
pub const SEARCH_V4_FLAG_FINAL: u32 = 1 << 0;
pub const NOTIFY_FLAG_OVERFLOW: u32 = 1 << 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Empty,
    Open {
        handle: HgfsHandle,
        lock: ServerLock,
    },
    Read(Bytes),
    Write {
        actual: u32,
    },
    SearchOpen {
        search: HgfsHandle,
    },
    /// One entry per read; `None` past the end.
    SearchEntry(Option<DirEntry>),
    SearchEntries {
        entries: Vec<DirEntry>,
        complete: bool,
    },
    Attr {
        attr: FileAttr,
        symlink_target: Option<String>,
    },
    VolumeInfo(VolumeInfo),
    ServerLock(ServerLock),
    Session {
        id: u64,
        max_packet_size: u32,
        flags: SessionFlags,
        capabilities: Vec<Capability>,
    },
    Watch {
        id: u64,
    },
}

/// Encoded size of one SEARCH_READ_V4 entry.
pub fn search_entry_v4_size(entry: &DirEntry) -> usize {
    4 + ATTR_V2_SIZE + 4 + entry.name.len()
}

fn mismatch(op: HgfsOp, reply: &Reply) -> HgfsError {
    HgfsError::Internal(format!("cannot encode {reply:?} for {op:?}"))
}

impl Reply {
    /// Payload bytes following the reply header.
    pub fn encode(&self, op: HgfsOp) -> HgfsResult<BytesMut> {
        let generation = op.generation();
        let v3 = generation >= Generation::V3;
        let mut out = BytesMut::new();

        match self {
            Reply::Empty => {
                if v3 {
                    out.put_u64_le(0);
                }
            }
            Reply::Open { handle, lock } => {
                out.put_u32_le(*handle);
                if generation >= Generation::V2 && op != HgfsOp::Open {
                    out.put_u32_le(*lock as u32);
                }
                if v3 {
                    out.put_u64_le(0);
                }
            }
            Reply::Read(data) => {
                out.put_u32_le(data.len() as u32);
                if v3 {
                    out.put_u64_le(0);
                }
                out.put_slice(data);
            }
            Reply::Write { actual } => {
                out.put_u32_le(*actual);
                if v3 {
                    out.put_u64_le(0);
                }
            }
            Reply::SearchOpen { search } => {
                out.put_u32_le(*search);
                if v3 {
                    out.put_u64_le(0);
                }
            }
            Reply::SearchEntry(entry) => {
                if v3 {
                    out.put_u64_le(0);
                }
                let empty = DirEntry::new("", FileAttr::default());
                let entry = entry.as_ref().unwrap_or(&empty);
                match op {
                    HgfsOp::SearchRead => put_attr_v1(&mut out, &entry.attr),
                    HgfsOp::SearchReadV2 | HgfsOp::SearchReadV3 => {
                        put_attr_v2(&mut out, &entry.attr)
                    }
                    _ => return Err(mismatch(op, self)),
                }
                put_name(&mut out, entry.name.as_bytes());
            }
            Reply::SearchEntries { entries, complete } => {
                if op != HgfsOp::SearchReadV4 {
                    return Err(mismatch(op, self));
                }
                out.put_u32_le(entries.len() as u32);
                out.put_u32_le(0);
                out.put_u32_le(if *complete { SEARCH_V4_FLAG_FINAL } else { 0 });
                out.put_u64_le(0);
                for (i, entry) in entries.iter().enumerate() {
                    let next = if i + 1 == entries.len() {
                        0
                    } else {
                        search_entry_v4_size(entry) as u32
                    };
                    out.put_u32_le(next);
                    put_attr_v2(&mut out, &entry.attr);
                    put_name(&mut out, entry.name.as_bytes());
                }
            }
            Reply::Attr {
                attr,
                symlink_target,
            } => {
                if generation == Generation::V1 {
                    put_attr_v1(&mut out, attr);
                } else {
                    put_attr_v2(&mut out, attr);
                    if v3 {
                        out.put_u64_le(0);
                    }
                    let target = symlink_target.as_deref().unwrap_or("");
                    put_name(&mut out, target.as_bytes());
                }
            }
            Reply::VolumeInfo(info) => {
                out.put_u64_le(info.free_bytes);
                out.put_u64_le(info.total_bytes);
                if v3 {
                    out.put_u64_le(0);
                }
            }
            Reply::ServerLock(lock) => {
                out.put_u32_le(*lock as u32);
                if v3 {
                    out.put_u64_le(0);
                }
            }
            Reply::Session {
                id,
                max_packet_size,
                flags,
                capabilities,
            } => {
                if op != HgfsOp::CreateSessionV4 {
                    return Err(mismatch(op, self));
                }
                out.put_u64_le(*id);
                out.put_u32_le(capabilities.len() as u32);
                out.put_u32_le(*max_packet_size);
                out.put_u32_le(flags.bits());
                out.put_u32_le(0);
                for cap in capabilities {
                    out.put_u32_le(cap.op);
                    out.put_u32_le(cap.flags.bits());
                }
            }
            Reply::Watch { id } => {
                out.put_u64_le(*id);
                out.put_u64_le(0);
            }
        }

        Ok(out)
    }
}

/// A change notification: one event for one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPacket<'a> {
    pub request_id: u32,
    pub session_id: u64,
    pub watch_id: u64,
    pub share: &'a str,
    pub relative: &'a Path,
    pub mask: u32,
    pub overflow: bool,
}

impl NotifyPacket<'_> {
    /// Complete packet, session header included.
    pub fn encode(&self) -> Bytes {
        let mut payload = BytesMut::new();
        payload.put_u64_le(self.watch_id);
        payload.put_u32_le(if self.overflow { NOTIFY_FLAG_OVERFLOW } else { 0 });
        payload.put_u32_le(0);
        payload.put_u32_le(1);
        // single event: next offset 0
        payload.put_u32_le(0);
        payload.put_u32_le(self.mask);
        payload.put_u64_le(0);
        put_name(&mut payload, self.share.as_bytes());
        put_name(&mut payload, &CpName::encode_path(self.relative));

        let mut out = BytesMut::with_capacity(super::header::SESSION_HEADER_SIZE + payload.len());
        put_session_header(
            &mut out,
            self.request_id,
            HgfsOp::NotifyV4.as_u32(),
            HgfsStatus::Success,
            0,
            HEADER_FLAG_REQUEST,
            self.session_id,
            payload.len(),
        );
        out.put_slice(&payload);
        out.freeze()
    }
}
