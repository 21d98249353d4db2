//! Negotiated and bookkeeping state of a session.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

use crate::hgfs::protocol::HgfsOp;

bitflags! {
    /// Features negotiated by CREATE_SESSION.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionFlags: u32 {
        const MAXPACKETSIZE_VALID = 1 << 0;
        const CHANGENOTIFY = 1 << 1;
        const OPLOCK = 1 << 2;
        const ASYNC_IO = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CapFlags: u32 {
        const SUPPORTED = 1 << 0;
        /// Supported only over the session-aware header.
        const REQUIRES_SESSION = 1 << 1;
    }
}

/// One row of the capability table reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub op: u32,
    pub flags: CapFlags,
}

/// Capability table for a session with `flags`.
pub fn capability_table(flags: SessionFlags) -> Vec<Capability> {
    HgfsOp::ALL
        .iter()
        .map(|op| {
            let descriptor = op.descriptor();
            let mut cap = CapFlags::empty();
            let usable = match op {
                HgfsOp::SetWatchV4 | HgfsOp::RemoveWatchV4 | HgfsOp::NotifyV4 => {
                    flags.contains(SessionFlags::CHANGENOTIFY)
                }
                HgfsOp::ServerLockChange | HgfsOp::ServerLockChangeV3 => {
                    flags.contains(SessionFlags::OPLOCK)
                }
                _ => descriptor.supported,
            };
            if usable {
                cap |= CapFlags::SUPPORTED;
            }
            if descriptor.generation == crate::hgfs::protocol::Generation::V4 {
                cap |= CapFlags::REQUIRES_SESSION;
            }
            Capability {
                op: op.as_u32(),
                flags: cap,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Closed,
}

/// Inactivity tracking driven by the periodic sweep.
#[derive(Debug, Default)]
pub struct InactivityTracker {
    inactive: AtomicBool,
    sweeps: AtomicU32,
}

impl InactivityTracker {
    /// A request used the session.
    pub fn touch(&self) {
        self.inactive.store(false, Ordering::SeqCst);
        self.sweeps.store(0, Ordering::SeqCst);
    }

    /// Record one sweep. Returns the number of consecutive sweeps the
    /// session has now been idle for.
    pub fn sweep(&self) -> u32 {
        if self.inactive.swap(true, Ordering::SeqCst) {
            self.sweeps.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.sweeps.store(0, Ordering::SeqCst);
            0
        }
    }

    pub fn idle_sweeps(&self) -> u32 {
        self.sweeps.load(Ordering::SeqCst)
    }
}

/// Outstanding asynchronous requests, waited on by quiesce.
#[derive(Debug, Default)]
pub struct AsyncCounter {
    count: Mutex<u32>,
    idle: Condvar,
}

impl AsyncCounter {
    pub fn begin(&self) {
        *self.count.lock() += 1;
    }

    pub fn end(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn pending(&self) -> u32 {
        *self.count.lock()
    }

    /// Block until no asynchronous request is outstanding.
    pub fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}
