#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use tempfile::TempDir;

use rustedbytes_hgfs::hgfs::TransportSession;
use rustedbytes_hgfs::hgfs::notify::MemoryNotifier;
use rustedbytes_hgfs::hgfs::platform::{LocalPlatform, Platform};
use rustedbytes_hgfs::hgfs::policy::{ShareInfo, StaticPolicy};
use rustedbytes_hgfs::hgfs::protocol::header::{self, HeaderKind, ReplyHeader};
use rustedbytes_hgfs::hgfs::protocol::request::build;
use rustedbytes_hgfs::hgfs::protocol::HgfsOp;
use rustedbytes_hgfs::hgfs::session_state::SessionFlags;
use rustedbytes_hgfs::hgfs::types::{
    AccessMode, HgfsHandle, OpenDisposition, OpenMode, OpenModeFlags, ServerLock,
};
use rustedbytes_hgfs::{
    AsyncStrategy, Channel, ChannelCaps, EngineConfig, HgfsResult, HgfsServer, HgfsStatus,
    ServerCallbacks,
};

/// Channel that keeps every packet the engine sends.
pub struct Recorder {
    packets: Mutex<Vec<Bytes>>,
    caps: ChannelCaps,
}

impl Recorder {
    pub fn new(caps: ChannelCaps) -> Self {
        Self {
            packets: Mutex::new(Vec::new()),
            caps,
        }
    }

    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.packets.lock())
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    /// Wait for `n` packets to arrive from worker threads.
    pub fn wait_for(&self, n: usize) -> Vec<Bytes> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.len() < n && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.take()
    }
}

impl Channel for Recorder {
    fn send(&self, packet: Bytes) -> HgfsResult<()> {
        self.packets.lock().push(packet);
        Ok(())
    }

    fn capabilities(&self) -> ChannelCaps {
        self.caps
    }
}

pub struct Response {
    pub header: ReplyHeader,
    pub payload: Bytes,
}

impl Response {
    pub fn parse(packet: Bytes, kind: HeaderKind) -> Self {
        let header = header::parse_reply(&packet, kind).unwrap();
        let payload = packet.slice(header.header_size..);
        Self { header, payload }
    }

    pub fn status(&self) -> HgfsStatus {
        HgfsStatus::from_u32(self.header.status)
    }

    pub fn assert_ok(&self) -> &Self {
        assert_eq!(self.status(), HgfsStatus::Success);
        self
    }

    pub fn reader(&self) -> Bytes {
        self.payload.clone()
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        async_strategy: AsyncStrategy::Disabled,
        ..Default::default()
    }
}

pub struct Harness {
    pub docs: TempDir,
    pub other: TempDir,
    pub policy: Arc<StaticPolicy>,
    pub notifier: Arc<MemoryNotifier>,
    pub server: HgfsServer,
    pub channel: Arc<Recorder>,
    pub transport: Arc<TransportSession>,
    next_id: u32,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_caps(config, ChannelCaps::NOTIFY)
    }

    pub fn with_caps(config: EngineConfig, caps: ChannelCaps) -> Self {
        Self::with_platform(config, caps, Arc::new(LocalPlatform::new()))
    }

    pub fn with_platform(
        config: EngineConfig,
        caps: ChannelCaps,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let docs = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let policy = Arc::new(StaticPolicy::new(vec![
            ShareInfo::new("docs", docs.path().canonicalize().unwrap()),
            ShareInfo::new("other", other.path().canonicalize().unwrap()),
        ]));
        let notifier = Arc::new(MemoryNotifier::new());
        let server = HgfsServer::init(
            config,
            policy.clone(),
            platform,
            notifier.clone(),
        )
        .unwrap();
        let channel = Arc::new(Recorder::new(caps));
        let transport = server.connect(channel.clone()).unwrap();

        Self {
            docs,
            other,
            policy,
            notifier,
            server,
            channel,
            transport,
            next_id: 1,
        }
    }

    pub fn docs_path(&self, relative: &str) -> PathBuf {
        self.docs.path().canonicalize().unwrap().join(relative)
    }

    pub fn write_file(&self, relative: &str, contents: &[u8]) {
        let path = self.docs_path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Hand one request to the engine; returns its request id.
    pub fn send(&mut self, kind: HeaderKind, op: HgfsOp, session: u64, payload: &[u8]) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let packet = header::encode_request(kind, id, op.as_u32(), session, payload);
        self.server.receive(&self.transport, packet);
        id
    }

    /// Send a request and return the single reply it produced.
    pub fn call(&mut self, kind: HeaderKind, op: HgfsOp, session: u64, payload: &[u8]) -> Response {
        let id = self.send(kind, op, session, payload);
        let mut packets = self.channel.take();
        assert_eq!(packets.len(), 1, "expected one reply to {op:?}");
        let response = Response::parse(packets.remove(0), kind);
        assert_eq!(response.header.request_id, id);
        response
    }

    pub fn call_v4(&mut self, op: HgfsOp, session: u64, payload: &[u8]) -> Response {
        self.call(HeaderKind::Session, op, session, payload)
    }

    pub fn create_session(&mut self, flags: SessionFlags) -> u64 {
        let response = self.call_v4(
            HgfsOp::CreateSessionV4,
            0,
            &build::create_session(0, flags.bits()),
        );
        response.assert_ok();
        let id = response.reader().get_u64_le();
        assert_eq!(response.header.session_id, id);
        id
    }

    pub fn open(&mut self, session: u64, name: &[u8], access: AccessMode) -> HgfsHandle {
        self.open_with(session, name, access, OpenDisposition::OpenCreate, ServerLock::None)
            .0
    }

    pub fn open_with(
        &mut self,
        session: u64,
        name: &[u8],
        access: AccessMode,
        disposition: OpenDisposition,
        lock: ServerLock,
    ) -> (HgfsHandle, ServerLock) {
        let mode = OpenMode {
            access,
            flags: OpenModeFlags::empty(),
        };
        let response = self.call_v4(
            HgfsOp::OpenV3,
            session,
            &build::open_v3(mode, disposition, 6, lock, name),
        );
        response.assert_ok();
        let mut payload = response.reader();
        let handle = payload.get_u32_le();
        let lock = ServerLock::try_from(payload.get_u32_le()).unwrap();
        (handle, lock)
    }

    pub fn read(&mut self, session: u64, handle: HgfsHandle, offset: u64, size: u32) -> Response {
        self.call_v4(HgfsOp::ReadV3, session, &build::read(handle, offset, size, true))
    }
}

/// Data of a READ_V3 reply.
pub fn read_data(response: &Response) -> Bytes {
    let mut payload = response.reader();
    let len = payload.get_u32_le() as usize;
    payload.advance(8);
    payload.slice(..len)
}

/// Length-prefixed name at the front of `buf`.
pub fn take_name(buf: &mut Bytes) -> Vec<u8> {
    let len = buf.get_u32_le() as usize;
    buf.split_to(len).to_vec()
}

pub fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().as_bytes().to_vec()
}
