mod common;

use bytes::{Buf, Bytes};

use common::{Harness, read_data, take_name, test_config};
use rustedbytes_hgfs::hgfs::policy::ShareInfo;
use rustedbytes_hgfs::hgfs::protocol::HgfsOp;
use rustedbytes_hgfs::hgfs::protocol::header::{self, HeaderKind};
use rustedbytes_hgfs::hgfs::protocol::reply::{SEARCH_V4_FLAG_FINAL, SEARCH_V4_REPLY_HEADER};
use rustedbytes_hgfs::hgfs::protocol::request::build;
use rustedbytes_hgfs::hgfs::protocol::wire::ATTR_V2_SIZE;
use rustedbytes_hgfs::hgfs::session_state::SessionFlags;
use rustedbytes_hgfs::hgfs::types::{
    AccessMode, AttrMask, FileAttr, OpenDisposition, OpenMode, OpenModeFlags, ServerLock,
};
use rustedbytes_hgfs::{EngineConfig, HgfsStatus, ServerCallbacks};

fn v4_entry_size(name: &str) -> u32 {
    (4 + ATTR_V2_SIZE + 4 + name.len()) as u32
}

/// Names in a SEARCH_READ_V4 reply, plus its flags.
fn search_v4_names(mut payload: Bytes) -> (Vec<String>, u32) {
    let count = payload.get_u32_le();
    let _offset = payload.get_u32_le();
    let flags = payload.get_u32_le();
    payload.advance(8);
    let names = (0..count)
        .map(|_| {
            payload.advance(4 + ATTR_V2_SIZE);
            String::from_utf8(take_name(&mut payload)).unwrap()
        })
        .collect();
    (names, flags)
}

#[test]
fn open_write_read_close() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    let handle = h.open(session, b"docs\0a.txt", AccessMode::ReadWrite);
    let response = h.call_v4(
        HgfsOp::WriteV3,
        session,
        &build::write(handle, 0, b"hello world", false, true),
    );
    response.assert_ok();
    assert_eq!(response.reader().get_u32_le(), 11);

    let response = h.read(session, handle, 6, 100);
    response.assert_ok();
    assert_eq!(&read_data(&response)[..], b"world");

    h.call_v4(HgfsOp::CloseV3, session, &build::handle_only(handle, true))
        .assert_ok();
    assert_eq!(std::fs::read(h.docs_path("a.txt")).unwrap(), b"hello world");

    let response = h.read(session, handle, 0, 10);
    assert_eq!(response.status(), HgfsStatus::InvalidHandle);
    assert!(response.payload.is_empty());
}

#[test]
fn handles_are_unique_across_sessions() {
    let mut h = Harness::new(test_config());
    let s1 = h.create_session(SessionFlags::empty());
    let s2 = h.create_session(SessionFlags::empty());
    h.write_file("a", b"a");

    let a = h.open(s1, b"docs\0a", AccessMode::ReadOnly);
    let b = h.open(s2, b"docs\0a", AccessMode::ReadOnly);
    let c = h.open(s1, b"docs\0a", AccessMode::ReadOnly);
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);

    // A handle belongs to the session that opened it.
    assert_eq!(h.read(s2, a, 0, 1).status(), HgfsStatus::InvalidHandle);
}

#[test]
fn session_limit_is_enforced() {
    let mut h = Harness::new(EngineConfig {
        max_sessions_per_transport: 2,
        ..test_config()
    });
    h.create_session(SessionFlags::empty());
    h.create_session(SessionFlags::empty());

    let response = h.call_v4(
        HgfsOp::CreateSessionV4,
        0,
        &build::create_session(0, 0),
    );
    assert_eq!(response.status(), HgfsStatus::TooManySessions);
    assert!(response.payload.is_empty());
    assert_eq!(h.transport.session_count(), 2);
}

#[test]
fn search_read_v4_packs_by_reply_size() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());
    h.write_file("listing/x", b"");

    let response = h.call_v4(
        HgfsOp::SearchOpenV3,
        session,
        &build::search_open_v3(b"docs\0listing"),
    );
    response.assert_ok();
    let search = response.reader().get_u32_le();

    // Room for "." and ".." only.
    let capacity = SEARCH_V4_REPLY_HEADER as u32 + v4_entry_size(".") + v4_entry_size("..");
    let response = h.call_v4(
        HgfsOp::SearchReadV4,
        session,
        &build::search_read_v4(search, 0, capacity),
    );
    response.assert_ok();
    let (names, flags) = search_v4_names(response.reader());
    assert_eq!(names, vec![".", ".."]);
    assert_eq!(flags & SEARCH_V4_FLAG_FINAL, 0);

    let response = h.call_v4(
        HgfsOp::SearchReadV4,
        session,
        &build::search_read_v4(search, 2, 4096),
    );
    response.assert_ok();
    let (names, flags) = search_v4_names(response.reader());
    assert_eq!(names, vec!["x"]);
    assert_eq!(flags & SEARCH_V4_FLAG_FINAL, SEARCH_V4_FLAG_FINAL);

    h.call_v4(HgfsOp::SearchCloseV3, session, &build::handle_only(search, true))
        .assert_ok();
    let response = h.call_v4(
        HgfsOp::SearchReadV4,
        session,
        &build::search_read_v4(search, 0, 4096),
    );
    assert_eq!(response.status(), HgfsStatus::InvalidHandle);
}

#[test]
fn base_search_lists_shares() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    let response = h.call_v4(HgfsOp::SearchOpenV3, session, &build::search_open_v3(b""));
    response.assert_ok();
    let search = response.reader().get_u32_le();

    let mut names = Vec::new();
    for index in 0.. {
        let response = h.call_v4(
            HgfsOp::SearchReadV3,
            session,
            &build::search_read_v3(search, index),
        );
        response.assert_ok();
        let mut payload = response.reader();
        payload.advance(8 + ATTR_V2_SIZE);
        let name = String::from_utf8(take_name(&mut payload)).unwrap();
        if name.is_empty() {
            break;
        }
        names.push(name);
    }
    assert_eq!(names, vec![".", "..", "docs", "other"]);
}

#[test]
fn evicted_node_reopens_on_demand() {
    let mut h = Harness::new(EngineConfig {
        max_cached_open_nodes: 2,
        max_cached_locked_nodes: 1,
        ..test_config()
    });
    let session = h.create_session(SessionFlags::empty());
    for name in ["a", "b", "c"] {
        h.write_file(name, name.as_bytes());
    }

    let a = h.open(session, b"docs\0a", AccessMode::ReadOnly);
    let _b = h.open(session, b"docs\0b", AccessMode::ReadOnly);
    let _c = h.open(session, b"docs\0c", AccessMode::ReadOnly);

    let response = h.read(session, a, 0, 10);
    response.assert_ok();
    assert_eq!(&read_data(&response)[..], b"a");
}

#[test]
fn renamed_node_reopens_under_new_name() {
    let mut h = Harness::new(EngineConfig {
        max_cached_open_nodes: 1,
        max_cached_locked_nodes: 1,
        ..test_config()
    });
    let session = h.create_session(SessionFlags::empty());
    h.write_file("a.txt", b"moved");
    h.write_file("c.txt", b"");

    let a = h.open(session, b"docs\0a.txt", AccessMode::ReadOnly);
    h.call_v4(
        HgfsOp::RenameV3,
        session,
        &build::rename_v3(b"docs\0a.txt", b"docs\0b.txt"),
    )
    .assert_ok();
    // Evicts `a`, whose reopen must use the new name.
    h.open(session, b"docs\0c.txt", AccessMode::ReadOnly);

    let response = h.read(session, a, 0, 10);
    response.assert_ok();
    assert_eq!(&read_data(&response)[..], b"moved");
}

#[test]
fn locked_path_is_busy() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::OPLOCK);
    h.write_file("locked", b"x");

    let (_handle, lock) = h.open_with(
        session,
        b"docs\0locked",
        AccessMode::ReadWrite,
        OpenDisposition::Open,
        ServerLock::Exclusive,
    );
    assert_eq!(lock, ServerLock::Exclusive);

    let attr = FileAttr {
        mask: AttrMask::SIZE,
        size: 0,
        ..Default::default()
    };
    let response = h.call_v4(
        HgfsOp::SetAttrV3,
        session,
        &build::set_attr_v3(&attr, b"docs\0locked", None),
    );
    assert_eq!(response.status(), HgfsStatus::SharingViolation);

    let response = h.call_v4(
        HgfsOp::DeleteFileV3,
        session,
        &build::delete_v3(b"docs\0locked", None),
    );
    assert_eq!(response.status(), HgfsStatus::SharingViolation);
    assert!(h.docs_path("locked").exists());
}

#[test]
fn lock_not_granted_without_negotiation() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());
    h.write_file("f", b"x");

    let (handle, lock) = h.open_with(
        session,
        b"docs\0f",
        AccessMode::ReadOnly,
        OpenDisposition::Open,
        ServerLock::Shared,
    );
    assert_eq!(lock, ServerLock::None);

    let response = h.call_v4(
        HgfsOp::ServerLockChangeV3,
        session,
        &build::server_lock_change(handle, ServerLock::Exclusive),
    );
    response.assert_ok();
    assert_eq!(response.reader().get_u32_le(), ServerLock::None as u32);
}

#[test]
fn share_root_cannot_be_deleted_or_renamed() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    let response = h.call_v4(
        HgfsOp::DeleteDirV3,
        session,
        &build::delete_v3(b"docs", None),
    );
    assert_eq!(response.status(), HgfsStatus::AccessDenied);

    let response = h.call_v4(
        HgfsOp::RenameV3,
        session,
        &build::rename_v3(b"docs", b"other\0docs"),
    );
    assert_eq!(response.status(), HgfsStatus::AccessDenied);
}

#[test]
fn read_only_share_refuses_writes() {
    let mut h = Harness::new(test_config());
    let root = h.docs.path().canonicalize().unwrap();
    h.policy
        .set_shares(vec![ShareInfo::new("docs", root).read_only()]);
    let session = h.create_session(SessionFlags::empty());
    h.write_file("r", b"r");

    h.open_with(
        session,
        b"docs\0r",
        AccessMode::ReadOnly,
        OpenDisposition::Open,
        ServerLock::None,
    );
    let response = h.call_v4(
        HgfsOp::OpenV3,
        session,
        &build::open_v3(
            OpenMode {
                access: AccessMode::WriteOnly,
                flags: OpenModeFlags::empty(),
            },
            OpenDisposition::Open,
            6,
            ServerLock::None,
            b"docs\0r",
        ),
    );
    assert_eq!(response.status(), HgfsStatus::AccessDenied);

    let response = h.call_v4(
        HgfsOp::CreateDirV3,
        session,
        &build::create_dir_v3(7, b"docs\0d"),
    );
    assert_eq!(response.status(), HgfsStatus::AccessDenied);
}

#[test]
fn directories_are_created_and_removed() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    h.call_v4(HgfsOp::CreateDirV3, session, &build::create_dir_v3(7, b"docs\0d"))
        .assert_ok();
    assert!(h.docs_path("d").is_dir());

    let response = h.call_v4(HgfsOp::CreateDirV3, session, &build::create_dir_v3(7, b"docs\0d"));
    assert_eq!(response.status(), HgfsStatus::FileExists);

    h.call_v4(HgfsOp::DeleteDirV3, session, &build::delete_v3(b"docs\0d", None))
        .assert_ok();
    assert!(!h.docs_path("d").exists());
}

#[test]
fn getattr_by_name_and_handle() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());
    h.write_file("sized", &[0u8; 42]);

    let response = h.call_v4(
        HgfsOp::GetAttrV3,
        session,
        &build::get_attr_v3(b"docs\0sized", None),
    );
    response.assert_ok();

    let handle = h.open(session, b"docs\0sized", AccessMode::ReadOnly);
    let by_handle = h.call_v4(
        HgfsOp::GetAttrV3,
        session,
        &build::get_attr_v3(b"", Some(handle)),
    );
    by_handle.assert_ok();
    // Type and size lead the V2 attribute record after its mask.
    let size_of = |payload: Bytes| {
        let mut p = payload;
        p.advance(8 + 4);
        p.get_u64_le()
    };
    assert_eq!(size_of(response.reader()), 42);
    assert_eq!(size_of(by_handle.reader()), 42);

    let response = h.call_v4(
        HgfsOp::GetAttrV3,
        session,
        &build::get_attr_v3(b"docs\0missing", None),
    );
    assert_eq!(response.status(), HgfsStatus::NoSuchFileOrDir);
}

#[cfg(unix)]
#[test]
fn symlinks_stay_inside_the_share() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());
    h.write_file("target", b"t");

    h.call_v4(
        HgfsOp::CreateSymlinkV3,
        session,
        &build::create_symlink_v3(b"docs\0link", b"target"),
    )
    .assert_ok();
    assert_eq!(
        std::fs::read_link(h.docs_path("link")).unwrap(),
        std::path::PathBuf::from("target")
    );

    let response = h.call_v4(
        HgfsOp::CreateSymlinkV3,
        session,
        &build::create_symlink_v3(b"docs\0escape", b"..\0..\0etc"),
    );
    assert_eq!(response.status(), HgfsStatus::AccessDenied);
}

#[test]
fn volume_info_for_share_and_base() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    let share = h.call_v4(
        HgfsOp::QueryVolumeInfoV3,
        session,
        &build::query_volume_v3(b"docs"),
    );
    share.assert_ok();
    let base = h.call_v4(HgfsOp::QueryVolumeInfoV3, session, &build::query_volume_v3(b""));
    base.assert_ok();

    let total = |payload: Bytes| {
        let mut p = payload;
        p.advance(8);
        p.get_u64_le()
    };
    assert!(total(base.reader()) >= total(share.reader()));
}

#[test]
fn stale_session_id_is_reported() {
    let mut h = Harness::new(test_config());
    let response = h.call_v4(
        HgfsOp::GetAttrV3,
        0x1234,
        &build::get_attr_v3(b"", None),
    );
    assert_eq!(response.status(), HgfsStatus::StaleSession);
}

#[test]
fn destroyed_session_becomes_stale() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    h.call_v4(HgfsOp::DestroySessionV4, session, &build::destroy_session())
        .assert_ok();
    assert_eq!(h.transport.session_count(), 0);

    let response = h.call_v4(HgfsOp::GetAttrV3, session, &build::get_attr_v3(b"", None));
    assert_eq!(response.status(), HgfsStatus::StaleSession);
}

#[test]
fn legacy_header_uses_default_session() {
    let mut h = Harness::new(test_config());
    h.write_file("legacy", b"old protocol");

    let response = h.call(
        HeaderKind::Legacy,
        HgfsOp::GetAttrV3,
        0,
        &build::get_attr_v3(b"docs\0legacy", None),
    );
    response.assert_ok();
    let response = h.call(
        HeaderKind::Legacy,
        HgfsOp::GetAttrV3,
        0,
        &build::get_attr_v3(b"", None),
    );
    response.assert_ok();
    assert_eq!(h.transport.session_count(), 1);
}

#[test]
fn short_packet_is_dropped() {
    let h = Harness::new(test_config());
    h.server
        .receive(&h.transport, Bytes::from_static(&[1, 0, 0, 0]));
    assert_eq!(h.channel.len(), 0);
}

#[test]
fn malformed_requests_get_protocol_errors() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());

    // Unknown opcode.
    let packet = header::encode_request(HeaderKind::Legacy, 7, 99, 0, &[]);
    h.server.receive(&h.transport, packet);
    let reply = h.channel.take().remove(0);
    let parsed = header::parse_reply(&reply, HeaderKind::Legacy).unwrap();
    assert_eq!(parsed.request_id, 7);
    assert_eq!(HgfsStatus::from_u32(parsed.status), HgfsStatus::ProtocolError);

    // Undersized payload.
    let response = h.call_v4(HgfsOp::ReadV3, session, &[0u8; 4]);
    assert_eq!(response.status(), HgfsStatus::ProtocolError);
    assert!(response.payload.is_empty());

    // Session ops need a session header.
    let response = h.call(
        HeaderKind::Legacy,
        HgfsOp::CreateSessionV4,
        0,
        &build::create_session(0, 0),
    );
    assert_eq!(response.status(), HgfsStatus::ProtocolError);

    // Notifications only travel server to client.
    let response = h.call_v4(HgfsOp::NotifyV4, session, &[]);
    assert_eq!(response.status(), HgfsStatus::ProtocolError);
}

#[test]
fn unsupported_ops_are_refused() {
    let mut h = Harness::new(test_config());
    let session = h.create_session(SessionFlags::empty());
    for op in [HgfsOp::WriteWin32StreamV3, HgfsOp::ReadFastV4, HgfsOp::WriteFastV4] {
        let response = h.call_v4(op, session, &[0u8; 64]);
        assert_eq!(response.status(), HgfsStatus::OperationNotSupported, "{op:?}");
    }
}
