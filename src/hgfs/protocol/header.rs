//! Request and reply headers.
//!
//! Legacy packets start with `id u32, op u32`. Session-aware packets
//! carry a 52 byte header whose second word is the 0xFF marker, a value
//! no legacy opcode uses.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{HgfsError, HgfsResult, HgfsStatus};

pub const LEGACY_HEADER_SIZE: usize = 8;
pub const SESSION_HEADER_SIZE: usize = 52;
pub const SESSION_HEADER_VERSION: u8 = 1;
pub const SESSION_HEADER_MARKER: u32 = 0xFF;

pub const HEADER_FLAG_REQUEST: u32 = 1 << 0;
pub const HEADER_FLAG_REPLY: u32 = 1 << 1;
pub const HEADER_FLAG_INFO_EXTERROR: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Legacy,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: HeaderKind,
    pub request_id: u32,
    pub op: u32,
    pub session_id: u64,
    /// Offset of the op payload.
    pub header_size: usize,
    /// End of the packet; bytes past it are ignored.
    pub packet_size: usize,
}

/// Result of header parsing. `Malformed` still knows enough to address
/// a protocol-error reply.
#[derive(Debug)]
pub enum ParsedHeader {
    Ok(PacketHeader),
    Malformed(PacketHeader, HgfsError),
}

/// Parse the header of `packet`. Packets too short to carry a request
/// id and opcode are an error: there is no one to reply to.
pub fn parse(packet: &[u8]) -> HgfsResult<ParsedHeader> {
    if packet.len() < LEGACY_HEADER_SIZE {
        return Err(HgfsError::Protocol(format!(
            "packet of {} bytes has no header",
            packet.len()
        )));
    }

    let mut buf = packet;
    let first = buf.get_u32_le();
    let second = buf.get_u32_le();

    if second != SESSION_HEADER_MARKER || packet.len() < SESSION_HEADER_SIZE {
        return Ok(ParsedHeader::Ok(PacketHeader {
            kind: HeaderKind::Legacy,
            request_id: first,
            op: second,
            session_id: 0,
            header_size: LEGACY_HEADER_SIZE,
            packet_size: packet.len(),
        }));
    }

    let version = (first & 0xFF) as u8;
    let packet_size = buf.get_u32_le() as usize;
    let header_size = buf.get_u32_le() as usize;
    let request_id = buf.get_u32_le();
    let op = buf.get_u32_le();
    let _status = buf.get_u32_le();
    let _flags = buf.get_u32_le();
    let _information = buf.get_u32_le();
    let session_id = buf.get_u64_le();

    let header = PacketHeader {
        kind: HeaderKind::Session,
        request_id,
        op,
        session_id,
        header_size: SESSION_HEADER_SIZE,
        packet_size: packet.len(),
    };

    if version != SESSION_HEADER_VERSION {
        let e = HgfsError::Protocol(format!("header version {version}"));
        return Ok(ParsedHeader::Malformed(header, e));
    }
    if header_size < SESSION_HEADER_SIZE || header_size > packet.len() {
        let e = HgfsError::Protocol(format!("header size {header_size}"));
        return Ok(ParsedHeader::Malformed(header, e));
    }
    if packet_size > packet.len() || packet_size < header_size {
        let e = HgfsError::Protocol(format!(
            "packet size {packet_size} vs {} received",
            packet.len()
        ));
        return Ok(ParsedHeader::Malformed(header, e));
    }

    Ok(ParsedHeader::Ok(PacketHeader {
        header_size,
        packet_size,
        ..header
    }))
}

/// Write a session header for a packet with `payload_len` bytes of
/// payload.
#[allow(clippy::too_many_arguments)]
pub fn put_session_header(
    out: &mut BytesMut,
    request_id: u32,
    op: u32,
    status: HgfsStatus,
    information: u32,
    flags: u32,
    session_id: u64,
    payload_len: usize,
) {
    let flags = if information != 0 {
        flags | HEADER_FLAG_INFO_EXTERROR
    } else {
        flags
    };
    out.put_u8(SESSION_HEADER_VERSION);
    out.put_bytes(0, 3);
    out.put_u32_le(SESSION_HEADER_MARKER);
    out.put_u32_le((SESSION_HEADER_SIZE + payload_len) as u32);
    out.put_u32_le(SESSION_HEADER_SIZE as u32);
    out.put_u32_le(request_id);
    out.put_u32_le(op);
    out.put_u32_le(status.as_u32());
    out.put_u32_le(flags);
    out.put_u32_le(information);
    out.put_u64_le(session_id);
    out.put_u64_le(0);
}

/// Frame a reply to `header`.
pub fn encode_reply(
    header: &PacketHeader,
    status: HgfsStatus,
    information: u32,
    session_id: u64,
    payload: &[u8],
) -> Bytes {
    match header.kind {
        HeaderKind::Legacy => {
            let mut out = BytesMut::with_capacity(LEGACY_HEADER_SIZE + payload.len());
            out.put_u32_le(header.request_id);
            out.put_u32_le(status.as_u32());
            out.put_slice(payload);
            out.freeze()
        }
        HeaderKind::Session => {
            let mut out = BytesMut::with_capacity(SESSION_HEADER_SIZE + payload.len());
            put_session_header(
                &mut out,
                header.request_id,
                header.op,
                status,
                information,
                HEADER_FLAG_REPLY,
                session_id,
                payload.len(),
            );
            out.put_slice(payload);
            out.freeze()
        }
    }
}

/// Build a request packet. Clients and tests use this; the server only
/// parses requests.
pub fn encode_request(kind: HeaderKind, request_id: u32, op: u32, session_id: u64, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::new();
    match kind {
        HeaderKind::Legacy => {
            out.put_u32_le(request_id);
            out.put_u32_le(op);
        }
        HeaderKind::Session => put_session_header(
            &mut out,
            request_id,
            op,
            HgfsStatus::Success,
            0,
            HEADER_FLAG_REQUEST,
            session_id,
            payload.len(),
        ),
    }
    out.put_slice(payload);
    out.freeze()
}

/// Decoded reply header, for clients and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHeader {
    pub request_id: u32,
    pub op: Option<u32>,
    pub status: u32,
    pub flags: u32,
    pub session_id: u64,
    pub header_size: usize,
}

pub fn parse_reply(packet: &[u8], kind: HeaderKind) -> HgfsResult<ReplyHeader> {
    let mut buf = packet;
    match kind {
        HeaderKind::Legacy => {
            if buf.len() < LEGACY_HEADER_SIZE {
                return Err(HgfsError::Protocol("short reply".into()));
            }
            Ok(ReplyHeader {
                request_id: buf.get_u32_le(),
                op: None,
                status: buf.get_u32_le(),
                flags: 0,
                session_id: 0,
                header_size: LEGACY_HEADER_SIZE,
            })
        }
        HeaderKind::Session => {
            if buf.len() < SESSION_HEADER_SIZE {
                return Err(HgfsError::Protocol("short reply".into()));
            }
            buf.advance(12);
            let header_size = buf.get_u32_le() as usize;
            let request_id = buf.get_u32_le();
            let op = buf.get_u32_le();
            let status = buf.get_u32_le();
            let flags = buf.get_u32_le();
            let _information = buf.get_u32_le();
            let session_id = buf.get_u64_le();
            Ok(ReplyHeader {
                request_id,
                op: Some(op),
                status,
                flags,
                session_id,
                header_size,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_packet_is_unaddressable() {
        assert!(parse(&[1, 2, 3]).is_err());
    }

    #[test]
    fn legacy_header() {
        let packet = encode_request(HeaderKind::Legacy, 9, 3, 0, &[0; 4]);
        let ParsedHeader::Ok(header) = parse(&packet).unwrap() else {
            panic!("malformed");
        };
        assert_eq!(header.kind, HeaderKind::Legacy);
        assert_eq!((header.request_id, header.op), (9, 3));
        assert_eq!(header.header_size, LEGACY_HEADER_SIZE);
    }

    #[test]
    fn session_header_carries_session_id() {
        let packet = encode_request(HeaderKind::Session, 5, 41, 0xABCD, &[0; 16]);
        let ParsedHeader::Ok(header) = parse(&packet).unwrap() else {
            panic!("malformed");
        };
        assert_eq!(header.kind, HeaderKind::Session);
        assert_eq!(header.session_id, 0xABCD);
        assert_eq!(header.op, 41);

        let reply = encode_reply(&header, HgfsStatus::StaleSession, 0, 0xABCD, &[]);
        let decoded = parse_reply(&reply, HeaderKind::Session).unwrap();
        assert_eq!(decoded.request_id, 5);
        assert_eq!(decoded.status, HgfsStatus::StaleSession.as_u32());
        assert_eq!(decoded.flags & HEADER_FLAG_REPLY, HEADER_FLAG_REPLY);
    }

    #[test]
    fn trailing_bytes_fall_outside_the_packet() {
        let mut packet = encode_request(HeaderKind::Session, 5, 31, 1, &[7; 8]).to_vec();
        packet.extend_from_slice(&[0xEE; 16]);
        let ParsedHeader::Ok(header) = parse(&packet).unwrap() else {
            panic!("malformed");
        };
        assert_eq!(header.packet_size, SESSION_HEADER_SIZE + 8);
        assert_eq!(header.packet_size, packet.len() - 16);
    }

    #[test]
    fn bad_header_size_is_still_addressable() {
        let mut packet = encode_request(HeaderKind::Session, 5, 41, 1, &[]).to_vec();
        packet[12..16].copy_from_slice(&4u32.to_le_bytes());
        match parse(&packet).unwrap() {
            ParsedHeader::Malformed(header, _) => assert_eq!(header.request_id, 5),
            ParsedHeader::Ok(_) => panic!("accepted bad header size"),
        }
    }
}
