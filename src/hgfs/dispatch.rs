//! Request dispatch: header parsing, session resolution, inline or
//! asynchronous execution, and reply completion.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, warn};

use crate::error::{HgfsError, HgfsResult, HgfsStatus};
use crate::hgfs::engine::ServerContext;
use crate::hgfs::executor::Job;
use crate::hgfs::handlers;
use crate::hgfs::protocol::header::{self, HeaderKind, PacketHeader, ParsedHeader};
use crate::hgfs::protocol::{Generation, HgfsOp, Reply, Request};
use crate::hgfs::session::Session;
use crate::hgfs::session_state::SessionFlags;
use crate::hgfs::transport::TransportSession;

/// Everything a handler needs for one request. Holding the context
/// keeps its session and transport session alive; dropping it releases
/// both.
pub struct RequestContext {
    pub server: Arc<ServerContext>,
    pub transport: Arc<TransportSession>,
    /// `None` only for CREATE_SESSION, which has no session yet.
    pub session: Option<Arc<Session>>,
    pub header: PacketHeader,
    pub op: HgfsOp,
}

impl RequestContext {
    pub fn session(&self) -> HgfsResult<&Arc<Session>> {
        self.session
            .as_ref()
            .ok_or(HgfsError::StaleSession(self.header.session_id))
    }

    fn reply_session_id(&self, reply: Option<&Reply>) -> u64 {
        match (reply, &self.session) {
            (Some(Reply::Session { id, .. }), _) => *id,
            (_, Some(session)) => session.id(),
            (_, None) => self.header.session_id,
        }
    }

    fn is_async(&self) -> bool {
        self.op.descriptor().async_capable
            && self.transport.supports_async()
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.flags().contains(SessionFlags::ASYNC_IO))
            && self.server.executor_active()
    }
}

/// Entry point for one received packet.
pub(crate) fn receive(
    server: &Arc<ServerContext>,
    transport: &Arc<TransportSession>,
    packet: Bytes,
) {
    let header = match header::parse(&packet) {
        Ok(ParsedHeader::Ok(header)) => header,
        Ok(ParsedHeader::Malformed(header, e)) => {
            warn!("transport session {}: {}", transport.id(), e);
            send_error(transport, &header, &e);
            return;
        }
        Err(e) => {
            error!("transport session {}: dropping packet: {}", transport.id(), e);
            return;
        }
    };

    let ctx = match get_request(server, transport, &header) {
        Ok(ctx) => ctx,
        Err(e) => {
            debug!(
                "transport session {}: rejecting request {}: {}",
                transport.id(),
                header.request_id,
                e
            );
            send_error(transport, &header, &e);
            return;
        }
    };

    let payload = packet.slice(ctx.header.header_size..ctx.header.packet_size);
    drop(packet);
    dispatch(ctx, payload);
}

/// Resolve the opcode and the session a request runs against.
fn get_request(
    server: &Arc<ServerContext>,
    transport: &Arc<TransportSession>,
    header: &PacketHeader,
) -> HgfsResult<RequestContext> {
    let op = HgfsOp::try_from(header.op)?;
    let generation = op.generation();

    match header.kind {
        HeaderKind::Legacy if generation == Generation::V4 => {
            return Err(HgfsError::Protocol(format!(
                "{op:?} requires a session header"
            )));
        }
        HeaderKind::Session if generation < Generation::V3 => {
            return Err(HgfsError::Protocol(format!(
                "{op:?} not valid with a session header"
            )));
        }
        _ => {}
    }

    let session = match (header.kind, op) {
        (_, HgfsOp::CreateSessionV4) => None,
        (HeaderKind::Session, _) => Some(transport.lookup_session(header.session_id)?),
        (HeaderKind::Legacy, _) => Some(transport.default_session()?),
    };
    if let Some(session) = &session {
        session.touch();
    }

    Ok(RequestContext {
        server: server.clone(),
        transport: transport.clone(),
        session,
        header: header.clone(),
        op,
    })
}

fn parse_request(op: HgfsOp, payload: Bytes) -> HgfsResult<Request> {
    let descriptor = op.descriptor();
    if !descriptor.supported {
        return Err(HgfsError::NotSupported(format!("{op:?}")));
    }
    if payload.len() < descriptor.min_size {
        return Err(HgfsError::Protocol(format!(
            "{:?} payload of {} bytes, need {}",
            op,
            payload.len(),
            descriptor.min_size
        )));
    }
    Request::parse(op, payload)
}

fn dispatch(ctx: RequestContext, payload: Bytes) {
    let request = match parse_request(ctx.op, payload) {
        Ok(request) => request,
        Err(e) => return complete(&ctx, Err(e)),
    };

    let session = match &ctx.session {
        Some(session) if ctx.is_async() => session.clone(),
        _ => {
            let result = handlers::handle(&ctx, request);
            return complete(&ctx, result);
        }
    };

    let guard = session.begin_async();
    let server = ctx.server.clone();
    let job: Job = Box::new(move || {
        let _guard = guard;
        ctx.transport.channel().register_thread();
        let result = handlers::handle(&ctx, request);
        complete(&ctx, result);
        ctx.transport.channel().unregister_thread();
    });

    let refused = match &server.executor {
        Some(executor) => executor.submit(job).err(),
        None => Some(job),
    };
    if let Some(job) = refused {
        debug!("executor paused, running request inline");
        job();
    }
}

/// Pack the reply and hand it to the transport.
fn complete(ctx: &RequestContext, result: HgfsResult<Reply>) {
    let session_id = ctx.reply_session_id(result.as_ref().ok());
    let encoded = result.and_then(|reply| reply.encode(ctx.op));

    let packet = match encoded {
        Ok(payload) => {
            header::encode_reply(&ctx.header, HgfsStatus::Success, 0, session_id, &payload)
        }
        Err(e) => {
            match &e {
                HgfsError::Internal(_) | HgfsError::OutOfMemory => {
                    error!("{:?} request {}: {}", ctx.op, ctx.header.request_id, e)
                }
                _ => debug!("{:?} request {}: {}", ctx.op, ctx.header.request_id, e),
            }
            header::encode_reply(&ctx.header, e.status(), e.information(), session_id, &[])
        }
    };

    if let Err(e) = ctx.transport.send(packet) {
        error!(
            "transport session {}: failed to send reply to request {}: {}",
            ctx.transport.id(),
            ctx.header.request_id,
            e
        );
    }
}

fn send_error(transport: &TransportSession, header: &PacketHeader, e: &HgfsError) {
    let packet = header::encode_reply(header, e.status(), e.information(), header.session_id, &[]);
    if let Err(e) = transport.send(packet) {
        error!(
            "transport session {}: failed to send error reply: {}",
            transport.id(),
            e
        );
    }
}
