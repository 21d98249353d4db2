use log::info;

use crate::error::HgfsResult;
use crate::hgfs::dispatch::RequestContext;
use crate::hgfs::protocol::Reply;
use crate::hgfs::session_state::SessionFlags;

pub fn handle_create_session(
    ctx: &RequestContext,
    max_packet_size: u32,
    flags: u32,
) -> HgfsResult<Reply> {
    let requested = SessionFlags::from_bits_truncate(flags);
    let session = ctx.transport.create_session(max_packet_size, requested)?;
    Ok(Reply::Session {
        id: session.id(),
        max_packet_size: session.max_packet_size(),
        flags: session.flags(),
        capabilities: session.capabilities().to_vec(),
    })
}

pub fn handle_destroy_session(ctx: &RequestContext) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    ctx.transport.close_session(session.id())?;
    info!(
        "transport session {}: destroyed session {:#x}",
        ctx.transport.id(),
        session.id()
    );
    Ok(Reply::Empty)
}
