use log::info;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::dispatch::RequestContext;
use crate::hgfs::handlers::{is_base, resolve_target};
use crate::hgfs::protocol::{NameRef, Reply};
use crate::hgfs::session_state::SessionFlags;

pub fn handle_set_watch(
    ctx: &RequestContext,
    target: NameRef,
    events: u32,
    recursive: bool,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if !session.flags().contains(SessionFlags::CHANGENOTIFY) {
        return Err(HgfsError::NotSupported(
            "session did not negotiate change notification".into(),
        ));
    }
    if is_base(&target) {
        return Err(HgfsError::NotSupported("watching the share list".into()));
    }

    let resolved = resolve_target(ctx, session, &target)?;
    resolved.require_read()?;
    let id = ctx.server.notify.subscribe(
        session,
        &resolved.share.name,
        &resolved.relative,
        events,
        recursive,
    )?;
    session.add_watch(id);

    info!(
        "session {:#x}: watch {} on {}:{:?} (events {:#x}, recursive {})",
        session.id(),
        id,
        resolved.share.name,
        resolved.relative,
        events,
        recursive
    );
    Ok(Reply::Watch { id })
}

pub fn handle_remove_watch(ctx: &RequestContext, watch: u64) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if !session.flags().contains(SessionFlags::CHANGENOTIFY) {
        return Err(HgfsError::NotSupported(
            "session did not negotiate change notification".into(),
        ));
    }
    if !session.remove_watch(watch) {
        return Err(HgfsError::InvalidParameter(format!("unknown watch {watch}")));
    }
    ctx.server.notify.unsubscribe(watch)?;
    info!("session {:#x}: removed watch {}", session.id(), watch);
    Ok(Reply::Empty)
}
