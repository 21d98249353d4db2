use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::dispatch::RequestContext;
use crate::hgfs::handle_table::{AllocError, NodeFlags};
use crate::hgfs::handlers::{is_base, resolve_target};
use crate::hgfs::protocol::request::OpenRequest;
use crate::hgfs::protocol::{NameRef, Reply};
use crate::hgfs::session_state::SessionFlags;
use crate::hgfs::types::{
    AttrMask, FileAttr, FileType, HgfsHandle, OpenInfo, OpenModeFlags, ServerLock,
};

pub fn handle_open(ctx: &RequestContext, req: OpenRequest) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    let server = &ctx.server;
    let platform = server.platform.as_ref();

    if req.name.is_root() {
        return Err(HgfsError::AccessDenied);
    }
    let resolved = server.resolver.resolve(&req.name)?;
    if req.mode.access.reads() {
        resolved.require_read()?;
    }
    if req.mode.access.writes() || req.disposition.creates() || req.disposition.truncates() {
        resolved.require_write()?;
    }

    let info = OpenInfo {
        local_path: resolved.local.clone(),
        mode: req.mode,
        disposition: req.disposition,
        server_lock: ServerLock::None,
    };
    let create_perms = req.owner_perms.map(|p| u32::from(p & 0o7) << 6);
    let file = platform.open(&info, create_perms)?;
    let local_id = file.local_id();
    let append = req.mode.flags.contains(OpenModeFlags::APPEND);

    let mut nodes = session.nodes.lock();
    let handle = match nodes.allocate(
        &server.handles,
        &info,
        local_id,
        file,
        append,
        &resolved.share,
        resolved.is_share_root(),
    ) {
        Ok(handle) => handle,
        Err(AllocError { error, descriptor }) => {
            if let Err(e) = platform.close(descriptor) {
                warn!("failed to close {:?}: {}", info.local_path, e);
            }
            return Err(error);
        }
    };

    if let Err(e) = nodes.add_to_cache(handle, platform) {
        if let Ok(Some(descriptor)) = nodes.free(handle) {
            if let Err(e) = platform.close(descriptor) {
                warn!("failed to close {:?}: {}", info.local_path, e);
            }
        }
        return Err(e);
    }

    let lock = if req.desired_lock != ServerLock::None
        && server.config.oplocks_enabled
        && session.flags().contains(SessionFlags::OPLOCK)
    {
        nodes.set_server_lock(handle, req.desired_lock)?
    } else {
        ServerLock::None
    };

    info!(
        "session {:#x}: opened {:?} as {} ({:?}, lock {:?})",
        session.id(),
        info.local_path,
        handle,
        req.mode.access,
        lock
    );
    Ok(Reply::Open { handle, lock })
}

pub fn handle_read(
    ctx: &RequestContext,
    handle: HgfsHandle,
    offset: u64,
    size: u32,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    let size = (size as usize).min(session.max_io_size());

    let mut nodes = session.nodes.lock();
    if !nodes.lookup(handle)?.mode.access.reads() {
        return Err(HgfsError::AccessDenied);
    }
    let file = nodes.descriptor(handle, ctx.server.platform.as_ref())?;

    let mut buf = BytesMut::zeroed(size);
    let n = file.read_at(&mut buf, offset)?;
    buf.truncate(n);

    debug!("read handle {}: {} of {} bytes at {}", handle, n, size, offset);
    Ok(Reply::Read(buf.freeze()))
}

pub fn handle_write(
    ctx: &RequestContext,
    handle: HgfsHandle,
    append: bool,
    offset: u64,
    data: Bytes,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if data.len() > session.max_io_size() {
        return Err(HgfsError::InvalidParameter(format!(
            "write of {} bytes exceeds {}",
            data.len(),
            session.max_io_size()
        )));
    }

    let mut nodes = session.nodes.lock();
    let node = nodes.lookup(handle)?;
    if !node.share_writable || !node.mode.access.writes() {
        return Err(HgfsError::AccessDenied);
    }
    // A node opened for append ignores offsets already.
    let seek_end = append && !node.flags.contains(NodeFlags::APPEND);
    let file = nodes.descriptor(handle, ctx.server.platform.as_ref())?;
    let offset = if seek_end {
        file.attributes()?.size
    } else {
        offset
    };
    let written = file.write_at(&data, offset)?;

    debug!("wrote handle {}: {} bytes at {}", handle, written, offset);
    Ok(Reply::Write {
        actual: written as u32,
    })
}

pub fn handle_close(ctx: &RequestContext, handle: HgfsHandle) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    session
        .nodes
        .lock()
        .close(handle, ctx.server.platform.as_ref())?;
    info!("session {:#x}: closed handle {}", session.id(), handle);
    Ok(Reply::Empty)
}

pub fn handle_getattr(ctx: &RequestContext, target: NameRef) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if is_base(&target) {
        return Ok(Reply::Attr {
            attr: FileAttr::virtual_dir(),
            symlink_target: None,
        });
    }

    let platform = ctx.server.platform.as_ref();
    let (attr, symlink_target) = match &target {
        NameRef::Handle(handle) => {
            let mut nodes = session.nodes.lock();
            (nodes.descriptor(*handle, platform)?.attributes()?, None)
        }
        NameRef::Path(_) => {
            let resolved = resolve_target(ctx, session, &target)?;
            resolved.require_read()?;
            let attr = platform.stat(&resolved.local, false)?;
            let link = match attr.file_type {
                FileType::Symlink => Some(
                    platform
                        .read_link(&resolved.local)?
                        .to_string_lossy()
                        .into_owned(),
                ),
                _ => None,
            };
            (attr, link)
        }
    };

    Ok(Reply::Attr {
        attr,
        symlink_target,
    })
}

pub fn handle_setattr(
    ctx: &RequestContext,
    target: NameRef,
    attr: FileAttr,
    changes: AttrMask,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if is_base(&target) {
        return Err(HgfsError::AccessDenied);
    }
    let platform = ctx.server.platform.as_ref();

    match &target {
        NameRef::Handle(handle) => {
            let handle = *handle;
            let mut nodes = session.nodes.lock();
            if !nodes.lookup(handle)?.share_writable {
                return Err(HgfsError::AccessDenied);
            }
            nodes
                .descriptor(handle, platform)?
                .set_attributes(&attr, changes)?;
        }
        NameRef::Path(_) => {
            let resolved = resolve_target(ctx, session, &target)?;
            resolved.require_write()?;
            if session.nodes.lock().has_server_lock(&resolved.local) {
                return Err(HgfsError::PathBusy(resolved.local.display().to_string()));
            }
            platform.set_attributes(&resolved.local, &attr, changes)?;
        }
    }

    debug!("session {:#x}: set attributes {:?}", session.id(), changes);
    Ok(Reply::Empty)
}

pub fn handle_server_lock_change(
    ctx: &RequestContext,
    handle: HgfsHandle,
    lock: ServerLock,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    let mut nodes = session.nodes.lock();
    let current = nodes.lookup(handle)?.server_lock;

    let allowed = ctx.server.config.oplocks_enabled && session.flags().contains(SessionFlags::OPLOCK);
    if lock != ServerLock::None && !allowed {
        return Ok(Reply::ServerLock(current));
    }
    let granted = nodes.set_server_lock(handle, lock)?;
    debug!("handle {}: server lock {:?} -> {:?}", handle, current, granted);
    Ok(Reply::ServerLock(granted))
}
