pub mod dir_ops;
pub mod file_ops;
pub mod notify_ops;
pub mod session_ops;

use std::path::PathBuf;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::dispatch::RequestContext;
use crate::hgfs::handle_table::NodeFlags;
use crate::hgfs::policy::{ShareInfo, ShareOptions};
use crate::hgfs::protocol::{NameRef, Reply, Request};
use crate::hgfs::session::Session;

/// Run the handler for `request`.
pub fn handle(ctx: &RequestContext, request: Request) -> HgfsResult<Reply> {
    match request {
        Request::Open(open) => file_ops::handle_open(ctx, open),
        Request::Read {
            handle,
            offset,
            size,
        } => file_ops::handle_read(ctx, handle, offset, size),
        Request::Write {
            handle,
            append,
            offset,
            data,
        } => file_ops::handle_write(ctx, handle, append, offset, data),
        Request::Close { handle } => file_ops::handle_close(ctx, handle),
        Request::GetAttr { target } => file_ops::handle_getattr(ctx, target),
        Request::SetAttr {
            target,
            attr,
            changes,
        } => file_ops::handle_setattr(ctx, target, attr, changes),
        Request::ServerLockChange { handle, lock } => {
            file_ops::handle_server_lock_change(ctx, handle, lock)
        }
        Request::SearchOpen { dir } => dir_ops::handle_search_open(ctx, dir),
        Request::SearchRead { search, index } => dir_ops::handle_search_read(ctx, search, index),
        Request::SearchReadMulti {
            search,
            start,
            capacity,
        } => dir_ops::handle_search_read_multi(ctx, search, start, capacity),
        Request::SearchClose { search } => dir_ops::handle_search_close(ctx, search),
        Request::CreateDir { name, perms } => dir_ops::handle_create_dir(ctx, name, perms),
        Request::Delete { target, dir } => dir_ops::handle_delete(ctx, target, dir),
        Request::Rename { from, to } => dir_ops::handle_rename(ctx, from, to),
        Request::QueryVolumeInfo { name } => dir_ops::handle_query_volume(ctx, name),
        Request::CreateSymlink { link, target } => dir_ops::handle_create_symlink(ctx, link, target),
        Request::CreateSession {
            max_packet_size,
            flags,
        } => session_ops::handle_create_session(ctx, max_packet_size, flags),
        Request::DestroySession => session_ops::handle_destroy_session(ctx),
        Request::SetWatch {
            target,
            events,
            recursive,
        } => notify_ops::handle_set_watch(ctx, target, events, recursive),
        Request::RemoveWatch { watch } => notify_ops::handle_remove_watch(ctx, watch),
    }
}

/// A request target resolved to a host path.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub share: ShareInfo,
    pub local: PathBuf,
    /// Path below the share root; empty for the root itself.
    pub relative: PathBuf,
    /// The target is the root of a shared folder.
    pub share_root: bool,
}

impl Target {
    pub fn require_read(&self) -> HgfsResult<()> {
        if self.share.readable {
            Ok(())
        } else {
            Err(HgfsError::AccessDenied)
        }
    }

    pub fn require_write(&self) -> HgfsResult<()> {
        if self.share.writable {
            Ok(())
        } else {
            Err(HgfsError::AccessDenied)
        }
    }
}

/// Resolve a name or an open handle. The base namespace has no host
/// path; callers that accept it check for it first.
pub(crate) fn resolve_target(
    ctx: &RequestContext,
    session: &Session,
    target: &NameRef,
) -> HgfsResult<Target> {
    match target {
        NameRef::Path(name) => {
            let resolved = ctx.server.resolver.resolve(name)?;
            Ok(Target {
                share_root: resolved.is_share_root(),
                share: resolved.share,
                local: resolved.local,
                relative: resolved.relative,
            })
        }
        NameRef::Handle(handle) => {
            let nodes = session.nodes.lock();
            let node = nodes.lookup(*handle)?;
            let options = ctx
                .server
                .policy
                .lookup(&node.share_name)
                .map(|share| share.options)
                .unwrap_or(ShareOptions::empty());
            let share = ShareInfo {
                name: node.share_name.clone(),
                root: PathBuf::from(&node.share_root),
                readable: node.share_readable,
                writable: node.share_writable,
                options,
            };
            let local = PathBuf::from(&node.utf8_name);
            let relative = ctx.server.resolver.share_relative(&share, &local);
            Ok(Target {
                share_root: node.flags.contains(NodeFlags::SHARED_FOLDER_OPEN)
                    || relative.as_os_str().is_empty(),
                share,
                local,
                relative,
            })
        }
    }
}

/// True when `target` names the base namespace.
pub(crate) fn is_base(target: &NameRef) -> bool {
    matches!(target, NameRef::Path(name) if name.is_root())
}
