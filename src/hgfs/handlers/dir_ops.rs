use std::io;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::dispatch::RequestContext;
use crate::hgfs::handlers::{is_base, resolve_target};
use crate::hgfs::protocol::header::SESSION_HEADER_SIZE;
use crate::hgfs::protocol::reply::{SEARCH_V4_REPLY_HEADER, search_entry_v4_size};
use crate::hgfs::protocol::{NameRef, Reply};
use crate::hgfs::search_table::Enumerator;
use crate::hgfs::types::{DirEntry, FileAttr, FileType, HgfsHandle, VolumeInfo};
use crate::hgfs::utils::cpname::CpName;

pub fn handle_search_open(ctx: &RequestContext, dir: CpName) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    let server = &ctx.server;

    if dir.is_root() {
        let policy = server.policy.clone();
        let enumerator: Enumerator = Box::new(move || {
            let mut entries = vec![
                DirEntry::new(".", FileAttr::virtual_dir()),
                DirEntry::new("..", FileAttr::virtual_dir()),
            ];
            entries.extend(
                policy
                    .share_names()
                    .into_iter()
                    .map(|name| DirEntry::new(name, FileAttr::virtual_dir())),
            );
            Ok(entries)
        });
        let search = session
            .searches
            .lock()
            .allocate_base(&server.handles, enumerator)?;
        info!("session {:#x}: opened share list as {}", session.id(), search);
        return Ok(Reply::SearchOpen { search });
    }

    let resolved = server.resolver.resolve(&dir)?;
    resolved.require_read()?;
    let attr = server.platform.stat(&resolved.local, true)?;
    if attr.file_type != FileType::Directory {
        return Err(HgfsError::Io(io::Error::from_raw_os_error(libc::ENOTDIR)));
    }

    let search = session.searches.lock().allocate_dir(
        &server.handles,
        &resolved.local,
        &resolved.share.name,
        &resolved.share.root,
    )?;
    info!(
        "session {:#x}: opened search {} on {:?}",
        session.id(),
        search,
        resolved.local
    );
    Ok(Reply::SearchOpen { search })
}

pub fn handle_search_read(
    ctx: &RequestContext,
    search: HgfsHandle,
    index: u32,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    let entry = session
        .searches
        .lock()
        .lookup_mut(search)?
        .entry(index, ctx.server.platform.as_ref())?;
    Ok(Reply::SearchEntry(entry))
}

/// Pack entries from `start` until the reply is full. `capacity` is the
/// client's reply buffer, bounded by the session's packet size.
pub fn handle_search_read_multi(
    ctx: &RequestContext,
    search: HgfsHandle,
    start: u32,
    capacity: u32,
) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    let limit = (capacity as usize)
        .min((session.max_packet_size() as usize).saturating_sub(SESSION_HEADER_SIZE));
    let budget = limit.saturating_sub(SEARCH_V4_REPLY_HEADER);

    let mut searches = session.searches.lock();
    let state = searches.lookup_mut(search)?;
    let available = state.entries_from(start, ctx.server.platform.as_ref())?;
    let total = available.len();

    let mut used = 0;
    let mut entries = Vec::new();
    for entry in available {
        let size = search_entry_v4_size(&entry);
        if used + size > budget {
            break;
        }
        used += size;
        entries.push(entry);
    }

    let complete = entries.len() == total;
    if complete {
        state.mark_read_all();
    } else if entries.is_empty() {
        return Err(HgfsError::InvalidParameter(format!(
            "reply buffer of {capacity} bytes holds no entry"
        )));
    }

    debug!(
        "search {}: {} entries from {} ({} bytes, complete {})",
        search,
        entries.len(),
        start,
        used,
        complete
    );
    Ok(Reply::SearchEntries { entries, complete })
}

pub fn handle_search_close(ctx: &RequestContext, search: HgfsHandle) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    session.searches.lock().free(search)?;
    info!("session {:#x}: closed search {}", session.id(), search);
    Ok(Reply::Empty)
}

pub fn handle_create_dir(
    ctx: &RequestContext,
    name: CpName,
    perms: Option<u32>,
) -> HgfsResult<Reply> {
    ctx.session()?;
    if name.is_root() {
        return Err(HgfsError::AccessDenied);
    }
    let resolved = ctx.server.resolver.resolve(&name)?;
    resolved.require_write()?;
    if resolved.is_share_root() {
        return Err(HgfsError::FileExists(resolved.share.name));
    }

    ctx.server.platform.create_dir(&resolved.local, perms)?;
    info!("created directory {:?}", resolved.local);
    Ok(Reply::Empty)
}

pub fn handle_delete(ctx: &RequestContext, target: NameRef, dir: bool) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if is_base(&target) {
        return Err(HgfsError::AccessDenied);
    }
    let resolved = resolve_target(ctx, session, &target)?;
    if resolved.share_root {
        warn!("refusing to delete share root {:?}", resolved.local);
        return Err(HgfsError::AccessDenied);
    }
    resolved.require_write()?;
    if session.nodes.lock().has_server_lock(&resolved.local) {
        return Err(HgfsError::PathBusy(resolved.local.display().to_string()));
    }

    let platform = ctx.server.platform.as_ref();
    if dir {
        platform.remove_dir(&resolved.local)?;
    } else {
        platform.remove_file(&resolved.local)?;
    }
    info!("deleted {:?}", resolved.local);
    Ok(Reply::Empty)
}

pub fn handle_rename(ctx: &RequestContext, from: NameRef, to: NameRef) -> HgfsResult<Reply> {
    let session = ctx.session()?;
    if is_base(&from) || is_base(&to) {
        return Err(HgfsError::AccessDenied);
    }
    let source = resolve_target(ctx, session, &from)?;
    let dest = resolve_target(ctx, session, &to)?;
    if source.share_root || dest.share_root {
        warn!("refusing to rename share root");
        return Err(HgfsError::AccessDenied);
    }
    source.require_write()?;
    dest.require_write()?;

    let mut nodes = session.nodes.lock();
    if nodes.has_server_lock(&source.local) {
        return Err(HgfsError::PathBusy(source.local.display().to_string()));
    }
    ctx.server.platform.rename(&source.local, &dest.local)?;
    nodes.rename_nodes(&source.local, &dest.local);

    info!("renamed {:?} to {:?}", source.local, dest.local);
    Ok(Reply::Empty)
}

pub fn handle_query_volume(ctx: &RequestContext, name: CpName) -> HgfsResult<Reply> {
    ctx.session()?;
    let server = &ctx.server;

    if !name.is_root() {
        let resolved = server.resolver.resolve(&name)?;
        resolved.require_read()?;
        return Ok(Reply::VolumeInfo(server.platform.volume_info(&resolved.local)?));
    }

    let mut total = VolumeInfo::default();
    for share in server.policy.shares() {
        match server.platform.volume_info(&share.root) {
            Ok(info) => {
                total.free_bytes = total.free_bytes.saturating_add(info.free_bytes);
                total.total_bytes = total.total_bytes.saturating_add(info.total_bytes);
            }
            Err(e) => warn!("volume info for share {} failed: {}", share.name, e),
        }
    }
    Ok(Reply::VolumeInfo(total))
}

pub fn handle_create_symlink(
    ctx: &RequestContext,
    link: CpName,
    target: PathBuf,
) -> HgfsResult<Reply> {
    ctx.session()?;
    if link.is_root() {
        return Err(HgfsError::AccessDenied);
    }
    let resolved = ctx.server.resolver.resolve(&link)?;
    resolved.require_write()?;
    ctx.server
        .resolver
        .check_symlink_target(&resolved.share, &resolved.relative, &target)?;

    ctx.server.platform.symlink(&resolved.local, &target)?;
    info!("created symlink {:?} -> {:?}", resolved.local, target);
    Ok(Reply::Empty)
}
