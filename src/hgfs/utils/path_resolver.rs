use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::error::{HgfsError, HgfsResult};
use crate::hgfs::platform::Platform;
use crate::hgfs::policy::{ShareInfo, SharePolicy, ShareOptions};
use crate::hgfs::utils::cpname::CpName;

/// A client name resolved against the share policy.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub share: ShareInfo,
    /// Host path (not canonicalised, so a trailing symlink is kept).
    pub local: PathBuf,
    /// Path below the share root.
    pub relative: PathBuf,
}

impl ResolvedPath {
    /// The name refers to the share root itself.
    pub fn is_share_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

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

pub struct PathResolver {
    policy: Arc<dyn SharePolicy>,
    platform: Arc<dyn Platform>,
}

impl PathResolver {
    pub fn new(policy: Arc<dyn SharePolicy>, platform: Arc<dyn Platform>) -> Self {
        Self { policy, platform }
    }

    pub fn policy(&self) -> &Arc<dyn SharePolicy> {
        &self.policy
    }

    pub fn resolve(&self, name: &CpName) -> HgfsResult<ResolvedPath> {
        let share_name = name
            .share()
            .ok_or_else(|| HgfsError::InvalidName("base namespace has no host path".into()))?;
        let share = self
            .policy
            .lookup(share_name)
            .ok_or_else(|| HgfsError::FileNotFound(share_name.to_string()))?;

        let relative = name.relative_path();
        let local = share.root.join(&relative);

        if !share.options.contains(ShareOptions::FOLLOW_SYMLINKS) {
            self.check_within(&share.root, &local)?;
        }

        Ok(ResolvedPath {
            share,
            local,
            relative,
        })
    }

    /// Same as `resolve` but fills `relative` in from an already-known
    /// host path (names given by handle).
    pub fn share_relative(&self, share: &ShareInfo, local: &Path) -> PathBuf {
        local
            .strip_prefix(&share.root)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// The path must stay inside the share root after symlink resolution.
    fn check_within(&self, root: &Path, resolved: &Path) -> HgfsResult<()> {
        let root = self
            .platform
            .real_path(root)
            .map_err(|_| HgfsError::FileNotFound(root.display().to_string()))?;

        match self.platform.real_path(resolved) {
            Ok(canonical) => {
                if canonical.starts_with(&root) {
                    Ok(())
                } else {
                    warn!("access outside share root: {:?}", canonical);
                    Err(HgfsError::AccessDenied)
                }
            }
            Err(_) => {
                // Not created yet: the parent must be inside.
                let parent = resolved
                    .parent()
                    .ok_or_else(|| HgfsError::FileNotFound(resolved.display().to_string()))?;
                match self.platform.real_path(parent) {
                    Ok(canonical_parent) if canonical_parent.starts_with(&root) => Ok(()),
                    Ok(canonical_parent) => {
                        warn!("access outside share root: {:?}", canonical_parent);
                        Err(HgfsError::AccessDenied)
                    }
                    Err(_) => Err(HgfsError::FileNotFound(resolved.display().to_string())),
                }
            }
        }
    }

    /// A relative symlink target must not climb out of the share.
    pub fn check_symlink_target(
        &self,
        share: &ShareInfo,
        link_relative: &Path,
        target: &Path,
    ) -> HgfsResult<()> {
        if share.options.contains(ShareOptions::FOLLOW_SYMLINKS) {
            return Ok(());
        }
        if target.is_absolute() {
            return Err(HgfsError::AccessDenied);
        }

        let mut depth: i64 = link_relative.components().count() as i64 - 1;
        for component in target.components() {
            match component {
                Component::ParentDir => depth -= 1,
                Component::Normal(_) => depth += 1,
                _ => {}
            }
            if depth < 0 {
                return Err(HgfsError::AccessDenied);
            }
        }
        Ok(())
    }
}
