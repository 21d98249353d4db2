//! Share policy seam: share name → host root and permissions.

use std::path::PathBuf;

use bitflags::bitflags;
use parking_lot::RwLock;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ShareOptions: u32 {
        /// Symlinks may point outside the share root.
        const FOLLOW_SYMLINKS = 1 << 0;
        const CASE_INSENSITIVE = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInfo {
    pub name: String,
    pub root: PathBuf,
    pub readable: bool,
    pub writable: bool,
    pub options: ShareOptions,
}

impl ShareInfo {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            readable: true,
            writable: true,
            options: ShareOptions::empty(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

pub trait SharePolicy: Send + Sync {
    fn lookup(&self, name: &str) -> Option<ShareInfo>;

    fn share_names(&self) -> Vec<String>;

    fn shares(&self) -> Vec<ShareInfo> {
        self.share_names()
            .iter()
            .filter_map(|name| self.lookup(name))
            .collect()
    }
}

/// Share list held in memory and replaced wholesale on change.
#[derive(Debug, Default)]
pub struct StaticPolicy {
    shares: RwLock<Vec<ShareInfo>>,
}

impl StaticPolicy {
    pub fn new(shares: Vec<ShareInfo>) -> Self {
        Self {
            shares: RwLock::new(shares),
        }
    }

    pub fn set_shares(&self, shares: Vec<ShareInfo>) {
        *self.shares.write() = shares;
    }
}

impl SharePolicy for StaticPolicy {
    fn lookup(&self, name: &str) -> Option<ShareInfo> {
        self.shares
            .read()
            .iter()
            .find(|share| {
                if share.options.contains(ShareOptions::CASE_INSENSITIVE) {
                    share.name.eq_ignore_ascii_case(name)
                } else {
                    share.name == name
                }
            })
            .cloned()
    }

    fn share_names(&self) -> Vec<String> {
        self.shares.read().iter().map(|s| s.name.clone()).collect()
    }

    fn shares(&self) -> Vec<ShareInfo> {
        self.shares.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_honours_case_option() {
        let mut docs = ShareInfo::new("Docs", "/tmp/docs");
        docs.options |= ShareOptions::CASE_INSENSITIVE;
        let policy = StaticPolicy::new(vec![docs, ShareInfo::new("src", "/tmp/src")]);

        assert!(policy.lookup("docs").is_some());
        assert!(policy.lookup("SRC").is_none());
        assert_eq!(policy.share_names(), vec!["Docs", "src"]);
    }
}
