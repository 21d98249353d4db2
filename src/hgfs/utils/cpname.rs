//! Cross-platform names.
//!
//! A CP name is a list of path components separated by NUL bytes. The
//! first component names a share; an empty name is the base namespace
//! (the list of shares itself).

use std::path::{Component, Path, PathBuf};

use crate::error::{HgfsError, HgfsResult};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpName {
    components: Vec<String>,
}

impl CpName {
    pub fn parse(bytes: &[u8]) -> HgfsResult<Self> {
        let trimmed = match bytes.iter().rposition(|b| *b != 0) {
            Some(last) => &bytes[..=last],
            None => return Ok(Self::default()),
        };

        let mut components = Vec::new();
        for raw in trimmed.split(|b| *b == 0) {
            let component = std::str::from_utf8(raw)
                .map_err(|_| HgfsError::InvalidName("component is not UTF-8".into()))?;
            if component.is_empty() || component == "." || component == ".." {
                return Err(HgfsError::InvalidName(format!(
                    "illegal component {component:?}"
                )));
            }
            if component.contains('/') {
                return Err(HgfsError::InvalidName(format!(
                    "separator inside component {component:?}"
                )));
            }
            components.push(component.to_string());
        }

        Ok(Self { components })
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn share(&self) -> Option<&str> {
        self.components.first().map(String::as_str)
    }

    /// Components below the share.
    pub fn relative(&self) -> &[String] {
        self.components.get(1..).unwrap_or(&[])
    }

    pub fn relative_path(&self) -> PathBuf {
        self.relative().iter().collect()
    }

    pub fn encode(&self) -> Vec<u8> {
        self.components.join("\0").into_bytes()
    }

    /// Encode `share` followed by the components of a relative path.
    pub fn encode_share_path(share: &str, relative: &Path) -> Vec<u8> {
        let mut out = share.as_bytes().to_vec();
        let rest = Self::encode_path(relative);
        if !rest.is_empty() {
            out.push(0);
            out.extend_from_slice(&rest);
        }
        out
    }

    /// Encode a relative host path without a share component.
    pub fn encode_path(relative: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                if !out.is_empty() {
                    out.push(0);
                }
                out.extend_from_slice(part.to_string_lossy().as_bytes());
            }
        }
        out
    }

    /// Symlink targets are passed through without share resolution:
    /// separators become `/`, `.`/`..` are kept.
    pub fn lite_path(bytes: &[u8]) -> HgfsResult<PathBuf> {
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        let text = std::str::from_utf8(&bytes[..end])
            .map_err(|_| HgfsError::InvalidName("target is not UTF-8".into()))?;
        if text.is_empty() {
            return Err(HgfsError::InvalidName("empty symlink target".into()));
        }
        Ok(PathBuf::from(text.replace('\0', "/")))
    }
}
