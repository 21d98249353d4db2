use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use rustedbytes_hgfs::AsyncStrategy;
use rustedbytes_hgfs::hgfs::policy::ShareInfo;

/// Command line configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "2222")]
    pub port: u16,

    /// Username for password authentication
    #[arg(long, default_value = "admin")]
    pub username: String,

    /// Password for password authentication
    #[arg(long, default_value = "password")]
    pub password: String,

    /// Shared folder as NAME=PATH, with an optional :ro suffix. Repeatable.
    #[arg(long = "share", value_parser = parse_share, required = true)]
    pub shares: Vec<ShareInfo>,

    /// Open file descriptors cached per session
    #[arg(long, default_value = "30")]
    pub max_cached_nodes: usize,

    /// Cached descriptors holding a server lock, per session
    #[arg(long, default_value = "10")]
    pub max_locked_nodes: usize,

    /// Sessions per connection
    #[arg(long, default_value = "1024")]
    pub max_sessions: usize,

    /// Seconds between inactivity sweeps
    #[arg(long, default_value = "30")]
    pub sweep_interval: u64,

    /// Idle sweeps before a session is closed
    #[arg(long, default_value = "4")]
    pub max_idle_sweeps: u32,

    #[arg(long, value_enum, default_value_t = AsyncArg::Pool)]
    pub async_strategy: AsyncArg,

    /// Worker threads for the pool strategy
    #[arg(long, default_value = "4")]
    pub workers: usize,

    /// Never grant server locks
    #[arg(long)]
    pub no_oplocks: bool,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum AsyncArg {
    Pool,
    Deferred,
    Disabled,
}

impl Args {
    pub fn async_strategy(&self) -> AsyncStrategy {
        match self.async_strategy {
            AsyncArg::Pool => AsyncStrategy::ThreadPool {
                workers: self.workers,
            },
            AsyncArg::Deferred => AsyncStrategy::Deferred,
            AsyncArg::Disabled => AsyncStrategy::Disabled,
        }
    }
}

fn parse_share(value: &str) -> Result<ShareInfo, String> {
    let (name, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got {value:?}"))?;
    if name.is_empty() || name.contains(['/', '\0']) {
        return Err(format!("invalid share name {name:?}"));
    }

    let (path, read_only) = match rest.strip_suffix(":ro") {
        Some(path) => (path, true),
        None => (rest.strip_suffix(":rw").unwrap_or(rest), false),
    };
    if path.is_empty() {
        return Err(format!("share {name} has no path"));
    }

    let share = ShareInfo::new(name, PathBuf::from(path));
    Ok(if read_only { share.read_only() } else { share })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_argument_forms() {
        let share = parse_share("docs=/srv/docs").unwrap();
        assert_eq!(share.name, "docs");
        assert_eq!(share.root, PathBuf::from("/srv/docs"));
        assert!(share.writable);

        let share = parse_share("iso=/srv/iso:ro").unwrap();
        assert_eq!(share.root, PathBuf::from("/srv/iso"));
        assert!(!share.writable);

        assert!(parse_share("nopath").is_err());
        assert!(parse_share("a/b=/tmp").is_err());
    }
}
