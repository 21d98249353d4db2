pub mod config;
pub mod error;
pub mod file_info;
pub mod hgfs;

pub use config::{AsyncStrategy, EngineConfig};
pub use error::{HgfsError, HgfsResult, HgfsStatus};
pub use hgfs::{Channel, ChannelCaps, HgfsServer, ServerCallbacks};
