//! Host-side shared-folder protocol engine.

pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod handle_table;
pub mod handlers;
pub mod notify;
pub mod platform;
pub mod policy;
pub mod protocol;
pub mod search_table;
pub mod session;
pub mod session_state;
pub mod slots;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{HgfsServer, ServerCallbacks, ServerContext};
pub use session::Session;
pub use transport::{Channel, ChannelCaps, TransportSession};
