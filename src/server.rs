use std::{net::SocketAddr, sync::Arc};

use log::info;
use rustedbytes_hgfs::HgfsServer;

use crate::ssh_session::SshSession;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<ServerConfig>,
    pub engine: Arc<HgfsServer>,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub username: String,
    pub password: String,
}

impl russh::server::Server for Server {
    type Handler = SshSession;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> Self::Handler {
        info!("new client from {:?}", peer);
        SshSession::new(self.config.clone(), self.engine.clone())
    }
}
