use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use log::{debug, error, info, warn};
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

use rustedbytes_hgfs::config::HGFS_LARGE_PACKET_MAX;
use rustedbytes_hgfs::hgfs::TransportSession;
use rustedbytes_hgfs::{ChannelCaps, HgfsError, HgfsResult, HgfsServer, ServerCallbacks};

use crate::server::ServerConfig;

/// Largest frame accepted from a client.
const MAX_FRAME: usize = HGFS_LARGE_PACKET_MAX as usize;

pub struct SshSession {
    clients: Arc<Mutex<HashMap<ChannelId, Channel<Msg>>>>,
    config: Arc<ServerConfig>,
    engine: Arc<HgfsServer>,
}

impl SshSession {
    pub fn new(config: Arc<ServerConfig>, engine: Arc<HgfsServer>) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            config,
            engine,
        }
    }

    pub async fn get_channel(&mut self, channel_id: ChannelId) -> Option<Channel<Msg>> {
        let mut clients = self.clients.lock().await;
        clients.remove(&channel_id)
    }
}

impl russh::server::Handler for SshSession {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == self.config.username && password == self.config.password {
            info!("user {} authenticated", user);
            Ok(Auth::Accept)
        } else {
            warn!("rejected credentials for user {}", user);
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        {
            let mut clients = self.clients.lock().await;
            clients.insert(channel.id(), channel);
        }
        Ok(true)
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.close(channel)?;
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        info!("subsystem: {}", name);

        match (name, self.get_channel(channel_id).await) {
            ("hgfs", Some(channel)) => {
                session.channel_success(channel_id)?;
                let engine = self.engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = run(engine, channel.into_stream()).await {
                        error!("hgfs channel {}: {}", channel_id, e);
                    }
                });
            }
            _ => session.channel_failure(channel_id)?,
        }

        Ok(())
    }
}

/// Engine-facing side of an SSH channel. Packets are queued for the
/// writer task.
struct SshChannel {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl rustedbytes_hgfs::Channel for SshChannel {
    fn send(&self, packet: Bytes) -> HgfsResult<()> {
        self.tx
            .send(packet)
            .map_err(|_| HgfsError::Transport("ssh channel closed".into()))
    }

    fn capabilities(&self) -> ChannelCaps {
        ChannelCaps::ASYNC | ChannelCaps::NOTIFY
    }
}

/// Serve one `hgfs` subsystem channel: `len u32 LE` framed packets in
/// both directions.
async fn run<S>(engine: Arc<HgfsServer>, stream: S) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = engine.connect(Arc::new(SshChannel { tx }))?;

    let writer_task = tokio::spawn(write_frames(
        engine.clone(),
        Arc::downgrade(&transport),
        writer,
        rx,
    ));

    let result = read_frames(&engine, &transport, &mut reader).await;

    engine.disconnect(&transport);
    engine.close(transport);
    if let Err(e) = writer_task.await {
        warn!("writer task failed: {}", e);
    }
    result
}

async fn read_frames<R>(
    engine: &Arc<HgfsServer>,
    transport: &Arc<TransportSession>,
    reader: &mut R,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let len = match reader.read_u32_le().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("transport session {}: end of stream", transport.id());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if len > MAX_FRAME {
            anyhow::bail!("frame of {} bytes exceeds {}", len, MAX_FRAME);
        }

        let mut packet = vec![0u8; len];
        reader.read_exact(&mut packet).await?;

        // Handlers do blocking file I/O.
        let engine = engine.clone();
        let transport = transport.clone();
        tokio::task::spawn_blocking(move || engine.receive(&transport, Bytes::from(packet)))
            .await?;
    }
}

async fn write_frames<W>(
    engine: Arc<HgfsServer>,
    transport: Weak<TransportSession>,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        let written = async {
            writer.write_u32_le(packet.len() as u32).await?;
            writer.write_all(&packet).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            error!("failed to write frame: {}", e);
            break;
        }
        if let Some(transport) = transport.upgrade() {
            engine.send_complete(&transport, packet);
        }
    }
    let _ = writer.shutdown().await;
}
