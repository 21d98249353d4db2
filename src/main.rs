use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use args::Args;
use clap::Parser;
use log::{error, info};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::server::Server as _;
use server::{Server, ServerConfig};

use rustedbytes_hgfs::hgfs::notify::NullNotifier;
use rustedbytes_hgfs::hgfs::platform::LocalPlatform;
use rustedbytes_hgfs::hgfs::policy::StaticPolicy;
use rustedbytes_hgfs::{EngineConfig, HgfsServer, ServerCallbacks};

mod args;
mod server;
mod ssh_session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::builder().filter_level(args.log_level).init();

    let mut shares = Vec::with_capacity(args.shares.len());
    for share in &args.shares {
        if !share.root.is_dir() {
            error!("share {} root {:?} is not a directory", share.name, share.root);
            std::process::exit(1);
        }
        let mut share = share.clone();
        share.root = share
            .root
            .canonicalize()
            .with_context(|| format!("canonicalizing root of share {}", share.name))?;
        info!(
            "share {} -> {:?}{}",
            share.name,
            share.root,
            if share.writable { "" } else { " (read-only)" }
        );
        shares.push(share);
    }

    let engine_config = EngineConfig {
        max_cached_open_nodes: args.max_cached_nodes,
        max_cached_locked_nodes: args.max_locked_nodes,
        max_sessions_per_transport: args.max_sessions,
        max_inactivity_sweeps: args.max_idle_sweeps,
        oplocks_enabled: !args.no_oplocks,
        // No OS-level change notification backend in this binary.
        notifications_enabled: false,
        async_strategy: args.async_strategy(),
        ..Default::default()
    };

    let engine = Arc::new(
        HgfsServer::init(
            engine_config,
            Arc::new(StaticPolicy::new(shares)),
            Arc::new(LocalPlatform::new()),
            Arc::new(NullNotifier),
        )
        .context("starting HGFS engine")?,
    );

    let sweeper = {
        let engine = engine.clone();
        let period = Duration::from_secs(args.sweep_interval.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let closed = engine.invalidate_inactive_sessions();
                if closed > 0 {
                    info!("inactivity sweep closed {} sessions", closed);
                }
            }
        })
    };

    let config = russh::server::Config {
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        keys: vec![
            russh::keys::PrivateKey::random(&mut OsRng, russh::keys::Algorithm::Ed25519)
                .context("generating host key")?,
        ],
        ..Default::default()
    };

    let mut server = Server {
        config: Arc::new(ServerConfig {
            username: args.username,
            password: args.password,
        }),
        engine: engine.clone(),
    };

    info!("Starting HGFS server on {}:{}", args.host, args.port);

    let result = tokio::select! {
        result = server.run_on_address(Arc::new(config), (args.host.as_str(), args.port)) => {
            result.context("ssh server")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    };

    sweeper.abort();
    engine.exit();
    result
}
