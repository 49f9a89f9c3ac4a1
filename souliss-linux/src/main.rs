// Souliss Linux: gateway session, send dispatcher and discovery daemon.

mod config;
mod discovery;
mod gateway;
mod host;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use souliss_core::{Discovery, GatewayRegistry, GatewaySession, Listener};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("souliss-linux {}", VERSION);
                return Ok(());
            }
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("unknown argument {other:?}"),
        }
    }

    init_tracing();
    info!("souliss-linux v{}", VERSION);

    let cfg = config::load(config_path.as_deref())?;
    let session = Arc::new(
        GatewaySession::new(cfg.gateway.clone()).context("invalid gateway configuration")?,
    );
    let gateways = Arc::new(GatewayRegistry::new());
    gateways.register(session.clone())?;
    let discovery = Arc::new(Discovery::new(cfg.gateway.node_index, cfg.gateway.user_index));
    let listener = Arc::new(Listener::new(gateways.clone(), discovery.clone()));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let socket = gateway::bind(cfg.gateway.preferred_local_port)
            .await
            .context("binding gateway socket")?;
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut tasks =
            gateway::spawn(session.clone(), listener, socket.clone(), events_tx.clone());
        tasks.push(tokio::spawn(host::write_events(events_rx)));
        tasks.push(tokio::spawn(host::read_commands(session.clone(), events_tx)));
        if cfg.discovery {
            tasks.push(tokio::spawn(discovery::scan(
                discovery,
                session.clone(),
                socket,
                cfg.gateway.gateway_port,
            )));
        }

        shutdown_signal().await?;
        for t in &tasks {
            t.abort();
        }
        session.teardown();
        gateways.remove(session.id());
        anyhow::Ok(())
    })?;
    Ok(())
}

/// `RUST_LOG` wins; otherwise `SOULISS_LOG` (default info).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match std::env::var("SOULISS_LOG")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::default().add_directive(level.into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
