//! Host bridge: events out as JSON lines on stdout, commands in as JSON lines on stdin.

use std::sync::Arc;

use serde::Deserialize;
use souliss_core::{Channel, Command, Event, GatewaySession};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::gateway::forward;

/// `{"node":5,"slot":0,"channel":"onoff","command":"On"}`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostCommand {
    node: u8,
    slot: u8,
    channel: Channel,
    command: Command,
}

pub async fn write_events(mut rx: UnboundedReceiver<Event>) {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_string(&event) {
            Ok(l) => l,
            Err(e) => {
                warn!("cannot serialize event: {e}");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            warn!("stdout closed: {e}");
            return;
        }
        let _ = stdout.flush().await;
    }
}

pub async fn read_commands(session: Arc<GatewaySession>, events: UnboundedSender<Event>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => {
                debug!("stdin closed; no more host commands");
                return;
            }
            Err(e) => {
                warn!("reading stdin failed: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match parse(&line) {
            Ok(c) => c,
            Err(e) => {
                warn!("invalid command {line:?}: {e}");
                continue;
            }
        };
        match session.command(cmd.node, cmd.slot, cmd.channel, cmd.command) {
            Ok(actions) => forward(actions, &events),
            Err(e) => warn!(node = cmd.node, slot = cmd.slot, "command rejected: {e}"),
        }
    }
}

fn parse(line: &str) -> serde_json::Result<HostCommand> {
    serde_json::from_str(line)
}
