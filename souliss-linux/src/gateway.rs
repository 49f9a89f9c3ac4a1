//! UDP socket and periodic tasks of one gateway session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use souliss_core::{Event, GatewaySession, Listener, OutboundAction};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::warn;

const PING_START_DELAY: Duration = Duration::from_secs(2);
const SUBSCRIPTION_START_DELAY: Duration = Duration::from_secs(5);
const HEALTH_START_DELAY: Duration = Duration::from_secs(5);
const DISPATCHER_TICK: Duration = Duration::from_millis(100);
const RECV_BUFFER: usize = 1024;

/// Bind the session socket. Broadcast is enabled for discovery.
pub async fn bind(local_port: u16) -> std::io::Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], local_port))).await?;
    socket.set_broadcast(true)?;
    Ok(Arc::new(socket))
}

/// Start the session tasks: ping, subscription, health, dispatcher tick and receive loop.
pub fn spawn(
    session: Arc<GatewaySession>,
    listener: Arc<Listener>,
    socket: Arc<UdpSocket>,
    events: UnboundedSender<Event>,
) -> Vec<JoinHandle<()>> {
    session.on_start();
    let config = session.config().clone();
    let mut tasks = Vec::new();

    let s = session.clone();
    let tx = events.clone();
    tasks.push(tokio::spawn(async move {
        tokio::time::sleep(PING_START_DELAY).await;
        loop {
            forward(s.on_ping_due(), &tx);
            tokio::time::sleep(config.ping_interval()).await;
        }
    }));

    let s = session.clone();
    let interval = session.config().subscription_interval();
    tasks.push(tokio::spawn(async move {
        tokio::time::sleep(SUBSCRIPTION_START_DELAY).await;
        loop {
            s.on_subscription_due();
            tokio::time::sleep(interval).await;
        }
    }));

    let s = session.clone();
    let interval = session.config().healthy_interval();
    tasks.push(tokio::spawn(async move {
        tokio::time::sleep(HEALTH_START_DELAY).await;
        loop {
            s.on_health_due();
            tokio::time::sleep(interval).await;
        }
    }));

    let s = session.clone();
    let sock = socket.clone();
    let tx = events.clone();
    tasks.push(tokio::spawn(async move {
        loop {
            perform(s.on_dispatcher_tick(Instant::now()), &sock, &tx).await;
            tokio::time::sleep(DISPATCHER_TICK).await;
        }
    }));

    tasks.push(tokio::spawn(recv_loop(listener, socket, events)));
    tasks
}

async fn recv_loop(
    listener: Arc<Listener>,
    socket: Arc<UdpSocket>,
    events: UnboundedSender<Event>,
) {
    let mut buf = vec![0u8; RECV_BUFFER];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                let actions = listener.handle(from, &buf[..n], SystemTime::now());
                perform(actions, &socket, &events).await;
            }
            Err(e) => {
                warn!("receive failed: {e}");
                tokio::time::sleep(DISPATCHER_TICK).await;
            }
        }
    }
}

/// Send datagrams and forward events.
pub async fn perform(
    actions: Vec<OutboundAction>,
    socket: &UdpSocket,
    events: &UnboundedSender<Event>,
) {
    for action in actions {
        match action {
            OutboundAction::Send(t) => {
                if let Err(e) = socket.send_to(&t.bytes, t.destination).await {
                    warn!(destination = %t.destination, "send failed: {e}");
                }
            }
            OutboundAction::Emit(event) => {
                let _ = events.send(event);
            }
        }
    }
}

/// Forward the events of actions that carry no datagrams.
pub fn forward(actions: Vec<OutboundAction>, events: &UnboundedSender<Event>) {
    for action in actions {
        if let OutboundAction::Emit(event) = action {
            let _ = events.send(event);
        }
    }
}
