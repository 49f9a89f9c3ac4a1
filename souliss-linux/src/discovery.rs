//! Discovery scan: DISCOVER_REQ broadcasts plus a database structure request at a fixed
//! interval until the scan window closes.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use souliss_core::discovery::{SCAN_DURATION, SCAN_INTERVAL};
use souliss_core::{Discovery, GatewaySession};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::warn;

pub async fn scan(
    discovery: Arc<Discovery>,
    session: Arc<GatewaySession>,
    socket: Arc<UdpSocket>,
    gateway_port: u16,
) {
    let frame = match discovery.request() {
        Ok(f) => f,
        Err(e) => {
            warn!("cannot encode discovery request: {e}");
            return;
        }
    };
    let broadcast = SocketAddr::from((Ipv4Addr::BROADCAST, gateway_port));
    let deadline = Instant::now() + SCAN_DURATION;

    discovery.start();
    while Instant::now() < deadline {
        if let Err(e) = socket.send_to(&frame, broadcast).await {
            warn!("discovery broadcast failed: {e}");
        }
        session.on_db_struct_due();
        tokio::time::sleep(SCAN_INTERVAL).await;
    }
    discovery.stop();
}
