//! Inbound datagrams: decode, route to the owning gateway session by last octet, dispatch by
//! MaCaco function.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::discovery::Discovery;
use crate::protocol::{macaco_to_string, Message};
use crate::registry::GatewayRegistry;
use crate::session::OutboundAction;
use crate::wire::decode_frame;

pub struct Listener {
    gateways: Arc<GatewayRegistry>,
    discovery: Arc<Discovery>,
}

impl Listener {
    pub fn new(gateways: Arc<GatewayRegistry>, discovery: Arc<Discovery>) -> Self {
        Self {
            gateways,
            discovery,
        }
    }

    /// Handle one datagram received from `source`. Malformed or foreign datagrams produce nothing.
    pub fn handle(
        &self,
        source: SocketAddr,
        datagram: &[u8],
        at: SystemTime,
    ) -> Vec<OutboundAction> {
        trace!(%source, "recv {}", macaco_to_string(datagram));
        let msg = match decode_frame(datagram) {
            Ok(m) => m,
            Err(e) => {
                debug!(%source, "dropping datagram: {e}");
                return Vec::new();
            }
        };
        let IpAddr::V4(ip) = source.ip() else {
            debug!(%source, "dropping datagram from non-IPv4 source");
            return Vec::new();
        };
        let id = ip.octets()[3];

        if let Message::DiscoverResponse { address } = msg {
            let registered = self.gateways.ids();
            if !registered.is_empty() && !registered.contains(&address.octets()[3]) {
                debug!(%address, "ignoring discovery answer from foreign gateway");
                return Vec::new();
            }
            return self
                .discovery
                .on_gateway(address)
                .map(OutboundAction::Emit)
                .into_iter()
                .collect();
        }

        let Some(session) = self.gateways.get(id) else {
            debug!(%source, "dropping datagram from unknown gateway {id}");
            return Vec::new();
        };
        match msg {
            Message::PingResponse => session.on_ping_reply(),
            Message::State { start_node, data } => session.on_state(start_node, &data, at),
            Message::Health { start_node, data } => session.on_health(start_node, &data),
            Message::DbStruct(db) => {
                session.on_db_struct(db);
                Vec::new()
            }
            Message::Typicals { start_node, data } => self
                .discovery
                .on_typicals(id, start_node, &data, session.max_typical_per_node())
                .into_iter()
                .map(OutboundAction::Emit)
                .collect(),
            Message::Error { code } => {
                session.on_error(code);
                Vec::new()
            }
            Message::ActionMessage { topic, variant, .. } => self
                .discovery
                .on_topic(id, topic, variant)
                .map(OutboundAction::Emit)
                .into_iter()
                .collect(),
            other => {
                debug!("unexpected inbound function 0x{:02X}", other.function());
                Vec::new()
            }
        }
    }
}
