//! Discovery: DISCOVER broadcasts find gateways, TYP answers enumerate the typicals behind them
//! and action messages reveal the publish/subscribe topics in use.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::protocol::{typical_code, Message};
use crate::session::Event;
use crate::typical::TypicalKind;
use crate::wire::{encode_frame, Addressing, FrameEncodeError};

/// Interval between DISCOVER broadcasts while a scan runs.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(15);

/// How long a scan runs unless stopped earlier.
pub const SCAN_DURATION: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredGateway {
    pub address: Ipv4Addr,
    /// Last octet of `address`.
    pub id: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTypical {
    pub gateway: u8,
    pub kind: TypicalKind,
    pub node: u8,
    pub slot: u8,
    pub label: String,
}

/// Publish/subscribe topic seen in an action message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTopic {
    pub gateway: u8,
    pub number: u16,
    pub variant: u8,
    pub label: String,
}

/// Scan state shared by the scan timer and the listener.
#[derive(Debug)]
pub struct Discovery {
    active: AtomicBool,
    addressing: Addressing,
}

impl Discovery {
    pub fn new(node_index: u8, user_index: u8) -> Self {
        Self {
            active: AtomicBool::new(false),
            addressing: Addressing::broadcast(node_index, user_index),
        }
    }

    pub fn start(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("discovery scan started");
        }
    }

    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("discovery scan stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// DISCOVER_REQ datagram for the broadcast address.
    pub fn request(&self) -> Result<Vec<u8>, FrameEncodeError> {
        encode_frame(&Message::DiscoverRequest, &self.addressing)
    }

    /// A gateway answered a DISCOVER. `None` while no scan is active.
    pub fn on_gateway(&self, address: Ipv4Addr) -> Option<Event> {
        if !self.is_active() {
            return None;
        }
        let id = address.octets()[3];
        info!(%address, id, "gateway detected");
        Some(Event::GatewayDetected(DiscoveredGateway {
            address,
            id,
            label: format!("Souliss Gateway {id}"),
        }))
    }

    /// An action message announced `number`/`variant`. `None` while no scan is active.
    pub fn on_topic(&self, gateway: u8, number: u16, variant: u8) -> Option<Event> {
        if !self.is_active() {
            return None;
        }
        info!(gateway, number, variant, "topic detected");
        Some(Event::TopicDiscovered(DiscoveredTopic {
            gateway,
            number,
            variant,
            label: topic_label(number, variant),
        }))
    }

    /// Typical codes for nodes `start_node..`, `per_node` codes per node.
    pub fn on_typicals(
        &self,
        gateway: u8,
        start_node: u8,
        data: &[u8],
        per_node: u8,
    ) -> Vec<Event> {
        if !self.is_active() || per_node == 0 {
            return Vec::new();
        }
        let per_node = usize::from(per_node);
        let mut out = Vec::new();
        for (k, code) in data.iter().enumerate() {
            if matches!(*code, typical_code::EMPTY | typical_code::RELATED) {
                continue;
            }
            let Some(node) = u8::try_from(k / per_node)
                .ok()
                .and_then(|rel| start_node.checked_add(rel))
            else {
                break;
            };
            let slot = (k % per_node) as u8;
            let Some(kind) = TypicalKind::from_code(*code) else {
                debug!(node, slot, "unsupported typical code 0x{code:02X}");
                continue;
            };
            out.push(Event::TypicalDiscovered(DiscoveredTypical {
                gateway,
                kind,
                node,
                slot,
                label: typical_label(gateway, kind, node, slot),
            }));
        }
        out
    }
}

/// `[77] T11: node 5, slot 0`
pub fn typical_label(gateway: u8, kind: TypicalKind, node: u8, slot: u8) -> String {
    format!("[{gateway}] {kind}: node {node}, slot {slot}")
}

/// `Topic. Number: 0102, Variant: 3`
pub fn topic_label(number: u16, variant: u8) -> String {
    format!("Topic. Number: {number:04X}, Variant: {variant:X}")
}
