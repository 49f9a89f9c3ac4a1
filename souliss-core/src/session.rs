//! Gateway session: link liveness, subscription renewal, node health, database structure and
//! the command path into the send dispatcher. Host-driven: the host calls the `on_*` methods
//! from its timers and receive loop and performs the returned actions.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Instant, SystemTime};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, GatewayConfig};
use crate::discovery::{DiscoveredGateway, DiscoveredTopic, DiscoveredTypical};
use crate::dispatcher::{DispatcherTimings, SendDispatcher, Transmission};
use crate::protocol::{function, DbStruct, Message};
use crate::registry::TypicalRegistry;
use crate::sync::lock;
use crate::typical::{Channel, Command, CommandError, StateUpdate};
use crate::wire::{encode_frame, Addressing};

/// Unanswered pings tolerated before the gateway is declared offline.
pub const MAX_MISSED_PINGS: u32 = 3;

/// Slots per node until the gateway reports its database structure.
pub const DEFAULT_MAX_TYPICAL_PER_NODE: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkStatus {
    Init,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TypicalStatus {
    Online,
    /// The typical is unreachable because its gateway is offline.
    BridgeOffline,
}

/// Something the host should surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    GatewayStatus {
        gateway: u8,
        status: LinkStatus,
    },
    TypicalStatus {
        node: u8,
        slot: u8,
        status: TypicalStatus,
    },
    StateUpdated {
        node: u8,
        slot: u8,
        #[serde(flatten)]
        update: StateUpdate,
    },
    GatewayDetected(DiscoveredGateway),
    TypicalDiscovered(DiscoveredTypical),
    TopicDiscovered(DiscoveredTopic),
}

/// What the host should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    Send(Transmission),
    Emit(Event),
}

#[derive(Debug)]
struct Link {
    status: LinkStatus,
    missed_pings: u32,
}

#[derive(Debug, Clone, Copy)]
struct Structure {
    max_typical_per_node: u8,
    nodes: u8,
}

#[derive(Debug)]
pub struct GatewaySession {
    id: u8,
    destination: SocketAddr,
    addressing: Addressing,
    typicals: TypicalRegistry,
    dispatcher: SendDispatcher,
    link: Mutex<Link>,
    structure: Mutex<Structure>,
    config: GatewayConfig,
}

impl GatewaySession {
    /// Validate `config` and build the session with the typicals it declares.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let id = config.gateway_id()?;
        let destination = config.socket_addr()?;
        let typicals = TypicalRegistry::new();
        for t in config.build_typicals() {
            typicals.insert(t)?;
        }
        let dispatcher = SendDispatcher::new(DispatcherTimings {
            refresh_interval: config.send_refresh_interval(),
            requeue_timeout: config.send_timeout_to_requeue(),
            remove_timeout: config.send_timeout_to_remove_packet(),
        });
        Ok(Self {
            id,
            destination,
            addressing: Addressing::to_gateway(id, config.node_index, config.user_index),
            typicals,
            dispatcher,
            link: Mutex::new(Link {
                status: LinkStatus::Init,
                missed_pings: 0,
            }),
            structure: Mutex::new(Structure {
                max_typical_per_node: DEFAULT_MAX_TYPICAL_PER_NODE,
                nodes: 0,
            }),
            config,
        })
    }

    /// Last octet of the gateway address.
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn typicals(&self) -> &TypicalRegistry {
        &self.typicals
    }

    pub fn dispatcher(&self) -> &SendDispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> LinkStatus {
        lock(&self.link).status
    }

    pub fn missed_pings(&self) -> u32 {
        lock(&self.link).missed_pings
    }

    pub fn max_typical_per_node(&self) -> u8 {
        lock(&self.structure).max_typical_per_node
    }

    /// Nodes covered by subscription and health requests.
    pub fn node_count(&self) -> u8 {
        self.typicals
            .node_count()
            .max(lock(&self.structure).nodes)
    }

    /// Session start: ask the gateway for its database structure.
    pub fn on_start(&self) {
        info!(gateway = self.id, destination = %self.destination, "gateway session started");
        self.queue(&Message::DbStructRequest);
    }

    pub fn on_ping_due(&self) -> Vec<OutboundAction> {
        self.queue(&Message::PingRequest);
        let mut link = lock(&self.link);
        link.missed_pings = link.missed_pings.saturating_add(1);
        trace!(gateway = self.id, missed = link.missed_pings, "ping");
        if link.missed_pings > MAX_MISSED_PINGS && link.status != LinkStatus::Offline {
            link.status = LinkStatus::Offline;
            drop(link);
            warn!(gateway = self.id, "no ping reply; gateway offline");
            return self.status_events(LinkStatus::Offline, TypicalStatus::BridgeOffline);
        }
        Vec::new()
    }

    pub fn on_ping_reply(&self) -> Vec<OutboundAction> {
        let mut link = lock(&self.link);
        link.missed_pings = 0;
        if link.status == LinkStatus::Online {
            return Vec::new();
        }
        link.status = LinkStatus::Online;
        drop(link);
        info!(gateway = self.id, "gateway online");
        self.status_events(LinkStatus::Online, TypicalStatus::Online)
    }

    pub fn on_subscription_due(&self) {
        let nodes = self.node_count();
        debug!(gateway = self.id, nodes, "subscription");
        self.queue(&Message::SubscribeRequest { nodes });
    }

    pub fn on_health_due(&self) {
        let nodes = self.node_count();
        self.queue(&Message::HealthRequest { nodes });
    }

    pub fn on_db_struct_due(&self) {
        self.queue(&Message::DbStructRequest);
    }

    /// Database structure answer; asks for the typical codes of every node.
    pub fn on_db_struct(&self, db: DbStruct) {
        {
            let mut s = lock(&self.structure);
            if db.max_typical_per_node != 0 {
                s.max_typical_per_node = db.max_typical_per_node;
            }
            s.nodes = db.nodes;
        }
        info!(
            gateway = self.id,
            nodes = db.nodes,
            max_nodes = db.max_nodes,
            max_typical_per_node = db.max_typical_per_node,
            "database structure"
        );
        self.queue(&Message::TypicalRequest { nodes: db.nodes });
    }

    /// Raw typical bytes for nodes `start_node..`, `max_typical_per_node` bytes per node.
    pub fn on_state(&self, start_node: u8, data: &[u8], at: SystemTime) -> Vec<OutboundAction> {
        let per_node = usize::from(self.max_typical_per_node());
        let mut out = Vec::new();
        for (node, slot) in self.typicals.addresses() {
            let Some(rel) = node.checked_sub(start_node) else {
                continue;
            };
            if slot >= self.max_typical_per_node() {
                continue;
            }
            let offset = usize::from(rel) * per_node + usize::from(slot);
            let node_end = (usize::from(rel) + 1) * per_node;
            let Some(bytes) = data.get(offset..node_end.min(data.len())) else {
                continue;
            };
            let updates = self
                .typicals
                .set_raw_state(node, slot, bytes, at)
                .unwrap_or_default();
            out.extend(updates.into_iter().map(|update| {
                OutboundAction::Emit(Event::StateUpdated { node, slot, update })
            }));
        }
        out
    }

    /// One health byte per node starting at `start_node`.
    pub fn on_health(&self, start_node: u8, data: &[u8]) -> Vec<OutboundAction> {
        let mut out = Vec::new();
        for (k, health) in data.iter().enumerate() {
            let Some(node) = u8::try_from(k).ok().and_then(|k| start_node.checked_add(k)) else {
                break;
            };
            for (slot, update) in self.typicals.set_health(node, *health) {
                out.push(OutboundAction::Emit(Event::StateUpdated { node, slot, update }));
                out.push(OutboundAction::Emit(Event::TypicalStatus {
                    node,
                    slot,
                    status: TypicalStatus::Online,
                }));
            }
        }
        out
    }

    pub fn on_error(&self, code: u8) {
        let reason = match code {
            function::ERR_FUNCTION_NOT_SUPPORTED => "function not supported",
            function::ERR_DATA_OUT_OF_RANGE => "data out of range",
            function::ERR_SUBSCRIPTION_REFUSED => "subscription refused",
            _ => "unknown error",
        };
        warn!(gateway = self.id, "gateway error 0x{code:02X}: {reason}");
    }

    /// Translate a host command for the typical at (node, slot) and queue the resulting FORCE.
    pub fn command(
        &self,
        node: u8,
        slot: u8,
        channel: Channel,
        command: Command,
    ) -> Result<Vec<OutboundAction>, CommandError> {
        let typical = self
            .typicals
            .get(node, slot)
            .ok_or(CommandError::UnknownTypical { node, slot })?;
        let outcome = typical.handle_command(channel, command)?;
        if !outcome.bytes.is_empty() {
            let frame = encode_frame(&typical.force_message(&outcome.bytes), &self.addressing)?;
            debug!(gateway = self.id, node, slot, ?command, "command queued");
            self.dispatcher.enqueue(self.destination, frame);
        }
        Ok(outcome
            .updates
            .into_iter()
            .map(|update| OutboundAction::Emit(Event::StateUpdated { node, slot, update }))
            .collect())
    }

    /// Dispatcher round: at most one datagram to send.
    pub fn on_dispatcher_tick(&self, now: Instant) -> Vec<OutboundAction> {
        self.dispatcher
            .tick(now, &self.typicals)
            .map(OutboundAction::Send)
            .into_iter()
            .collect()
    }

    /// Drop pending frames. The host cancels its timers and closes the socket.
    pub fn teardown(&self) {
        info!(gateway = self.id, queued = self.dispatcher.len(), "gateway session torn down");
        self.dispatcher.clear();
    }

    fn queue(&self, msg: &Message) {
        match encode_frame(msg, &self.addressing) {
            Ok(frame) => self.dispatcher.enqueue(self.destination, frame),
            Err(e) => warn!(gateway = self.id, "cannot encode 0x{:02X}: {e}", msg.function()),
        }
    }

    fn status_events(&self, link: LinkStatus, typical: TypicalStatus) -> Vec<OutboundAction> {
        let mut out = vec![OutboundAction::Emit(Event::GatewayStatus {
            gateway: self.id,
            status: link,
        })];
        out.extend(self.typicals.addresses().into_iter().map(|(node, slot)| {
            OutboundAction::Emit(Event::TypicalStatus {
                node,
                slot,
                status: typical,
            })
        }));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypicalConfig;
    use crate::protocol::{t1n, PAYLOAD_OFFSET};
    use crate::typical::{ChannelValue, TypicalKind};
    use crate::wire::decode_frame;

    fn session() -> GatewaySession {
        let mut c = GatewayConfig::new("192.168.1.77");
        c.typicals = vec![
            TypicalConfig {
                kind: TypicalKind::T11,
                node: 5,
                slot: 0,
                label: None,
                secure_send: None,
            },
            TypicalConfig {
                kind: TypicalKind::T52,
                node: 1,
                slot: 2,
                label: None,
                secure_send: None,
            },
        ];
        GatewaySession::new(c).unwrap()
    }

    fn gateway_status(actions: &[OutboundAction]) -> Option<LinkStatus> {
        actions.iter().find_map(|a| match a {
            OutboundAction::Emit(Event::GatewayStatus { status, .. }) => Some(*status),
            _ => None,
        })
    }

    fn drain(s: &GatewaySession, now: Instant) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(OutboundAction::Send(t)) = s.on_dispatcher_tick(now).pop() {
            out.push(decode_frame(&t.bytes).unwrap());
        }
        out
    }

    #[test]
    fn invalid_config_fails_construction() {
        assert!(matches!(
            GatewaySession::new(GatewayConfig::new("not-an-address")),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn ping_hysteresis() {
        let s = session();
        assert_eq!(s.status(), LinkStatus::Init);
        assert_eq!(gateway_status(&s.on_ping_reply()), Some(LinkStatus::Online));
        for _ in 0..3 {
            assert!(s.on_ping_due().is_empty());
        }
        let offline = s.on_ping_due();
        assert_eq!(gateway_status(&offline), Some(LinkStatus::Offline));
        assert!(offline.contains(&OutboundAction::Emit(Event::TypicalStatus {
            node: 5,
            slot: 0,
            status: TypicalStatus::BridgeOffline,
        })));
        assert!(s.on_ping_due().is_empty());

        assert_eq!(gateway_status(&s.on_ping_reply()), Some(LinkStatus::Online));
        assert_eq!(s.missed_pings(), 0);
        assert!(s.on_ping_reply().is_empty());
    }

    #[test]
    fn subscription_covers_configured_nodes() {
        let s = session();
        s.on_subscription_due();
        assert_eq!(
            drain(&s, Instant::now()),
            vec![Message::SubscribeRequest { nodes: 6 }]
        );
    }

    #[test]
    fn db_struct_updates_layout_and_requests_typicals() {
        let s = session();
        s.on_db_struct(DbStruct {
            nodes: 8,
            max_nodes: 20,
            max_typical_per_node: 10,
            max_requests: 5,
        });
        assert_eq!(s.max_typical_per_node(), 10);
        assert_eq!(s.node_count(), 8);
        assert_eq!(
            drain(&s, Instant::now()),
            vec![Message::TypicalRequest { nodes: 8 }]
        );
    }

    #[test]
    fn state_window_reaches_typicals() {
        let s = session();
        let mut data = vec![0u8; 24 * 6];
        data[5 * 24] = t1n::ON_COIL;
        data[24 + 2] = 0x80;
        data[24 + 3] = 0x4D;
        let actions = s.on_state(0, &data, SystemTime::now());
        assert!(actions.contains(&OutboundAction::Emit(Event::StateUpdated {
            node: 5,
            slot: 0,
            update: StateUpdate {
                channel: Channel::OnOff,
                value: ChannelValue::OnOff(true),
            },
        })));
        assert!(actions.contains(&OutboundAction::Emit(Event::StateUpdated {
            node: 1,
            slot: 2,
            update: StateUpdate {
                channel: Channel::Value,
                value: ChannelValue::Decimal(22.0),
            },
        })));
        assert!(s.on_state(0, &data, SystemTime::now()).is_empty());
    }

    #[test]
    fn state_window_with_offset_start() {
        let s = session();
        let mut data = vec![0u8; 24];
        data[0] = t1n::ON_COIL;
        s.on_state(5, &data, SystemTime::now());
        assert_eq!(s.typicals().get(5, 0).and_then(|t| t.raw_state()), Some(t1n::ON_COIL));
        assert_eq!(s.typicals().get(1, 2).and_then(|t| t.raw_state()), None);
    }

    #[test]
    fn command_queues_force() {
        let s = session();
        assert!(s.command(5, 0, Channel::OnOff, Command::On).unwrap().is_empty());
        let q = s.dispatcher().snapshot();
        assert_eq!(q.len(), 1);
        assert_eq!(&q[0].bytes()[PAYLOAD_OFFSET..], &[t1n::ON_CMD]);
        assert_eq!(
            s.command(9, 0, Channel::OnOff, Command::On),
            Err(CommandError::UnknownTypical { node: 9, slot: 0 })
        );
    }

    #[test]
    fn health_marks_typicals_online() {
        let s = session();
        let actions = s.on_health(0, &[0, 50, 0, 0, 0, 60]);
        assert!(actions.contains(&OutboundAction::Emit(Event::TypicalStatus {
            node: 1,
            slot: 2,
            status: TypicalStatus::Online,
        })));
        assert_eq!(s.typicals().get(5, 0).and_then(|t| t.health()), Some(60));
    }

    #[test]
    fn teardown_drops_queue() {
        let s = session();
        s.on_start();
        s.on_ping_due();
        s.teardown();
        assert!(s.dispatcher().is_empty());
    }
}
