//! Gateway configuration as supplied by the host.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::Deserialize;

use crate::protocol::DEFAULT_GATEWAY_PORT;
use crate::typical::{Typical, TypicalKind};

/// One gateway and the typicals declared behind it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatewayConfig {
    /// IPv4 address of the gateway. Its last octet identifies the gateway everywhere.
    pub gateway_lan_address: String,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
    /// Local UDP port to bind; 0 picks an ephemeral one.
    #[serde(default)]
    pub preferred_local_port: u16,
    /// Seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Seconds.
    #[serde(default = "default_subscription_interval")]
    pub subscription_interval: u64,
    /// Seconds.
    #[serde(default = "default_healthy_interval")]
    pub healthy_interval: u64,
    /// Milliseconds between dispatcher sends when more than one frame is queued.
    #[serde(default = "default_send_refresh_interval")]
    pub send_refresh_interval: u64,
    /// Milliseconds before a sent, unconfirmed frame is sent again.
    #[serde(default = "default_send_timeout_to_requeue")]
    pub send_timeout_to_requeue: u64,
    /// Milliseconds before a sent, unconfirmed frame is given up on.
    #[serde(default = "default_send_timeout_to_remove_packet")]
    pub send_timeout_to_remove_packet: u64,
    #[serde(default = "default_secure_send")]
    pub secure_send: bool,
    /// VNet node index the binding presents itself with.
    #[serde(default = "default_node_index")]
    pub node_index: u8,
    /// VNet user index the binding presents itself with.
    #[serde(default = "default_user_index")]
    pub user_index: u8,
    #[serde(default)]
    pub typicals: Vec<TypicalConfig>,
}

/// A typical declared by the host at (node, slot).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypicalConfig {
    pub kind: TypicalKind,
    pub node: u8,
    pub slot: u8,
    #[serde(default)]
    pub label: Option<String>,
    /// Overrides the gateway's `secureSend` for this typical.
    #[serde(default)]
    pub secure_send: Option<bool>,
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_ping_interval() -> u64 {
    30
}
fn default_subscription_interval() -> u64 {
    120
}
fn default_healthy_interval() -> u64 {
    35
}
fn default_send_refresh_interval() -> u64 {
    1000
}
fn default_send_timeout_to_requeue() -> u64 {
    5000
}
fn default_send_timeout_to_remove_packet() -> u64 {
    15000
}
fn default_secure_send() -> bool {
    true
}
fn default_node_index() -> u8 {
    70
}
fn default_user_index() -> u8 {
    120
}

impl GatewayConfig {
    /// Configuration with every optional key at its default.
    pub fn new(gateway_lan_address: impl Into<String>) -> Self {
        Self {
            gateway_lan_address: gateway_lan_address.into(),
            gateway_port: default_gateway_port(),
            preferred_local_port: 0,
            ping_interval: default_ping_interval(),
            subscription_interval: default_subscription_interval(),
            healthy_interval: default_healthy_interval(),
            send_refresh_interval: default_send_refresh_interval(),
            send_timeout_to_requeue: default_send_timeout_to_requeue(),
            send_timeout_to_remove_packet: default_send_timeout_to_remove_packet(),
            secure_send: default_secure_send(),
            node_index: default_node_index(),
            user_index: default_user_index(),
            typicals: Vec::new(),
        }
    }

    pub fn address(&self) -> Result<Ipv4Addr, ConfigError> {
        self.gateway_lan_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.gateway_lan_address.clone()))
    }

    /// Last octet of the gateway address.
    pub fn gateway_id(&self) -> Result<u8, ConfigError> {
        Ok(self.address()?.octets()[3])
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::V4(SocketAddrV4::new(
            self.address()?,
            self.gateway_port,
        )))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn subscription_interval(&self) -> Duration {
        Duration::from_secs(self.subscription_interval)
    }

    pub fn healthy_interval(&self) -> Duration {
        Duration::from_secs(self.healthy_interval)
    }

    pub fn send_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.send_refresh_interval)
    }

    pub fn send_timeout_to_requeue(&self) -> Duration {
        Duration::from_millis(self.send_timeout_to_requeue)
    }

    pub fn send_timeout_to_remove_packet(&self) -> Duration {
        Duration::from_millis(self.send_timeout_to_remove_packet)
    }

    /// Reject configurations the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.address()?;
        let intervals = [
            ("pingInterval", self.ping_interval),
            ("subscriptionInterval", self.subscription_interval),
            ("healthyInterval", self.healthy_interval),
            ("sendRefreshInterval", self.send_refresh_interval),
            ("sendTimeoutToRequeue", self.send_timeout_to_requeue),
            ("sendTimeoutToRemovePacket", self.send_timeout_to_remove_packet),
        ];
        if let Some((key, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidInterval(format!("{key} must be positive")));
        }
        if self.send_timeout_to_remove_packet < self.send_timeout_to_requeue {
            return Err(ConfigError::InvalidInterval(
                "sendTimeoutToRemovePacket is lower than sendTimeoutToRequeue".into(),
            ));
        }
        let mut seen = HashSet::new();
        for t in &self.typicals {
            if !seen.insert((t.node, t.slot)) {
                return Err(ConfigError::DuplicateTypical {
                    node: t.node,
                    slot: t.slot,
                });
            }
        }
        let mut occupied = HashMap::new();
        for t in &self.typicals {
            for slot in (t.slot..=u8::MAX).take(t.kind.width()) {
                if let Some(owner) = occupied.insert((t.node, slot), t.slot) {
                    return Err(ConfigError::OverlappingTypical {
                        node: t.node,
                        slot: t.slot,
                        owner,
                    });
                }
            }
        }
        Ok(())
    }

    /// Typicals declared in this configuration, with the secure-send fallback applied.
    pub fn build_typicals(&self) -> Vec<Typical> {
        self.typicals
            .iter()
            .map(|t| {
                let typical = Typical::new(t.kind, t.node, t.slot)
                    .with_secure_send(t.secure_send.unwrap_or(self.secure_send));
                match &t.label {
                    Some(label) => typical.with_label(label.clone()),
                    None => typical,
                }
            })
            .collect()
    }
}

/// Configuration errors. All of them are fatal for the gateway.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid gateway address {0:?}")]
    InvalidAddress(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    #[error("a gateway with id {0} is already registered")]
    DuplicateGateway(u8),
    #[error("gateway {requested} rejected: gateway {registered} is already registered")]
    MultipleGateways { registered: u8, requested: u8 },
    #[error("typical at node {node}, slot {slot} is declared twice")]
    DuplicateTypical { node: u8, slot: u8 },
    #[error("typical at node {node}, slot {slot} overlaps the typical at slot {owner}")]
    OverlappingTypical { node: u8, slot: u8, owner: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_toml() {
        let c: GatewayConfig = toml::from_str(r#"gatewayLanAddress = "192.168.1.77""#).unwrap();
        assert_eq!(c.gateway_port, 230);
        assert_eq!(c.ping_interval(), Duration::from_secs(30));
        assert_eq!(c.subscription_interval(), Duration::from_secs(120));
        assert_eq!(c.send_refresh_interval(), Duration::from_millis(1000));
        assert_eq!(c.send_timeout_to_requeue(), Duration::from_millis(5000));
        assert_eq!(c.send_timeout_to_remove_packet(), Duration::from_millis(15000));
        assert!(c.secure_send);
        assert_eq!(c.gateway_id(), Ok(77));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn typicals_inherit_secure_send() {
        let c: GatewayConfig = toml::from_str(
            r#"
            gatewayLanAddress = "10.0.0.9"
            secureSend = false

            [[typicals]]
            kind = "T11"
            node = 5
            slot = 0

            [[typicals]]
            kind = "T22"
            node = 2
            slot = 1
            secureSend = true
            label = "Kitchen shutter"
            "#,
        )
        .unwrap();
        let typicals = c.build_typicals();
        assert!(!typicals[0].secure_send());
        assert!(typicals[1].secure_send());
        assert_eq!(typicals[1].label(), "Kitchen shutter");
    }

    #[test]
    fn rejects_bad_address() {
        let c = GatewayConfig::new("192.168.1");
        assert_eq!(
            c.validate(),
            Err(ConfigError::InvalidAddress("192.168.1".into()))
        );
    }

    #[test]
    fn rejects_bad_intervals() {
        let mut c = GatewayConfig::new("192.168.1.77");
        c.ping_interval = 0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidInterval(_))));

        let mut c = GatewayConfig::new("192.168.1.77");
        c.send_timeout_to_remove_packet = 1000;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidInterval(_))));
    }

    #[test]
    fn rejects_duplicate_typical() {
        let c: GatewayConfig = toml::from_str(
            r#"
            gatewayLanAddress = "10.0.0.9"
            typicals = [
                { kind = "T11", node = 1, slot = 0 },
                { kind = "T12", node = 1, slot = 0 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(
            c.validate(),
            Err(ConfigError::DuplicateTypical { node: 1, slot: 0 })
        );
    }

    #[test]
    fn rejects_slots_inside_multi_slot_typical() {
        let c: GatewayConfig = toml::from_str(
            r#"
            gatewayLanAddress = "10.0.0.9"
            typicals = [
                { kind = "T31", node = 2, slot = 0 },
                { kind = "T11", node = 2, slot = 2 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(
            c.validate(),
            Err(ConfigError::OverlappingTypical {
                node: 2,
                slot: 2,
                owner: 0,
            })
        );

        let c: GatewayConfig = toml::from_str(
            r#"
            gatewayLanAddress = "10.0.0.9"
            typicals = [
                { kind = "T11", node = 2, slot = 4 },
                { kind = "T61", node = 2, slot = 3 },
                { kind = "T31", node = 2, slot = 5 },
                { kind = "T11", node = 3, slot = 2 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(
            c.validate(),
            Err(ConfigError::OverlappingTypical {
                node: 2,
                slot: 3,
                owner: 4,
            })
        );

        let c: GatewayConfig = toml::from_str(
            r#"
            gatewayLanAddress = "10.0.0.9"
            typicals = [
                { kind = "T31", node = 2, slot = 0 },
                { kind = "T11", node = 2, slot = 5 },
                { kind = "T61", node = 2, slot = 6 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn rejects_unknown_keys() {
        let r: Result<GatewayConfig, _> =
            toml::from_str("gatewayLanAddress = \"10.0.0.9\"\nbogus = 1");
        assert!(r.is_err());
    }
}
