//! Souliss gateway binding core.
//! Host-driven: no I/O; host passes datagrams, timer ticks and commands, and receives actions.

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod half_float;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod session;
mod sync;
pub mod typical;
pub mod wire;

pub use config::{ConfigError, GatewayConfig, TypicalConfig};
pub use discovery::{DiscoveredGateway, DiscoveredTopic, DiscoveredTypical, Discovery};
pub use dispatcher::{SendDispatcher, Transmission};
pub use listener::Listener;
pub use protocol::Message;
pub use registry::{GatewayRegistry, TypicalRegistry};
pub use session::{Event, GatewaySession, LinkStatus, OutboundAction, TypicalStatus};
pub use typical::{Channel, ChannelValue, Command, CommandError, StateUpdate, Typical, TypicalKind};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
