//! Typicals: the logic bound to one (node, slot). A typical caches the raw bytes the node reports,
//! turns changes into channel updates, translates host commands into FORCE bytes and declares the
//! raw state a command should produce so secure send can confirm it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::half_float;
use crate::protocol::{t1n, t2n, t3n, t4n, typical_code, Message};
use crate::wire::FrameEncodeError;

/// Typical type codes supported by the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypicalKind {
    /// ON/OFF digital output.
    T11,
    /// ON/OFF digital output with AUTO mode.
    T12,
    /// Digital input value.
    T13,
    /// Pulse digital output.
    T14,
    /// Motorized devices with limit switches.
    T21,
    /// Motorized devices with limit switches and middle position.
    T22,
    /// Temperature control (thermostat).
    T31,
    /// Anti-theft integration (main).
    T41,
    /// Anti-theft integration (peer).
    T42,
    T51,
    T52,
    T53,
    T54,
    T55,
    T56,
    T57,
    T58,
    T61,
    T62,
    T63,
    T64,
    T65,
    T66,
    T67,
    T68,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Switch,
    Pulse,
    Shutter,
    Thermostat,
    AntitheftMain,
    AntitheftPeer,
    Sensor,
    Setpoint,
}

impl TypicalKind {
    pub fn from_code(code: u8) -> Option<Self> {
        use TypicalKind::*;
        let kind = match code {
            typical_code::T11 => T11,
            typical_code::T12 => T12,
            typical_code::T13 => T13,
            typical_code::T14 => T14,
            typical_code::T21 => T21,
            typical_code::T22 => T22,
            typical_code::T31 => T31,
            typical_code::T41 => T41,
            typical_code::T42 => T42,
            typical_code::T51 => T51,
            typical_code::T52 => T52,
            typical_code::T53 => T53,
            typical_code::T54 => T54,
            typical_code::T55 => T55,
            typical_code::T56 => T56,
            typical_code::T57 => T57,
            typical_code::T58 => T58,
            typical_code::T61 => T61,
            typical_code::T62 => T62,
            typical_code::T63 => T63,
            typical_code::T64 => T64,
            typical_code::T65 => T65,
            typical_code::T66 => T66,
            typical_code::T67 => T67,
            typical_code::T68 => T68,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(self) -> u8 {
        use TypicalKind::*;
        match self {
            T11 => typical_code::T11,
            T12 => typical_code::T12,
            T13 => typical_code::T13,
            T14 => typical_code::T14,
            T21 => typical_code::T21,
            T22 => typical_code::T22,
            T31 => typical_code::T31,
            T41 => typical_code::T41,
            T42 => typical_code::T42,
            T51 => typical_code::T51,
            T52 => typical_code::T52,
            T53 => typical_code::T53,
            T54 => typical_code::T54,
            T55 => typical_code::T55,
            T56 => typical_code::T56,
            T57 => typical_code::T57,
            T58 => typical_code::T58,
            T61 => typical_code::T61,
            T62 => typical_code::T62,
            T63 => typical_code::T63,
            T64 => typical_code::T64,
            T65 => typical_code::T65,
            T66 => typical_code::T66,
            T67 => typical_code::T67,
            T68 => typical_code::T68,
        }
    }

    /// Number of consecutive slots the typical occupies.
    pub fn width(self) -> usize {
        match self.family() {
            Family::Thermostat => 5,
            Family::Sensor | Family::Setpoint => 2,
            _ => 1,
        }
    }

    /// Whether the typical accepts any command at all.
    pub fn is_commandable(self) -> bool {
        match self.family() {
            Family::Sensor => false,
            Family::Setpoint => self == TypicalKind::T61,
            _ => true,
        }
    }

    fn family(self) -> Family {
        use TypicalKind::*;
        match self {
            T11 | T12 | T13 => Family::Switch,
            T14 => Family::Pulse,
            T21 | T22 => Family::Shutter,
            T31 => Family::Thermostat,
            T41 => Family::AntitheftMain,
            T42 => Family::AntitheftPeer,
            T51 | T52 | T53 | T54 | T55 | T56 | T57 | T58 => Family::Sensor,
            T61 | T62 | T63 | T64 | T65 | T66 | T67 | T68 => Family::Setpoint,
        }
    }
}

impl fmt::Display for TypicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// User-visible channels of a typical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    OnOff,
    Rollershutter,
    RollershutterState,
    StatusAlarm,
    RearmAlarm,
    Temperature,
    Setpoint,
    System,
    Fire,
    Fan,
    Mode,
    Value,
    Healthy,
    #[serde(rename = "lastStatusStored")]
    LastStatusStored,
}

/// Value pushed to the host for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ChannelValue {
    OnOff(bool),
    Percent(u8),
    Text(&'static str),
    Decimal(f32),
    /// Milliseconds since the Unix epoch.
    Timestamp(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateUpdate {
    pub channel: Channel,
    pub value: ChannelValue,
}

impl StateUpdate {
    fn new(channel: Channel, value: ChannelValue) -> Self {
        Self { channel, value }
    }
}

/// High-level commands the host can issue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    On,
    Off,
    Toggle,
    Auto,
    Up,
    Down,
    Stop,
    Rearm,
    Setpoint(f32),
    Heating,
    Cooling,
    FanOff,
    FanLow,
    FanMedium,
    FanHigh,
    FanAuto,
    ShutDown,
    Refresh,
}

/// Raw state a command is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    State(u8),
    /// The command is not subject to acknowledgement.
    NotApplicable,
}

/// Result of translating a host command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandOutcome {
    /// Command bytes starting at the typical's own slot. Empty means nothing to send.
    pub bytes: Vec<u8>,
    /// Updates applied locally right away (e.g. momentary controls resetting to OFF).
    pub updates: Vec<StateUpdate>,
}

impl CommandOutcome {
    fn send(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            updates: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("{0} is read-only")]
    ReadOnly(TypicalKind),
    #[error("{kind} does not accept {command:?} on channel {channel:?}")]
    Unsupported {
        kind: TypicalKind,
        channel: Channel,
        command: Command,
    },
    #[error("no typical at node {node}, slot {slot}")]
    UnknownTypical { node: u8, slot: u8 },
    #[error(transparent)]
    Encode(#[from] FrameEncodeError),
}

/// One logical endpoint at (node, slot) with its cached raw state.
#[derive(Debug, Clone)]
pub struct Typical {
    kind: TypicalKind,
    node: u8,
    slot: u8,
    label: String,
    secure_send: bool,
    raw: Option<Vec<u8>>,
    last_update: Option<SystemTime>,
    health: Option<u8>,
}

impl Typical {
    pub fn new(kind: TypicalKind, node: u8, slot: u8) -> Self {
        Self {
            kind,
            node,
            slot,
            label: format!("{kind}: node {node}, slot {slot}"),
            secure_send: true,
            raw: None,
            last_update: None,
            health: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_secure_send(mut self, secure_send: bool) -> Self {
        self.secure_send = secure_send;
        self
    }

    pub fn kind(&self) -> TypicalKind {
        self.kind
    }

    pub fn node(&self) -> u8 {
        self.node
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secure_send(&self) -> bool {
        self.secure_send
    }

    /// Leading raw byte, the one secure send compares against. `None` until the node reported.
    pub fn raw_state(&self) -> Option<u8> {
        self.raw.as_ref().and_then(|r| r.first().copied())
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Time the raw state last changed.
    pub fn last_update(&self) -> Option<SystemTime> {
        self.last_update
    }

    pub fn health(&self) -> Option<u8> {
        self.health
    }

    /// Store the bytes reported by the node. Emits channel updates only when they differ from the
    /// cached value.
    pub fn set_raw_state(&mut self, bytes: &[u8], now: SystemTime) -> Vec<StateUpdate> {
        let len = bytes.len().min(self.kind.width());
        let bytes = &bytes[..len];
        if bytes.is_empty() || self.raw.as_deref() == Some(bytes) {
            return Vec::new();
        }
        self.raw = Some(bytes.to_vec());
        self.last_update = Some(now);

        let mut updates = self.decode_state(bytes);
        updates.push(StateUpdate::new(
            Channel::LastStatusStored,
            ChannelValue::Timestamp(epoch_millis(now)),
        ));
        updates
    }

    pub fn set_health(&mut self, health: u8) -> StateUpdate {
        self.health = Some(health);
        StateUpdate::new(Channel::Healthy, ChannelValue::Decimal(f32::from(health)))
    }

    /// Raw state `command` should lead to once the node executed it.
    pub fn expected(&self, command: u8) -> Expected {
        if !self.secure_send {
            return Expected::NotApplicable;
        }
        let state = match (self.kind.family(), command) {
            (Family::Switch, t1n::ON_CMD) => t1n::ON_COIL,
            (Family::Switch, t1n::OFF_CMD) => t1n::OFF_COIL,
            (Family::Shutter, t2n::OPEN_CMD) => t2n::COIL_OPEN,
            (Family::Shutter, t2n::CLOSE_CMD) => t2n::COIL_CLOSE,
            // Toggle and local commands are never retransmitted: a repeated toggle reverses itself.
            (Family::Shutter, t2n::STOP_CMD) => t2n::COIL_STOP,
            (Family::AntitheftMain, t4n::ARMED) | (Family::AntitheftMain, t4n::REARM) => {
                t4n::ANTITHEFT
            }
            (Family::AntitheftMain, t4n::NOT_ARMED) => t4n::NO_ANTITHEFT,
            (Family::AntitheftPeer, t4n::REARM) => t4n::ANTITHEFT,
            _ => return Expected::NotApplicable,
        };
        Expected::State(state)
    }

    /// Translate a host command on `channel` into command bytes for this typical's slots.
    pub fn handle_command(
        &self,
        channel: Channel,
        command: Command,
    ) -> Result<CommandOutcome, CommandError> {
        if command == Command::Refresh {
            return Ok(CommandOutcome::default());
        }
        if !self.kind.is_commandable() {
            return Err(CommandError::ReadOnly(self.kind));
        }
        let unsupported = || CommandError::Unsupported {
            kind: self.kind,
            channel,
            command,
        };

        let outcome = match (self.kind.family(), channel, command) {
            (Family::Switch, Channel::OnOff, Command::On) => {
                CommandOutcome::send(vec![t1n::ON_CMD])
            }
            (Family::Switch, Channel::OnOff, Command::Off) => {
                CommandOutcome::send(vec![t1n::OFF_CMD])
            }
            (Family::Switch, Channel::OnOff, Command::Toggle) => {
                CommandOutcome::send(vec![t1n::TOGGLE_CMD])
            }
            (Family::Switch, Channel::OnOff, Command::Auto) if self.kind == TypicalKind::T12 => {
                CommandOutcome::send(vec![t1n::AUTO_CMD])
            }
            (Family::Pulse, Channel::OnOff, Command::On) => CommandOutcome {
                bytes: vec![t1n::ON_CMD],
                updates: vec![StateUpdate::new(Channel::OnOff, ChannelValue::OnOff(false))],
            },

            (Family::Shutter, Channel::Rollershutter, Command::Up) => {
                CommandOutcome::send(vec![t2n::OPEN_CMD])
            }
            (Family::Shutter, Channel::Rollershutter, Command::Down) => {
                CommandOutcome::send(vec![t2n::CLOSE_CMD])
            }
            (Family::Shutter, Channel::Rollershutter, Command::Stop) => {
                CommandOutcome::send(vec![t2n::STOP_CMD])
            }
            (Family::Shutter, Channel::Rollershutter, Command::Toggle) => {
                CommandOutcome::send(vec![t2n::TOGGLE_CMD])
            }
            (Family::Shutter, Channel::OnOff, Command::On) => {
                CommandOutcome::send(vec![t2n::OPEN_CMD_LOCAL])
            }
            (Family::Shutter, Channel::OnOff, Command::Off) => {
                CommandOutcome::send(vec![t2n::CLOSE_CMD_LOCAL])
            }

            (Family::Thermostat, Channel::Setpoint, Command::Setpoint(value)) => {
                let [lo, hi] = half_float::encode(value);
                CommandOutcome::send(vec![t3n::SET_TEMP, 0x00, 0x00, lo, hi])
            }
            (Family::Thermostat, Channel::Mode, command) => match command {
                Command::Heating => CommandOutcome::send(vec![t3n::HEATING]),
                Command::Cooling => CommandOutcome::send(vec![t3n::COOLING]),
                _ => return Err(unsupported()),
            },
            (Family::Thermostat, Channel::Fan, command) => match command {
                Command::FanOff => CommandOutcome::send(vec![t3n::FAN_OFF]),
                Command::FanLow => CommandOutcome::send(vec![t3n::FAN_LOW]),
                Command::FanMedium => CommandOutcome::send(vec![t3n::FAN_MED]),
                Command::FanHigh => CommandOutcome::send(vec![t3n::FAN_HIGH]),
                Command::FanAuto => CommandOutcome::send(vec![t3n::FAN_AUTO]),
                _ => return Err(unsupported()),
            },
            (Family::Thermostat, Channel::System, Command::Off | Command::ShutDown) => {
                CommandOutcome::send(vec![t3n::SHUT_DOWN])
            }
            (Family::Thermostat, Channel::System, Command::On) => {
                CommandOutcome::send(vec![t3n::AS_MEASURED])
            }

            (Family::AntitheftMain, Channel::OnOff, Command::On) => {
                CommandOutcome::send(vec![t4n::ARMED])
            }
            (Family::AntitheftMain, Channel::OnOff, Command::Off) => {
                CommandOutcome::send(vec![t4n::NOT_ARMED])
            }
            (
                Family::AntitheftMain | Family::AntitheftPeer,
                Channel::RearmAlarm,
                Command::On | Command::Rearm,
            ) => CommandOutcome {
                bytes: vec![t4n::REARM],
                updates: vec![StateUpdate::new(
                    Channel::RearmAlarm,
                    ChannelValue::OnOff(false),
                )],
            },

            (Family::Setpoint, Channel::Setpoint, Command::Setpoint(value)) => {
                let [lo, hi] = half_float::encode(value);
                CommandOutcome::send(vec![lo, hi])
            }
            _ => return Err(unsupported()),
        };
        Ok(outcome)
    }

    /// FORCE message carrying `bytes` at this typical's slot.
    pub fn force_message(&self, bytes: &[u8]) -> Message {
        let mut commands = vec![0u8; usize::from(self.slot)];
        commands.extend_from_slice(bytes);
        Message::Force {
            node: self.node,
            commands,
        }
    }

    fn decode_state(&self, raw: &[u8]) -> Vec<StateUpdate> {
        let lead = raw.first().copied().unwrap_or_default();
        match self.kind.family() {
            Family::Switch | Family::Pulse => on_off_from_t1n(lead)
                .map(|on| vec![StateUpdate::new(Channel::OnOff, ChannelValue::OnOff(on))])
                .unwrap_or_default(),
            Family::Shutter => {
                let mut updates = Vec::new();
                if let Some(percent) = shutter_percent(lead) {
                    updates.push(StateUpdate::new(
                        Channel::Rollershutter,
                        ChannelValue::Percent(percent),
                    ));
                }
                if let Some(message) = shutter_message(lead) {
                    updates.push(StateUpdate::new(
                        Channel::RollershutterState,
                        ChannelValue::Text(message),
                    ));
                }
                updates
            }
            Family::Thermostat => thermostat_updates(raw),
            Family::AntitheftMain => vec![
                StateUpdate::new(
                    Channel::OnOff,
                    ChannelValue::OnOff(lead != t4n::NO_ANTITHEFT),
                ),
                StateUpdate::new(
                    Channel::StatusAlarm,
                    ChannelValue::OnOff(lead == t4n::IN_ALARM),
                ),
                StateUpdate::new(Channel::RearmAlarm, ChannelValue::OnOff(false)),
            ],
            Family::AntitheftPeer => vec![
                StateUpdate::new(
                    Channel::StatusAlarm,
                    ChannelValue::OnOff(lead == t4n::IN_ALARM),
                ),
                StateUpdate::new(Channel::RearmAlarm, ChannelValue::OnOff(false)),
            ],
            Family::Sensor | Family::Setpoint => match raw {
                [lo, hi, ..] => vec![StateUpdate::new(
                    Channel::Value,
                    ChannelValue::Decimal(half_float::decode(*lo, *hi)),
                )],
                _ => Vec::new(),
            },
        }
    }
}

fn on_off_from_t1n(raw: u8) -> Option<bool> {
    match raw {
        t1n::ON_COIL | t1n::ON_FEEDBACK | t1n::AUTO_ON_COIL => Some(true),
        t1n::OFF_COIL | t1n::OFF_FEEDBACK | t1n::AUTO_OFF_COIL => Some(false),
        _ => None,
    }
}

fn shutter_percent(raw: u8) -> Option<u8> {
    match raw {
        t2n::COIL_OPEN | t2n::LIMSWITCH_OPEN | t2n::STATE_OPEN => Some(0),
        t2n::COIL_CLOSE | t2n::LIMSWITCH_CLOSE | t2n::STATE_CLOSE => Some(100),
        t2n::COIL_STOP | t2n::NOLIMSWITCH | t2n::TIMER_OFF => Some(50),
        _ => None,
    }
}

fn shutter_message(raw: u8) -> Option<&'static str> {
    let message = match raw {
        t2n::COIL_OPEN => "opening",
        t2n::COIL_CLOSE => "closing",
        t2n::COIL_STOP => "stop",
        t2n::LIMSWITCH_OPEN | t2n::NOLIMSWITCH => "limit switch open",
        t2n::LIMSWITCH_CLOSE => "limit switch close",
        t2n::TIMER_OFF => "timer off",
        t2n::STATE_OPEN => "open",
        t2n::STATE_CLOSE => "close",
        _ => return None,
    };
    Some(message)
}

fn thermostat_updates(raw: &[u8]) -> Vec<StateUpdate> {
    let status = raw.first().copied().unwrap_or_default();
    let fan = if status & t3n::FAN_ON_3 != 0 {
        "high"
    } else if status & t3n::FAN_ON_2 != 0 {
        "medium"
    } else if status & t3n::FAN_ON_1 != 0 {
        "low"
    } else {
        "off"
    };
    let mode = if status & t3n::HEATING_MODE != 0 {
        "heating"
    } else {
        "cooling"
    };
    let mut updates = vec![
        StateUpdate::new(
            Channel::System,
            ChannelValue::OnOff(status & t3n::SYSTEM_ON != 0),
        ),
        StateUpdate::new(
            Channel::Fire,
            ChannelValue::OnOff(status & (t3n::HEATING_ON | t3n::COOLING_ON) != 0),
        ),
        StateUpdate::new(Channel::Fan, ChannelValue::Text(fan)),
        StateUpdate::new(Channel::Mode, ChannelValue::Text(mode)),
    ];
    if let [_, t_lo, t_hi, ..] = raw {
        updates.push(StateUpdate::new(
            Channel::Temperature,
            ChannelValue::Decimal(half_float::decode(*t_lo, *t_hi)),
        ));
    }
    if let [_, _, _, s_lo, s_hi, ..] = raw {
        updates.push(StateUpdate::new(
            Channel::Setpoint,
            ChannelValue::Decimal(half_float::decode(*s_lo, *s_hi)),
        ));
    }
    updates
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(updates: &[StateUpdate], channel: Channel) -> Vec<ChannelValue> {
        updates
            .iter()
            .filter(|u| u.channel == channel)
            .map(|u| u.value.clone())
            .collect()
    }

    #[test]
    fn codes_round_trip() {
        for code in 0..=u8::MAX {
            if let Some(kind) = TypicalKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
        assert_eq!(TypicalKind::from_code(typical_code::RELATED), None);
        assert_eq!(TypicalKind::from_code(0x16), None);
    }

    #[test]
    fn switch_expected_states() {
        let t = Typical::new(TypicalKind::T11, 5, 0);
        assert_eq!(t.expected(t1n::ON_CMD), Expected::State(t1n::ON_COIL));
        assert_eq!(t.expected(t1n::OFF_CMD), Expected::State(t1n::OFF_COIL));
        assert_eq!(t.expected(t1n::TOGGLE_CMD), Expected::NotApplicable);
    }

    #[test]
    fn secure_send_disabled_is_not_applicable() {
        let t = Typical::new(TypicalKind::T22, 1, 2).with_secure_send(false);
        assert_eq!(t.expected(t2n::OPEN_CMD), Expected::NotApplicable);
    }

    #[test]
    fn shutter_expected_states() {
        let t = Typical::new(TypicalKind::T22, 1, 2);
        assert_eq!(t.expected(t2n::OPEN_CMD), Expected::State(t2n::COIL_OPEN));
        assert_eq!(t.expected(t2n::CLOSE_CMD), Expected::State(t2n::COIL_CLOSE));
        assert_eq!(t.expected(t2n::STOP_CMD), Expected::State(t2n::COIL_STOP));
        assert_eq!(t.expected(t2n::TOGGLE_CMD), Expected::NotApplicable);
        assert_eq!(t.expected(t2n::OPEN_CMD_LOCAL), Expected::NotApplicable);
        assert_eq!(t.expected(t2n::CLOSE_CMD_LOCAL), Expected::NotApplicable);
    }

    #[test]
    fn set_raw_state_only_reports_changes() {
        let mut t = Typical::new(TypicalKind::T11, 5, 0);
        let now = SystemTime::now();
        let first = t.set_raw_state(&[t1n::ON_COIL], now);
        assert_eq!(values(&first, Channel::OnOff), vec![ChannelValue::OnOff(true)]);
        assert_eq!(values(&first, Channel::LastStatusStored).len(), 1);
        assert_eq!(t.raw_state(), Some(t1n::ON_COIL));

        assert!(t.set_raw_state(&[t1n::ON_COIL], now).is_empty());

        let off = t.set_raw_state(&[t1n::OFF_FEEDBACK], now);
        assert_eq!(values(&off, Channel::OnOff), vec![ChannelValue::OnOff(false)]);
    }

    #[test]
    fn first_report_of_zero_is_delivered() {
        let mut t = Typical::new(TypicalKind::T11, 5, 0);
        assert_eq!(t.raw_state(), None);
        let updates = t.set_raw_state(&[t1n::OFF_COIL], SystemTime::now());
        assert_eq!(values(&updates, Channel::OnOff), vec![ChannelValue::OnOff(false)]);
    }

    #[test]
    fn shutter_percent_and_message() {
        let mut t = Typical::new(TypicalKind::T22, 1, 0);
        let now = SystemTime::now();
        let updates = t.set_raw_state(&[t2n::COIL_CLOSE], now);
        assert_eq!(
            values(&updates, Channel::Rollershutter),
            vec![ChannelValue::Percent(100)]
        );
        assert_eq!(
            values(&updates, Channel::RollershutterState),
            vec![ChannelValue::Text("closing")]
        );

        let updates = t.set_raw_state(&[t2n::NOLIMSWITCH], now);
        assert_eq!(
            values(&updates, Channel::Rollershutter),
            vec![ChannelValue::Percent(50)]
        );
        assert_eq!(
            values(&updates, Channel::RollershutterState),
            vec![ChannelValue::Text("limit switch open")]
        );
    }

    #[test]
    fn shutter_commands() {
        let t = Typical::new(TypicalKind::T22, 1, 0);
        let out = t
            .handle_command(Channel::Rollershutter, Command::Up)
            .unwrap();
        assert_eq!(out.bytes, vec![t2n::OPEN_CMD]);
        let out = t.handle_command(Channel::OnOff, Command::Off).unwrap();
        assert_eq!(out.bytes, vec![t2n::CLOSE_CMD_LOCAL]);
        assert!(matches!(
            t.handle_command(Channel::Setpoint, Command::Setpoint(1.0)),
            Err(CommandError::Unsupported { .. })
        ));
    }

    #[test]
    fn rearm_resets_control() {
        let t = Typical::new(TypicalKind::T42, 3, 1);
        let out = t.handle_command(Channel::RearmAlarm, Command::On).unwrap();
        assert_eq!(out.bytes, vec![t4n::REARM]);
        assert_eq!(
            values(&out.updates, Channel::RearmAlarm),
            vec![ChannelValue::OnOff(false)]
        );
        assert_eq!(t.expected(t4n::REARM), Expected::State(t4n::ANTITHEFT));
    }

    #[test]
    fn alarm_follows_raw_state() {
        let mut t = Typical::new(TypicalKind::T42, 3, 1);
        let now = SystemTime::now();
        let updates = t.set_raw_state(&[t4n::IN_ALARM], now);
        assert_eq!(
            values(&updates, Channel::StatusAlarm),
            vec![ChannelValue::OnOff(true)]
        );
        let updates = t.set_raw_state(&[t4n::ANTITHEFT], now);
        assert_eq!(
            values(&updates, Channel::StatusAlarm),
            vec![ChannelValue::OnOff(false)]
        );
    }

    #[test]
    fn thermostat_setpoint_frame() {
        let t = Typical::new(TypicalKind::T31, 2, 3);
        let out = t
            .handle_command(Channel::Setpoint, Command::Setpoint(21.5))
            .unwrap();
        assert_eq!(out.bytes, vec![t3n::SET_TEMP, 0x00, 0x00, 0x60, 0x4D]);
        assert_eq!(t.expected(t3n::SET_TEMP), Expected::NotApplicable);

        let msg = t.force_message(&out.bytes);
        assert_eq!(
            msg,
            Message::Force {
                node: 2,
                commands: vec![0, 0, 0, t3n::SET_TEMP, 0x00, 0x00, 0x60, 0x4D],
            }
        );
    }

    #[test]
    fn thermostat_state_decodes_temperatures() {
        let mut t = Typical::new(TypicalKind::T31, 2, 0);
        let mode = t3n::SYSTEM_ON | t3n::HEATING_ON | t3n::HEATING_MODE | t3n::FAN_ON_1;
        let raw = [mode, 0x80, 0x4D, 0x60, 0x4D];
        let updates = t.set_raw_state(&raw, SystemTime::now());
        assert_eq!(
            values(&updates, Channel::Temperature),
            vec![ChannelValue::Decimal(22.0)]
        );
        assert_eq!(
            values(&updates, Channel::Setpoint),
            vec![ChannelValue::Decimal(21.5)]
        );
        assert_eq!(values(&updates, Channel::Fire), vec![ChannelValue::OnOff(true)]);
        assert_eq!(values(&updates, Channel::Fan), vec![ChannelValue::Text("low")]);
        assert_eq!(values(&updates, Channel::Mode), vec![ChannelValue::Text("heating")]);
    }

    #[test]
    fn sensors_are_read_only() {
        let mut t = Typical::new(TypicalKind::T52, 4, 0);
        assert_eq!(
            t.handle_command(Channel::Value, Command::On),
            Err(CommandError::ReadOnly(TypicalKind::T52))
        );
        assert_eq!(t.expected(0x01), Expected::NotApplicable);
        let updates = t.set_raw_state(&[0x80, 0x4D, 0xFF], SystemTime::now());
        assert_eq!(values(&updates, Channel::Value), vec![ChannelValue::Decimal(22.0)]);
        assert_eq!(t.raw_bytes(), Some(&[0x80, 0x4D][..]));
    }

    #[test]
    fn refresh_sends_nothing() {
        let t = Typical::new(TypicalKind::T52, 4, 0);
        let out = t.handle_command(Channel::Value, Command::Refresh).unwrap();
        assert!(out.bytes.is_empty());
    }

    #[test]
    fn setpoint_t61_encodes_half_float() {
        let t = Typical::new(TypicalKind::T61, 4, 0);
        let out = t
            .handle_command(Channel::Setpoint, Command::Setpoint(22.0))
            .unwrap();
        assert_eq!(out.bytes, vec![0x80, 0x4D]);
        assert!(matches!(
            Typical::new(TypicalKind::T62, 4, 0)
                .handle_command(Channel::Setpoint, Command::Setpoint(1.0)),
            Err(CommandError::ReadOnly(TypicalKind::T62))
        ));
    }

    #[test]
    fn default_label() {
        assert_eq!(Typical::new(TypicalKind::T11, 5, 0).label(), "T11: node 5, slot 0");
    }
}
