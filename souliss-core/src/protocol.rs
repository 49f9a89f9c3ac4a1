//! Souliss wire protocol: MaCaco function codes, typical constants and message types.

use std::net::Ipv4Addr;

/// Default UDP port of a Souliss gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 230;

/// VNet port byte that marks a MaCaco payload.
pub const VNET_MACACO_PORT: u8 = 0x17;

/// Length of the VNet header in front of every MaCaco frame.
pub const VNET_HEADER_LEN: usize = 7;

/// Offset of the first payload byte (command bytes for FORCE, raw bytes for STATE).
pub const PAYLOAD_OFFSET: usize = 12;

/// MaCaco function codes. Values match the node firmware.
pub mod function {
    pub const PING_REQ: u8 = 0x08;
    pub const PING_RESP: u8 = 0x18;
    pub const SUBSCRIBE_REQ: u8 = 0x21;
    pub const TYP_REQ: u8 = 0x22;
    pub const HEALTHY_REQ: u8 = 0x25;
    pub const DBSTRUCT_REQ: u8 = 0x26;
    pub const POLL_REQ: u8 = 0x27;
    pub const DISCOVER_REQ: u8 = 0x28;
    pub const SUBSCRIBE_RESP: u8 = 0x31;
    pub const TYP_RESP: u8 = 0x32;
    pub const FORCE: u8 = 0x33;
    pub const FORCE_MASSIVE: u8 = 0x34;
    pub const HEALTHY_RESP: u8 = 0x35;
    pub const DBSTRUCT_RESP: u8 = 0x36;
    pub const POLL_RESP: u8 = 0x37;
    pub const DISCOVER_RESP: u8 = 0x38;
    pub const ACTION_MESSAGE: u8 = 0x72;
    pub const ERR_FUNCTION_NOT_SUPPORTED: u8 = 0x83;
    pub const ERR_DATA_OUT_OF_RANGE: u8 = 0x84;
    pub const ERR_SUBSCRIPTION_REFUSED: u8 = 0x85;
}

/// Typical codes as reported by TYP_RESP.
pub mod typical_code {
    pub const EMPTY: u8 = 0x00;
    pub const T11: u8 = 0x11;
    pub const T12: u8 = 0x12;
    pub const T13: u8 = 0x13;
    pub const T14: u8 = 0x14;
    pub const T21: u8 = 0x21;
    pub const T22: u8 = 0x22;
    pub const T31: u8 = 0x31;
    pub const T41: u8 = 0x41;
    pub const T42: u8 = 0x42;
    pub const T51: u8 = 0x51;
    pub const T52: u8 = 0x52;
    pub const T53: u8 = 0x53;
    pub const T54: u8 = 0x54;
    pub const T55: u8 = 0x55;
    pub const T56: u8 = 0x56;
    pub const T57: u8 = 0x57;
    pub const T58: u8 = 0x58;
    pub const T61: u8 = 0x61;
    pub const T62: u8 = 0x62;
    pub const T63: u8 = 0x63;
    pub const T64: u8 = 0x64;
    pub const T65: u8 = 0x65;
    pub const T66: u8 = 0x66;
    pub const T67: u8 = 0x67;
    pub const T68: u8 = 0x68;
    /// Slot occupied by the trailing bytes of a multi-slot typical.
    pub const RELATED: u8 = 0xFF;
}

/// T1n switches and lights.
pub mod t1n {
    pub const TOGGLE_CMD: u8 = 0x01;
    pub const ON_CMD: u8 = 0x02;
    pub const OFF_CMD: u8 = 0x04;
    pub const AUTO_CMD: u8 = 0x08;
    pub const OFF_COIL: u8 = 0x00;
    pub const ON_COIL: u8 = 0x01;
    pub const ON_FEEDBACK: u8 = 0x23;
    pub const OFF_FEEDBACK: u8 = 0x24;
    pub const AUTO_OFF_COIL: u8 = 0xF0;
    pub const AUTO_ON_COIL: u8 = 0xF1;
}

/// T2n roller shutters and gates.
pub mod t2n {
    pub const OPEN_CMD: u8 = 0x02;
    pub const STOP_CMD: u8 = 0x03;
    pub const CLOSE_CMD: u8 = 0x04;
    pub const TOGGLE_CMD: u8 = 0x08;
    pub const OPEN_CMD_LOCAL: u8 = 0x10;
    pub const CLOSE_CMD_LOCAL: u8 = 0x20;
    pub const COIL_CLOSE: u8 = 0x01;
    pub const COIL_OPEN: u8 = 0x02;
    pub const COIL_STOP: u8 = 0x03;
    pub const COIL_OFF: u8 = 0x04;
    pub const TIMER_OFF: u8 = 0x0A;
    pub const STATE_OPEN: u8 = 0x0B;
    pub const STATE_CLOSE: u8 = 0x0C;
    pub const LIMSWITCH_CLOSE: u8 = 0x14;
    pub const LIMSWITCH_OPEN: u8 = 0x16;
    pub const NOLIMSWITCH: u8 = 0x18;
}

/// T31 thermostat.
pub mod t3n {
    pub const AS_MEASURED: u8 = 0x03;
    pub const COOLING: u8 = 0x04;
    pub const HEATING: u8 = 0x05;
    pub const FAN_OFF: u8 = 0x06;
    pub const FAN_LOW: u8 = 0x07;
    pub const FAN_MED: u8 = 0x08;
    pub const FAN_HIGH: u8 = 0x09;
    pub const FAN_AUTO: u8 = 0x0A;
    pub const FAN_MANUAL: u8 = 0x0B;
    pub const SET_TEMP: u8 = 0x0C;
    pub const SHUT_DOWN: u8 = 0x0D;

    /// Bits of the T31 status byte.
    pub const SYSTEM_ON: u8 = 0x01;
    pub const HEATING_ON: u8 = 0x02;
    pub const COOLING_ON: u8 = 0x04;
    pub const FAN_ON_1: u8 = 0x08;
    pub const FAN_ON_2: u8 = 0x10;
    pub const FAN_ON_3: u8 = 0x20;
    pub const HEATING_MODE: u8 = 0x40;
}

/// T4n anti-theft.
pub mod t4n {
    pub const REARM: u8 = 0x03;
    pub const NOT_ARMED: u8 = 0x04;
    pub const ARMED: u8 = 0x05;
    pub const NO_ANTITHEFT: u8 = 0x00;
    pub const ANTITHEFT: u8 = 0x01;
    pub const IN_ALARM: u8 = 0x03;
}

/// Layout of a DBSTRUCT answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStruct {
    pub nodes: u8,
    pub max_nodes: u8,
    pub max_typical_per_node: u8,
    pub max_requests: u8,
}

/// All MaCaco messages the binding sends or understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Apply a command vector to a node, starting at slot 0. Zero bytes leave a slot untouched.
    Force { node: u8, commands: Vec<u8> },
    PingRequest,
    PingResponse,
    /// Subscribe to state changes of nodes `0..nodes`.
    SubscribeRequest { nodes: u8 },
    /// Raw typical bytes starting at `start_node`, `max_typical_per_node` bytes per node.
    /// Answers to both SUBSCRIBE and POLL.
    State { start_node: u8, data: Vec<u8> },
    TypicalRequest { nodes: u8 },
    /// Typical codes starting at `start_node`, same layout as [`Message::State`].
    Typicals { start_node: u8, data: Vec<u8> },
    HealthRequest { nodes: u8 },
    /// One health byte per node starting at `start_node`.
    Health { start_node: u8, data: Vec<u8> },
    DbStructRequest,
    DbStruct(DbStruct),
    DiscoverRequest,
    DiscoverResponse { address: Ipv4Addr },
    /// Publish/subscribe traffic. The topic number travels in the put-in bytes (little endian),
    /// the variant in the start offset.
    ActionMessage {
        topic: u16,
        variant: u8,
        value: Vec<u8>,
    },
    /// Error reply from the gateway (0x83, 0x84 or 0x85).
    Error { code: u8 },
}

impl Message {
    /// MaCaco function code of this message.
    pub fn function(&self) -> u8 {
        match self {
            Message::Force { .. } => function::FORCE,
            Message::PingRequest => function::PING_REQ,
            Message::PingResponse => function::PING_RESP,
            Message::SubscribeRequest { .. } => function::SUBSCRIBE_REQ,
            Message::State { .. } => function::SUBSCRIBE_RESP,
            Message::TypicalRequest { .. } => function::TYP_REQ,
            Message::Typicals { .. } => function::TYP_RESP,
            Message::HealthRequest { .. } => function::HEALTHY_REQ,
            Message::Health { .. } => function::HEALTHY_RESP,
            Message::DbStructRequest => function::DBSTRUCT_REQ,
            Message::DbStruct(_) => function::DBSTRUCT_RESP,
            Message::DiscoverRequest => function::DISCOVER_REQ,
            Message::DiscoverResponse { .. } => function::DISCOVER_RESP,
            Message::ActionMessage { .. } => function::ACTION_MESSAGE,
            Message::Error { code } => *code,
        }
    }
}

/// Render a frame as `HEX: [33 00 ..]` for trace logs.
pub fn macaco_to_string(frame: &[u8]) -> String {
    let mut out = String::with_capacity(7 + frame.len() * 3);
    out.push_str("HEX: [");
    for b in frame {
        out.push_str(&format!("{b:02X} "));
    }
    out.push(']');
    out
}
