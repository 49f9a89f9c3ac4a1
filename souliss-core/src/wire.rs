//! Framing: 7-byte VNet header + MaCaco frame (function, 2 put-in bytes, start offset,
//! number-of, payload).

use std::net::Ipv4Addr;

use crate::protocol::{
    function, DbStruct, Message, PAYLOAD_OFFSET, VNET_HEADER_LEN, VNET_MACACO_PORT,
};

const MAX_FRAME_LEN: usize = u8::MAX as usize;
const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - PAYLOAD_OFFSET;

const FUNCTION_OFFSET: usize = VNET_HEADER_LEN;
const PUT_IN_OFFSET: usize = 8;
const START_OFFSET: usize = 10;
const NUMBER_OF_OFFSET: usize = 11;

/// VNet addressing for an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    /// Last octet of the gateway address; low byte of the VNet destination.
    pub gateway_id: u8,
    /// Address the VNet broadcast (0xFFFF) instead of the gateway.
    pub broadcast: bool,
    /// Source node index the binding presents itself with.
    pub node_index: u8,
    /// Source user index the binding presents itself with.
    pub user_index: u8,
}

impl Addressing {
    pub fn to_gateway(gateway_id: u8, node_index: u8, user_index: u8) -> Self {
        Self {
            gateway_id,
            broadcast: false,
            node_index,
            user_index,
        }
    }

    pub fn broadcast(node_index: u8, user_index: u8) -> Self {
        Self {
            gateway_id: 0xFF,
            broadcast: true,
            node_index,
            user_index,
        }
    }

    fn destination(&self) -> [u8; 2] {
        if self.broadcast {
            [0xFF, 0xFF]
        } else {
            [self.gateway_id, 0x00]
        }
    }
}

/// Encode a message into a single datagram: VNet header followed by the MaCaco frame.
pub fn encode_frame(msg: &Message, addressing: &Addressing) -> Result<Vec<u8>, FrameEncodeError> {
    let (put_in, start, payload): ([u8; 2], u8, Vec<u8>) = match msg {
        Message::Force { node, commands } => ([0; 2], *node, commands.clone()),
        Message::State { start_node, data }
        | Message::Typicals { start_node, data }
        | Message::Health { start_node, data } => ([0; 2], *start_node, data.clone()),
        Message::DbStruct(s) => (
            [0; 2],
            0,
            vec![s.nodes, s.max_nodes, s.max_typical_per_node, s.max_requests],
        ),
        Message::DiscoverResponse { address } => ([0; 2], 0, address.octets().to_vec()),
        Message::ActionMessage {
            topic,
            variant,
            value,
        } => (topic.to_le_bytes(), *variant, value.clone()),
        _ => ([0; 2], 0, Vec::new()),
    };
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameEncodeError::TooLarge(payload.len()));
    }
    let number_of = match msg {
        Message::SubscribeRequest { nodes }
        | Message::TypicalRequest { nodes }
        | Message::HealthRequest { nodes } => *nodes,
        _ => payload.len() as u8,
    };

    let total = PAYLOAD_OFFSET + payload.len();
    let destination = addressing.destination();
    let mut out = Vec::with_capacity(total);
    out.push(total as u8);
    out.push((total - 1) as u8);
    out.push(VNET_MACACO_PORT);
    out.extend_from_slice(&destination);
    out.push(addressing.node_index);
    out.push(addressing.user_index);
    out.push(msg.function());
    out.extend_from_slice(&put_in);
    out.push(start);
    out.push(number_of);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a message into a datagram.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameEncodeError {
    #[error("payload of {0} bytes does not fit a VNet frame")]
    TooLarge(usize),
}

/// Decode one datagram into a message.
pub fn decode_frame(bytes: &[u8]) -> Result<Message, FrameDecodeError> {
    if bytes.len() < PAYLOAD_OFFSET {
        return Err(FrameDecodeError::TooShort(bytes.len()));
    }
    let declared = bytes[0] as usize;
    if declared != bytes.len() || bytes[1] as usize + 1 != bytes.len() {
        return Err(FrameDecodeError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    if bytes[2] != VNET_MACACO_PORT {
        return Err(FrameDecodeError::NotMacaco(bytes[2]));
    }

    let code = bytes[FUNCTION_OFFSET];
    let start = bytes[START_OFFSET];
    let number_of = bytes[NUMBER_OF_OFFSET];
    let payload = &bytes[PAYLOAD_OFFSET..];
    let counted = || {
        payload
            .get(..number_of as usize)
            .map(<[u8]>::to_vec)
            .ok_or(FrameDecodeError::Truncated(code))
    };

    let msg = match code {
        function::FORCE => Message::Force {
            node: start,
            commands: counted()?,
        },
        function::PING_REQ => Message::PingRequest,
        function::PING_RESP => Message::PingResponse,
        function::SUBSCRIBE_REQ => Message::SubscribeRequest { nodes: number_of },
        function::SUBSCRIBE_RESP | function::POLL_RESP => Message::State {
            start_node: start,
            data: counted()?,
        },
        function::TYP_REQ => Message::TypicalRequest { nodes: number_of },
        function::TYP_RESP => Message::Typicals {
            start_node: start,
            data: counted()?,
        },
        function::HEALTHY_REQ => Message::HealthRequest { nodes: number_of },
        function::HEALTHY_RESP => Message::Health {
            start_node: start,
            data: counted()?,
        },
        function::DBSTRUCT_REQ => Message::DbStructRequest,
        function::DBSTRUCT_RESP => match payload {
            [nodes, max_nodes, max_typical_per_node, max_requests, ..] => {
                Message::DbStruct(DbStruct {
                    nodes: *nodes,
                    max_nodes: *max_nodes,
                    max_typical_per_node: *max_typical_per_node,
                    max_requests: *max_requests,
                })
            }
            _ => return Err(FrameDecodeError::Truncated(code)),
        },
        function::DISCOVER_REQ => Message::DiscoverRequest,
        function::DISCOVER_RESP => match payload {
            [a, b, c, d, ..] => Message::DiscoverResponse {
                address: Ipv4Addr::new(*a, *b, *c, *d),
            },
            _ => return Err(FrameDecodeError::Truncated(code)),
        },
        function::ACTION_MESSAGE => Message::ActionMessage {
            topic: u16::from_le_bytes([bytes[PUT_IN_OFFSET], bytes[PUT_IN_OFFSET + 1]]),
            variant: start,
            value: counted()?,
        },
        function::ERR_FUNCTION_NOT_SUPPORTED
        | function::ERR_DATA_OUT_OF_RANGE
        | function::ERR_SUBSCRIPTION_REFUSED => Message::Error { code },
        other => return Err(FrameDecodeError::UnknownFunction(other)),
    };
    Ok(msg)
}

/// Error decoding a datagram. Always a protocol violation; the datagram is dropped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("datagram of {0} bytes is shorter than a MaCaco header")]
    TooShort(usize),
    #[error("header declares {declared} bytes, datagram has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("VNet port 0x{0:02X} is not MaCaco")]
    NotMacaco(u8),
    #[error("payload of function 0x{0:02X} is truncated")]
    Truncated(u8),
    #[error("unknown MaCaco function 0x{0:02X}")]
    UnknownFunction(u8),
}

/// Node addressed by a raw FORCE datagram; `None` for every other function.
pub fn force_node(frame: &[u8]) -> Option<u8> {
    match (frame.get(FUNCTION_OFFSET), frame.get(START_OFFSET)) {
        (Some(&function::FORCE), Some(&node)) => Some(node),
        _ => None,
    }
}
