//! End-to-end behaviour of a gateway session driven through its host API with injected clocks.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use souliss_core::protocol::{t1n, t2n, t3n, PAYLOAD_OFFSET};
use souliss_core::wire::Addressing;
use souliss_core::{
    encode_frame, Channel, ChannelValue, Command, Discovery, Event, GatewayConfig,
    GatewayRegistry, GatewaySession, LinkStatus, Listener, Message, OutboundAction, StateUpdate,
    TypicalConfig, TypicalKind,
};

const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 77);

struct Harness {
    session: Arc<GatewaySession>,
    listener: Listener,
}

impl Harness {
    fn new(typicals: &[(TypicalKind, u8, u8)]) -> Self {
        let mut config = GatewayConfig::new(GATEWAY.to_string());
        config.typicals = typicals
            .iter()
            .map(|(kind, node, slot)| TypicalConfig {
                kind: *kind,
                node: *node,
                slot: *slot,
                label: None,
                secure_send: None,
            })
            .collect();
        let session = Arc::new(GatewaySession::new(config).unwrap());
        let gateways = Arc::new(GatewayRegistry::new());
        gateways.register(session.clone()).unwrap();
        let listener = Listener::new(gateways, Arc::new(Discovery::new(70, 120)));
        Self { session, listener }
    }

    /// Run one dispatcher tick and return the datagram it sent, if any.
    fn tick(&self, now: Instant) -> Option<Vec<u8>> {
        self.session
            .on_dispatcher_tick(now)
            .into_iter()
            .find_map(|a| match a {
                OutboundAction::Send(t) => Some(t.bytes),
                OutboundAction::Emit(_) => None,
            })
    }

    /// Feed a datagram as if it came from the gateway.
    fn receive(&self, msg: &Message) -> Vec<OutboundAction> {
        let frame = encode_frame(msg, &Addressing::to_gateway(70, 77, 0)).unwrap();
        self.listener.handle(
            SocketAddr::from((GATEWAY, 230)),
            &frame,
            SystemTime::now(),
        )
    }

    /// STATE for `node` with `raw` at `slot`.
    fn report(&self, node: u8, slot: u8, raw: u8) -> Vec<OutboundAction> {
        let mut data = vec![0u8; 24];
        data[usize::from(slot)] = raw;
        self.receive(&Message::State {
            start_node: node,
            data,
        })
    }

    fn queued(&self) -> usize {
        self.session.dispatcher().len()
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn switch_on_with_confirmation() {
    let h = Harness::new(&[(TypicalKind::T11, 5, 0)]);
    h.session.command(5, 0, Channel::OnOff, Command::On).unwrap();

    let t0 = Instant::now();
    let sent = h.tick(t0).expect("frame sent");
    assert_eq!(sent[7], 0x33);
    assert_eq!(sent[10], 5);
    assert_eq!(&sent[PAYLOAD_OFFSET..], &[t1n::ON_CMD]);
    assert_eq!(h.queued(), 1);

    let actions = h.report(5, 0, t1n::ON_COIL);
    assert!(actions.contains(&OutboundAction::Emit(Event::StateUpdated {
        node: 5,
        slot: 0,
        update: StateUpdate {
            channel: Channel::OnOff,
            value: ChannelValue::OnOff(true),
        },
    })));

    assert!(h.tick(t0 + ms(1)).is_none());
    assert_eq!(h.queued(), 0);
    assert!(h.tick(t0 + ms(5000)).is_none());
}

#[test]
fn coalesce_two_commands_same_node() {
    let h = Harness::new(&[(TypicalKind::T11, 5, 0), (TypicalKind::T11, 5, 2)]);
    h.session.command(5, 0, Channel::OnOff, Command::On).unwrap();
    h.session.command(5, 2, Channel::OnOff, Command::Off).unwrap();

    let queue = h.session.dispatcher().snapshot();
    assert_eq!(queue.len(), 1);
    assert_eq!(
        &queue[0].bytes()[PAYLOAD_OFFSET..],
        &[t1n::ON_CMD, 0x00, t1n::OFF_CMD]
    );
}

#[test]
fn longer_frame_supersedes() {
    let h = Harness::new(&[]);
    let gateway = h.session.destination();
    let force = |commands: Vec<u8>| {
        encode_frame(
            &Message::Force { node: 5, commands },
            &Addressing::to_gateway(77, 70, 120),
        )
        .unwrap()
    };
    let dispatcher = h.session.dispatcher();
    dispatcher.enqueue(gateway, force(vec![0x02, 0x01]));
    dispatcher.enqueue(gateway, force(vec![0x00, 0x00, 0x09, 0x00]));

    let queue = dispatcher.snapshot();
    assert_eq!(queue.len(), 1);
    assert_eq!(&queue[0].bytes()[PAYLOAD_OFFSET..], &[0x02, 0x01, 0x09, 0x00]);
}

#[test]
fn retransmit_on_timeout() {
    let h = Harness::new(&[(TypicalKind::T22, 1, 0)]);
    let timings = h.session.dispatcher().timings();
    h.session
        .command(1, 0, Channel::Rollershutter, Command::Up)
        .unwrap();

    let t0 = Instant::now();
    let first = h.tick(t0).expect("first transmission");
    assert_eq!(&first[PAYLOAD_OFFSET..], &[t2n::OPEN_CMD]);

    let requeue_at = t0 + timings.requeue_timeout + ms(1);
    assert!(h.tick(requeue_at).is_none());
    assert!(!h.session.dispatcher().snapshot()[0].is_sent());

    let again = h.tick(requeue_at + ms(1)).expect("retransmission");
    assert_eq!(again, first);

    assert!(h.tick(t0 + timings.remove_timeout + ms(1)).is_none());
    assert_eq!(h.queued(), 0);
}

#[test]
fn unsupported_secure_send_is_sent_once() {
    let h = Harness::new(&[(TypicalKind::T31, 2, 0)]);
    h.session
        .command(2, 0, Channel::Mode, Command::Heating)
        .unwrap();

    let t0 = Instant::now();
    let sent = h.tick(t0).expect("frame sent");
    assert_eq!(&sent[PAYLOAD_OFFSET..], &[t3n::HEATING]);
    assert_eq!(h.queued(), 0);
    assert!(h.tick(t0 + ms(10_000)).is_none());
}

#[test]
fn setpoint_frames_clear_trailing_bytes() {
    let h = Harness::new(&[(TypicalKind::T31, 2, 3), (TypicalKind::T61, 4, 0)]);
    let refresh = h.session.dispatcher().timings().refresh_interval;
    h.session
        .command(2, 3, Channel::Setpoint, Command::Setpoint(21.5))
        .unwrap();
    h.session
        .command(4, 0, Channel::Setpoint, Command::Setpoint(21.5))
        .unwrap();
    assert_eq!(h.queued(), 2);

    let t0 = Instant::now();
    let thermostat = h.tick(t0).expect("thermostat frame sent");
    assert_eq!(
        &thermostat[PAYLOAD_OFFSET..],
        &[0, 0, 0, t3n::SET_TEMP, 0x00, 0x00, 0x60, 0x4D]
    );
    assert_eq!(h.queued(), 1);

    let setpoint = h.tick(t0 + refresh).expect("setpoint frame sent");
    assert_eq!(setpoint[10], 4);
    assert_eq!(&setpoint[PAYLOAD_OFFSET..], &[0x60, 0x4D]);
    assert_eq!(h.queued(), 0);

    for k in 2..20 {
        assert!(h.tick(t0 + refresh * k).is_none());
    }
}

#[test]
fn gateway_goes_offline_and_back() {
    let h = Harness::new(&[(TypicalKind::T11, 5, 0)]);
    h.receive(&Message::PingResponse);
    assert_eq!(h.session.status(), LinkStatus::Online);

    for _ in 0..3 {
        h.session.on_ping_due();
        assert_eq!(h.session.status(), LinkStatus::Online);
    }
    h.session.on_ping_due();
    assert_eq!(h.session.status(), LinkStatus::Offline);

    let actions = h.receive(&Message::PingResponse);
    assert!(actions.contains(&OutboundAction::Emit(Event::GatewayStatus {
        gateway: 77,
        status: LinkStatus::Online,
    })));
    assert_eq!(h.session.status(), LinkStatus::Online);
    assert_eq!(h.session.missed_pings(), 0);
}
