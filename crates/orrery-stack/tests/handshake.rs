//! End-to-end trust bootstrap between a sink and one sensor, driving the
//! two Security stages directly and shuttling their handshake messages by
//! hand.

use std::sync::Arc;

use orrery_core::{
    DeviceId, MessageType, Mode, NodeId, OrreryResult, Region, Scale, Space, Spacetime, Time, Unit,
};
use orrery_stack::{
    Buffer, Clock, LinkConfiguration, LinkStatistics, LinkTransport, Outgoing, Security, Stage,
    SINK,
};
use orrery_wire::{Header, Message, Payload};

struct FixedLink(Time);

impl LinkTransport for FixedLink {
    fn send(&self, _frame: &[u8]) -> OrreryResult<()> {
        Ok(())
    }

    fn configuration(&self) -> LinkConfiguration {
        LinkConfiguration {
            timer_accuracy_ppm: 1_000,
            timer_frequency_hz: 1_000_000,
        }
    }

    fn statistics(&self) -> LinkStatistics {
        LinkStatistics { time_stamp: self.0 }
    }
}

const SENSOR_POS: Space = Space {
    x: 500,
    y: 0,
    z: 0,
};

fn node(
    id: NodeId,
    is_sink: bool,
    clock: &Arc<Clock>,
) -> (Security, tokio::sync::mpsc::UnboundedReceiver<Outgoing>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let device = DeviceId(if is_sink { 0 } else { 1 });
    (
        Security::new(id, is_sink, clock.clone(), tx, Scale::CmU32, device),
        rx,
    )
}

/// Pull the next queued handshake message, stamp the origin the way the
/// marshal pass would, and hand it to the receiving stage.
fn deliver(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outgoing>,
    from: Space,
    now: Time,
    to: &Security,
) {
    let mut buf = match rx.try_recv() {
        Ok(Outgoing::Marshal(buf)) => buf,
        other => panic!("expected a queued handshake message, got {:?}", other),
    };
    buf.message.header.origin = Spacetime::new(from, now);
    buf.message.header.last_hop = buf.message.header.origin;

    let mut incoming = Buffer::incoming(buf.message, -40, now);
    incoming.destined_to_me = true;
    to.on_receive(&mut incoming);
}

#[test]
fn four_step_handshake_establishes_a_shared_secret() {
    let now = Time::from_secs(100);
    let clock = Arc::new(Clock::new(Arc::new(FixedLink(now)), true));

    let sensor_id = NodeId::from_uuid([1, 2, 3, 4, 5, 6, 7, 8]);
    let (sink, mut sink_out) = node(NodeId::from_uuid([9; 8]), true, &clock);
    let (sensor, mut sensor_out) = node(sensor_id, false, &clock);

    // deploy-time provisioning: the sink knows the sensor's identity and
    // region, the sensor expects the handshake to come from the sink
    sink.add_peer(
        sensor_id,
        Region::new(SENSOR_POS, 100, Time::ZERO, Time::INFINITE),
    );
    sensor.add_peer(sensor_id, Region::new(SINK, 0, Time::ZERO, Time::INFINITE));

    // 1. sink solicits key agreement
    sink.key_manager_tick();
    deliver(&mut sink_out, SINK, clock.now(), &sensor);

    // 2-3. sensor answers with its public key and proves its credential
    deliver(&mut sensor_out, SENSOR_POS, clock.now(), &sink);
    deliver(&mut sensor_out, SENSOR_POS, clock.now(), &sink);
    assert_eq!(sink.trusted_peer_count(), 1);

    // 4. sink grants authentication
    deliver(&mut sink_out, SINK, clock.now(), &sensor);
    assert_eq!(sensor.trusted_peer_count(), 1);

    let at_sink = sink.master_secret_of(&sensor_id).expect("sink secret");
    let at_sensor = sensor.master_secret_of(&sensor_id).expect("sensor secret");
    assert_eq!(at_sink, at_sensor);
}

#[test]
fn authenticated_responses_verify_at_the_sink() {
    let now = Time::from_secs(100);
    let clock = Arc::new(Clock::new(Arc::new(FixedLink(now)), true));

    let sensor_id = NodeId::from_uuid([1, 2, 3, 4, 5, 6, 7, 8]);
    let (sink, mut sink_out) = node(NodeId::from_uuid([9; 8]), true, &clock);
    let (sensor, mut sensor_out) = node(sensor_id, false, &clock);
    sink.add_peer(
        sensor_id,
        Region::new(SENSOR_POS, 100, Time::ZERO, Time::INFINITE),
    );
    sensor.add_peer(sensor_id, Region::new(SINK, 0, Time::ZERO, Time::INFINITE));

    sink.key_manager_tick();
    deliver(&mut sink_out, SINK, clock.now(), &sensor);
    deliver(&mut sensor_out, SENSOR_POS, clock.now(), &sink);
    deliver(&mut sensor_out, SENSOR_POS, clock.now(), &sink);
    deliver(&mut sink_out, SINK, clock.now(), &sensor);

    // sensor produces a reading and lets its Security stage authenticate it
    let mut header = Header::new(
        MessageType::Response,
        Mode::new(0, Mode::RESPOND, Mode::ADVERTISED),
        Unit::si(Unit::I32, 7),
        DeviceId(1),
        Scale::CmU32,
    );
    header.origin = Spacetime::new(SENSOR_POS, clock.now());
    header.last_hop = header.origin;
    let msg = Message::new(
        header,
        Payload::Response {
            expiry: Time::from_secs(10),
            value: vec![0x2a, 0, 0, 0],
            auth: None,
        },
    );
    let mut outbound = Buffer::outgoing(msg);
    sensor.on_marshal(&mut outbound);
    assert!(outbound.trusted);
    match &outbound.message.payload {
        Payload::Response { value, auth, .. } => {
            assert_eq!(value.len(), 16);
            assert!(auth.is_some());
        }
        other => panic!("unexpected payload {:?}", other),
    }

    // and the sink verifies it
    let mut inbound = Buffer::incoming(outbound.message.clone(), -40, clock.now());
    inbound.destined_to_me = true;
    sink.on_receive(&mut inbound);
    assert!(inbound.trusted);

    // a tampered value is rejected
    let mut tampered = outbound.message;
    if let Payload::Response { value, .. } = &mut tampered.payload {
        value[0] ^= 0xff;
    }
    let mut inbound = Buffer::incoming(tampered, -40, clock.now());
    inbound.destined_to_me = true;
    sink.on_receive(&mut inbound);
    assert!(!inbound.trusted);
}
