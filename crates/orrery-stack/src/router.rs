//! Router stage
//!
//! Greedy geographic forwarding: a frame is retransmitted only by nodes
//! strictly closer to the destination than the previous hop, with a backoff
//! scaled by the remaining distance so the best-placed forwarder usually
//! wins the race. Destinations are regions derived from the message itself;
//! there are no routing tables.

use std::sync::Arc;

use orrery_core::{ControlSubtype, MessageType, Region, Space, Spacetime, Time};
use orrery_wire::{ControlBody, Message, Payload};
use rand::Rng;
use tracing::{debug, warn};

use crate::{handshake_deadline, Buffer, Clock, Outgoing, OutgoingSender, Positioner, Stage, SINK};

/// Nominal radio range in centimeters; frames from farther away are not
/// forwarded to avoid range asymmetry
pub const RADIO_RANGE: u32 = 8_000;

const FORWARDER: bool = true;
const DROP_EXPIRED: bool = true;

/// Destination region of a message, derived from its type
pub fn destination(msg: &Message, here: Space, now: Time) -> Region {
    let origin = msg.header.origin;
    match &msg.payload {
        Payload::Interest { region, .. } => *region,
        Payload::Response { expiry, .. } => {
            // a hostile frame may carry a negative expiry
            let t1 = origin.time.saturating_add(*expiry).max(origin.time);
            Region::new(SINK, 0, origin.time, t1)
        }
        Payload::Command { radius, t1, .. } => {
            Region::new(origin.space, *radius, origin.time, *t1)
        }
        Payload::Control { radius, t1, body } => match body {
            ControlBody::DhRequest { destination, .. } => Region::new(
                destination.center,
                destination.radius,
                origin.time,
                handshake_deadline(origin.time),
            ),
            ControlBody::AuthGranted { destination, .. } => Region::new(
                destination.center,
                destination.radius,
                origin.time,
                handshake_deadline(origin.time),
            ),
            ControlBody::DhResponse { .. } | ControlBody::AuthRequest { .. } => {
                Region::new(SINK, 0, origin.time, handshake_deadline(origin.time))
            }
            ControlBody::Report => Region::new(SINK, 0, origin.time, Time::INFINITE),
            ControlBody::KeepAlive => {
                // a fake destination nobody ever occupies, so keep-alives
                // flood one hop and die
                let mut rng = rand::thread_rng();
                loop {
                    let fake = Space::new(
                        here.x + rng.gen_range(0..RADIO_RANGE as i32 / 3),
                        here.y + rng.gen_range(0..RADIO_RANGE as i32 / 3),
                        here.z + rng.gen_range(0..RADIO_RANGE as i32 / 3),
                    );
                    if fake != here {
                        return Region::new(fake, 0, Time::ZERO, Time::INFINITE);
                    }
                }
            }
            ControlBody::Epoch { .. } | ControlBody::Model { .. } | ControlBody::EsaResponse => {
                Region::new(origin.space, *radius, origin.time, *t1)
            }
        },
    }
}

/// Distance routing metric applied to the retransmission backoff
fn offset(buf: &mut Buffer) {
    let mut offset = buf.offset.as_micros();
    if buf.is_new {
        offset *= 1 + (buf.my_distance % RADIO_RANGE) as i64;
    } else {
        // forward() guarantees my_distance < sender_distance
        offset *= (RADIO_RANGE as i64 + buf.my_distance as i64) - buf.sender_distance as i64;
    }
    buf.offset = Time(offset / RADIO_RANGE as i64);
}

/// The Router stage
pub struct Router {
    positioner: Arc<Positioner>,
    clock: Arc<Clock>,
    outgoing: OutgoingSender,
}

impl Router {
    pub fn new(positioner: Arc<Positioner>, clock: Arc<Clock>, outgoing: OutgoingSender) -> Self {
        Router {
            positioner,
            clock,
            outgoing,
        }
    }

    /// Whether this node must retransmit the frame
    fn forward(&self, buf: &mut Buffer, here: Space, now: Time) -> bool {
        if !FORWARDER {
            return false;
        }

        if buf.my_distance >= buf.sender_distance {
            if !buf.destined_to_me {
                // coming from a node closer to the destination
                return false;
            }
            if buf.message.kind() == MessageType::Interest {
                // interests are not forwarded in downlink mode
                return false;
            }
        }

        let hop = here.distance(&buf.message.header.last_hop.space);
        if hop > RADIO_RANGE {
            // radio range asymmetry
            return false;
        }

        let expiry = buf.deadline;
        if expiry.is_infinite() {
            return true;
        }
        if expiry <= now {
            return !DROP_EXPIRED;
        }

        let hops = (buf.my_distance as i64 + RADIO_RANGE as i64 - 1) / RADIO_RANGE as i64;
        let best_case_delivery = Time(hops * buf.period as i64);
        let relative_expiry = expiry - now;
        if best_case_delivery > relative_expiry {
            return false;
        }

        // make the deadline hop-local for scheduling
        buf.deadline = buf.deadline - best_case_delivery;
        true
    }
}

impl Stage for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn on_receive(&self, buf: &mut Buffer) {
        if buf.is_microframe {
            // a preamble is worth hearing out when we would make progress
            if !buf.relevant {
                buf.relevant = buf.my_distance < buf.sender_distance;
            }
            return;
        }

        // keep-alives are single-hop by construction
        if buf.message.subtype() == Some(ControlSubtype::KeepAlive) {
            buf.destined_to_me = false;
            return;
        }

        let here = self.positioner.here();
        let now = self.clock.now();
        if buf.destined_to_me {
            debug!("frame is for this node");
        }

        if self.forward(buf, here, now) {
            if buf.destined_to_me {
                return;
            }
            debug!("forwarding frame");

            let mut fwd = buf.clone();
            fwd.is_new = false;
            offset(&mut fwd);

            fwd.message.header.last_hop = Spacetime::new(here, now);
            fwd.sender_distance = fwd.my_distance;
            fwd.message.header.location_confidence = self.positioner.confidence();
            fwd.message.header.time_request = !self.clock.synchronized();
            fwd.hint = fwd.my_distance;

            if self.outgoing.send(Outgoing::Raw(fwd)).is_err() {
                warn!("outgoing queue closed, frame not forwarded");
            }
        }
    }

    fn on_marshal(&self, buf: &mut Buffer) {
        let here = self.positioner.here();
        let now = self.clock.now();
        let dst = destination(&buf.message, here, now);
        buf.downlink = dst.center != SINK;
        buf.destined_to_me =
            buf.message.header.origin.space != here && dst.contains(&here, now);
        buf.hint = buf.my_distance;
        offset(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_core::{DeviceId, Mode, Scale, Unit};
    use orrery_wire::Header;

    fn response(origin_space: Space, expiry: Time) -> Message {
        let mut header = Header::new(
            MessageType::Response,
            Mode::default(),
            Unit::si(Unit::I32, 1),
            DeviceId(3),
            Scale::CmU32,
        );
        header.origin = Spacetime::new(origin_space, Time::from_micros(100));
        header.last_hop = header.origin;
        Message::new(
            header,
            Payload::Response {
                expiry,
                value: vec![1, 2, 3, 4],
                auth: None,
            },
        )
    }

    fn router_at(here: Space) -> (Router, tokio::sync::mpsc::UnboundedReceiver<Outgoing>) {
        struct Still;
        impl crate::LinkTransport for Still {
            fn send(&self, _: &[u8]) -> orrery_core::OrreryResult<()> {
                Ok(())
            }
            fn configuration(&self) -> crate::LinkConfiguration {
                crate::LinkConfiguration {
                    timer_accuracy_ppm: 0,
                    timer_frequency_hz: 0,
                }
            }
            fn statistics(&self) -> crate::LinkStatistics {
                crate::LinkStatistics {
                    time_stamp: Time::from_micros(1_000),
                }
            }
        }
        let clock = Arc::new(Clock::new(Arc::new(Still), true));
        let positioner = Arc::new(Positioner::with_position(here, 100));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Router::new(positioner, clock, tx), rx)
    }

    #[test]
    fn closer_node_forwards_unexpired_frames() {
        let here = Space::new(50, 0, 0);
        let (router, _rx) = router_at(here);
        let mut buf = Buffer::incoming(response(Space::new(80, 0, 0), Time::INFINITE), -40, Time::ZERO);
        buf.my_distance = 50;
        buf.sender_distance = 80;
        buf.deadline = Time::INFINITE;
        assert!(router.forward(&mut buf, here, Time::from_micros(1_000)));
    }

    #[test]
    fn farther_node_does_not_forward() {
        let here = Space::new(9_000, 0, 0);
        let (router, _rx) = router_at(here);
        let mut buf = Buffer::incoming(response(Space::new(50, 0, 0), Time::INFINITE), -40, Time::ZERO);
        buf.my_distance = 9_000;
        buf.sender_distance = 50;
        assert!(!router.forward(&mut buf, here, Time::from_micros(1_000)));
    }

    #[test]
    fn expired_frames_are_dropped() {
        let here = Space::new(50, 0, 0);
        let (router, _rx) = router_at(here);
        let mut buf = Buffer::incoming(response(Space::new(80, 0, 0), Time::ZERO), -40, Time::ZERO);
        buf.my_distance = 50;
        buf.sender_distance = 80;
        buf.deadline = Time::from_micros(500);
        assert!(!router.forward(&mut buf, here, Time::from_micros(1_000)));
    }

    #[test]
    fn forwarding_emits_a_raw_frame_with_updated_last_hop() {
        let here = Space::new(50, 0, 0);
        let (router, mut rx) = router_at(here);
        let mut buf = Buffer::incoming(response(Space::new(4_000, 0, 0), Time::INFINITE), -40, Time::ZERO);
        buf.my_distance = 50;
        buf.sender_distance = 4_000;
        buf.deadline = Time::INFINITE;

        router.on_receive(&mut buf);
        assert!(!buf.destined_to_me); // origin is not here and sink isn't either

        match rx.try_recv() {
            Ok(Outgoing::Raw(fwd)) => {
                assert_eq!(fwd.message.header.last_hop.space, here);
                assert!(!fwd.is_new);
                assert_eq!(fwd.sender_distance, fwd.my_distance);
            }
            other => panic!("expected a forwarded frame, got {:?}", other),
        }
    }

    #[test]
    fn keep_alives_are_never_forwarded_nor_delivered() {
        let here = Space::new(50, 0, 0);
        let (router, mut rx) = router_at(here);
        let mut header = Header::new(
            MessageType::Control,
            Mode::for_subtype(ControlSubtype::KeepAlive),
            Unit::default(),
            DeviceId(4),
            Scale::CmU32,
        );
        header.origin = Spacetime::new(Space::new(100, 0, 0), Time::ZERO);
        let msg = Message::new(
            header,
            Payload::Control {
                radius: 0,
                t1: Time::ZERO,
                body: ControlBody::KeepAlive,
            },
        );
        let mut buf = Buffer::incoming(msg, -40, Time::ZERO);
        buf.destined_to_me = true;
        router.on_receive(&mut buf);
        assert!(!buf.destined_to_me);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn response_destination_is_the_sink() {
        let msg = response(Space::new(700, 0, 0), Time::from_micros(400));
        let dst = destination(&msg, Space::new(1, 1, 1), Time::from_micros(150));
        assert_eq!(dst.center, SINK);
        assert_eq!(dst.radius, 0);
        assert_eq!(dst.t0, Time::from_micros(100));
        assert_eq!(dst.t1, Time::from_micros(500));
    }

    #[test]
    fn negative_expiry_clamps_the_response_interval() {
        let msg = response(Space::new(700, 0, 0), Time::from_micros(-400));
        let dst = destination(&msg, Space::new(1, 1, 1), Time::from_micros(150));
        assert_eq!(dst.t0, Time::from_micros(100));
        assert_eq!(dst.t1, dst.t0);
    }

    #[test]
    fn keep_alive_destination_is_never_here() {
        let here = Space::new(10, 10, 10);
        let mut header = Header::new(
            MessageType::Control,
            Mode::for_subtype(ControlSubtype::KeepAlive),
            Unit::default(),
            DeviceId(4),
            Scale::CmU32,
        );
        header.origin = Spacetime::new(here, Time::ZERO);
        let msg = Message::new(
            header,
            Payload::Control {
                radius: 0,
                t1: Time::ZERO,
                body: ControlBody::KeepAlive,
            },
        );
        for _ in 0..32 {
            let dst = destination(&msg, here, Time::ZERO);
            assert_ne!(dst.center, here);
            assert_eq!(dst.radius, 0);
        }
    }
}
