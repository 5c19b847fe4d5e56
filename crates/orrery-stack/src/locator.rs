//! Locator stage
//!
//! Wraps the HeCoPS engine: every received frame is a positioning sample
//! (the sender's claimed last-hop coordinates, its confidence and the RSSI),
//! and every outgoing frame is stamped with this node's current estimate.

use std::sync::Arc;

use orrery_core::{GlobalSpace, Space};
use parking_lot::Mutex;
use tracing::trace;

use crate::hecops::{HeCoPS, CONFIDENCE_THRESHOLD};
use crate::{destination, Buffer, Clock, Stage, Timekeeper, SINK};

struct PositionerState {
    engine: HeCoPS,
    reference: GlobalSpace,
}

/// The node's position estimate, shared by every stage
pub struct Positioner {
    state: Mutex<PositionerState>,
}

impl Positioner {
    /// A node that still has to localize itself
    pub fn unlocated() -> Self {
        Positioner::with_position(Space::ORIGIN, 0)
    }

    /// A node deployed at known coordinates (the sink, or surveyed nodes)
    pub fn with_position(here: Space, confidence: u8) -> Self {
        Positioner {
            state: Mutex::new(PositionerState {
                engine: HeCoPS::new(here, confidence),
                reference: GlobalSpace::ORIGIN,
            }),
        }
    }

    pub fn here(&self) -> Space {
        self.state.lock().engine.here()
    }

    pub fn confidence(&self) -> u8 {
        self.state.lock().engine.confidence()
    }

    pub fn synchronized(&self) -> bool {
        self.state.lock().engine.synchronized()
    }

    pub fn learn(&self, coordinates: Space, confidence: u8, rssi: i8) {
        self.state.lock().engine.learn(coordinates, confidence, rssi);
    }

    /// Global coordinates of the local origin, distributed via Epoch
    pub fn reference(&self) -> GlobalSpace {
        self.state.lock().reference
    }

    pub fn set_reference(&self, reference: GlobalSpace) {
        self.state.lock().reference = reference;
    }

    /// Local-to-global projection
    pub fn absolute(&self, s: &Space) -> GlobalSpace {
        self.reference().translate(s)
    }
}

/// The Locator stage
pub struct Locator {
    positioner: Arc<Positioner>,
    clock: Arc<Clock>,
    timekeeper: Arc<Timekeeper>,
}

impl Locator {
    pub fn new(positioner: Arc<Positioner>, clock: Arc<Clock>, timekeeper: Arc<Timekeeper>) -> Self {
        Locator {
            positioner,
            clock,
            timekeeper,
        }
    }
}

impl Stage for Locator {
    fn name(&self) -> &'static str {
        "locator"
    }

    fn on_receive(&self, buf: &mut Buffer) {
        if buf.is_microframe {
            // the preamble only advertises the sender's distance; keep
            // listening for the full frame while we are still localizing
            buf.sender_distance = buf.hint;
            if !self.positioner.synchronized() {
                buf.relevant = true;
            } else if !buf.downlink {
                // uplink progress is measured against the sink
                buf.my_distance = self.positioner.here().distance(&SINK);
            }
            return;
        }

        let here = self.positioner.here();
        let now = self.clock.now();
        let header = buf.message.header;
        let dst = destination(&buf.message, here, now).center;

        buf.sender_distance = header.last_hop.space.distance(&dst);
        self.positioner
            .learn(header.last_hop.space, header.location_confidence, buf.rssi);

        // downlink would fit the Router better, but the Timekeeper needs it
        buf.downlink = dst != SINK;
        buf.my_distance = here.distance(&dst);

        // help neighbors that are still localizing
        if self.positioner.synchronized() && header.location_confidence < CONFIDENCE_THRESHOLD {
            trace!("neighbor is low on location confidence");
            self.timekeeper.keep_alive();
        }
    }

    fn on_marshal(&self, buf: &mut Buffer) {
        let here = self.positioner.here();
        let now = self.clock.now();
        let dst = destination(&buf.message, here, now).center;

        buf.my_distance = here.distance(&dst);
        if buf.is_new {
            buf.sender_distance = buf.my_distance;
        }
        buf.downlink = dst != SINK;

        let header = &mut buf.message.header;
        header.location_confidence = self.positioner.confidence();
        header.origin.space = here;
        header.origin.time = now;
        header.last_hop.space = here;
        header.last_hop.time = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LinkConfiguration, LinkStatistics, LinkTransport};
    use orrery_core::{ControlSubtype, DeviceId, MessageType, Mode, OrreryResult, Scale, Time, Unit};
    use orrery_wire::{ControlBody, Header, Message, Payload};

    struct Still;

    impl LinkTransport for Still {
        fn send(&self, _: &[u8]) -> OrreryResult<()> {
            Ok(())
        }
        fn configuration(&self) -> LinkConfiguration {
            LinkConfiguration {
                timer_accuracy_ppm: 0,
                timer_frequency_hz: 0,
            }
        }
        fn statistics(&self) -> LinkStatistics {
            LinkStatistics {
                time_stamp: Time::ZERO,
            }
        }
    }

    fn locator_for(positioner: Arc<Positioner>) -> Locator {
        let clock = Arc::new(Clock::new(Arc::new(Still), true));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let timekeeper = Arc::new(Timekeeper::new(
            clock.clone(),
            positioner.clone(),
            tx,
            Still.configuration(),
            true,
            Scale::CmU32,
            DeviceId(0),
        ));
        Locator::new(positioner, clock, timekeeper)
    }

    fn keep_alive() -> Message {
        let header = Header::new(
            MessageType::Control,
            Mode::for_subtype(ControlSubtype::KeepAlive),
            Unit::default(),
            DeviceId(2),
            Scale::CmU32,
        );
        Message::new(
            header,
            Payload::Control {
                radius: 0,
                t1: Time::ZERO,
                body: ControlBody::KeepAlive,
            },
        )
    }

    #[test]
    fn microframes_propagate_the_hint_into_sender_distance() {
        let locator = locator_for(Arc::new(Positioner::unlocated()));
        let mut buf = crate::Buffer::microframe(keep_alive(), 750, -40, Time::ZERO);
        locator.on_receive(&mut buf);
        assert_eq!(buf.sender_distance, 750);
        // an unlocated node keeps listening for the full frame
        assert!(buf.relevant);
    }

    #[test]
    fn localized_nodes_ignore_microframe_relevance() {
        let here = Space::new(5, 5, 0);
        let locator = locator_for(Arc::new(Positioner::with_position(here, 100)));
        let mut buf = crate::Buffer::microframe(keep_alive(), 300, -40, Time::ZERO);
        locator.on_receive(&mut buf);
        assert_eq!(buf.sender_distance, 300);
        assert!(!buf.relevant);
        // uplink preambles still refresh the distance to the sink
        assert_eq!(buf.my_distance, here.distance(&SINK));
    }

    #[test]
    fn absolute_projection_translates_by_the_reference() {
        let p = Positioner::with_position(Space::new(10, 0, 0), 100);
        p.set_reference(GlobalSpace::new(1_000, 2_000, 3_000));
        assert_eq!(
            p.absolute(&Space::new(1, 2, 3)),
            GlobalSpace::new(1_001, 2_002, 3_003)
        );
    }

    #[test]
    fn positioner_tracks_engine_state() {
        let p = Positioner::unlocated();
        assert!(!p.synchronized());
        p.learn(Space::new(0, 0, 0), 90, -100);
        p.learn(Space::new(50, 0, 0), 90, -100);
        p.learn(Space::new(0, 50, 0), 90, -100);
        assert_eq!(p.confidence(), 72);
    }

    #[test]
    fn sink_positioner_is_synchronized_from_the_start() {
        let p = Positioner::with_position(SINK, 100);
        assert!(p.synchronized());
        assert_eq!(p.here(), SINK);
    }
}
