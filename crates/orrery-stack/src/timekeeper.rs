//! Timekeeper stage and the protocol clock
//!
//! Protocol time is the link's raw timestamp plus an additive skew the
//! Timekeeper maintains. A node is synchronized while `next_sync` lies in
//! the future; the sink pins `next_sync` at infinity and is the time
//! reference for everyone else. Unsynchronized nodes broadcast keep-alives
//! with the time-request flag set; any synchronized node closer to the sink
//! answers with a frame whose last-hop timestamp lets the requester compute
//! its skew.

use std::sync::Arc;

use orrery_core::{ControlSubtype, DeviceId, Scale, Time, Unit};
use orrery_wire::{ControlBody, Header, Message, Payload};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    destination, Buffer, LinkConfiguration, LinkTransport, Outgoing, OutgoingSender, Positioner,
    Stage, SINK,
};

/// Largest tolerated clock error before a resync is forced
pub const MAX_DRIFT: Time = Time(500_000);

/// Delay between the link timestamping a frame and the timestamp the
/// sender placed in the last-hop field; zero for the UDP link
pub const NIC_TIMER_INTERRUPT_DELAY: Time = Time(0);

struct ClockState {
    skew: Time,
    next_sync: Time,
    reference: Time,
}

/// The node's protocol clock, shared by every stage
pub struct Clock {
    transport: Arc<dyn LinkTransport>,
    state: Mutex<ClockState>,
}

impl Clock {
    /// Sinks are born synchronized and never resync
    pub fn new(transport: Arc<dyn LinkTransport>, is_sink: bool) -> Self {
        Clock {
            transport,
            state: Mutex::new(ClockState {
                skew: Time::ZERO,
                next_sync: if is_sink { Time::INFINITE } else { Time::ZERO },
                reference: Time::ZERO,
            }),
        }
    }

    /// Current protocol time
    pub fn now(&self) -> Time {
        let ts = self.transport.statistics().time_stamp;
        ts + self.state.lock().skew
    }

    #[inline]
    pub fn synchronized(&self) -> bool {
        // copy next_sync out before now() takes the same lock
        let next_sync = self.state.lock().next_sync;
        next_sync > self.now()
    }

    /// Apply a freshly measured skew and schedule the next resync
    pub fn resync(&self, skew: Time, valid_for: Time) {
        let mut state = self.state.lock();
        state.skew = skew;
        let now = self.transport.statistics().time_stamp + skew;
        state.next_sync = now.saturating_add(valid_for);
        debug!(skew = skew.as_micros(), now = now.as_micros(), "clock adjusted");
    }

    /// Absolute epoch reference distributed by the sink
    pub fn reference(&self) -> Time {
        self.state.lock().reference
    }

    pub fn set_reference(&self, reference: Time) {
        self.state.lock().reference = reference;
    }

    pub fn absolute(&self, t: Time) -> Time {
        self.reference().saturating_add(t)
    }
}

/// Interval between forced resyncs, derived from the link timer's rated
/// inaccuracy: the time it takes the local clock to drift by [`MAX_DRIFT`]
pub fn sync_period(config: &LinkConfiguration) -> Time {
    let missed_per_sec =
        config.timer_accuracy_ppm as i64 * config.timer_frequency_hz as i64 / 1_000_000;
    if missed_per_sec <= 0 {
        return Time::INFINITE;
    }
    Time(MAX_DRIFT.as_micros() / missed_per_sec * 1_000_000)
}

/// The Timekeeper stage
pub struct Timekeeper {
    clock: Arc<Clock>,
    positioner: Arc<Positioner>,
    outgoing: OutgoingSender,
    config: LinkConfiguration,
    is_sink: bool,
    scale: Scale,
    device: DeviceId,
}

impl Timekeeper {
    pub fn new(
        clock: Arc<Clock>,
        positioner: Arc<Positioner>,
        outgoing: OutgoingSender,
        config: LinkConfiguration,
        is_sink: bool,
        scale: Scale,
        device: DeviceId,
    ) -> Self {
        Timekeeper {
            clock,
            positioner,
            outgoing,
            config,
            is_sink,
            scale,
            device,
        }
    }

    pub fn sync_period(&self) -> Time {
        sync_period(&self.config)
    }

    /// Broadcast a keep-alive with the time-request flag set
    pub fn keep_alive(&self) {
        trace!("keep alive");
        let mut header = Header::new(
            orrery_core::MessageType::Control,
            orrery_core::Mode::for_subtype(ControlSubtype::KeepAlive),
            Unit::default(),
            self.device,
            self.scale,
        );
        header.time_request = true;
        let msg = Message::new(
            header,
            Payload::Control {
                radius: 0,
                t1: Time::ZERO,
                body: ControlBody::KeepAlive,
            },
        );
        if self.outgoing.send(Outgoing::Marshal(Buffer::outgoing(msg))).is_err() {
            warn!("outgoing queue closed, keep alive dropped");
        }
    }

    fn closer_to_sink(&self, buf: &Buffer) -> bool {
        if buf.downlink {
            let here = self.positioner.here();
            here.distance(&SINK) < buf.message.header.last_hop.space.distance(&SINK)
        } else {
            buf.my_distance < buf.sender_distance
        }
    }
}

impl Stage for Timekeeper {
    fn name(&self) -> &'static str {
        "timekeeper"
    }

    fn on_receive(&self, buf: &mut Buffer) {
        if buf.is_microframe {
            if !self.clock.synchronized() {
                buf.relevant = true;
            }
            return;
        }

        let here = self.positioner.here();
        let now = self.clock.now();
        let header = buf.message.header;
        buf.deadline = destination(&buf.message, here, now).t1;

        let closer = self.closer_to_sink(buf);
        if self.clock.synchronized() {
            if header.time_request && closer {
                debug!("responding to time request");
                self.keep_alive();
            }
        } else if !closer {
            // the previous hop is better synchronized than we are
            let stamped = header.last_hop.time + NIC_TIMER_INTERRUPT_DELAY;
            let skew = stamped - buf.sfd_timestamp;
            self.clock.resync(skew, Time(self.sync_period().as_micros() / 2));
        }

        // A sink-issued Epoch rebases the node's absolute references
        if buf.destined_to_me && !self.is_sink {
            if let Payload::Control {
                body: ControlBody::Epoch {
                    reference,
                    coordinates,
                },
                ..
            } = &buf.message.payload
            {
                debug!(reference = reference.as_micros(), "epoch adopted");
                self.clock.set_reference(*reference);
                self.positioner.set_reference(*coordinates);
            }
        }
    }

    fn on_marshal(&self, buf: &mut Buffer) {
        let now = self.clock.now();
        buf.message.header.origin.time = now;
        buf.message.header.time_request = !self.clock.synchronized();
        if buf.message.subtype() == Some(ControlSubtype::KeepAlive) {
            buf.deadline = now.saturating_add(self.sync_period());
        } else {
            // deadline must be computed after the origin time is set
            buf.deadline = destination(&buf.message, self.positioner.here(), now).t1;
        }
    }
}
