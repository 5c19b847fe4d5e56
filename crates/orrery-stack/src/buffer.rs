//! Per-frame pipeline state
//!
//! A `Buffer` pairs a decoded message with the routing and trust metadata
//! the stages accumulate while it moves through the pipeline.

use orrery_core::Time;
use orrery_wire::{Message, Payload};

/// A frame in flight through the pipeline
#[derive(Clone, Debug)]
pub struct Buffer {
    pub message: Message,

    /// Received signal strength, dBm; 0 for locally originated frames
    pub rssi: i8,
    /// Raw link timestamp captured at start-of-frame on reception
    pub sfd_timestamp: Time,

    /// A preamble frame carrying only a distance hint, not a full payload
    pub is_microframe: bool,
    /// Originated locally and not yet transmitted
    pub is_new: bool,
    /// Set by Security once the frame's authenticity is established
    pub trusted: bool,
    /// Early-listening signal for microframes: the full frame that follows
    /// is worth receiving
    pub relevant: bool,
    /// This node is inside the destination region
    pub destined_to_me: bool,
    /// Destination is away from the sink
    pub downlink: bool,

    /// Distance from this node to the destination center, cm
    pub my_distance: u32,
    /// Distance from the previous hop to the destination center, cm
    pub sender_distance: u32,
    /// Latest useful delivery time, made hop-local by the Router
    pub deadline: Time,
    /// Retransmission backoff scaled by the distance metric
    pub offset: Time,
    /// Sampling period of the carried Interest/Command, microseconds
    pub period: u32,
    /// Distance hint advertised to the next hop
    pub hint: u32,
}

impl Buffer {
    fn with(message: Message, rssi: i8, sfd_timestamp: Time, is_new: bool) -> Self {
        let period = match &message.payload {
            Payload::Interest { period, .. } | Payload::Command { period, .. } => *period,
            _ => 0,
        };
        Buffer {
            message,
            rssi,
            sfd_timestamp,
            is_microframe: false,
            is_new,
            trusted: false,
            relevant: false,
            destined_to_me: false,
            downlink: false,
            my_distance: 0,
            sender_distance: 0,
            deadline: Time::INFINITE,
            offset: Time::ZERO,
            period,
            hint: 0,
        }
    }

    /// A frame received from the link
    pub fn incoming(message: Message, rssi: i8, sfd_timestamp: Time) -> Self {
        Buffer::with(message, rssi, sfd_timestamp, false)
    }

    /// A preamble heard on the link; `hint` is the sender's advertised
    /// distance to the destination
    pub fn microframe(message: Message, hint: u32, rssi: i8, sfd_timestamp: Time) -> Self {
        let mut buf = Buffer::with(message, rssi, sfd_timestamp, false);
        buf.is_microframe = true;
        buf.hint = hint;
        buf
    }

    /// A locally originated frame awaiting marshal
    pub fn outgoing(message: Message) -> Self {
        Buffer::with(message, 0, Time::ZERO, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_core::{DeviceId, MessageType, Mode, Region, Scale, Space, Unit};
    use orrery_wire::Header;

    #[test]
    fn period_is_lifted_from_interests() {
        let header = Header::new(
            MessageType::Interest,
            Mode::default(),
            Unit::si(Unit::I32, 0),
            DeviceId::UNIQUE,
            Scale::CmU32,
        );
        let msg = Message::new(
            header,
            Payload::Interest {
                region: Region::new(Space::ORIGIN, 10, Time::ZERO, Time::INFINITE),
                expiry: Time::INFINITE,
                period: 250_000,
                value: vec![],
            },
        );
        let buf = Buffer::incoming(msg, -40, Time::from_micros(7));
        assert_eq!(buf.period, 250_000);
        assert!(!buf.is_new);
        assert!(!buf.trusted);
    }
}
