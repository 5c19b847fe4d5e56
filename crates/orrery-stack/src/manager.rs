//! Manager stage
//!
//! Extension point for network management policy (predictive model
//! distribution, reconfiguration). Today it only vouches for Model frames;
//! everything else passes through untouched.

use orrery_core::ControlSubtype;
use tracing::trace;

use crate::{Buffer, Stage};

#[derive(Default)]
pub struct Manager;

impl Manager {
    pub fn new() -> Self {
        Manager
    }
}

impl Stage for Manager {
    fn name(&self) -> &'static str {
        "manager"
    }

    fn on_receive(&self, buf: &mut Buffer) {
        if buf.is_microframe {
            return;
        }
        if buf.message.subtype() == Some(ControlSubtype::Model) {
            buf.trusted = true;
        }
        trace!(kind = ?buf.message.kind(), "manager pass");
    }

    fn on_marshal(&self, buf: &mut Buffer) {
        trace!(kind = ?buf.message.kind(), "manager marshal pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_core::{DeviceId, MessageType, Mode, Scale, Time, Unit};
    use orrery_wire::{ControlBody, Header, Message, Payload};

    #[test]
    fn model_frames_are_vouched_for() {
        let header = Header::new(
            MessageType::Control,
            Mode::for_subtype(ControlSubtype::Model),
            Unit::default(),
            DeviceId(1),
            Scale::CmU32,
        );
        let msg = Message::new(
            header,
            Payload::Control {
                radius: 0,
                t1: Time::ZERO,
                body: ControlBody::Model { data: vec![1, 2] },
            },
        );
        let mut buf = Buffer::incoming(msg, -40, Time::ZERO);
        Manager::new().on_receive(&mut buf);
        assert!(buf.trusted);
    }
}
