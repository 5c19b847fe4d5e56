//! Shared message header
//!
//! Layout (sizes in bits unless noted):
//!
//! ```text
//! Bit  7 6  5 4 3 2 1 0
//!     +---+--+---+-----+----+----+----+--- ~ ---+----+-----+--- ~ ---+
//!     |scl|tr|typ| ver |mode|misc| lc | origin  |unit| dev | lasthop |
//!     +----------------+----+----+----+--- ~ ---+----+-----+--- ~ ---+
//!          8             8    8    8   st(scl)    4B   8B    st(scl)
//! ```
//!
//! Origin and last-hop are space-times: three coordinate components at the
//! configured scale, the scale's padding, then an 8-byte time.

use orrery_core::{
    DeviceId, MessageType, Mode, OrreryError, OrreryResult, Scale, Spacetime, Unit,
};

use crate::codec::{Reader, Writer};

/// Protocol version carried in the low three bits of the config byte
pub const VERSION: u8 = 0;

/// Message header, present at offset 0 of every frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub kind: MessageType,
    pub time_request: bool,
    pub scale: Scale,
    pub mode: Mode,
    /// Uncertainty for Interests/Responses; opaque elsewhere
    pub misc: u8,
    /// Location confidence percentage, 0-100
    pub location_confidence: u8,
    pub origin: Spacetime,
    pub unit: Unit,
    pub device: DeviceId,
    pub last_hop: Spacetime,
}

impl Header {
    pub fn new(kind: MessageType, mode: Mode, unit: Unit, device: DeviceId, scale: Scale) -> Self {
        Header {
            version: VERSION,
            kind,
            time_request: false,
            scale,
            mode,
            misc: 0,
            location_confidence: 0,
            origin: Spacetime::default(),
            unit,
            device,
            last_hop: Spacetime::default(),
        }
    }

    /// Encoded size at this header's scale
    pub fn encoded_len(&self) -> usize {
        let st = 3 * self.scale.width() + self.scale.padding() + 8;
        4 + st + 4 + 8 + st
    }

    pub(crate) fn encode_into(&self, w: &mut Writer<'_>) -> OrreryResult<()> {
        let config = (self.scale.code() & 0x03) << 6
            | (self.time_request as u8) << 5
            | (self.kind.code() & 0x03) << 3
            | self.version & 0x07;
        w.u8(config)?;
        w.u8(self.mode.0)?;
        w.u8(self.misc)?;
        w.u8(self.location_confidence)?;
        w.space(&self.origin.space, self.scale)?;
        w.time(self.origin.time)?;
        w.u32(self.unit.raw())?;
        w.u64(self.device.0)?;
        w.space(&self.last_hop.space, self.scale)?;
        w.time(self.last_hop.time)
    }

    pub(crate) fn decode_from(r: &mut Reader<'_>) -> OrreryResult<Header> {
        let config = r.u8()?;
        let scale = Scale::from_code((config >> 6) & 0x03)
            .ok_or_else(|| OrreryError::MalformedFrame("bad scale".into()))?;
        let time_request = (config >> 5) & 0x01 != 0;
        let kind = MessageType::from_code((config >> 3) & 0x03)
            .ok_or(OrreryError::UnknownMessageType((config >> 3) & 0x03))?;
        let version = config & 0x07;

        let mode = Mode(r.u8()?);
        let misc = r.u8()?;
        let location_confidence = r.u8()?;

        let origin_space = r.space(scale)?;
        let origin_time = r.time()?;
        let unit = Unit::new(r.u32()?);
        let device = DeviceId(r.u64()?);
        let last_hop_space = r.space(scale)?;
        let last_hop_time = r.time()?;

        Ok(Header {
            version,
            kind,
            time_request,
            scale,
            mode,
            misc,
            location_confidence,
            origin: Spacetime::new(origin_space, origin_time),
            unit,
            device,
            last_hop: Spacetime::new(last_hop_space, last_hop_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_core::{Space, Time};

    fn sample(scale: Scale) -> Header {
        let mut h = Header::new(
            MessageType::Response,
            Mode::new(0, Mode::RESPOND, Mode::ADVERTISED),
            Unit::si(Unit::I32, 0x1234),
            DeviceId(42),
            scale,
        );
        h.time_request = true;
        h.location_confidence = 87;
        h.misc = 3;
        h.origin = Spacetime::new(Space::new(100, -200, 300).quantize(scale), Time::from_micros(99));
        h.last_hop = Spacetime::new(Space::new(-50, 0, 150).quantize(scale), Time::from_micros(101));
        h
    }

    #[test]
    fn header_roundtrip_all_scales() {
        for scale in [Scale::CmX50U8, Scale::CmU16, Scale::CmX25U16, Scale::CmU32] {
            let h = sample(scale);
            let mut buf = [0u8; 128];
            let mut w = Writer::new(&mut buf);
            h.encode_into(&mut w).unwrap();
            assert_eq!(w.position(), h.encoded_len());

            let mut r = Reader::new(&buf[..h.encoded_len()]);
            assert_eq!(Header::decode_from(&mut r).unwrap(), h);
        }
    }

    #[test]
    fn config_byte_bit_positions() {
        let h = sample(Scale::CmU32);
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        h.encode_into(&mut w).unwrap();

        // scale=3 (bits 7-6), tr=1 (bit 5), type=1 (bits 4-3), version=0
        assert_eq!(buf[0], 0b11_1_01_000);
    }
}
