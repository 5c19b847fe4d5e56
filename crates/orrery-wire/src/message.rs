//! Message layouts
//!
//! Every message starts with the shared [`Header`]; the tail depends on the
//! type (and, for Control, on the subtype in the mode byte).

use orrery_core::{
    ControlSubtype, MessageType, OrreryError, OrreryResult, Region, Space, Time,
};

use crate::codec::{Reader, Writer};
use crate::{Header, MTU};

/// Size of an authentication tag / OTP token on the wire
pub const AUTH_SIZE: usize = 16;
/// Size of a Diffie-Hellman public key on the wire
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Authenticated Response payloads are padded to this size before the MAC
pub const PACKED_VALUE_SIZE: usize = 16;

/// Message tail, by type
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Interest {
        region: Region,
        expiry: Time,
        /// Sampling period in microseconds; 0 means event-driven
        period: u32,
        value: Vec<u8>,
    },
    Response {
        expiry: Time,
        value: Vec<u8>,
        /// Time-windowed MAC appended by the Security stage on marshal
        auth: Option<[u8; AUTH_SIZE]>,
    },
    Command {
        radius: u32,
        t1: Time,
        expiry: Time,
        period: u32,
        value: Vec<u8>,
    },
    Control {
        radius: u32,
        t1: Time,
        body: ControlBody,
    },
}

/// Control message tails, by subtype
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlBody {
    DhRequest {
        destination: Region,
        public_key: [u8; PUBLIC_KEY_SIZE],
    },
    DhResponse {
        public_key: [u8; PUBLIC_KEY_SIZE],
    },
    AuthRequest {
        auth: [u8; AUTH_SIZE],
        otp: [u8; AUTH_SIZE],
    },
    AuthGranted {
        destination: Region,
        auth: [u8; AUTH_SIZE],
    },
    /// Reserved subtype; carried opaque
    EsaResponse,
    Report,
    KeepAlive,
    Epoch {
        reference: Time,
        coordinates: Space,
    },
    /// Predictive-model distribution; extension point, carried opaque
    Model { data: Vec<u8> },
}

impl ControlBody {
    pub fn subtype(&self) -> ControlSubtype {
        match self {
            ControlBody::DhRequest { .. } => ControlSubtype::DhRequest,
            ControlBody::DhResponse { .. } => ControlSubtype::DhResponse,
            ControlBody::AuthRequest { .. } => ControlSubtype::AuthRequest,
            ControlBody::AuthGranted { .. } => ControlSubtype::AuthGranted,
            ControlBody::EsaResponse => ControlSubtype::EsaResponse,
            ControlBody::Report => ControlSubtype::Report,
            ControlBody::KeepAlive => ControlSubtype::KeepAlive,
            ControlBody::Epoch { .. } => ControlSubtype::Epoch,
            ControlBody::Model { .. } => ControlSubtype::Model,
        }
    }
}

/// A complete decoded message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    /// Build a message, forcing the header's type bits (and, for Control,
    /// the mode subtype nibble) to match the payload.
    pub fn new(mut header: Header, payload: Payload) -> Self {
        header.kind = payload.kind();
        if let Payload::Control { body, .. } = &payload {
            let mode = header.mode.0 & !orrery_core::Mode::SUBTYPE_MASK;
            header.mode =
                orrery_core::Mode(mode | (body.subtype().code() << 4));
        }
        Message { header, payload }
    }

    pub fn kind(&self) -> MessageType {
        self.header.kind
    }

    pub fn subtype(&self) -> Option<ControlSubtype> {
        match &self.payload {
            Payload::Control { body, .. } => Some(body.subtype()),
            _ => None,
        }
    }

    /// Encode into `buf`, returning the number of bytes written
    pub fn encode(&self, buf: &mut [u8]) -> OrreryResult<usize> {
        let limit = buf.len().min(MTU);
        let mut w = Writer::new(&mut buf[..limit]);
        self.header.encode_into(&mut w)?;
        let scale = self.header.scale;

        match &self.payload {
            Payload::Interest {
                region,
                expiry,
                period,
                value,
            } => {
                w.region(region, scale)?;
                w.time(*expiry)?;
                w.u32(*period)?;
                w.bytes(value)?;
            }
            Payload::Response {
                expiry,
                value,
                auth,
            } => {
                w.time(*expiry)?;
                w.bytes(value)?;
                if let Some(mac) = auth {
                    w.bytes(mac)?;
                }
            }
            Payload::Command {
                radius,
                t1,
                expiry,
                period,
                value,
            } => {
                w.radius(*radius, scale)?;
                w.time(*t1)?;
                w.time(*expiry)?;
                w.u32(*period)?;
                w.bytes(value)?;
            }
            Payload::Control { radius, t1, body } => {
                w.radius(*radius, scale)?;
                w.time(*t1)?;
                match body {
                    ControlBody::DhRequest {
                        destination,
                        public_key,
                    } => {
                        w.region(destination, scale)?;
                        w.bytes(public_key)?;
                    }
                    ControlBody::DhResponse { public_key } => {
                        w.bytes(public_key)?;
                    }
                    ControlBody::AuthRequest { auth, otp } => {
                        w.bytes(auth)?;
                        w.bytes(otp)?;
                    }
                    ControlBody::AuthGranted { destination, auth } => {
                        w.region(destination, scale)?;
                        w.bytes(auth)?;
                    }
                    ControlBody::EsaResponse
                    | ControlBody::Report
                    | ControlBody::KeepAlive => {}
                    ControlBody::Epoch {
                        reference,
                        coordinates,
                    } => {
                        w.time(*reference)?;
                        // global coordinates are always full precision
                        w.space(coordinates, orrery_core::Scale::CmU32)?;
                    }
                    ControlBody::Model { data } => {
                        w.bytes(data)?;
                    }
                }
            }
        }

        Ok(w.position())
    }

    /// Decode a frame. Unknown types or subtypes are reported, never
    /// panicked on; callers drop such frames.
    pub fn decode(buf: &[u8]) -> OrreryResult<Message> {
        let mut r = Reader::new(buf);
        let header = Header::decode_from(&mut r)?;
        let scale = header.scale;

        let payload = match header.kind {
            MessageType::Interest => {
                let region = r.region(scale)?;
                let expiry = r.time()?;
                let period = r.u32()?;
                let value = r.rest().to_vec();
                Payload::Interest {
                    region,
                    expiry,
                    period,
                    value,
                }
            }
            MessageType::Response => {
                let expiry = r.time()?;
                let rest = r.rest();
                // The unit dictates the inline value length; an
                // authenticated Response carries that value padded to the
                // packed size, then the MAC.
                let packed = header.unit.value_size().max(PACKED_VALUE_SIZE);
                let (value, auth) = if rest.len() == packed + AUTH_SIZE {
                    let mut mac = [0u8; AUTH_SIZE];
                    mac.copy_from_slice(&rest[packed..]);
                    (rest[..packed].to_vec(), Some(mac))
                } else {
                    (rest.to_vec(), None)
                };
                Payload::Response {
                    expiry,
                    value,
                    auth,
                }
            }
            MessageType::Command => {
                let radius = r.radius(scale)?;
                let t1 = r.time()?;
                let expiry = r.time()?;
                let period = r.u32()?;
                let value = r.rest().to_vec();
                Payload::Command {
                    radius,
                    t1,
                    expiry,
                    period,
                    value,
                }
            }
            MessageType::Control => {
                let radius = r.radius(scale)?;
                let t1 = r.time()?;
                let subtype = header
                    .mode
                    .subtype()
                    .ok_or(OrreryError::UnknownSubtype(header.mode.subtype_code()))?;
                let body = match subtype {
                    ControlSubtype::DhRequest => ControlBody::DhRequest {
                        destination: r.region(scale)?,
                        public_key: r.array()?,
                    },
                    ControlSubtype::DhResponse => ControlBody::DhResponse {
                        public_key: r.array()?,
                    },
                    ControlSubtype::AuthRequest => ControlBody::AuthRequest {
                        auth: r.array()?,
                        otp: r.array()?,
                    },
                    ControlSubtype::AuthGranted => ControlBody::AuthGranted {
                        destination: r.region(scale)?,
                        auth: r.array()?,
                    },
                    ControlSubtype::EsaResponse => ControlBody::EsaResponse,
                    ControlSubtype::Report => ControlBody::Report,
                    ControlSubtype::KeepAlive => ControlBody::KeepAlive,
                    ControlSubtype::Epoch => ControlBody::Epoch {
                        reference: r.time()?,
                        coordinates: r.space(orrery_core::Scale::CmU32)?,
                    },
                    ControlSubtype::Model => ControlBody::Model {
                        data: r.rest().to_vec(),
                    },
                };
                Payload::Control { radius, t1, body }
            }
        };

        Ok(Message { header, payload })
    }
}

impl Payload {
    pub fn kind(&self) -> MessageType {
        match self {
            Payload::Interest { .. } => MessageType::Interest,
            Payload::Response { .. } => MessageType::Response,
            Payload::Command { .. } => MessageType::Command,
            Payload::Control { .. } => MessageType::Control,
        }
    }

    /// Expiry time, where the type defines one
    pub fn expiry(&self) -> Option<Time> {
        match self {
            Payload::Interest { expiry, .. }
            | Payload::Response { expiry, .. }
            | Payload::Command { expiry, .. } => Some(*expiry),
            Payload::Control { .. } => None,
        }
    }
}
