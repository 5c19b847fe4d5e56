//! Message type and mode codes
//!
//! The mode byte packs three fields:
//!
//! ```text
//! Bit   7   6   5   4   3   2   1   0
//!     +---+---+---+---+---+---+---+---+
//!     |    subtype    |   op  |  mode |
//!     +---+---+---+---+---+---+---+---+
//! ```

/// Message types, two bits in the header config byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Interest = 0,
    Response = 1,
    Command = 2,
    Control = 3,
}

impl MessageType {
    pub fn from_code(code: u8) -> Option<MessageType> {
        match code {
            0 => Some(MessageType::Interest),
            1 => Some(MessageType::Response),
            2 => Some(MessageType::Command),
            3 => Some(MessageType::Control),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Control message subtypes, high nibble of the mode byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlSubtype {
    DhRequest = 1,
    DhResponse = 2,
    AuthRequest = 3,
    AuthGranted = 4,
    /// Reserved; decoded but never produced
    EsaResponse = 5,
    Report = 6,
    KeepAlive = 7,
    Epoch = 8,
    Model = 9,
}

impl ControlSubtype {
    pub fn from_code(code: u8) -> Option<ControlSubtype> {
        match code {
            1 => Some(ControlSubtype::DhRequest),
            2 => Some(ControlSubtype::DhResponse),
            3 => Some(ControlSubtype::AuthRequest),
            4 => Some(ControlSubtype::AuthGranted),
            5 => Some(ControlSubtype::EsaResponse),
            6 => Some(ControlSubtype::Report),
            7 => Some(ControlSubtype::KeepAlive),
            8 => Some(ControlSubtype::Epoch),
            9 => Some(ControlSubtype::Model),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Mode byte: subtype (4 bits) | operation (2 bits) | mode (2 bits)
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode(pub u8);

impl Mode {
    pub const MODE_MASK: u8 = 0x03;
    pub const OPERATION_MASK: u8 = 0x03 << 2;
    pub const SUBTYPE_MASK: u8 = 0x0f << 4;

    // Interested modes
    pub const SINGLE: u8 = 0;
    pub const ALL: u8 = 1;
    // Interested operations
    pub const ANNOUNCE: u8 = 0 << 2;
    pub const REVOKE: u8 = 1 << 2;

    // Responsive modes
    pub const PRIVATE: u8 = 0;
    pub const ADVERTISED: u8 = 1;
    pub const COMMANDED: u8 = 3;
    // Responsive operations
    pub const ADVERTISE: u8 = 0 << 2;
    pub const CONCEAL: u8 = 1 << 2;
    pub const RESPOND: u8 = 2 << 2;

    pub fn new(subtype: u8, operation: u8, mode: u8) -> Self {
        Mode((subtype << 4) & Self::SUBTYPE_MASK | operation & Self::OPERATION_MASK | mode & Self::MODE_MASK)
    }

    pub fn for_subtype(subtype: ControlSubtype) -> Self {
        Mode((subtype.code() << 4) & Self::SUBTYPE_MASK)
    }

    #[inline]
    pub fn mode(self) -> u8 {
        self.0 & Self::MODE_MASK
    }

    #[inline]
    pub fn operation(self) -> u8 {
        self.0 & Self::OPERATION_MASK
    }

    #[inline]
    pub fn subtype_code(self) -> u8 {
        (self.0 & Self::SUBTYPE_MASK) >> 4
    }

    pub fn subtype(self) -> Option<ControlSubtype> {
        ControlSubtype::from_code(self.subtype_code())
    }
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mode(st={},op={},m={})",
            self.subtype_code(),
            self.operation() >> 2,
            self.mode()
        )
    }
}
