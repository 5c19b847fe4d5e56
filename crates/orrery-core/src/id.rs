//! Identity types

use std::fmt;

/// Device enumerator, differentiating two endpoints at the same
/// (unit, x, y, z, t)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(pub u64);

impl DeviceId {
    pub const UNIQUE: DeviceId = DeviceId(0);

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        DeviceId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dev({:x})", self.0)
    }
}

/// Node identity used by the security bootstrap. Built from the hardware
/// UUID, zero-padded to the key size.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub [u8; 16]);

impl NodeId {
    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        NodeId(bytes)
    }

    /// Build from an 8-byte hardware UUID, zero-padding the tail
    pub fn from_uuid(uuid: [u8; 8]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&uuid);
        NodeId(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(")?;
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_zero_padded() {
        let id = NodeId::from_uuid([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&id.0[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&id.0[8..], &[0u8; 8]);
    }
}
