//! X25519 key agreement
//!
//! The sink initiates agreement with each sensor during the handshake. Both
//! sides combine their static secret with the other's public key; the shared
//! point becomes the peer's master secret, from which every OTP and MAC is
//! derived.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};

/// A public key as carried in DH_REQUEST / DH_RESPONSE
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Long-lived per-peer shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret(pub [u8; 32]);

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never log key material
        write!(f, "MasterSecret(..)")
    }
}

/// A node's X25519 key pair
pub struct KeyPair {
    secret: StaticSecret,
    public: DalekPublic,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS entropy source
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = DalekPublic::from(&secret);
        KeyPair { secret, public }
    }

    #[inline]
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Derive the master secret shared with the holder of `their_public`
    pub fn agree(&self, their_public: &[u8; PUBLIC_KEY_SIZE]) -> MasterSecret {
        let theirs = DalekPublic::from(*their_public);
        MasterSecret(self.secret.diffie_hellman(&theirs).to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_secret() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_eq!(a.agree(&b.public_bytes()), b.agree(&a.public_bytes()));
    }

    #[test]
    fn distinct_peers_derive_distinct_secrets() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let c = KeyPair::generate();
        assert_ne!(a.agree(&b.public_bytes()), a.agree(&c.public_bytes()));
    }
}
