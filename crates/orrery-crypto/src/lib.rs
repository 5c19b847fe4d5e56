//! ORRERY Crypto - key agreement and time-windowed authentication
//!
//! Two concerns live here:
//!
//! - X25519 key agreement between a sensor and the sink, producing the
//!   per-peer master secret ([`dh`]).
//! - The HKDF-SHA256 constructions derived from that secret: one-time
//!   passwords for the handshake and per-message MACs, both keyed by a
//!   coarse time window so that loosely synchronized peers still verify
//!   ([`auth`]).
//!
//! Nothing here touches the wire or the clock; callers pass in the current
//! protocol time and the codecs carry the resulting byte arrays.

pub mod auth;
pub mod dh;

pub use auth::*;
pub use dh::*;
