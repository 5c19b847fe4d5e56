//! Time-windowed authentication
//!
//! All authentication material is derived with HKDF-SHA256 from the
//! per-peer master secret and the current coarse time window, so tokens
//! and MACs verify across peers whose clocks agree to within one window.
//! Verifiers always retry the adjacent windows to absorb boundary skew.

use hkdf::Hkdf;
use orrery_core::{NodeId, Time};
use sha2::Sha256;

use crate::MasterSecret;

/// Authentication tag / OTP size
pub const AUTH_SIZE: usize = 16;
/// Authenticated payloads are padded to this size before the MAC
pub const PACKED_VALUE_SIZE: usize = 16;
/// Width of the MAC/OTP time window
pub const TIME_WINDOW: Time = Time(30_000_000);
/// Lifetime of a handshake in progress; peers that have not completed
/// authentication within this bound are forgotten
pub const KEY_EXPIRY: Time = Time(60_000_000);

/// Map a protocol time onto its coarse window index
#[inline]
pub fn time_window(t: Time) -> i64 {
    t.as_micros().div_euclid(TIME_WINDOW.as_micros())
}

fn derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; AUTH_SIZE] {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = [0u8; AUTH_SIZE];
    // output length is a fraction of the hash size, expand cannot fail
    hk.expand(info, &mut out)
        .unwrap_or_else(|_| unreachable!("HKDF output within bounds"));
    out
}

/// A node's static authentication credential, derived from its identity.
/// The sink learns it out of band (deploy-time provisioning) and matches
/// it against AUTH_REQUEST messages.
pub fn auth_tag(id: &NodeId) -> [u8; AUTH_SIZE] {
    derive(id.as_bytes(), &[], b"orrery.auth")
}

/// One-time password for the window containing `now`
pub fn otp(master: &MasterSecret, id: &NodeId, now: Time) -> [u8; AUTH_SIZE] {
    otp_at(master, id, time_window(now))
}

fn otp_at(master: &MasterSecret, id: &NodeId, window: i64) -> [u8; AUTH_SIZE] {
    derive(&master.0, &window.to_le_bytes(), id.as_bytes())
}

/// Verify an OTP against the window containing `now` and its neighbors
pub fn verify_otp(
    master: &MasterSecret,
    id: &NodeId,
    candidate: &[u8; AUTH_SIZE],
    now: Time,
) -> bool {
    let w = time_window(now);
    (w - 1..=w + 1).any(|win| &otp_at(master, id, win) == candidate)
}

/// MAC over an already-padded value for the window containing `now`,
/// bound to the authenticated peer's identity
pub fn mac(master: &MasterSecret, id: &NodeId, value: &[u8], now: Time) -> [u8; AUTH_SIZE] {
    mac_at(master, id, value, time_window(now))
}

fn mac_at(master: &MasterSecret, id: &NodeId, value: &[u8], window: i64) -> [u8; AUTH_SIZE] {
    let mut info = Vec::with_capacity(id.as_bytes().len() + value.len());
    info.extend_from_slice(id.as_bytes());
    info.extend_from_slice(value);
    derive(&master.0, &window.to_le_bytes(), &info)
}

/// Pad a response value to the packed size and MAC it
pub fn pack(
    master: &MasterSecret,
    id: &NodeId,
    value: &[u8],
    now: Time,
) -> (Vec<u8>, [u8; AUTH_SIZE]) {
    let mut padded = value.to_vec();
    if padded.len() < PACKED_VALUE_SIZE {
        padded.resize(PACKED_VALUE_SIZE, 0);
    }
    let tag = mac(master, id, &padded, now);
    (padded, tag)
}

/// Verify a packed value's MAC, retrying the adjacent windows
pub fn unpack(
    master: &MasterSecret,
    id: &NodeId,
    value: &[u8],
    tag: &[u8; AUTH_SIZE],
    now: Time,
) -> bool {
    let w = time_window(now);
    (w - 1..=w + 1).any(|win| &mac_at(master, id, value, win) == tag)
}

/// XOR `data` with `pad`; used to conceal the credential inside
/// AUTH_GRANTED under the current OTP
pub fn xor_pad(data: &mut [u8; AUTH_SIZE], pad: &[u8; AUTH_SIZE]) {
    for (d, p) in data.iter_mut().zip(pad) {
        *d ^= *p;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterSecret {
        MasterSecret([0x42; 32])
    }

    #[test]
    fn otp_verifies_in_adjacent_windows() {
        let id = NodeId::from_uuid([1, 2, 3, 4, 5, 6, 7, 8]);
        let t = Time::from_secs(100);
        let token = otp(&master(), &id, t);

        assert!(verify_otp(&master(), &id, &token, t));
        assert!(verify_otp(&master(), &id, &token, t + TIME_WINDOW));
        assert!(verify_otp(&master(), &id, &token, t.saturating_sub(TIME_WINDOW)));
        assert!(!verify_otp(
            &master(),
            &id,
            &token,
            t + TIME_WINDOW + TIME_WINDOW
        ));
    }

    #[test]
    fn otp_is_bound_to_identity_and_secret() {
        let a = NodeId::from_uuid([1; 8]);
        let b = NodeId::from_uuid([2; 8]);
        let t = Time::from_secs(100);

        assert_ne!(otp(&master(), &a, t), otp(&master(), &b, t));
        assert!(!verify_otp(
            &MasterSecret([0x43; 32]),
            &a,
            &otp(&master(), &a, t),
            t
        ));
    }

    #[test]
    fn pack_pads_short_values() {
        let id = NodeId::from_uuid([1; 8]);
        let (padded, tag) = pack(&master(), &id, &[1, 2, 3, 4], Time::from_secs(50));
        assert_eq!(padded.len(), PACKED_VALUE_SIZE);
        assert_eq!(&padded[..4], &[1, 2, 3, 4]);
        assert!(unpack(&master(), &id, &padded, &tag, Time::from_secs(50)));
    }

    #[test]
    fn unpack_rejects_tampered_value() {
        let id = NodeId::from_uuid([1; 8]);
        let t = Time::from_secs(50);
        let (mut padded, tag) = pack(&master(), &id, &[9; 8], t);
        padded[0] ^= 1;
        assert!(!unpack(&master(), &id, &padded, &tag, t));
    }

    #[test]
    fn mac_is_bound_to_identity() {
        let a = NodeId::from_uuid([1; 8]);
        let b = NodeId::from_uuid([2; 8]);
        let t = Time::from_secs(50);
        let (padded, tag) = pack(&master(), &a, &[1, 2, 3, 4], t);
        assert!(unpack(&master(), &a, &padded, &tag, t));
        assert!(!unpack(&master(), &b, &padded, &tag, t));
    }

    #[test]
    fn unpack_accepts_one_window_of_skew_only() {
        let id = NodeId::from_uuid([1; 8]);
        let t = Time::from_secs(90);
        let (padded, tag) = pack(&master(), &id, &[7; 16], t);
        assert!(unpack(&master(), &id, &padded, &tag, t + TIME_WINDOW));
        assert!(!unpack(
            &master(),
            &id,
            &padded,
            &tag,
            t + Time::from_secs(120)
        ));
    }

    #[test]
    fn xor_pad_is_an_involution() {
        let mut data = *b"0123456789abcdef";
        let original = data;
        let pad = [0x5a; AUTH_SIZE];
        xor_pad(&mut data, &pad);
        assert_ne!(data, original);
        xor_pad(&mut data, &pad);
        assert_eq!(data, original);
    }
}
