//! Security stage
//!
//! Trust bootstrap and message authentication. The sink drives a four-step
//! handshake against every provisioned peer:
//!
//! ```text
//! sink                           sensor
//!   | -- DH_REQUEST(region, pk) -->|
//!   |<-- DH_RESPONSE(pk) ----------|
//!   |<-- AUTH_REQUEST(auth, otp) --|
//!   | -- AUTH_GRANTED(region, a') >|
//! ```
//!
//! Both sides derive the same master secret from the exchanged public keys;
//! the sensor proves knowledge of it with a time-windowed OTP and the sink
//! confirms by returning the sensor's credential concealed under that OTP.
//! Afterwards every Response the sensor marshals is padded and MACed under
//! the shared secret, and the sink verifies on reception.

use std::sync::Arc;

use orrery_core::{DeviceId, MessageType, NodeId, Region, Scale, Time, Unit};
use orrery_crypto::{auth, KeyPair, MasterSecret};
use orrery_wire::{ControlBody, Header, Message, Payload, AUTH_SIZE};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{destination, Buffer, Clock, Outgoing, OutgoingSender, Stage};

/// Period of the key-manager housekeeping pass
pub const KEY_MANAGER_PERIOD: Time = Time(10_000_000);

/// Latest useful delivery time for a handshake message
pub fn handshake_deadline(origin: Time) -> Time {
    let bound = KEY_MANAGER_PERIOD.min(auth::KEY_EXPIRY);
    origin.saturating_add(Time(bound.as_micros() / 2))
}

/// A provisioned peer and its trust state
#[derive(Clone)]
struct Peer {
    id: NodeId,
    auth: [u8; AUTH_SIZE],
    /// Deploy region the peer must report from
    valid: Region,
    master_secret: Option<MasterSecret>,
    auth_time: Time,
}

impl Peer {
    fn new(id: NodeId, valid: Region) -> Self {
        Peer {
            id,
            auth: auth::auth_tag(&id),
            valid,
            master_secret: None,
            auth_time: Time::ZERO,
        }
    }

    fn valid_deploy(&self, where_: &orrery_core::Space, when: Time) -> bool {
        self.valid.contains(where_, when)
    }

    fn valid_request(
        &self,
        candidate: &[u8; AUTH_SIZE],
        where_: &orrery_core::Space,
        when: Time,
    ) -> bool {
        candidate == &self.auth && self.valid.contains(where_, when)
    }
}

struct PendingKey {
    master_secret: MasterSecret,
    creation: Time,
}

impl PendingKey {
    fn expired(&self, now: Time) -> bool {
        now.saturating_sub(self.creation) > auth::KEY_EXPIRY
    }
}

#[derive(Default)]
struct Tables {
    pending_peers: Vec<Peer>,
    trusted_peers: Vec<Peer>,
    pending_keys: Vec<PendingKey>,
    dh_requests_open: u32,
    last_dh_peer: Option<NodeId>,
}

/// The Security stage
pub struct Security {
    id: NodeId,
    auth: [u8; AUTH_SIZE],
    keypair: KeyPair,
    is_sink: bool,
    clock: Arc<Clock>,
    outgoing: OutgoingSender,
    tables: Mutex<Tables>,
    scale: Scale,
    device: DeviceId,
}

impl Security {
    pub fn new(
        id: NodeId,
        is_sink: bool,
        clock: Arc<Clock>,
        outgoing: OutgoingSender,
        scale: Scale,
        device: DeviceId,
    ) -> Self {
        Security {
            id,
            auth: auth::auth_tag(&id),
            keypair: KeyPair::generate(),
            is_sink,
            clock,
            outgoing,
            tables: Mutex::new(Tables::default()),
            scale,
            device,
        }
    }

    /// Provision trust in a peer deployed inside `valid_region`
    pub fn add_peer(&self, id: NodeId, valid_region: Region) {
        info!(peer = ?id, "peer provisioned");
        self.tables
            .lock()
            .pending_peers
            .push(Peer::new(id, valid_region));
    }

    pub fn trusted_peer_count(&self) -> usize {
        self.tables.lock().trusted_peers.len()
    }

    /// Master secret shared with a trusted peer, if established
    pub fn master_secret_of(&self, id: &NodeId) -> Option<MasterSecret> {
        self.tables
            .lock()
            .trusted_peers
            .iter()
            .find(|p| &p.id == id)
            .and_then(|p| p.master_secret.clone())
    }

    fn control(&self, body: ControlBody) -> Message {
        let header = Header::new(
            MessageType::Control,
            orrery_core::Mode::for_subtype(body.subtype()),
            Unit::default(),
            self.device,
            self.scale,
        );
        Message::new(
            header,
            Payload::Control {
                radius: 0,
                t1: Time::ZERO,
                body,
            },
        )
    }

    fn transmit(&self, msg: Message) {
        if self
            .outgoing
            .send(Outgoing::Marshal(Buffer::outgoing(msg)))
            .is_err()
        {
            warn!("outgoing queue closed, handshake message dropped");
        }
    }

    fn on_dh_request(&self, buf: &Buffer, public_key: &[u8; 32]) {
        if self.is_sink {
            return;
        }
        let now = self.clock.now();
        let origin = buf.message.header.origin;
        let mut tables = self.tables.lock();

        let mut valid_peer = tables
            .pending_peers
            .iter()
            .any(|p| p.valid_deploy(&origin.space, now));
        if !valid_peer {
            // a re-keying sink falls back from trusted to pending
            if let Some(i) = tables
                .trusted_peers
                .iter()
                .position(|p| p.valid_deploy(&origin.space, now))
            {
                let mut peer = tables.trusted_peers.remove(i);
                peer.master_secret = None;
                tables.pending_peers.push(peer);
                valid_peer = true;
            }
        }
        if !valid_peer {
            debug!("DH request from outside any provisioned region");
            return;
        }

        debug!("answering DH request");
        self.transmit(self.control(ControlBody::DhResponse {
            public_key: self.keypair.public_bytes(),
        }));

        let master_secret = self.keypair.agree(public_key);
        let token = auth::otp(&master_secret, &self.id, now);
        tables.pending_keys.push(PendingKey {
            master_secret,
            creation: now,
        });
        drop(tables);

        self.transmit(self.control(ControlBody::AuthRequest {
            auth: self.auth,
            otp: token,
        }));
    }

    fn on_dh_response(&self, buf: &Buffer, public_key: &[u8; 32]) {
        let now = self.clock.now();
        let origin = buf.message.header.origin;
        let mut tables = self.tables.lock();
        if tables.dh_requests_open == 0 {
            return;
        }
        if !tables
            .pending_peers
            .iter()
            .any(|p| p.valid_deploy(&origin.space, now))
        {
            return;
        }
        debug!("DH response accepted");
        tables.dh_requests_open -= 1;
        let master_secret = self.keypair.agree(public_key);
        tables.pending_keys.push(PendingKey {
            master_secret,
            creation: now,
        });
    }

    fn on_auth_request(&self, buf: &Buffer, candidate: &[u8; AUTH_SIZE], token: &[u8; AUTH_SIZE]) {
        let now = self.clock.now();
        let origin = buf.message.header.origin;
        let mut tables = self.tables.lock();

        let mut granted: Option<(Peer, MasterSecret)> = None;
        'peers: for pi in 0..tables.pending_peers.len() {
            if !tables.pending_peers[pi].valid_request(candidate, &origin.space, now) {
                continue;
            }
            for ki in 0..tables.pending_keys.len() {
                let master = tables.pending_keys[ki].master_secret.clone();
                let peer_id = tables.pending_peers[pi].id;
                if auth::verify_otp(&master, &peer_id, token, now) {
                    let mut peer = tables.pending_peers.remove(pi);
                    peer.master_secret = Some(master.clone());
                    peer.auth_time = now;
                    tables.trusted_peers.push(peer.clone());
                    tables.pending_keys.remove(ki);
                    granted = Some((peer, master));
                    break 'peers;
                }
            }
        }
        drop(tables);

        match granted {
            Some((peer, master)) => {
                info!(peer = ?peer.id, "peer authenticated");
                // conceal the credential under the current OTP
                let mut concealed = peer.auth;
                auth::xor_pad(&mut concealed, &auth::otp(&master, &peer.id, now));
                self.transmit(self.control(ControlBody::AuthGranted {
                    destination: peer.valid,
                    auth: concealed,
                }));
            }
            None => warn!("authentication request matched no peer"),
        }
    }

    fn on_auth_granted(&self, concealed: &[u8; AUTH_SIZE]) {
        if self.is_sink {
            return;
        }
        let now = self.clock.now();
        let mut tables = self.tables.lock();

        for pi in 0..tables.pending_peers.len() {
            for ki in 0..tables.pending_keys.len() {
                let master = tables.pending_keys[ki].master_secret.clone();
                let peer_id = tables.pending_peers[pi].id;
                // the grantor may have concealed in an adjacent OTP window
                for when in [
                    now,
                    now.saturating_sub(auth::TIME_WINDOW),
                    now.saturating_add(auth::TIME_WINDOW),
                ] {
                    let mut revealed = *concealed;
                    auth::xor_pad(&mut revealed, &auth::otp(&master, &peer_id, when));
                    if revealed == self.auth {
                        let mut peer = tables.pending_peers.remove(pi);
                        peer.master_secret = Some(master);
                        peer.auth_time = now;
                        tables.trusted_peers.push(peer);
                        tables.pending_keys.remove(ki);
                        info!("authentication granted, link trusted");
                        return;
                    }
                }
            }
        }
    }

    fn on_response(&self, buf: &mut Buffer) {
        let origin = buf.message.header.origin;
        let now = self.clock.now();
        let reception_time = buf.sfd_timestamp;
        let (value, tag) = match &buf.message.payload {
            Payload::Response {
                value,
                auth: Some(tag),
                ..
            } => (value.clone(), *tag),
            _ => {
                trace!("unauthenticated response");
                return;
            }
        };

        let tables = self.tables.lock();
        for peer in &tables.trusted_peers {
            if !peer.valid_deploy(&origin.space, now) {
                continue;
            }
            if let Some(master) = &peer.master_secret {
                if auth::unpack(master, &peer.id, &value, &tag, reception_time) {
                    buf.trusted = true;
                    return;
                }
                warn!("response MAC verification failed");
            }
        }
    }

    /// Periodic housekeeping: expire keys and peers, re-key stale trust and
    /// solicit the next pending peer
    pub fn key_manager_tick(&self) {
        let now = self.clock.now();
        trace!("key manager tick");
        let mut tables = self.tables.lock();

        tables.pending_keys.retain(|k| !k.expired(now));
        tables
            .trusted_peers
            .retain(|p| p.valid_deploy(&p.valid.center, now));
        tables
            .pending_peers
            .retain(|p| p.valid_deploy(&p.valid.center, now));

        // stale master secrets go back through the handshake
        let mut i = 0;
        while i < tables.trusted_peers.len() {
            if now.saturating_sub(tables.trusted_peers[i].auth_time) > auth::KEY_EXPIRY {
                debug!("trusted peer's key expired");
                let mut peer = tables.trusted_peers.remove(i);
                peer.master_secret = None;
                tables.pending_peers.push(peer);
            } else {
                i += 1;
            }
        }

        if tables.pending_peers.is_empty() {
            return;
        }

        // round-robin one DH request per tick
        let start = tables
            .last_dh_peer
            .and_then(|last| tables.pending_peers.iter().position(|p| p.id == last))
            .map(|i| i + 1)
            .unwrap_or(0);
        let n = tables.pending_peers.len();
        for k in 0..n {
            let i = (start + k) % n;
            let (peer_id, destination, valid) = {
                let peer = &tables.pending_peers[i];
                (
                    peer.id,
                    peer.valid,
                    peer.valid_deploy(&peer.valid.center, now),
                )
            };
            if valid {
                tables.last_dh_peer = Some(peer_id);
                tables.dh_requests_open += 1;
                drop(tables);
                debug!("soliciting key agreement");
                self.transmit(self.control(ControlBody::DhRequest {
                    destination,
                    public_key: self.keypair.public_bytes(),
                }));
                return;
            }
        }
    }
}

impl Stage for Security {
    fn name(&self) -> &'static str {
        "security"
    }

    fn on_receive(&self, buf: &mut Buffer) {
        if !buf.destined_to_me {
            return;
        }
        match buf.message.kind() {
            MessageType::Control => {
                let body = match &buf.message.payload {
                    Payload::Control { body, .. } => body.clone(),
                    _ => return,
                };
                match body {
                    ControlBody::DhRequest { public_key, .. } => {
                        self.on_dh_request(buf, &public_key)
                    }
                    ControlBody::DhResponse { public_key } => {
                        self.on_dh_response(buf, &public_key)
                    }
                    ControlBody::AuthRequest { auth, otp } => {
                        self.on_auth_request(buf, &auth, &otp)
                    }
                    ControlBody::AuthGranted { auth, .. } => self.on_auth_granted(&auth),
                    _ => {}
                }
            }
            MessageType::Response => self.on_response(buf),
            MessageType::Interest | MessageType::Command => buf.trusted = true,
        }
    }

    fn on_marshal(&self, buf: &mut Buffer) {
        if buf.message.kind() != MessageType::Response {
            buf.trusted = true;
            return;
        }

        let now = self.clock.now();
        let here = buf.message.header.origin.space;
        let dst = destination(&buf.message, here, now).center;

        let keyed = {
            let tables = self.tables.lock();
            tables
                .trusted_peers
                .iter()
                .find(|p| p.valid_deploy(&dst, now))
                .and_then(|p| p.master_secret.clone().map(|m| (p.id, m)))
        };
        let Some((peer_id, master)) = keyed else {
            // sent unauthenticated; the destination will not trust it
            warn!("no trusted peer covers the destination");
            return;
        };

        if let Payload::Response { value, auth: tag, .. } = &mut buf.message.payload {
            let (padded, mac) = auth::pack(&master, &peer_id, value, now);
            *value = padded;
            *tag = Some(mac);
            buf.trusted = true;
        }
    }
}
