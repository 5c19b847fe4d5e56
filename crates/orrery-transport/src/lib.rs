//! ORRERY Transport - the link layer
//!
//! In deployments the stack sits on a sensor radio; here the radio is
//! substituted by a UDP socket between simulated nodes. The [`UdpNic`]
//! implements the stack's `LinkTransport` seam and timestamps every received
//! frame the way a radio's start-of-frame interrupt would. The
//! [`TokioScheduler`] backs the stack's periodic tasks.

pub mod scheduler;
pub mod udp;

pub use scheduler::TokioScheduler;
pub use udp::{UdpNic, NOMINAL_RSSI};
