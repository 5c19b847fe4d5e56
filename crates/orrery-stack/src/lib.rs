//! ORRERY Stack - the space-time protocol pipeline
//!
//! A node runs five stages over every frame. On reception the order is
//! Security, Locator, Timekeeper, Router, Manager; on marshal (just before
//! transmission) it is Manager, Router, Locator, Timekeeper, Security. Each
//! stage reads and annotates the shared [`Buffer`]; stages that need to
//! transmit enqueue [`Outgoing`] work for the runtime instead of touching
//! the link directly.

pub mod buffer;
pub mod hecops;
pub mod locator;
pub mod manager;
pub mod pipeline;
pub mod router;
pub mod security;
pub mod stage;
pub mod timekeeper;
pub mod traits;

pub use buffer::Buffer;
pub use hecops::HeCoPS;
pub use locator::{Locator, Positioner};
pub use manager::Manager;
pub use pipeline::Pipeline;
pub use router::{destination, Router, RADIO_RANGE};
pub use security::{handshake_deadline, Security, KEY_MANAGER_PERIOD};
pub use stage::Stage;
pub use timekeeper::{Clock, Timekeeper, MAX_DRIFT};
pub use traits::{
    LinkConfiguration, LinkStatistics, LinkTransport, Outgoing, OutgoingSender, Scheduler,
    TaskHandle,
};

use orrery_core::Space;

/// The sink sits at the coordinate origin by definition
pub const SINK: Space = Space::ORIGIN;
