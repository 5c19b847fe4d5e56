//! ORRERY Core - Fundamental space-time types
//!
//! This crate defines the types shared by every layer of the ORRERY stack:
//! - Geographic coordinates at four precision scales (`Scale`, `Space`)
//! - Time primitives (`Time`, `TimeInterval`, `Spacetime`)
//! - Addressing regions (`Region`: a sphere intersected with a time interval)
//! - Message descriptors (`Unit`, `DeviceId`, `NodeId`, type/subtype codes)
//! - Error types (`OrreryError`)

pub mod error;
pub mod id;
pub mod message;
pub mod region;
pub mod space;
pub mod time;
pub mod unit;

pub use error::*;
pub use id::*;
pub use message::*;
pub use region::*;
pub use space::*;
pub use time::*;
pub use unit::*;
