//! ORRERY Wire - byte-exact message codecs
//!
//! Every ORRERY message fits in a single link-layer frame; the protocol
//! neither needs nor supports fragmentation. Codecs operate on
//! caller-supplied byte slices bounded by [`MTU`] and never allocate for
//! fixed-size fields.

pub mod codec;
pub mod header;
pub mod message;

pub use codec::*;
pub use header::*;
pub use message::*;

/// Maximum frame size accepted from / handed to the transport
pub const MTU: usize = 1472;
