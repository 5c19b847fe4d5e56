//! ORRERY Runtime - a running protocol node
//!
//! Wires the transport, the five stages and the periodic tasks into a
//! [`Node`]: frames from the link go through the receive pipeline and, when
//! destined to this node and trusted, out to unit-keyed clients; locally
//! originated messages go through the marshal pipeline and onto the link.

pub mod node;

pub use node::{Node, NodeConfig, NodeKind};
