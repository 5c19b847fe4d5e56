//! Collaborator traits at the crate seams
//!
//! The stages never own a socket or a timer. Whatever plays the role of the
//! radio implements [`LinkTransport`]; the runtime's timer facility
//! implements [`Scheduler`]. Frames the stages want transmitted travel out
//! through an [`Outgoing`] queue the runtime drains.

use std::time::Duration;

use orrery_core::{OrreryResult, Time};

use crate::Buffer;

/// Static link parameters needed by the Timekeeper
#[derive(Clone, Copy, Debug)]
pub struct LinkConfiguration {
    /// Local timer inaccuracy, parts per million
    pub timer_accuracy_ppm: u32,
    /// Local timer frequency, Hz
    pub timer_frequency_hz: u64,
}

/// Live link counters
#[derive(Clone, Copy, Debug)]
pub struct LinkStatistics {
    /// Current raw hardware timestamp
    pub time_stamp: Time,
}

/// The link layer as the stack sees it
pub trait LinkTransport: Send + Sync {
    /// Transmit one frame
    fn send(&self, frame: &[u8]) -> OrreryResult<()>;

    fn configuration(&self) -> LinkConfiguration;

    fn statistics(&self) -> LinkStatistics;
}

/// Cancellation handle for a scheduled task
pub trait TaskHandle: Send {
    fn cancel(&mut self);
}

/// Periodic task facility
pub trait Scheduler: Send + Sync {
    /// Invoke `tick` every `period` until the handle is cancelled or dropped
    fn repeat(&self, period: Duration, tick: Box<dyn FnMut() + Send>) -> Box<dyn TaskHandle>;
}

/// Transmission work a stage hands to the runtime
#[derive(Debug)]
pub enum Outgoing {
    /// A fresh message that still needs the full marshal pass
    Marshal(Buffer),
    /// A forwarded frame, already marshaled by its originator
    Raw(Buffer),
}

pub type OutgoingSender = tokio::sync::mpsc::UnboundedSender<Outgoing>;
