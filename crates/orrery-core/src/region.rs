//! Space-time points and regions

use std::fmt;

use crate::{Space, Time, TimeInterval};

/// A (where, when) pair identifying the origin of a message
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Spacetime {
    pub space: Space,
    pub time: Time,
}

impl Spacetime {
    #[inline]
    pub fn new(space: Space, time: Time) -> Self {
        Spacetime { space, time }
    }
}

impl fmt::Debug for Spacetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:?},{:?}}}", self.space, self.time)
    }
}

/// A sphere in space intersected with a time interval. Regions are the
/// addressing and validity unit for both routing and security.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub center: Space,
    /// Radius in centimeters
    pub radius: u32,
    pub t0: Time,
    pub t1: Time,
}

impl Region {
    pub fn new(center: Space, radius: u32, t0: Time, t1: Time) -> Self {
        debug_assert!(t0 <= t1);
        Region {
            center,
            radius,
            t0,
            t1,
        }
    }

    #[inline]
    pub fn interval(&self) -> TimeInterval {
        TimeInterval::new(self.t0, self.t1)
    }

    /// Membership requires both spatial and temporal containment
    pub fn contains(&self, point: &Space, when: Time) -> bool {
        self.interval().contains(when) && self.center.distance(point) <= self.radius
    }

    pub fn contains_spacetime(&self, st: &Spacetime) -> bool {
        self.contains(&st.space, st.time)
    }
}
