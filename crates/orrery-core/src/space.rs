//! Geographic coordinates
//!
//! Coordinates are 3D integers in centimeters from the network origin (the
//! sink). On the wire a coordinate is compressed to one of four scales; in
//! memory it is always carried at full precision. Converting to a coarser
//! scale is a lossy truncating projection: only a conversion to the same
//! scale is the identity.

use std::fmt;

/// Coordinate compression scale used on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Scale {
    /// 8-bit, 50 cm units
    CmX50U8 = 0,
    /// 16-bit, 1 cm units
    CmU16 = 1,
    /// 16-bit, 25 cm units
    CmX25U16 = 2,
    /// 32-bit, 1 cm units (full precision, the canonical global scale)
    CmU32 = 3,
}

impl Scale {
    pub fn from_code(code: u8) -> Option<Scale> {
        match code {
            0 => Some(Scale::CmX50U8),
            1 => Some(Scale::CmU16),
            2 => Some(Scale::CmX25U16),
            3 => Some(Scale::CmU32),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Centimeters per coordinate unit at this scale
    #[inline]
    pub fn unit_cm(self) -> i32 {
        match self {
            Scale::CmX50U8 => 50,
            Scale::CmU16 => 1,
            Scale::CmX25U16 => 25,
            Scale::CmU32 => 1,
        }
    }

    /// Width in bytes of one encoded coordinate component
    #[inline]
    pub fn width(self) -> usize {
        match self {
            Scale::CmX50U8 => 1,
            Scale::CmU16 | Scale::CmX25U16 => 2,
            Scale::CmU32 => 4,
        }
    }

    /// Explicit padding after the three components, keeping the following
    /// time field aligned the way the reference layout does
    #[inline]
    pub fn padding(self) -> usize {
        match self {
            Scale::CmX50U8 => 1,
            Scale::CmU16 | Scale::CmX25U16 => 2,
            Scale::CmU32 => 0,
        }
    }

    fn min_value(self) -> i64 {
        match self.width() {
            1 => i8::MIN as i64,
            2 => i16::MIN as i64,
            _ => i32::MIN as i64,
        }
    }

    fn max_value(self) -> i64 {
        match self.width() {
            1 => i8::MAX as i64,
            2 => i16::MAX as i64,
            _ => i32::MAX as i64,
        }
    }
}

/// 3D coordinate in centimeters, full precision
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Space {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// The canonical full-precision scale used for the global reference
pub type GlobalSpace = Space;

impl Space {
    pub const ORIGIN: Space = Space { x: 0, y: 0, z: 0 };

    #[inline]
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Space { x, y, z }
    }

    /// Euclidean distance to `other`, in centimeters
    pub fn distance(&self, other: &Space) -> u32 {
        let dx = (self.x as i64 - other.x as i64) as f64;
        let dy = (self.y as i64 - other.y as i64) as f64;
        let dz = (self.z as i64 - other.z as i64) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt().round() as u32
    }

    /// Project this coordinate onto `scale`'s grid; lossy except at `CmU32`
    pub fn quantize(&self, scale: Scale) -> Space {
        let unit = scale.unit_cm() as i64;
        let q = |v: i32| -> i32 {
            let scaled = (v as i64 / unit).clamp(scale.min_value(), scale.max_value());
            (scaled * unit) as i32
        };
        Space {
            x: q(self.x),
            y: q(self.y),
            z: q(self.z),
        }
    }

    /// Component-wise translation
    pub fn translate(&self, other: &Space) -> Space {
        Space {
            x: self.x.wrapping_add(other.x),
            y: self.y.wrapping_add(other.y),
            z: self.z.wrapping_add(other.z),
        }
    }

    /// Trilaterate a position from three reference points and their
    /// pseudo-distances. Returns `None` when the references are degenerate
    /// (coincident or collinear), in which case the caller keeps its
    /// previous estimate.
    pub fn trilaterate(
        p1: &Space,
        d1: u32,
        p2: &Space,
        d2: u32,
        p3: &Space,
        d3: u32,
    ) -> Option<Space> {
        let to_f = |p: &Space| [p.x as f64, p.y as f64, p.z as f64];
        let sub = |a: [f64; 3], b: [f64; 3]| [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
        let dot = |a: [f64; 3], b: [f64; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
        let scale = |a: [f64; 3], s: f64| [a[0] * s, a[1] * s, a[2] * s];
        let cross = |a: [f64; 3], b: [f64; 3]| {
            [
                a[1] * b[2] - a[2] * b[1],
                a[2] * b[0] - a[0] * b[2],
                a[0] * b[1] - a[1] * b[0],
            ]
        };

        let (p1f, p2f, p3f) = (to_f(p1), to_f(p2), to_f(p3));
        let (r1, r2, r3) = (d1 as f64, d2 as f64, d3 as f64);

        let d21 = sub(p2f, p1f);
        let d = dot(d21, d21).sqrt();
        if d < f64::EPSILON {
            return None;
        }
        let ex = scale(d21, 1.0 / d);

        let d31 = sub(p3f, p1f);
        let i = dot(ex, d31);
        let ey_raw = sub(d31, scale(ex, i));
        let ey_norm = dot(ey_raw, ey_raw).sqrt();
        if ey_norm < f64::EPSILON {
            return None;
        }
        let ey = scale(ey_raw, 1.0 / ey_norm);
        let ez = cross(ex, ey);
        let j = dot(ey, d31);

        let x = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
        let y = (r1 * r1 - r3 * r3 + i * i + j * j) / (2.0 * j) - (i / j) * x;
        let z2 = r1 * r1 - x * x - y * y;
        let z = if z2 > 0.0 { z2.sqrt() } else { 0.0 };

        let result = [
            p1f[0] + x * ex[0] + y * ey[0] + z * ez[0],
            p1f[1] + x * ex[1] + y * ey[1] + z * ez[1],
            p1f[2] + x * ex[2] + y * ey[2] + z * ez[2],
        ];

        Some(Space {
            x: result[0].round() as i32,
            y: result[1].round() as i32,
            z: result[2].round() as i32,
        })
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}
