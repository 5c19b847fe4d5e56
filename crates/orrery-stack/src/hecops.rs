//! Heuristic Cooperative Positioning System
//!
//! Estimates this node's position from up to three neighbor samples, each
//! carrying the neighbor's claimed coordinates, its own location confidence
//! and the received signal strength. Once three confident samples are held,
//! every new sample re-trilaterates the estimate.

use orrery_core::Space;
use tracing::debug;

/// Samples below this confidence are ignored; an estimate at or above it
/// counts as localized
pub const CONFIDENCE_THRESHOLD: u8 = 80;

const SAMPLES: usize = 3;

#[derive(Clone, Copy, Debug)]
struct Sample {
    coordinates: Space,
    confidence: u8,
    rssi: i8,
}

/// The positioning engine. Not synchronized; callers wrap it in a lock.
#[derive(Debug)]
pub struct HeCoPS {
    here: Space,
    confidence: u8,
    samples: Vec<Sample>,
}

impl HeCoPS {
    pub fn new(here: Space, confidence: u8) -> Self {
        HeCoPS {
            here,
            confidence,
            samples: Vec::with_capacity(SAMPLES),
        }
    }

    #[inline]
    pub fn here(&self) -> Space {
        self.here
    }

    #[inline]
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    #[inline]
    pub fn synchronized(&self) -> bool {
        self.confidence >= CONFIDENCE_THRESHOLD
    }

    /// Take one neighbor sample. Samples replace an existing entry for the
    /// same coordinates when at least as confident, fill a free slot, or
    /// evict the weakest entry when strictly more confident than it.
    pub fn learn(&mut self, coordinates: Space, confidence: u8, rssi: i8) {
        if confidence < CONFIDENCE_THRESHOLD {
            return;
        }

        let mut idx = None;
        for (i, s) in self.samples.iter().enumerate() {
            if s.coordinates == coordinates {
                if s.confidence > confidence {
                    return;
                }
                idx = Some(i);
                break;
            }
        }

        if idx.is_none() {
            if self.samples.len() < SAMPLES {
                self.samples.push(Sample {
                    coordinates,
                    confidence,
                    rssi,
                });
                idx = Some(self.samples.len() - 1);
            } else {
                // evict the weakest sample, but only for a strictly better one
                let mut weakest = 0;
                for (i, s) in self.samples.iter().enumerate() {
                    if s.confidence < self.samples[weakest].confidence {
                        weakest = i;
                    }
                }
                if self.samples[weakest].confidence >= confidence {
                    return;
                }
                idx = Some(weakest);
            }
        }

        if let Some(i) = idx {
            self.samples[i] = Sample {
                coordinates,
                confidence,
                rssi,
            };
        }

        if self.samples.len() >= SAMPLES {
            let [a, b, c] = [self.samples[0], self.samples[1], self.samples[2]];
            // RSSI in dBm shifted into a non-negative pseudo-distance
            if let Some(estimate) = Space::trilaterate(
                &a.coordinates,
                (a.rssi as i32 + 128) as u32,
                &b.coordinates,
                (b.rssi as i32 + 128) as u32,
                &c.coordinates,
                (c.rssi as i32 + 128) as u32,
            ) {
                self.here = estimate;
            }
            self.confidence = ((a.confidence as u32 + b.confidence as u32 + c.confidence as u32)
                * CONFIDENCE_THRESHOLD as u32
                / 100
                / 3) as u8;
            debug!(here = ?self.here, confidence = self.confidence, "location updated");
        }
    }
}
