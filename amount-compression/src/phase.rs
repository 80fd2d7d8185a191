//! Phase geometry on the log10 "clock face".
//!
//! An amount's phase is the fractional part of its base-10 logarithm. It
//! captures the leading-digit pattern independently of magnitude, so 3, 30
//! and 3_000_000 all sit at the same point on a circle of circumference 1.
//!
//! Distances and means are taken on that circle:
//! - [`cyclic_distance`] is the shorter arc between two phases;
//! - [`circular_mean`] averages unit vectors, so a cluster straddling the
//!   0/1 boundary does not drift towards 0.5.
//!
//! Round denominations (1, 2, 5, 10, 20, 50, ...) produce three related
//! phases, so a centroid also has [`Harmonic`] images at `+log10(2)` and
//! `+log10(5)`.

use std::f64::consts::{LOG10_2, TAU};

use serde::{Deserialize, Serialize};

/// `log10(5)`, the offset of the 5× image of a centroid.
pub const LOG10_5: f64 = 1.0 - LOG10_2;

/// Which image of a centroid a point was matched against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Harmonic {
    One,
    Two,
    Five,
}

impl Harmonic {
    /// Multiplier applied to the centroid's implied amount.
    pub fn multiplier(self) -> i64 {
        match self {
            Harmonic::One => 1,
            Harmonic::Two => 2,
            Harmonic::Five => 5,
        }
    }

    /// Phase offset of this image relative to the 1× centroid.
    pub fn offset(self) -> f64 {
        match self {
            Harmonic::One => 0.0,
            Harmonic::Two => LOG10_2,
            Harmonic::Five => LOG10_5,
        }
    }
}

/// Wrap any finite value into `[0, 1)`.
pub fn wrap(x: f64) -> f64 {
    let r = x.rem_euclid(1.0);
    // rem_euclid of a tiny negative value rounds up to exactly 1.0
    if r >= 1.0 {
        0.0
    } else {
        r
    }
}

/// Split a positive amount into `(exponent, phase)` with
/// `amount ≈ 10^exponent · 10^phase` and `phase` in `[0, 1)`.
///
/// Returns `None` for zero and negative amounts, which have no logarithm.
pub fn decompose(amount: i64) -> Option<(i32, f64)> {
    if amount <= 0 {
        return None;
    }
    let log = (amount as f64).log10();
    let mut exponent = log.trunc();
    let mut phase = log.fract();
    if phase < 0.0 {
        phase += 1.0;
        exponent -= 1.0;
    }
    Some((exponent as i32, phase))
}

/// Phase of a positive amount.
pub fn phase_of(amount: i64) -> Option<f64> {
    decompose(amount).map(|(_, phase)| phase)
}

/// Shorter arc between two phases. Always in `[0, 0.5]`.
pub fn cyclic_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs();
    if diff > 0.5 {
        1.0 - diff
    } else {
        diff
    }
}

/// Running sum of unit vectors, one per phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseAccumulator {
    sum_sin: f64,
    sum_cos: f64,
    count: usize,
}

impl PhaseAccumulator {
    pub fn push(&mut self, phase: f64) {
        let angle = phase * TAU;
        self.sum_sin += angle.sin();
        self.sum_cos += angle.cos();
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Angle of the resultant vector as a phase, or `None` if nothing was pushed.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(wrap(self.sum_sin.atan2(self.sum_cos) / TAU))
    }
}

/// Circular mean of a set of phases, in `[0, 1)`. Empty input yields 0.
pub fn circular_mean(phases: &[f64]) -> f64 {
    let mut acc = PhaseAccumulator::default();
    for &p in phases {
        acc.push(p);
    }
    acc.mean().unwrap_or(0.0)
}

/// Distance from `point` to the nearest harmonic image of `centroid`.
///
/// Ties resolve towards the lower harmonic.
pub fn harmonic_distance(point: f64, centroid: f64) -> (f64, Harmonic) {
    let d1 = cyclic_distance(point, centroid);
    let d2 = cyclic_distance(point, wrap(centroid + LOG10_2));
    let d5 = cyclic_distance(point, wrap(centroid + LOG10_5));

    if d1 <= d2 && d1 <= d5 {
        (d1, Harmonic::One)
    } else if d2 <= d5 {
        (d2, Harmonic::Two)
    } else {
        (d5, Harmonic::Five)
    }
}

/// Rotate a point that matched a 2× or 5× image back onto the 1× base.
pub fn normalize_to_fundamental(point: f64, centroid: f64) -> f64 {
    match harmonic_distance(point, centroid).1 {
        Harmonic::One => point,
        harmonic => wrap(point - harmonic.offset()),
    }
}
