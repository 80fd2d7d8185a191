//! Property-based tests for phase geometry and peak residuals.
//!
//! These check the geometric identities the clustering relies on for all
//! phases and amounts, not just hand-picked values.

use bth_amount_compression::{
    kmeans::{ClusterVariant, PeakSet},
    phase::{
        circular_mean, cyclic_distance, harmonic_distance, normalize_to_fundamental, wrap,
        Harmonic,
    },
};
use proptest::prelude::*;

const EPS: f64 = 1e-9;

// ============================================================================
// Cyclic Distance
// ============================================================================

proptest! {
    /// Property: cyclic distance is a symmetric, bounded arc length.
    #[test]
    fn prop_cyclic_distance_symmetric_and_bounded(a in 0.0f64..1.0, b in 0.0f64..1.0) {
        let d = cyclic_distance(a, b);
        prop_assert_eq!(d, cyclic_distance(b, a));
        prop_assert!((0.0..=0.5).contains(&d), "distance {} out of range", d);
        prop_assert_eq!(cyclic_distance(a, a), 0.0);
    }

    /// Property: rotating both points leaves their distance unchanged.
    #[test]
    fn prop_cyclic_distance_rotation_invariant(
        a in 0.0f64..1.0,
        b in 0.0f64..1.0,
        shift in 0.0f64..1.0,
    ) {
        let before = cyclic_distance(a, b);
        let after = cyclic_distance(wrap(a + shift), wrap(b + shift));
        prop_assert!((before - after).abs() < EPS);
    }
}

// ============================================================================
// Circular Mean
// ============================================================================

proptest! {
    /// Property: the mean of a single phase is that phase.
    #[test]
    fn prop_circular_mean_single_point(x in 0.0f64..1.0) {
        let mean = circular_mean(&[x]);
        prop_assert!((0.0..1.0).contains(&mean));
        prop_assert!(cyclic_distance(mean, x) < EPS);
    }

    /// Property: rotating every input rotates the mean by the same amount.
    /// Inputs are kept within a quarter turn of each other so the resultant
    /// vector is well away from zero.
    #[test]
    fn prop_circular_mean_rotation_invariant(
        centre in 0.0f64..1.0,
        offsets in prop::collection::vec(-0.125f64..0.125, 1..50),
        shift in 0.0f64..1.0,
    ) {
        let phases: Vec<f64> = offsets.iter().map(|o| wrap(centre + o)).collect();
        let rotated: Vec<f64> = phases.iter().map(|p| wrap(p + shift)).collect();

        let expected = wrap(circular_mean(&phases) + shift);
        let actual = circular_mean(&rotated);
        prop_assert!(
            cyclic_distance(expected, actual) < 1e-6,
            "expected {}, got {}", expected, actual
        );
    }
}

// ============================================================================
// Harmonics
// ============================================================================

proptest! {
    /// Property: a point already nearest the 1x image is left alone.
    #[test]
    fn prop_normalize_fixes_fundamental_points(point in 0.0f64..1.0, centroid in 0.0f64..1.0) {
        let (_, harmonic) = harmonic_distance(point, centroid);
        let normalized = normalize_to_fundamental(point, centroid);
        if harmonic == Harmonic::One {
            prop_assert_eq!(normalized, point);
        }
    }

    /// Property: normalisation moves a point onto the 1x side at the same
    /// distance it had from its matching image.
    #[test]
    fn prop_normalize_preserves_distance(point in 0.0f64..1.0, centroid in 0.0f64..1.0) {
        let (distance, _) = harmonic_distance(point, centroid);
        let normalized = normalize_to_fundamental(point, centroid);
        prop_assert!((0.0..1.0).contains(&normalized));
        prop_assert!((cyclic_distance(normalized, centroid) - distance).abs() < EPS);
    }
}

// ============================================================================
// Peak Residuals
// ============================================================================

proptest! {
    /// Property: implied amount plus residual is the amount, exactly, and the
    /// implied amount is the rounded peak value at the decomposed exponent.
    #[test]
    fn prop_residual_round_trip(
        amount in 1i64..=i64::MAX,
        peaks in prop::collection::vec(0.0f64..1.0, 1..=7),
        harmonic in any::<bool>(),
    ) {
        let variant = if harmonic { ClusterVariant::Harmonic } else { ClusterVariant::Plain };
        let peak_set = PeakSet::new(variant, peaks);
        let r = peak_set.residual(amount).expect("positive amounts always decompose");

        prop_assert!(r.peak < peak_set.len());
        prop_assert_eq!(r.harmonic.is_some(), harmonic);

        let multiplier = r.harmonic.map_or(1, Harmonic::multiplier) as f64;
        let expected =
            (10f64.powf(peak_set.phases()[r.peak] + r.exponent as f64) * multiplier).round() as i64;
        let implied = r.implied_amount(amount);
        prop_assert_eq!(implied, expected);
        prop_assert_eq!(implied + r.residual, amount);
    }

    /// Property: zero and negative amounts never produce a residual.
    #[test]
    fn prop_non_positive_amounts_have_no_residual(amount in i64::MIN..=0) {
        let peak_set = PeakSet::new(ClusterVariant::Harmonic, vec![0.0, 0.5]);
        prop_assert!(peak_set.residual(amount).is_none());
    }
}
