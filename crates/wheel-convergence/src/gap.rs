//! Gap arithmetic and objective sense.

use serde::{Deserialize, Serialize};
use wheel_fabric::BoundKind;

/// Direction of optimisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

/// Which of the two global bounds a value may tighten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundSide {
    Upper,
    Lower,
}

impl Sense {
    /// Map an inner/outer bound to upper/lower.
    ///
    /// When minimising, feasible solutions give upper bounds and relaxations
    /// give lower bounds; maximising swaps them.
    pub const fn side(self, kind: BoundKind) -> BoundSide {
        match (self, kind) {
            (Sense::Minimize, BoundKind::Inner) | (Sense::Maximize, BoundKind::Outer) => {
                BoundSide::Upper
            }
            (Sense::Minimize, BoundKind::Outer) | (Sense::Maximize, BoundKind::Inner) => {
                BoundSide::Lower
            }
        }
    }
}

/// `(upper - lower) / max(1, |lower|)`; infinite while either bound is.
pub fn relative_gap(upper: f64, lower: f64) -> f64 {
    if !upper.is_finite() || !lower.is_finite() {
        return f64::INFINITY;
    }
    (upper - lower) / lower.abs().max(1.0)
}

/// `upper - lower`; infinite while either bound is.
pub fn absolute_gap(upper: f64, lower: f64) -> f64 {
    if !upper.is_finite() || !lower.is_finite() {
        return f64::INFINITY;
    }
    upper - lower
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sense_maps_bound_kinds() {
        assert_eq!(Sense::Minimize.side(BoundKind::Inner), BoundSide::Upper);
        assert_eq!(Sense::Minimize.side(BoundKind::Outer), BoundSide::Lower);
        assert_eq!(Sense::Maximize.side(BoundKind::Inner), BoundSide::Lower);
        assert_eq!(Sense::Maximize.side(BoundKind::Outer), BoundSide::Upper);
    }

    #[test]
    fn relative_gap_uses_unit_floor() {
        // |lower| < 1 uses denominator 1
        assert_eq!(relative_gap(0.5, 0.25), 0.25);
        assert_eq!(relative_gap(110.0, 100.0), 0.1);
        assert_eq!(relative_gap(-90.0, -100.0), 0.1);
    }

    #[test]
    fn gaps_are_infinite_without_both_bounds() {
        assert_eq!(relative_gap(f64::INFINITY, 3.0), f64::INFINITY);
        assert_eq!(relative_gap(3.0, f64::NEG_INFINITY), f64::INFINITY);
        assert_eq!(absolute_gap(f64::INFINITY, f64::NEG_INFINITY), f64::INFINITY);
        assert_eq!(absolute_gap(5.0, 2.0), 3.0);
    }
}
