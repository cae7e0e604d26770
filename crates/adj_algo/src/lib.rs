// crates/adj_algo/src/lib.rs
//! Pure numeric algorithms for the adjustment engine.
//!
//! Everything here works on plain slices and small value types; grouping by
//! entity or partition happens in `adj_pipeline`. Undefined values are
//! `Option::None` throughout and never raise.

#![forbid(unsafe_code)]

pub mod change;
pub mod imputation;
pub mod invariants;
pub mod stats;

// ----------------------------- Scoring (public surface) -----------------------------

pub mod scoring {
    pub mod iqr;
    pub mod zscore;

    pub use iqr::{iqr_bounds, iqr_flags};
    pub use zscore::{flag_high, zscores};
}

// ---------------------------- Allocation (public surface) ---------------------------

pub mod allocation {
    pub mod negatives;
    pub mod proportional;
    pub mod rollback;

    pub use negatives::{eliminate_negatives, NegativeOutcome};
    pub use proportional::{apportion, non_outlier_shares, Apportioned, PartitionShares};
    pub use rollback::anchor_shares;

    /// Errors raised by the allocation family.
    #[derive(Debug, Clone, PartialEq)]
    pub enum AllocError {
        /// Non-outlier mass is zero (or absent) while outlier mass must be redistributed.
        ZeroNonOutlierTotal,
        /// Renormalization denominator is zero.
        ZeroMass,
        /// A value stayed negative after elimination.
        ResidualNegative { index: usize, value: f64 },
        /// No strictly positive member can absorb a negative deficit.
        NoPositiveMembers,
        /// Input slices disagree in length.
        LengthMismatch { expected: usize, got: usize },
    }

    impl core::fmt::Display for AllocError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            match self {
                AllocError::ZeroNonOutlierTotal => write!(f, "zero non-outlier total"),
                AllocError::ZeroMass => write!(f, "cannot renormalize a partition with zero mass"),
                AllocError::ResidualNegative { index, value } => {
                    write!(f, "value at position {index} is still negative ({value})")
                }
                AllocError::NoPositiveMembers => write!(f, "no positive member can absorb the negative deficit"),
                AllocError::LengthMismatch { expected, got } => {
                    write!(f, "slice length mismatch: expected {expected}, got {got}")
                }
            }
        }
    }

    impl std::error::Error for AllocError {}
}

pub use allocation::AllocError;
pub use change::{ratios, Direction};
pub use imputation::{extrapolate, interpolate, plan_imputation, Anchor, ImputePlan};
pub use invariants::{check_sums, within_tolerance, SumMismatch};
