//! Engine parameters and their domains.
//!
//! Notes:
//! - `start_year`/`end_year` bound both the year filter and the safe-year scan.
//! - `master_flag_threshold` counts *distinct* flagged metrics per detector
//!   family; `1` is the default, `2` reproduces the stricter older rule.
//! - `rollback_window = None` disables rollback detection for the run.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::years::YearRange;

pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 3.0;
pub const DEFAULT_IQR_MULTIPLIER: f64 = 3.0;
pub const DEFAULT_MASTER_FLAG_THRESHOLD: u32 = 1;
pub const DEFAULT_EXTRAPOLATION_SPAN: i32 = 4;
pub const DEFAULT_ROLLBACK_WINDOW: YearRange = YearRange { start: 2010, end: 2014 };

/// Define an enum with explicit wire tokens.
macro_rules! wire_enum {
    ($(#[$m:meta])* $name:ident => { $($variant:ident = $token:literal),+ $(,)? }) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum $name {
            $(
                #[cfg_attr(feature = "serde", serde(rename = $token))]
                $variant,
            )+
        }

        impl $name {
            pub fn as_token(self) -> &'static str {
                match self {
                    $( $name::$variant => $token, )+
                }
            }
        }

        impl core::str::FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $token => Ok($name::$variant), )+
                    other => Err(CoreError::InvalidToken(other.to_string())),
                }
            }
        }
    };
}

wire_enum!(
    /// How negative post-adjustment values are removed from a partition.
    NegativeStrategy => {
        Renormalize     = "renormalize",
        SubtractAverage = "subtract_average"
    }
);

impl Default for NegativeStrategy {
    fn default() -> Self {
        NegativeStrategy::Renormalize
    }
}

/// Parameters consumed by the scoring and adjustment stages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct Params {
    pub start_year: i32,
    pub end_year: i32,
    #[cfg_attr(feature = "serde", serde(default = "default_rollback_window"))]
    pub rollback_window: Option<YearRange>,
    #[cfg_attr(feature = "serde", serde(default = "default_zscore_threshold"))]
    pub zscore_threshold: f64,
    #[cfg_attr(feature = "serde", serde(default = "default_iqr_multiplier"))]
    pub iqr_multiplier: f64,
    #[cfg_attr(feature = "serde", serde(default = "default_master_flag_threshold"))]
    pub master_flag_threshold: u32,
    #[cfg_attr(feature = "serde", serde(default = "default_extrapolation_span"))]
    pub extrapolation_span: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub accept_negatives: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub negative_strategy: NegativeStrategy,
}

#[cfg(feature = "serde")]
fn default_rollback_window() -> Option<YearRange> {
    Some(DEFAULT_ROLLBACK_WINDOW)
}
#[cfg(feature = "serde")]
fn default_zscore_threshold() -> f64 {
    DEFAULT_ZSCORE_THRESHOLD
}
#[cfg(feature = "serde")]
fn default_iqr_multiplier() -> f64 {
    DEFAULT_IQR_MULTIPLIER
}
#[cfg(feature = "serde")]
fn default_master_flag_threshold() -> u32 {
    DEFAULT_MASTER_FLAG_THRESHOLD
}
#[cfg(feature = "serde")]
fn default_extrapolation_span() -> i32 {
    DEFAULT_EXTRAPOLATION_SPAN
}

impl Params {
    /// Defaults for every tunable; only the year bounds are caller-supplied.
    pub fn for_years(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year,
            end_year,
            rollback_window: Some(DEFAULT_ROLLBACK_WINDOW),
            zscore_threshold: DEFAULT_ZSCORE_THRESHOLD,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            master_flag_threshold: DEFAULT_MASTER_FLAG_THRESHOLD,
            extrapolation_span: DEFAULT_EXTRAPOLATION_SPAN,
            accept_negatives: false,
            negative_strategy: NegativeStrategy::Renormalize,
        }
    }

    pub fn year_range(&self) -> YearRange {
        YearRange { start: self.start_year, end: self.end_year }
    }

    /// Check parameter domains. Call once after loading.
    pub fn validate(&self) -> Result<(), CoreError> {
        YearRange::new(self.start_year, self.end_year)?;
        if let Some(w) = self.rollback_window {
            YearRange::new(w.start, w.end)?;
        }
        if !(self.zscore_threshold.is_finite() && self.zscore_threshold > 0.0) {
            return Err(CoreError::DomainOutOfRange("zscore_threshold"));
        }
        if !(self.iqr_multiplier.is_finite() && self.iqr_multiplier > 0.0) {
            return Err(CoreError::DomainOutOfRange("iqr_multiplier"));
        }
        if self.master_flag_threshold == 0 || self.master_flag_threshold > 3 {
            return Err(CoreError::DomainOutOfRange("master_flag_threshold"));
        }
        if self.extrapolation_span <= 0 {
            return Err(CoreError::DomainOutOfRange("extrapolation_span"));
        }
        Ok(())
    }
}
