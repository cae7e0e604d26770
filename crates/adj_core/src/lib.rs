//! adj_core: Core types for the household income adjustment engine.
//!
//! This crate is **I/O-free**. It defines the stable types shared across the
//! engine (`adj_io`, `adj_algo`, `adj_pipeline`, `adj_cli`).
//!
//! - Area and transaction codes: `EntityCode`, `GroupCode`, `TransactionCode`
//! - Canonical year sets and inclusive year ranges
//! - Engine parameters (`Params`) with safe defaults
//! - The long-format row model (`SeriesRow`, `Panel`) and its keys
//!
//! Serialization derives are gated behind the `serde` feature.

#![forbid(unsafe_code)]

pub mod panel;
pub mod variables;
pub mod years;

/// Absolute tolerance for every `(group, year)` sum check in the apportionment chain.
pub const SUM_TOLERANCE: f64 = 1e-6;

pub mod errors {
    use core::fmt;

    /// Error set for core-domain validation & parsing.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum CoreError {
        InvalidToken(String),
        InvalidYear(String),
        InvalidFlag(String),
        EmptyRange { start: i32, end: i32 },
        DomainOutOfRange(&'static str),
    }

    impl fmt::Display for CoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CoreError::InvalidToken(s) => write!(f, "invalid code: {s:?}"),
                CoreError::InvalidYear(s) => write!(f, "invalid year token: {s:?}"),
                CoreError::InvalidFlag(s) => write!(f, "invalid boolean flag: {s:?}"),
                CoreError::EmptyRange { start, end } => {
                    write!(f, "year range is empty: start {start} > end {end}")
                }
                CoreError::DomainOutOfRange(k) => write!(f, "domain out of range: {k}"),
            }
        }
    }

    impl std::error::Error for CoreError {}
}

pub mod tokens {
    //! Area/transaction code types with a strict charset.

    use crate::errors::CoreError;
    use core::fmt;
    use core::str::FromStr;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    fn is_token(s: &str) -> bool {
        let len = s.len();
        if !(1..=64).contains(&len) {
            return false;
        }
        s.bytes().all(|b| {
            matches!(b,
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' |
                b'_' | b'-' | b':' | b'.'
            )
        })
    }

    macro_rules! def_token {
        ($(#[$m:meta])* $name:ident) => {
            $(#[$m])*
            #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
            #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
            #[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
            pub struct $name(String);

            impl $name {
                pub fn as_str(&self) -> &str { &self.0 }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
            }

            impl FromStr for $name {
                type Err = CoreError;
                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    let s = s.trim();
                    if is_token(s) { Ok(Self(s.to_string())) } else { Err(CoreError::InvalidToken(s.to_string())) }
                }
            }

            impl TryFrom<String> for $name {
                type Error = CoreError;
                fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
            }

            impl From<$name> for String {
                fn from(v: $name) -> String { v.0 }
            }
        };
    }

    def_token!(
        /// Lowest-level geography carrying one time series (e.g. `E01000001`).
        EntityCode
    );
    def_token!(
        /// Aggregation unit whose per-year total is invariant under adjustment.
        GroupCode
    );
    def_token!(
        /// Categorical sub-series selector (e.g. `D623`).
        TransactionCode
    );

    impl GroupCode {
        pub fn starts_with_any(&self, prefixes: &[String]) -> bool {
            prefixes.iter().any(|p| self.0.starts_with(p.as_str()))
        }
    }

    /// Parse a boolean-ish cell: `true/yes/y/1` and `false/no/n/0`; blank is `false`.
    pub fn parse_flag(raw: &str) -> Result<bool, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => Ok(true),
            "" | "false" | "f" | "no" | "n" | "0" | "0.0" | "nan" => Ok(false),
            _ => Err(CoreError::InvalidFlag(raw.to_string())),
        }
    }

}

pub use errors::CoreError;
pub use panel::{
    Apportionment, Constraint, ImputeMethod, Imputation, IqrBounds, MasterFlags, Metric,
    MetricScores, NegativeTrace, Panel, PartitionKey, Scores, SeriesKey, SeriesRow,
};
pub use tokens::{parse_flag, EntityCode, GroupCode, TransactionCode};
pub use variables::{NegativeStrategy, Params};
pub use years::{Step, YearRange, YearSet};
