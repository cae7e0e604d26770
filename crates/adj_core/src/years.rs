//! Canonical year sets and inclusive year ranges.
//!
//! `years_to_adjust` arrives in many shapes (blank, `NaN`, a scalar, a
//! bracketed or delimited list). [`YearSet::parse`] is the single
//! canonicalization entry point; downstream code only ever sees a set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

const NULL_MARKERS: [&str; 6] = ["nan", "none", "null", "na", "<na>", "nat"];

/// Ordered, de-duplicated set of years.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct YearSet(BTreeSet<i32>);

/// Direction of a year-by-year walk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    Up,
    Down,
}

impl YearSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Canonicalize a raw cell. Missing cells and null markers give the empty set.
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        let Some(raw) = raw else {
            return Ok(Self::new());
        };
        let cleaned: String = raw
            .chars()
            .map(|c| match c {
                '[' | ']' | '(' | ')' | '{' | '}' | '"' | '\'' => ' ',
                ',' | ';' | '|' => ' ',
                other => other,
            })
            .collect();

        let mut out = BTreeSet::new();
        for tok in cleaned.split_whitespace() {
            if NULL_MARKERS.contains(&tok.to_ascii_lowercase().as_str()) {
                continue;
            }
            out.insert(parse_year_token(tok)?);
        }
        Ok(Self(out))
    }

    pub fn insert(&mut self, year: i32) -> bool {
        self.0.insert(year)
    }

    pub fn contains(&self, year: i32) -> bool {
        self.0.contains(&year)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }

    /// Drop years outside `range`; returns the years that were removed.
    pub fn retain_within(&mut self, range: YearRange) -> Vec<i32> {
        let dropped: Vec<i32> = self.0.iter().copied().filter(|y| !range.contains(*y)).collect();
        self.0.retain(|y| range.contains(*y));
        dropped
    }

    /// Starting at `from`, step one year at a time until a year outside the set
    /// is reached. `None` once the walk passes `limit`.
    pub fn first_outside(&self, from: i32, limit: i32, step: Step) -> Option<i32> {
        let mut year = from;
        loop {
            let past_limit = match step {
                Step::Up => year > limit,
                Step::Down => year < limit,
            };
            if past_limit {
                return None;
            }
            if !self.contains(year) {
                return Some(year);
            }
            year = match step {
                Step::Up => year.checked_add(1)?,
                Step::Down => year.checked_sub(1)?,
            };
        }
    }
}

impl fmt::Display for YearSet {
    /// Comma-joined, ascending (`2010,2011`); empty set renders as an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for y in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{y}")?;
        }
        Ok(())
    }
}

impl FromStr for YearSet {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(Some(s))
    }
}

impl FromIterator<i32> for YearSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Accepts `2012` and integral floats such as `2012.0`.
fn parse_year_token(tok: &str) -> Result<i32, CoreError> {
    if let Ok(y) = tok.parse::<i32>() {
        return Ok(y);
    }
    match tok.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= i32::MAX as f64 => Ok(f as i32),
        _ => Err(CoreError::InvalidYear(tok.to_string())),
    }
}

/// Inclusive `[start, end]` range of years.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    #[inline]
    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(xs: &[i32]) -> YearSet {
        xs.iter().copied().collect()
    }

    #[test]
    fn parse_normalizes_every_shape() {
        assert_eq!(YearSet::parse(None).unwrap(), YearSet::new());
        assert_eq!(YearSet::parse(Some("")).unwrap(), YearSet::new());
        assert_eq!(YearSet::parse(Some("NaN")).unwrap(), YearSet::new());
        assert_eq!(YearSet::parse(Some("2012")).unwrap(), set(&[2012]));
        assert_eq!(YearSet::parse(Some("2012.0")).unwrap(), set(&[2012]));
        assert_eq!(YearSet::parse(Some("2011, 2010")).unwrap(), set(&[2010, 2011]));
        assert_eq!(YearSet::parse(Some("[2010, 2011, 2010]")).unwrap(), set(&[2010, 2011]));
        assert_eq!(YearSet::parse(Some("2010;2014")).unwrap(), set(&[2010, 2014]));
    }

    #[test]
    fn parse_rejects_non_year_tokens() {
        let err = YearSet::parse(Some("2010,abc")).unwrap_err();
        assert_eq!(err, CoreError::InvalidYear("abc".into()));
        assert!(YearSet::parse(Some("2010.5")).is_err());
    }

    #[test]
    fn display_is_sorted_csv() {
        assert_eq!(set(&[2014, 2010]).to_string(), "2010,2014");
        assert_eq!(YearSet::new().to_string(), "");
    }

    #[test]
    fn first_outside_walks_past_flagged_years() {
        let flagged = set(&[2010, 2011]);
        assert_eq!(flagged.first_outside(2010, 2015, Step::Up), Some(2012));
        assert_eq!(flagged.first_outside(2011, 2005, Step::Down), Some(2009));
        assert_eq!(flagged.first_outside(2012, 2015, Step::Up), Some(2012));
        assert_eq!(flagged.first_outside(2010, 2011, Step::Up), None);
        assert_eq!(flagged.first_outside(2011, 2010, Step::Down), None);
    }

    #[test]
    fn retain_within_reports_dropped_years() {
        let mut s = set(&[1995, 2010, 2030]);
        let dropped = s.retain_within(YearRange::new(2000, 2020).unwrap());
        assert_eq!(dropped, vec![1995, 2030]);
        assert_eq!(s, set(&[2010]));
    }

    #[test]
    fn range_is_inclusive() {
        let r = YearRange::new(2010, 2014).unwrap();
        assert!(r.contains(2010) && r.contains(2014));
        assert!(!r.contains(2015));
        assert!(YearRange::new(2015, 2010).is_err());
    }
}
