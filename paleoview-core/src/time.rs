//! Year representations used throughout the dataset.
//!
//! Every year is labelled either "Before Present" (years before 1950) or
//! "Anno Domini". Internally all arithmetic is done on signed AD years; the
//! labelled [`YearPoint`] form is only used to build file names, archive keys
//! and record names.
//!
//! Year 1950 AD is canonically represented as `0BP`. Every conversion from an
//! AD year goes through [`YearPoint::from_year_ad`] so the rule is applied
//! uniformly.
//!
//! ```rust
//! use paleoview_core::time::{Era, YearPoint};
//!
//! let year = YearPoint::from_year_ad(1940);
//! assert_eq!(year.era, Era::BP);
//! assert_eq!(year.label(), "10BP");
//! assert_eq!(YearPoint::from_year_ad(1950).label(), "0BP");
//! assert_eq!(YearPoint::from_year_ad(1951).label(), "1951AD");
//! ```

use crate::errors::{PaleoError, PaleoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signed calendar year (negative values are BC)
pub type YearAD = i32;

/// The shared pivot year: `0BP == 1950AD`
pub const PIVOT_YEAR_AD: YearAD = 1950;
/// Oldest year held by the dataset (22000BP)
pub const EARLIEST_YEAR_AD: YearAD = PIVOT_YEAR_AD - 22000;
/// Most recent year held by the dataset
pub const LATEST_YEAR_AD: YearAD = 1989;

/// Era used to label a year
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Era {
    /// Before Present (before 1950)
    BP,
    /// Anno Domini
    AD,
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Era::BP => write!(f, "BP"),
            Era::AD => write!(f, "AD"),
        }
    }
}

impl FromStr for Era {
    type Err = PaleoError;

    fn from_str(s: &str) -> PaleoResult<Self> {
        match s {
            "BP" => Ok(Era::BP),
            "AD" => Ok(Era::AD),
            other => Err(PaleoError::InvalidRequest(format!(
                "unknown era '{other}', expected BP or AD"
            ))),
        }
    }
}

/// A year expressed as a magnitude within an era
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearPoint {
    pub magnitude: u32,
    pub era: Era,
}

impl YearPoint {
    pub fn new(magnitude: u32, era: Era) -> Self {
        Self { magnitude, era }
    }

    /// Canonical labelled form of an AD year (1950 and earlier are BP)
    pub fn from_year_ad(year_ad: YearAD) -> Self {
        if year_ad > PIVOT_YEAR_AD {
            Self::new(year_ad as u32, Era::AD)
        } else {
            Self::new(PIVOT_YEAR_AD.abs_diff(year_ad), Era::BP)
        }
    }

    pub fn year_ad(&self) -> YearAD {
        match self.era {
            Era::BP => PIVOT_YEAR_AD.saturating_sub_unsigned(self.magnitude),
            Era::AD => YearAD::try_from(self.magnitude).unwrap_or(YearAD::MAX),
        }
    }

    /// Label in the `<magnitude><era>` form used by files and archive records
    pub fn label(&self) -> String {
        format!("{}{}", self.magnitude, self.era)
    }

    /// Whether the year lies within the magnitudes valid for its era
    pub fn is_valid(&self) -> bool {
        match self.era {
            Era::BP => self.magnitude <= (PIVOT_YEAR_AD - EARLIEST_YEAR_AD) as u32,
            Era::AD => (1..=LATEST_YEAR_AD as u32).contains(&self.magnitude),
        }
    }
}

impl fmt::Display for YearPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.era)
    }
}

impl FromStr for YearPoint {
    type Err = PaleoError;

    fn from_str(s: &str) -> PaleoResult<Self> {
        let s = s.trim();
        if s.len() < 3 || !s.is_char_boundary(s.len() - 2) {
            return Err(PaleoError::InvalidRequest(format!(
                "invalid year label '{s}'"
            )));
        }
        let (digits, era) = s.split_at(s.len() - 2);
        let magnitude = digits
            .parse::<u32>()
            .map_err(|e| PaleoError::InvalidRequest(format!("invalid year label '{s}': {e}")))?;
        Ok(Self::new(magnitude, era.parse()?))
    }
}

/// An inclusive span of AD years
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearSpan {
    pub from_ad: YearAD,
    pub until_ad: YearAD,
}

impl YearSpan {
    pub fn new(from_ad: YearAD, until_ad: YearAD) -> Self {
        Self { from_ad, until_ad }
    }

    pub fn contains(&self, year_ad: YearAD) -> bool {
        self.from_ad <= year_ad && year_ad <= self.until_ad
    }

    pub fn overlaps(&self, other: &YearSpan) -> bool {
        self.from_ad <= other.until_ad && other.from_ad <= self.until_ad
    }

    pub fn len(&self) -> usize {
        if self.until_ad < self.from_ad {
            0
        } else {
            self.until_ad.abs_diff(self.from_ad) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn years(&self) -> impl Iterator<Item = YearAD> {
        self.from_ad..=self.until_ad
    }

    /// Widen both ends by `window` years, clamped to the dataset range
    pub fn expanded(&self, window: u32) -> Self {
        let window = YearAD::try_from(window).unwrap_or(YearAD::MAX);
        Self {
            from_ad: self.from_ad.saturating_sub(window).max(EARLIEST_YEAR_AD),
            until_ad: self.until_ad.saturating_add(window).min(LATEST_YEAR_AD),
        }
    }

    /// The span centred on `center` for an interval of `size` years
    ///
    /// `size / 2` years lie before the centre and `size - size / 2 - 1` after it,
    /// so an even size of 10 centred on 1985 covers 1980..=1989.
    pub fn centered(center: YearAD, size: u32) -> Self {
        let before = YearAD::try_from(size / 2).unwrap_or(YearAD::MAX);
        let after = YearAD::try_from(size - size / 2).unwrap_or(YearAD::MAX) - 1;
        Self::new(center.saturating_sub(before), center.saturating_add(after))
    }

    /// Label of the form `<from>-<until>`, e.g. `5000BP-1989AD`
    pub fn label(&self) -> String {
        format!(
            "{}-{}",
            YearPoint::from_year_ad(self.from_ad),
            YearPoint::from_year_ad(self.until_ad)
        )
    }
}

impl fmt::Display for YearSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for YearSpan {
    type Err = PaleoError;

    fn from_str(s: &str) -> PaleoResult<Self> {
        let (from, until) = s
            .split_once('-')
            .ok_or_else(|| PaleoError::InvalidRequest(format!("invalid interval label '{s}'")))?;
        let from: YearPoint = from.parse()?;
        let until: YearPoint = until.parse()?;
        Ok(Self::new(from.year_ad(), until.year_ad()))
    }
}
