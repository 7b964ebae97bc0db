//! Partitioned binary archives of gridded climate data.
//!
//! Each gridded parameter is stored as one archive per download interval. An
//! archive covers its interval widened by an overlap window and is split into
//! sub-interval groups of roughly 1000 years. Each group holds one record per
//! year, named by the year's label (e.g. `"5000BP"`), shaped
//! `[12 months][72][144]`.
//!
//! Reading is delegated to an [`ArchiveBackend`]. The [`memory`] backend is
//! always available; the [`netcdf`] backend requires the `netcdf` cargo feature.

pub mod cache;
pub mod memory;
#[cfg(feature = "netcdf")]
pub mod netcdf;

use crate::errors::PaleoResult;
use crate::grid::Grid;
use crate::time::{YearAD, YearSpan, PIVOT_YEAR_AD};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use cache::ArchiveHandleCache;
pub use memory::{MemoryArchive, MemoryArchiveStore};

/// The four fixed download intervals, oldest first
pub const DOWNLOAD_INTERVALS: [YearSpan; 4] = [
    // 22000BP-15000BP
    YearSpan {
        from_ad: -20050,
        until_ad: -13050,
    },
    // 15000BP-10000BP
    YearSpan {
        from_ad: -13050,
        until_ad: -8050,
    },
    // 10000BP-5000BP
    YearSpan {
        from_ad: -8050,
        until_ad: -3050,
    },
    // 5000BP-1989AD
    YearSpan {
        from_ad: -3050,
        until_ad: 1989,
    },
];

/// Default number of years each archive extends beyond its download interval
pub const DEFAULT_OVERLAP_WINDOW: u32 = 100;

const SUB_INTERVAL_YEARS: YearAD = 1000;

/// Descriptive metadata stored alongside an archive's records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub conventions: String,
    pub title: String,
    pub description: String,
    /// Overlap window the archive was produced with
    pub window: u32,
    /// Field width of the source text values
    pub width: u32,
    /// Decimal precision of the source text values
    pub decimals: u32,
}

impl Default for ArchiveMetadata {
    fn default() -> Self {
        Self {
            conventions: "CF-1.6".to_string(),
            title: String::new(),
            description: String::new(),
            window: DEFAULT_OVERLAP_WINDOW,
            width: 7,
            decimals: 3,
        }
    }
}

/// An open archive file
pub trait ArchiveReader: fmt::Debug {
    fn metadata(&self) -> &ArchiveMetadata;

    /// Sub-interval group labels in stored order
    fn sub_intervals(&self) -> Vec<String>;

    /// Read one month of a year record
    ///
    /// Returns `Ok(None)` when the group or record is not present.
    fn read_month(&self, sub_interval: &str, record: &str, month_index: usize)
        -> PaleoResult<Option<Grid>>;
}

/// Locates and opens archive files by key (see [`archive_key`](crate::naming::archive_key))
pub trait ArchiveBackend: fmt::Debug {
    /// Full location of an archive key, used in errors
    fn locate(&self, key: &str) -> String;

    fn exists(&self, key: &str) -> bool;

    fn open(&self, key: &str) -> PaleoResult<Box<dyn ArchiveReader>>;
}

/// Download intervals overlapping a span of years
pub fn download_intervals_required(span: &YearSpan) -> Vec<YearSpan> {
    DOWNLOAD_INTERVALS
        .iter()
        .filter(|interval| interval.overlaps(span))
        .copied()
        .collect()
}

/// Sub-interval groups an archive for `interval` is partitioned into
///
/// The archive span is the interval widened by `window` years. It is split at
/// every multiple of 1000 years BP, and any part after 1950 forms a final group
/// starting at 1951AD. Groups share their boundary years.
///
/// ```rust
/// use paleoview_core::archive::{sub_interval_plan, DOWNLOAD_INTERVALS};
///
/// let labels: Vec<String> = sub_interval_plan(&DOWNLOAD_INTERVALS[3], 100)
///     .iter()
///     .map(|span| span.label())
///     .collect();
/// assert_eq!(labels.first().unwrap(), "5100BP-5000BP");
/// assert_eq!(labels.last().unwrap(), "1951AD-1989AD");
/// ```
pub fn sub_interval_plan(interval: &YearSpan, window: u32) -> Vec<YearSpan> {
    let span = interval.expanded(window);
    let (from_ad, until_ad) = (span.from_ad, span.until_ad);

    let oldest_bp = (PIVOT_YEAR_AD - from_ad).div_euclid(SUB_INTERVAL_YEARS) * SUB_INTERVAL_YEARS;
    let youngest_bp = PIVOT_YEAR_AD - until_ad;

    let mut boundaries = Vec::new();
    let mut years_bp = oldest_bp;
    while years_bp >= youngest_bp {
        boundaries.push(PIVOT_YEAR_AD - years_bp);
        years_bp -= SUB_INTERVAL_YEARS;
    }
    if boundaries.first() == Some(&from_ad) {
        boundaries.remove(0);
    }

    let mut starts = vec![from_ad];
    starts.extend_from_slice(&boundaries);
    let mut ends = boundaries;
    if ends.last() == Some(&until_ad) {
        ends.pop();
    }
    ends.push(until_ad);

    if from_ad < PIVOT_YEAR_AD && until_ad > PIVOT_YEAR_AD {
        if let Some(last) = starts.last_mut() {
            *last = PIVOT_YEAR_AD + 1;
        }
    }

    starts
        .into_iter()
        .zip(ends)
        .map(|(from, until)| YearSpan::new(from, until))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{EARLIEST_YEAR_AD, LATEST_YEAR_AD};

    #[test]
    fn download_intervals_cover_dataset() {
        assert_eq!(DOWNLOAD_INTERVALS[0].from_ad, EARLIEST_YEAR_AD);
        assert_eq!(DOWNLOAD_INTERVALS[3].until_ad, LATEST_YEAR_AD);
        for pair in DOWNLOAD_INTERVALS.windows(2) {
            assert_eq!(pair[0].until_ad, pair[1].from_ad);
        }
        let labels: Vec<String> = DOWNLOAD_INTERVALS.iter().map(|i| i.label()).collect();
        assert_eq!(
            labels,
            vec!["22000BP-15000BP", "15000BP-10000BP", "10000BP-5000BP", "5000BP-1989AD"]
        );
    }

    #[test]
    fn required_intervals() {
        let required = download_intervals_required(&YearSpan::new(1900, 1989));
        assert_eq!(required, vec![DOWNLOAD_INTERVALS[3]]);

        let required = download_intervals_required(&YearSpan::new(-9000, -4000));
        assert_eq!(required, vec![DOWNLOAD_INTERVALS[1], DOWNLOAD_INTERVALS[2]]);

        let all = download_intervals_required(&YearSpan::new(EARLIEST_YEAR_AD, LATEST_YEAR_AD));
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn plan_for_recent_interval() {
        let plan = sub_interval_plan(&DOWNLOAD_INTERVALS[3], 100);
        let labels: Vec<String> = plan.iter().map(|s| s.label()).collect();
        assert_eq!(
            labels,
            vec![
                "5100BP-5000BP",
                "5000BP-4000BP",
                "4000BP-3000BP",
                "3000BP-2000BP",
                "2000BP-1000BP",
                "1000BP-0BP",
                "1951AD-1989AD",
            ]
        );
    }

    #[test]
    fn plan_for_oldest_interval() {
        let plan = sub_interval_plan(&DOWNLOAD_INTERVALS[0], 100);
        assert_eq!(plan.len(), 8);
        assert_eq!(plan[0].label(), "22000BP-21000BP");
        assert_eq!(plan[7].label(), "15000BP-14900BP");
    }

    #[test]
    fn plan_covers_every_year() {
        for interval in DOWNLOAD_INTERVALS.iter() {
            let expanded = interval.expanded(100);
            let plan = sub_interval_plan(interval, 100);
            for year in expanded.years() {
                assert!(plan.iter().any(|s| s.contains(year)), "{year} not covered");
            }
        }
    }
}
