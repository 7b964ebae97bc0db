//! Region masks and region statistics of grid series.

use crate::errors::{PaleoError, PaleoResult};
use crate::grid::{area_weights, parse_mask_text, Grid, GRID_HEIGHT, GRID_WIDTH};
use crate::naming::{region_mask_path, time_dependent_mask_path};
use crate::source::ByteSource;
use crate::time::{YearAD, PIVOT_YEAR_AD};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Oldest snapshot of a time-dependent mask, in years BP
pub const MASK_OLDEST_YEARS_BP: u32 = 21000;
/// Years between snapshots of a time-dependent mask
pub const MASK_STEP_YEARS: u32 = 100;

/// Snapshot key of the time-dependent mask nearest to a year BP
///
/// ```rust
/// use paleoview_core::region::nearest_mask_year;
///
/// assert_eq!(nearest_mask_year(149), 100);
/// assert_eq!(nearest_mask_year(150), 200);
/// assert_eq!(nearest_mask_year(-39), 0);
/// assert_eq!(nearest_mask_year(21950), 21000);
/// ```
pub fn nearest_mask_year(years_bp: i32) -> u32 {
    if years_bp > MASK_OLDEST_YEARS_BP as i32 {
        return MASK_OLDEST_YEARS_BP;
    }
    let years_bp = years_bp.max(0) as f64;
    ((years_bp / MASK_STEP_YEARS as f64).round() as u32) * MASK_STEP_YEARS
}

/// Cells selected for aggregation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMask {
    Fixed(Grid),
    /// Snapshots keyed by years BP (0 to 21000 in steps of 100)
    TimeDependent(BTreeMap<u32, Grid>),
}

impl RegionMask {
    /// Every cell of the globe
    pub fn global() -> Self {
        RegionMask::Fixed(Grid::ones((GRID_HEIGHT, GRID_WIDTH)))
    }

    /// Load `<code>.msk`
    pub fn load(source: &dyn ByteSource, region_code: &str) -> PaleoResult<Self> {
        let path = region_mask_path(region_code);
        let text = source.read_to_string(&path, &format!("region mask {region_code}"))?;
        Ok(RegionMask::Fixed(parse_mask_text(&text, &source.locate(&path))?))
    }

    /// Load every snapshot of a time-dependent mask
    pub fn load_time_dependent(source: &dyn ByteSource, region_code: &str) -> PaleoResult<Self> {
        let mut snapshots = BTreeMap::new();
        for years_bp in (0..=MASK_OLDEST_YEARS_BP).step_by(MASK_STEP_YEARS as usize) {
            let path = time_dependent_mask_path(region_code, years_bp);
            let text = source.read_to_string(
                &path,
                &format!("region mask {region_code} for {years_bp}BP"),
            )?;
            snapshots.insert(years_bp, parse_mask_text(&text, &source.locate(&path))?);
        }
        Ok(RegionMask::TimeDependent(snapshots))
    }

    /// Mask applying to an interval centred on `center_year_ad`
    pub fn for_year(&self, center_year_ad: YearAD) -> PaleoResult<&Grid> {
        match self {
            RegionMask::Fixed(mask) => Ok(mask),
            RegionMask::TimeDependent(snapshots) => {
                let key = nearest_mask_year(PIVOT_YEAR_AD.saturating_sub(center_year_ad));
                snapshots.get(&key).ok_or_else(|| {
                    PaleoError::not_found(format!("{key}BP"), "time-dependent region mask snapshot")
                })
            }
        }
    }
}

/// Statistics of one grid over one region
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridStatistics {
    pub minimum: f64,
    pub percentile_5th: f64,
    pub percentile_25th: f64,
    pub percentile_50th: f64,
    pub percentile_75th: f64,
    pub percentile_95th: f64,
    pub maximum: f64,
    pub grid_mean: f64,
    pub grid_stdev: f64,
    pub area_mean: f64,
    pub area_stdev: f64,
}

impl GridStatistics {
    fn empty() -> Self {
        Self {
            minimum: f64::NAN,
            percentile_5th: f64::NAN,
            percentile_25th: f64::NAN,
            percentile_50th: f64::NAN,
            percentile_75th: f64::NAN,
            percentile_95th: f64::NAN,
            maximum: f64::NAN,
            grid_mean: f64::NAN,
            grid_stdev: f64::NAN,
            area_mean: f64::NAN,
            area_stdev: f64::NAN,
        }
    }

    /// Statistics of the finite cells of `grid` where `mask` is non-zero
    ///
    /// Area statistics weight each cell by its mask value times the cosine of
    /// its latitude. An empty selection gives NaN everywhere.
    pub fn compute(grid: &Grid, mask: &Grid) -> PaleoResult<Self> {
        if grid.dim() != (GRID_HEIGHT, GRID_WIDTH) || mask.dim() != grid.dim() {
            return Err(PaleoError::InvalidRequest(format!(
                "region statistics need {GRID_HEIGHT}x{GRID_WIDTH} grids, got {:?} with mask {:?}",
                grid.dim(),
                mask.dim()
            )));
        }

        let weights = area_weights();
        let mut values = Vec::new();
        let mut weighted = Vec::new();
        Zip::from(grid).and(mask).and(&weights).for_each(|value, selected, weight| {
            if value.is_finite() && *selected != 0.0 {
                values.push(*value);
                weighted.push((*value, selected * weight));
            }
        });
        if values.is_empty() {
            return Ok(Self::empty());
        }

        values.sort_by(f64::total_cmp);
        let count = values.len() as f64;
        let grid_mean = values.iter().sum::<f64>() / count;
        let grid_stdev = (values.iter().map(|v| (v - grid_mean).powi(2)).sum::<f64>() / count).sqrt();

        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        let area_mean = weighted.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight;
        let area_stdev = (weighted
            .iter()
            .map(|(v, w)| (area_mean - v).powi(2) * w)
            .sum::<f64>()
            / total_weight)
            .sqrt();

        Ok(Self {
            minimum: values[0],
            percentile_5th: percentile(&values, 5.0),
            percentile_25th: percentile(&values, 25.0),
            percentile_50th: percentile(&values, 50.0),
            percentile_75th: percentile(&values, 75.0),
            percentile_95th: percentile(&values, 95.0),
            maximum: values[values.len() - 1],
            grid_mean,
            grid_stdev,
            area_mean,
            area_stdev,
        })
    }
}

/// Percentile of sorted values, interpolating linearly between ranks
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// One time-ordered series per statistic
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionStatistics {
    pub minimum: Vec<f64>,
    pub percentile_5th: Vec<f64>,
    pub percentile_25th: Vec<f64>,
    pub percentile_50th: Vec<f64>,
    pub percentile_75th: Vec<f64>,
    pub percentile_95th: Vec<f64>,
    pub maximum: Vec<f64>,
    pub grid_mean: Vec<f64>,
    pub grid_stdev: Vec<f64>,
    pub area_mean: Vec<f64>,
    pub area_stdev: Vec<f64>,
}

impl RegionStatistics {
    pub const NAMES: [&'static str; 11] = [
        "minimum",
        "percentile_5th",
        "percentile_25th",
        "percentile_50th",
        "percentile_75th",
        "percentile_95th",
        "maximum",
        "grid_mean",
        "grid_stdev",
        "area_mean",
        "area_stdev",
    ];

    pub fn push(&mut self, entry: GridStatistics) {
        self.minimum.push(entry.minimum);
        self.percentile_5th.push(entry.percentile_5th);
        self.percentile_25th.push(entry.percentile_25th);
        self.percentile_50th.push(entry.percentile_50th);
        self.percentile_75th.push(entry.percentile_75th);
        self.percentile_95th.push(entry.percentile_95th);
        self.maximum.push(entry.maximum);
        self.grid_mean.push(entry.grid_mean);
        self.grid_stdev.push(entry.grid_stdev);
        self.area_mean.push(entry.area_mean);
        self.area_stdev.push(entry.area_stdev);
    }

    pub fn len(&self) -> usize {
        self.minimum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minimum.is_empty()
    }

    /// Series of a statistic by name
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        let series = match name {
            "minimum" => &self.minimum,
            "percentile_5th" => &self.percentile_5th,
            "percentile_25th" => &self.percentile_25th,
            "percentile_50th" => &self.percentile_50th,
            "percentile_75th" => &self.percentile_75th,
            "percentile_95th" => &self.percentile_95th,
            "maximum" => &self.maximum,
            "grid_mean" => &self.grid_mean,
            "grid_stdev" => &self.grid_stdev,
            "area_mean" => &self.area_mean,
            "area_stdev" => &self.area_stdev,
            _ => return None,
        };
        Some(series)
    }
}

/// Statistics of each grid over its paired mask
pub fn region_statistics(grids: &[Grid], masks: &[&Grid]) -> PaleoResult<RegionStatistics> {
    if grids.len() != masks.len() {
        return Err(PaleoError::InvalidRequest(format!(
            "{} grids but {} region masks",
            grids.len(),
            masks.len()
        )));
    }
    let mut statistics = RegionStatistics::default();
    for (grid, mask) in grids.iter().zip(masks) {
        statistics.push(GridStatistics::compute(grid, mask)?);
    }
    Ok(statistics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    #[test]
    fn nearest_snapshots() {
        assert_eq!(nearest_mask_year(0), 0);
        assert_eq!(nearest_mask_year(21001), 21000);
        assert_eq!(nearest_mask_year(20990), 21000);
        assert_eq!(nearest_mask_year(1234), 1200);
    }

    #[test]
    fn extreme_centres_use_end_snapshots() {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(0, Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), 1.0));
        snapshots.insert(MASK_OLDEST_YEARS_BP, Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), 2.0));
        let mask = RegionMask::TimeDependent(snapshots);
        assert_eq!(mask.for_year(YearAD::MIN).unwrap()[[0, 0]], 2.0);
        assert_eq!(mask.for_year(YearAD::MAX).unwrap()[[0, 0]], 1.0);
    }

    #[test]
    fn percentiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_relative_eq!(percentile(&sorted, 5.0), 1.2);
        assert_relative_eq!(percentile(&sorted, 95.0), 4.8);
        assert_eq!(percentile(&[7.0], 25.0), 7.0);
        assert!(percentile(&[], 25.0).is_nan());
    }

    #[test]
    fn uniform_band_has_exact_area_statistics() {
        let grid = Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), 3.25);
        let mut mask = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        mask.slice_mut(ndarray::s![2..20, 10..50]).fill(1.0);

        let statistics = GridStatistics::compute(&grid, &mask).unwrap();
        assert_relative_eq!(statistics.area_mean, 3.25, epsilon = 1e-12);
        assert_relative_eq!(statistics.area_stdev, 0.0, epsilon = 1e-12);
        assert_eq!(statistics.minimum, 3.25);
        assert_eq!(statistics.percentile_95th, 3.25);
    }

    #[test]
    fn statistics_ignore_non_finite_cells() {
        let mut grid = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        let mut mask = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        for (col, value) in [1.0, 2.0, 3.0, 4.0, f64::NAN, f64::INFINITY].iter().enumerate() {
            grid[[36, col]] = *value;
            mask[[36, col]] = 1.0;
        }

        let statistics = GridStatistics::compute(&grid, &mask).unwrap();
        assert_eq!(statistics.minimum, 1.0);
        assert_eq!(statistics.maximum, 4.0);
        assert_eq!(statistics.grid_mean, 2.5);
        assert_relative_eq!(statistics.grid_stdev, 1.25f64.sqrt());
        assert_relative_eq!(statistics.percentile_50th, 2.5);
        // A single latitude row gives equal weights
        assert_relative_eq!(statistics.area_mean, 2.5, epsilon = 1e-12);
        assert_relative_eq!(statistics.area_stdev, 1.25f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn area_mean_favours_low_latitudes() {
        let mut grid = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        grid.row_mut(36).fill(10.0);
        let mut mask = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        mask.row_mut(0).fill(1.0);
        mask.row_mut(36).fill(1.0);

        let statistics = GridStatistics::compute(&grid, &mask).unwrap();
        assert_eq!(statistics.grid_mean, 5.0);
        assert!(statistics.area_mean > 9.0);
    }

    #[test]
    fn empty_region_is_nan() {
        let grid = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        let mask = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
        let statistics = GridStatistics::compute(&grid, &mask).unwrap();
        assert!(statistics.area_mean.is_nan());
        assert!(statistics.minimum.is_nan());
    }

    #[test]
    fn series_per_statistic() {
        let grids = vec![
            Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), 1.0),
            Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), 2.0),
        ];
        let global = RegionMask::global();
        let mask = global.for_year(1900).unwrap();
        let statistics = region_statistics(&grids, &[mask, mask]).unwrap();
        assert_eq!(statistics.len(), 2);
        for name in RegionStatistics::NAMES {
            assert_eq!(statistics.series(name).unwrap().len(), 2);
        }
        assert_eq!(statistics.series("grid_mean").unwrap(), &[1.0, 2.0]);
        assert!(statistics.series("median").is_none());
        assert!(region_statistics(&grids, &[mask]).is_err());
    }

    /// Serves one mask for every path and records the paths asked for
    #[derive(Debug, Default)]
    struct RecordingMasks {
        paths: Mutex<Vec<String>>,
    }

    impl ByteSource for RecordingMasks {
        fn locate(&self, relative: &str) -> String {
            format!("memory://masks/{relative}")
        }

        fn exists(&self, _relative: &str) -> bool {
            true
        }

        fn read(&self, relative: &str, _what: &str) -> PaleoResult<Vec<u8>> {
            self.paths.lock().unwrap().push(relative.to_string());
            let years_bp: u32 = relative
                .rsplit('-')
                .next()
                .and_then(|name| name.strip_suffix("BP.msk"))
                .and_then(|digits| digits.parse().ok())
                .unwrap_or(0);
            // Snapshots older than 10000BP select one more row
            let rows = if years_bp > 10000 { 2 } else { 1 };
            let mut lines = vec!["0".repeat(GRID_WIDTH); GRID_HEIGHT];
            for line in lines.iter_mut().take(rows) {
                *line = "1".repeat(GRID_WIDTH);
            }
            Ok(lines.join("\n").into_bytes())
        }
    }

    #[test]
    fn loads_time_dependent_masks() {
        let source = RecordingMasks::default();
        let mask = RegionMask::load_time_dependent(&source, "land-0-21KBP").unwrap();

        let paths = source.paths.lock().unwrap();
        assert_eq!(paths.len(), 211);
        assert_eq!(paths[0], "land-0-21KBP/land-0BP.msk");
        assert_eq!(paths[210], "land-0-21KBP/land-21000BP.msk");
        drop(paths);

        assert_eq!(mask.for_year(1900).unwrap().sum(), GRID_WIDTH as f64);
        assert_eq!(mask.for_year(-15000).unwrap().sum(), 2.0 * GRID_WIDTH as f64);
        assert_eq!(mask.for_year(-30000).unwrap().sum(), 2.0 * GRID_WIDTH as f64);
    }

    #[test]
    fn loads_fixed_mask() {
        let source = RecordingMasks::default();
        let mask = RegionMask::load(&source, "globe").unwrap();
        assert_eq!(source.paths.lock().unwrap()[0], "globe.msk");
        assert!(matches!(mask, RegionMask::Fixed(_)));
    }
}
