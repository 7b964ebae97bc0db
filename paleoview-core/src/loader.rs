//! Loading monthly grids of gridded parameters.
//!
//! Grids come either from flat text files (one file per parameter, year and
//! month) or from the partitioned archives through an [`ArchiveHandleCache`].

use crate::archive::{download_intervals_required, ArchiveHandleCache};
use crate::errors::PaleoResult;
use crate::grid::{parse_grid_text, stack_grids, Grid, GridStack};
use crate::months::{month_name, month_years, rearrange_month_indices};
use crate::naming::grid_file_path;
use crate::parameters::ParameterId;
use crate::source::ByteSource;
use crate::time::{YearAD, YearPoint, YearSpan};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where gridded data is read from
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Flat monthly text files
    Flat,
    /// Archive files only
    Archive,
    /// Archives for parameters with any archive file present, flat files otherwise
    #[default]
    Auto,
}

#[derive(Debug)]
pub struct GridLoader {
    source: Arc<dyn ByteSource>,
    archives: ArchiveHandleCache,
    storage: StorageMode,
}

impl GridLoader {
    pub fn new(source: Arc<dyn ByteSource>, archives: ArchiveHandleCache, storage: StorageMode) -> Self {
        Self {
            source,
            archives,
            storage,
        }
    }

    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    pub fn set_storage(&mut self, storage: StorageMode) {
        self.storage = storage;
    }

    pub fn archives(&self) -> &ArchiveHandleCache {
        &self.archives
    }

    pub fn archives_mut(&mut self) -> &mut ArchiveHandleCache {
        &mut self.archives
    }

    /// Whether grids of `parameter` are currently read from archives
    pub fn uses_archive(&mut self, parameter: ParameterId) -> bool {
        match self.storage {
            StorageMode::Flat => false,
            StorageMode::Archive => true,
            StorageMode::Auto => self.archives.has_archives(parameter),
        }
    }

    /// Load one month of one year
    pub fn load_grid(&mut self, parameter: ParameterId, year_ad: YearAD, month_index: usize) -> PaleoResult<Grid> {
        parameter.grid_codes()?;
        if self.uses_archive(parameter) {
            self.archives.read_month(parameter, year_ad, month_index)
        } else {
            self.load_flat_grid(parameter, year_ad, month_index)
        }
    }

    fn load_flat_grid(&self, parameter: ParameterId, year_ad: YearAD, month_index: usize) -> PaleoResult<Grid> {
        let path = grid_file_path(parameter, year_ad, month_index)?;
        let what = format!(
            "{} data for {} {}",
            parameter.title(),
            month_name(month_index),
            YearPoint::from_year_ad(year_ad)
        );
        let text = self.source.read_to_string(&path, &what)?;
        parse_grid_text(&text, &self.source.locate(&path))
    }

    /// Load the selected months of a year, stacked in rearranged month order
    ///
    /// When the selection crosses the year boundary the late months are read
    /// from the previous year.
    pub fn load_grids(
        &mut self,
        parameter: ParameterId,
        year_ad: YearAD,
        month_indices: &[usize],
    ) -> PaleoResult<GridStack> {
        let ordered = rearrange_month_indices(month_indices);
        let grids = month_years(year_ad, &ordered)
            .into_iter()
            .map(|(year, month)| self.load_grid(parameter, year, month))
            .collect::<PaleoResult<Vec<Grid>>>()?;
        stack_grids(&grids)
    }

    /// Whether the flat file for one (parameter, year, month) exists
    pub fn flat_file_present(&self, parameter: ParameterId, year_ad: YearAD, month_index: usize) -> bool {
        grid_file_path(parameter, year_ad, month_index)
            .map(|path| self.source.exists(&path))
            .unwrap_or(false)
    }

    /// Whether data for `parameter` appears to be present for every download
    /// interval overlapping `span`
    ///
    /// Archives are checked by file; flat data by the January file of the
    /// middle year of each interval.
    pub fn data_present(&mut self, parameter: ParameterId, span: &YearSpan) -> bool {
        if self.uses_archive(parameter) {
            return self.archives.data_present(parameter, span);
        }
        download_intervals_required(span).iter().all(|interval| {
            let middle = (interval.from_ad + interval.until_ad).div_euclid(2);
            self.flat_file_present(parameter, middle, 0)
        })
    }

    /// Reset per-run state: refresh archive availability, and close every
    /// cached handle when `close_handles` is set
    pub fn begin_run(&mut self, close_handles: bool) {
        self.archives.refresh_available();
        if close_handles {
            self.archives.clear();
        }
    }
}
