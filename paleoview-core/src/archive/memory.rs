//! Archives held in memory.
//!
//! Used when no NetCDF library is available, and to assemble archives from the
//! flat text files of a download interval.

use super::{sub_interval_plan, ArchiveBackend, ArchiveMetadata, ArchiveReader};
use crate::errors::{PaleoError, PaleoResult};
use crate::grid::{parse_grid_text, stack_grids, Grid, GridStack, GRID_HEIGHT, GRID_WIDTH};
use crate::months::{all_months, MONTHS_PER_YEAR};
use crate::naming::{archive_record_name, grid_file_path, resolve_url};
use crate::parameters::ParameterId;
use crate::source::ByteSource;
use crate::time::YearSpan;
use log::debug;
use ndarray::Axis;
use std::collections::HashMap;
use std::sync::Arc;

/// One archive file: ordered sub-interval groups of per-year records
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    metadata: ArchiveMetadata,
    groups: Vec<(String, HashMap<String, GridStack>)>,
}

impl MemoryArchive {
    pub fn new(metadata: ArchiveMetadata) -> Self {
        Self {
            metadata,
            groups: Vec::new(),
        }
    }

    /// Append a group, or replace the records of an existing group with the same label
    pub fn insert_group(&mut self, label: String, records: Vec<(String, GridStack)>) {
        let records: HashMap<String, GridStack> = records.into_iter().collect();
        match self.groups.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, existing)) => *existing = records,
            None => self.groups.push((label, records)),
        }
    }

    pub fn insert_record(&mut self, group: &str, record: String, months: GridStack) {
        match self.groups.iter_mut().find(|(label, _)| label == group) {
            Some((_, records)) => {
                records.insert(record, months);
            }
            None => self
                .groups
                .push((group.to_string(), HashMap::from([(record, months)]))),
        }
    }

    /// Build the archive of one download interval from flat monthly grid files
    ///
    /// Every year of the interval, widened by `window`, must have all twelve
    /// monthly files present.
    pub fn from_flat_files(
        source: &dyn ByteSource,
        parameter: ParameterId,
        interval: &YearSpan,
        window: u32,
    ) -> PaleoResult<Self> {
        let mut archive = Self::new(ArchiveMetadata {
            title: format!("{} {}", parameter.title(), interval.label()),
            description: format!(
                "Monthly {} grids ({}) for {}",
                parameter.title(),
                parameter.unit(),
                interval.label()
            ),
            window,
            ..ArchiveMetadata::default()
        });

        for group in sub_interval_plan(interval, window) {
            debug!("Building {} group {}", parameter, group.label());
            let mut records = Vec::with_capacity(group.len());
            for year_ad in group.years() {
                let grids = all_months()
                    .into_iter()
                    .map(|month| {
                        let path = grid_file_path(parameter, year_ad, month)?;
                        let text = source.read_to_string(
                            &path,
                            &format!("{} data for {}", parameter.title(), archive_record_name(year_ad)),
                        )?;
                        parse_grid_text(&text, &source.locate(&path))
                    })
                    .collect::<PaleoResult<Vec<Grid>>>()?;
                records.push((archive_record_name(year_ad), stack_grids(&grids)?));
            }
            archive.insert_group(group.label(), records);
        }
        Ok(archive)
    }
}

impl ArchiveReader for Arc<MemoryArchive> {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    fn sub_intervals(&self) -> Vec<String> {
        self.groups.iter().map(|(label, _)| label.clone()).collect()
    }

    fn read_month(
        &self,
        sub_interval: &str,
        record: &str,
        month_index: usize,
    ) -> PaleoResult<Option<Grid>> {
        let months = match self
            .groups
            .iter()
            .find(|(label, _)| label == sub_interval)
            .and_then(|(_, records)| records.get(record))
        {
            Some(months) => months,
            None => return Ok(None),
        };
        if months.dim() != (MONTHS_PER_YEAR, GRID_HEIGHT, GRID_WIDTH) {
            return Err(PaleoError::malformed(
                format!("{sub_interval}/{record}"),
                format!("record has shape {:?}", months.dim()),
            ));
        }
        if month_index >= MONTHS_PER_YEAR {
            return Err(PaleoError::InvalidRequest(format!(
                "month index {month_index} out of range"
            )));
        }
        Ok(Some(months.index_axis(Axis(0), month_index).to_owned()))
    }
}

/// A set of in-memory archives addressed by archive key
#[derive(Debug, Clone)]
pub struct MemoryArchiveStore {
    location: String,
    archives: HashMap<String, Arc<MemoryArchive>>,
}

impl MemoryArchiveStore {
    /// `location` prefixes archive keys in error messages
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            archives: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: String, archive: MemoryArchive) {
        self.archives.insert(key, Arc::new(archive));
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}

impl ArchiveBackend for MemoryArchiveStore {
    fn locate(&self, key: &str) -> String {
        resolve_url(&self.location, key)
    }

    fn exists(&self, key: &str) -> bool {
        self.archives.contains_key(key)
    }

    fn open(&self, key: &str) -> PaleoResult<Box<dyn ArchiveReader>> {
        match self.archives.get(key) {
            Some(archive) => Ok(Box::new(Arc::clone(archive))),
            None => Err(PaleoError::ArchiveOpenFailed {
                path: self.locate(key),
                cause: "no such archive".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DOWNLOAD_INTERVALS;
    use crate::grid::format_grid_text;
    use crate::naming::archive_key;
    use crate::source::LocalDirectory;
    use ndarray::Array3;

    #[test]
    fn reads_months_from_records() {
        let mut archive = MemoryArchive::new(ArchiveMetadata::default());
        let months = Array3::from_shape_fn((12, GRID_HEIGHT, GRID_WIDTH), |(m, _, _)| m as f64);
        archive.insert_record("1000BP-0BP", "10BP".to_string(), months);
        let reader = Arc::new(archive);

        assert_eq!(reader.sub_intervals(), vec!["1000BP-0BP"]);
        let grid = reader.read_month("1000BP-0BP", "10BP", 7).unwrap().unwrap();
        assert!(grid.iter().all(|v| *v == 7.0));
        assert!(reader.read_month("1000BP-0BP", "11BP", 7).unwrap().is_none());
        assert!(reader.read_month("2000BP-1000BP", "10BP", 7).unwrap().is_none());
        assert!(reader.read_month("1000BP-0BP", "10BP", 12).is_err());
    }

    #[test]
    fn rejects_misshapen_record() {
        let mut archive = MemoryArchive::new(ArchiveMetadata::default());
        archive.insert_record("1000BP-0BP", "10BP".to_string(), Array3::zeros((1, 2, 2)));
        let reader = Arc::new(archive);
        assert!(matches!(
            reader.read_month("1000BP-0BP", "10BP", 0),
            Err(PaleoError::MalformedData { .. })
        ));
    }

    #[test]
    fn store_open_failure() {
        let store = MemoryArchiveStore::new("memory://archives");
        assert!(store.is_empty());
        match store.open("precipitation-5000BP-1989AD.nc") {
            Err(PaleoError::ArchiveOpenFailed { path, .. }) => {
                assert_eq!(path, "memory://archives/precipitation-5000BP-1989AD.nc")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn builds_from_flat_files() {
        // A narrow window keeps the fixture small: only the final AD group
        let dir = tempfile::tempdir().unwrap();
        let interval = YearSpan::new(1960, 1989);
        for year in interval.years() {
            for month in all_months() {
                let path = dir.path().join(grid_file_path(ParameterId::SeaLevelPressure, year, month).unwrap());
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                let grid = Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), (year * 100) as f64 + month as f64);
                std::fs::write(path, format_grid_text(&grid, 1)).unwrap();
            }
        }

        let source = LocalDirectory::new(dir.path());
        let archive =
            MemoryArchive::from_flat_files(&source, ParameterId::SeaLevelPressure, &interval, 0).unwrap();
        let reader = Arc::new(archive);
        assert_eq!(reader.sub_intervals(), vec!["1960AD-1989AD"]);
        assert_eq!(reader.metadata().window, 0);

        let grid = reader.read_month("1960AD-1989AD", "1975AD", 3).unwrap().unwrap();
        assert_eq!(grid[[5, 5]], 197503.0);

        let mut store = MemoryArchiveStore::new("memory://archives");
        store.insert(
            archive_key(ParameterId::SeaLevelPressure, &DOWNLOAD_INTERVALS[3]).unwrap(),
            MemoryArchive::clone(&reader),
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_flat_file_aborts_build() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalDirectory::new(dir.path());
        let result = MemoryArchive::from_flat_files(
            &source,
            ParameterId::MeanTemperature,
            &YearSpan::new(1980, 1989),
            0,
        );
        assert!(matches!(result, Err(PaleoError::DataNotFound { .. })));
    }
}
