//! NetCDF4 archive files in a local directory.
//!
//! Each archive holds global attributes `Conventions`, `title` and
//! `description`, scalar variables `window`, `width` and `decimals`, and one
//! group per sub-interval. Every group holds one `[12][72][144]` variable per
//! year named by the year's label.

use super::{ArchiveBackend, ArchiveMetadata, ArchiveReader};
use crate::errors::{PaleoError, PaleoResult};
use crate::grid::{Grid, GRID_HEIGHT, GRID_WIDTH};
use crate::months::MONTHS_PER_YEAR;
use netcdf::AttributeValue;
use std::fmt;
use std::path::{Path, PathBuf};

/// Archive files stored below a local directory
#[derive(Debug, Clone)]
pub struct NetcdfDirectory {
    root: PathBuf,
}

impl NetcdfDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ArchiveBackend for NetcdfDirectory {
    fn locate(&self, key: &str) -> String {
        self.path(key).display().to_string()
    }

    fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    fn open(&self, key: &str) -> PaleoResult<Box<dyn ArchiveReader>> {
        Ok(Box::new(NetcdfArchive::open(&self.path(key))?))
    }
}

pub struct NetcdfArchive {
    path: String,
    file: netcdf::File,
    metadata: ArchiveMetadata,
}

impl NetcdfArchive {
    pub fn open(path: &Path) -> PaleoResult<Self> {
        let location = path.display().to_string();
        let file = netcdf::open(path).map_err(|e| PaleoError::ArchiveOpenFailed {
            path: location.clone(),
            cause: e.to_string(),
        })?;

        let metadata = ArchiveMetadata {
            conventions: string_attribute(&file, "Conventions").unwrap_or_default(),
            title: string_attribute(&file, "title").unwrap_or_default(),
            description: string_attribute(&file, "description").unwrap_or_default(),
            window: scalar_variable(&file, "window", &location)?,
            width: scalar_variable(&file, "width", &location)?,
            decimals: scalar_variable(&file, "decimals", &location)?,
        };

        Ok(Self {
            path: location,
            file,
            metadata,
        })
    }
}

fn string_attribute(file: &netcdf::File, name: &str) -> Option<String> {
    match file.attribute(name)?.value().ok()? {
        AttributeValue::Str(value) => Some(value),
        _ => None,
    }
}

fn scalar_variable(file: &netcdf::File, name: &str, location: &str) -> PaleoResult<u32> {
    let variable = file
        .variable(name)
        .ok_or_else(|| PaleoError::malformed(location, format!("missing variable '{name}'")))?;
    let value: i32 = variable
        .get_value(..)
        .map_err(|e| PaleoError::malformed(location, e))?;
    u32::try_from(value).map_err(|e| PaleoError::malformed(location, e))
}

impl fmt::Debug for NetcdfArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcdfArchive")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ArchiveReader for NetcdfArchive {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    fn sub_intervals(&self) -> Vec<String> {
        match self.file.groups() {
            Ok(groups) => groups.map(|group| group.name()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read_month(
        &self,
        sub_interval: &str,
        record: &str,
        month_index: usize,
    ) -> PaleoResult<Option<Grid>> {
        if month_index >= MONTHS_PER_YEAR {
            return Err(PaleoError::InvalidRequest(format!(
                "month index {month_index} out of range"
            )));
        }
        let group = match self
            .file
            .group(sub_interval)
            .map_err(|e| PaleoError::malformed(&self.path, e))?
        {
            Some(group) => group,
            None => return Ok(None),
        };
        let variable = match group.variable(record) {
            Some(variable) => variable,
            None => return Ok(None),
        };
        let values: Vec<f64> = variable
            .get_values((month_index, .., ..))
            .map_err(|e| PaleoError::malformed(&self.path, e))?;
        Grid::from_shape_vec((GRID_HEIGHT, GRID_WIDTH), values)
            .map(Some)
            .map_err(|e| PaleoError::malformed(format!("{}#{sub_interval}/{record}", self.path), e))
    }
}
