//! Base climate parameters held by the dataset.
//!
//! Gridded parameters carry the code strings used to locate their flat files,
//! archives and bias corrections. Non-gridded parameters (climate indices) are
//! stored as a single tabular series file.
//!
//! # Available Parameters
//!
//! ## Gridded
//! - `mean_temperature`, `minimum_temperature`, `maximum_temperature` in degrees C
//! - `specific_humidity` in gm/kg, `relative_humidity` in %
//! - `precipitation` in mm/day
//! - `sea_level_pressure` in hPa
//!
//! ## Non-gridded
//! - `soi` (Southern Oscillation Index)
//! - `enso` (no data file assigned yet)

use crate::errors::{PaleoError, PaleoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a parameter's values are 72x144 grids or single scalars
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterShape {
    Gridded,
    Scalar,
}

/// Identifier of a base parameter stored in the dataset
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterId {
    MeanTemperature,
    MinimumTemperature,
    MaximumTemperature,
    SpecificHumidity,
    RelativeHumidity,
    Precipitation,
    SeaLevelPressure,
    Soi,
    Enso,
}

/// Code strings locating a gridded parameter's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCodes {
    /// Sub-directory holding the flat grid files
    pub directory: &'static str,
    /// Code embedded in the flat grid file names
    pub file: &'static str,
    /// Sub-directory holding the bias correction grids
    pub bias_directory: &'static str,
    /// Suffix of the bias correction file names
    pub bias_file: &'static str,
    pub unit: &'static str,
}

/// Location of a non-gridded parameter's series file and its column names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesFile {
    pub file_name: &'static str,
    pub era_column: &'static str,
    pub year_column: &'static str,
    pub month_column: &'static str,
    pub value_column: &'static str,
}

impl ParameterId {
    /// Gridded parameters in presentation order
    pub const GRIDDED: [ParameterId; 7] = [
        ParameterId::MeanTemperature,
        ParameterId::MinimumTemperature,
        ParameterId::MaximumTemperature,
        ParameterId::SpecificHumidity,
        ParameterId::RelativeHumidity,
        ParameterId::Precipitation,
        ParameterId::SeaLevelPressure,
    ];

    pub const SCALAR: [ParameterId; 2] = [ParameterId::Soi, ParameterId::Enso];

    pub fn name(&self) -> &'static str {
        match self {
            ParameterId::MeanTemperature => "mean_temperature",
            ParameterId::MinimumTemperature => "minimum_temperature",
            ParameterId::MaximumTemperature => "maximum_temperature",
            ParameterId::SpecificHumidity => "specific_humidity",
            ParameterId::RelativeHumidity => "relative_humidity",
            ParameterId::Precipitation => "precipitation",
            ParameterId::SeaLevelPressure => "sea_level_pressure",
            ParameterId::Soi => "soi",
            ParameterId::Enso => "enso",
        }
    }

    /// Human-readable name, e.g. "Mean Temperature"
    pub fn title(&self) -> String {
        self.name()
            .split('_')
            .map(|word| match self {
                ParameterId::Soi | ParameterId::Enso => word.to_uppercase(),
                _ => {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn shape(&self) -> ParameterShape {
        match self {
            ParameterId::Soi | ParameterId::Enso => ParameterShape::Scalar,
            _ => ParameterShape::Gridded,
        }
    }

    pub fn is_gridded(&self) -> bool {
        self.shape() == ParameterShape::Gridded
    }

    /// Code strings for a gridded parameter
    ///
    /// Fails with [`PaleoError::UnknownParameter`] for parameters without grid codes.
    pub fn grid_codes(&self) -> PaleoResult<GridCodes> {
        let codes = match self {
            ParameterId::MeanTemperature => GridCodes {
                directory: "T",
                file: "T",
                bias_directory: "Tmean",
                bias_file: "Delta",
                unit: "degrees C",
            },
            ParameterId::MinimumTemperature => GridCodes {
                directory: "Tmin",
                file: "I",
                bias_directory: "Tmin",
                bias_file: "Delta",
                unit: "degrees C",
            },
            ParameterId::MaximumTemperature => GridCodes {
                directory: "Tmax",
                file: "A",
                bias_directory: "Tmax",
                bias_file: "Delta",
                unit: "degrees C",
            },
            ParameterId::SpecificHumidity => GridCodes {
                directory: "Q",
                file: "S",
                bias_directory: "SpecificHumidity",
                bias_file: "Delta",
                unit: "gm/kg",
            },
            ParameterId::RelativeHumidity => GridCodes {
                directory: "H",
                file: "H",
                bias_directory: "RelativeHumidity",
                bias_file: "Delta",
                unit: "%",
            },
            ParameterId::Precipitation => GridCodes {
                directory: "P",
                file: "P",
                bias_directory: "Precip",
                bias_file: "Error",
                unit: "mm/day",
            },
            ParameterId::SeaLevelPressure => GridCodes {
                directory: "PSL",
                file: "M",
                bias_directory: "MSLP",
                bias_file: "Delta",
                unit: "hPa",
            },
            ParameterId::Soi | ParameterId::Enso => {
                return Err(PaleoError::UnknownParameter {
                    id: self.name().to_string(),
                })
            }
        };
        Ok(codes)
    }

    /// Series file layout for a non-gridded parameter
    pub fn series_file(&self) -> PaleoResult<SeriesFile> {
        match self {
            ParameterId::Soi => Ok(SeriesFile {
                file_name: "South_Oscillation_Index.txt",
                era_column: "BP/AD",
                year_column: "Yrs",
                month_column: "Months",
                value_column: "SOI",
            }),
            ParameterId::Enso => Err(PaleoError::DataLocationUndefined {
                parameter: self.title(),
            }),
            gridded => Err(PaleoError::UnknownParameter {
                id: gridded.name().to_string(),
            }),
        }
    }

    pub fn unit(&self) -> &'static str {
        match self.grid_codes() {
            Ok(codes) => codes.unit,
            Err(_) => "",
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ParameterId {
    type Err = PaleoError;

    fn from_str(s: &str) -> PaleoResult<Self> {
        ParameterId::GRIDDED
            .iter()
            .chain(ParameterId::SCALAR.iter())
            .find(|p| p.name() == s)
            .copied()
            .ok_or_else(|| PaleoError::UnknownParameter { id: s.to_string() })
    }
}
