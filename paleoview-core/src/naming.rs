//! Relative locations of every data file in the dataset.
//!
//! All paths are `/`-separated and relative to the directory (or base URL)
//! served by a [`ByteSource`](crate::source::ByteSource).

use crate::errors::PaleoResult;
use crate::months::month_code;
use crate::parameters::ParameterId;
use crate::time::{YearAD, YearPoint, YearSpan};

/// Flat grid file for one (parameter, year, month)
///
/// ```rust
/// use paleoview_core::naming::grid_file_path;
/// use paleoview_core::parameters::ParameterId;
///
/// let path = grid_file_path(ParameterId::MaximumTemperature, 1988, 10).unwrap();
/// assert_eq!(path, "Tmax/Trace21_2.5x2.5_1988AD.1AK.txt");
/// ```
pub fn grid_file_path(
    parameter: ParameterId,
    year_ad: YearAD,
    month_index: usize,
) -> PaleoResult<String> {
    let codes = parameter.grid_codes()?;
    Ok(format!(
        "{}/Trace21_2.5x2.5_{}.1{}{}.txt",
        codes.directory,
        YearPoint::from_year_ad(year_ad),
        codes.file,
        month_code(month_index)?
    ))
}

/// Archive file holding one download interval of a gridded parameter
pub fn archive_key(parameter: ParameterId, download_interval: &YearSpan) -> PaleoResult<String> {
    parameter.grid_codes()?;
    Ok(format!("{}-{}.nc", parameter.name(), download_interval.label()))
}

/// Bias correction grid for one (parameter, month)
pub fn bias_file_path(parameter: ParameterId, month_index: usize) -> PaleoResult<String> {
    let codes = parameter.grid_codes()?;
    Ok(format!(
        "{}/Trace21_2.5x2.5_{}{}_{}.txt",
        codes.bias_directory,
        codes.file,
        month_code(month_index)?,
        codes.bias_file
    ))
}

/// Series file of a non-gridded parameter
pub fn series_file_path(parameter: ParameterId) -> PaleoResult<String> {
    Ok(parameter.series_file()?.file_name.to_string())
}

/// Record name of a year within an archive sub-interval group
pub fn archive_record_name(year_ad: YearAD) -> String {
    YearPoint::from_year_ad(year_ad).label()
}

/// Fixed region mask file
pub fn region_mask_path(region_code: &str) -> String {
    format!("{region_code}.msk")
}

/// One snapshot of a time-dependent region mask
///
/// Snapshots live in a directory named after the region; their file names use
/// the part of the region code before the first `-`.
pub fn time_dependent_mask_path(region_code: &str, years_bp: u32) -> String {
    let prefix = region_code.split('-').next().unwrap_or(region_code);
    format!("{region_code}/{prefix}-{years_bp}BP.msk")
}

/// Join a base URL and a relative data path, normalising separators
pub fn resolve_url(base_url: &str, relative: &str) -> String {
    let relative = relative.replace('\\', "/");
    if base_url.is_empty() || base_url.ends_with('/') {
        format!("{base_url}{relative}")
    } else {
        format!("{base_url}/{relative}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaleoError;

    #[test]
    fn grid_paths() {
        assert_eq!(
            grid_file_path(ParameterId::MeanTemperature, 1989, 0).unwrap(),
            "T/Trace21_2.5x2.5_1989AD.1TA.txt"
        );
        assert_eq!(
            grid_file_path(ParameterId::MinimumTemperature, 1940, 11).unwrap(),
            "Tmin/Trace21_2.5x2.5_10BP.1IL.txt"
        );
        assert_eq!(
            grid_file_path(ParameterId::RelativeHumidity, 1950, 10).unwrap(),
            "H/Trace21_2.5x2.5_0BP.1HK.txt"
        );
        assert_eq!(
            grid_file_path(ParameterId::SpecificHumidity, 1989, 6).unwrap(),
            "Q/Trace21_2.5x2.5_1989AD.1SG.txt"
        );
    }

    #[test]
    fn unknown_parameter_codes() {
        assert!(matches!(
            grid_file_path(ParameterId::Soi, 1989, 0),
            Err(PaleoError::UnknownParameter { .. })
        ));
        assert!(matches!(
            bias_file_path(ParameterId::Enso, 0),
            Err(PaleoError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn archive_keys() {
        let interval: YearSpan = "5000BP-1989AD".parse().unwrap();
        assert_eq!(
            archive_key(ParameterId::RelativeHumidity, &interval).unwrap(),
            "relative_humidity-5000BP-1989AD.nc"
        );
    }

    #[test]
    fn bias_paths() {
        assert_eq!(
            bias_file_path(ParameterId::MeanTemperature, 4).unwrap(),
            "Tmean/Trace21_2.5x2.5_TE_Delta.txt"
        );
        assert_eq!(
            bias_file_path(ParameterId::Precipitation, 6).unwrap(),
            "Precip/Trace21_2.5x2.5_PG_Error.txt"
        );
    }

    #[test]
    fn mask_paths() {
        assert_eq!(region_mask_path("globe"), "globe.msk");
        assert_eq!(
            time_dependent_mask_path("land-0-21KBP", 11500),
            "land-0-21KBP/land-11500BP.msk"
        );
    }

    #[test]
    fn urls() {
        assert_eq!(
            resolve_url("http://example.org/data", "T\\file.txt"),
            "http://example.org/data/T/file.txt"
        );
        assert_eq!(
            resolve_url("http://example.org/data/", "T/file.txt"),
            "http://example.org/data/T/file.txt"
        );
    }
}
