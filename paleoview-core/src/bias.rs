//! Bias correction of raw model grids.
//!
//! Each gridded parameter has one correction grid per calendar month and a
//! formula combining raw values with the correction. Relative humidity is
//! bounded to 100% before it is corrected.

use crate::errors::{PaleoError, PaleoResult};
use crate::grid::{parse_grid_text, stack_grids, Grid, GridStack};
use crate::months::{month_name, rearrange_month_indices};
use crate::naming::bias_file_path;
use crate::parameters::ParameterId;
use crate::source::ByteSource;
use log::debug;
use ndarray::{ArrayBase, DataMut, Dimension, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundKind {
    Lower,
    Upper,
}

/// A limit applied element-wise to raw values
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub kind: BoundKind,
    pub value: f64,
}

impl Bound {
    pub fn lower(value: f64) -> Self {
        Self {
            kind: BoundKind::Lower,
            value,
        }
    }

    pub fn upper(value: f64) -> Self {
        Self {
            kind: BoundKind::Upper,
            value,
        }
    }
}

/// Clamp every value to the bound. NaN values are left untouched.
pub fn apply_bound<S, D>(values: &mut ArrayBase<S, D>, bound: Bound)
where
    S: DataMut<Elem = f64>,
    D: Dimension,
{
    match bound.kind {
        BoundKind::Lower => values.mapv_inplace(|v| if v < bound.value { bound.value } else { v }),
        BoundKind::Upper => values.mapv_inplace(|v| if v > bound.value { bound.value } else { v }),
    }
}

/// How a correction value combines with a raw value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionFormula {
    /// `raw + correction`
    Additive,
    /// `raw * correction`
    Multiplicative,
    /// `(1 - (1 - raw / 100) ^ correction) * 100`
    SaturationExponent,
}

impl CorrectionFormula {
    pub fn for_parameter(parameter: ParameterId) -> PaleoResult<Self> {
        match parameter {
            ParameterId::MeanTemperature
            | ParameterId::MinimumTemperature
            | ParameterId::MaximumTemperature
            | ParameterId::SeaLevelPressure => Ok(CorrectionFormula::Additive),
            ParameterId::SpecificHumidity | ParameterId::Precipitation => {
                Ok(CorrectionFormula::Multiplicative)
            }
            ParameterId::RelativeHumidity => Ok(CorrectionFormula::SaturationExponent),
            ParameterId::Soi | ParameterId::Enso => Err(PaleoError::UnknownParameter {
                id: parameter.name().to_string(),
            }),
        }
    }

    pub fn apply(&self, raw: f64, correction: f64) -> f64 {
        match self {
            CorrectionFormula::Additive => raw + correction,
            CorrectionFormula::Multiplicative => raw * correction,
            CorrectionFormula::SaturationExponent => (1.0 - (1.0 - raw / 100.0).powf(correction)) * 100.0,
        }
    }
}

/// Bound applied to raw values before correction, if any
pub fn pre_correction_bound(parameter: ParameterId) -> Option<Bound> {
    match parameter {
        ParameterId::RelativeHumidity => Some(Bound::upper(100.0)),
        _ => None,
    }
}

/// Loads and caches correction grids and applies them
#[derive(Debug)]
pub struct BiasCorrector {
    source: Arc<dyn ByteSource>,
    grids: HashMap<(ParameterId, usize), Grid>,
    loads: usize,
}

impl BiasCorrector {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            source,
            grids: HashMap::new(),
            loads: 0,
        }
    }

    /// Correction grid for one (parameter, month), loaded on first use
    pub fn correction_grid(&mut self, parameter: ParameterId, month_index: usize) -> PaleoResult<&Grid> {
        let key = (parameter, month_index);
        if !self.grids.contains_key(&key) {
            let path = bias_file_path(parameter, month_index)?;
            let what = format!(
                "{} bias correction data for {}",
                parameter.title(),
                month_name(month_index)
            );
            let text = self.source.read_to_string(&path, &what)?;
            let grid = parse_grid_text(&text, &self.source.locate(&path))?;
            debug!("Loaded {} bias correction for {}", parameter, month_name(month_index));
            self.loads += 1;
            self.grids.insert(key, grid);
        }
        self.grids
            .get(&key)
            .ok_or_else(|| PaleoError::not_found(parameter.name(), "bias correction data"))
    }

    /// Correction grids for the selected months, in rearranged month order
    pub fn correction_grids(&mut self, parameter: ParameterId, month_indices: &[usize]) -> PaleoResult<GridStack> {
        let grids = rearrange_month_indices(month_indices)
            .into_iter()
            .map(|month| self.correction_grid(parameter, month).cloned())
            .collect::<PaleoResult<Vec<Grid>>>()?;
        stack_grids(&grids)
    }

    /// Correct raw grids stacked in rearranged order of `month_indices`
    pub fn apply(
        &mut self,
        parameter: ParameterId,
        mut raw: GridStack,
        month_indices: &[usize],
    ) -> PaleoResult<GridStack> {
        let formula = CorrectionFormula::for_parameter(parameter)?;
        let corrections = self.correction_grids(parameter, month_indices)?;
        if corrections.dim() != raw.dim() {
            return Err(PaleoError::InvalidRequest(format!(
                "{} raw grids have shape {:?} but corrections have shape {:?}",
                parameter.title(),
                raw.dim(),
                corrections.dim()
            )));
        }

        if let Some(bound) = pre_correction_bound(parameter) {
            apply_bound(&mut raw, bound);
        }
        Zip::from(&mut raw)
            .and(&corrections)
            .for_each(|value, correction| *value = formula.apply(*value, *correction));
        Ok(raw)
    }

    /// Forget every cached correction grid
    pub fn clear(&mut self) {
        self.grids.clear();
    }

    /// Number of correction files read since creation
    pub fn load_count(&self) -> usize {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{format_grid_text, GRID_HEIGHT, GRID_WIDTH};
    use crate::source::LocalDirectory;
    use is_close::is_close;
    use ndarray::{array, Array3};

    fn write_correction(root: &std::path::Path, parameter: ParameterId, month: usize, value: f64) {
        let path = root.join(bias_file_path(parameter, month).unwrap());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format_grid_text(&Grid::from_elem((GRID_HEIGHT, GRID_WIDTH), value), 3)).unwrap();
    }

    #[test]
    fn bounds() {
        let mut values = array![[-5.0, 50.0, 120.0, f64::NAN]];
        apply_bound(&mut values, Bound::upper(100.0));
        assert_eq!(values[[0, 2]], 100.0);
        assert_eq!(values[[0, 1]], 50.0);
        assert!(values[[0, 3]].is_nan());

        apply_bound(&mut values, Bound::lower(0.0));
        assert_eq!(values[[0, 0]], 0.0);
    }

    #[test]
    fn formulas() {
        assert_eq!(CorrectionFormula::Additive.apply(10.0, -1.5), 8.5);
        assert_eq!(CorrectionFormula::Multiplicative.apply(4.0, 0.5), 2.0);
        // A correction exponent of 1 leaves humidity unchanged
        assert!(is_close!(CorrectionFormula::SaturationExponent.apply(40.0, 1.0), 40.0));
        assert!(is_close!(CorrectionFormula::SaturationExponent.apply(50.0, 2.0), 75.0));
        assert!(is_close!(CorrectionFormula::SaturationExponent.apply(100.0, 0.5), 100.0));
    }

    #[test]
    fn formula_per_parameter() {
        assert_eq!(
            CorrectionFormula::for_parameter(ParameterId::SeaLevelPressure).unwrap(),
            CorrectionFormula::Additive
        );
        assert_eq!(
            CorrectionFormula::for_parameter(ParameterId::Precipitation).unwrap(),
            CorrectionFormula::Multiplicative
        );
        assert!(CorrectionFormula::for_parameter(ParameterId::Soi).is_err());
        assert_eq!(pre_correction_bound(ParameterId::RelativeHumidity), Some(Bound::upper(100.0)));
        assert_eq!(pre_correction_bound(ParameterId::MeanTemperature), None);
    }

    #[test]
    fn corrects_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        write_correction(dir.path(), ParameterId::MeanTemperature, 0, 1.0);
        write_correction(dir.path(), ParameterId::MeanTemperature, 11, -2.0);
        let mut corrector = BiasCorrector::new(Arc::new(LocalDirectory::new(dir.path())));

        // Stacked in rearranged order: December then January
        let mut raw = Array3::zeros((2, GRID_HEIGHT, GRID_WIDTH));
        raw.index_axis_mut(ndarray::Axis(0), 0).fill(10.0);
        raw.index_axis_mut(ndarray::Axis(0), 1).fill(20.0);
        let corrected = corrector.apply(ParameterId::MeanTemperature, raw.clone(), &[0, 11]).unwrap();
        assert_eq!(corrected[[0, 3, 3]], 8.0);
        assert_eq!(corrected[[1, 3, 3]], 21.0);

        corrector.apply(ParameterId::MeanTemperature, raw, &[11, 0]).unwrap();
        assert_eq!(corrector.load_count(), 2);
        corrector.clear();
        corrector.correction_grid(ParameterId::MeanTemperature, 0).unwrap();
        assert_eq!(corrector.load_count(), 3);
    }

    #[test]
    fn bounds_humidity_before_correcting() {
        let dir = tempfile::tempdir().unwrap();
        write_correction(dir.path(), ParameterId::RelativeHumidity, 5, 0.5);
        let mut corrector = BiasCorrector::new(Arc::new(LocalDirectory::new(dir.path())));

        let raw = Array3::from_elem((1, GRID_HEIGHT, GRID_WIDTH), 130.0);
        let corrected = corrector.apply(ParameterId::RelativeHumidity, raw, &[5]).unwrap();
        assert!(corrected.iter().all(|v| is_close!(*v, 100.0)));
    }

    #[test]
    fn missing_correction_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut corrector = BiasCorrector::new(Arc::new(LocalDirectory::new(dir.path())));
        let raw = Array3::zeros((1, GRID_HEIGHT, GRID_WIDTH));
        match corrector.apply(ParameterId::Precipitation, raw, &[2]) {
            Err(PaleoError::DataNotFound { attempted, what }) => {
                assert!(attempted.ends_with("Trace21_2.5x2.5_PC_Error.txt"));
                assert_eq!(what, "Precipitation bias correction data for March");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_correction(dir.path(), ParameterId::MeanTemperature, 0, 1.0);
        let mut corrector = BiasCorrector::new(Arc::new(LocalDirectory::new(dir.path())));
        let raw = Array3::zeros((2, GRID_HEIGHT, GRID_WIDTH));
        assert!(matches!(
            corrector.apply(ParameterId::MeanTemperature, raw, &[0]),
            Err(PaleoError::InvalidRequest(_))
        ));
    }
}
