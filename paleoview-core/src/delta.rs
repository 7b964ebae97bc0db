//! Change of interval values relative to a reference interval.

use crate::errors::{PaleoError, PaleoResult};
use crate::formula::IntervalValue;
use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// How a delta is expressed
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    /// `value - reference`
    #[default]
    Absolute,
    /// `100 * (value - reference) / reference`
    Percent,
}

/// Delta of a grid against a reference grid
///
/// In percent mode NaN (zero over zero) becomes 0, and infinities become the
/// smallest or largest finite value of the result. When the result has no
/// finite values at all, infinities become 0.
pub fn grid_delta(data: &Grid, reference: &Grid, mode: DeltaMode) -> PaleoResult<Grid> {
    if data.dim() != reference.dim() {
        return Err(PaleoError::InvalidRequest(format!(
            "delta grids have shapes {:?} and {:?}",
            data.dim(),
            reference.dim()
        )));
    }
    match mode {
        DeltaMode::Absolute => Ok(data - reference),
        DeltaMode::Percent => {
            let mut delta = (data - reference) * 100.0 / reference;
            delta.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
            let finite = delta.iter().copied().filter(|v| v.is_finite());
            let (lowest, highest) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            // Without any finite value infinities become 0
            let (lowest, highest) = if lowest.is_finite() { (lowest, highest) } else { (0.0, 0.0) };
            delta.mapv_inplace(|v| {
                if v == f64::NEG_INFINITY {
                    lowest
                } else if v == f64::INFINITY {
                    highest
                } else {
                    v
                }
            });
            Ok(delta)
        }
    }
}

/// Delta of a scalar against a reference scalar
///
/// In percent mode NaN becomes 0, and infinities become -100 or 100.
pub fn scalar_delta(data: f64, reference: f64, mode: DeltaMode) -> f64 {
    match mode {
        DeltaMode::Absolute => data - reference,
        DeltaMode::Percent => {
            let delta = 100.0 * (data - reference) / reference;
            if delta.is_nan() {
                0.0
            } else if delta == f64::NEG_INFINITY {
                -100.0
            } else if delta == f64::INFINITY {
                100.0
            } else {
                delta
            }
        }
    }
}

/// Delta of an interval value against a reference of the same shape
pub fn interval_delta(
    data: &IntervalValue,
    reference: &IntervalValue,
    mode: DeltaMode,
) -> PaleoResult<IntervalValue> {
    match (data, reference) {
        (IntervalValue::Grid(data), IntervalValue::Grid(reference)) => {
            Ok(IntervalValue::Grid(grid_delta(data, reference, mode)?))
        }
        (IntervalValue::Scalar(data), IntervalValue::Scalar(reference)) => {
            Ok(IntervalValue::Scalar(scalar_delta(*data, *reference, mode)))
        }
        _ => Err(PaleoError::InvalidRequest(
            "delta requires values and reference of the same shape".to_string(),
        )),
    }
}

/// Deltas of a series of interval values against one reference
pub fn series_delta(
    series: &[IntervalValue],
    reference: &IntervalValue,
    mode: DeltaMode,
) -> PaleoResult<Vec<IntervalValue>> {
    series
        .iter()
        .map(|value| interval_delta(value, reference, mode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn absolute_against_zero_is_identity() {
        for x in [-3.5, 0.0, 1e9, 42.0] {
            assert_eq!(scalar_delta(x, 0.0, DeltaMode::Absolute), x);
        }
        let grid = array![[1.0, -2.0], [3.5, 0.0]];
        assert_eq!(grid_delta(&grid, &Grid::zeros((2, 2)), DeltaMode::Absolute).unwrap(), grid);
    }

    #[test]
    fn scalar_percent_divide_by_zero() {
        let deltas: Vec<f64> = [-1.0, 1.0, 0.0]
            .iter()
            .map(|x| scalar_delta(*x, 0.0, DeltaMode::Percent))
            .collect();
        assert_eq!(deltas, vec![-100.0, 100.0, 0.0]);
        assert_eq!(scalar_delta(15.0, 10.0, DeltaMode::Percent), 50.0);
    }

    #[test]
    fn grid_percent_divide_by_zero() {
        let data = array![[0.0, 2.0, -1.0, 1.0, 0.0]];
        let reference = array![[1.0, 1.0, 0.0, 0.0, 0.0]];
        let delta = grid_delta(&data, &reference, DeltaMode::Percent).unwrap();
        assert_eq!(delta, array![[-100.0, 100.0, -100.0, 100.0, 0.0]]);
    }

    #[test]
    fn grid_percent_all_infinite() {
        let delta = grid_delta(&array![[1.0, -1.0]], &array![[0.0, 0.0]], DeltaMode::Percent).unwrap();
        assert_eq!(delta, array![[0.0, 0.0]]);
    }

    #[test]
    fn series_against_reference() {
        let series = vec![IntervalValue::Scalar(2.0), IntervalValue::Scalar(4.0)];
        let deltas = series_delta(&series, &IntervalValue::Scalar(1.0), DeltaMode::Absolute).unwrap();
        assert_eq!(deltas, vec![IntervalValue::Scalar(1.0), IntervalValue::Scalar(3.0)]);

        assert!(interval_delta(
            &IntervalValue::Scalar(1.0),
            &IntervalValue::Grid(Grid::zeros((1, 1))),
            DeltaMode::Absolute
        )
        .is_err());
    }

    #[test]
    fn mismatched_grids() {
        assert!(grid_delta(&Grid::zeros((2, 2)), &Grid::zeros((1, 2)), DeltaMode::Percent).is_err());
    }
}
