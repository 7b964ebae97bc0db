//! The fixed 2.5 degree global grid.
//!
//! Row 0 is latitude 88.75 and rows step south by 2.5 degrees to -88.75.
//! Column 0 is longitude -178.75 and columns step east by 2.5 degrees.

use crate::errors::{PaleoError, PaleoResult};
use ndarray::{Array1, Array2, Array3, Axis};

/// A single 72x144 field of values
pub type Grid = Array2<f64>;

/// A stack of grids with months on the first axis
pub type GridStack = Array3<f64>;

pub const GRID_HEIGHT: usize = 72;
pub const GRID_WIDTH: usize = 144;
pub const CELL_SIZE_DEGREES: f64 = 2.5;
const NORTHERNMOST_LATITUDE: f64 = 88.75;
const WESTERNMOST_LONGITUDE: f64 = -178.75;

/// Latitude of each row's cell centre
pub fn latitudes() -> Array1<f64> {
    Array1::from_iter(
        (0..GRID_HEIGHT).map(|row| NORTHERNMOST_LATITUDE - CELL_SIZE_DEGREES * row as f64),
    )
}

/// Longitude of each column's cell centre
pub fn longitudes() -> Array1<f64> {
    Array1::from_iter(
        (0..GRID_WIDTH).map(|col| WESTERNMOST_LONGITUDE + CELL_SIZE_DEGREES * col as f64),
    )
}

/// Relative surface area of each cell: cos(latitude) broadcast across columns
pub fn area_weights() -> Grid {
    let row_weights = latitudes().mapv(|lat| lat.to_radians().cos());
    let mut weights = Grid::zeros((GRID_HEIGHT, GRID_WIDTH));
    for (mut row, weight) in weights.axis_iter_mut(Axis(0)).zip(row_weights.iter()) {
        row.fill(*weight);
    }
    weights
}

/// Stack equally shaped grids along a new leading axis
pub fn stack_grids(grids: &[Grid]) -> PaleoResult<GridStack> {
    if grids.is_empty() {
        return Ok(GridStack::zeros((0, GRID_HEIGHT, GRID_WIDTH)));
    }
    let views: Vec<_> = grids.iter().map(|g| g.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| PaleoError::InvalidRequest(format!("cannot stack grids: {e}")))
}

/// Parse a whitespace-delimited text grid of 72 rows by 144 columns
///
/// `origin` names the file or URL the text came from and is used in errors.
pub fn parse_grid_text(text: &str, origin: &str) -> PaleoResult<Grid> {
    let mut values = Vec::with_capacity(GRID_HEIGHT * GRID_WIDTH);
    let mut rows = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let before = values.len();
        for token in line.split_whitespace() {
            values.push(parse_value(token).map_err(|e| PaleoError::malformed(origin, e))?);
        }
        let width = values.len() - before;
        if width != GRID_WIDTH {
            return Err(PaleoError::malformed(
                origin,
                format!("row {rows} has {width} values, expected {GRID_WIDTH}"),
            ));
        }
        rows += 1;
    }
    if rows != GRID_HEIGHT {
        return Err(PaleoError::malformed(
            origin,
            format!("found {rows} rows, expected {GRID_HEIGHT}"),
        ));
    }
    Grid::from_shape_vec((GRID_HEIGHT, GRID_WIDTH), values).map_err(|e| PaleoError::malformed(origin, e))
}

fn parse_value(token: &str) -> Result<f64, String> {
    match token.to_ascii_lowercase().as_str() {
        "nan" => Ok(f64::NAN),
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => token
            .parse::<f64>()
            .map_err(|e| format!("invalid value '{token}': {e}")),
    }
}

/// Parse a region mask: one digit character per cell, 144 per line
pub fn parse_mask_text(text: &str, origin: &str) -> PaleoResult<Grid> {
    let mut values = Vec::with_capacity(GRID_HEIGHT * GRID_WIDTH);
    let mut rows = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let cells: Vec<f64> = line
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| {
                c.to_digit(10)
                    .map(f64::from)
                    .ok_or_else(|| PaleoError::malformed(origin, format!("invalid mask cell '{c}'")))
            })
            .collect::<PaleoResult<_>>()?;
        if cells.len() != GRID_WIDTH {
            return Err(PaleoError::malformed(
                origin,
                format!("mask row {rows} has {} cells, expected {GRID_WIDTH}", cells.len()),
            ));
        }
        values.extend(cells);
        rows += 1;
    }
    if rows != GRID_HEIGHT {
        return Err(PaleoError::malformed(
            origin,
            format!("found {rows} mask rows, expected {GRID_HEIGHT}"),
        ));
    }
    Grid::from_shape_vec((GRID_HEIGHT, GRID_WIDTH), values).map_err(|e| PaleoError::malformed(origin, e))
}

/// Render a grid in the whitespace-delimited layout read by [`parse_grid_text`]
pub fn format_grid_text(grid: &Grid, decimals: usize) -> String {
    let mut text = String::with_capacity(grid.len() * (decimals + 6));
    for row in grid.axis_iter(Axis(0)) {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.decimals$}")).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    text
}
