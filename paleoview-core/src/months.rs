//! Calendar month codes and year-boundary month ordering.

use crate::errors::{PaleoError, PaleoResult};
use crate::time::YearAD;

/// Number of months in a year
pub const MONTHS_PER_YEAR: usize = 12;

/// Single-letter month codes used in file names, January first
pub const MONTH_CODES: [char; MONTHS_PER_YEAR] =
    ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L'];

pub const MONTH_NAMES: [&str; MONTHS_PER_YEAR] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn month_code(month_index: usize) -> PaleoResult<char> {
    MONTH_CODES
        .get(month_index)
        .copied()
        .ok_or_else(|| PaleoError::InvalidRequest(format!("month index {month_index} out of range")))
}

pub fn month_index(code: char) -> Option<usize> {
    MONTH_CODES.iter().position(|c| *c == code)
}

pub fn month_name(month_index: usize) -> &'static str {
    MONTH_NAMES.get(month_index).copied().unwrap_or("Unknown")
}

/// All twelve month indices in calendar order
pub fn all_months() -> Vec<usize> {
    (0..MONTHS_PER_YEAR).collect()
}

/// Order a set of month indices so that a selection crossing a year boundary
/// reads late previous-year months first.
///
/// A selection of fewer than twelve months containing both January (0) and
/// December (11) is treated as crossing the boundary: the contiguous run ending
/// in December is moved to the front. Any other selection is simply sorted.
///
/// ```rust
/// use paleoview_core::months::rearrange_month_indices;
///
/// assert_eq!(rearrange_month_indices(&[0, 10, 2, 11, 1]), vec![10, 11, 0, 1, 2]);
/// assert_eq!(rearrange_month_indices(&[2, 0, 1]), vec![0, 1, 2]);
/// ```
pub fn rearrange_month_indices(month_indices: &[usize]) -> Vec<usize> {
    let mut sorted = month_indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let crosses_year = sorted.len() < MONTHS_PER_YEAR
        && sorted.first() == Some(&0)
        && sorted.last() == Some(&(MONTHS_PER_YEAR - 1));
    if !crosses_year {
        return sorted;
    }

    // Length of the contiguous run ending at December
    let run = sorted
        .windows(2)
        .rev()
        .take_while(|pair| pair[1] == pair[0] + 1)
        .count()
        + 1;
    let split = sorted.len() - run;
    let mut ordered = sorted[split..].to_vec();
    ordered.extend_from_slice(&sorted[..split]);
    ordered
}

/// Pair each (already rearranged) month index with the year it belongs to.
///
/// Indices greater than the final index of the selection belong to the
/// previous year.
pub fn month_years(year_ad: YearAD, ordered_months: &[usize]) -> Vec<(YearAD, usize)> {
    let last = ordered_months.last().copied().unwrap_or(0);
    ordered_months
        .iter()
        .map(|&month| {
            if month > last {
                (year_ad - 1, month)
            } else {
                (year_ad, month)
            }
        })
        .collect()
}

/// Validate a month selection supplied by a caller
pub fn validate_months(month_indices: &[usize]) -> PaleoResult<()> {
    if month_indices.is_empty() {
        return Err(PaleoError::InvalidRequest(
            "at least one month must be selected".to_string(),
        ));
    }
    if let Some(bad) = month_indices.iter().find(|m| **m >= MONTHS_PER_YEAR) {
        return Err(PaleoError::InvalidRequest(format!(
            "month index {bad} out of range"
        )));
    }
    Ok(())
}
