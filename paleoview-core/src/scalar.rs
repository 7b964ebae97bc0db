//! Tabular series of non-gridded parameters (climate indices).
//!
//! A series file is whitespace-delimited text with a header row naming at least
//! the era, year, month code and value columns, e.g.
//!
//! ```text
//! BP/AD  Yrs  Months  SOI
//! BP     10   A       0.35
//! BP     10   B       -1.20
//! ```
//!
//! Only the rows needed by the current request are retained in memory.

use crate::errors::{PaleoError, PaleoResult};
use crate::months::{month_code, month_index, month_years, rearrange_month_indices};
use crate::naming::series_file_path;
use crate::parameters::ParameterId;
use crate::source::ByteSource;
use crate::time::{Era, YearAD, YearPoint, YearSpan};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Series rows keyed by (era, year magnitude, month code)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarSeriesTable {
    rows: HashMap<(Era, u32, char), f64>,
}

impl ScalarSeriesTable {
    /// Parse a series file, keeping rows whose year falls in any of `spans`
    ///
    /// Every row must carry a readable era and year. Month codes and values are
    /// only checked on rows that are kept, so a damaged row outside the requested
    /// spans does not fail the load.
    pub fn parse(
        text: &str,
        parameter: ParameterId,
        spans: &[YearSpan],
        origin: &str,
    ) -> PaleoResult<Self> {
        let layout = parameter.series_file()?;
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<&str> = lines
            .next()
            .ok_or_else(|| PaleoError::malformed(origin, "empty series file"))?
            .split_whitespace()
            .collect();

        let column = |name: &str| {
            header
                .iter()
                .position(|h| *h == name)
                .ok_or_else(|| PaleoError::malformed(origin, format!("missing column '{name}'")))
        };
        let era_col = column(layout.era_column)?;
        let year_col = column(layout.year_column)?;
        let month_col = column(layout.month_column)?;
        let value_col = column(layout.value_column)?;

        let mut rows = HashMap::new();
        for (number, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let field = |index: usize| {
                fields.get(index).copied().ok_or_else(|| {
                    PaleoError::malformed(origin, format!("row {} is missing a column", number + 1))
                })
            };
            let era: Era = field(era_col)?
                .parse()
                .map_err(|e| PaleoError::malformed(origin, e))?;
            let magnitude: u32 = field(year_col)?
                .parse()
                .map_err(|e| PaleoError::malformed(origin, e))?;
            let year_ad = YearPoint::new(magnitude, era).year_ad();
            if !spans.iter().any(|span| span.contains(year_ad)) {
                continue;
            }

            let code = field(month_col)?;
            let month = code
                .chars()
                .next()
                .filter(|c| code.len() == 1 && month_index(*c).is_some())
                .ok_or_else(|| PaleoError::malformed(origin, format!("invalid month code '{code}'")))?;
            let value: f64 = field(value_col)?
                .parse()
                .map_err(|e| PaleoError::malformed(origin, e))?;
            rows.insert((era, magnitude, month), value);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, year: YearPoint, month_index: usize) -> Option<f64> {
        let code = month_code(month_index).ok()?;
        self.rows.get(&(year.era, year.magnitude, code)).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LoadedSeries {
    parameter: ParameterId,
    span: YearSpan,
    reference: Option<YearSpan>,
    table: ScalarSeriesTable,
}

/// The series table of the current request
#[derive(Debug)]
pub struct ScalarSeriesCache {
    source: Arc<dyn ByteSource>,
    skip_zero_values: bool,
    loaded: Option<LoadedSeries>,
    reads: usize,
}

impl ScalarSeriesCache {
    /// `skip_zero_values` drops rows whose value is exactly zero on fetch
    pub fn new(source: Arc<dyn ByteSource>, skip_zero_values: bool) -> Self {
        Self {
            source,
            skip_zero_values,
            loaded: None,
            reads: 0,
        }
    }

    /// Load the rows covering `span` and the optional delta reference span
    ///
    /// Each span is padded by one year below so that months crossing the year
    /// boundary can be fetched. The backing file is only re-read when the
    /// request differs from the loaded one.
    pub fn load(
        &mut self,
        parameter: ParameterId,
        span: &YearSpan,
        reference: Option<&YearSpan>,
    ) -> PaleoResult<()> {
        if let Some(loaded) = &self.loaded {
            if loaded.parameter == parameter
                && loaded.span == *span
                && loaded.reference.as_ref() == reference
            {
                return Ok(());
            }
        }

        let path = series_file_path(parameter)?;
        let text = self
            .source
            .read_to_string(&path, &format!("{} data", parameter.title()))?;
        self.reads += 1;

        let mut spans = vec![YearSpan::new(span.from_ad - 1, span.until_ad)];
        if let Some(reference) = reference {
            spans.push(YearSpan::new(reference.from_ad - 1, reference.until_ad));
        }
        let table = ScalarSeriesTable::parse(&text, parameter, &spans, &self.source.locate(&path))?;
        debug!(
            "Loaded {} {} rows for {}",
            table.len(),
            parameter,
            span.label()
        );

        self.loaded = Some(LoadedSeries {
            parameter,
            span: *span,
            reference: reference.copied(),
            table,
        });
        Ok(())
    }

    /// Values of the requested months of a year, in rearranged month order
    ///
    /// Months without a row are skipped, as are zero values when configured.
    pub fn fetch(
        &self,
        parameter: ParameterId,
        year_ad: YearAD,
        month_indices: &[usize],
    ) -> PaleoResult<Vec<f64>> {
        let table = match &self.loaded {
            Some(loaded) if loaded.parameter == parameter => &loaded.table,
            _ => {
                return Err(PaleoError::InvalidRequest(format!(
                    "{} series has not been loaded",
                    parameter.title()
                )))
            }
        };

        let ordered = rearrange_month_indices(month_indices);
        Ok(month_years(year_ad, &ordered)
            .into_iter()
            .filter_map(|(year, month)| table.get(YearPoint::from_year_ad(year), month))
            .filter(|value| !(self.skip_zero_values && *value == 0.0))
            .collect())
    }

    /// Drop the loaded table
    pub fn clear(&mut self) {
        self.loaded = None;
    }

    /// Number of times the backing file has been read
    pub fn read_count(&self) -> usize {
        self.reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalDirectory;

    const SERIES: &str = "BP/AD Yrs Months SOI
BP 11 L 9.0
BP 10 A 1.5
BP 10 B 0.0
BP 10 C -2.5
BP 10 L nan
BP 500 A 7.0
AD 1988 A 3.0
AD 1989 A 4.0
";

    fn cache(skip_zero_values: bool) -> (tempfile::TempDir, ScalarSeriesCache) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("South_Oscillation_Index.txt"), SERIES).unwrap();
        let source = Arc::new(LocalDirectory::new(dir.path()));
        (dir, ScalarSeriesCache::new(source, skip_zero_values))
    }

    #[test]
    fn filters_to_requested_spans() {
        let table = ScalarSeriesTable::parse(
            SERIES,
            ParameterId::Soi,
            &[YearSpan::new(1939, 1940)],
            "memory",
        )
        .unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.get(YearPoint::new(10, Era::BP), 2), Some(-2.5));
        assert_eq!(table.get(YearPoint::new(500, Era::BP), 0), None);
    }

    #[test]
    fn skips_zero_values_by_default() {
        let (_dir, mut cache) = cache(true);
        cache.load(ParameterId::Soi, &YearSpan::new(1940, 1940), None).unwrap();
        let values = cache.fetch(ParameterId::Soi, 1940, &[0, 1, 2]).unwrap();
        assert_eq!(values, vec![1.5, -2.5]);
    }

    #[test]
    fn keeps_zero_values_when_disabled() {
        let (_dir, mut cache) = cache(false);
        cache.load(ParameterId::Soi, &YearSpan::new(1940, 1940), None).unwrap();
        let values = cache.fetch(ParameterId::Soi, 1940, &[0, 1, 2]).unwrap();
        assert_eq!(values, vec![1.5, 0.0, -2.5]);
    }

    #[test]
    fn crossing_months_read_previous_year() {
        let (_dir, mut cache) = cache(true);
        cache.load(ParameterId::Soi, &YearSpan::new(1940, 1940), None).unwrap();
        // December comes from 1939 (11BP), January from 1940 (10BP)
        let values = cache.fetch(ParameterId::Soi, 1940, &[0, 11]).unwrap();
        assert_eq!(values, vec![9.0, 1.5]);
    }

    #[test]
    fn missing_rows_are_skipped_and_nan_kept() {
        let (_dir, mut cache) = cache(true);
        cache.load(ParameterId::Soi, &YearSpan::new(1940, 1941), None).unwrap();
        assert!(cache.fetch(ParameterId::Soi, 1941, &[0, 1]).unwrap().is_empty());

        let values = cache.fetch(ParameterId::Soi, 1941, &[0, 11]).unwrap();
        assert_eq!(values.len(), 1);
        assert!(values[0].is_nan());
    }

    #[test]
    fn reference_span_is_retained() {
        let (_dir, mut cache) = cache(true);
        cache
            .load(ParameterId::Soi, &YearSpan::new(1989, 1989), Some(&YearSpan::new(1940, 1940)))
            .unwrap();
        assert_eq!(cache.fetch(ParameterId::Soi, 1989, &[0]).unwrap(), vec![4.0]);
        assert_eq!(cache.fetch(ParameterId::Soi, 1988, &[0]).unwrap(), vec![3.0]);
        assert_eq!(cache.fetch(ParameterId::Soi, 1940, &[0]).unwrap(), vec![1.5]);
        assert!(cache.fetch(ParameterId::Soi, 1450, &[0]).unwrap().is_empty());
    }

    #[test]
    fn repeated_load_reuses_table() {
        let (_dir, mut cache) = cache(true);
        let span = YearSpan::new(1940, 1940);
        cache.load(ParameterId::Soi, &span, None).unwrap();
        cache.load(ParameterId::Soi, &span, None).unwrap();
        assert_eq!(cache.read_count(), 1);
        cache.load(ParameterId::Soi, &YearSpan::new(1930, 1940), None).unwrap();
        assert_eq!(cache.read_count(), 2);
    }

    #[test]
    fn fetch_before_load_fails() {
        let (_dir, cache) = cache(true);
        assert!(matches!(
            cache.fetch(ParameterId::Soi, 1940, &[0]),
            Err(PaleoError::InvalidRequest(_))
        ));
    }

    #[test]
    fn missing_and_undefined_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ScalarSeriesCache::new(Arc::new(LocalDirectory::new(dir.path())), true);
        assert!(matches!(
            cache.load(ParameterId::Soi, &YearSpan::new(1940, 1940), None),
            Err(PaleoError::DataNotFound { .. })
        ));
        assert!(matches!(
            cache.load(ParameterId::Enso, &YearSpan::new(1940, 1940), None),
            Err(PaleoError::DataLocationUndefined { .. })
        ));
    }

    #[test]
    fn rejects_missing_columns() {
        let result = ScalarSeriesTable::parse(
            "BP/AD Yrs Value\nBP 10 1.0\n",
            ParameterId::Soi,
            &[YearSpan::new(1939, 1940)],
            "memory",
        );
        assert!(matches!(result, Err(PaleoError::MalformedData { .. })));
    }

    #[test]
    fn damaged_rows_outside_spans_are_ignored() {
        let text = "BP/AD Yrs Months SOI\nBP 500 Q 1.0\nBP 400 A n/a\nBP 10 A 1.5\n";
        let table =
            ScalarSeriesTable::parse(text, ParameterId::Soi, &[YearSpan::new(1940, 1940)], "memory")
                .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(YearPoint::new(10, Era::BP), 0), Some(1.5));

        let result =
            ScalarSeriesTable::parse(text, ParameterId::Soi, &[YearSpan::new(1450, 1450)], "memory");
        assert!(matches!(result, Err(PaleoError::MalformedData { .. })));

        let result = ScalarSeriesTable::parse(
            "BP/AD Yrs Months SOI\nXX 500 A 1.0\n",
            ParameterId::Soi,
            &[YearSpan::new(1940, 1940)],
            "memory",
        );
        assert!(matches!(result, Err(PaleoError::MalformedData { .. })));
    }
}
