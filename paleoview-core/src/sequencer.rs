//! Generating series of interval values.
//!
//! A [`SequenceRequest`] describes a period, a step between interval centres
//! and an interval size. The [`ClimateEngine`] evaluates the requested derived
//! parameter for each interval, optionally relative to a reference interval,
//! and optionally reduces gridded results to region statistics.
//!
//! The engine owns every cache. It is not meant to be shared between threads;
//! hosts serving concurrent requests should keep one engine per worker, or use
//! [`CacheScope::PerRequest`] to avoid carrying archive handles between runs.

use crate::archive::{ArchiveBackend, ArchiveHandleCache};
use crate::bias::BiasCorrector;
use crate::config::{CacheScope, EngineConfig};
use crate::delta::{series_delta, DeltaMode};
use crate::errors::{PaleoError, PaleoResult};
use crate::formula::{DerivedParameter, DerivedParameterRegistry, IntervalValue, MonthlyDataProvider};
use crate::grid::{Grid, GridStack};
use crate::loader::GridLoader;
use crate::months::{all_months, validate_months, MONTHS_PER_YEAR};
use crate::parameters::ParameterId;
use crate::region::{region_statistics, RegionMask, RegionStatistics};
use crate::scalar::ScalarSeriesCache;
use crate::source::{ByteSource, LocalDirectory};
use crate::time::{YearAD, YearSpan, EARLIEST_YEAR_AD, LATEST_YEAR_AD};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Months aggregated for each interval
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthSelection {
    /// One series over the listed months
    Months(Vec<usize>),
    /// Twelve independent series, one per calendar month
    AllMonths,
}

impl Default for MonthSelection {
    fn default() -> Self {
        MonthSelection::Months(all_months())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRequest {
    /// Centre of the reference interval
    pub reference_year_ad: YearAD,
    #[serde(default)]
    pub mode: DeltaMode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// One value (grid or scalar) per interval
    #[default]
    Grids,
    /// Region statistics of each interval grid
    Statistics,
}

/// A request for a series of interval values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRequest {
    /// Derived parameter group, e.g. `temperature`
    pub group: String,
    /// Derived parameter name, e.g. `isothermality`
    pub parameter: String,
    pub period_from_ad: YearAD,
    pub period_until_ad: YearAD,
    /// Years between interval centres
    #[serde(default = "default_interval")]
    pub step: u32,
    /// Years in each interval
    #[serde(default = "default_interval")]
    pub size: u32,
    #[serde(default)]
    pub months: MonthSelection,
    #[serde(default)]
    pub delta: Option<DeltaRequest>,
    #[serde(default)]
    pub output: OutputKind,
    #[serde(default)]
    pub correct_bias: bool,
}

fn default_interval() -> u32 {
    10
}

impl SequenceRequest {
    /// Every month, ten-year steps and ten-year intervals
    pub fn new(group: &str, parameter: &str, period_from_ad: YearAD, period_until_ad: YearAD) -> Self {
        Self {
            group: group.to_string(),
            parameter: parameter.to_string(),
            period_from_ad,
            period_until_ad,
            step: default_interval(),
            size: default_interval(),
            months: MonthSelection::default(),
            delta: None,
            output: OutputKind::default(),
            correct_bias: false,
        }
    }

    pub fn with_intervals(mut self, step: u32, size: u32) -> Self {
        self.step = step;
        self.size = size;
        self
    }

    pub fn with_months(mut self, months: MonthSelection) -> Self {
        self.months = months;
        self
    }

    pub fn with_delta(mut self, reference_year_ad: YearAD, mode: DeltaMode) -> Self {
        self.delta = Some(DeltaRequest {
            reference_year_ad,
            mode,
        });
        self
    }

    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    pub fn with_bias_correction(mut self, correct_bias: bool) -> Self {
        self.correct_bias = correct_bias;
        self
    }

    pub fn validate(&self) -> PaleoResult<()> {
        if self.step == 0 || self.size == 0 {
            return Err(PaleoError::InvalidRequest(
                "interval step and size must be positive".to_string(),
            ));
        }
        if self.period_from_ad > self.period_until_ad {
            return Err(PaleoError::InvalidRequest(format!(
                "period starts at {} after it ends at {}",
                self.period_from_ad, self.period_until_ad
            )));
        }
        let dataset = YearSpan::new(EARLIEST_YEAR_AD, LATEST_YEAR_AD);
        if !dataset.contains(self.period_from_ad) || !dataset.contains(self.period_until_ad) {
            return Err(PaleoError::InvalidRequest(format!(
                "period {}..={} lies outside the dataset {}",
                self.period_from_ad, self.period_until_ad, dataset
            )));
        }
        if self.size as usize > dataset.len() {
            return Err(PaleoError::InvalidRequest(format!(
                "interval size {} exceeds the {} years held by the dataset",
                self.size,
                dataset.len()
            )));
        }
        if let Some(delta) = &self.delta {
            if !dataset.contains(delta.reference_year_ad) {
                return Err(PaleoError::InvalidRequest(format!(
                    "reference year {} lies outside the dataset {}",
                    delta.reference_year_ad, dataset
                )));
            }
        }
        if let MonthSelection::Months(months) = &self.months {
            validate_months(months)?;
        }
        Ok(())
    }

    /// Interval centres from the start of the period, `step` years apart
    pub fn interval_centers(&self) -> Vec<YearAD> {
        if self.step == 0 || self.period_from_ad > self.period_until_ad {
            return Vec::new();
        }
        (self.period_from_ad..=self.period_until_ad)
            .step_by(self.step as usize)
            .collect()
    }

    /// Interval centred on `center`
    pub fn interval(&self, center: YearAD) -> YearSpan {
        YearSpan::centered(center, self.size)
    }

    /// Month selections evaluated as separate series
    pub fn month_passes(&self) -> Vec<Vec<usize>> {
        match &self.months {
            MonthSelection::Months(months) => vec![months.clone()],
            MonthSelection::AllMonths => (0..MONTHS_PER_YEAR).map(|m| vec![m]).collect(),
        }
    }
}

/// Position within a running sequence
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Year about to be evaluated
    pub year_ad: YearAD,
    /// Years evaluated so far
    pub completed: usize,
    /// Years the whole run evaluates
    pub total: usize,
}

/// Receives progress of a running sequence and may cancel it
pub trait SequenceObserver {
    fn on_progress(&mut self, _progress: Progress) {}

    /// Checked before each year; a cancelled run returns [`PaleoError::Cancelled`]
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl SequenceObserver for NoopObserver {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesData {
    Values(Vec<IntervalValue>),
    Statistics(RegionStatistics),
}

/// The series generated for one month selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthSeries {
    pub months: Vec<usize>,
    pub data: SeriesData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceOutput {
    pub interval_centers: Vec<YearAD>,
    /// One entry per month selection (twelve in all-months mode)
    pub series: Vec<MonthSeries>,
}

/// Monthly values of base parameters drawn from the engine's loaders
struct EngineData<'a> {
    loader: &'a mut GridLoader,
    bias: Option<&'a mut BiasCorrector>,
    scalars: &'a ScalarSeriesCache,
}

impl MonthlyDataProvider for EngineData<'_> {
    fn monthly_values(
        &mut self,
        parameter: ParameterId,
        year_ad: YearAD,
        month_indices: &[usize],
    ) -> PaleoResult<GridStack> {
        if !parameter.is_gridded() {
            let values = self.scalars.fetch(parameter, year_ad, month_indices)?;
            return GridStack::from_shape_vec((values.len(), 1, 1), values)
                .map_err(|e| PaleoError::malformed(parameter.name(), e));
        }
        let raw = self.loader.load_grids(parameter, year_ad, month_indices)?;
        match self.bias.as_deref_mut() {
            Some(bias) => bias.apply(parameter, raw, month_indices),
            None => Ok(raw),
        }
    }
}

/// Data access and aggregation over one dataset
#[derive(Debug)]
pub struct ClimateEngine {
    loader: GridLoader,
    bias: BiasCorrector,
    scalars: ScalarSeriesCache,
    masks: Arc<dyn ByteSource>,
    registry: DerivedParameterRegistry,
    cache_scope: CacheScope,
}

impl ClimateEngine {
    /// Engine over explicit data sources
    pub fn with_sources(
        config: &EngineConfig,
        climate_data: Arc<dyn ByteSource>,
        bias_corrections: Arc<dyn ByteSource>,
        region_masks: Arc<dyn ByteSource>,
        archives: Box<dyn ArchiveBackend>,
    ) -> Self {
        let archives = ArchiveHandleCache::new(
            archives,
            config.archive.overlap_window,
            config.archive.handles_per_parameter,
        );
        Self {
            loader: GridLoader::new(Arc::clone(&climate_data), archives, config.storage),
            bias: BiasCorrector::new(bias_corrections),
            scalars: ScalarSeriesCache::new(climate_data, config.scalar.skip_zero_values),
            masks: region_masks,
            registry: DerivedParameterRegistry::standard(),
            cache_scope: config.archive.cache_scope,
        }
    }

    /// Engine over the local directories named in `config`
    ///
    /// Archives are read from the climate data directory when the `netcdf`
    /// feature is enabled; otherwise only flat files are available.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_sources(
            config,
            Arc::new(LocalDirectory::new(&config.climate_data_directory)),
            Arc::new(LocalDirectory::new(&config.bias_correction_directory)),
            Arc::new(LocalDirectory::new(&config.region_mask_directory)),
            local_archives(config),
        )
    }

    pub fn registry(&self) -> &DerivedParameterRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DerivedParameterRegistry {
        &mut self.registry
    }

    pub fn loader(&self) -> &GridLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut GridLoader {
        &mut self.loader
    }

    pub fn bias_corrector(&self) -> &BiasCorrector {
        &self.bias
    }

    pub fn scalar_series(&self) -> &ScalarSeriesCache {
        &self.scalars
    }

    /// Download intervals with an archive present for `parameter`
    pub fn available_intervals(&mut self, parameter: ParameterId) -> Vec<YearSpan> {
        self.loader.archives_mut().refresh_available();
        self.loader.archives_mut().available_intervals(parameter)
    }

    /// Whether data for `parameter` appears present across `span`
    pub fn data_present(&mut self, parameter: ParameterId, span: &YearSpan) -> bool {
        self.loader.archives_mut().refresh_available();
        self.loader.data_present(parameter, span)
    }

    /// Load a region mask, fixed or time-dependent
    pub fn load_region_mask(&self, region_code: &str, time_dependent: bool) -> PaleoResult<RegionMask> {
        if time_dependent {
            RegionMask::load_time_dependent(self.masks.as_ref(), region_code)
        } else {
            RegionMask::load(self.masks.as_ref(), region_code)
        }
    }

    /// Generate the series described by `request`
    ///
    /// Any failure aborts the whole run; no partial output is returned.
    pub fn generate(
        &mut self,
        request: &SequenceRequest,
        region: &RegionMask,
        observer: &mut dyn SequenceObserver,
    ) -> PaleoResult<SequenceOutput> {
        request.validate()?;
        let derived = self.registry.get(&request.group, &request.parameter)?.clone();
        let centers = request.interval_centers();
        let passes = request.month_passes();
        info!(
            "Generating {}/{} for {}..{} ({} intervals of {} years, {} series)",
            request.group,
            request.parameter,
            request.period_from_ad,
            request.period_until_ad,
            centers.len(),
            request.size,
            passes.len()
        );

        self.loader.begin_run(self.cache_scope == CacheScope::PerRequest);
        self.bias.clear();
        if !derived.is_gridded() {
            self.load_scalar_series(&derived, request)?;
        }

        let intervals_per_pass = centers.len() + usize::from(request.delta.is_some());
        let total = passes.len() * intervals_per_pass * request.size as usize;
        let mut completed = 0;
        let mut on_year = |year_ad: YearAD| {
            if observer.is_cancelled() {
                info!("Generation of {}/{} cancelled", request.group, request.parameter);
                return Err(PaleoError::Cancelled);
            }
            observer.on_progress(Progress {
                year_ad,
                completed,
                total,
            });
            completed += 1;
            Ok(())
        };

        let correct_bias = request.correct_bias && derived.is_gridded();
        let mut data = EngineData {
            loader: &mut self.loader,
            bias: if correct_bias { Some(&mut self.bias) } else { None },
            scalars: &self.scalars,
        };

        let mut series = Vec::with_capacity(passes.len());
        for months in passes {
            let mut values = Vec::with_capacity(centers.len());
            for center in &centers {
                let span = request.interval(*center);
                debug!("Interval {} ({})", center, span.label());
                values.push(derived.aggregate_interval(&mut data, &span, &months, &mut on_year)?);
            }

            if let Some(delta) = &request.delta {
                let reference_span = request.interval(delta.reference_year_ad);
                let reference =
                    derived.aggregate_interval(&mut data, &reference_span, &months, &mut on_year)?;
                values = series_delta(&values, &reference, delta.mode)?;
            }

            let data_of_pass = match request.output {
                OutputKind::Statistics if derived.is_gridded() => {
                    SeriesData::Statistics(statistics_of(&values, &centers, region)?)
                }
                _ => SeriesData::Values(values),
            };
            series.push(MonthSeries {
                months,
                data: data_of_pass,
            });
        }

        info!("Generated {}/{}", request.group, request.parameter);
        Ok(SequenceOutput {
            interval_centers: centers,
            series,
        })
    }

    /// Load the series rows covering every interval of the request
    fn load_scalar_series(&mut self, derived: &DerivedParameter, request: &SequenceRequest) -> PaleoResult<()> {
        let parameters = derived.base_parameters();
        let parameter = match parameters.as_slice() {
            [parameter] => *parameter,
            _ => {
                return Err(PaleoError::InvalidFormula(format!(
                    "{}: non-gridded formulas must reference exactly one series",
                    derived.name
                )))
            }
        };
        let span = YearSpan::new(
            request.interval(request.period_from_ad).from_ad,
            request.interval(request.period_until_ad).until_ad,
        );
        let reference = request
            .delta
            .map(|delta| request.interval(delta.reference_year_ad));
        self.scalars.load(parameter, &span, reference.as_ref())
    }
}

fn statistics_of(
    values: &[IntervalValue],
    centers: &[YearAD],
    region: &RegionMask,
) -> PaleoResult<RegionStatistics> {
    let grids = values
        .iter()
        .map(|value| {
            value.as_grid().cloned().ok_or_else(|| {
                PaleoError::InvalidRequest("region statistics need gridded values".to_string())
            })
        })
        .collect::<PaleoResult<Vec<Grid>>>()?;
    let masks = centers
        .iter()
        .map(|center| region.for_year(*center))
        .collect::<PaleoResult<Vec<&Grid>>>()?;
    region_statistics(&grids, &masks)
}

#[cfg(feature = "netcdf")]
fn local_archives(config: &EngineConfig) -> Box<dyn ArchiveBackend> {
    Box::new(crate::archive::netcdf::NetcdfDirectory::new(&config.climate_data_directory))
}

#[cfg(not(feature = "netcdf"))]
fn local_archives(config: &EngineConfig) -> Box<dyn ArchiveBackend> {
    if config.storage == crate::loader::StorageMode::Archive {
        log::warn!("Archive storage requested but archives can only be read with the netcdf feature enabled");
    }
    Box::new(crate::archive::MemoryArchiveStore::new(config.climate_data_directory.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchiveStore;

    #[test]
    fn interval_centres_and_windows() {
        let request = SequenceRequest::new("temperature", "mean-temperature", 1900, 1950).with_intervals(25, 10);
        assert_eq!(request.interval_centers(), vec![1900, 1925, 1950]);
        assert_eq!(request.interval(1925), YearSpan::new(1920, 1929));

        let odd = request.clone().with_intervals(10, 11);
        assert_eq!(odd.interval(1925), YearSpan::new(1920, 1930));
    }

    #[test]
    fn month_passes() {
        let request = SequenceRequest::new("temperature", "mean-temperature", 1900, 1950);
        assert_eq!(request.month_passes(), vec![all_months()]);
        let request = request.with_months(MonthSelection::AllMonths);
        let passes = request.month_passes();
        assert_eq!(passes.len(), 12);
        assert_eq!(passes[11], vec![11]);
    }

    #[test]
    fn validation() {
        let request = SequenceRequest::new("temperature", "mean-temperature", 1950, 1900);
        assert!(request.validate().is_err());
        let request = SequenceRequest::new("temperature", "mean-temperature", 1900, 1950).with_intervals(0, 10);
        assert!(request.validate().is_err());
        let request = SequenceRequest::new("temperature", "mean-temperature", 1900, 1950)
            .with_months(MonthSelection::Months(vec![12]));
        assert!(matches!(request.validate(), Err(PaleoError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_years_outside_dataset() {
        let request = SequenceRequest::new("temperature", "mean-temperature", EARLIEST_YEAR_AD, LATEST_YEAR_AD);
        assert!(request.validate().is_ok());
        let whole = request.clone().with_intervals(10, 22040);
        assert!(whole.validate().is_ok());

        let request = SequenceRequest::new("temperature", "mean-temperature", EARLIEST_YEAR_AD - 1, 1900);
        assert!(matches!(request.validate(), Err(PaleoError::InvalidRequest(_))));
        let request = SequenceRequest::new("temperature", "mean-temperature", 1900, 1990);
        assert!(matches!(request.validate(), Err(PaleoError::InvalidRequest(_))));
        let request = SequenceRequest::new("temperature", "mean-temperature", YearAD::MIN, YearAD::MAX);
        assert!(matches!(request.validate(), Err(PaleoError::InvalidRequest(_))));

        let request = SequenceRequest::new("temperature", "mean-temperature", 1900, 1950);
        assert!(request.clone().with_intervals(10, 22041).validate().is_err());
        assert!(request.clone().with_intervals(10, u32::MAX).validate().is_err());
        assert!(request.clone().with_delta(2000, DeltaMode::Absolute).validate().is_err());
        assert!(request.with_delta(1985, DeltaMode::Absolute).validate().is_ok());
    }

    #[test]
    fn requests_deserialize_with_defaults() {
        let request: SequenceRequest = serde_json::from_str(
            r#"{
                "group": "precipitation",
                "parameter": "mean-precipitation",
                "period_from_ad": -5000,
                "period_until_ad": -4000,
                "months": {"months": [11, 0, 1]},
                "delta": {"reference_year_ad": 1985, "mode": "percent"}
            }"#,
        )
        .unwrap();
        assert_eq!(request.step, 10);
        assert_eq!(request.size, 10);
        assert_eq!(request.months, MonthSelection::Months(vec![11, 0, 1]));
        assert_eq!(request.delta.unwrap().mode, DeltaMode::Percent);
        assert_eq!(request.output, OutputKind::Grids);
        assert!(!request.correct_bias);
    }

    #[test]
    fn unknown_parameter_fails_before_loading() {
        let config = EngineConfig::default();
        let empty = Arc::new(crate::source::LocalDirectory::new("/nonexistent"));
        let mut engine = ClimateEngine::with_sources(
            &config,
            empty.clone(),
            empty.clone(),
            empty,
            Box::new(MemoryArchiveStore::new("memory://")),
        );
        let request = SequenceRequest::new("temperature", "vorticity", 1900, 1950);
        assert!(matches!(
            engine.generate(&request, &RegionMask::global(), &mut NoopObserver),
            Err(PaleoError::UnknownParameter { .. })
        ));
    }
}
