//! Paleoclimate grids over the last 22000 years.
//!
//! ```no_run
//! use paleoview::prelude::*;
//!
//! let mut engine = paleoview::open_engine("paleoview.toml")?;
//! let request = SequenceRequest::new("temperature", "mean-temperature", -10050, -9050)
//!     .with_intervals(100, 30)
//!     .with_delta(1975, DeltaMode::Absolute);
//! let output = engine.generate(&request, &RegionMask::global(), &mut NoopObserver)?;
//! println!("{} intervals", output.interval_centers.len());
//! # Ok::<(), paleoview::PaleoError>(())
//! ```

use std::path::Path;

pub use paleoview_core::*;
pub use paleoview_core::errors::{PaleoError, PaleoResult};

pub mod prelude {
    pub use paleoview_core::config::EngineConfig;
    pub use paleoview_core::delta::DeltaMode;
    pub use paleoview_core::errors::{PaleoError, PaleoResult};
    pub use paleoview_core::formula::{DerivedParameter, Expr, IntervalValue};
    pub use paleoview_core::loader::StorageMode;
    pub use paleoview_core::parameters::ParameterId;
    pub use paleoview_core::region::RegionMask;
    pub use paleoview_core::sequencer::{
        ClimateEngine, MonthSelection, NoopObserver, OutputKind, Progress, SequenceObserver,
        SequenceOutput, SequenceRequest, SeriesData,
    };
    pub use paleoview_core::time::{YearAD, YearPoint, YearSpan};
}

/// Build an engine from a TOML configuration file
pub fn open_engine(config_path: impl AsRef<Path>) -> PaleoResult<sequencer::ClimateEngine> {
    let config = config::EngineConfig::from_file(config_path)?;
    log::info!(
        "Opening climate data at {}",
        config.climate_data_directory.display()
    );
    Ok(sequencer::ClimateEngine::from_config(&config))
}
