//! Data access and aggregation for multi-millennial gridded paleoclimate data.
//!
//! Monthly climate grids (72 latitude by 144 longitude cells) are read either
//! from flat text files or from partitioned archives, optionally bias
//! corrected, combined into derived parameters and averaged over intervals of
//! years. Series of interval values can be expressed relative to a reference
//! interval and reduced to area-weighted statistics over a region.
//!
//! The entry point is [`sequencer::ClimateEngine`].

pub mod archive;
pub mod bias;
pub mod config;
pub mod delta;
pub mod errors;
pub mod formula;
pub mod grid;
pub mod loader;
pub mod months;
pub mod naming;
pub mod parameters;
pub mod region;
pub mod scalar;
pub mod sequencer;
pub mod source;
pub mod time;
