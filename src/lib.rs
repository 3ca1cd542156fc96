//! Long-horizon visitor forecasts composed from annual survey totals, a
//! monthly occupancy series, stay durations and site trip ratios.

pub mod align;
pub mod compose;
pub mod db;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod seasonal;
pub mod sites;
pub mod stay;
pub mod stl;
pub mod trend;

pub use error::{ForecastError, Result};
