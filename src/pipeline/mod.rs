//! Scorecard pipeline - ingest technician performance reports, classify
//! their reporting period, compute ranked KPIs with trends, and cache the
//! latest snapshot per period.

pub mod error;
pub mod fetch;
pub mod parse;
pub mod period;
pub mod rank;
pub mod run;
pub mod store;
pub mod types;
pub mod utils;

pub use error::PipelineError;
pub use period::ValidPeriod;
pub use types::*;
