//! Pipeline error taxonomy.
//!
//! Every variant is recovered at per-period or per-file granularity; nothing
//! here is allowed to crash an invocation. The runner converts these into
//! entries in the structured run summary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The spreadsheet could not be read or the live API call failed.
    /// The source is skipped for this invocation.
    #[error("report source unavailable: {0}")]
    SourceUnavailable(String),

    /// Filename/subject carried no usable period signal. The report is
    /// dropped rather than silently bucketed into a default period.
    #[error("could not classify reporting period from \"{0}\"")]
    UnclassifiablePeriod(String),

    /// The source parsed but yielded zero usable rows. Treated the same as
    /// an unavailable source.
    #[error("report contained no usable rows")]
    EmptyReport,

    /// Snapshot read failed. The caller may continue without a trend
    /// baseline.
    #[error("snapshot read failed: {0}")]
    CacheRead(String),

    /// Snapshot write failed. The computed rankings are still returned to
    /// the immediate caller, but the period is marked failed since future
    /// trend computations will be missing a baseline.
    #[error("snapshot write failed: {0}")]
    CacheWrite(String),
}
