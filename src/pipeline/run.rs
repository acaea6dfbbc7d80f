//! Pipeline runner - orchestrate fetch, classify, rank, and store across
//! periods and report files.
//!
//! One invocation processes the four reporting windows sequentially. A
//! failure in one period is recorded in the run summary and never aborts the
//! rest; the summary is the invocation's result, so schedulers can treat
//! "3 of 4 succeeded" as a non-fatal, retriable outcome. A snapshot is only
//! written after a full ranking exists - no partial state ever lands in the
//! store.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::pipeline::error::PipelineError;
use crate::pipeline::fetch::ReportSource;
use crate::pipeline::parse::parse_report;
use crate::pipeline::period::{detect_period, ValidPeriod};
use crate::pipeline::rank::compute_rankings;
use crate::pipeline::store::SnapshotStore;
use crate::pipeline::types::{RankedKpis, Snapshot};

/// Outcome of one period's refresh within an invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodOutcome {
    pub period: ValidPeriod,
    /// Row count fed into ranking; zero when no rows were fetched.
    pub rows: usize,
    /// Computed rankings. Present even when the snapshot write failed, so a
    /// caller still gets the result it paid to compute; absent only when the
    /// period never produced rankings (fetch/parse failure).
    pub rankings: Option<RankedKpis>,
    pub error: Option<String>,
}

impl PeriodOutcome {
    fn failed(period: ValidPeriod, error: PipelineError) -> Self {
        PeriodOutcome {
            period,
            rows: 0,
            rankings: None,
            error: Some(error.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Structured result of a whole refresh invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub results: Vec<PeriodOutcome>,
    pub successful: usize,
    pub failed: usize,
}

impl RunSummary {
    fn from_results(results: Vec<PeriodOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.succeeded()).count();
        let failed = results.len() - successful;
        RunSummary {
            results,
            successful,
            failed,
        }
    }
}

/// Refresh every period from the live reporting API, pausing `delay` between
/// periods as cooperative backoff against upstream rate limits.
pub async fn refresh_all_periods(
    source: &dyn ReportSource,
    store: &dyn SnapshotStore,
    excluded: &[&str],
    delay: Duration,
) -> RunSummary {
    let today = Utc::now().date_naive();
    let mut results = Vec::with_capacity(ValidPeriod::ALL.len());

    for (idx, period) in ValidPeriod::ALL.into_iter().enumerate() {
        if idx > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = refresh_period(source, store, period, today, excluded).await;
        match &outcome.error {
            None => info!("Refreshed {} period ({} rows)", period, outcome.rows),
            Some(e) => warn!("Refresh failed for {} period: {}", period, e),
        }
        results.push(outcome);
    }

    RunSummary::from_results(results)
}

/// Fetch, rank, and store one period ending at `report_date`. A failed
/// snapshot write marks the period failed but still surfaces the computed
/// rankings in the outcome.
async fn refresh_period(
    source: &dyn ReportSource,
    store: &dyn SnapshotStore,
    period: ValidPeriod,
    report_date: NaiveDate,
    excluded: &[&str],
) -> PeriodOutcome {
    let start = report_date - ChronoDuration::days(period.days() - 1);

    let rows = match source.fetch_rows(start, report_date).await {
        Ok(rows) => rows,
        Err(e) => return PeriodOutcome::failed(period, e),
    };
    if rows.is_empty() {
        return PeriodOutcome::failed(period, PipelineError::EmptyReport);
    }

    let previous = previous_rows_or_none(store, period, report_date).await;
    let rankings = compute_rankings(&rows, previous.as_deref(), period, start, report_date, excluded);

    let row_count = rows.len();
    let store_result = store
        .store(&Snapshot {
            period,
            report_date,
            rankings: rankings.clone(),
            raw_rows: rows,
            source_filename: None,
        })
        .await;

    PeriodOutcome {
        period,
        rows: row_count,
        rankings: Some(rankings),
        error: store_result.err().map(|e| e.to_string()),
    }
}

/// Result of ingesting one report file. The snapshot is always the fully
/// computed one; `store_error` is set when it could not be persisted, in
/// which case the file counts as failed but the rankings are not lost.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub snapshot: Snapshot,
    pub store_error: Option<String>,
}

/// Ingest one uploaded/emailed report file: classify its period, parse its
/// rows, rank against the previous snapshot, and store. The filename's date
/// range, when present, fixes both the computation window and the snapshot's
/// report date; otherwise the window ends today.
pub async fn ingest_report(
    bytes: &[u8],
    filename: &str,
    subject: Option<&str>,
    store: &dyn SnapshotStore,
    excluded: &[&str],
) -> Result<IngestOutcome, PipelineError> {
    let detected = detect_period(filename, subject)?;
    let period = detected.period;

    let rows = parse_report(bytes, filename)?;
    if rows.is_empty() {
        return Err(PipelineError::EmptyReport);
    }

    let (start, end) = detected.date_range.unwrap_or_else(|| {
        let end = Utc::now().date_naive();
        (end - ChronoDuration::days(period.days() - 1), end)
    });

    let previous = previous_rows_or_none(store, period, end).await;
    let rankings = compute_rankings(&rows, previous.as_deref(), period, start, end, excluded);

    let snapshot = Snapshot {
        period,
        report_date: end,
        rankings,
        raw_rows: rows,
        source_filename: Some(filename.to_string()),
    };

    let store_error = match store.store(&snapshot).await {
        Ok(()) => {
            info!(
                "Ingested {} as a {} period snapshot dated {}",
                filename, period, end
            );
            None
        }
        Err(e) => {
            warn!("Computed rankings for {} but could not persist: {}", filename, e);
            Some(e.to_string())
        }
    };

    Ok(IngestOutcome {
        snapshot,
        store_error,
    })
}

/// A missing or unreadable baseline degrades trends to "no prior data"
/// rather than failing the period.
async fn previous_rows_or_none(
    store: &dyn SnapshotStore,
    period: ValidPeriod,
    before: NaiveDate,
) -> Option<Vec<crate::pipeline::types::ReportRow>> {
    match store.get_previous_rows(period, before).await {
        Ok(previous) => previous,
        Err(e) => {
            warn!("Could not load previous rows for {} period: {}", period, e);
            None
        }
    }
}
