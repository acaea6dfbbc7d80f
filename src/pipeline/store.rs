//! Snapshot store - persist the most recent ranking snapshot per period and
//! serve it back.
//!
//! The store is an explicit interface injected into the pipeline rather than
//! module-level state. One logical table keyed by (period, report_date) is
//! the source of truth; later snapshots for the same period supersede rather
//! than delete earlier ones.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::pipeline::error::PipelineError;
use crate::pipeline::period::ValidPeriod;
use crate::pipeline::types::{ReportRow, Snapshot};

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upsert keyed by (period, report_date). Never touches a different
    /// date's row for the same period.
    async fn store(&self, snapshot: &Snapshot) -> Result<(), PipelineError>;

    /// The snapshot with the greatest report_date for this period, if any.
    async fn get_latest(&self, period: ValidPeriod) -> Result<Option<Snapshot>, PipelineError>;

    /// Raw rows of the most recent snapshot strictly before `before` for
    /// this period - the ranking engine's previous-period input. `None` on
    /// the first-ever computation for the period.
    async fn get_previous_rows(
        &self,
        period: ValidPeriod,
        before: NaiveDate,
    ) -> Result<Option<Vec<ReportRow>>, PipelineError>;

    /// Destructive admin operation: delete every cached snapshot. Returns
    /// the number of rows removed.
    async fn clear_all(&self) -> Result<u64, PipelineError>;
}

/// PostgreSQL-backed store. Expects the `scorecard_snapshots` table from
/// `schema.sql`; rankings and raw rows are stored as JSONB.
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        PgSnapshotStore { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    period: i32,
    report_date: NaiveDate,
    rankings: serde_json::Value,
    raw_rows: serde_json::Value,
    source_filename: Option<String>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<Snapshot, PipelineError> {
        let period = ValidPeriod::from_days(self.period as i64).ok_or_else(|| {
            PipelineError::CacheRead(format!("stored period {} is not valid", self.period))
        })?;
        let rankings = serde_json::from_value(self.rankings)
            .map_err(|e| PipelineError::CacheRead(format!("corrupt rankings json: {e}")))?;
        let raw_rows = serde_json::from_value(self.raw_rows)
            .map_err(|e| PipelineError::CacheRead(format!("corrupt raw rows json: {e}")))?;

        Ok(Snapshot {
            period,
            report_date: self.report_date,
            rankings,
            raw_rows,
            source_filename: self.source_filename,
        })
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn store(&self, snapshot: &Snapshot) -> Result<(), PipelineError> {
        let rankings = serde_json::to_value(&snapshot.rankings)
            .map_err(|e| PipelineError::CacheWrite(e.to_string()))?;
        let raw_rows = serde_json::to_value(&snapshot.raw_rows)
            .map_err(|e| PipelineError::CacheWrite(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO scorecard_snapshots (
                period, report_date, rankings, raw_rows, source_filename, created_at
            ) VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (period, report_date) DO UPDATE SET
                rankings = EXCLUDED.rankings,
                raw_rows = EXCLUDED.raw_rows,
                source_filename = EXCLUDED.source_filename,
                created_at = NOW()
            "#,
        )
        .bind(snapshot.period.days() as i32)
        .bind(snapshot.report_date)
        .bind(rankings)
        .bind(raw_rows)
        .bind(&snapshot.source_filename)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::CacheWrite(e.to_string()))?;

        info!(
            "Stored snapshot for {} period dated {}",
            snapshot.period, snapshot.report_date
        );
        Ok(())
    }

    async fn get_latest(&self, period: ValidPeriod) -> Result<Option<Snapshot>, PipelineError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT period, report_date, rankings, raw_rows, source_filename
            FROM scorecard_snapshots
            WHERE period = $1
            ORDER BY report_date DESC
            LIMIT 1
            "#,
        )
        .bind(period.days() as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::CacheRead(e.to_string()))?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn get_previous_rows(
        &self,
        period: ValidPeriod,
        before: NaiveDate,
    ) -> Result<Option<Vec<ReportRow>>, PipelineError> {
        let raw: Option<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT raw_rows
            FROM scorecard_snapshots
            WHERE period = $1 AND report_date < $2
            ORDER BY report_date DESC
            LIMIT 1
            "#,
        )
        .bind(period.days() as i32)
        .bind(before)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::CacheRead(e.to_string()))?;

        match raw {
            None => {
                debug!("No previous snapshot for {} period before {}", period, before);
                Ok(None)
            }
            Some(value) => {
                let rows = serde_json::from_value(value)
                    .map_err(|e| PipelineError::CacheRead(format!("corrupt raw rows json: {e}")))?;
                Ok(Some(rows))
            }
        }
    }

    async fn clear_all(&self) -> Result<u64, PipelineError> {
        let result = sqlx::query("DELETE FROM scorecard_snapshots")
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::CacheWrite(e.to_string()))?;

        info!("Cleared {} cached snapshots", result.rows_affected());
        Ok(result.rows_affected())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySnapshotStore;
    use super::*;
    use crate::pipeline::rank::compute_rankings;

    fn snapshot(period: ValidPeriod, day: u32) -> Snapshot {
        let date = NaiveDate::from_ymd_opt(2026, 2, day).unwrap();
        let rows = vec![ReportRow::from_pairs([
            ("Technician", format!("Tech {day}")),
            ("Revenue", "1000".to_string()),
        ])];
        let rankings = compute_rankings(&rows, None, period, date, date, &[]);
        Snapshot {
            period,
            report_date: date,
            rankings,
            raw_rows: rows,
            source_filename: None,
        }
    }

    #[tokio::test]
    async fn store_then_get_latest_round_trips() {
        let store = MemorySnapshotStore::default();
        let snap = snapshot(ValidPeriod::Week, 5);
        store.store(&snap).await.unwrap();

        let latest = store.get_latest(ValidPeriod::Week).await.unwrap().unwrap();
        assert_eq!(latest, snap);
        assert!(store.get_latest(ValidPeriod::Month).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_date_supersedes_for_get_latest() {
        let store = MemorySnapshotStore::default();
        store.store(&snapshot(ValidPeriod::Week, 5)).await.unwrap();
        store.store(&snapshot(ValidPeriod::Week, 12)).await.unwrap();

        let latest = store.get_latest(ValidPeriod::Week).await.unwrap().unwrap();
        assert_eq!(latest.report_date, NaiveDate::from_ymd_opt(2026, 2, 12).unwrap());
    }

    #[tokio::test]
    async fn same_date_store_is_an_upsert() {
        let store = MemorySnapshotStore::default();
        let mut snap = snapshot(ValidPeriod::Week, 5);
        store.store(&snap).await.unwrap();
        snap.source_filename = Some("resubmitted.xlsx".to_string());
        store.store(&snap).await.unwrap();

        let latest = store.get_latest(ValidPeriod::Week).await.unwrap().unwrap();
        assert_eq!(latest.source_filename.as_deref(), Some("resubmitted.xlsx"));
    }

    #[tokio::test]
    async fn previous_rows_are_strictly_before() {
        let store = MemorySnapshotStore::default();
        store.store(&snapshot(ValidPeriod::Week, 5)).await.unwrap();
        store.store(&snapshot(ValidPeriod::Week, 12)).await.unwrap();

        let before_12 = store
            .get_previous_rows(ValidPeriod::Week, NaiveDate::from_ymd_opt(2026, 2, 12).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before_12[0].technician(), "Tech 5");

        let before_5 = store
            .get_previous_rows(ValidPeriod::Week, NaiveDate::from_ymd_opt(2026, 2, 5).unwrap())
            .await
            .unwrap();
        assert!(before_5.is_none());
    }

    #[tokio::test]
    async fn clear_all_reports_removed_count() {
        let store = MemorySnapshotStore::default();
        store.store(&snapshot(ValidPeriod::Week, 5)).await.unwrap();
        store.store(&snapshot(ValidPeriod::Month, 5)).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.get_latest(ValidPeriod::Week).await.unwrap().is_none());
    }
}
