//! Core data types for the scorecard pipeline
//! Pure data structures with no behavior beyond field access

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::period::ValidPeriod;
use crate::pipeline::utils::{normalize_header, parse_number};

/// Technician names filtered out of ranking input before computation.
/// Matching is case-insensitive substring, so "JOHN DISPATCH" is dropped
/// by the "dispatch" entry.
pub const EXCLUDED_TECHNICIANS: &[&str] = &["dispatch", "office", "warehouse", "csr"];

/// Header names tried, in order, when looking for the technician column.
pub const TECHNICIAN_KEYS: &[&str] = &["technician", "technician name", "tech", "name"];

/// One technician's raw metrics for one day/period, as extracted from a
/// spreadsheet or API payload. Source columns vary in presence and casing,
/// so the row is a normalized header -> cell mapping rather than a fixed
/// struct. Empty cells are stored as empty strings, never omitted keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub fields: BTreeMap<String, String>,
}

impl ReportRow {
    /// Build a row from raw (header, cell) pairs, normalizing headers once
    /// here so lookups downstream never re-trim or re-case.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (normalize_header(k.as_ref()), v.into()))
            .collect();
        ReportRow { fields }
    }

    /// Cell text for a normalized header, or "" when the column is absent.
    pub fn text(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    /// Lenient numeric read: strips currency/percent decoration, defaults
    /// to 0.0 for absent or unparseable cells so downstream arithmetic
    /// never hits a missing-value sentinel.
    pub fn number(&self, key: &str) -> f64 {
        parse_number(self.text(key))
    }

    /// First non-empty cell among several candidate headers. Source
    /// spreadsheets name the same column differently between exports.
    pub fn number_any(&self, keys: &[&str]) -> f64 {
        for key in keys {
            if !self.text(key).is_empty() {
                return self.number(key);
            }
        }
        0.0
    }

    /// The technician name cell, trimmed. Empty when no technician column
    /// is present or the cell is blank.
    pub fn technician(&self) -> &str {
        for key in TECHNICIAN_KEYS {
            let value = self.text(key).trim();
            if !value.is_empty() {
                return value;
            }
        }
        ""
    }

    /// True when every cell in the row is blank.
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(|v| v.trim().is_empty())
    }
}

/// A technician's computed value for one metric within one period.
/// Recomputed fully on every ranking calculation, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTechnician {
    pub technician: String,
    pub value: f64,
    /// 1-based position among all ranked technicians for this metric.
    pub rank: u32,
    /// Current minus previous period value. `None` means the technician has
    /// no prior-period data — distinct from a genuine zero delta.
    pub trend: Option<f64>,
    /// Human-formatted value (currency, percentage, or decimal per metric).
    pub display: String,
}

/// Company-wide stats for one period. Not technician-scoped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_revenue: f64,
    /// Weighted close rate: total conversions / total opportunities, in percent.
    pub close_rate: f64,
    /// Average revenue per completed job.
    pub job_average: f64,
}

/// The aggregate ranking result for one period.
///
/// Every metric's technician list is sorted descending by value with stable
/// ties, and rank fields are 1-based contiguous integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedKpis {
    pub period: ValidPeriod,
    /// Literal date-range strings used for the computation.
    pub start_date: String,
    pub end_date: String,
    pub metrics: BTreeMap<crate::pipeline::rank::Metric, Vec<RankedTechnician>>,
    pub overall: OverallStats,
    /// Previous-period counterpart for trend display; `None` on the
    /// first-ever computation for the period.
    pub previous_overall: Option<OverallStats>,
}

/// A persisted ranking snapshot. Raw input rows are retained alongside the
/// rankings so the next computation for the same period can use them as its
/// previous-period baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub period: ValidPeriod,
    pub report_date: NaiveDate,
    pub rankings: RankedKpis,
    pub raw_rows: Vec<ReportRow>,
    pub source_filename: Option<String>,
}
