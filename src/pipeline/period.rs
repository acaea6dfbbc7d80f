//! Period detection - classify a report batch into one reporting window.
//!
//! Reports arrive with human-authored filenames and email subjects
//! ("Technician Performance Board_Dated 01_29_26 - 02_05_26.xlsx"), so the
//! cadence has to be inferred. Detection is a pure function with a fixed
//! fallback order; when nothing matches, the report is rejected rather than
//! defaulted to some period.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::error::PipelineError;

/// The closed set of reporting windows. Every stored snapshot and every
/// cache lookup is keyed by one of these exact day counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ValidPeriod {
    Week,
    Month,
    Quarter,
    Year,
}

impl ValidPeriod {
    pub const ALL: [ValidPeriod; 4] = [
        ValidPeriod::Week,
        ValidPeriod::Month,
        ValidPeriod::Quarter,
        ValidPeriod::Year,
    ];

    /// Nominal day count for this window.
    pub fn days(self) -> i64 {
        match self {
            ValidPeriod::Week => 7,
            ValidPeriod::Month => 30,
            ValidPeriod::Quarter => 90,
            ValidPeriod::Year => 365,
        }
    }

    /// Exact-match selector used by the read API; arbitrary day counts are
    /// not accepted.
    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            7 => Some(ValidPeriod::Week),
            30 => Some(ValidPeriod::Month),
            90 => Some(ValidPeriod::Quarter),
            365 => Some(ValidPeriod::Year),
            _ => None,
        }
    }
}

impl From<ValidPeriod> for i64 {
    fn from(period: ValidPeriod) -> i64 {
        period.days()
    }
}

impl TryFrom<i64> for ValidPeriod {
    type Error = String;

    fn try_from(days: i64) -> Result<Self, Self::Error> {
        ValidPeriod::from_days(days).ok_or_else(|| format!("invalid period day count: {days}"))
    }
}

impl std::fmt::Display for ValidPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} day", self.days())
    }
}

/// Classification result. When a literal date range was found in the
/// filename or subject, the parsed dates come back too so ingestion can use
/// the range's end date as the snapshot's report date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPeriod {
    pub period: ValidPeriod,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

static DATE_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})[_/](\d{1,2})[_/](\d{2,4})\s*-\s*(\d{1,2})[_/](\d{1,2})[_/](\d{2,4})")
        .unwrap()
});

static DAY_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*[- ]?day").unwrap());

/// Bucket an inclusive day count into the nearest reporting window.
///
/// Report date ranges rarely land on exact boundaries (a "weekly" report
/// often spans 8 calendar days), hence the tolerance bands. The cutoffs are
/// heuristic: a 46-day report becomes a 90-day bucket even if 30 was
/// intended — see the boundary tests below.
pub fn bucket_day_count(days: i64) -> ValidPeriod {
    if days <= 10 {
        ValidPeriod::Week
    } else if days <= 45 {
        ValidPeriod::Month
    } else if days <= 120 {
        ValidPeriod::Quarter
    } else {
        ValidPeriod::Year
    }
}

/// Classify a report into exactly one period from its filename and optional
/// email subject. Fallback order, first match wins:
///
/// 1. A literal `M_D_Y - M_D_Y` (or `M/D/Y`) date range, filename first.
/// 2. An explicit "<N> day" token.
/// 3. Cadence keywords (weekly / monthly / quarterly / yearly / annual).
///
/// No match is an `UnclassifiablePeriod` error, never a silent default.
pub fn detect_period(filename: &str, subject: Option<&str>) -> Result<DetectedPeriod, PipelineError> {
    let haystacks = [Some(filename), subject];

    // Stage 1: explicit date range
    for text in haystacks.iter().flatten() {
        if let Some((start, end)) = find_date_range(text) {
            let day_count = (end - start).num_days() + 1;
            return Ok(DetectedPeriod {
                period: bucket_day_count(day_count),
                date_range: Some((start, end)),
            });
        }
    }

    // Stage 2: explicit day count
    for text in haystacks.iter().flatten() {
        let lower = text.to_lowercase();
        if let Some(caps) = DAY_COUNT_RE.captures(&lower) {
            if let Ok(days) = caps[1].parse::<i64>() {
                return Ok(DetectedPeriod {
                    period: bucket_day_count(days),
                    date_range: None,
                });
            }
        }
    }

    // Stage 3: cadence keywords
    for text in haystacks.iter().flatten() {
        let lower = text.to_lowercase();
        let period = if lower.contains("weekly") {
            Some(ValidPeriod::Week)
        } else if lower.contains("monthly") {
            Some(ValidPeriod::Month)
        } else if lower.contains("quarterly") {
            Some(ValidPeriod::Quarter)
        } else if lower.contains("yearly") || lower.contains("annual") {
            Some(ValidPeriod::Year)
        } else {
            None
        };

        if let Some(period) = period {
            return Ok(DetectedPeriod {
                period,
                date_range: None,
            });
        }
    }

    Err(PipelineError::UnclassifiablePeriod(filename.to_string()))
}

/// Find the first `M[_/]D[_/]Y - M[_/]D[_/]Y` range in a string. Two-digit
/// years are interpreted as 2000+YY. Calendar-invalid or reversed ranges are
/// ignored so detection can fall through to the next stage.
fn find_date_range(text: &str) -> Option<(NaiveDate, NaiveDate)> {
    let caps = DATE_RANGE_RE.captures(text)?;

    let start = parse_mdy(&caps[1], &caps[2], &caps[3])?;
    let end = parse_mdy(&caps[4], &caps[5], &caps[6])?;

    if end < start {
        return None;
    }

    Some((start, end))
}

fn parse_mdy(month: &str, day: &str, year: &str) -> Option<NaiveDate> {
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    let mut year: i32 = year.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket_day_count(10), ValidPeriod::Week);
        assert_eq!(bucket_day_count(11), ValidPeriod::Month);
        assert_eq!(bucket_day_count(45), ValidPeriod::Month);
        // Heuristic cutoff: a 46-day report lands in the quarterly bucket
        // even if a monthly report was intended.
        assert_eq!(bucket_day_count(46), ValidPeriod::Quarter);
        assert_eq!(bucket_day_count(120), ValidPeriod::Quarter);
        assert_eq!(bucket_day_count(121), ValidPeriod::Year);
    }

    #[test]
    fn detects_week_from_dated_filename() {
        let detected = detect_period(
            "Technician Performance Board_Dated 01_29_26 - 02_05_26.xlsx",
            None,
        )
        .unwrap();

        // 8 inclusive days falls in the <=10 weekly bucket
        assert_eq!(detected.period, ValidPeriod::Week);
        assert_eq!(
            detected.date_range,
            Some((ymd(2026, 1, 29), ymd(2026, 2, 5)))
        );
    }

    #[test]
    fn detects_range_with_slashes_and_four_digit_years() {
        let detected = detect_period("board 1/1/2026 - 3/31/2026.xlsx", None).unwrap();
        assert_eq!(detected.period, ValidPeriod::Quarter);
        assert_eq!(
            detected.date_range,
            Some((ymd(2026, 1, 1), ymd(2026, 3, 31)))
        );
    }

    #[test]
    fn filename_range_wins_over_subject_keyword() {
        let detected = detect_period(
            "perf 01_01_26 - 01_30_26.xlsx",
            Some("Yearly technician report"),
        )
        .unwrap();
        assert_eq!(detected.period, ValidPeriod::Month);
    }

    #[test]
    fn falls_back_to_day_count_token() {
        let detected = detect_period("tech-performance-90 day.xlsx", None).unwrap();
        assert_eq!(detected.period, ValidPeriod::Quarter);
        assert_eq!(detected.date_range, None);

        let detected = detect_period("report.xlsx", Some("365-day performance")).unwrap();
        assert_eq!(detected.period, ValidPeriod::Year);
    }

    #[test]
    fn falls_back_to_cadence_keywords() {
        assert_eq!(
            detect_period("Weekly Board.xlsx", None).unwrap().period,
            ValidPeriod::Week
        );
        assert_eq!(
            detect_period("board.xlsx", Some("Monthly performance"))
                .unwrap()
                .period,
            ValidPeriod::Month
        );
        assert_eq!(
            detect_period("Annual Review.xlsx", None).unwrap().period,
            ValidPeriod::Year
        );
    }

    #[test]
    fn no_signal_is_rejected_not_defaulted() {
        let err = detect_period("board.xlsx", Some("performance numbers")).unwrap_err();
        assert!(matches!(err, PipelineError::UnclassifiablePeriod(_)));
    }

    #[test]
    fn reversed_range_falls_through_to_keywords() {
        let detected = detect_period("weekly 02_05_26 - 01_29_26.xlsx", None).unwrap();
        assert_eq!(detected.period, ValidPeriod::Week);
        assert_eq!(detected.date_range, None);
    }

    #[test]
    fn period_selector_is_exact() {
        assert_eq!(ValidPeriod::from_days(30), Some(ValidPeriod::Month));
        assert_eq!(ValidPeriod::from_days(31), None);
        assert_eq!(ValidPeriod::from_days(0), None);
    }
}
