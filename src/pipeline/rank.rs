//! Ranking engine - turn filtered report rows into ranked, formatted,
//! trend-annotated KPIs.
//!
//! The metric list is a closed enumeration: each metric knows which columns
//! feed it, how its value is derived from a technician's totals, and how it
//! is displayed. Ranking is a full recomputation every time; nothing is
//! updated incrementally.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::period::ValidPeriod;
use crate::pipeline::types::{OverallStats, RankedKpis, RankedTechnician, ReportRow};
use crate::pipeline::utils::{format_currency, format_decimal, format_percent};

/// The tracked technician metrics, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalRevenue,
    TotalSales,
    OpportunityJobAverage,
    CloseRate,
    OptionsPerOpportunity,
    MembershipsSold,
    MembershipConversionRate,
    BillableHours,
    Leads,
    LeadsBooked,
}

enum MetricFormat {
    Currency,
    Percent,
    Decimal(usize),
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::TotalRevenue,
        Metric::TotalSales,
        Metric::OpportunityJobAverage,
        Metric::CloseRate,
        Metric::OptionsPerOpportunity,
        Metric::MembershipsSold,
        Metric::MembershipConversionRate,
        Metric::BillableHours,
        Metric::Leads,
        Metric::LeadsBooked,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::TotalRevenue => "Total Revenue",
            Metric::TotalSales => "Total Sales",
            Metric::OpportunityJobAverage => "Opportunity Job Average",
            Metric::CloseRate => "Close Rate",
            Metric::OptionsPerOpportunity => "Options Per Opportunity",
            Metric::MembershipsSold => "Memberships Sold",
            Metric::MembershipConversionRate => "Membership Conversion Rate",
            Metric::BillableHours => "Billable Hours",
            Metric::Leads => "Leads",
            Metric::LeadsBooked => "Leads Booked",
        }
    }

    fn format(self) -> MetricFormat {
        match self {
            Metric::TotalRevenue | Metric::TotalSales | Metric::OpportunityJobAverage => {
                MetricFormat::Currency
            }
            Metric::CloseRate | Metric::MembershipConversionRate => MetricFormat::Percent,
            Metric::OptionsPerOpportunity => MetricFormat::Decimal(1),
            Metric::BillableHours => MetricFormat::Decimal(1),
            Metric::MembershipsSold | Metric::Leads | Metric::LeadsBooked => {
                MetricFormat::Decimal(0)
            }
        }
    }

    pub fn display(self, value: f64) -> String {
        match self.format() {
            MetricFormat::Currency => format_currency(value),
            MetricFormat::Percent => format_percent(value),
            MetricFormat::Decimal(precision) => format_decimal(value, precision),
        }
    }
}

/// Summed numeric fields for one technician across all their rows in a
/// period. Synonym column names cover export variations between sources.
#[derive(Debug, Clone, Default)]
struct TechnicianTotals {
    name: String,
    revenue: f64,
    sales: f64,
    jobs: f64,
    opportunities: f64,
    conversions: f64,
    options: f64,
    memberships: f64,
    hours: f64,
    leads: f64,
    leads_booked: f64,
}

impl TechnicianTotals {
    fn absorb(&mut self, row: &ReportRow) {
        self.revenue += row.number_any(&["revenue", "completed revenue", "total revenue"]);
        self.sales += row.number_any(&["sales", "total sales"]);
        self.jobs += row.number_any(&["jobs", "completed jobs", "job count"]);
        self.opportunities += row.number_any(&["opportunities", "opportunity count"]);
        self.conversions += row.number_any(&["conversions", "converted", "converted jobs"]);
        self.options += row.number_any(&["options", "options presented"]);
        self.memberships += row.number_any(&["memberships", "memberships sold"]);
        self.hours += row.number_any(&["hours", "billable hours"]);
        self.leads += row.number_any(&["leads", "tech lead", "tech leads"]);
        self.leads_booked += row.number_any(&["leads booked", "booked leads"]);
    }

    fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalRevenue => self.revenue,
            Metric::TotalSales => self.sales,
            Metric::OpportunityJobAverage => ratio(self.revenue, self.opportunities),
            Metric::CloseRate => ratio(self.conversions, self.opportunities) * 100.0,
            Metric::OptionsPerOpportunity => ratio(self.options, self.opportunities),
            Metric::MembershipsSold => self.memberships,
            Metric::MembershipConversionRate => {
                ratio(self.memberships, self.opportunities) * 100.0
            }
            Metric::BillableHours => self.hours,
            Metric::Leads => self.leads,
            Metric::LeadsBooked => self.leads_booked,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Drop rows with no technician name and rows whose technician name
/// case-insensitively contains any excluded entry. Applied once, before any
/// aggregation or sorting.
pub fn filter_rows<'a>(rows: &'a [ReportRow], excluded: &[&str]) -> Vec<&'a ReportRow> {
    rows.iter()
        .filter(|row| {
            let name = row.technician();
            if name.is_empty() {
                return false;
            }
            let lower = name.to_lowercase();
            !excluded
                .iter()
                .any(|entry| lower.contains(&entry.to_lowercase()))
        })
        .collect()
}

/// Sum rows per technician. Grouping key is the case-folded trimmed name;
/// the display name keeps the first-seen casing. Insertion order of first
/// appearance is preserved so ties rank by stable input order.
fn aggregate(rows: &[&ReportRow]) -> Vec<TechnicianTotals> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, TechnicianTotals> = BTreeMap::new();

    for row in rows {
        let name = row.technician();
        let key = name.to_lowercase();

        let entry = totals.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            TechnicianTotals {
                name: name.to_string(),
                ..TechnicianTotals::default()
            }
        });
        entry.absorb(row);
    }

    order
        .into_iter()
        .map(|key| totals.remove(&key).unwrap_or_default())
        .collect()
}

/// Compute ranked KPIs for one period.
///
/// `previous` is the raw row set of the prior snapshot for the same period,
/// used to derive per-technician trends; `None` means this is the first
/// computation (all trends come back `None`). Empty filtered input is a
/// valid state and yields empty metric lists with zeroed overall stats.
pub fn compute_rankings(
    current: &[ReportRow],
    previous: Option<&[ReportRow]>,
    period: ValidPeriod,
    start: NaiveDate,
    end: NaiveDate,
    excluded: &[&str],
) -> RankedKpis {
    let current_totals = aggregate(&filter_rows(current, excluded));

    let previous_totals: BTreeMap<String, TechnicianTotals> = previous
        .map(|rows| {
            aggregate(&filter_rows(rows, excluded))
                .into_iter()
                .map(|t| (t.name.to_lowercase(), t))
                .collect()
        })
        .unwrap_or_default();

    let mut metrics = BTreeMap::new();
    for metric in Metric::ALL {
        metrics.insert(
            metric,
            rank_metric(metric, &current_totals, &previous_totals),
        );
    }

    let overall = overall_stats(&current_totals);
    let previous_overall = previous.map(|rows| {
        let totals = aggregate(&filter_rows(rows, excluded));
        overall_stats(&totals)
    });

    RankedKpis {
        period,
        start_date: start.format("%m/%d/%Y").to_string(),
        end_date: end.format("%m/%d/%Y").to_string(),
        metrics,
        overall,
        previous_overall,
    }
}

/// Rank every retained technician on one metric: stable descending sort by
/// value, 1-based contiguous ranks, trend against the previous totals when
/// the same technician appears there.
fn rank_metric(
    metric: Metric,
    current: &[TechnicianTotals],
    previous: &BTreeMap<String, TechnicianTotals>,
) -> Vec<RankedTechnician> {
    let mut entries: Vec<(&TechnicianTotals, f64)> = current
        .iter()
        .map(|totals| (totals, totals.value(metric)))
        .collect();

    // sort_by is stable, so equal values keep input order
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    entries
        .into_iter()
        .enumerate()
        .map(|(idx, (totals, value))| {
            let trend = previous
                .get(&totals.name.to_lowercase())
                .map(|prev| value - prev.value(metric));

            RankedTechnician {
                technician: totals.name.clone(),
                value,
                rank: idx as u32 + 1,
                trend,
                display: metric.display(value),
            }
        })
        .collect()
}

/// Company-wide totals: summed revenue, opportunity-weighted close rate,
/// average revenue per completed job.
fn overall_stats(totals: &[TechnicianTotals]) -> OverallStats {
    let revenue: f64 = totals.iter().map(|t| t.revenue).sum();
    let jobs: f64 = totals.iter().map(|t| t.jobs).sum();
    let opportunities: f64 = totals.iter().map(|t| t.opportunities).sum();
    let conversions: f64 = totals.iter().map(|t| t.conversions).sum();

    OverallStats {
        total_revenue: revenue,
        close_rate: ratio(conversions, opportunities) * 100.0,
        job_average: ratio(revenue, jobs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, fields: &[(&str, &str)]) -> ReportRow {
        let mut pairs = vec![("Technician", name.to_string())];
        pairs.extend(fields.iter().map(|(k, v)| (*k, v.to_string())));
        ReportRow::from_pairs(pairs)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn rankings(current: &[ReportRow], previous: Option<&[ReportRow]>) -> RankedKpis {
        compute_rankings(
            current,
            previous,
            ValidPeriod::Week,
            day(1),
            day(7),
            &["dispatch"],
        )
    }

    #[test]
    fn exclusion_is_case_insensitive_substring() {
        let rows = vec![
            row("Austin Brown", &[("Revenue", "15000")]),
            row("JOHN DISPATCH", &[("Revenue", "99999")]),
            row("", &[("Revenue", "5000")]),
        ];

        let kept = filter_rows(&rows, &["dispatch"]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].technician(), "Austin Brown");
    }

    #[test]
    fn ranks_are_contiguous_and_descending() {
        let rows = vec![
            row("Tia Vega", &[("Revenue", "9000")]),
            row("Austin Brown", &[("Revenue", "15000")]),
            row("Moe Ramos", &[("Revenue", "12000")]),
        ];

        let kpis = rankings(&rows, None);
        let revenue = &kpis.metrics[&Metric::TotalRevenue];

        let ranks: Vec<u32> = revenue.iter().map(|t| t.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(revenue[0].technician, "Austin Brown");
        assert_eq!(revenue[0].display, "$15,000");
        assert!(revenue.windows(2).all(|w| w[0].value >= w[1].value));
    }

    #[test]
    fn ties_keep_input_order() {
        let rows = vec![
            row("First In", &[("Revenue", "5000")]),
            row("Second In", &[("Revenue", "5000")]),
            row("Third In", &[("Revenue", "5000")]),
        ];

        let kpis = rankings(&rows, None);
        let revenue = &kpis.metrics[&Metric::TotalRevenue];
        let names: Vec<&str> = revenue.iter().map(|t| t.technician.as_str()).collect();
        assert_eq!(names, vec!["First In", "Second In", "Third In"]);
        assert_eq!(
            revenue.iter().map(|t| t.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn multi_row_sources_are_summed_per_technician() {
        let rows = vec![
            row("Austin Brown", &[("Revenue", "1000"), ("Jobs", "2")]),
            row("austin brown", &[("Revenue", "500"), ("Jobs", "1")]),
            row("Tia Vega", &[("Revenue", "900"), ("Jobs", "1")]),
        ];

        let kpis = rankings(&rows, None);
        let revenue = &kpis.metrics[&Metric::TotalRevenue];

        assert_eq!(revenue.len(), 2);
        assert_eq!(revenue[0].technician, "Austin Brown");
        assert_eq!(revenue[0].value, 1500.0);
    }

    #[test]
    fn trend_is_none_for_first_seen_technicians() {
        let current = vec![
            row("Austin Brown", &[("Revenue", "15000")]),
            row("New Hire", &[("Revenue", "4000")]),
        ];
        let previous = vec![row("Austin Brown", &[("Revenue", "12000")])];

        let kpis = rankings(&current, Some(&previous));
        let revenue = &kpis.metrics[&Metric::TotalRevenue];

        let austin = revenue.iter().find(|t| t.technician == "Austin Brown").unwrap();
        assert_eq!(austin.trend, Some(3000.0));

        let new_hire = revenue.iter().find(|t| t.technician == "New Hire").unwrap();
        assert_eq!(new_hire.trend, None);
    }

    #[test]
    fn rate_metric_trend_is_percentage_point_delta() {
        let current = vec![row(
            "Austin Brown",
            &[("Opportunities", "10"), ("Conversions", "8")],
        )];
        let previous = vec![row(
            "Austin Brown",
            &[("Opportunities", "10"), ("Conversions", "6")],
        )];

        let kpis = rankings(&current, Some(&previous));
        let close = &kpis.metrics[&Metric::CloseRate][0];
        assert_eq!(close.value, 80.0);
        assert_eq!(close.trend, Some(20.0));
        assert_eq!(close.display, "80.0%");
    }

    #[test]
    fn derived_metrics_guard_division_by_zero() {
        let rows = vec![row("Austin Brown", &[("Revenue", "5000")])];

        let kpis = rankings(&rows, None);
        assert_eq!(kpis.metrics[&Metric::CloseRate][0].value, 0.0);
        assert_eq!(kpis.metrics[&Metric::OpportunityJobAverage][0].value, 0.0);
        assert_eq!(kpis.overall.job_average, 0.0);
    }

    #[test]
    fn empty_scorecard_is_a_valid_state() {
        let rows = vec![row("JOHN DISPATCH", &[("Revenue", "5000")])];

        let kpis = rankings(&rows, None);
        assert!(kpis.metrics[&Metric::TotalRevenue].is_empty());
        assert_eq!(kpis.overall, OverallStats::default());
        assert_eq!(kpis.start_date, "02/01/2026");
        assert_eq!(kpis.end_date, "02/07/2026");
    }

    #[test]
    fn overall_close_rate_is_opportunity_weighted() {
        let rows = vec![
            row("A", &[("Opportunities", "10"), ("Conversions", "2"), ("Revenue", "100"), ("Jobs", "2")]),
            row("B", &[("Opportunities", "2"), ("Conversions", "2"), ("Revenue", "300"), ("Jobs", "2")]),
        ];

        let kpis = rankings(&rows, None);
        // 4 conversions over 12 opportunities, not the mean of 20% and 100%
        assert!((kpis.overall.close_rate - 33.333).abs() < 0.01);
        assert_eq!(kpis.overall.total_revenue, 400.0);
        assert_eq!(kpis.overall.job_average, 100.0);
    }

    #[test]
    fn display_formats_per_metric_type() {
        assert_eq!(Metric::TotalRevenue.display(15250.4), "$15,250");
        assert_eq!(Metric::CloseRate.display(62.5), "62.5%");
        assert_eq!(Metric::OptionsPerOpportunity.display(2.25), "2.2");
        assert_eq!(Metric::Leads.display(7.0), "7");
    }
}
