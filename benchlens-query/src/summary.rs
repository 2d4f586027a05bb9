// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Report summary analytics
//!
//! Read-only views over a stored [`BenchmarkTable`]: headline KPIs, derived
//! ratios, trends at day/week/month granularity and per-dimension breakdowns.
//! Benchmark rows are already per-source averages, so they are summed as-is.

use benchlens_core::{round2, BenchmarkTable, MetricCatalog, OutputRow, BENCHMARK_GROUP};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SESSIONS: &str = "sessions";
const ENGAGED_SESSIONS: &str = "engagedSessions";
const PAGE_VIEWS: &str = "screenPageViews";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub primary_group: String,
    pub period: Option<Period>,
    pub kpis: Vec<Kpi>,
    /// Keyed by group (primary source id or `Benchmark`)
    pub derived: BTreeMap<String, DerivedMetrics>,
    pub trends: Vec<MetricTrend>,
    pub breakdowns: Vec<DimensionBreakdown>,
}

/// Earliest and latest parsed dates in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub metric: String,
    pub label: String,
    pub primary_total: f64,
    pub benchmark_total: f64,
    /// Relative difference to the benchmark, one decimal; 0 when the
    /// benchmark total is not positive
    pub diff_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views_per_session: Option<f64>,
}

impl DerivedMetrics {
    fn is_empty(&self) -> bool {
        self.engagement_rate.is_none() && self.views_per_session.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Day, Granularity::Week, Granularity::Month];

    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Granularity::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub granularity: Granularity,
    pub labels: Vec<NaiveDate>,
    pub primary: Vec<f64>,
    pub benchmark: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric: String,
    pub series: Vec<TrendSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionBreakdown {
    pub dimension: String,
    pub dimension_label: String,
    pub metric: String,
    pub metric_label: String,
    pub labels: Vec<String>,
    pub primary: Vec<f64>,
    pub benchmark: Vec<f64>,
}

impl ReportSummary {
    pub fn build(table: &BenchmarkTable, primary_group: &str, catalog: &MetricCatalog) -> Self {
        Self {
            primary_group: primary_group.to_string(),
            period: period(table),
            kpis: kpis(table, primary_group, catalog),
            derived: derived(table),
            trends: trends(table, primary_group),
            breakdowns: breakdowns(table, primary_group, catalog),
        }
    }
}

fn period(table: &BenchmarkTable) -> Option<Period> {
    let mut dates = table.rows.iter().filter_map(|row| row.date.as_date());
    let first = dates.next()?;
    let (start, end) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    Some(Period { start, end })
}

fn metric_total<'a>(rows: impl Iterator<Item = &'a OutputRow>, index: usize) -> f64 {
    rows.filter_map(|row| row.metric_values.get(index)).sum()
}

fn kpis(table: &BenchmarkTable, primary_group: &str, catalog: &MetricCatalog) -> Vec<Kpi> {
    table
        .metrics
        .iter()
        .enumerate()
        .map(|(index, metric)| {
            let primary_total = metric_total(table.rows_in_group(primary_group), index);
            let benchmark_total = metric_total(table.rows_in_group(BENCHMARK_GROUP), index);
            let diff_percentage = if benchmark_total > 0.0 {
                ((primary_total - benchmark_total) / benchmark_total * 1000.0).round() / 10.0
            } else {
                0.0
            };

            Kpi {
                metric: metric.clone(),
                label: catalog.metric_label(metric).to_string(),
                primary_total: round2(primary_total),
                benchmark_total: round2(benchmark_total),
                diff_percentage,
            }
        })
        .collect()
}

fn derived(table: &BenchmarkTable) -> BTreeMap<String, DerivedMetrics> {
    let Some(sessions) = table.metric_index(SESSIONS) else {
        return BTreeMap::new();
    };
    let engaged = table.metric_index(ENGAGED_SESSIONS);
    let views = table.metric_index(PAGE_VIEWS);

    let groups: BTreeSet<&str> = table.rows.iter().map(|row| row.group.as_str()).collect();

    let mut result = BTreeMap::new();
    for group in groups {
        let session_total = metric_total(table.rows_in_group(group), sessions);
        if session_total <= 0.0 {
            continue;
        }

        let metrics = DerivedMetrics {
            engagement_rate: engaged.map(|i| {
                round2(metric_total(table.rows_in_group(group), i) / session_total * 100.0)
            }),
            views_per_session: views
                .map(|i| round2(metric_total(table.rows_in_group(group), i) / session_total)),
        };
        if !metrics.is_empty() {
            result.insert(group.to_string(), metrics);
        }
    }
    result
}

/// Sum one metric per key for the primary and benchmark groups, then align
/// both sides on the union of keys.
fn aligned_sums<K: Ord + Clone>(
    table: &BenchmarkTable,
    primary_group: &str,
    metric_index: usize,
    key: impl Fn(&OutputRow) -> Option<K>,
) -> (Vec<K>, Vec<f64>, Vec<f64>) {
    let mut sums: BTreeMap<K, (f64, f64)> = BTreeMap::new();

    for row in &table.rows {
        let is_primary = row.group == primary_group;
        if !is_primary && row.group != BENCHMARK_GROUP {
            continue;
        }
        let (Some(k), Some(value)) = (key(row), row.metric_values.get(metric_index)) else {
            continue;
        };
        let entry = sums.entry(k).or_insert((0.0, 0.0));
        if is_primary {
            entry.0 += value;
        } else {
            entry.1 += value;
        }
    }

    let mut labels = Vec::with_capacity(sums.len());
    let mut primary = Vec::with_capacity(sums.len());
    let mut benchmark = Vec::with_capacity(sums.len());
    for (k, (p, b)) in sums {
        labels.push(k);
        primary.push(round2(p));
        benchmark.push(round2(b));
    }
    (labels, primary, benchmark)
}

fn trends(table: &BenchmarkTable, primary_group: &str) -> Vec<MetricTrend> {
    table
        .metrics
        .iter()
        .enumerate()
        .map(|(index, metric)| MetricTrend {
            metric: metric.clone(),
            series: Granularity::ALL
                .iter()
                .map(|&granularity| {
                    let (labels, primary, benchmark) =
                        aligned_sums(table, primary_group, index, |row| {
                            row.date.as_date().map(|d| granularity.bucket(d))
                        });
                    TrendSeries {
                        granularity,
                        labels,
                        primary,
                        benchmark,
                    }
                })
                .collect(),
        })
        .collect()
}

fn breakdowns(
    table: &BenchmarkTable,
    primary_group: &str,
    catalog: &MetricCatalog,
) -> Vec<DimensionBreakdown> {
    let mut result = Vec::new();
    for (dim_index, dimension) in table.dimensions.iter().enumerate() {
        for (metric_index, metric) in table.metrics.iter().enumerate() {
            let (labels, primary, benchmark) =
                aligned_sums(table, primary_group, metric_index, |row| {
                    row.dimension_values.get(dim_index).cloned()
                });
            result.push(DimensionBreakdown {
                dimension: dimension.clone(),
                dimension_label: catalog.dimension_label(dimension).to_string(),
                metric: metric.clone(),
                metric_label: catalog.metric_label(metric).to_string(),
                labels,
                primary,
                benchmark,
            });
        }
    }
    result
}
