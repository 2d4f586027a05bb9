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

// Aggregation scenarios run end to end against an in-memory provider

use async_trait::async_trait;
use benchlens_core::{
    BenchmarkParams, DateValue, QueryDimensions, RawRow, BENCHMARK_GROUP, NOT_SET,
};
use benchlens_query::{
    combine_sources, AggregateError, AggregatorConfig, BenchmarkAggregator, FetchError,
    ProviderError, ProviderReport, ProviderRow, ReportProvider, ReportRequest, SourceSummary,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

enum Canned {
    Rows(Vec<(&'static str, &'static str, f64)>),
    Fail(ProviderError),
    Hang,
}

/// Serves `date, country` / `sessions` reports per source id
#[derive(Default)]
struct InMemoryProvider {
    sources: HashMap<String, Canned>,
}

impl InMemoryProvider {
    fn rows(mut self, id: &str, rows: Vec<(&'static str, &'static str, f64)>) -> Self {
        self.sources.insert(id.to_string(), Canned::Rows(rows));
        self
    }

    fn failing(mut self, id: &str, error: ProviderError) -> Self {
        self.sources.insert(id.to_string(), Canned::Fail(error));
        self
    }

    fn hanging(mut self, id: &str) -> Self {
        self.sources.insert(id.to_string(), Canned::Hang);
        self
    }
}

#[async_trait]
impl ReportProvider for InMemoryProvider {
    async fn run_report(&self, request: &ReportRequest) -> Result<ProviderReport, ProviderError> {
        let with_country = request.dimensions.iter().any(|d| d == "country");
        let mut report = ProviderReport {
            dimension_headers: request.dimensions.clone(),
            metric_headers: vec!["sessions".to_string()],
            rows: vec![],
        };

        match self.sources.get(&request.source_id) {
            None => {}
            Some(Canned::Fail(e)) => return Err(e.clone()),
            Some(Canned::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Some(Canned::Rows(rows)) => {
                for (date, country, sessions) in rows {
                    let mut dimension_values = vec![date.to_string()];
                    if with_country {
                        dimension_values.push(country.to_string());
                    }
                    report.rows.push(ProviderRow {
                        dimension_values,
                        metric_values: vec![sessions.to_string()],
                    });
                }
            }
        }
        Ok(report)
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>, ProviderError> {
        Ok(vec![])
    }
}

fn params(primary: &str, benchmarks: &[&str], dimensions: &[&str]) -> BenchmarkParams {
    BenchmarkParams {
        primary_source_id: primary.to_string(),
        benchmark_source_ids: benchmarks.iter().map(|s| s.to_string()).collect(),
        metrics: vec!["sessions".to_string()],
        dimensions: dimensions.iter().map(|s| s.to_string()).collect(),
        start_date: day(1),
        end_date: day(31),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn aggregator(provider: InMemoryProvider) -> BenchmarkAggregator {
    BenchmarkAggregator::new(Arc::new(provider), AggregatorConfig::default())
}

fn sessions_of<'a>(
    rows: impl Iterator<Item = &'a benchlens_core::OutputRow>,
) -> Vec<(DateValue, Vec<String>, f64)> {
    rows.map(|r| (r.date.clone(), r.dimension_values.clone(), r.metric_values[0]))
        .collect()
}

#[tokio::test]
async fn test_worked_scenario() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 100.0)])
        .rows("properties/B", vec![("20240101", "NL", 50.0)])
        .rows("properties/C", vec![("20240101", "NL", 70.0)]);

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B", "properties/C"], &[]))
        .await
        .unwrap();

    assert!(result.errors_by_source.is_empty());
    assert_eq!(result.contributing_sources, 2);
    assert_eq!(result.table.len(), 2);

    let benchmark: Vec<_> = sessions_of(result.table.rows_in_group(BENCHMARK_GROUP));
    assert_eq!(benchmark, vec![(DateValue::Day(day(1)), vec![], 60.0)]);

    let primary: Vec<_> = sessions_of(result.table.rows_in_group("properties/A"));
    assert_eq!(primary, vec![(DateValue::Day(day(1)), vec![], 100.0)]);
}

#[tokio::test]
async fn test_grouping_by_date_and_dimension() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![])
        .rows(
            "properties/B",
            vec![("20240101", "NL", 10.0), ("20240101", "BE", 4.0), ("20240102", "NL", 6.0)],
        )
        .rows("properties/C", vec![("20240101", "NL", 20.0), ("20240102", "NL", 2.0)]);

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B", "properties/C"], &["country"]))
        .await
        .unwrap();

    assert_eq!(result.table.dimensions, vec!["country"]);
    assert_eq!(
        sessions_of(result.table.rows_in_group(BENCHMARK_GROUP)),
        vec![
            (DateValue::Day(day(1)), vec!["BE".to_string()], 2.0),
            (DateValue::Day(day(1)), vec!["NL".to_string()], 15.0),
            (DateValue::Day(day(2)), vec!["NL".to_string()], 4.0),
        ]
    );
}

#[tokio::test]
async fn test_sparse_key_is_diluted_by_all_contributors() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 1.0)])
        .rows("properties/B", vec![("20240101", "NL", 30.0), ("20240102", "NL", 9.0)])
        .rows("properties/C", vec![("20240101", "NL", 30.0)])
        .rows("properties/D", vec![("20240101", "NL", 30.0)]);

    let result = aggregator(provider)
        .aggregate(&params(
            "properties/A",
            &["properties/B", "properties/C", "properties/D"],
            &[],
        ))
        .await
        .unwrap();

    assert_eq!(result.contributing_sources, 3);
    let benchmark = sessions_of(result.table.rows_in_group(BENCHMARK_GROUP));
    assert_eq!(benchmark[0].2, 30.0);
    // Only B has day 2, yet it is divided by all three contributors
    assert_eq!(benchmark[1].2, 3.0);
}

#[tokio::test]
async fn test_primary_passthrough_is_not_averaged() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 7.0), ("20240103", "NL", 11.0)])
        .rows("properties/B", vec![("20240101", "NL", 1000.0)]);

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B"], &["country"]))
        .await
        .unwrap();

    assert_eq!(
        sessions_of(result.table.rows_in_group("properties/A")),
        vec![
            (DateValue::Day(day(1)), vec!["NL".to_string()], 7.0),
            (DateValue::Day(day(3)), vec!["NL".to_string()], 11.0),
        ]
    );
}

#[tokio::test]
async fn test_primary_duplicate_keys_are_summed() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 7.0), ("20240101", "BE", 3.0)])
        .rows("properties/B", vec![("20240101", "NL", 1.0)]);

    // Without the country dimension both primary rows share the date key
    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B"], &[]))
        .await
        .unwrap();

    assert_eq!(
        sessions_of(result.table.rows_in_group("properties/A")),
        vec![(DateValue::Day(day(1)), vec![], 10.0)]
    );
}

#[tokio::test]
async fn test_idempotent_across_runs() {
    let provider = Arc::new(
        InMemoryProvider::default()
            .rows("properties/A", vec![("20240101", "NL", 3.0)])
            .rows("properties/B", vec![("20240101", "NL", 5.0), ("20240102", "BE", 1.0)])
            .rows("properties/C", vec![("20240102", "BE", 8.0)]),
    );
    let aggregator = BenchmarkAggregator::new(provider, AggregatorConfig::default());
    let request = params("properties/A", &["properties/B", "properties/C"], &["country"]);

    let first = aggregator.aggregate(&request).await.unwrap();
    let second = aggregator.aggregate(&request).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_partial_failure_is_tolerated() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 5.0)])
        .rows("properties/B", vec![("20240101", "NL", 40.0)])
        .failing(
            "properties/C",
            ProviderError::Api {
                status: 403,
                message: "permission denied".to_string(),
            },
        );

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B", "properties/C"], &[]))
        .await
        .unwrap();

    assert_eq!(result.contributing_sources, 1);
    assert_eq!(result.requested_sources, 2);
    assert!(result.errors_by_source["properties/C"].contains("permission denied"));
    let benchmark = sessions_of(result.table.rows_in_group(BENCHMARK_GROUP));
    assert_eq!(benchmark[0].2, 40.0);
}

#[tokio::test]
async fn test_invalid_identifier_is_a_per_source_error() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 5.0)])
        .rows("properties/B", vec![("20240101", "NL", 8.0)]);

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B", "12345"], &[]))
        .await
        .unwrap();

    assert_eq!(
        result.errors_by_source["12345"],
        FetchError::InvalidSourceIdentifier("12345".to_string()).to_string()
    );
    assert_eq!(result.contributing_sources, 1);
}

#[tokio::test]
async fn test_total_failure_is_no_usable_data() {
    let provider = InMemoryProvider::default()
        .failing("properties/A", ProviderError::Transport("connection reset".to_string()))
        .failing("properties/B", ProviderError::Transport("connection reset".to_string()));

    let err = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B"], &[]))
        .await
        .unwrap_err();

    match err {
        AggregateError::NoUsableData { errors } => {
            assert_eq!(errors.len(), 2);
            assert!(errors.contains_key("properties/A"));
            assert!(errors.contains_key("properties/B"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_empty_period_is_empty_success() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![])
        .rows("properties/B", vec![]);

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B"], &["country"]))
        .await
        .unwrap();

    assert!(result.table.is_empty());
    assert!(result.errors_by_source.is_empty());
    assert_eq!(result.contributing_sources, 0);
}

#[tokio::test]
async fn test_slow_source_times_out_alone() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![("20240101", "NL", 5.0)])
        .rows("properties/B", vec![("20240101", "NL", 12.0)])
        .hanging("properties/C");
    let config = AggregatorConfig {
        max_concurrent_fetches: 4,
        fetch_timeout: Duration::from_millis(200),
    };

    let result = BenchmarkAggregator::new(Arc::new(provider), config)
        .aggregate(&params("properties/A", &["properties/B", "properties/C"], &[]))
        .await
        .unwrap();

    assert!(result.errors_by_source["properties/C"].contains("timed out"));
    assert_eq!(result.contributing_sources, 1);
}

#[tokio::test]
async fn test_invalid_params_are_rejected_before_fetching() {
    let err = aggregator(InMemoryProvider::default())
        .aggregate(&params("properties/A", &["properties/A"], &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, AggregateError::InvalidParams(_)));
}

#[tokio::test]
async fn test_duplicate_benchmark_ids_count_once() {
    let provider = InMemoryProvider::default()
        .rows("properties/A", vec![])
        .rows("properties/B", vec![("20240101", "NL", 12.0)]);

    let result = aggregator(provider)
        .aggregate(&params("properties/A", &["properties/B", "properties/B"], &[]))
        .await
        .unwrap();

    assert_eq!(result.requested_sources, 1);
    assert_eq!(result.contributing_sources, 1);
    assert_eq!(sessions_of(result.table.rows_in_group(BENCHMARK_GROUP))[0].2, 12.0);
}

fn arb_source() -> impl Strategy<Value = Vec<(u32, Option<String>, u32)>> {
    prop::collection::vec(
        (
            1u32..=5,
            prop::option::of(prop::sample::select(vec!["NL".to_string(), "BE".to_string()])),
            0u32..1000,
        ),
        0..8,
    )
}

fn to_rows(rows: &[(u32, Option<String>, u32)]) -> Vec<RawRow> {
    rows.iter()
        .map(|(d, country, sessions)| {
            let row = RawRow::new(day(*d)).with_metric("sessions", *sessions as f64);
            match country {
                Some(c) => row.with_dimension("country", c.clone()),
                None => row,
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_one_benchmark_row_per_distinct_key(
        sources in prop::collection::vec(arb_source(), 1..4)
    ) {
        let dims = QueryDimensions::new(&["country"]);
        let metrics = vec!["sessions".to_string()];
        let benchmarks: Vec<(String, benchlens_query::SourceFetch)> = sources
            .iter()
            .enumerate()
            .map(|(i, rows)| (format!("properties/{}", i + 10), Ok(to_rows(rows))))
            .collect();

        let first = combine_sources("properties/1", &Ok(vec![]), &benchmarks, &dims, &metrics).unwrap();
        let second = combine_sources("properties/1", &Ok(vec![]), &benchmarks, &dims, &metrics).unwrap();
        prop_assert_eq!(&first, &second);

        let mut keys: Vec<(u32, String)> = sources
            .iter()
            .flatten()
            .map(|(d, c, _)| (*d, c.clone().unwrap_or_else(|| NOT_SET.to_string())))
            .collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(first.table.rows_in_group(BENCHMARK_GROUP).count(), keys.len());

        let contributing = sources.iter().filter(|rows| !rows.is_empty()).count();
        prop_assert_eq!(first.contributing_sources, contributing);
    }
}
