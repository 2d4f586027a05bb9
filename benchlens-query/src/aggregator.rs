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

//! Benchmark aggregation engine
//!
//! Fetches the primary source and every benchmark source in parallel, then
//! reduces the fetched rows on a single task:
//!
//! - benchmark rows are summed per [`GroupKey`] and divided by `N`, the number
//!   of benchmark sources that returned at least one row for the whole query
//!   (sparse keys are diluted by sources that had no row for them)
//! - primary rows are passed through, never mixed with benchmark values
//! - rounding to 2 decimals happens only when the output table is assembled

use crate::fetcher::{FetchError, RowFetcher, SourceFetch};
use crate::provider::ReportProvider;
use benchlens_core::{
    round2, BenchmarkParams, BenchmarkTable, CoreError, DateValue, OutputRow, QueryDimensions,
    RawRow, BENCHMARK_GROUP, NOT_SET,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Upper bound on parallel provider calls for one aggregation
pub const MAX_CONCURRENT_FETCHES: usize = 16;

pub const DEFAULT_CONCURRENT_FETCHES: usize = 8;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    InvalidParams(#[from] CoreError),

    /// No source produced rows and at least one source failed
    #[error("No usable data from any source. Errors: {}", summarize_errors(.errors))]
    NoUsableData { errors: BTreeMap<String, String> },

    #[error("Aggregation invariant violated: {0}")]
    InvariantViolation(String),
}

fn summarize_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(source, message)| format!("{}: {}", source, message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Parallel provider calls, clamped to `1..=MAX_CONCURRENT_FETCHES`
    pub max_concurrent_fetches: usize,
    /// Timeout applied to each source independently
    pub fetch_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_CONCURRENT_FETCHES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Result of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub table: BenchmarkTable,
    /// Failed sources and their messages; may be non-empty on success
    pub errors_by_source: BTreeMap<String, String>,
    /// Benchmark sources that returned at least one row (`N`)
    pub contributing_sources: usize,
    /// Benchmark sources requested, after de-duplication
    pub requested_sources: usize,
}

/// Grouping key: date first, then the selected dimension values in order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub date: DateValue,
    pub dimensions: Vec<String>,
}

impl GroupKey {
    /// Build the key for a row; absent values become `(not set)`.
    pub fn for_row(row: &RawRow, dimensions: &QueryDimensions) -> Self {
        Self {
            date: row
                .date
                .clone()
                .unwrap_or_else(|| DateValue::Raw(NOT_SET.to_string())),
            dimensions: dimensions
                .non_date()
                .iter()
                .map(|name| row.dimension(name).unwrap_or(NOT_SET).to_string())
                .collect(),
        }
    }
}

/// Running sum for one metric of one key
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct MetricAccumulator {
    sum: f64,
}

impl MetricAccumulator {
    fn add(&mut self, value: f64) {
        self.sum = saturating_add(self.sum, value);
    }
}

/// Finite inputs stay finite: overflow saturates at the `f64` range.
fn saturating_add(sum: f64, value: f64) -> f64 {
    (sum + value).clamp(f64::MIN, f64::MAX)
}

/// Sums for one group key
#[derive(Debug, Clone)]
struct AggregationBucket {
    /// Every selected metric, initialised to zero when the key is first seen
    metrics: BTreeMap<String, MetricAccumulator>,
    /// Benchmark sources (by position) that had a row for this key
    sources: BTreeSet<usize>,
}

impl AggregationBucket {
    fn new(metrics: &[String]) -> Self {
        Self {
            metrics: metrics
                .iter()
                .map(|m| (m.clone(), MetricAccumulator::default()))
                .collect(),
            sources: BTreeSet::new(),
        }
    }
}

/// Intermediate state owned by a single aggregation call
struct AggregationState<'a> {
    dimensions: &'a QueryDimensions,
    metrics: &'a [String],
    buckets: BTreeMap<GroupKey, AggregationBucket>,
    contributing_sources: usize,
}

impl<'a> AggregationState<'a> {
    fn new(dimensions: &'a QueryDimensions, metrics: &'a [String]) -> Self {
        Self {
            dimensions,
            metrics,
            buckets: BTreeMap::new(),
            contributing_sources: 0,
        }
    }

    /// Fold one benchmark source's rows into the buckets. Sources without
    /// rows do not count toward `N`.
    fn add_source(&mut self, source_index: usize, rows: &[RawRow]) {
        if rows.is_empty() {
            return;
        }
        self.contributing_sources += 1;

        for row in rows {
            let key = GroupKey::for_row(row, self.dimensions);
            let metrics = self.metrics;
            let bucket = self
                .buckets
                .entry(key)
                .or_insert_with(|| AggregationBucket::new(metrics));

            for metric in metrics {
                if let (Some(value), Some(acc)) = (row.metric(metric), bucket.metrics.get_mut(metric)) {
                    acc.add(value);
                }
            }
            bucket.sources.insert(source_index);
        }
    }

    /// Unrounded per-key averages, in key order.
    fn averages(self) -> Result<Vec<(GroupKey, Vec<f64>)>, AggregateError> {
        let n = self.contributing_sources;
        if n == 0 {
            if !self.buckets.is_empty() {
                error!(
                    buckets = self.buckets.len(),
                    "Benchmark buckets present without contributing sources"
                );
                return Err(AggregateError::InvariantViolation(format!(
                    "{} benchmark buckets but no contributing sources",
                    self.buckets.len()
                )));
            }
            return Ok(Vec::new());
        }

        let diluted = self
            .buckets
            .values()
            .filter(|bucket| bucket.sources.len() < n)
            .count();
        if diluted > 0 {
            debug!(
                diluted_keys = diluted,
                contributing_sources = n,
                "Some keys are missing from part of the benchmark group"
            );
        }

        let metrics = self.metrics;
        Ok(self
            .buckets
            .into_iter()
            .map(|(key, bucket)| {
                let values = metrics
                    .iter()
                    .map(|m| bucket.metrics.get(m).map_or(0.0, |acc| acc.sum) / n as f64)
                    .collect();
                (key, values)
            })
            .collect())
    }
}

/// Primary rows by key. Rows sharing a key are summed.
fn primary_values(
    rows: &[RawRow],
    dimensions: &QueryDimensions,
    metrics: &[String],
) -> BTreeMap<GroupKey, Vec<f64>> {
    let mut by_key: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for row in rows {
        let values = by_key
            .entry(GroupKey::for_row(row, dimensions))
            .or_insert_with(|| vec![0.0; metrics.len()]);
        for (slot, metric) in values.iter_mut().zip(metrics) {
            *slot = saturating_add(*slot, row.metric(metric).unwrap_or(0.0));
        }
    }
    by_key
}

/// Combine already-fetched sources into the comparison table.
///
/// Pure function of its inputs; [`BenchmarkAggregator::aggregate`] calls it
/// once every fetch has completed.
pub fn combine_sources(
    primary_source_id: &str,
    primary: &SourceFetch,
    benchmarks: &[(String, SourceFetch)],
    dimensions: &QueryDimensions,
    metrics: &[String],
) -> Result<BenchmarkResult, AggregateError> {
    let mut errors_by_source = BTreeMap::new();
    let mut state = AggregationState::new(dimensions, metrics);

    let primary_rows: &[RawRow] = match primary {
        Ok(rows) => rows,
        Err(e) => {
            errors_by_source.insert(primary_source_id.to_string(), e.to_string());
            &[]
        }
    };

    for (index, (source_id, fetched)) in benchmarks.iter().enumerate() {
        match fetched {
            Ok(rows) => state.add_source(index, rows),
            Err(e) => {
                errors_by_source.insert(source_id.clone(), e.to_string());
            }
        }
    }

    let contributing_sources = state.contributing_sources;
    let averages = state.averages()?;

    let mut table = BenchmarkTable::new(dimensions.non_date().to_vec(), metrics.to_vec());

    for (key, values) in primary_values(primary_rows, dimensions, metrics) {
        table.push(OutputRow {
            group: primary_source_id.to_string(),
            date: key.date,
            dimension_values: key.dimensions,
            metric_values: values.into_iter().map(round2).collect(),
        });
    }

    for (key, values) in averages {
        table.push(OutputRow {
            group: BENCHMARK_GROUP.to_string(),
            date: key.date,
            dimension_values: key.dimensions,
            metric_values: values.into_iter().map(round2).collect(),
        });
    }

    if table.is_empty() && !errors_by_source.is_empty() {
        return Err(AggregateError::NoUsableData {
            errors: errors_by_source,
        });
    }

    table.sort();

    Ok(BenchmarkResult {
        table,
        errors_by_source,
        contributing_sources,
        requested_sources: benchmarks.len(),
    })
}

/// Orchestrates fetching and aggregation for one request at a time; holds no
/// state between calls.
pub struct BenchmarkAggregator {
    fetcher: Arc<RowFetcher>,
    config: AggregatorConfig,
}

impl BenchmarkAggregator {
    pub fn new(provider: Arc<dyn ReportProvider>, config: AggregatorConfig) -> Self {
        Self {
            fetcher: Arc::new(RowFetcher::new(provider)),
            config,
        }
    }

    /// Fetch every source and build the comparison table.
    pub async fn aggregate(
        &self,
        params: &BenchmarkParams,
    ) -> Result<BenchmarkResult, AggregateError> {
        params.validate()?;

        let start = Instant::now();
        let dimensions = params.query_dimensions();
        let metrics = params.unique_metrics();

        let mut benchmark_ids: Vec<String> = Vec::with_capacity(params.benchmark_source_ids.len());
        for id in &params.benchmark_source_ids {
            if !benchmark_ids.contains(id) {
                benchmark_ids.push(id.clone());
            }
        }

        let mut sources = Vec::with_capacity(benchmark_ids.len() + 1);
        sources.push(params.primary_source_id.clone());
        sources.extend(benchmark_ids.iter().cloned());

        let mut fetched = self.fetch_all(sources, &dimensions, &metrics, params).await;
        let (primary_id, primary) = fetched.remove(0);

        let result = combine_sources(&primary_id, &primary, &fetched, &dimensions, &metrics);

        match &result {
            Ok(result) => info!(
                primary = %primary_id,
                benchmark_sources = result.requested_sources,
                contributing_sources = result.contributing_sources,
                failed_sources = result.errors_by_source.len(),
                rows = result.table.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Benchmark aggregation completed"
            ),
            Err(e) => warn!(primary = %primary_id, error = %e, "Benchmark aggregation failed"),
        }

        result
    }

    /// Fetch all sources concurrently, preserving input order in the output.
    async fn fetch_all(
        &self,
        sources: Vec<String>,
        dimensions: &QueryDimensions,
        metrics: &[String],
        params: &BenchmarkParams,
    ) -> Vec<(String, SourceFetch)> {
        let permits = self
            .config
            .max_concurrent_fetches
            .clamp(1, MAX_CONCURRENT_FETCHES)
            .min(sources.len().max(1));
        let semaphore = Arc::new(Semaphore::new(permits));
        let request_dimensions = Arc::new(dimensions.request_names());
        let metrics = Arc::new(metrics.to_vec());
        let timeout = self.config.fetch_timeout;

        let mut tasks = Vec::with_capacity(sources.len());
        for source_id in &sources {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let dimensions = Arc::clone(&request_dimensions);
            let metrics = Arc::clone(&metrics);
            let source_id = source_id.clone();
            let (start_date, end_date) = (params.start_date, params.end_date);

            tasks.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(FetchError::Task(e.to_string())),
                };

                match tokio::time::timeout(
                    timeout,
                    fetcher.fetch(&source_id, &dimensions, &metrics, start_date, end_date),
                )
                .await
                {
                    Ok(fetched) => fetched,
                    Err(_) => Err(FetchError::Timeout(timeout)),
                }
            }));
        }

        let joined = futures::future::join_all(tasks).await;

        let mut results = Vec::with_capacity(sources.len());
        for (source_id, joined) in sources.into_iter().zip(joined) {
            let fetched = match joined {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!(source_id = %source_id, "Fetch task panicked: {}", e);
                    Err(FetchError::Task(e.to_string()))
                }
            };
            if let Err(e) = &fetched {
                warn!(source_id = %source_id, error = %e, "Source excluded from aggregation");
            }
            results.push((source_id, fetched));
        }

        results
    }
}
