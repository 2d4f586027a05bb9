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

//! Benchlens Query Engine
//!
//! Fetches provider rows for a primary source and its benchmark group,
//! aggregates them into a comparison table and summarises stored tables.

pub mod aggregator;
pub mod fetcher;
pub mod ga4;
pub mod provider;
pub mod summary;

pub use aggregator::{
    combine_sources, AggregateError, AggregatorConfig, BenchmarkAggregator, BenchmarkResult,
    GroupKey, DEFAULT_CONCURRENT_FETCHES, DEFAULT_FETCH_TIMEOUT, MAX_CONCURRENT_FETCHES,
};
pub use fetcher::{normalize_report, FetchError, RowFetcher, SourceFetch};
pub use ga4::{Ga4Config, Ga4Provider};
pub use provider::{
    ProviderError, ProviderReport, ProviderRow, ReportProvider, ReportRequest, SourceSummary,
};
pub use summary::{
    DerivedMetrics, DimensionBreakdown, Granularity, Kpi, MetricTrend, Period, ReportSummary,
    TrendSeries,
};
