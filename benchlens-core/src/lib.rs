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

//! Benchlens core types
//!
//! Shared data model for the benchmark engine:
//! - **Rows**: normalized provider rows ([`RawRow`]) keyed by [`DateValue`]
//! - **Tables**: the flat/wide comparison output ([`BenchmarkTable`], [`OutputRow`])
//! - **Parameters**: validated aggregation inputs ([`BenchmarkParams`], [`QueryDimensions`])
//! - **Catalog**: the metrics and dimensions a user may pick from ([`MetricCatalog`])

pub mod catalog;
pub mod error;
pub mod params;
pub mod row;
pub mod table;

pub use catalog::MetricCatalog;
pub use error::{CoreError, Result};
pub use params::{BenchmarkParams, QueryDimensions};
pub use row::{round2, DateValue, RawRow};
pub use table::{BenchmarkTable, OutputRow};

/// Name of the date dimension; always the leading component of a group key.
pub const DATE_DIMENSION: &str = "date";

/// Placeholder for a dimension value a row does not carry.
pub const NOT_SET: &str = "(not set)";

/// Group label of averaged benchmark rows in the output table.
pub const BENCHMARK_GROUP: &str = "Benchmark";

/// Prefix every provider source identifier must carry.
pub const SOURCE_ID_PREFIX: &str = "properties/";
