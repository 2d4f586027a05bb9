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

//! Aggregation parameters

use crate::error::{CoreError, Result};
use crate::DATE_DIMENSION;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Field names reserved by the flat output record
const RESERVED_FIELDS: [&str; 2] = ["group", DATE_DIMENSION];

/// Inputs of one benchmark aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkParams {
    pub primary_source_id: String,
    pub benchmark_source_ids: Vec<String>,
    /// Metric API names, in display order
    pub metrics: Vec<String>,
    /// Non-date dimension API names, in display order. A `date` entry is
    /// tolerated and ignored.
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub start_date: NaiveDate,
    /// Inclusive
    pub end_date: NaiveDate,
}

impl BenchmarkParams {
    pub fn validate(&self) -> Result<()> {
        if self.primary_source_id.trim().is_empty() {
            return Err(invalid("a primary source is required"));
        }
        if self.benchmark_source_ids.is_empty() {
            return Err(invalid("at least one benchmark source is required"));
        }
        if self.benchmark_source_ids.contains(&self.primary_source_id) {
            return Err(invalid("the primary source cannot also be a benchmark source"));
        }
        if self.metrics.is_empty() {
            return Err(invalid("at least one metric is required"));
        }
        if self.start_date > self.end_date {
            return Err(invalid("start date must not be after end date"));
        }

        for metric in &self.metrics {
            if RESERVED_FIELDS.contains(&metric.as_str()) {
                return Err(invalid(&format!("'{}' is not a valid metric name", metric)));
            }
            if self.dimensions.contains(metric) {
                return Err(invalid(&format!(
                    "'{}' is selected both as metric and dimension",
                    metric
                )));
            }
        }
        if self.dimensions.iter().any(|d| d == "group") {
            return Err(invalid("'group' is not a valid dimension name"));
        }

        Ok(())
    }

    pub fn query_dimensions(&self) -> QueryDimensions {
        QueryDimensions::new(&self.dimensions)
    }

    /// Metric names with duplicates removed, first occurrence wins.
    pub fn unique_metrics(&self) -> Vec<String> {
        dedup_preserving_order(self.metrics.iter().map(String::as_str))
    }
}

/// The single ordered dimension list shared by the provider request and the
/// group key: `date` first, then the selected dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDimensions {
    non_date: Vec<String>,
}

impl QueryDimensions {
    pub fn new<S: AsRef<str>>(selected: &[S]) -> Self {
        let non_date = dedup_preserving_order(
            selected
                .iter()
                .map(AsRef::as_ref)
                .filter(|name| *name != DATE_DIMENSION),
        );
        Self { non_date }
    }

    /// Dimensions to request from the provider, `date` at position 0.
    pub fn request_names(&self) -> Vec<String> {
        std::iter::once(DATE_DIMENSION.to_string())
            .chain(self.non_date.iter().cloned())
            .collect()
    }

    /// Group key dimensions after the date component.
    pub fn non_date(&self) -> &[String] {
        &self.non_date
    }
}

fn dedup_preserving_order<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = Vec::new();
    for name in names {
        if !seen.iter().any(|s: &String| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

fn invalid(message: &str) -> CoreError {
    CoreError::InvalidParams(message.to_string())
}
