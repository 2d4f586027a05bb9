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

//! Flat/wide comparison table
//!
//! Rows hold their dimension and metric values positionally, aligned with the
//! table's `dimensions` and `metrics` name lists, so a row can never carry a
//! field outside the caller's selection. On the wire every row is a flat
//! record: `{"group", "date", <dimension>..., <metric>...}`.

use crate::error::{CoreError, Result};
use crate::row::DateValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const GROUP_FIELD: &str = "group";
const DATE_FIELD: &str = "date";

/// One row of the comparison output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    /// Primary source id, or [`crate::BENCHMARK_GROUP`]
    pub group: String,
    pub date: DateValue,
    /// Values aligned with [`BenchmarkTable::dimensions`]
    pub dimension_values: Vec<String>,
    /// Values aligned with [`BenchmarkTable::metrics`], rounded to 2 decimals
    pub metric_values: Vec<f64>,
}

impl OutputRow {
    /// Ordering key: group, then date, then dimension values.
    fn sort_key(&self) -> (&str, &DateValue, &[String]) {
        (&self.group, &self.date, &self.dimension_values)
    }
}

/// The complete comparison dataset produced by one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRepr", into = "TableRepr")]
pub struct BenchmarkTable {
    /// Selected non-date dimensions, in selection order
    pub dimensions: Vec<String>,
    /// Selected metrics, in selection order
    pub metrics: Vec<String>,
    pub rows: Vec<OutputRow>,
}

impl BenchmarkTable {
    pub fn new(dimensions: Vec<String>, metrics: Vec<String>) -> Self {
        Self {
            dimensions,
            metrics,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: OutputRow) {
        debug_assert_eq!(row.dimension_values.len(), self.dimensions.len());
        debug_assert_eq!(row.metric_values.len(), self.metrics.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort rows by group, date and dimension values for deterministic output.
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    pub fn metric_index(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    /// Rows belonging to one group
    pub fn rows_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a OutputRow> {
        self.rows.iter().filter(move |row| row.group == group)
    }

    /// Flatten one row into a wide record.
    pub fn to_record(&self, row: &OutputRow) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(GROUP_FIELD.to_string(), Value::String(row.group.clone()));
        record.insert(DATE_FIELD.to_string(), Value::String(row.date.to_string()));
        for (name, value) in self.dimensions.iter().zip(&row.dimension_values) {
            record.insert(name.clone(), Value::String(value.clone()));
        }
        for (name, value) in self.metrics.iter().zip(&row.metric_values) {
            record.insert(name.clone(), serde_json::json!(value));
        }
        record
    }

    /// All rows as wide records, in table order.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows.iter().map(|row| self.to_record(row)).collect()
    }

    /// Rebuild a row from a wide record.
    pub fn from_record(&self, record: &Map<String, Value>) -> Result<OutputRow> {
        let group = string_field(record, GROUP_FIELD)?;
        let date = DateValue::parse_iso(&string_field(record, DATE_FIELD)?);

        let dimension_values = self
            .dimensions
            .iter()
            .map(|name| string_field(record, name))
            .collect::<Result<Vec<_>>>()?;

        let metric_values = self
            .metrics
            .iter()
            .map(|name| {
                record.get(name).and_then(Value::as_f64).ok_or_else(|| {
                    CoreError::MalformedRecord(format!("metric '{}' missing or not numeric", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OutputRow {
            group,
            date,
            dimension_values,
            metric_values,
        })
    }
}

fn string_field(record: &Map<String, Value>, name: &str) -> Result<String> {
    record
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::MalformedRecord(format!("field '{}' missing or not a string", name)))
}

/// Wire representation of [`BenchmarkTable`]
#[derive(Serialize, Deserialize)]
struct TableRepr {
    dimensions: Vec<String>,
    metrics: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl From<BenchmarkTable> for TableRepr {
    fn from(table: BenchmarkTable) -> Self {
        let rows = table.records();
        Self {
            dimensions: table.dimensions,
            metrics: table.metrics,
            rows,
        }
    }
}

impl TryFrom<TableRepr> for BenchmarkTable {
    type Error = CoreError;

    fn try_from(repr: TableRepr) -> Result<Self> {
        let mut table = BenchmarkTable::new(repr.dimensions, repr.metrics);
        for record in &repr.rows {
            let row = table.from_record(record)?;
            table.rows.push(row);
        }
        Ok(table)
    }
}
