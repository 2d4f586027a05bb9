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

//! Normalized provider rows

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Compact date format used by the analytics provider (e.g. `20240101`)
const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// ISO date format used in stored tables (e.g. `2024-01-01`)
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Value of the date dimension.
///
/// Provider dates that fail to parse are kept verbatim instead of dropping
/// the row. Parsed days order before raw fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateValue {
    Day(NaiveDate),
    Raw(String),
}

impl DateValue {
    /// Parse the provider's compact `YYYYMMDD` form.
    pub fn parse_compact(raw: &str) -> Self {
        NaiveDate::parse_from_str(raw, COMPACT_DATE_FORMAT)
            .map(DateValue::Day)
            .unwrap_or_else(|_| DateValue::Raw(raw.to_string()))
    }

    /// Parse the ISO `YYYY-MM-DD` form written to stored tables.
    pub fn parse_iso(raw: &str) -> Self {
        NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT)
            .map(DateValue::Day)
            .unwrap_or_else(|_| DateValue::Raw(raw.to_string()))
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            DateValue::Day(day) => Some(*day),
            DateValue::Raw(_) => None,
        }
    }
}

impl From<NaiveDate> for DateValue {
    fn from(day: NaiveDate) -> Self {
        DateValue::Day(day)
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Day(day) => write!(f, "{}", day.format(ISO_DATE_FORMAT)),
            DateValue::Raw(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for DateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DateValue::parse_iso(&raw))
    }
}

/// One row returned by the provider for one source.
///
/// Lives only for the duration of an aggregation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// Value of the `date` dimension, if the provider returned one
    pub date: Option<DateValue>,
    /// Non-date dimension values by dimension name
    pub dimension_values: BTreeMap<String, String>,
    /// Metric values by metric name
    pub metric_values: BTreeMap<String, f64>,
}

impl RawRow {
    pub fn new(date: impl Into<DateValue>) -> Self {
        Self {
            date: Some(date.into()),
            ..Default::default()
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimension_values.insert(name.into(), value.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_values.insert(name.into(), value);
        self
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimension_values.get(name).map(String::as_str)
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metric_values.get(name).copied()
    }
}

/// Round to two decimals, the precision of every output metric.
///
/// Values too large to scale by 100 have no fractional part to round and are
/// returned unchanged.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_date() {
        let value = DateValue::parse_compact("20240131");
        assert_eq!(
            value,
            DateValue::Day(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert_eq!(value.to_string(), "2024-01-31");
    }

    #[test]
    fn test_unparseable_date_is_kept_raw() {
        let value = DateValue::parse_compact("(other)");
        assert_eq!(value, DateValue::Raw("(other)".to_string()));
        assert_eq!(value.as_date(), None);
        assert_eq!(value.to_string(), "(other)");
    }

    #[test]
    fn test_days_order_before_raw_values() {
        let day = DateValue::parse_compact("20991231");
        let raw = DateValue::Raw("0".to_string());
        assert!(day < raw);
    }

    #[test]
    fn test_date_value_serde() {
        let value = DateValue::parse_compact("20240101");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"2024-01-01\"");
        let back: DateValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(60.0), 60.0);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(2.675_1), 2.68);
        assert_eq!(round2(-1.234), -1.23);
    }

    #[test]
    fn test_round2_keeps_huge_values_finite() {
        assert_eq!(round2(1e307), 1e307);
        assert_eq!(round2(-1e307), -1e307);
        assert_eq!(round2(f64::MAX), f64::MAX);
        assert!(round2(1e306).is_finite());
    }

    #[test]
    fn test_row_builder() {
        let row = RawRow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_dimension("country", "NL")
            .with_metric("sessions", 12.0);
        assert_eq!(row.dimension("country"), Some("NL"));
        assert_eq!(row.dimension("city"), None);
        assert_eq!(row.metric("sessions"), Some(12.0));
    }
}
