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

//! Selectable metrics and dimensions
//!
//! Keys are provider API names, values are human-readable labels.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCatalog {
    #[serde(default = "default_metrics")]
    pub metrics: BTreeMap<String, String>,

    #[serde(default = "default_dimensions")]
    pub dimensions: BTreeMap<String, String>,

    #[serde(default = "default_selected_metrics")]
    pub default_metrics: Vec<String>,

    #[serde(default = "default_selected_dimensions")]
    pub default_dimensions: Vec<String>,

    /// Start of the suggested date range, in days before today
    #[serde(default = "default_start_days_ago")]
    pub default_start_days_ago: i64,

    /// End of the suggested date range, in days before today
    #[serde(default = "default_end_days_ago")]
    pub default_end_days_ago: i64,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
            dimensions: default_dimensions(),
            default_metrics: default_selected_metrics(),
            default_dimensions: default_selected_dimensions(),
            default_start_days_ago: default_start_days_ago(),
            default_end_days_ago: default_end_days_ago(),
        }
    }
}

impl MetricCatalog {
    /// Suggested `(start, end)` range relative to `today`.
    pub fn default_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (
            today - Duration::days(self.default_start_days_ago),
            today - Duration::days(self.default_end_days_ago),
        )
    }

    /// Label of a metric, falling back to its API name.
    pub fn metric_label<'a>(&'a self, name: &'a str) -> &'a str {
        self.metrics.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Label of a dimension, falling back to its API name.
    pub fn dimension_label<'a>(&'a self, name: &'a str) -> &'a str {
        self.dimensions.get(name).map(String::as_str).unwrap_or(name)
    }
}

fn labelled(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, label)| (name.to_string(), label.to_string()))
        .collect()
}

fn default_metrics() -> BTreeMap<String, String> {
    labelled(&[
        ("sessions", "Sessions"),
        ("engagedSessions", "Engaged sessions"),
        ("screenPageViews", "Views"),
        ("totalUsers", "Total users"),
        ("newUsers", "New users"),
        ("transactions", "Transactions"),
        ("averagePurchaseRevenue", "Average purchase revenue"),
        ("averageRevenuePerUser", "Average revenue per user"),
        ("bounceRate", "Bounce rate"),
        ("purchaserRate", "Purchaser rate"),
        ("eventCount", "Event count"),
        ("averageSessionDuration", "Average session duration (sec)"),
        ("engagementRate", "Engagement rate (%)"),
    ])
}

fn default_dimensions() -> BTreeMap<String, String> {
    labelled(&[
        ("date", "Date"),
        ("country", "Country"),
        ("city", "City"),
        ("deviceCategory", "Device category"),
        ("sessionDefaultChannelGroup", "Session default channel group"),
        ("landingPagePlusQueryString", "Landing page + query string"),
        ("eventName", "Event name"),
    ])
}

fn default_selected_metrics() -> Vec<String> {
    vec!["sessions".to_string()]
}

fn default_selected_dimensions() -> Vec<String> {
    vec!["date".to_string()]
}

fn default_start_days_ago() -> i64 {
    28
}

fn default_end_days_ago() -> i64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range() {
        let catalog = MetricCatalog::default();
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (start, end) = catalog.default_range(today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_labels_fall_back_to_api_name() {
        let catalog = MetricCatalog::default();
        assert_eq!(catalog.metric_label("sessions"), "Sessions");
        assert_eq!(catalog.metric_label("customMetric"), "customMetric");
        assert_eq!(catalog.dimension_label("country"), "Country");
    }

    #[test]
    fn test_partial_catalog_uses_defaults() {
        let catalog: MetricCatalog = serde_json::from_str(r#"{"default_start_days_ago": 7}"#).unwrap();
        assert_eq!(catalog.default_start_days_ago, 7);
        assert_eq!(catalog.default_end_days_ago, 1);
        assert!(catalog.metrics.contains_key("sessions"));
    }
}
