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

//! Row fetcher adapter
//!
//! Wraps a single provider call for one source and turns the response into
//! [`RawRow`]s. Every failure is returned as a per-source [`FetchError`]
//! value; nothing here aborts a whole aggregation run.

use crate::provider::{ProviderError, ProviderReport, ReportProvider, ReportRequest};
use benchlens_core::{DateValue, RawRow, DATE_DIMENSION, SOURCE_ID_PREFIX};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of fetching one source. `Ok(vec![])` means the source had no data
/// in range, which is not a failure.
pub type SourceFetch = Result<Vec<RawRow>, FetchError>;

/// Per-source fetch failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("invalid source identifier format: {0}")]
    InvalidSourceIdentifier(String),

    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("fetch task failed: {0}")]
    Task(String),
}

pub struct RowFetcher {
    provider: Arc<dyn ReportProvider>,
}

impl RowFetcher {
    pub fn new(provider: Arc<dyn ReportProvider>) -> Self {
        Self { provider }
    }

    /// Fetch rows for one source.
    ///
    /// `dimensions` must contain `date`; `metrics` must be non-empty. No
    /// retries are attempted.
    pub async fn fetch(
        &self,
        source_id: &str,
        dimensions: &[String],
        metrics: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> SourceFetch {
        if !source_id.starts_with(SOURCE_ID_PREFIX) {
            return Err(FetchError::InvalidSourceIdentifier(source_id.to_string()));
        }
        if !dimensions.iter().any(|d| d == DATE_DIMENSION) {
            return Err(FetchError::InvalidRequest(
                "the date dimension must be requested".to_string(),
            ));
        }
        if metrics.is_empty() {
            return Err(FetchError::InvalidRequest(
                "at least one metric must be requested".to_string(),
            ));
        }

        let request = ReportRequest {
            source_id: source_id.to_string(),
            dimensions: dimensions.to_vec(),
            metrics: metrics.to_vec(),
            start_date,
            end_date,
            keep_empty_rows: true,
        };

        debug!(
            source_id = %source_id,
            dimensions = ?request.dimensions,
            metrics = ?request.metrics,
            "Requesting report"
        );

        match self.provider.run_report(&request).await {
            Ok(report) => {
                let rows = normalize_report(&report);
                debug!(source_id = %source_id, rows = rows.len(), "Report received");
                Ok(rows)
            }
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "Report request failed");
                Err(e.into())
            }
        }
    }
}

/// Convert a provider report into rows.
///
/// The date cell is parsed from `YYYYMMDD` (raw text kept on failure) and
/// metric cells that are not finite numbers become `0.0`.
pub fn normalize_report(report: &ProviderReport) -> Vec<RawRow> {
    report
        .rows
        .iter()
        .map(|provider_row| {
            let mut row = RawRow::default();

            for (name, value) in report
                .dimension_headers
                .iter()
                .zip(&provider_row.dimension_values)
            {
                if name == DATE_DIMENSION {
                    row.date = Some(DateValue::parse_compact(value));
                } else {
                    row.dimension_values.insert(name.clone(), value.clone());
                }
            }

            for (name, value) in report
                .metric_headers
                .iter()
                .zip(&provider_row.metric_values)
            {
                row.metric_values.insert(name.clone(), parse_metric(value));
            }

            row
        })
        .collect()
}

fn parse_metric(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderRow, SourceSummary};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ReportRequest>>);

    impl Recorder {
        fn push(&self, request: &ReportRequest) {
            self.0.lock().unwrap().push(request.clone());
        }

        fn requests(&self) -> Vec<ReportRequest> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FixedProvider {
        result: Result<ProviderReport, ProviderError>,
        recorder: Recorder,
    }

    #[async_trait]
    impl ReportProvider for FixedProvider {
        async fn run_report(
            &self,
            request: &ReportRequest,
        ) -> Result<ProviderReport, ProviderError> {
            self.recorder.push(request);
            self.result.clone()
        }

        async fn list_sources(&self) -> Result<Vec<SourceSummary>, ProviderError> {
            Ok(vec![])
        }
    }

    fn report() -> ProviderReport {
        ProviderReport {
            dimension_headers: vec!["date".to_string(), "country".to_string()],
            metric_headers: vec!["sessions".to_string(), "bounceRate".to_string()],
            rows: vec![
                ProviderRow {
                    dimension_values: vec!["20240101".to_string(), "NL".to_string()],
                    metric_values: vec!["12".to_string(), "0.25".to_string()],
                },
                ProviderRow {
                    dimension_values: vec!["(other)".to_string(), "BE".to_string()],
                    metric_values: vec!["n/a".to_string(), "".to_string()],
                },
            ],
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_normalize_report() {
        let rows = normalize_report(&report());
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].date, Some(DateValue::Day(day(2024, 1, 1))));
        assert_eq!(rows[0].dimension("country"), Some("NL"));
        assert_eq!(rows[0].metric("sessions"), Some(12.0));
        assert_eq!(rows[0].metric("bounceRate"), Some(0.25));

        // Bad cells degrade instead of dropping the row
        assert_eq!(rows[1].date, Some(DateValue::Raw("(other)".to_string())));
        assert_eq!(rows[1].metric("sessions"), Some(0.0));
        assert_eq!(rows[1].metric("bounceRate"), Some(0.0));
    }

    #[test]
    fn test_non_finite_metric_becomes_zero() {
        assert_eq!(parse_metric("NaN"), 0.0);
        assert_eq!(parse_metric("inf"), 0.0);
        assert_eq!(parse_metric(" 3.5 "), 3.5);
    }

    #[tokio::test]
    async fn test_invalid_source_id_skips_provider() {
        let provider = Arc::new(FixedProvider {
            result: Ok(report()),
            recorder: Recorder::default(),
        });
        let fetcher = RowFetcher::new(provider.clone());

        let result = fetcher
            .fetch(
                "123456",
                &names(&["date"]),
                &names(&["sessions"]),
                day(2024, 1, 1),
                day(2024, 1, 31),
            )
            .await;

        assert_eq!(
            result,
            Err(FetchError::InvalidSourceIdentifier("123456".to_string()))
        );
        assert!(provider.recorder.requests().is_empty());
    }

    #[tokio::test]
    async fn test_requests_keep_empty_rows() {
        let provider = Arc::new(FixedProvider {
            result: Ok(report()),
            recorder: Recorder::default(),
        });
        let fetcher = RowFetcher::new(provider.clone());

        let rows = fetcher
            .fetch(
                "properties/1",
                &names(&["date", "country"]),
                &names(&["sessions", "bounceRate"]),
                day(2024, 1, 1),
                day(2024, 1, 31),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let requests = provider.recorder.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].keep_empty_rows);
        assert_eq!(requests[0].dimensions, names(&["date", "country"]));
    }

    #[tokio::test]
    async fn test_provider_failure_is_returned_not_raised() {
        let provider = Arc::new(FixedProvider {
            result: Err(ProviderError::Api {
                status: 429,
                message: "quota exhausted".to_string(),
            }),
            recorder: Recorder::default(),
        });
        let fetcher = RowFetcher::new(provider);

        let err = fetcher
            .fetch(
                "properties/1",
                &names(&["date"]),
                &names(&["sessions"]),
                day(2024, 1, 1),
                day(2024, 1, 31),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_request_without_date_is_rejected() {
        let provider = Arc::new(FixedProvider {
            result: Ok(report()),
            recorder: Recorder::default(),
        });
        let fetcher = RowFetcher::new(provider);

        let result = fetcher
            .fetch(
                "properties/1",
                &names(&["country"]),
                &names(&["sessions"]),
                day(2024, 1, 1),
                day(2024, 1, 31),
            )
            .await;

        assert!(matches!(result, Err(FetchError::InvalidRequest(_))));
    }
}
