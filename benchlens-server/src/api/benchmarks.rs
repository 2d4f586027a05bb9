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

//! Benchmark report endpoints
//!
//! Creating or editing a report fetches every source again and rebuilds the
//! table; reading a report or its summary never touches the provider.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use benchlens_core::{BenchmarkParams, MetricCatalog};
use benchlens_query::ReportSummary;
use benchlens_storage::{BenchmarkReport, NewReport};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{run_blocking, ApiError, AppState, Owner};

/// Body of create and update requests
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub primary_source_id: String,
    #[serde(default)]
    pub benchmark_source_ids: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BenchmarkForm {
    /// Check the form and split it into a title and aggregation parameters.
    pub fn validate(self, catalog: &MetricCatalog) -> Result<(String, BenchmarkParams), ApiError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::BadRequest("a title is required".to_string()));
        }

        if let Some(unknown) = self.metrics.iter().find(|m| !catalog.metrics.contains_key(*m)) {
            return Err(ApiError::BadRequest(format!("unknown metric '{}'", unknown)));
        }
        if let Some(unknown) = self
            .dimensions
            .iter()
            .find(|d| !catalog.dimensions.contains_key(*d))
        {
            return Err(ApiError::BadRequest(format!("unknown dimension '{}'", unknown)));
        }

        let params = BenchmarkParams {
            primary_source_id: self.primary_source_id.trim().to_string(),
            benchmark_source_ids: self.benchmark_source_ids,
            metrics: self.metrics,
            dimensions: self.dimensions,
            start_date: self.start_date,
            end_date: self.end_date,
        };
        params
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        Ok((title, params))
    }
}

/// Report without its table, for listings
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportListItem {
    pub uuid: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub primary_source_id: String,
    pub benchmark_source_count: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rows: usize,
}

impl From<&BenchmarkReport> for ReportListItem {
    fn from(report: &BenchmarkReport) -> Self {
        Self {
            uuid: report.uuid.clone(),
            title: report.title.clone(),
            created_at: report.created_at,
            updated_at: report.updated_at,
            primary_source_id: report.primary_source_id.clone(),
            benchmark_source_count: report.benchmark_source_ids.len(),
            start_date: report.start_date,
            end_date: report.end_date,
            rows: report.table.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub uuid: String,
    pub title: String,
    #[serde(flatten)]
    pub summary: ReportSummary,
}

/// Run the aggregation for a validated form.
async fn build_report(
    state: &AppState,
    form: BenchmarkForm,
) -> Result<NewReport, ApiError> {
    let (title, params) = form.validate(&state.catalog)?;
    let result = state.aggregator.aggregate(&params).await?;

    Ok(NewReport {
        title,
        params,
        table: result.table,
        errors_by_source: result.errors_by_source,
    })
}

/// GET /api/v1/benchmarks - the caller's reports, newest first
pub async fn list_benchmarks(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Json<Vec<ReportListItem>> {
    let reports = state.store.list_by_owner(&owner);
    Json(reports.iter().map(ReportListItem::from).collect())
}

/// POST /api/v1/benchmarks
pub async fn create_benchmark(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(form): Json<BenchmarkForm>,
) -> Result<(StatusCode, Json<BenchmarkReport>), ApiError> {
    let content = build_report(&state, form).await?;
    let store = state.store.clone();
    let report = run_blocking(move || store.create(&owner, content)).await?;

    info!(
        uuid = %report.uuid,
        rows = report.table.len(),
        failed_sources = report.errors_by_source.len(),
        "Benchmark report created"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/v1/benchmarks/:uuid
pub async fn get_benchmark(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(uuid): Path<String>,
) -> Result<Json<BenchmarkReport>, ApiError> {
    Ok(Json(state.store.get(&uuid, &owner)?))
}

/// PUT /api/v1/benchmarks/:uuid - re-fetch and replace the report content
pub async fn update_benchmark(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(uuid): Path<String>,
    Json(form): Json<BenchmarkForm>,
) -> Result<Json<BenchmarkReport>, ApiError> {
    // 404 before spending provider quota
    state.store.get(&uuid, &owner)?;

    let content = build_report(&state, form).await?;
    let store = state.store.clone();
    let report = run_blocking(move || store.update(&uuid, &owner, content)).await?;
    Ok(Json(report))
}

/// DELETE /api/v1/benchmarks/:uuid
pub async fn delete_benchmark(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.clone();
    run_blocking(move || store.delete(&uuid, &owner)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/benchmarks/:uuid/summary
pub async fn get_benchmark_summary(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(uuid): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let report = state.store.get(&uuid, &owner)?;
    let summary = ReportSummary::build(&report.table, &report.primary_source_id, &state.catalog);

    Ok(Json(SummaryResponse {
        uuid: report.uuid,
        title: report.title,
        summary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> BenchmarkForm {
        BenchmarkForm {
            title: "Q1".to_string(),
            primary_source_id: "properties/1".to_string(),
            benchmark_source_ids: vec!["properties/2".to_string()],
            metrics: vec!["sessions".to_string()],
            dimensions: vec!["country".to_string()],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        }
    }

    fn rejected(form: BenchmarkForm) -> String {
        match form.validate(&MetricCatalog::default()) {
            Err(ApiError::BadRequest(msg)) => msg,
            other => panic!("expected bad request, got {:?}", other.map(|(t, _)| t)),
        }
    }

    #[test]
    fn test_valid_form() {
        let (title, params) = form().validate(&MetricCatalog::default()).unwrap();
        assert_eq!(title, "Q1");
        assert_eq!(params.dimensions, vec!["country"]);
    }

    #[test]
    fn test_form_rejections() {
        let mut f = form();
        f.title = "  ".to_string();
        assert!(rejected(f).contains("title"));

        let mut f = form();
        f.primary_source_id = String::new();
        assert!(rejected(f).contains("primary"));

        let mut f = form();
        f.benchmark_source_ids.clear();
        assert!(rejected(f).contains("benchmark"));

        let mut f = form();
        f.benchmark_source_ids.push("properties/1".to_string());
        assert!(rejected(f).contains("cannot also be a benchmark"));

        let mut f = form();
        f.metrics.clear();
        assert!(rejected(f).contains("metric"));

        let mut f = form();
        f.start_date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(rejected(f).contains("start date"));

        let mut f = form();
        f.metrics.push("revenuePerMoon".to_string());
        assert!(rejected(f).contains("unknown metric"));
    }
}
