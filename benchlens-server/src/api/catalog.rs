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

//! Catalog and source listing

use axum::{extract::State, Json};
use benchlens_query::SourceSummary;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub metrics: Vec<CatalogEntry>,
    pub dimensions: Vec<CatalogEntry>,
    pub default_metrics: Vec<String>,
    pub default_dimensions: Vec<String>,
    pub default_start_date: NaiveDate,
    pub default_end_date: NaiveDate,
}

/// GET /api/v1/catalog - selectable metrics and dimensions with defaults
pub async fn get_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    let catalog = &state.catalog;
    let (default_start_date, default_end_date) = catalog.default_range(Utc::now().date_naive());

    let entries = |map: &BTreeMap<String, String>| -> Vec<CatalogEntry> {
        map.iter()
            .map(|(name, label)| CatalogEntry {
                name: name.clone(),
                label: label.clone(),
            })
            .collect()
    };

    Json(CatalogResponse {
        metrics: entries(&catalog.metrics),
        dimensions: entries(&catalog.dimensions),
        default_metrics: catalog.default_metrics.clone(),
        default_dimensions: catalog.default_dimensions.clone(),
        default_start_date,
        default_end_date,
    })
}

/// GET /api/v1/sources - properties readable with the configured credentials
pub async fn list_sources(
    State(state): State<AppState>,
) -> Result<Json<Vec<SourceSummary>>, ApiError> {
    let sources = state.provider.list_sources().await.map_err(|e| {
        tracing::warn!("Failed to list sources: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(sources))
}
