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

//! Analytics provider abstraction
//!
//! The provider is the only source of raw rows. Its responses are kept in the
//! provider's own shape (header names plus string cells); normalization into
//! [`benchlens_core::RawRow`] happens in [`crate::fetcher`].

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trait for analytics data providers
#[async_trait]
pub trait ReportProvider: Send + Sync {
    /// Run one report for one source
    async fn run_report(&self, request: &ReportRequest) -> Result<ProviderReport, ProviderError>;

    /// List the sources the current credentials can read
    async fn list_sources(&self) -> Result<Vec<SourceSummary>, ProviderError>;
}

/// One report request for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub source_id: String,
    /// Requested dimensions, `date` first
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Keep rows whose metric values are all zero or empty
    pub keep_empty_rows: bool,
}

/// Report as returned by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub dimension_headers: Vec<String>,
    pub metric_headers: Vec<String>,
    pub rows: Vec<ProviderRow>,
}

/// One provider row; cells are aligned with the report headers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRow {
    pub dimension_values: Vec<String>,
    pub metric_values: Vec<String>,
}

/// A readable source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Provider identifier, e.g. `properties/123456`
    pub id: String,
    /// Display name including the owning account
    pub name: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Network or connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider rejected the request (auth, quota, invalid argument)
    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// No credentials are configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}
