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

//! Google Analytics 4 provider
//!
//! Talks to the GA4 Data API (`runReport`) and Admin API
//! (`accountSummaries`) over HTTPS with a bearer access token. Obtaining and
//! refreshing the token is left to the caller.

use crate::provider::{
    ProviderError, ProviderReport, ProviderRow, ReportProvider, ReportRequest, SourceSummary,
};
use async_trait::async_trait;
use benchlens_core::SOURCE_ID_PREFIX;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_DATA_API_BASE: &str = "https://analyticsdata.googleapis.com";
pub const DEFAULT_ADMIN_API_BASE: &str = "https://analyticsadmin.googleapis.com";

/// Page size used when listing account summaries
const ACCOUNT_SUMMARY_PAGE_SIZE: &str = "200";

#[derive(Debug, Clone)]
pub struct Ga4Config {
    pub access_token: Option<String>,
    pub data_api_base: String,
    pub admin_api_base: String,
    pub request_timeout: Duration,
}

impl Default for Ga4Config {
    fn default() -> Self {
        Self {
            access_token: None,
            data_api_base: DEFAULT_DATA_API_BASE.to_string(),
            admin_api_base: DEFAULT_ADMIN_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Ga4Provider {
    config: Ga4Config,
    client: reqwest::Client,
}

impl Ga4Provider {
    pub fn new(config: Ga4Config) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn token(&self) -> Result<&str, ProviderError> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("no access token configured".to_string()))
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ReportProvider for Ga4Provider {
    async fn run_report(&self, request: &ReportRequest) -> Result<ProviderReport, ProviderError> {
        let token = self.token()?;
        let url = format!(
            "{}/v1beta/{}:runReport",
            self.config.data_api_base.trim_end_matches('/'),
            request.source_id
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&RunReportBody::from(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let wire: RunReportResponse = Self::read_json(response).await?;
        Ok(wire.into_report())
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>, ProviderError> {
        let token = self.token()?;
        let url = format!(
            "{}/v1beta/accountSummaries",
            self.config.admin_api_base.trim_end_matches('/')
        );

        let mut accounts = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", ACCOUNT_SUMMARY_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;

            let page: AccountSummariesPage = Self::read_json(response).await?;
            debug!(accounts = page.account_summaries.len(), "Fetched account summaries page");
            accounts.extend(page.account_summaries);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(flatten_accounts(accounts))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportBody {
    date_ranges: Vec<WireDateRange>,
    dimensions: Vec<WireName>,
    metrics: Vec<WireName>,
    keep_empty_rows: bool,
}

impl From<&ReportRequest> for RunReportBody {
    fn from(request: &ReportRequest) -> Self {
        Self {
            date_ranges: vec![WireDateRange {
                start_date: request.start_date.format("%Y-%m-%d").to_string(),
                end_date: request.end_date.format("%Y-%m-%d").to_string(),
            }],
            dimensions: request.dimensions.iter().map(WireName::from).collect(),
            metrics: request.metrics.iter().map(WireName::from).collect(),
            keep_empty_rows: request.keep_empty_rows,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireName {
    name: String,
}

impl From<&String> for WireName {
    fn from(name: &String) -> Self {
        Self { name: name.clone() }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default)]
    dimension_headers: Vec<WireName>,
    #[serde(default)]
    metric_headers: Vec<WireName>,
    #[serde(default)]
    rows: Vec<WireRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRow {
    #[serde(default)]
    dimension_values: Vec<WireValue>,
    #[serde(default)]
    metric_values: Vec<WireValue>,
}

#[derive(Debug, Default, Deserialize)]
struct WireValue {
    #[serde(default)]
    value: String,
}

impl RunReportResponse {
    fn into_report(self) -> ProviderReport {
        ProviderReport {
            dimension_headers: self.dimension_headers.into_iter().map(|h| h.name).collect(),
            metric_headers: self.metric_headers.into_iter().map(|h| h.name).collect(),
            rows: self
                .rows
                .into_iter()
                .map(|row| ProviderRow {
                    dimension_values: row.dimension_values.into_iter().map(|v| v.value).collect(),
                    metric_values: row.metric_values.into_iter().map(|v| v.value).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummariesPage {
    #[serde(default)]
    account_summaries: Vec<AccountSummary>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummary {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    property_summaries: Vec<PropertySummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertySummary {
    #[serde(default)]
    property: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Build an API error, preferring the message of a Google error envelope.
fn api_error(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    ProviderError::Api { status, message }
}

fn or_na(name: &str) -> &str {
    if name.is_empty() {
        "N/A"
    } else {
        name
    }
}

/// One entry per readable property, named `<property> (Account: <account>)`
/// and sorted case-insensitively by name.
fn flatten_accounts(accounts: Vec<AccountSummary>) -> Vec<SourceSummary> {
    let mut sources: Vec<SourceSummary> = accounts
        .iter()
        .flat_map(|account| {
            account
                .property_summaries
                .iter()
                .filter(|p| p.property.contains(SOURCE_ID_PREFIX))
                .map(move |p| SourceSummary {
                    id: p.property.clone(),
                    name: format!(
                        "{} (Account: {})",
                        or_na(&p.display_name),
                        or_na(&account.display_name)
                    ),
                })
        })
        .collect();
    sources.sort_by_key(|s| s.name.to_lowercase());
    sources
}
