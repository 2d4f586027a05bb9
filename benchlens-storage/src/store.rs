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

//! JSON file backed report store
//!
//! All reports live in `reports.json` inside the data directory. The previous
//! file is copied to `reports.json.bak` before every write. Reads and writes
//! go through a single `RwLock`; a failed write leaves the in-memory state
//! unchanged.

use crate::error::{StorageError, StorageResult};
use benchlens_core::{BenchmarkParams, BenchmarkTable};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const REPORTS_FILE: &str = "reports.json";

/// A stored benchmark report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub uuid: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub primary_source_id: String,
    pub benchmark_source_ids: Vec<String>,
    pub metrics_used: Vec<String>,
    /// Non-date dimensions, in table order
    pub dimensions_used: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub table: BenchmarkTable,
    /// Sources that failed while the table was built
    #[serde(default)]
    pub errors_by_source: BTreeMap<String, String>,
    pub owner_email: String,
}

impl BenchmarkReport {
    /// Parameters that reproduce this report's table.
    pub fn params(&self) -> BenchmarkParams {
        BenchmarkParams {
            primary_source_id: self.primary_source_id.clone(),
            benchmark_source_ids: self.benchmark_source_ids.clone(),
            metrics: self.metrics_used.clone(),
            dimensions: self.dimensions_used.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    fn apply(&mut self, content: NewReport) {
        self.title = content.title;
        self.primary_source_id = content.params.primary_source_id;
        self.benchmark_source_ids = content.params.benchmark_source_ids;
        self.metrics_used = content.table.metrics.clone();
        self.dimensions_used = content.table.dimensions.clone();
        self.start_date = content.params.start_date;
        self.end_date = content.params.end_date;
        self.table = content.table;
        self.errors_by_source = content.errors_by_source;
    }
}

/// Content of a report being created or replaced
#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub params: BenchmarkParams,
    pub table: BenchmarkTable,
    pub errors_by_source: BTreeMap<String, String>,
}

pub struct ReportStore {
    reports: RwLock<HashMap<String, BenchmarkReport>>,
    file_path: PathBuf,
}

impl ReportStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let file_path = data_dir.join(REPORTS_FILE);

        let mut reports = HashMap::new();
        if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)?;
            let stored: Vec<BenchmarkReport> = serde_json::from_str(&contents)?;
            for report in stored {
                reports.insert(report.uuid.clone(), report);
            }
            info!(reports = reports.len(), path = %file_path.display(), "Loaded report store");
        }

        Ok(Self {
            reports: RwLock::new(reports),
            file_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn save(&self, reports: &HashMap<String, BenchmarkReport>) -> StorageResult<()> {
        let mut ordered: Vec<&BenchmarkReport> = reports.values().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.uuid.cmp(&b.uuid)));
        let json = serde_json::to_string_pretty(&ordered)?;

        if self.file_path.exists() {
            let backup_path = self.file_path.with_extension("json.bak");
            std::fs::copy(&self.file_path, backup_path)?;
        }

        std::fs::write(&self.file_path, json)?;
        debug!(reports = ordered.len(), "Report store saved");
        Ok(())
    }

    pub fn create(&self, owner_email: &str, content: NewReport) -> StorageResult<BenchmarkReport> {
        let now = Utc::now();
        let mut report = BenchmarkReport {
            uuid: uuid::Uuid::new_v4().to_string(),
            title: String::new(),
            created_at: now,
            updated_at: now,
            primary_source_id: String::new(),
            benchmark_source_ids: Vec::new(),
            metrics_used: Vec::new(),
            dimensions_used: Vec::new(),
            start_date: content.params.start_date,
            end_date: content.params.end_date,
            table: BenchmarkTable::default(),
            errors_by_source: BTreeMap::new(),
            owner_email: owner_email.to_string(),
        };
        report.apply(content);
        self.insert(report)
    }

    /// Store a fully built report as-is.
    pub fn insert(&self, report: BenchmarkReport) -> StorageResult<BenchmarkReport> {
        let mut reports = self.reports.write();
        if reports.contains_key(&report.uuid) {
            return Err(StorageError::AlreadyExists(report.uuid));
        }

        reports.insert(report.uuid.clone(), report.clone());
        if let Err(e) = self.save(&reports) {
            reports.remove(&report.uuid);
            return Err(e);
        }

        info!(uuid = %report.uuid, owner = %report.owner_email, "Report created");
        Ok(report)
    }

    /// Fetch a report owned by `owner_email`.
    pub fn get(&self, uuid: &str, owner_email: &str) -> StorageResult<BenchmarkReport> {
        self.reports
            .read()
            .get(uuid)
            .filter(|r| r.owner_email == owner_email)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(uuid.to_string()))
    }

    /// Reports of one owner, newest first.
    pub fn list_by_owner(&self, owner_email: &str) -> Vec<BenchmarkReport> {
        let mut reports: Vec<BenchmarkReport> = self
            .reports
            .read()
            .values()
            .filter(|r| r.owner_email == owner_email)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.uuid.cmp(&b.uuid)));
        reports
    }

    /// Replace the content of a report, keeping its id and creation time.
    pub fn update(
        &self,
        uuid: &str,
        owner_email: &str,
        content: NewReport,
    ) -> StorageResult<BenchmarkReport> {
        let mut reports = self.reports.write();
        let previous = match reports.get(uuid) {
            Some(r) if r.owner_email == owner_email => r.clone(),
            _ => return Err(StorageError::NotFound(uuid.to_string())),
        };

        let mut updated = previous.clone();
        updated.apply(content);
        updated.updated_at = Utc::now();

        reports.insert(uuid.to_string(), updated.clone());
        if let Err(e) = self.save(&reports) {
            reports.insert(uuid.to_string(), previous);
            return Err(e);
        }

        info!(uuid = %uuid, "Report updated");
        Ok(updated)
    }

    pub fn delete(&self, uuid: &str, owner_email: &str) -> StorageResult<()> {
        let mut reports = self.reports.write();
        let owned = reports
            .get(uuid)
            .is_some_and(|r| r.owner_email == owner_email);
        let Some(removed) = owned.then(|| reports.remove(uuid)).flatten() else {
            return Err(StorageError::NotFound(uuid.to_string()));
        };

        if let Err(e) = self.save(&reports) {
            reports.insert(uuid.to_string(), removed);
            return Err(e);
        }

        info!(uuid = %uuid, "Report deleted");
        Ok(())
    }
}
