//! JSON-based run history.
//!
//! Stores each batch run as a separate JSON file for simplicity and
//! durability. Supports listing, lookup by short id and pruning.

use crate::batch::{DiscoveryReport, MeasurementReport};
use crate::config::{Paths, ProbeConfig, Purpose};
use crate::error::{StorageError, StorageResult};
use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "report", rename_all = "lowercase")]
pub enum RunResults {
    Discovery(DiscoveryReport),
    Measurement(MeasurementReport),
}

impl RunResults {
    pub fn purpose(&self) -> Purpose {
        match self {
            Self::Discovery(_) => Purpose::Discovery,
            Self::Measurement(_) => Purpose::Measurement,
        }
    }

    pub fn hosts_probed(&self) -> usize {
        match self {
            Self::Discovery(report) => report.hosts_probed,
            Self::Measurement(report) => report.hosts_probed,
        }
    }

    /// Hosts kept: open hosts for discovery, amplifiers for measurement.
    pub fn hits(&self) -> usize {
        match self {
            Self::Discovery(report) => report.open_count(),
            Self::Measurement(report) => report.amplifier_count(),
        }
    }
}

/// A persisted batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier for this run.
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Host list the run was fed.
    pub input: PathBuf,
    /// Exactly what was probed.
    pub configs: Vec<ProbeConfig>,
    /// Total run duration in milliseconds.
    pub duration_ms: u64,
    pub results: RunResults,
    /// Result files written next to the input.
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
}

impl RunRecord {
    /// Create a record for a run that started now.
    pub fn new(input: impl Into<PathBuf>, configs: Vec<ProbeConfig>, results: RunResults) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            started_at: now,
            completed_at: now,
            input: input.into(),
            configs,
            duration_ms: 0,
            results,
            output_files: Vec::new(),
        }
    }

    /// Stamp the record with its start time and duration.
    pub fn finalize(mut self, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        self.started_at = started_at;
        self.completed_at = Utc::now();
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_output_files(mut self, files: Vec<PathBuf>) -> Self {
        self.output_files = files;
        self
    }

    pub fn purpose(&self) -> Purpose {
        self.results.purpose()
    }

    /// Get a short summary of the run.
    pub fn summary(&self) -> String {
        let protocols: Vec<String> = self
            .configs
            .iter()
            .map(|config| config.protocol().to_string())
            .collect();
        let noun = match self.purpose() {
            Purpose::Discovery => "open",
            Purpose::Measurement => "amplifiers",
        };

        format!(
            "{} [{}] - {} hosts, {} {} [{:.2}s]",
            self.input.display(),
            protocols.join(","),
            self.results.hosts_probed(),
            self.results.hits(),
            noun,
            self.duration_ms as f64 / 1000.0
        )
    }
}

/// JSON file-based run storage.
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    /// Open the store in the user's data directory.
    pub fn new() -> StorageResult<Self> {
        let paths = Paths::get().map_err(|e| StorageError::DirectoryError(e.to_string()))?;
        Self::with_dir(paths.runs_dir())
    }

    /// Open a store rooted at `runs_dir`.
    pub fn with_dir(runs_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let runs_dir = runs_dir.into();
        fs::create_dir_all(&runs_dir).map_err(|e| StorageError::DirectoryError(e.to_string()))?;
        Ok(Self { runs_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Save a run record.
    pub fn save(&self, record: &RunRecord) -> StorageResult<()> {
        let file = self.run_file(&record.id);
        let content = serde_json::to_string_pretty(record)?;

        fs::write(&file, content).map_err(|e| StorageError::SaveFailed(e.to_string()))
    }

    /// Load a run record by ID.
    pub fn load(&self, id: &RunId) -> StorageResult<RunRecord> {
        let file = self.run_file(id);

        if !file.exists() {
            return Err(StorageError::RunNotFound(id.to_string()));
        }

        let content =
            fs::read_to_string(&file).map_err(|e| StorageError::LoadFailed(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| StorageError::LoadFailed(e.to_string()))
    }

    /// Find a run by short ID prefix.
    pub fn find_by_prefix(&self, prefix: &str) -> StorageResult<RunRecord> {
        let matches: Vec<_> = self
            .list_ids()?
            .into_iter()
            .filter(|id| id.to_string().starts_with(prefix))
            .collect();

        match matches.len() {
            0 => Err(StorageError::RunNotFound(prefix.to_string())),
            1 => self.load(&matches[0]),
            _ => Err(StorageError::LoadFailed(format!(
                "ambiguous prefix '{}': {} matches",
                prefix,
                matches.len()
            ))),
        }
    }

    /// List all run IDs.
    pub fn list_ids(&self) -> StorageResult<Vec<RunId>> {
        let mut ids = Vec::new();

        for entry in
            fs::read_dir(&self.runs_dir).map_err(|e| StorageError::DirectoryError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::DirectoryError(e.to_string()))?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    if let Ok(id) = stem.to_string_lossy().parse::<RunId>() {
                        ids.push(id);
                    }
                }
            }
        }

        Ok(ids)
    }

    /// List all run records, most recent first. Unreadable files are skipped.
    pub fn list(&self) -> StorageResult<Vec<RunRecord>> {
        let mut records: Vec<RunRecord> = self
            .list_ids()?
            .iter()
            .filter_map(|id| self.load(id).ok())
            .collect();

        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(records)
    }

    /// List recent runs (last n).
    pub fn list_recent(&self, count: usize) -> StorageResult<Vec<RunRecord>> {
        let mut records = self.list()?;
        records.truncate(count);
        Ok(records)
    }

    /// Delete a run record.
    pub fn delete(&self, id: &RunId) -> StorageResult<()> {
        let file = self.run_file(id);

        if !file.exists() {
            return Err(StorageError::RunNotFound(id.to_string()));
        }

        fs::remove_file(&file).map_err(|e| StorageError::SaveFailed(e.to_string()))
    }

    /// Delete runs older than `max_age`, returning how many were removed.
    pub fn cleanup(&self, max_age: chrono::Duration) -> StorageResult<usize> {
        let cutoff = Utc::now() - max_age;
        let mut deleted = 0;

        for record in self.list()? {
            if record.started_at < cutoff {
                self.delete(&record.id)?;
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Delete every run, returning how many were removed.
    pub fn clear(&self) -> StorageResult<usize> {
        let ids = self.list_ids()?;
        for id in &ids {
            self.delete(id)?;
        }
        Ok(ids.len())
    }

    fn run_file(&self, id: &RunId) -> PathBuf {
        self.runs_dir.join(format!("{}.json", id))
    }
}
