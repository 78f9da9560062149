use crate::error::ClassifyError;
use crate::log_entry::LogEntry;
use crate::types::{BatchResult, BatchStatus, Prediction, RequestType, StatsSnapshot};
use chrono::{Local, NaiveDate};
use log::{debug, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Append-only prediction history persisted as a single JSON array.
///
/// Every mutation is a whole-file read-modify-write. Cycles issued through
/// one store are serialised by `write_lock`; other stores or processes can
/// still overwrite each other, but every write goes through its own temp file
/// and an atomic rename, so the document is never left half-written. Records
/// that cannot be read are skipped individually.
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    /// Open the store, materialising an empty log if the file is absent.
    pub async fn open(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let store = Self {
            path: path.into(),
            max_entries: max_entries.max(1),
            write_lock: Mutex::new(()),
        };

        if let Err(e) = store.ensure_exists().await {
            error!("Failed to create history file {:?}: {}", store.path, e);
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_exists(&self) -> Result<(), ClassifyError> {
        if fs::try_exists(&self.path).await? {
            return Ok(());
        }
        self.write_entries(&[]).await?;
        info!("Created new prediction history file: {:?}", self.path);
        Ok(())
    }

    /// Record one classification. Never fails the caller: errors are logged
    /// and reported as `false`.
    pub async fn append(
        &self,
        filename: Option<&str>,
        predictions: &[Prediction],
        request_type: RequestType,
        user_ip: Option<&str>,
        processing_time: Option<f64>,
    ) -> bool {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_all().await;
        let entry = LogEntry::new(
            entries.len() + 1,
            filename,
            predictions,
            request_type,
            user_ip,
            processing_time,
            Local::now(),
        );
        let logged_name = entry.filename.clone();
        entries.push(entry);
        enforce_retention(&mut entries, self.max_entries);

        match self.write_entries(&entries).await {
            Ok(()) => {
                info!("Logged prediction for {}", logged_name);
                true
            }
            Err(e) => {
                error!("Error logging prediction: {}", e);
                false
            }
        }
    }

    /// Record every successful image of a batch as its own `batch` entry.
    /// Returns true if at least one entry was written.
    pub async fn log_batch(
        &self,
        results: &[BatchResult],
        user_ip: Option<&str>,
        processing_time: Option<f64>,
    ) -> bool {
        let mut logged = 0;

        for result in results.iter().filter(|r| r.status == BatchStatus::Success) {
            let filename = format!("batch_image_{}", result.image_index + 1);
            if self
                .append(
                    Some(&filename),
                    &result.predictions,
                    RequestType::Batch,
                    user_ip,
                    processing_time,
                )
                .await
            {
                logged += 1;
            }
        }

        info!("Logged {} batch predictions", logged);
        logged > 0
    }

    /// Full log in id order. Missing or corrupt files read as empty.
    pub async fn read_all(&self) -> Vec<LogEntry> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Error reading history {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        let records = match serde_json::from_str::<Vec<serde_json::Value>>(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring unreadable history {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        // A bad record is skipped on its own so the rest of the log survives
        records
            .into_iter()
            .enumerate()
            .filter_map(|(position, record)| match serde_json::from_value::<LogEntry>(record) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable history record #{}: {}", position + 1, e);
                    None
                }
            })
            .collect()
    }

    /// The last `limit` entries, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let mut entries = self.read_all().await;
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
        entries
    }

    pub async fn by_date(&self, date: &str) -> Vec<LogEntry> {
        self.read_all()
            .await
            .into_iter()
            .filter(|entry| entry.date == date)
            .collect()
    }

    pub async fn statistics(&self) -> StatsSnapshot {
        let entries = self.read_all().await;
        compute_statistics(&entries, Local::now().date_naive())
    }

    /// Truncate the log to an empty array. Irreversible.
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;

        match self.write_entries(&[]).await {
            Ok(()) => {
                info!("Cleared all prediction logs");
                true
            }
            Err(e) => {
                error!("Error clearing logs: {}", e);
                false
            }
        }
    }

    async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), ClassifyError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(entries)?;
        let path = self.path.clone();

        // Each write gets its own temp file next to the log, renamed over it
        // once complete. The temp file is removed if persisting fails.
        tokio::task::spawn_blocking(move || -> Result<(), ClassifyError> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| ClassifyError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!("Wrote {} history entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

/// Drop the oldest entries beyond `max_entries` and renumber the rest 1..N.
fn enforce_retention(entries: &mut Vec<LogEntry>, max_entries: usize) {
    if entries.len() <= max_entries {
        return;
    }

    let excess = entries.len() - max_entries;
    entries.drain(..excess);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.id = i + 1;
    }
}

fn compute_statistics(entries: &[LogEntry], today: NaiveDate) -> StatsSnapshot {
    if entries.is_empty() {
        return StatsSnapshot::default();
    }

    let today = today.format("%Y-%m-%d").to_string();

    // (class, count) in first-seen order so ties go to the earliest class
    let mut class_counts: Vec<(&str, usize)> = Vec::new();
    let mut confidence_sum = 0.0;
    let mut today_predictions = 0;
    let mut single_requests = 0;
    let mut batch_requests = 0;

    for entry in entries {
        let class_name = entry.top_prediction.class_name.as_str();
        match class_counts.iter_mut().find(|(name, _)| *name == class_name) {
            Some((_, count)) => *count += 1,
            None => class_counts.push((class_name, 1)),
        }

        confidence_sum += entry.top_prediction.confidence;

        if entry.date == today {
            today_predictions += 1;
        }

        match entry.request_type {
            RequestType::Single => single_requests += 1,
            RequestType::Batch => batch_requests += 1,
        }
    }

    let mut most_common = class_counts[0];
    for &(name, count) in &class_counts[1..] {
        if count > most_common.1 {
            most_common = (name, count);
        }
    }

    let average = confidence_sum / entries.len() as f64;

    StatsSnapshot {
        total_predictions: entries.len(),
        today_predictions,
        most_common_class: most_common.0.to_string(),
        average_confidence: round2(average * 100.0),
        single_requests,
        batch_requests,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
