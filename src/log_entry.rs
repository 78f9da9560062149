use crate::types::{Prediction, RequestType, TopPrediction};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Number of ranked predictions kept on each entry.
pub const STORED_PREDICTIONS: usize = 3;

/// A single classification event recorded in the history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Positional, 1-based; reassigned when old entries are evicted
    #[serde(default)]
    pub id: usize,
    /// RFC 3339 local time of the logging call
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, deserialize_with = "RequestType::deserialize_lenient")]
    pub request_type: RequestType,
    #[serde(default)]
    pub top_prediction: TopPrediction,
    #[serde(default)]
    pub total_predictions: usize,
    #[serde(default)]
    pub all_predictions: Vec<Prediction>,
    #[serde(default)]
    pub user_ip: Option<String>,
    /// Seconds
    #[serde(default)]
    pub processing_time: Option<f64>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub date: String,
    /// HH:MM:SS
    #[serde(default)]
    pub time: String,
}

impl LogEntry {
    pub fn new(
        id: usize,
        filename: Option<&str>,
        predictions: &[Prediction],
        request_type: RequestType,
        user_ip: Option<&str>,
        processing_time: Option<f64>,
        now: DateTime<Local>,
    ) -> Self {
        let top_prediction = predictions
            .first()
            .map(TopPrediction::from)
            .unwrap_or_default();

        Self {
            id,
            timestamp: now.to_rfc3339(),
            filename: filename
                .map(sanitize_filename)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            request_type,
            top_prediction,
            total_predictions: predictions.len(),
            all_predictions: predictions.iter().take(STORED_PREDICTIONS).cloned().collect(),
            user_ip: user_ip.map(str::to_string),
            processing_time,
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
        }
    }
}

/// Reduce a caller-supplied file name to a safe ASCII basename.
///
/// Accented characters decompose to their base letters (NFKD) before
/// non-ASCII is dropped. Path separators and whitespace collapse to `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots
/// and underscores are trimmed. The result may be empty.
pub fn sanitize_filename(name: &str) -> String {
    let flattened: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}
