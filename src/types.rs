use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One ranked label produced by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    pub class_name: String,
    pub confidence: f64,
    #[serde(default)]
    pub confidence_percentage: String,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            class_id: None,
            class_name: class_name.into(),
            confidence,
            confidence_percentage: format_percentage(confidence),
        }
    }
}

pub fn format_percentage(confidence: f64) -> String {
    format!("{:.2}%", confidence * 100.0)
}

/// Summary of the best prediction, stored separately on every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopPrediction {
    pub class_name: String,
    pub confidence: f64,
    pub confidence_percentage: String,
}

impl Default for TopPrediction {
    fn default() -> Self {
        Self {
            class_name: "unknown".to_string(),
            confidence: 0.0,
            confidence_percentage: "0.00%".to_string(),
        }
    }
}

impl From<&Prediction> for TopPrediction {
    fn from(prediction: &Prediction) -> Self {
        Self {
            class_name: prediction.class_name.clone(),
            confidence: prediction.confidence,
            confidence_percentage: prediction.confidence_percentage.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Single,
    Batch,
}

impl RequestType {
    /// Read a stored request type. Only `"single"` is a single request;
    /// null or any other value counts as a batch.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("single") => RequestType::Single,
            _ => RequestType::Batch,
        })
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Single => f.pad("single"),
            RequestType::Batch => f.pad("batch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Error,
}

/// Outcome for one image of a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(alias = "index")]
    pub image_index: usize,
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    pub fn success(image_index: usize, predictions: Vec<Prediction>) -> Self {
        Self {
            image_index,
            status: BatchStatus::Success,
            predictions,
            error: None,
        }
    }

    pub fn failure(image_index: usize, error: impl Into<String>) -> Self {
        Self {
            image_index,
            status: BatchStatus::Error,
            predictions: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Aggregate view over the whole history, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_predictions: usize,
    pub today_predictions: usize,
    pub most_common_class: String,
    pub average_confidence: f64,
    pub single_requests: usize,
    pub batch_requests: usize,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            total_predictions: 0,
            today_predictions: 0,
            most_common_class: "N/A".to_string(),
            average_confidence: 0.0,
            single_requests: 0,
            batch_requests: 0,
        }
    }
}

/// Static description of the client: formats, limits and endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub inference_url: String,
    pub health_url: String,
    pub history_file: String,
    pub supported_formats: Vec<String>,
    pub max_file_size: String,
    pub max_batch_size: usize,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_history_entries: usize,
}
