use crate::config::Config;
use crate::error::ClassifyError;
use crate::types::{format_percentage, BatchResult, Prediction};
use log::{error, info};
use serde::Deserialize;
use std::time::Duration;

/// Inference server responses: either a bare list or `{"predictions": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Bare(Vec<Prediction>),
    Wrapped { predictions: Vec<Prediction> },
}

impl InferenceResponse {
    fn into_predictions(self) -> Vec<Prediction> {
        match self {
            InferenceResponse::Wrapped { predictions } => predictions,
            InferenceResponse::Bare(predictions) => predictions,
        }
    }
}

/// Classifier backed by a remote model server.
pub struct RemoteClassifier {
    client: reqwest::Client,
    inference_url: String,
    health_url: String,
}

impl RemoteClassifier {
    pub fn new(config: &Config) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            inference_url: config.inference_url.clone(),
            health_url: config.health_endpoint(),
        })
    }

    /// Classify one image, returning at most `top_k` predictions ordered by
    /// descending confidence.
    pub async fn classify(&self, image: Vec<u8>, top_k: usize) -> Result<Vec<Prediction>, ClassifyError> {
        let response = self
            .client
            .post(&self.inference_url)
            .query(&[("top_k", top_k)])
            .header("Content-Type", "application/octet-stream")
            .body(image)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::InferenceError(format!(
                "Server returned {}: {}",
                status,
                body.trim()
            )));
        }

        let body = response.bytes().await?;
        let parsed: InferenceResponse = serde_json::from_slice(&body)?;
        let predictions = rank_predictions(parsed.into_predictions(), top_k);

        match predictions.first() {
            Some(top) => {
                info!(
                    "Classification completed. Top prediction: {} ({})",
                    top.class_name, top.confidence_percentage
                );
                Ok(predictions)
            }
            None => Err(ClassifyError::InferenceError(
                "Server returned no predictions".to_string(),
            )),
        }
    }

    /// Classify images one after another. A failing image yields an error
    /// result at its index and does not stop the rest of the batch.
    pub async fn classify_batch(&self, images: Vec<Vec<u8>>, top_k: usize) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(images.len());

        for (i, image) in images.into_iter().enumerate() {
            match self.classify(image, top_k).await {
                Ok(predictions) => results.push(BatchResult::success(i, predictions)),
                Err(e) => {
                    error!("Error classifying image {}: {}", i, e);
                    results.push(BatchResult::failure(i, e.to_string()));
                }
            }
        }

        results
    }

    pub async fn check_health(&self) -> Result<(), ClassifyError> {
        let response = self.client.get(&self.health_url).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClassifyError::InferenceError(format!(
                "Health check returned {}",
                response.status()
            )))
        }
    }
}

fn rank_predictions(mut predictions: Vec<Prediction>, top_k: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    predictions.truncate(top_k);

    for prediction in &mut predictions {
        if prediction.confidence_percentage.is_empty() {
            prediction.confidence_percentage = format_percentage(prediction.confidence);
        }
    }

    predictions
}
