use crate::classifier::RemoteClassifier;
use crate::config::{Command, Config, HistoryAction, MAX_TOP_K};
use crate::display;
use crate::history::HistoryStore;
use crate::log_entry::LogEntry;
use crate::types::{BatchStatus, RequestType, ServiceInfo};
use crate::validation;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;

#[derive(Debug, Serialize)]
struct InvalidFile {
    index: usize,
    filename: String,
    error: String,
}

pub async fn execute_command(
    command: Command,
    config: &Config,
    store: &HistoryStore,
    classifier: &RemoteClassifier,
) -> Result<()> {
    match command {
        Command::Classify { file, top_k, json } => {
            classify_single(&file, config.effective_top_k(top_k), json, config, store, classifier).await
        }
        Command::Batch { files, top_k, json } => {
            classify_batch(&files, config.effective_top_k(top_k), json, config, store, classifier).await
        }
        Command::History { action } => execute_history(action, store).await,
        Command::Health => {
            classifier
                .check_health()
                .await
                .context("Inference server is unhealthy")?;
            println!("Inference server is healthy");
            Ok(())
        }
        Command::Info { json } => {
            let info = service_info(config);
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}", display::format_service_info(&info));
            }
            Ok(())
        }
    }
}

fn service_info(config: &Config) -> ServiceInfo {
    ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        inference_url: config.inference_url.clone(),
        health_url: config.health_endpoint(),
        history_file: config.history_file.display().to_string(),
        supported_formats: validation::ALLOWED_EXTENSIONS
            .iter()
            .map(|ext| ext.to_ascii_uppercase())
            .collect(),
        max_file_size: validation::format_file_size(config.max_file_size),
        max_batch_size: config.max_batch_size,
        min_dimension: validation::MIN_DIMENSION,
        max_dimension: validation::MAX_DIMENSION,
        default_top_k: config.effective_top_k(None),
        max_top_k: MAX_TOP_K,
        max_history_entries: config.max_history_entries,
    }
}

async fn classify_single(
    file: &Path,
    top_k: usize,
    json: bool,
    config: &Config,
    store: &HistoryStore,
    classifier: &RemoteClassifier,
) -> Result<()> {
    let filename = display_name(file);

    if !validation::allowed_file(&filename) {
        anyhow::bail!(
            "Invalid file format: {} (supported: {})",
            filename,
            validation::ALLOWED_EXTENSIONS.join(", ")
        );
    }

    let data = fs::read(file)
        .await
        .with_context(|| format!("Failed to read image: {:?}", file))?;

    let (width, height) = validation::validate_image(&data, config.max_file_size)
        .with_context(|| format!("Invalid image: {}", filename))?;
    info!("Classifying {} ({}x{}, {})", filename, width, height, validation::format_file_size(data.len() as u64));

    let started = Instant::now();
    let predictions = classifier
        .classify(data, top_k)
        .await
        .context("Classification failed")?;
    let elapsed = started.elapsed().as_secs_f64();

    if !store
        .append(
            Some(&filename),
            &predictions,
            RequestType::Single,
            Some(&config.client_label),
            Some(elapsed),
        )
        .await
    {
        warn!("Prediction for {} was not recorded in history", filename);
    }

    if json {
        let response = serde_json::json!({
            "status": "success",
            "filename": filename,
            "predictions": predictions,
            "total_predictions": predictions.len(),
            "processing_time": elapsed,
        });
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{} ({:.0} ms)", filename, elapsed * 1000.0);
        println!("{}", display::format_predictions(&predictions));
    }

    Ok(())
}

async fn classify_batch(
    files: &[PathBuf],
    top_k: usize,
    json: bool,
    config: &Config,
    store: &HistoryStore,
    classifier: &RemoteClassifier,
) -> Result<()> {
    if files.len() > config.max_batch_size {
        anyhow::bail!(
            "Too many files: maximum {} allowed per batch",
            config.max_batch_size
        );
    }

    let mut valid_names = Vec::new();
    let mut valid_images = Vec::new();
    let mut invalid_files = Vec::new();

    for (index, file) in files.iter().enumerate() {
        let filename = display_name(file);

        if !validation::allowed_file(&filename) {
            invalid_files.push(InvalidFile {
                index,
                filename,
                error: "Invalid file format".to_string(),
            });
            continue;
        }

        let checked = match fs::read(file).await {
            Ok(data) => validation::validate_image(&data, config.max_file_size)
                .map(|_| data)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match checked {
            Ok(data) => {
                valid_names.push(filename);
                valid_images.push(data);
            }
            Err(error) => invalid_files.push(InvalidFile { index, filename, error }),
        }
    }

    for invalid in &invalid_files {
        warn!("Skipping {} (#{}): {}", invalid.filename, invalid.index, invalid.error);
    }

    if valid_images.is_empty() {
        anyhow::bail!("No valid images: all provided files are invalid or corrupted");
    }

    let started = Instant::now();
    let results = classifier.classify_batch(valid_images, top_k).await;
    let elapsed = started.elapsed().as_secs_f64();

    if !store
        .log_batch(&results, Some(&config.client_label), Some(elapsed))
        .await
    {
        warn!("No batch predictions were recorded in history");
    }

    if json {
        let response = serde_json::json!({
            "status": "success",
            "total_images": files.len(),
            "valid_images": valid_names.len(),
            "invalid_images": invalid_files.len(),
            "results": results,
            "invalid_files": (!invalid_files.is_empty()).then_some(&invalid_files),
            "processing_time": elapsed,
        });
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for result in &results {
        let name = &valid_names[result.image_index];
        match result.status {
            BatchStatus::Success => {
                println!("{}", name);
                println!("{}", display::format_predictions(&result.predictions));
            }
            BatchStatus::Error => {
                println!("{}: failed ({})", name, result.error.as_deref().unwrap_or("unknown error"));
            }
        }
    }
    for invalid in &invalid_files {
        println!("{}: skipped ({})", invalid.filename, invalid.error);
    }
    println!(
        "{} of {} images classified in {:.0} ms",
        results.iter().filter(|r| r.status == BatchStatus::Success).count(),
        files.len(),
        elapsed * 1000.0
    );

    Ok(())
}

async fn execute_history(action: HistoryAction, store: &HistoryStore) -> Result<()> {
    match action {
        HistoryAction::Recent { limit, json } => {
            let entries = store.recent(limit).await;
            print_entries(&entries, json)?;
        }

        HistoryAction::Date { date, json } => {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
            let entries = store.by_date(&date).await;
            print_entries(&entries, json)?;
        }

        HistoryAction::Stats { json } => {
            let stats = store.statistics().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", display::format_statistics(&stats));
            }
        }

        HistoryAction::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear history without --yes");
            }
            if !store.clear().await {
                anyhow::bail!("Failed to clear history at {:?}", store.path());
            }
            println!("History cleared");
        }
    }

    Ok(())
}

fn print_entries(entries: &[LogEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No prediction history available");
        return Ok(());
    }

    println!("{}", display::history_header());
    // Newest first
    for entry in entries.iter().rev() {
        println!("{}", display::format_history_row(entry));
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DEFAULT_MAX_ENTRIES;
    use crate::types::Prediction;
    use tempfile::tempdir;

    fn offline_setup(dir: &tempfile::TempDir) -> Config {
        Config {
            history_file: dir.path().join("history.json"),
            inference_url: "http://127.0.0.1:1/predict".to_string(),
            request_timeout_secs: 2,
            ..Config::default()
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("/tmp/photos/cat.jpg")), "cat.jpg");
        assert_eq!(display_name(Path::new("/")), "");
    }

    #[test]
    fn test_service_info_reports_limits() {
        let temp_dir = tempdir().unwrap();
        let config = Config {
            top_k: 42,
            ..offline_setup(&temp_dir)
        };

        let info = service_info(&config);
        assert_eq!(info.name, "classifier-history");
        assert_eq!(info.health_url, "http://127.0.0.1:1/health");
        assert_eq!(info.supported_formats, vec!["PNG", "JPG", "JPEG", "GIF", "BMP", "WEBP"]);
        assert_eq!(info.max_file_size, "16.0 MB");
        assert_eq!(info.max_batch_size, 10);
        assert_eq!((info.min_dimension, info.max_dimension), (32, 4096));
        assert_eq!(info.default_top_k, 5);
        assert_eq!(info.max_top_k, 10);
    }

    #[tokio::test]
    async fn test_info_command_runs_offline() {
        let temp_dir = tempdir().unwrap();
        let config = offline_setup(&temp_dir);
        let store = HistoryStore::open(&config.history_file, DEFAULT_MAX_ENTRIES).await;
        let classifier = RemoteClassifier::new(&config).unwrap();

        let command = Command::Info { json: true };
        assert!(execute_command(command, &config, &store, &classifier).await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let temp_dir = tempdir().unwrap();
        let config = offline_setup(&temp_dir);
        let store = HistoryStore::open(&config.history_file, DEFAULT_MAX_ENTRIES).await;
        store
            .append(Some("a.png"), &[Prediction::new("cat", 0.5)], RequestType::Single, None, None)
            .await;

        assert!(execute_history(HistoryAction::Clear { yes: false }, &store).await.is_err());
        assert_eq!(store.read_all().await.len(), 1);

        execute_history(HistoryAction::Clear { yes: true }, &store).await.unwrap();
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_date_rejects_malformed_date() {
        let temp_dir = tempdir().unwrap();
        let config = offline_setup(&temp_dir);
        let store = HistoryStore::open(&config.history_file, DEFAULT_MAX_ENTRIES).await;

        let action = HistoryAction::Date {
            date: "09/03/2024".to_string(),
            json: false,
        };
        assert!(execute_history(action, &store).await.is_err());

        let action = HistoryAction::Date {
            date: "2024-03-09".to_string(),
            json: true,
        };
        assert!(execute_history(action, &store).await.is_ok());
    }

    #[tokio::test]
    async fn test_classify_rejects_unsupported_extension() {
        let temp_dir = tempdir().unwrap();
        let config = offline_setup(&temp_dir);
        let store = HistoryStore::open(&config.history_file, DEFAULT_MAX_ENTRIES).await;
        let classifier = RemoteClassifier::new(&config).unwrap();

        let notes = temp_dir.path().join("notes.txt");
        std::fs::write(&notes, "hello").unwrap();

        let command = Command::Classify {
            file: notes,
            top_k: None,
            json: false,
        };
        assert!(execute_command(command, &config, &store, &classifier).await.is_err());
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_with_no_valid_images_fails() {
        let temp_dir = tempdir().unwrap();
        let config = offline_setup(&temp_dir);
        let store = HistoryStore::open(&config.history_file, DEFAULT_MAX_ENTRIES).await;
        let classifier = RemoteClassifier::new(&config).unwrap();

        let broken = temp_dir.path().join("broken.png");
        std::fs::write(&broken, "not an image").unwrap();

        let command = Command::Batch {
            files: vec![broken, temp_dir.path().join("missing.jpg")],
            top_k: None,
            json: false,
        };
        let err = execute_command(command, &config, &store, &classifier)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No valid images"));
    }

    #[tokio::test]
    async fn test_batch_rejects_too_many_files() {
        let temp_dir = tempdir().unwrap();
        let config = Config {
            max_batch_size: 2,
            ..offline_setup(&temp_dir)
        };
        let store = HistoryStore::open(&config.history_file, DEFAULT_MAX_ENTRIES).await;
        let classifier = RemoteClassifier::new(&config).unwrap();

        let files = (0..3).map(|i| temp_dir.path().join(format!("{}.png", i))).collect();
        let command = Command::Batch {
            files,
            top_k: None,
            json: false,
        };
        let err = execute_command(command, &config, &store, &classifier)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Too many files"));
    }
}
