use crate::log_entry::LogEntry;
use crate::types::{Prediction, ServiceInfo, StatsSnapshot};
use chrono::DateTime;

const FILENAME_WIDTH: usize = 20;

/// "tiger_cat" -> "Tiger Cat"
pub fn title_case(class_name: &str) -> String {
    class_name
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

pub fn format_predictions(predictions: &[Prediction]) -> String {
    predictions
        .iter()
        .enumerate()
        .map(|(rank, p)| {
            format!(
                "{:>2}. {:<30} {:>8}",
                rank + 1,
                title_case(&p.class_name),
                p.confidence_percentage
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_history_row(entry: &LogEntry) -> String {
    let timestamp = DateTime::parse_from_rfc3339(&entry.timestamp)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| format!("{} {}", entry.date, entry.time));

    let elapsed = match entry.processing_time {
        Some(secs) if secs > 0.0 => format!("{:.0}", secs * 1000.0),
        _ => "N/A".to_string(),
    };

    format!(
        "{:<6} {:<19}  {:<23} {:<6} {:<24} {:>8} {:>9}",
        format!("#{}", entry.id),
        timestamp,
        truncate(&entry.filename, FILENAME_WIDTH),
        entry.request_type,
        title_case(&entry.top_prediction.class_name),
        entry.top_prediction.confidence_percentage,
        elapsed
    )
}

pub fn history_header() -> String {
    format!(
        "{:<6} {:<19}  {:<23} {:<6} {:<24} {:>8} {:>9}",
        "ID", "Timestamp", "Filename", "Type", "Prediction", "Conf.", "Time (ms)"
    )
}

pub fn format_statistics(stats: &StatsSnapshot) -> String {
    format!(
        "Total predictions:  {}\n\
         Today:              {}\n\
         Average confidence: {}%\n\
         Most common class:  {}\n\
         Single requests:    {}\n\
         Batch requests:     {}",
        stats.total_predictions,
        stats.today_predictions,
        stats.average_confidence,
        stats.most_common_class,
        stats.single_requests,
        stats.batch_requests
    )
}

pub fn format_service_info(info: &ServiceInfo) -> String {
    format!(
        "{} {}\n\
         Inference URL:     {}\n\
         Health URL:        {}\n\
         History file:      {} (keeps {} entries)\n\
         Supported formats: {}\n\
         Max file size:     {}\n\
         Max batch size:    {}\n\
         Image dimensions:  {}x{} to {}x{} pixels\n\
         Top-k:             default {}, max {}",
        info.name,
        info.version,
        info.inference_url,
        info.health_url,
        info.history_file,
        info.max_history_entries,
        info.supported_formats.join(", "),
        info.max_file_size,
        info.max_batch_size,
        info.min_dimension,
        info.min_dimension,
        info.max_dimension,
        info.max_dimension,
        info.default_top_k,
        info.max_top_k
    )
}
