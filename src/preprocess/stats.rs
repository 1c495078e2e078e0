//! Shared processing counters, error collection and report emission.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::info;

use super::classifier::FileCategory;
use crate::config::PreprocessConfig;

pub const JSON_REPORT_NAME: &str = "processing_report.json";
pub const TEXT_REPORT_NAME: &str = "processing_log.txt";

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct ProcessingStats {
    pub total_files: usize,
    pub processed_pairs: usize,
    pub header_only: usize,
    pub source_only: usize,
    pub misc_files: usize,
    pub skipped_files: usize,
    /// Seconds
    pub processing_time: f64,
    pub total_size: u64,
    pub errors: Vec<String>,
}

impl ProcessingStats {
    /// Every scanned file is claimed by exactly one bucket.
    #[must_use]
    pub fn is_partition_consistent(&self) -> bool {
        self.processed_pairs * 2
            + self.header_only
            + self.source_only
            + self.misc_files
            + self.skipped_files
            == self.total_files
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    timestamp: DateTime<Utc>,
    statistics: &'a ProcessingStats,
    config: &'a PreprocessConfig,
}

/// Thread-safe wrapper around [`ProcessingStats`]. Every worker appends
/// under the same lock.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<ProcessingStats>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProcessingStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of the tree scan.
    pub fn record_scan(&self, scanned: usize, skipped: usize, total_size: u64) {
        let mut stats = self.lock();
        stats.total_files = scanned + skipped;
        stats.skipped_files = skipped;
        stats.total_size = total_size;
    }

    pub fn record_pairs(&self, pairs: usize) {
        self.lock().processed_pairs = pairs;
    }

    pub fn record_category(&self, category: FileCategory) {
        let mut stats = self.lock();
        match category {
            FileCategory::HeaderOnly => stats.header_only += 1,
            FileCategory::SourceOnly => stats.source_only += 1,
            FileCategory::Misc => stats.misc_files += 1,
        }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.lock().errors.push(message.into());
    }

    pub fn set_processing_time(&self, seconds: f64) {
        self.lock().processing_time = seconds;
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.lock().errors.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProcessingStats {
        self.lock().clone()
    }

    /// Write `processing_report.json` and `processing_log.txt` at the cache root.
    pub fn write_reports(
        &self,
        cache_root: &Path,
        config: &PreprocessConfig,
    ) -> std::io::Result<()> {
        let stats = self.snapshot();

        let report = JsonReport {
            timestamp: Utc::now(),
            statistics: &stats,
            config,
        };
        let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::other)?;
        fs::write(cache_root.join(JSON_REPORT_NAME), json)?;

        let text_path = cache_root.join(TEXT_REPORT_NAME);
        fs::write(&text_path, render_text_report(&stats))?;

        info!("Processing report written: {}", text_path.display());
        Ok(())
    }
}

fn render_text_report(stats: &ProcessingStats) -> String {
    let errors: String = if stats.errors.is_empty() {
        String::new()
    } else {
        stats
            .errors
            .iter()
            .fold(String::from("\nErrors:\n"), |acc, e| acc + "  - " + e + "\n")
    };

    format!(
        "C project preprocessing report\n\
         {rule}\n\
         Generated at: {generated}\n\
         Total files: {total}\n\
         Paired files: {pairs}\n\
         Header only: {headers}\n\
         Source only: {sources}\n\
         Misc files: {misc}\n\
         Skipped files: {skipped}\n\
         Processing time: {time:.2}s\n\
         Total size: {size}\n\
         {errors}",
        rule = "=".repeat(50),
        generated = Local::now().format("%Y-%m-%d %H:%M:%S"),
        total = stats.total_files,
        pairs = stats.processed_pairs,
        headers = stats.header_only,
        sources = stats.source_only,
        misc = stats.misc_files,
        skipped = stats.skipped_files,
        time = stats.processing_time,
        size = format_size(stats.total_size),
    )
}

/// Human readable byte count, e.g. `1.50 MB`.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(100 * 1024 * 1024), "100.00 MB");
        assert_eq!(format_size(1024u64.pow(5)), "1.00 PB");
    }

    #[test]
    fn test_partition_counts() {
        let agg = StatsAggregator::new();
        agg.record_scan(6, 1, 600);
        agg.record_pairs(1);
        agg.record_category(FileCategory::HeaderOnly);
        agg.record_category(FileCategory::SourceOnly);
        agg.record_category(FileCategory::Misc);

        let stats = agg.snapshot();
        assert_eq!(stats.total_files, 7);
        assert_eq!(stats.skipped_files, 1);
        assert!(!stats.is_partition_consistent());

        agg.record_category(FileCategory::Misc);
        assert!(agg.snapshot().is_partition_consistent());
    }

    #[test]
    fn test_concurrent_error_collection() {
        let agg = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let agg = agg.clone();
                thread::spawn(move || {
                    for j in 0..25 {
                        agg.record_error(format!("worker {i} error {j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.error_count(), 200);
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let agg = StatsAggregator::new();
        agg.record_scan(2, 0, 2048);
        agg.record_pairs(1);
        agg.record_error("permission denied: a.c");

        agg.write_reports(dir.path(), &PreprocessConfig::default())
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join(JSON_REPORT_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(json["statistics"]["total_files"], 2);
        assert_eq!(json["statistics"]["processed_pairs"], 1);
        assert!(json["config"]["pairing_rules"].is_array());
        assert!(json["timestamp"].is_string());

        let text = fs::read_to_string(dir.path().join(TEXT_REPORT_NAME)).unwrap();
        assert!(text.contains("Paired files: 1"));
        assert!(text.contains("Total size: 2.00 KB"));
        assert!(text.contains("permission denied: a.c"));
    }

    #[test]
    fn test_text_report_layout() {
        let stats = ProcessingStats {
            total_files: 3,
            source_only: 1,
            processed_pairs: 1,
            ..ProcessingStats::default()
        };
        let text = render_text_report(&stats);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "C project preprocessing report");
        assert_eq!(lines[1], "=".repeat(50));
        assert!(lines[2].starts_with("Generated at: "));
        assert_eq!(lines[3], "Total files: 3");
        assert_eq!(lines[10], "Total size: 0.00 B");
        assert_eq!(lines.len(), 11);
        assert!(!text.contains("Errors:"));

        let failed = ProcessingStats {
            errors: vec!["a.c: denied".into(), "b.c: denied".into()],
            ..stats
        };
        let text = render_text_report(&failed);
        assert!(text.ends_with("\nErrors:\n  - a.c: denied\n  - b.c: denied\n"));
    }
}
