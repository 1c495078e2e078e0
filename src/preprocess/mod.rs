//! Source tree preprocessing: classify, pair and copy a C/C++ tree into the
//! organised cache layout.
//!
//! ```text
//! <cache>/paired_files/<base>/{source, header}
//! <cache>/individual_files/{header_only,source_only,misc_files}/<stem>/<file>
//! <cache>/processing_report.json
//! <cache>/processing_log.txt
//! ```

pub mod classifier;
pub mod copier;
pub mod pairing;
pub mod scheduler;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::config::PreprocessConfig;
use crate::error::PreprocessError;
use classifier::ExcludeMatcher;
use pairing::PairingRule;
use scheduler::{CopyScheduler, CopyTask};
use stats::{ProcessingStats, StatsAggregator, format_size};

/// Result of one preprocessing run. `success == false` always comes with at
/// least one entry in `stats.errors`.
#[derive(Debug, Clone)]
pub struct PreprocessOutcome {
    pub success: bool,
    pub stats: ProcessingStats,
}

pub struct Preprocessor {
    config: Arc<PreprocessConfig>,
    rules: Vec<PairingRule>,
    excludes: ExcludeMatcher,
}

impl Preprocessor {
    /// Compile pairing rules and exclude patterns. Fails with
    /// [`PreprocessError::Config`] before touching the filesystem.
    pub fn new(config: PreprocessConfig) -> Result<Self, PreprocessError> {
        if config.chunk_size == 0 {
            return Err(PreprocessError::Config(
                "chunk_size must be positive".to_string(),
            ));
        }
        let rules = PairingRule::compile_all(&config.pairing_rules)?;
        let excludes = ExcludeMatcher::new(&config.exclude_patterns)?;
        Ok(Self {
            config: Arc::new(config),
            rules,
            excludes,
        })
    }

    /// Reorganise `source_dir` into `cache_dir`.
    ///
    /// Per-file access errors are collected and do not fail the run. A
    /// fatal error (invalid source, disk full) returns `success == false`
    /// with whatever statistics were gathered so far; the reports are only
    /// written once every copy has finished.
    pub async fn preprocess(&self, source_dir: &Path, cache_dir: &Path) -> PreprocessOutcome {
        let start = Instant::now();
        let stats = Arc::new(StatsAggregator::new());
        info!(
            "Preprocessing project: {} -> {}",
            source_dir.display(),
            cache_dir.display()
        );

        let result = self.run(source_dir, cache_dir, &stats).await;
        stats.set_processing_time(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                let snapshot = stats.snapshot();
                info!(
                    "Preprocessing finished in {:.2}s ({} errors)",
                    snapshot.processing_time,
                    snapshot.errors.len()
                );
                PreprocessOutcome {
                    success: true,
                    stats: snapshot,
                }
            }
            Err(e) => {
                error!("Preprocessing failed: {e}");
                stats.record_error(e.to_string());
                PreprocessOutcome {
                    success: false,
                    stats: stats.snapshot(),
                }
            }
        }
    }

    async fn run(
        &self,
        source_dir: &Path,
        cache_dir: &Path,
        stats: &Arc<StatsAggregator>,
    ) -> Result<(), PreprocessError> {
        if !source_dir.is_dir() {
            return Err(PreprocessError::InvalidSource(source_dir.to_path_buf()));
        }

        copier::preflight(cache_dir, self.config.min_disk_space)?;
        copier::create_cache_layout(cache_dir)?;

        let source_root = source_dir
            .canonicalize()
            .map_err(|e| PreprocessError::from_io(source_dir, e))?;
        let cache_root = cache_dir
            .canonicalize()
            .map_err(|e| PreprocessError::from_io(cache_dir, e))?;

        let scan = {
            let root = source_root.clone();
            let skip = cache_root.clone();
            let excludes = self.excludes.clone();
            let threshold = self.config.large_file_threshold;
            tokio::task::spawn_blocking(move || {
                classifier::scan(&root, &excludes, threshold, Some(&skip))
            })
            .await
            .map_err(|e| PreprocessError::Join(e.to_string()))?
        };

        let total_size = scan.total_size();
        stats.record_scan(scan.files.len(), scan.skipped.len(), total_size);
        for skipped in &scan.skipped {
            stats.record_error(format!("skipped: {skipped}"));
        }
        info!(
            "Found {} files, total size {}",
            scan.files.len(),
            format_size(total_size)
        );

        let pairs = pairing::find_pairs(&scan.files, &self.rules, &self.config);
        stats.record_pairs(pairs.len());

        let remainder = pairing::unpaired_files(scan.files, &pairs);
        let categorized = classifier::categorize_remainder(remainder, &self.config);
        info!(
            "Remaining files: {} header only, {} source only, {} misc",
            categorized.header_only.len(),
            categorized.source_only.len(),
            categorized.misc_files.len()
        );

        let mut tasks: Vec<CopyTask> = pairs.into_values().map(CopyTask::Pair).collect();
        for (category, file) in categorized.iter() {
            stats.record_category(category);
            tasks.push(CopyTask::Individual {
                file: file.clone(),
                category,
            });
        }

        let scheduler = CopyScheduler::new(cache_root.clone(), self.config.clone(), stats.clone());
        scheduler.run(tasks).await?;

        write_reports(stats, &cache_root, &self.config)
    }
}

fn write_reports(
    stats: &StatsAggregator,
    cache_root: &Path,
    config: &PreprocessConfig,
) -> Result<(), PreprocessError> {
    stats
        .write_reports(cache_root, config)
        .map_err(|e| PreprocessError::from_io(&report_path(cache_root), e))
}

fn report_path(cache_root: &Path) -> PathBuf {
    cache_root.join(stats::JSON_REPORT_NAME)
}
