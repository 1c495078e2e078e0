//! Bounded worker pool for the copy phase.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::{FileCategory, FileRecord};
use super::copier;
use super::pairing::FilePair;
use super::stats::StatsAggregator;
use crate::config::PreprocessConfig;
use crate::error::PreprocessError;

/// One unit of work: a whole pair or a single leftover file.
#[derive(Debug, Clone)]
pub enum CopyTask {
    Pair(FilePair),
    Individual {
        file: FileRecord,
        category: FileCategory,
    },
}

impl CopyTask {
    fn label(&self) -> String {
        match self {
            CopyTask::Pair(pair) => format!("pair {}", pair.base_name),
            CopyTask::Individual { file, category } => {
                format!("{} file {}", category.dir_name(), file.relative)
            }
        }
    }

    fn run(&self, cache_root: &std::path::Path, config: &PreprocessConfig) -> Result<PathBuf, PreprocessError> {
        match self {
            CopyTask::Pair(pair) => copier::copy_pair(pair, cache_root, config),
            CopyTask::Individual { file, category } => {
                copier::copy_individual(file, *category, cache_root, config)
            }
        }
    }
}

/// Runs copy tasks on at most `workers` blocking threads at a time.
///
/// Per-file access errors are appended to the shared stats and the run goes
/// on. The first fatal error stops new tasks from being scheduled; tasks
/// already running are joined before it is returned.
pub struct CopyScheduler {
    workers: usize,
    cache_root: PathBuf,
    config: Arc<PreprocessConfig>,
    stats: Arc<StatsAggregator>,
}

impl CopyScheduler {
    pub fn new(
        cache_root: PathBuf,
        config: Arc<PreprocessConfig>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            workers: config.effective_worker_count().max(1),
            cache_root,
            config,
            stats,
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb
    }

    pub async fn run(&self, tasks: Vec<CopyTask>) -> Result<(), PreprocessError> {
        info!(
            "Copying {} tasks with {} workers",
            tasks.len(),
            self.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let cancel = CancellationToken::new();
        let pb = self.progress_bar(tasks.len());
        let mut join_set: JoinSet<Result<(), PreprocessError>> = JoinSet::new();
        let mut fatal: Option<PreprocessError> = None;

        for task in tasks {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| PreprocessError::Join(e.to_string()))?
                }
            };

            let cache_root = self.cache_root.clone();
            let config = self.config.clone();
            let stats = self.stats.clone();
            let cancel = cancel.clone();
            let pb = pb.clone();

            join_set.spawn_blocking(move || {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let label = task.label();
                pb.set_message(label.clone());

                let result = match task.run(&cache_root, &config) {
                    Ok(dest) => {
                        debug!("Copied {label} -> {}", dest.display());
                        Ok(())
                    }
                    Err(e) if e.is_fatal() => {
                        error!("Fatal error while copying {label}: {e}");
                        cancel.cancel();
                        Err(e)
                    }
                    Err(e) => {
                        warn!("Copy failed for {label}: {e}");
                        stats.record_error(format!("{label}: {e}"));
                        Ok(())
                    }
                };
                pb.inc(1);
                result
            });

            while let Some(joined) = join_set.try_join_next() {
                self.absorb(joined, &mut fatal);
            }
        }

        while let Some(joined) = join_set.join_next().await {
            self.absorb(joined, &mut fatal);
        }
        pb.finish_and_clear();

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn absorb(
        &self,
        joined: Result<Result<(), PreprocessError>, tokio::task::JoinError>,
        fatal: &mut Option<PreprocessError>,
    ) {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if fatal.is_none() {
                    *fatal = Some(e);
                }
            }
            Err(e) => {
                error!("Copy worker panicked: {e}");
                self.stats.record_error(format!("worker task failed: {e}"));
            }
        }
    }
}
