use std::fs;
use std::path::PathBuf;

use ignore::WalkBuilder;
use tracing::{info, warn};

use super::graph::CallGraphBuilder;
use super::scanner::{CodeScanner, LexicalScanner};
use crate::config::AnalysisConfig;
use crate::db::RelationStore;
use crate::db::models::{AnalysisResult, SaveSummary};
use crate::error::AnalysisError;
use crate::preprocess::classifier::{dotted_extension, relative_slash_path};

/// Walks a project tree sequentially, scans every C/C++ file and resolves
/// the results into one [`AnalysisResult`].
pub struct RelationAnalyzer<S: CodeScanner = LexicalScanner> {
    root: PathBuf,
    config: AnalysisConfig,
    scanner: S,
}

impl RelationAnalyzer<LexicalScanner> {
    pub fn new(root: impl Into<PathBuf>, config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let root = root.into();
        let scanner = LexicalScanner::new(root.clone(), &config.include_dirs)?;
        Ok(Self::with_scanner(root, config, scanner))
    }
}

impl<S: CodeScanner> RelationAnalyzer<S> {
    pub fn with_scanner(root: impl Into<PathBuf>, config: AnalysisConfig, scanner: S) -> Self {
        Self {
            root: root.into(),
            config,
            scanner,
        }
    }

    /// Analysable files under the root, sorted by path. Directories named in
    /// `skip_dirs` are not entered.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let skip_dirs = self.config.skip_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(true)
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && skip_dirs
                        .iter()
                        .any(|d| entry.file_name().to_str() == Some(d.as_str())))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Cannot access entry during analysis walk: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if self
                .config
                .is_analyzed_extension(&dotted_extension(entry.path()))
            {
                files.push(entry.into_path());
            }
        }

        info!("Found {} source files", files.len());
        files
    }

    /// Scan every source file and resolve calls across files. Unreadable
    /// files are logged and skipped.
    pub fn analyze(&self) -> Result<AnalysisResult, AnalysisError> {
        if !self.root.is_dir() {
            return Err(AnalysisError::InvalidRoot(self.root.clone()));
        }
        info!("Analyzing call relations under {}", self.root.display());

        let mut builder = CallGraphBuilder::new();
        for path in self.source_files() {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    warn!("Failed to read {}: {e}", path.display());
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&bytes);
            let relative = relative_slash_path(&self.root, &path);
            let scan = self.scanner.scan_file(&relative, &text);
            builder.add_file(&relative, scan);
        }

        let result = builder.build();
        info!(
            "Analysis complete: {} definitions, {} calls, {} dependencies",
            result.definitions.len(),
            result.calls.len(),
            result.dependencies.len()
        );
        Ok(result)
    }

    /// [`analyze`](Self::analyze), then persist under `project` in one transaction.
    pub fn analyze_and_save(
        &self,
        store: &mut RelationStore,
        project: &str,
    ) -> Result<SaveSummary, AnalysisError> {
        let result = self.analyze()?;
        Ok(store.save(&result, project)?)
    }
}
