//! Source tree scanning and extension-based classification.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PreprocessConfig;
use crate::error::PreprocessError;

/// A regular file found under the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated
    pub relative: String,
    pub size: u64,
    pub is_large: bool,
}

impl FileRecord {
    pub fn new(path: PathBuf, relative: String, size: u64, large_file_threshold: u64) -> Self {
        Self {
            path,
            relative,
            size,
            is_large: size > large_file_threshold,
        }
    }

    /// Lower-cased extension with a leading dot, or `""`.
    #[must_use]
    pub fn extension(&self) -> String {
        dotted_extension(&self.path)
    }

    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub(crate) fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Bucket for files that did not end up in a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    HeaderOnly,
    SourceOnly,
    Misc,
}

impl FileCategory {
    /// Directory name under `individual_files/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            FileCategory::HeaderOnly => "header_only",
            FileCategory::SourceOnly => "source_only",
            FileCategory::Misc => "misc_files",
        }
    }

    pub fn all() -> [FileCategory; 3] {
        [
            FileCategory::HeaderOnly,
            FileCategory::SourceOnly,
            FileCategory::Misc,
        ]
    }
}

/// Glob-style exclude patterns.
///
/// A relative pattern with `n` components is tested against every run of
/// `n` consecutive components of the file's relative path, so `*.o` hits any
/// object file and `.git/*` hits anything below a `.git` directory.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    patterns: Vec<(GlobMatcher, usize)>,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, PreprocessError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let trimmed = pattern.trim_matches('/');
            if trimmed.is_empty() {
                return Err(PreprocessError::Config(format!(
                    "empty exclude pattern: {pattern:?}"
                )));
            }
            let glob: Glob = GlobBuilder::new(trimmed)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    PreprocessError::Config(format!("invalid exclude pattern {pattern:?}: {e}"))
                })?;
            compiled.push((glob.compile_matcher(), trimmed.split('/').count()));
        }
        Ok(Self { patterns: compiled })
    }

    #[must_use]
    pub fn is_excluded(&self, relative: &str) -> bool {
        let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
        self.patterns.iter().any(|(matcher, width)| {
            parts.len() >= *width
                && parts
                    .windows(*width)
                    .any(|w| matcher.is_match(w.join("/")))
        })
    }
}

/// Result of walking the source tree.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<FileRecord>,
    /// Entries that could not be read; each one is counted as skipped.
    pub skipped: Vec<String>,
}

impl ScanResult {
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Relative `/`-separated form of `path` under `root`.
pub(crate) fn relative_slash_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walk `root` and collect every regular file not matched by `excludes`.
///
/// Anything under `skip_dir` (the cache directory, when it lives inside the
/// source tree) is ignored. Symlinks are followed. Unreadable entries and
/// broken links are recorded as skipped with a warning; they never abort
/// the scan.
pub fn scan(
    root: &Path,
    excludes: &ExcludeMatcher,
    large_file_threshold: u64,
    skip_dir: Option<&Path>,
) -> ScanResult {
    info!("Scanning source files under {}", root.display());
    let mut result = ScanResult::default();

    let skip_dir = skip_dir.map(Path::to_path_buf);
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(move |entry| match &skip_dir {
            Some(dir) => !entry.path().starts_with(dir),
            None => true,
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot access entry during scan: {e}");
                result.skipped.push(e.to_string());
                continue;
            }
        };

        let is_file = entry.file_type().is_some_and(|t| t.is_file());
        if !is_file {
            continue;
        }

        let path = entry.path();
        let relative = relative_slash_path(root, path);
        if excludes.is_excluded(&relative) {
            debug!("Excluded: {relative}");
            continue;
        }

        match entry.metadata() {
            Ok(meta) => result.files.push(FileRecord::new(
                path.to_path_buf(),
                relative,
                meta.len(),
                large_file_threshold,
            )),
            Err(e) => {
                warn!("Cannot access file {}: {e}", path.display());
                result.skipped.push(relative);
            }
        }
    }

    result.files.sort_by(|a, b| a.relative.cmp(&b.relative));
    info!(
        "Scan complete: {} files, {} skipped",
        result.files.len(),
        result.skipped.len()
    );
    result
}

/// Files left over after pairing, bucketed by extension.
#[derive(Debug, Default)]
pub struct Categorized {
    pub header_only: Vec<FileRecord>,
    pub source_only: Vec<FileRecord>,
    pub misc_files: Vec<FileRecord>,
}

impl Categorized {
    pub fn iter(&self) -> impl Iterator<Item = (FileCategory, &FileRecord)> {
        self.header_only
            .iter()
            .map(|f| (FileCategory::HeaderOnly, f))
            .chain(self.source_only.iter().map(|f| (FileCategory::SourceOnly, f)))
            .chain(self.misc_files.iter().map(|f| (FileCategory::Misc, f)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.header_only.len() + self.source_only.len() + self.misc_files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[must_use]
pub fn classify(file: &FileRecord, config: &PreprocessConfig) -> FileCategory {
    let ext = file.extension();
    if config.is_header_extension(&ext) {
        FileCategory::HeaderOnly
    } else if config.is_source_extension(&ext) {
        FileCategory::SourceOnly
    } else {
        FileCategory::Misc
    }
}

/// Bucket unpaired files purely by extension-set membership.
pub fn categorize_remainder(unpaired: Vec<FileRecord>, config: &PreprocessConfig) -> Categorized {
    let mut out = Categorized::default();
    for file in unpaired {
        match classify(&file, config) {
            FileCategory::HeaderOnly => out.header_only.push(file),
            FileCategory::SourceOnly => out.source_only.push(file),
            FileCategory::Misc => out.misc_files.push(file),
        }
    }
    out
}
