//! Cache layout, disk-space preflight and resource-bounded file copying.

use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::classifier::{FileCategory, FileRecord};
use super::pairing::FilePair;
use super::stats::format_size;
use crate::config::PreprocessConfig;
use crate::error::PreprocessError;

pub const PAIRED_DIR: &str = "paired_files";
pub const INDIVIDUAL_DIR: &str = "individual_files";

fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    let mut current = Some(path);
    while let Some(p) = current {
        if p.exists() {
            return p.to_path_buf();
        }
        current = p.parent().filter(|parent| !parent.as_os_str().is_empty());
    }
    PathBuf::from(".")
}

/// Fail with `DiskFull` when the filesystem holding `target_dir` has less
/// than `min_free_bytes` available. An unavailable probe only logs.
pub fn preflight(target_dir: &Path, min_free_bytes: u64) -> Result<(), PreprocessError> {
    let probe = nearest_existing_ancestor(target_dir);
    match fs2::available_space(&probe) {
        Ok(available) if available < min_free_bytes => Err(PreprocessError::DiskFull(format!(
            "available {} at {}, need at least {}",
            format_size(available),
            probe.display(),
            format_size(min_free_bytes)
        ))),
        Ok(available) => {
            info!("Available disk space: {}", format_size(available));
            Ok(())
        }
        Err(e) => {
            warn!(
                "Cannot probe free disk space at {}: {e}; skipping check",
                probe.display()
            );
            Ok(())
        }
    }
}

/// Create `paired_files/` and `individual_files/{header_only,source_only,misc_files}/`.
/// Existing directories and their contents are left alone.
pub fn create_cache_layout(cache_root: &Path) -> Result<(), PreprocessError> {
    let mut dirs = vec![cache_root.to_path_buf(), cache_root.join(PAIRED_DIR)];
    dirs.extend(
        FileCategory::all()
            .iter()
            .map(|c| cache_root.join(INDIVIDUAL_DIR).join(c.dir_name())),
    );

    for dir in dirs {
        fs::create_dir_all(&dir).map_err(|e| PreprocessError::from_io(&dir, e))?;
        debug!("Created directory: {}", dir.display());
    }
    Ok(())
}

/// Copy `src` to `dst`. Files above the large-file threshold are streamed
/// in `chunk_size` pieces; permissions and timestamps are carried over on
/// both paths.
pub fn copy_file(src: &Path, dst: &Path, config: &PreprocessConfig) -> Result<(), PreprocessError> {
    let meta = fs::metadata(src).map_err(|e| PreprocessError::from_io(src, e))?;

    if meta.len() > config.large_file_threshold {
        debug!(
            "Chunked copy of large file {} ({})",
            src.display(),
            format_size(meta.len())
        );
        copy_chunked(src, dst, config.chunk_size)?;
    } else {
        fs::copy(src, dst).map_err(|e| PreprocessError::from_io(dst, e))?;
    }

    preserve_metadata(&meta, dst)
}

fn copy_chunked(src: &Path, dst: &Path, chunk_size: usize) -> Result<(), PreprocessError> {
    let mut reader = File::open(src).map_err(|e| PreprocessError::from_io(src, e))?;
    let mut writer = File::create(dst).map_err(|e| PreprocessError::from_io(dst, e))?;
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PreprocessError::from_io(src, e)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| PreprocessError::from_io(dst, e))?;
    }
    writer.flush().map_err(|e| PreprocessError::from_io(dst, e))
}

fn preserve_metadata(meta: &Metadata, dst: &Path) -> Result<(), PreprocessError> {
    let mut times = FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    File::open(dst)
        .and_then(|f| f.set_times(times))
        .map_err(|e| PreprocessError::from_io(dst, e))?;
    fs::set_permissions(dst, meta.permissions()).map_err(|e| PreprocessError::from_io(dst, e))
}

/// Atomically claim a free file name in `dir`, starting with `file_name`
/// and falling back to `stem_N.ext`.
fn reserve_destination(dir: &Path, file_name: &str) -> Result<PathBuf, PreprocessError> {
    let original = dir.join(file_name);
    let (stem, ext) = match (original.file_stem(), original.extension()) {
        (Some(stem), Some(ext)) => (
            stem.to_string_lossy().into_owned(),
            format!(".{}", ext.to_string_lossy()),
        ),
        _ => (file_name.to_string(), String::new()),
    };

    let mut counter = 0;
    loop {
        let candidate = if counter == 0 {
            original.clone()
        } else {
            dir.join(format!("{stem}_{counter}{ext}"))
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => {
                if counter > 0 {
                    warn!(
                        "File name conflict, renamed to {}",
                        candidate.display()
                    );
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(PreprocessError::from_io(&candidate, e)),
        }
    }
}

/// Copy both members of `pair` into `cache_root/paired_files/<base_name>/`.
pub fn copy_pair(
    pair: &FilePair,
    cache_root: &Path,
    config: &PreprocessConfig,
) -> Result<PathBuf, PreprocessError> {
    let target_dir = cache_root.join(PAIRED_DIR).join(&pair.base_name);
    fs::create_dir_all(&target_dir).map_err(|e| PreprocessError::from_io(&target_dir, e))?;

    for member in [&pair.source, &pair.header] {
        copy_file(&member.path, &target_dir.join(member.file_name()), config)?;
    }

    debug!("Pair copied: {}", target_dir.display());
    Ok(target_dir)
}

/// Copy one unpaired file into `cache_root/individual_files/<category>/<stem>/`.
pub fn copy_individual(
    file: &FileRecord,
    category: FileCategory,
    cache_root: &Path,
    config: &PreprocessConfig,
) -> Result<PathBuf, PreprocessError> {
    let target_dir = cache_root
        .join(INDIVIDUAL_DIR)
        .join(category.dir_name())
        .join(file.stem());
    fs::create_dir_all(&target_dir).map_err(|e| PreprocessError::from_io(&target_dir, e))?;

    let target = reserve_destination(&target_dir, &file.file_name())?;
    copy_file(&file.path, &target, config)?;

    debug!("File copied: {} -> {}", file.path.display(), target.display());
    Ok(target)
}
