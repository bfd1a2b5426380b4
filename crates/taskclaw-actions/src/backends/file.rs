//! `file_operation` backend: backup, delete, move, copy, cleanup.
//!
//! Paths are checked after `{{var}}` substitution, right before use.
//! Filesystem work runs on the blocking pool.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use taskclaw_core::outcome::{ActionOutcome, codes};
use taskclaw_core::task::{ActionKind, FileOperation, FileOperationConfig};
use taskclaw_security::check_file_path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::{ActionBackend, mismatched};

pub struct FileBackend {
    enabled: bool,
}

impl FileBackend {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl ActionBackend for FileBackend {
    fn kind(&self) -> &'static str {
        ActionKind::FILE_OPERATION
    }

    async fn execute(&self, action: &ActionKind) -> ActionOutcome {
        let ActionKind::FileOperation(config) = action else {
            return mismatched("file_operation", action);
        };
        if !self.enabled {
            return ActionOutcome::failed_with("file operations are disabled", codes::DISABLED);
        }
        if let Err(reason) = check_paths(config) {
            tracing::warn!("🛡️ File operation {:?} rejected: {}", config.operation, reason);
            return ActionOutcome::failed_with(format!("unsafe path rejected: {reason}"), codes::SECURITY_REJECTED);
        }

        let config = config.clone();
        let operation = config.operation;
        match tokio::task::spawn_blocking(move || run(&config)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!("⚠️ File operation {:?} failed: {}", operation, e);
                ActionOutcome::failed_with(format!("file operation failed: {e}"), codes::BACKEND_ERROR)
            }
            Err(e) => ActionOutcome::failed_with(format!("file operation aborted: {e}"), codes::PANIC),
        }
    }
}

fn check_paths(config: &FileOperationConfig) -> Result<(), String> {
    check_file_path(&config.source_path)?;
    match config.target_path.as_deref() {
        Some(target) => check_file_path(target),
        None => Ok(()),
    }
}

/// Oldest modification time that survives a cleanup of `days_old` days.
fn cleanup_cutoff(now: SystemTime, days_old: u64) -> SystemTime {
    days_old
        .checked_mul(86_400)
        .and_then(|secs| now.checked_sub(Duration::from_secs(secs)))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn run(config: &FileOperationConfig) -> io::Result<ActionOutcome> {
    let source = Path::new(&config.source_path);
    if !source.exists() {
        return Ok(ActionOutcome::failed_with(
            format!("source path does not exist: {}", config.source_path),
            codes::NOT_FOUND,
        ));
    }

    let target = config.target_path.as_deref().map(PathBuf::from);
    let needs_target = matches!(config.operation, FileOperation::Backup | FileOperation::Move | FileOperation::Copy);
    let target = match target {
        Some(t) => t,
        None if needs_target => {
            return Ok(ActionOutcome::failed_with("target_path is required", codes::INVALID_CONFIG));
        }
        None => PathBuf::new(),
    };

    match config.operation {
        FileOperation::Backup => backup(source, &target, config.compress),
        FileOperation::Delete => delete(source),
        FileOperation::Move => {
            ensure_parent(&target)?;
            if fs::rename(source, &target).is_err() {
                copy_any(source, &target)?;
                remove_any(source)?;
            }
            Ok(ActionOutcome::ok(format!("moved {} -> {}", source.display(), target.display())))
        }
        FileOperation::Copy => {
            ensure_parent(&target)?;
            copy_any(source, &target)?;
            Ok(ActionOutcome::ok(format!("copied {} -> {}", source.display(), target.display())))
        }
        FileOperation::Cleanup => cleanup(source, config.days_old, &config.pattern),
    }
}

fn backup(source: &Path, target: &Path, compress: bool) -> io::Result<ActionOutcome> {
    ensure_parent(target)?;
    let size = if compress {
        write_zip(source, target)?;
        fs::metadata(target)?.len()
    } else {
        copy_any(source, target)?;
        total_size(target)?
    };

    tracing::info!("💾 Backup written: {} ({})", target.display(), format_size(size));
    Ok(ActionOutcome::ok(format!("backup completed: {}", target.display()))
        .with_data(json!({
            "source": source.display().to_string(),
            "target": target.display().to_string(),
            "size": size,
            "compressed": compress,
        }))
        .export("backup_file", target.display().to_string())
        .export("backup_size", format_size(size)))
}

fn write_zip(source: &Path, target: &Path) -> io::Result<()> {
    let mut zip = ZipWriter::new(fs::File::create(target)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut files = Vec::new();
    if source.is_file() {
        let name = source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        files.push((source.to_path_buf(), name));
    } else {
        for path in walk_files(source)? {
            let name = path
                .strip_prefix(source)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            files.push((path, name));
        }
    }

    for (path, name) in files {
        zip.start_file(name, options).map_err(io::Error::other)?;
        zip.write_all(&fs::read(&path)?)?;
    }
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

fn delete(path: &Path) -> io::Result<ActionOutcome> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
        Ok(ActionOutcome::ok(format!("directory deleted: {}", path.display())))
    } else {
        fs::remove_file(path)?;
        Ok(ActionOutcome::ok(format!("file deleted: {}", path.display())))
    }
}

/// Delete files directly under `dir` whose name matches `pattern` and
/// whose modification time is older than `days_old` days.
fn cleanup(dir: &Path, days_old: u64, pattern: &str) -> io::Result<ActionOutcome> {
    let matcher = glob_regex(pattern);
    let cutoff = cleanup_cutoff(SystemTime::now(), days_old);

    let mut deleted = 0u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() || !matcher.is_match(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if meta.modified()? < cutoff {
            fs::remove_file(entry.path())?;
            deleted += 1;
        }
    }

    tracing::info!("🧹 Cleanup of {} removed {} file(s)", dir.display(), deleted);
    Ok(ActionOutcome::ok(format!("cleanup completed, {deleted} file(s) deleted"))
        .with_data(json!({ "deleted_count": deleted, "days_old": days_old }))
        .export("deleted_count", deleted))
}

/// `*` and `?` glob to an anchored regex.
fn glob_regex(pattern: &str) -> Regex {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).unwrap_or_else(|_| Regex::new("^$").expect("static regex"))
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn copy_any(source: &Path, target: &Path) -> io::Result<()> {
    if source.is_file() {
        fs::copy(source, target).map(|_| ())
    } else {
        copy_dir(source, target)
    }
}

fn copy_dir(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

fn remove_any(path: &Path) -> io::Result<()> {
    if path.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) }
}

fn walk_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                stack.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn total_size(path: &Path) -> io::Result<u64> {
    if path.is_file() {
        return Ok(fs::metadata(path)?.len());
    }
    walk_files(path)?
        .iter()
        .map(|p| fs::metadata(p).map(|m| m.len()))
        .sum()
}

/// `1536` -> `1.5KB`.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}PB")
}
