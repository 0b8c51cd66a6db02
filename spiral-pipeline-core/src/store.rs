//! Whole-file JSON persistence for the data directory.
//!
//! Files are read in full, mutated in memory and written back in full. Every
//! write lands in a temporary file next to the target and is renamed over it,
//! so a crash mid-write never leaves a truncated data file behind. There is no
//! locking: two runs against the same data root race, last writer wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::CatalogEntry;
use crate::error::StoreError;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))
}

/// Like [`read_json`], but a missing file yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        debug!(path = %path.display(), "File absent, using empty default");
        return Ok(T::default());
    }
    read_json(path)
}

/// Pretty-printed (2-space) JSON, atomically replacing `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| StoreError::json(path, e))?;
    write_text(path, &text)
}

/// Atomically replaces `path` with `contents`, creating parent directories.
pub fn write_text(path: &Path, contents: &str) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = contents.len(), "Wrote file");
    Ok(())
}

/// `tools.json` at 1700000000000 ms becomes `tools.backup.1700000000000.json`.
pub fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(
            "{stem}.backup.{}.{}",
            at.timestamp_millis(),
            ext.to_string_lossy()
        ),
        None => format!("{stem}.backup.{}", at.timestamp_millis()),
    };
    path.with_file_name(name)
}

/// Copies the current file aside before it is overwritten. Returns `None` when
/// there is nothing to back up yet.
pub fn backup_file(path: &Path, at: DateTime<Utc>) -> Result<Option<PathBuf>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = backup_path(path, at);
    fs::copy(path, &backup).map_err(|e| StoreError::io(&backup, e))?;
    info!(path = %backup.display(), "Backup saved");
    Ok(Some(backup))
}

pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>, StoreError> {
    let catalog: Vec<CatalogEntry> = read_json(path)?;
    info!(path = %path.display(), entries = catalog.len(), "Loaded catalog");
    Ok(catalog)
}

/// Backs up the catalog file, then overwrites it with `catalog`.
pub fn save_catalog_with_backup(
    path: &Path,
    catalog: &[CatalogEntry],
    at: DateTime<Utc>,
) -> Result<Option<PathBuf>, StoreError> {
    let backup = backup_file(path, at)?;
    write_json(path, catalog)?;
    info!(path = %path.display(), entries = catalog.len(), "Catalog written");
    Ok(backup)
}
