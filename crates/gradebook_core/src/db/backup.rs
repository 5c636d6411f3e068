//! Rotating pre-modification backups.
//!
//! # Responsibility
//! - Copy the live database into a backup directory before a maintenance run.
//! - Keep only the newest `keep` backups.
//!
//! # Invariants
//! - Backup file names sort chronologically: `<epoch_ms:020>-<reason>.db`.
//! - Only files following that naming scheme are ever pruned.

use super::DbResult;
use log::{info, warn};
use rusqlite::{Connection, DatabaseName};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const BACKUP_EXTENSION: &str = "db";

/// Writes an online backup of `conn` into `backup_dir` and prunes old ones.
///
/// Returns the path of the new backup file.
///
/// # Side effects
/// - Creates `backup_dir` when missing.
/// - Deletes the oldest backups beyond `keep` (a `keep` of 0 keeps all).
pub fn backup_before_modification(
    conn: &Connection,
    backup_dir: impl AsRef<Path>,
    reason: &str,
    keep: usize,
) -> DbResult<PathBuf> {
    let started_at = Instant::now();
    let backup_dir = backup_dir.as_ref();
    std::fs::create_dir_all(backup_dir)?;

    let target = backup_dir.join(format!(
        "{:020}-{}.{BACKUP_EXTENSION}",
        epoch_millis(),
        sanitize_reason(reason)
    ));
    conn.backup(DatabaseName::Main, &target, None)?;

    let pruned = if keep > 0 {
        prune_backups(backup_dir, keep)?
    } else {
        0
    };

    info!(
        "event=db_backup module=db status=ok reason={} pruned={} duration_ms={}",
        sanitize_reason(reason),
        pruned,
        started_at.elapsed().as_millis()
    );
    Ok(target)
}

/// Lists backup files in `backup_dir`, oldest first.
pub fn list_backups(backup_dir: impl AsRef<Path>) -> DbResult<Vec<PathBuf>> {
    let backup_dir = backup_dir.as_ref();
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in std::fs::read_dir(backup_dir)? {
        let path = entry?.path();
        if is_backup_file(&path) {
            backups.push(path);
        }
    }
    backups.sort();
    Ok(backups)
}

fn prune_backups(backup_dir: &Path, keep: usize) -> DbResult<usize> {
    let backups = list_backups(backup_dir)?;
    if backups.len() <= keep {
        return Ok(0);
    }

    let excess = backups.len() - keep;
    for path in &backups[..excess] {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(
                "event=db_backup module=db status=error error_code=prune_failed path={} error={}",
                path.display(),
                err
            );
            return Err(err.into());
        }
    }
    Ok(excess)
}

fn is_backup_file(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .is_some_and(|extension| extension == BACKUP_EXTENSION);
    let has_stamp = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split_once('-'))
        .is_some_and(|(stamp, _)| stamp.len() == 20 && stamp.bytes().all(|b| b.is_ascii_digit()));
    has_extension && has_stamp
}

fn sanitize_reason(reason: &str) -> String {
    let cleaned: String = reason
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "manual".to_string()
    } else {
        cleaned
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis())
}
