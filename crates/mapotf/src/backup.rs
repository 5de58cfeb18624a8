//! Backups of files touched by a transform run
//!
//! Before a file is written for the first time its original content is saved next to it as
//! `<file>.mptfbackup`. A backup is never overwritten, so it always holds the content from before the first run.
//! Files created by a run get an empty backup, restoring it deletes the file.
use std::path::{Path, PathBuf};

pub const BACKUP_EXTENSION: &str = "mptfbackup";

#[derive(thiserror::Error, Debug)]
#[error("failed to {action} {path}")]
pub struct BackupError {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl BackupError {
    fn new<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| BackupError {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// `main.tf` -> `main.tf.mptfbackup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(BACKUP_EXTENSION);
    PathBuf::from(name)
}

/// Writes the backup for `path` unless one exists already
///
/// `original` is `None` for files that did not exist before the run. Returns `true` if a backup was written.
pub fn write_backup(path: &Path, original: Option<&str>) -> Result<bool, BackupError> {
    let backup = backup_path(path);
    if backup.exists() {
        tracing::trace!(path = %backup.display(), "backup exists already");
        return Ok(false);
    }

    tracing::debug!(path = %backup.display(), "writing backup");
    std::fs::write(&backup, original.unwrap_or_default()).map_err(BackupError::new("write", &backup))?;
    Ok(true)
}

/// Restores all backups in `dir` and removes them
///
/// Returns the restored (or deleted) files.
pub fn reset(dir: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let entries = std::fs::read_dir(dir).map_err(BackupError::new("read", dir))?;

    let mut backups = vec![];
    for entry in entries {
        let path = entry.map_err(BackupError::new("read", dir))?.path();
        if path.is_file() && path.extension().is_some_and(|extension| extension == BACKUP_EXTENSION) {
            backups.push(path);
        }
    }
    backups.sort();

    let mut restored = vec![];
    for backup in backups {
        let target = backup.with_extension("");
        let content = std::fs::read_to_string(&backup).map_err(BackupError::new("read", &backup))?;

        if content.is_empty() {
            tracing::info!(path = %target.display(), "removing created file");
            if target.exists() {
                std::fs::remove_file(&target).map_err(BackupError::new("remove", &target))?;
            }
        } else {
            tracing::info!(path = %target.display(), "restoring file");
            std::fs::write(&target, content).map_err(BackupError::new("write", &target))?;
        }

        std::fs::remove_file(&backup).map_err(BackupError::new("remove", &backup))?;
        restored.push(target);
    }

    Ok(restored)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backup_path_appends_extension() {
        assert_eq!(
            backup_path(Path::new("dir/main.tf")),
            PathBuf::from("dir/main.tf.mptfbackup")
        );
    }

    #[test]
    fn backups_are_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf");

        assert!(write_backup(&path, Some("first")).unwrap());
        assert!(!write_backup(&path, Some("second")).unwrap());

        let backup = std::fs::read_to_string(backup_path(&path)).unwrap();
        assert_eq!(backup, "first");
    }

    #[test]
    fn reset_restores_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("main.tf");
        let created = dir.path().join("new.tf");

        std::fs::write(&existing, "changed").unwrap();
        std::fs::write(&created, "created").unwrap();
        write_backup(&existing, Some("original")).unwrap();
        write_backup(&created, None).unwrap();

        let restored = reset(dir.path()).unwrap();

        assert_eq!(restored, vec![existing.clone(), created.clone()]);
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "original");
        assert!(!created.exists());
        assert!(!backup_path(&existing).exists());
        assert!(!backup_path(&created).exists());
    }
}
