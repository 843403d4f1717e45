//! Clinic backups with rotation and restore.
//!
//! A backup is a directory `clinic_<YYYYmmdd_HHMMSS>[_n]/` holding a
//! consistent copy of the database (`clinic.db`) and of the stored document
//! files (`documents/`).

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::Session;
use crate::db::{Database, DbResult};
use crate::managers::{audit, ManagerError, ManagerResult};
use crate::models::EntityKind;

const BACKUP_PREFIX: &str = "clinic_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DATABASE_FILE: &str = "clinic.db";
const DOCUMENTS_DIR: &str = "documents";
const PARTIAL_EXTENSION: &str = "partial";

/// A backup found in the backup directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupInfo {
    /// Backup directory
    pub path: PathBuf,
    /// Directory name, used to pick a backup for restore
    pub name: String,
    /// Total bytes of the database copy and document files
    pub size: u64,
    /// Local time encoded in the name
    pub created_at: NaiveDateTime,
}

impl BackupInfo {
    pub fn database_file(&self) -> PathBuf {
        self.path.join(DATABASE_FILE)
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.path.join(DOCUMENTS_DIR)
    }
}

/// Writes, lists, prunes and restores backups of one clinic.
pub struct BackupManager {
    documents: PathBuf,
    dir: PathBuf,
    keep: usize,
}

impl BackupManager {
    pub fn new(documents_dir: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            documents: documents_dir.into(),
            dir: backups_dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Back up the database and documents, then prune to the newest `keep`.
    pub fn create_backup(&self, db: &Database) -> DbResult<BackupInfo> {
        self.create_backup_at(db, Local::now())
    }

    pub(crate) fn create_backup_at(&self, db: &Database, now: DateTime<Local>) -> DbResult<BackupInfo> {
        let backup = self.snapshot(db, now)?;
        self.prune()?;
        Ok(backup)
    }

    fn snapshot(&self, db: &Database, now: DateTime<Local>) -> DbResult<BackupInfo> {
        fs::create_dir_all(&self.dir)?;
        let stamp = now.format(STAMP_FORMAT).to_string();
        let path = self.free_path(&stamp);
        fs::create_dir(&path)?;

        let written = db.backup_to(path.join(DATABASE_FILE)).and_then(|()| {
            fs::create_dir_all(path.join(DOCUMENTS_DIR))?;
            if self.documents.is_dir() {
                self.copy_tree(&self.documents, &path.join(DOCUMENTS_DIR))?;
            }
            Ok(())
        });
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&path);
            return Err(e);
        }

        let size = tree_size(&path)?;
        let name = name_of(&path);
        info!(backup = %name, size, "Backup created");
        Ok(BackupInfo {
            path,
            name,
            size,
            created_at: now.naive_local(),
        })
    }

    /// Backups in the directory, newest first.
    pub fn list_backups(&self) -> DbResult<Vec<BackupInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.join(DATABASE_FILE).is_file() {
                continue;
            }
            let Some(created_at) = parse_backup_name(&path) else {
                continue;
            };
            backups.push(BackupInfo {
                name: name_of(&path),
                size: tree_size(&path)?,
                path,
                created_at,
            });
        }

        // Same-second backups carry a numeric suffix that sorts after the bare name
        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.len().cmp(&a.name.len()))
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(backups)
    }

    pub fn find_backup(&self, name: &str) -> DbResult<Option<BackupInfo>> {
        Ok(self.list_backups()?.into_iter().find(|b| b.name == name))
    }

    /// Replace the database and stored documents with the backup `name`.
    /// Admin only.
    ///
    /// The current state is saved as a new backup first and returned, so a
    /// restore can itself be undone. The restore is audited in the restored
    /// database.
    pub fn restore_backup(&self, db: &mut Database, session: &Session, name: &str) -> ManagerResult<BackupInfo> {
        session.require_admin("restoring backups")?;
        let backup = self
            .find_backup(name)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Backup, name))?;

        let safety = self.snapshot(db, Local::now())?;
        info!(safety = %safety.name, "Safety backup taken before restore");

        db.restore_from(backup.database_file())?;
        if let Err(e) = self.replace_documents(&backup.documents_dir()) {
            error!(backup = %backup.name, error = %e, "Restoring documents failed; rolling back");
            db.restore_from(safety.database_file())?;
            self.replace_documents(&safety.documents_dir())?;
            return Err(e.into());
        }

        db.atomically(|db| {
            audit(
                db,
                session,
                "backup.restore",
                EntityKind::Backup,
                &backup.name,
                Some(json!({ "safety_backup": safety.name })),
            )
        })?;
        info!(backup = %backup.name, actor = session.actor(), "Backup restored");

        self.prune()?;
        Ok(safety)
    }

    fn replace_documents(&self, source: &Path) -> io::Result<()> {
        fs::create_dir_all(&self.documents)?;
        for entry in fs::read_dir(&self.documents)? {
            let entry = entry?;
            let path = entry.path();
            if self.skipped(&path) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        if source.is_dir() {
            self.copy_tree(source, &self.documents)?;
        }
        Ok(())
    }

    /// Copy a directory tree, leaving out hidden entries, in-flight uploads
    /// and the backup directory itself.
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let path = entry.path();
            if self.skipped(&path) {
                continue;
            }
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                self.copy_tree(&path, &target)?;
            } else {
                fs::copy(&path, &target)?;
            }
        }
        Ok(())
    }

    fn skipped(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(OsStr::to_str)
            .map_or(false, |n| n.starts_with('.'));
        hidden || path == self.dir || path.extension() == Some(OsStr::new(PARTIAL_EXTENSION))
    }

    fn prune(&self) -> DbResult<usize> {
        let mut removed = 0;
        for stale in self.list_backups()?.into_iter().skip(self.keep) {
            match fs::remove_dir_all(&stale.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %stale.path.display(), error = %e, "Failed to remove old backup"),
            }
        }
        if removed > 0 {
            info!(removed, keep = self.keep, "Old backups pruned");
        }
        Ok(removed)
    }

    fn free_path(&self, stamp: &str) -> PathBuf {
        let base = self.dir.join(format!("{BACKUP_PREFIX}{stamp}"));
        if !base.exists() {
            return base;
        }
        (1..)
            .map(|n| self.dir.join(format!("{BACKUP_PREFIX}{stamp}_{n}")))
            .find(|p| !p.exists())
            .unwrap_or(base)
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn tree_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            tree_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}

/// Timestamp of a `clinic_<stamp>[_n]` name, `None` for anything else.
fn parse_backup_name(path: &Path) -> Option<NaiveDateTime> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(BACKUP_PREFIX)?;
    let stamp = rest.get(..15)?;
    let suffix = &rest[15..];
    if !suffix.is_empty() {
        let n = suffix.strip_prefix('_')?;
        if n.is_empty() || !n.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}
