//! Off-path backup: the store announces writes on a channel and a dedicated
//! worker thread rewrites a full JSON snapshot of the template directory.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};

use super::store::{write_json_atomic, FilesystemTemplateStore, WriteMode};
use super::template::FingerprintTemplate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TemplateWritten { user_id: String },
    IdentityUpdated { user_id: String },
    TemplateDeleted { user_id: String },
}

impl StoreEvent {
    pub fn user_id(&self) -> &str {
        match self {
            StoreEvent::TemplateWritten { user_id }
            | StoreEvent::IdentityUpdated { user_id }
            | StoreEvent::TemplateDeleted { user_id } => user_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    generated_at: String,
    templates: &'a [FingerprintTemplate],
}

/// Writes every template under `source_dir` to `backup_path` atomically and
/// returns how many were written.
pub fn write_backup_snapshot(source_dir: &Path, backup_path: &Path) -> AppResult<usize> {
    let templates = FilesystemTemplateStore::new(source_dir).load_all()?;
    let snapshot = Snapshot {
        generated_at: super::template::timestamp(),
        templates: &templates,
    };
    write_json_atomic(backup_path, &snapshot, WriteMode::Replace).map_err(|err| {
        AppError::Backup {
            path: backup_path.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    Ok(templates.len())
}

/// Background thread refreshing the snapshot whenever the store reports a
/// write. Stops once every sender is dropped.
#[derive(Debug)]
pub struct BackupWorker {
    handle: JoinHandle<usize>,
    backup_path: PathBuf,
}

impl BackupWorker {
    pub fn spawn(
        source_dir: PathBuf,
        backup_path: PathBuf,
        events: Receiver<StoreEvent>,
    ) -> AppResult<Self> {
        let target = backup_path.clone();
        let handle = thread::Builder::new()
            .name("ridgeprint-backup".into())
            .spawn(move || run(&source_dir, &target, events))?;
        Ok(Self {
            handle,
            backup_path,
        })
    }

    /// Waits for the worker to drain its queue. Returns the number of
    /// snapshots written.
    pub fn join(self) -> AppResult<usize> {
        self.handle.join().map_err(|_| AppError::Backup {
            path: self.backup_path,
            message: "backup worker panicked".into(),
        })
    }
}

fn run(source_dir: &Path, backup_path: &Path, events: Receiver<StoreEvent>) -> usize {
    let mut snapshots = 0;
    while let Ok(event) = events.recv() {
        let pending = 1 + events.try_iter().count();
        debug!(user_id = event.user_id(), pending, "refreshing backup snapshot");
        match write_backup_snapshot(source_dir, backup_path) {
            Ok(count) => {
                snapshots += 1;
                debug!(templates = count, path = %backup_path.display(), "backup snapshot written");
            }
            Err(err) => warn!(error = %err, "backup snapshot failed"),
        }
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::minutiae::MinutiaPoint;
    use crate::fingerprint::store::TemplateStore;
    use crossbeam::channel::unbounded;
    use tempfile::TempDir;

    fn template(user_id: &str) -> FingerprintTemplate {
        FingerprintTemplate::new(
            user_id,
            "User",
            "555",
            vec![[9u8; 32]],
            vec![MinutiaPoint::new(3, 4)],
        )
    }

    #[test]
    fn snapshot_contains_every_template() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path().join("templates"));
        store.insert(&template("a1")).unwrap();
        store.insert(&template("b2")).unwrap();
        let backup = tmp.path().join("backup.json");

        assert_eq!(write_backup_snapshot(store.root(), &backup).unwrap(), 2);
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&backup).unwrap()).unwrap();
        let ids: Vec<_> = value["templates"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["user_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn worker_writes_snapshot_after_store_events() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("templates");
        let backup = tmp.path().join("backup.json");
        let (sender, receiver) = unbounded();
        let worker = BackupWorker::spawn(root.clone(), backup.clone(), receiver).unwrap();

        let store = FilesystemTemplateStore::new(&root).with_events(sender);
        store.insert(&template("a1")).unwrap();
        drop(store);

        let written = worker.join().unwrap();
        assert!(written >= 1);
        assert!(backup.exists());
    }

    #[test]
    fn worker_failures_do_not_escape() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let (sender, receiver) = unbounded();
        let worker = BackupWorker::spawn(
            tmp.path().to_path_buf(),
            blocker.join("backup.json"),
            receiver,
        )
        .unwrap();
        sender
            .send(StoreEvent::TemplateWritten {
                user_id: "a1".into(),
            })
            .unwrap();
        drop(sender);
        assert_eq!(worker.join().unwrap(), 0);
    }
}
