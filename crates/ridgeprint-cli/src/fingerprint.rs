use std::path::{Path, PathBuf};

use crossbeam::channel::unbounded;
use ridgeprint_core::fingerprint::{
    assess_quality, load_probe, run_enrollment, run_verification, show_user as lookup_profile,
    write_backup_snapshot, BackupWorker, EnrollmentReport, EnrollmentRequest,
    FilesystemTemplateStore, QualityReport, TemplateStore, UserProfile, UserSummary,
    VerificationReport, VerificationRequest,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CliSettings;
use crate::errors::AppResult;

#[derive(Debug, Clone, Serialize)]
pub struct QualityOutcome {
    pub image_path: String,
    pub width: u32,
    pub height: u32,
    pub report: QualityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDeletion {
    pub user_id: String,
    pub store_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub backup_path: String,
    pub templates: usize,
}

pub fn run_enroll(request: &EnrollmentRequest, settings: &CliSettings) -> AppResult<EnrollmentReport> {
    with_writable_store(settings, |store| {
        run_enrollment(request, &settings.pipeline, store)
    })
}

pub fn run_verify(
    request: &VerificationRequest,
    settings: &CliSettings,
) -> AppResult<VerificationReport> {
    let store = FilesystemTemplateStore::new(&settings.store_dir);
    run_verification(request, &settings.pipeline, &store)
}

pub fn run_quality(image: &Path) -> AppResult<QualityOutcome> {
    let probe = load_probe(image)?;
    Ok(QualityOutcome {
        image_path: image.display().to_string(),
        width: probe.width(),
        height: probe.height(),
        report: assess_quality(&probe),
    })
}

pub fn list_users(settings: &CliSettings) -> AppResult<Vec<UserSummary>> {
    FilesystemTemplateStore::new(&settings.store_dir).list()
}

pub fn show_user(settings: &CliSettings, user_id: &str) -> AppResult<UserProfile> {
    lookup_profile(&FilesystemTemplateStore::new(&settings.store_dir), user_id)
}

pub fn update_user(
    settings: &CliSettings,
    user_id: &str,
    username: &str,
    phone: &str,
) -> AppResult<UserProfile> {
    with_writable_store(settings, |store| {
        store.update_identity(user_id, username, phone)?;
        lookup_profile(store, user_id)
    })
}

pub fn delete_user(settings: &CliSettings, user_id: &str) -> AppResult<UserDeletion> {
    with_writable_store(settings, |store| store.delete(user_id))?;
    Ok(UserDeletion {
        user_id: user_id.to_string(),
        store_dir: settings.store_dir.display().to_string(),
    })
}

/// Snapshot written on demand; works whether or not automatic backups are on.
pub fn run_backup(settings: &CliSettings, output: Option<PathBuf>) -> AppResult<BackupOutcome> {
    let backup_path = output.unwrap_or_else(|| settings.backup_path.clone());
    let templates = write_backup_snapshot(&settings.store_dir, &backup_path)?;
    Ok(BackupOutcome {
        backup_path: backup_path.display().to_string(),
        templates,
    })
}

/// Runs `op` against the store with a backup worker attached when backups
/// are enabled. The worker is drained before returning so the snapshot is on
/// disk when the command exits; its failures are logged, never returned.
fn with_writable_store<T>(
    settings: &CliSettings,
    op: impl FnOnce(&FilesystemTemplateStore) -> AppResult<T>,
) -> AppResult<T> {
    let store = FilesystemTemplateStore::new(&settings.store_dir);
    if !settings.backup_enabled {
        return op(&store);
    }

    let (sender, receiver) = unbounded();
    let worker = BackupWorker::spawn(
        settings.store_dir.clone(),
        settings.backup_path.clone(),
        receiver,
    )?;
    let store = store.with_events(sender);
    let result = op(&store);
    drop(store);

    match worker.join() {
        Ok(snapshots) => debug!(snapshots, "backup worker finished"),
        Err(err) => warn!(error = %err, "backup worker failed"),
    }
    result
}
