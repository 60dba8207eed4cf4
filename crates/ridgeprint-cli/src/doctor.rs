use std::fs;
use std::path::{Path, PathBuf};

use ridgeprint_config::{self, ConfigError, ResolvedConfig};
use ridgeprint_core::fingerprint::FilesystemTemplateStore;
use serde::Serialize;

use crate::config::{settings_from, CliSettings};
use crate::errors::AppResult;

const CHECK_CONFIG: &str = "config";
const CHECK_STORE_DIR: &str = "template_store_dir";
const CHECK_TEMPLATES: &str = "templates";
const CHECK_BACKUP: &str = "backup_path";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: String, path: Option<&Path>) -> Self {
        Self {
            name: name.into(),
            status,
            message,
            path: path.map(|p| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorOutcome {
    pub ok: bool,
    pub checks: Vec<DoctorCheck>,
}

#[derive(Debug, Clone)]
pub struct DoctorContext {
    pub config_paths: Vec<PathBuf>,
    pub store_override: Option<PathBuf>,
}

impl DoctorContext {
    pub fn new(store_override: Option<PathBuf>) -> Self {
        Self {
            config_paths: ridgeprint_config::default_paths().to_vec(),
            store_override,
        }
    }
}

pub fn run_doctor(store_override: Option<PathBuf>) -> AppResult<DoctorOutcome> {
    run_doctor_with(&DoctorContext::new(store_override))
}

/// Warnings do not fail the run; only `Fail` checks do.
pub fn run_doctor_with(ctx: &DoctorContext) -> AppResult<DoctorOutcome> {
    let (config_check, resolved) = check_config(&ctx.config_paths);
    let settings = settings_from(ctx.store_override.clone(), &resolved);

    let checks = vec![
        config_check,
        check_store_dir(&settings.store_dir),
        check_templates(&settings.store_dir),
        check_backup_path(&settings),
    ];
    let ok = checks.iter().all(|c| c.status != CheckStatus::Fail);
    Ok(DoctorOutcome { ok, checks })
}

fn check_config(paths: &[PathBuf]) -> (DoctorCheck, ResolvedConfig) {
    let existing = paths.iter().filter(|p| p.exists()).count();
    match ridgeprint_config::load_from_paths(paths) {
        Ok(Some(entry)) => {
            let check = if existing > 1 {
                DoctorCheck::new(
                    CHECK_CONFIG,
                    CheckStatus::Warn,
                    format!(
                        "Several config files exist; using {}",
                        entry.source.display()
                    ),
                    Some(entry.source()),
                )
            } else {
                DoctorCheck::new(
                    CHECK_CONFIG,
                    CheckStatus::Pass,
                    format!("Loaded config from {}", entry.source.display()),
                    Some(entry.source()),
                )
            };
            (check, ResolvedConfig::from_raw(entry.contents))
        }
        Ok(None) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Warn,
                format!(
                    "No config file found (tried {}); using built-in defaults",
                    display_paths(paths)
                ),
                None,
            ),
            ResolvedConfig::default(),
        ),
        Err(ConfigError::Parse { path, message }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Failed to parse {}: {}", path.display(), message),
                Some(&path),
            ),
            ResolvedConfig::default(),
        ),
        Err(ConfigError::Read { path, source }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Failed to read {}: {}", path.display(), source),
                Some(&path),
            ),
            ResolvedConfig::default(),
        ),
    }
}

fn check_store_dir(path: &Path) -> DoctorCheck {
    match (path.exists(), path.is_dir()) {
        (false, _) => DoctorCheck::new(
            CHECK_STORE_DIR,
            CheckStatus::Warn,
            format!(
                "Template store {} missing; it is created on first enrollment",
                path.display()
            ),
            Some(path),
        ),
        (true, false) => DoctorCheck::new(
            CHECK_STORE_DIR,
            CheckStatus::Fail,
            format!("Template store {} is not a directory", path.display()),
            Some(path),
        ),
        (true, true) => {
            let readable = fs::read_dir(path).is_ok();
            let writeable = is_writeable_dir(path);
            let missing = match (readable, writeable) {
                (true, true) => None,
                (false, false) => Some("read/write"),
                (false, true) => Some("read"),
                (true, false) => Some("write"),
            };
            match missing {
                None => DoctorCheck::new(
                    CHECK_STORE_DIR,
                    CheckStatus::Pass,
                    format!("Template store {} is readable/writable", path.display()),
                    Some(path),
                ),
                Some(kind) => DoctorCheck::new(
                    CHECK_STORE_DIR,
                    CheckStatus::Fail,
                    format!("Template store {} lacks {kind} permissions", path.display()),
                    Some(path),
                ),
            }
        }
    }
}

fn check_templates(path: &Path) -> DoctorCheck {
    match FilesystemTemplateStore::new(path).load_all() {
        Ok(templates) => DoctorCheck::new(
            CHECK_TEMPLATES,
            CheckStatus::Pass,
            format!("{} template(s) readable", templates.len()),
            Some(path),
        ),
        Err(err) => DoctorCheck::new(
            CHECK_TEMPLATES,
            CheckStatus::Fail,
            err.human_message(),
            Some(path),
        ),
    }
}

fn check_backup_path(settings: &CliSettings) -> DoctorCheck {
    let path = settings.backup_path.as_path();
    if !settings.backup_enabled {
        return DoctorCheck::new(
            CHECK_BACKUP,
            CheckStatus::Warn,
            "Automatic backups are disabled".into(),
            Some(path),
        );
    }
    if path.is_dir() {
        return DoctorCheck::new(
            CHECK_BACKUP,
            CheckStatus::Fail,
            format!("Backup path {} is a directory", path.display()),
            Some(path),
        );
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        DoctorCheck::new(
            CHECK_BACKUP,
            CheckStatus::Warn,
            format!(
                "Backup directory {} missing; it is created on first backup",
                parent.display()
            ),
            Some(path),
        )
    } else if is_writeable_dir(parent) {
        DoctorCheck::new(
            CHECK_BACKUP,
            CheckStatus::Pass,
            format!("Backups are written to {}", path.display()),
            Some(path),
        )
    } else {
        DoctorCheck::new(
            CHECK_BACKUP,
            CheckStatus::Fail,
            format!("Backup directory {} is not writable", parent.display()),
            Some(path),
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// Same operation the store's atomic writes start with.
fn is_writeable_dir(path: &Path) -> bool {
    tempfile::Builder::new()
        .prefix(".ridgeprint-doctor")
        .tempfile_in(path)
        .is_ok()
}
