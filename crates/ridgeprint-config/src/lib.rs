use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/ridgeprint/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/ridgeprint/config.toml";
pub const DEFAULT_STORE_DIR: &str = "/var/lib/ridgeprint/templates";
pub const DEFAULT_BACKUP_FILE_NAME: &str = "backup.json";
pub const DEFAULT_MAX_FEATURES: usize = 600;
pub const DEFAULT_FAST_THRESHOLD: u8 = 20;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub template_store_dir: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub backup_enabled: Option<bool>,
    pub use_gabor: Option<bool>,
    pub use_roi: Option<bool>,
    pub use_minutiae_filtering: Option<bool>,
    pub max_features: Option<usize>,
    pub fast_threshold: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub template_store_dir: PathBuf,
    /// `None` means "next to the store directory", resolved once the final
    /// store directory is known.
    pub backup_path: Option<PathBuf>,
    pub backup_enabled: bool,
    pub use_gabor: bool,
    pub use_roi: bool,
    pub use_minutiae_filtering: bool,
    pub max_features: usize,
    pub fast_threshold: u8,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            template_store_dir: raw
                .template_store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            backup_path: raw.backup_path,
            backup_enabled: raw.backup_enabled.unwrap_or(true),
            use_gabor: raw.use_gabor.unwrap_or(true),
            use_roi: raw.use_roi.unwrap_or(false),
            use_minutiae_filtering: raw.use_minutiae_filtering.unwrap_or(true),
            max_features: raw.max_features.unwrap_or(DEFAULT_MAX_FEATURES).max(1),
            fast_threshold: raw.fast_threshold.unwrap_or(DEFAULT_FAST_THRESHOLD),
        }
    }

    /// Backup location for a given store directory.
    pub fn backup_path_for(&self, store_dir: &Path) -> PathBuf {
        match &self.backup_path {
            Some(path) => path.clone(),
            None => default_backup_path(store_dir),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

/// `<parent of store_dir>/backup.json`, so the snapshot never shows up as a
/// template inside the store itself.
pub fn default_backup_path(store_dir: &Path) -> PathBuf {
    match store_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(DEFAULT_BACKUP_FILE_NAME),
        _ => PathBuf::from(DEFAULT_BACKUP_FILE_NAME),
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub fn default_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

/// Returns the first file in `paths` that exists. Missing files are skipped;
/// any other read failure stops the search.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig {
                    contents: parsed,
                    source: path.clone(),
                }));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    Ok(match load_from_paths(paths)? {
        Some(LoadedConfig { contents, source }) => ResolvedConfigWithSource {
            resolved: ResolvedConfig::from_raw(contents),
            source: Some(source),
        },
        None => ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn primary_path_wins() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("primary.toml");
        let secondary = dir.path().join("secondary.toml");
        fs::write(&secondary, "max_features = 100").unwrap();
        fs::write(&primary, "max_features = 250").unwrap();

        let loaded = load_from_paths(&[primary.clone(), secondary])
            .unwrap()
            .expect("config expected");
        assert_eq!(loaded.source(), primary.as_path());
        assert_eq!(loaded.contents.max_features, Some(250));
    }

    #[test]
    fn secondary_used_when_primary_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let secondary = dir.path().join("secondary.toml");
        fs::write(&secondary, "use_roi = true").unwrap();

        let loaded = load_from_paths(&[missing, secondary.clone()])
            .unwrap()
            .expect("config expected");
        assert_eq!(loaded.source, secondary);
        assert_eq!(loaded.contents.use_roi, Some(true));
    }

    #[test]
    fn parse_errors_are_reported() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "template_store_dir = { invalid = true }").unwrap();

        match load_from_paths(&[broken.clone()]).unwrap_err() {
            ConfigError::Parse { path, .. } => assert_eq!(path, broken),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("typo.toml");
        fs::write(&path, "use_gabbor = false").unwrap();

        assert!(matches!(
            load_from_paths(&[path]).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn io_errors_are_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dir.toml");
        fs::create_dir_all(&path).unwrap();

        match load_from_paths(&[path.clone()]).unwrap_err() {
            ConfigError::Read { path: err_path, .. } => assert_eq!(err_path, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn resolved_defaults_apply_when_missing() {
        let resolved = load_resolved_from_paths(&[]).unwrap();
        assert!(resolved.source.is_none());
        let config = resolved.resolved;
        assert_eq!(config.template_store_dir, PathBuf::from(DEFAULT_STORE_DIR));
        assert!(config.backup_enabled);
        assert!(config.use_gabor);
        assert!(!config.use_roi);
        assert!(config.use_minutiae_filtering);
        assert_eq!(config.max_features, DEFAULT_MAX_FEATURES);
        assert_eq!(config.fast_threshold, DEFAULT_FAST_THRESHOLD);
        assert_eq!(
            config.backup_path_for(&config.template_store_dir),
            PathBuf::from("/var/lib/ridgeprint/backup.json")
        );
    }

    #[test]
    fn resolved_config_reports_source_and_overrides() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("primary.toml");
        fs::write(
            &primary,
            "template_store_dir = \"/srv/prints\"\nbackup_path = \"/srv/snap.json\"\nuse_gabor = false\nfast_threshold = 35\n",
        )
        .unwrap();

        let resolved = load_resolved_from_paths(&[primary.clone()]).unwrap();
        assert_eq!(resolved.source, Some(primary));
        let config = resolved.resolved;
        assert_eq!(config.template_store_dir, PathBuf::from("/srv/prints"));
        assert!(!config.use_gabor);
        assert_eq!(config.fast_threshold, 35);
        assert_eq!(
            config.backup_path_for(Path::new("/elsewhere")),
            PathBuf::from("/srv/snap.json")
        );
    }

    #[test]
    fn relative_store_dir_gets_local_backup() {
        assert_eq!(
            default_backup_path(Path::new("templates")),
            PathBuf::from("backup.json")
        );
        assert_eq!(
            default_backup_path(Path::new("data/templates")),
            PathBuf::from("data/backup.json")
        );
    }
}
