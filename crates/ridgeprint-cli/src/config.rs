use std::path::PathBuf;

use ridgeprint_config::{self, ConfigError, ResolvedConfig};
use ridgeprint_core::fingerprint::{
    EnvStoreDirResolver, OrbConfig, PipelineSettings, StoreDirResolver,
};

use crate::errors::{AppError, AppResult};

/// Everything a command needs once flags, environment and the config file
/// have been merged.
#[derive(Debug, Clone)]
pub struct CliSettings {
    pub store_dir: PathBuf,
    pub backup_path: PathBuf,
    pub backup_enabled: bool,
    pub pipeline: PipelineSettings,
}

pub fn load_settings(store_dir: Option<PathBuf>) -> AppResult<CliSettings> {
    load_settings_with_sources(store_dir, &ridgeprint_config::default_paths())
}

pub fn load_settings_with_sources(
    store_dir: Option<PathBuf>,
    sources: &[PathBuf],
) -> AppResult<CliSettings> {
    let loaded = ridgeprint_config::load_resolved_from_paths(sources).map_err(config_error)?;
    if let Some(source) = &loaded.source {
        tracing::debug!(path = %source.display(), "loaded configuration");
    }
    Ok(settings_from(store_dir, &loaded.resolved))
}

/// `--store-dir` wins, then `$RIDGEPRINT_STORE_DIR`, then the config file.
pub fn settings_from(store_dir: Option<PathBuf>, config: &ResolvedConfig) -> CliSettings {
    let resolver = EnvStoreDirResolver::with_fallback(config.template_store_dir.clone());
    let store_dir = resolver.resolve(store_dir.as_deref());
    CliSettings {
        backup_path: config.backup_path_for(&store_dir),
        backup_enabled: config.backup_enabled,
        pipeline: pipeline_settings(config),
        store_dir,
    }
}

pub fn pipeline_settings(config: &ResolvedConfig) -> PipelineSettings {
    PipelineSettings {
        use_gabor: config.use_gabor,
        use_roi: config.use_roi,
        use_minutiae_filtering: config.use_minutiae_filtering,
        orb: OrbConfig::new(config.max_features, config.fast_threshold),
    }
}

pub(crate) fn config_error(err: ConfigError) -> AppError {
    match err {
        ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
        ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
    }
}
