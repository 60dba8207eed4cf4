use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::{BackupArgs, OutputMode};
use crate::commands::{CommandHandler, SettingsLoader};
use crate::config::{self, CliSettings};
use crate::errors::AppResult;
use crate::fingerprint::{self, BackupOutcome};
use crate::output::render_backup;

type RunBackup =
    Box<dyn Fn(&CliSettings, Option<PathBuf>) -> AppResult<BackupOutcome> + Send + Sync>;

pub struct BackupHandler {
    args: BackupArgs,
    load_settings: SettingsLoader,
    run: RunBackup,
    render: Box<dyn Fn(&BackupOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl BackupHandler {
    pub fn new(args: BackupArgs) -> Self {
        Self::with_dependencies(
            args,
            config::load_settings,
            fingerprint::run_backup,
            render_backup,
        )
    }

    pub fn with_dependencies(
        args: BackupArgs,
        load_settings: impl Fn(Option<PathBuf>) -> AppResult<CliSettings> + Send + Sync + 'static,
        run: impl Fn(&CliSettings, Option<PathBuf>) -> AppResult<BackupOutcome>
            + Send
            + Sync
            + 'static,
        render: impl Fn(&BackupOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            load_settings: Box::new(load_settings),
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for BackupHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let settings = (self.load_settings)(self.args.store.store_dir.clone())?;
        let outcome = (self.run)(&settings, self.args.output.clone())?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
