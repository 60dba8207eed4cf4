use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::config::CliSettings;
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

/// Resolves the effective settings from an optional `--store-dir` flag.
pub type SettingsLoader = Box<dyn Fn(Option<PathBuf>) -> AppResult<CliSettings> + Send + Sync>;

mod backup;
mod doctor;
mod enroll;
mod quality;
mod users;
mod verify;

pub use backup::BackupHandler;
pub use doctor::DoctorHandler;
pub use enroll::EnrollHandler;
pub use quality::QualityHandler;
pub use users::{UsersHandler, UsersHandlerDeps};
pub use verify::VerifyHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Enroll(args) => Box::new(EnrollHandler::new(args)),
            Commands::Verify(args) => Box::new(VerifyHandler::new(args)),
            Commands::Users(cmd) => Box::new(UsersHandler::new(cmd)),
            Commands::Quality(args) => Box::new(QualityHandler::new(args)),
            Commands::Backup(args) => Box::new(BackupHandler::new(args)),
            Commands::Doctor(args) => Box::new(DoctorHandler::new(args)),
        }
    }
}
