use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ridgeprint",
    about = "Enroll and verify fingerprints against a local template store",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable logs
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a fingerprint image under a new user id
    Enroll(EnrollArgs),
    /// Check a fingerprint image against an enrolled user
    Verify(VerifyArgs),
    /// Inspect and maintain enrolled users
    #[command(subcommand)]
    Users(UsersCommands),
    /// Run only the image quality gate and report its metrics
    Quality(QualityArgs),
    /// Write a JSON snapshot of every enrolled template
    Backup(BackupArgs),
    /// Check configuration, template store and backup location
    Doctor(DoctorArgs),
}

#[derive(Debug, Subcommand)]
pub enum UsersCommands {
    /// List enrolled user ids and names
    List(ListUsersArgs),
    /// Show the stored profile of one user
    Show(UserArgs),
    /// Change the name and phone number of an enrolled user
    Update(UpdateUserArgs),
    /// Remove a user's template
    Delete(UserArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Template store directory (overrides $RIDGEPRINT_STORE_DIR and the config file)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct EnrollArgs {
    /// Fingerprint image (PNG, JPEG, BMP or TIFF)
    pub image: PathBuf,

    /// Unique identifier for the new template
    #[arg(long)]
    pub user_id: String,

    /// Display name stored with the template
    #[arg(long)]
    pub username: String,

    /// Phone number stored with the template
    #[arg(long)]
    pub phone: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Probe fingerprint image
    pub image: PathBuf,

    /// User id whose template the probe is compared against
    #[arg(long)]
    pub user_id: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ListUsersArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct UserArgs {
    pub user_id: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateUserArgs {
    pub user_id: String,

    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub phone: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct QualityArgs {
    /// Fingerprint image to assess
    pub image: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct BackupArgs {
    /// Snapshot destination (defaults to the configured backup path)
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
