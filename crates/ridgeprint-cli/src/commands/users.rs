use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use ridgeprint_core::fingerprint::{UserProfile, UserSummary};

use crate::cli::{OutputMode, UsersCommands};
use crate::commands::{CommandHandler, SettingsLoader};
use crate::config::{self, CliSettings};
use crate::errors::AppResult;
use crate::fingerprint::{self, UserDeletion};
use crate::output::{render_deletion, render_profile, render_user_list};

pub struct UsersHandler {
    command: UsersCommands,
    deps: UsersHandlerDeps,
}

pub struct UsersHandlerDeps {
    pub load_settings: SettingsLoader,
    pub list: Box<dyn Fn(&CliSettings) -> AppResult<Vec<UserSummary>> + Send + Sync>,
    pub show: Box<dyn Fn(&CliSettings, &str) -> AppResult<UserProfile> + Send + Sync>,
    pub update:
        Box<dyn Fn(&CliSettings, &str, &str, &str) -> AppResult<UserProfile> + Send + Sync>,
    pub delete: Box<dyn Fn(&CliSettings, &str) -> AppResult<UserDeletion> + Send + Sync>,
    pub render_list: Box<dyn Fn(&[UserSummary], OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_profile: Box<dyn Fn(&UserProfile, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_deletion: Box<dyn Fn(&UserDeletion, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl UsersHandlerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        load_settings: impl Fn(Option<PathBuf>) -> AppResult<CliSettings> + Send + Sync + 'static,
        list: impl Fn(&CliSettings) -> AppResult<Vec<UserSummary>> + Send + Sync + 'static,
        show: impl Fn(&CliSettings, &str) -> AppResult<UserProfile> + Send + Sync + 'static,
        update: impl Fn(&CliSettings, &str, &str, &str) -> AppResult<UserProfile>
            + Send
            + Sync
            + 'static,
        delete: impl Fn(&CliSettings, &str) -> AppResult<UserDeletion> + Send + Sync + 'static,
        render_list: impl Fn(&[UserSummary], OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_profile: impl Fn(&UserProfile, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_deletion: impl Fn(&UserDeletion, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            load_settings: Box::new(load_settings),
            list: Box::new(list),
            show: Box::new(show),
            update: Box::new(update),
            delete: Box::new(delete),
            render_list: Box::new(render_list),
            render_profile: Box::new(render_profile),
            render_deletion: Box::new(render_deletion),
        }
    }
}

impl Default for UsersHandlerDeps {
    fn default() -> Self {
        Self::new(
            config::load_settings,
            fingerprint::list_users,
            fingerprint::show_user,
            fingerprint::update_user,
            fingerprint::delete_user,
            render_user_list,
            render_profile,
            render_deletion,
        )
    }
}

impl UsersHandler {
    pub fn new(command: UsersCommands) -> Self {
        Self {
            command,
            deps: UsersHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(command: UsersCommands, deps: UsersHandlerDeps) -> Self {
        Self { command, deps }
    }

    fn store_dir(&self) -> Option<PathBuf> {
        match &self.command {
            UsersCommands::List(args) => args.store.store_dir.clone(),
            UsersCommands::Show(args) | UsersCommands::Delete(args) => args.store.store_dir.clone(),
            UsersCommands::Update(args) => args.store.store_dir.clone(),
        }
    }
}

impl CommandHandler for UsersHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let settings = (self.deps.load_settings)(self.store_dir())?;
        match &self.command {
            UsersCommands::List(_) => {
                let users = (self.deps.list)(&settings)?;
                (self.deps.render_list)(users.as_slice(), mode)?;
            }
            UsersCommands::Show(args) => {
                let profile = (self.deps.show)(&settings, &args.user_id)?;
                (self.deps.render_profile)(&profile, mode)?;
            }
            UsersCommands::Update(args) => {
                let profile =
                    (self.deps.update)(&settings, &args.user_id, &args.username, &args.phone)?;
                (self.deps.render_profile)(&profile, mode)?;
            }
            UsersCommands::Delete(args) => {
                let deletion = (self.deps.delete)(&settings, &args.user_id)?;
                (self.deps.render_deletion)(&deletion, mode)?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
