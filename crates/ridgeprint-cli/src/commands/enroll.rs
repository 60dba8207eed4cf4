use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use ridgeprint_core::fingerprint::{EnrollmentReport, EnrollmentRequest, Identity};

use crate::cli::{EnrollArgs, OutputMode};
use crate::commands::{CommandHandler, SettingsLoader};
use crate::config::{self, CliSettings};
use crate::errors::AppResult;
use crate::fingerprint;
use crate::output::render_enroll;
use crate::status::StatusCode;

type RunEnroll =
    Box<dyn Fn(&EnrollmentRequest, &CliSettings) -> AppResult<EnrollmentReport> + Send + Sync>;
type RenderEnroll = Box<dyn Fn(&EnrollmentReport, OutputMode, bool) -> AppResult<()> + Send + Sync>;

pub struct EnrollHandler {
    args: EnrollArgs,
    load_settings: SettingsLoader,
    run: RunEnroll,
    render: RenderEnroll,
}

impl EnrollHandler {
    pub fn new(args: EnrollArgs) -> Self {
        Self::with_dependencies(
            args,
            config::load_settings,
            fingerprint::run_enroll,
            render_enroll,
        )
    }

    pub fn with_dependencies(
        args: EnrollArgs,
        load_settings: impl Fn(Option<PathBuf>) -> AppResult<CliSettings> + Send + Sync + 'static,
        run: impl Fn(&EnrollmentRequest, &CliSettings) -> AppResult<EnrollmentReport>
            + Send
            + Sync
            + 'static,
        render: impl Fn(&EnrollmentReport, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            load_settings: Box::new(load_settings),
            run: Box::new(run),
            render: Box::new(render),
        }
    }

    fn request(&self) -> EnrollmentRequest {
        EnrollmentRequest {
            image: self.args.image.clone(),
            identity: Identity {
                user_id: self.args.user_id.clone(),
                username: self.args.username.clone(),
                phone: self.args.phone.clone(),
            },
        }
    }
}

impl CommandHandler for EnrollHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let settings = (self.load_settings)(self.args.store.store_dir.clone())?;
        let report = (self.run)(&self.request(), &settings)?;
        (self.render)(&report, mode, verbose)?;
        Ok(StatusCode::from(report.outcome).exit_code())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
