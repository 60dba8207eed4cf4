use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use ridgeprint_core::fingerprint::{VerificationReport, VerificationRequest};

use crate::cli::{OutputMode, VerifyArgs};
use crate::commands::{CommandHandler, SettingsLoader};
use crate::config::{self, CliSettings};
use crate::errors::AppResult;
use crate::fingerprint;
use crate::output::render_verify;
use crate::status::StatusCode;

type RunVerify =
    Box<dyn Fn(&VerificationRequest, &CliSettings) -> AppResult<VerificationReport> + Send + Sync>;
type RenderVerify =
    Box<dyn Fn(&VerificationReport, OutputMode, bool) -> AppResult<()> + Send + Sync>;

pub struct VerifyHandler {
    args: VerifyArgs,
    load_settings: SettingsLoader,
    run: RunVerify,
    render: RenderVerify,
}

impl VerifyHandler {
    pub fn new(args: VerifyArgs) -> Self {
        Self::with_dependencies(
            args,
            config::load_settings,
            fingerprint::run_verify,
            render_verify,
        )
    }

    pub fn with_dependencies(
        args: VerifyArgs,
        load_settings: impl Fn(Option<PathBuf>) -> AppResult<CliSettings> + Send + Sync + 'static,
        run: impl Fn(&VerificationRequest, &CliSettings) -> AppResult<VerificationReport>
            + Send
            + Sync
            + 'static,
        render: impl Fn(&VerificationReport, OutputMode, bool) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            args,
            load_settings: Box::new(load_settings),
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for VerifyHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let settings = (self.load_settings)(self.args.store.store_dir.clone())?;
        let request = VerificationRequest {
            image: self.args.image.clone(),
            user_id: self.args.user_id.clone(),
        };
        let report = (self.run)(&request, &settings)?;
        (self.render)(&report, mode, verbose)?;
        Ok(StatusCode::from(report.result.status).exit_code())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
