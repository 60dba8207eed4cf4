use std::any::Any;
use std::path::Path;
use std::process::ExitCode;

use ridgeprint_core::fingerprint::QualityVerdict;

use crate::cli::{OutputMode, QualityArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::fingerprint::{self, QualityOutcome};
use crate::output::render_quality;
use crate::status::StatusCode;

pub struct QualityHandler {
    args: QualityArgs,
    run: Box<dyn Fn(&Path) -> AppResult<QualityOutcome> + Send + Sync>,
    render: Box<dyn Fn(&QualityOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl QualityHandler {
    pub fn new(args: QualityArgs) -> Self {
        Self::with_dependencies(args, fingerprint::run_quality, render_quality)
    }

    pub fn with_dependencies(
        args: QualityArgs,
        run: impl Fn(&Path) -> AppResult<QualityOutcome> + Send + Sync + 'static,
        render: impl Fn(&QualityOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for QualityHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args.image)?;
        (self.render)(&outcome, mode)?;
        let status = match outcome.report.verdict {
            QualityVerdict::Ok => StatusCode::Success,
            QualityVerdict::Blurry => StatusCode::Blurry,
            QualityVerdict::NoFingerprint => StatusCode::NoFingerprint,
        };
        Ok(status.exit_code())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
