//! Process exit codes for pipeline outcomes.

use std::process::ExitCode;

use ridgeprint_core::fingerprint::{EnrollOutcome, MatchStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusCode {
    Success,
    BadInput,
    Blurry,
    NoFingerprint,
    Duplicate,
    NotFound,
    NoMatch,
}

impl StatusCode {
    pub fn code(self) -> u8 {
        match self {
            StatusCode::Success => 0,
            StatusCode::BadInput => 2,
            StatusCode::Blurry => 3,
            StatusCode::NoFingerprint => 4,
            StatusCode::Duplicate => 5,
            StatusCode::NotFound => 6,
            StatusCode::NoMatch => 7,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

impl From<EnrollOutcome> for StatusCode {
    fn from(outcome: EnrollOutcome) -> Self {
        match outcome {
            EnrollOutcome::Registered => StatusCode::Success,
            EnrollOutcome::AlreadyRegistered => StatusCode::Duplicate,
            EnrollOutcome::ImageUnreadable | EnrollOutcome::NoDescriptorsFound => {
                StatusCode::BadInput
            }
            EnrollOutcome::TooBlurry => StatusCode::Blurry,
            EnrollOutcome::NoFingerprintDetected => StatusCode::NoFingerprint,
        }
    }
}

impl From<MatchStatus> for StatusCode {
    fn from(status: MatchStatus) -> Self {
        match status {
            MatchStatus::MatchFound => StatusCode::Success,
            MatchStatus::Error => StatusCode::BadInput,
            MatchStatus::Blurry => StatusCode::Blurry,
            MatchStatus::NoFingerprint => StatusCode::NoFingerprint,
            MatchStatus::NoUser => StatusCode::NotFound,
            MatchStatus::NoMatch => StatusCode::NoMatch,
        }
    }
}
