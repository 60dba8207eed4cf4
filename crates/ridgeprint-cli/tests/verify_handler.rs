use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use ridgeprint_cli::cli::{OutputMode, StoreArgs, VerifyArgs};
use ridgeprint_cli::commands::{CommandHandler, VerifyHandler};
use ridgeprint_cli::config::CliSettings;
use ridgeprint_core::fingerprint::{
    MatchResult, MatchStatus, PipelineSettings, VerificationReport,
};

fn sample_args() -> VerifyArgs {
    VerifyArgs {
        image: PathBuf::from("probe.png"),
        user_id: "u1".into(),
        store: StoreArgs::default(),
    }
}

fn settings(_dir: Option<PathBuf>) -> ridgeprint_cli::errors::AppResult<CliSettings> {
    Ok(CliSettings {
        store_dir: PathBuf::from("/tmp/templates"),
        backup_path: PathBuf::from("/tmp/backup.json"),
        backup_enabled: false,
        pipeline: PipelineSettings::default(),
    })
}

fn report(result: MatchResult) -> VerificationReport {
    VerificationReport {
        user_id: "u1".into(),
        result,
        quality: None,
        logs: vec![],
    }
}

fn scored(status: MatchStatus, fused_score: f64) -> MatchResult {
    MatchResult {
        status,
        is_match: status == MatchStatus::MatchFound,
        fused_score,
        descriptor_score: 20.0,
        minutiae_score: fused_score,
        matched_username: Some("Alice".into()),
        best_angle: Some(0.0),
    }
}

#[test]
fn match_exits_successfully() {
    let renders = Arc::new(Mutex::new(0));
    let handler = VerifyHandler::with_dependencies(
        sample_args(),
        settings,
        |request, _settings| {
            assert_eq!(request.user_id, "u1");
            Ok(report(scored(MatchStatus::MatchFound, 41.0)))
        },
        {
            let renders = Arc::clone(&renders);
            move |_report, _mode, _verbose| {
                *renders.lock().unwrap() += 1;
                Ok(())
            }
        },
    );

    assert_eq!(
        handler.execute(OutputMode::Human, false).unwrap(),
        ExitCode::SUCCESS
    );
    assert_eq!(*renders.lock().unwrap(), 1);
}

#[test]
fn each_rejection_has_its_own_exit_code() {
    let cases = [
        (scored(MatchStatus::NoMatch, 10.0), 7),
        (MatchResult::rejected(MatchStatus::NoUser), 6),
        (MatchResult::rejected(MatchStatus::NoFingerprint), 4),
        (MatchResult::rejected(MatchStatus::Blurry), 3),
        (MatchResult::rejected(MatchStatus::Error), 2),
    ];

    for (result, code) in cases {
        let handler = VerifyHandler::with_dependencies(
            sample_args(),
            settings,
            move |_request, _settings| Ok(report(result.clone())),
            |_report, _mode, _verbose| Ok(()),
        );
        assert_eq!(
            handler.execute(OutputMode::Json, false).unwrap(),
            ExitCode::from(code)
        );
    }
}
