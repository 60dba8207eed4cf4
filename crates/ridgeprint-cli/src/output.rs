use std::error::Error;
use std::io::{self, Write};

use ridgeprint_core::fingerprint::{
    EnrollmentReport, QualityVerdict, UserProfile, UserSummary, VerificationReport,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::doctor::{CheckStatus, DoctorOutcome};
use crate::errors::{AppError, AppResult};
use crate::fingerprint::{BackupOutcome, QualityOutcome, UserDeletion};
use crate::status::StatusCode;

fn write_json<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

fn print_logs(logs: &[String], verbose: bool) {
    if verbose {
        for line in logs {
            println!("{line}");
        }
    }
}

pub fn render_enroll(report: &EnrollmentReport, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            print_logs(&report.logs, verbose);
            println!("{} (user {})", report.outcome.message(), report.user_id);
            if verbose {
                println!(
                    "minutiae: {}, keypoints: {}",
                    report.minutiae, report.keypoints
                );
            }
        }
        OutputMode::Json => write_json(&enroll_json_payload(report))?,
    }
    Ok(())
}

fn enroll_json_payload(report: &EnrollmentReport) -> Value {
    json!({
        "status": StatusCode::from(report.outcome),
        "user_id": report.user_id,
        "outcome": report.outcome,
        "message": report.outcome.message(),
        "quality": report.quality,
        "minutiae": report.minutiae,
        "keypoints": report.keypoints,
    })
}

pub fn render_verify(report: &VerificationReport, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            print_logs(&report.logs, verbose);
            let result = &report.result;
            match &result.matched_username {
                Some(name) if result.is_match => {
                    println!("{} for {} ({})", result.status.message(), report.user_id, name)
                }
                _ => println!("{} (user {})", result.status.message(), report.user_id),
            }
            if result.best_angle.is_some() {
                println!(
                    "fused score {:.2}% (descriptor {:.2}%, minutiae {:.2}%)",
                    result.fused_score, result.descriptor_score, result.minutiae_score
                );
            }
        }
        OutputMode::Json => write_json(&verify_json_payload(report))?,
    }
    Ok(())
}

fn verify_json_payload(report: &VerificationReport) -> Value {
    let result = &report.result;
    json!({
        "status": StatusCode::from(result.status),
        "user_id": report.user_id,
        "result": result.status,
        "message": result.status.message(),
        "match": result.is_match,
        "fused_score": result.fused_score,
        "descriptor_score": result.descriptor_score,
        "minutiae_score": result.minutiae_score,
        "matched_username": result.matched_username,
        "best_angle": result.best_angle,
    })
}

pub fn render_quality(outcome: &QualityOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            let verdict = match outcome.report.verdict {
                QualityVerdict::Ok => "usable",
                QualityVerdict::Blurry => "too blurry",
                QualityVerdict::NoFingerprint => "no fingerprint detected",
            };
            println!(
                "{} ({}x{}): {verdict}",
                outcome.image_path, outcome.width, outcome.height
            );
            println!(
                "laplacian variance {:.2}, large ridge contours {}",
                outcome.report.laplacian_variance, outcome.report.large_contours
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_user_list(users: &[UserSummary], mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if users.is_empty() {
                println!("No users enrolled");
            }
            for user in users {
                println!("{}\t{}", user.user_id, user.username);
            }
        }
        OutputMode::Json => write_json(users)?,
    }
    Ok(())
}

pub fn render_profile(profile: &UserProfile, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!("user id:  {}", profile.user_id);
            println!("username: {}", profile.username);
            println!("phone:    {}", profile.phone);
        }
        OutputMode::Json => write_json(profile)?,
    }
    Ok(())
}

pub fn render_deletion(outcome: &UserDeletion, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => println!(
            "Deleted template for user {} from {}",
            outcome.user_id, outcome.store_dir
        ),
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_backup(outcome: &BackupOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => println!(
            "Backup written: {} template(s) to {}",
            outcome.templates, outcome.backup_path
        ),
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_doctor(outcome: &DoctorOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for check in &outcome.checks {
                let label = match check.status {
                    CheckStatus::Pass => "PASS",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                };
                println!("[{label}] {}: {}", check.name, check.message);
            }
            println!(
                "{}",
                if outcome.ok {
                    "All checks passed"
                } else {
                    "Some checks need attention"
                }
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}
