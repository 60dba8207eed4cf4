use std::f64::consts::TAU;

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ridgeprint_core::errors::AppResult;
use ridgeprint_core::fingerprint::{
    enroll, run_enrollment, run_verification, verify, EnrollOutcome, EnrollmentRequest,
    FilesystemTemplateStore, Identity, MatchStatus, PipelineSettings, TemplateStore,
    VerificationRequest,
};
use tempfile::TempDir;

const RIDGE_PERIOD: f64 = 10.0;

/// Vertical ridges with a grid of phase dislocations, each of which turns
/// into a ridge ending or a fork.
fn synthetic_fingerprint() -> GrayImage {
    let mut cores = Vec::new();
    for (row, y) in [130.0, 256.0, 380.0].into_iter().enumerate() {
        for (col, x) in [100.0, 200.0, 310.0, 410.0].into_iter().enumerate() {
            let charge = if (row + col) % 2 == 0 { 1.0 } else { -1.0 };
            cores.push((x, y, charge));
        }
    }

    GrayImage::from_fn(512, 512, |x, y| {
        let (fx, fy) = (f64::from(x), f64::from(y));
        let twist: f64 = cores
            .iter()
            .map(|(cx, cy, charge)| charge * (fy - cy).atan2(fx - cx))
            .sum();
        let value = 127.5 + 127.5 * (TAU * fx / RIDGE_PERIOD + twist).cos();
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

fn noise(seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = GrayImage::new(512, 512);
    for pixel in image.pixels_mut() {
        *pixel = Luma([rng.gen()]);
    }
    image
}

fn identity(user_id: &str) -> Identity {
    Identity {
        user_id: user_id.into(),
        username: "Alice".into(),
        phone: "555-0100".into(),
    }
}

fn enrolled_store(tmp: &TempDir) -> AppResult<FilesystemTemplateStore> {
    let store = FilesystemTemplateStore::new(tmp.path().join("templates"));
    let report = enroll(
        &synthetic_fingerprint(),
        &identity("u1"),
        &PipelineSettings::default(),
        &store,
    )?;
    assert_eq!(report.outcome, EnrollOutcome::Registered, "{:?}", report.logs);
    assert!(report.keypoints > 0);
    assert!(report.minutiae > 0);
    Ok(store)
}

#[test]
fn same_image_matches_and_others_do_not() {
    let tmp = TempDir::new().unwrap();
    let store = enrolled_store(&tmp).unwrap();
    let settings = PipelineSettings::default();

    let same = verify(&synthetic_fingerprint(), "u1", &settings, &store).unwrap();
    assert_eq!(same.result.status, MatchStatus::MatchFound);
    assert!(same.result.is_match);
    assert!(same.result.fused_score >= 26.0);
    assert_eq!(same.result.best_angle, Some(0.0));
    assert_eq!(same.result.matched_username.as_deref(), Some("Alice"));

    let random = verify(&noise(42), "u1", &settings, &store).unwrap();
    assert!(!random.result.is_match);
    assert!(matches!(
        random.result.status,
        MatchStatus::NoMatch | MatchStatus::NoFingerprint
    ));

    let unknown = verify(&synthetic_fingerprint(), "u404", &settings, &store).unwrap();
    assert_eq!(unknown.result.status, MatchStatus::NoUser);
    assert!(!unknown.result.is_match);
}

#[test]
fn verification_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let store = enrolled_store(&tmp).unwrap();
    let settings = PipelineSettings::default();
    let probe = synthetic_fingerprint();

    let first = verify(&probe, "u1", &settings, &store).unwrap();
    let second = verify(&probe, "u1", &settings, &store).unwrap();
    assert_eq!(first.result, second.result);
}

#[test]
fn duplicate_enrollment_keeps_original_template() {
    let tmp = TempDir::new().unwrap();
    let store = enrolled_store(&tmp).unwrap();
    let original = store.lookup("u1").unwrap().unwrap();

    let second = enroll(
        &synthetic_fingerprint(),
        &Identity {
            user_id: "u1".into(),
            username: "Mallory".into(),
            phone: "555-0666".into(),
        },
        &PipelineSettings::default(),
        &store,
    )
    .unwrap();
    assert_eq!(second.outcome, EnrollOutcome::AlreadyRegistered);
    assert_eq!(store.lookup("u1").unwrap(), Some(original));
}

#[test]
fn file_based_round_trip() {
    let tmp = TempDir::new().unwrap();
    let image_path = tmp.path().join("finger.png");
    synthetic_fingerprint().save(&image_path).unwrap();
    let store = FilesystemTemplateStore::new(tmp.path().join("templates"));
    let settings = PipelineSettings::default();

    let enrolled = run_enrollment(
        &EnrollmentRequest {
            image: image_path.clone(),
            identity: identity("finger-1"),
        },
        &settings,
        &store,
    )
    .unwrap();
    assert_eq!(enrolled.outcome, EnrollOutcome::Registered);
    assert_eq!(store.list().unwrap().len(), 1);

    let verified = run_verification(
        &VerificationRequest {
            image: image_path,
            user_id: "finger-1".into(),
        },
        &settings,
        &store,
    )
    .unwrap();
    assert_eq!(verified.result.status, MatchStatus::MatchFound);
}
