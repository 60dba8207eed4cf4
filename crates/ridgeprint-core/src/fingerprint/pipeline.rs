//! Enrollment and verification entry points.

use std::path::{Path, PathBuf};

use image::GrayImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

use super::features::extract_features;
use super::matcher::{match_probe, MatchResult, MatchStatus};
use super::quality::{assess_quality, QualityReport, QualityVerdict};
use super::settings::PipelineSettings;
use super::store::{validate_user_id, TemplateStore};
use super::template::{build_template, TemplateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollOutcome {
    Registered,
    AlreadyRegistered,
    ImageUnreadable,
    TooBlurry,
    NoFingerprintDetected,
    NoDescriptorsFound,
}

impl EnrollOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            EnrollOutcome::Registered => "Fingerprint registered successfully.",
            EnrollOutcome::AlreadyRegistered => "User ID already registered.",
            EnrollOutcome::ImageUnreadable => "Image could not be read.",
            EnrollOutcome::TooBlurry => "Image too blurry. Please capture a clearer fingerprint.",
            EnrollOutcome::NoFingerprintDetected => {
                "No fingerprint detected! Please place your finger properly."
            }
            EnrollOutcome::NoDescriptorsFound => "Fingerprint not detected.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub phone: String,
}

#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub image: PathBuf,
    pub identity: Identity,
}

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub image: PathBuf,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentReport {
    pub user_id: String,
    pub outcome: EnrollOutcome,
    pub quality: Option<QualityReport>,
    pub minutiae: usize,
    pub keypoints: usize,
    #[serde(skip)]
    pub logs: Vec<String>,
}

impl EnrollmentReport {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            outcome: EnrollOutcome::ImageUnreadable,
            quality: None,
            minutiae: 0,
            keypoints: 0,
            logs: Vec::new(),
        }
    }

    fn finish(mut self, outcome: EnrollOutcome) -> Self {
        info!(user_id = %self.user_id, ?outcome, "enrollment finished");
        self.logs.push(outcome.message().to_string());
        self.outcome = outcome;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub user_id: String,
    pub result: MatchResult,
    pub quality: Option<QualityReport>,
    #[serde(skip)]
    pub logs: Vec<String>,
}

impl VerificationReport {
    fn finish(
        user_id: &str,
        result: MatchResult,
        quality: Option<QualityReport>,
        mut logs: Vec<String>,
    ) -> Self {
        info!(
            user_id,
            status = ?result.status,
            fused_score = result.fused_score,
            "verification finished"
        );
        logs.push(result.status.message().to_string());
        Self {
            user_id: user_id.to_string(),
            result,
            quality,
            logs,
        }
    }
}

/// Decodes an image file to 8-bit grayscale.
pub fn load_probe(path: &Path) -> AppResult<GrayImage> {
    if !path.exists() {
        return Err(AppError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    image::open(path)
        .map(|decoded| decoded.to_luma8())
        .map_err(|source| AppError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })
}

/// Enrolls the image at `request.image`. A file that cannot be decoded
/// yields [`EnrollOutcome::ImageUnreadable`].
pub fn run_enrollment<S: TemplateStore + ?Sized>(
    request: &EnrollmentRequest,
    settings: &PipelineSettings,
    store: &S,
) -> AppResult<EnrollmentReport> {
    validate_user_id(&request.identity.user_id)?;
    match load_probe(&request.image) {
        Ok(image) => {
            let mut report = enroll(&image, &request.identity, settings, store)?;
            report
                .logs
                .insert(0, format!("Loaded probe image {}", request.image.display()));
            Ok(report)
        }
        Err(err @ (AppError::MissingInput { .. } | AppError::ImageDecode { .. })) => {
            debug!(error = %err, "probe image unreadable");
            let mut report = EnrollmentReport::new(&request.identity.user_id);
            report.logs.push(err.to_string());
            Ok(report.finish(EnrollOutcome::ImageUnreadable))
        }
        Err(err) => Err(err),
    }
}

/// Quality gate, feature extraction, duplicate check and persistence.
pub fn enroll<S: TemplateStore + ?Sized>(
    image: &GrayImage,
    identity: &Identity,
    settings: &PipelineSettings,
    store: &S,
) -> AppResult<EnrollmentReport> {
    validate_user_id(&identity.user_id)?;
    let mut report = EnrollmentReport::new(&identity.user_id);
    if image.width() == 0 || image.height() == 0 {
        return Ok(report.finish(EnrollOutcome::ImageUnreadable));
    }

    let quality = assess_quality(image);
    report.logs.push(format!(
        "Quality gate: laplacian variance {:.2}, {} large ridge contour(s)",
        quality.laplacian_variance, quality.large_contours
    ));
    let verdict = quality.verdict;
    report.quality = Some(quality);
    match verdict {
        QualityVerdict::Blurry => return Ok(report.finish(EnrollOutcome::TooBlurry)),
        QualityVerdict::NoFingerprint => {
            return Ok(report.finish(EnrollOutcome::NoFingerprintDetected))
        }
        QualityVerdict::Ok => {}
    }

    let features = extract_features(image, settings);
    report.minutiae = features.minutiae.len();
    report.keypoints = features.keypoints.len();
    report.logs.push(format!(
        "Extracted {} minutiae and {} descriptor(s)",
        features.minutiae.len(),
        features.descriptors.len()
    ));

    let template = match build_template(
        &identity.user_id,
        &identity.username,
        &identity.phone,
        features.descriptors,
        features.minutiae,
        store,
    ) {
        Ok(template) => template,
        Err(TemplateError::EmptyDescriptors { .. }) => {
            return Ok(report.finish(EnrollOutcome::NoDescriptorsFound))
        }
        Err(TemplateError::Duplicate { .. }) => {
            return Ok(report.finish(EnrollOutcome::AlreadyRegistered))
        }
        Err(TemplateError::Store(err)) => return Err(err),
    };

    match store.insert(&template) {
        Ok(()) => Ok(report.finish(EnrollOutcome::Registered)),
        Err(AppError::DuplicateUser { .. }) => Ok(report.finish(EnrollOutcome::AlreadyRegistered)),
        Err(err) => Err(err),
    }
}

/// Verifies the image at `request.image`. A file that cannot be decoded
/// yields [`MatchStatus::Error`].
pub fn run_verification<S: TemplateStore + ?Sized>(
    request: &VerificationRequest,
    settings: &PipelineSettings,
    store: &S,
) -> AppResult<VerificationReport> {
    match load_probe(&request.image) {
        Ok(image) => verify(&image, &request.user_id, settings, store),
        Err(err @ (AppError::MissingInput { .. } | AppError::ImageDecode { .. })) => {
            debug!(error = %err, "probe image unreadable");
            Ok(VerificationReport::finish(
                &request.user_id,
                MatchResult::rejected(MatchStatus::Error),
                None,
                vec![err.to_string()],
            ))
        }
        Err(err) => Err(err),
    }
}

/// Quality gate, template lookup and the rotation hypothesis search.
pub fn verify<S: TemplateStore + ?Sized>(
    image: &GrayImage,
    user_id: &str,
    settings: &PipelineSettings,
    store: &S,
) -> AppResult<VerificationReport> {
    let mut logs = Vec::new();
    if image.width() == 0 || image.height() == 0 {
        let result = MatchResult::rejected(MatchStatus::Error);
        return Ok(VerificationReport::finish(user_id, result, None, logs));
    }

    let quality = assess_quality(image);
    logs.push(format!(
        "Quality gate: laplacian variance {:.2}, {} large ridge contour(s)",
        quality.laplacian_variance, quality.large_contours
    ));
    let rejected = match quality.verdict {
        QualityVerdict::Blurry => Some(MatchStatus::Blurry),
        QualityVerdict::NoFingerprint => Some(MatchStatus::NoFingerprint),
        QualityVerdict::Ok => None,
    };
    if let Some(status) = rejected {
        let result = MatchResult::rejected(status);
        return Ok(VerificationReport::finish(user_id, result, Some(quality), logs));
    }

    let Some(template) = store.lookup(user_id)? else {
        let result = MatchResult::rejected(MatchStatus::NoUser);
        return Ok(VerificationReport::finish(user_id, result, Some(quality), logs));
    };
    logs.push(format!(
        "Loaded template with {} descriptor(s) and {} minutiae",
        template.descriptors.len(),
        template.minutiae.len()
    ));

    let result = match_probe(image, &template, settings);
    if let Some(angle) = result.best_angle {
        logs.push(format!(
            "Best rotation {angle:+} degrees: descriptor {:.2}%, minutiae {:.2}%, fused {:.2}%",
            result.descriptor_score, result.minutiae_score, result.fused_score
        ));
    }
    Ok(VerificationReport::finish(user_id, result, Some(quality), logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::store::test_support::InMemoryStore;
    use crate::fingerprint::template::FingerprintTemplate;
    use image::Luma;
    use tempfile::TempDir;

    fn identity(user_id: &str) -> Identity {
        Identity {
            user_id: user_id.into(),
            username: "Alice".into(),
            phone: "555-0100".into(),
        }
    }

    fn stripes() -> GrayImage {
        GrayImage::from_fn(512, 512, |_, y| {
            let phase = (y % 10) as f32 / 10.0;
            Luma([(127.5 + 127.5 * (phase * std::f32::consts::TAU).cos()) as u8])
        })
    }

    #[test]
    fn blurry_enrollment_never_touches_the_store() {
        let store = InMemoryStore::default();
        let flat = GrayImage::from_pixel(256, 256, Luma([128]));
        let report = enroll(&flat, &identity("u1"), &PipelineSettings::default(), &store).unwrap();
        assert_eq!(report.outcome, EnrollOutcome::TooBlurry);
        assert!(store.inserts.borrow().is_empty());
        assert_eq!(report.logs.last().map(String::as_str), Some(EnrollOutcome::TooBlurry.message()));
    }

    #[test]
    fn unreadable_file_is_an_outcome_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let bogus = tmp.path().join("probe.png");
        std::fs::write(&bogus, b"definitely not a png").unwrap();
        let store = InMemoryStore::default();

        let request = EnrollmentRequest {
            image: bogus.clone(),
            identity: identity("u1"),
        };
        let report = run_enrollment(&request, &PipelineSettings::default(), &store).unwrap();
        assert_eq!(report.outcome, EnrollOutcome::ImageUnreadable);

        let request = VerificationRequest {
            image: tmp.path().join("missing.png"),
            user_id: "u1".into(),
        };
        let report = run_verification(&request, &PipelineSettings::default(), &store).unwrap();
        assert_eq!(report.result.status, MatchStatus::Error);
        assert!(!report.result.is_match);
    }

    #[test]
    fn empty_user_id_is_rejected_before_any_work() {
        let store = InMemoryStore::default();
        let err = enroll(
            &stripes(),
            &identity(""),
            &PipelineSettings::default(),
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidUser { .. }));
    }

    #[test]
    fn blurry_probe_is_reported_before_lookup() {
        let store = InMemoryStore::default();
        let flat = GrayImage::from_pixel(128, 128, Luma([10]));
        let report = verify(&flat, "u1", &PipelineSettings::default(), &store).unwrap();
        assert_eq!(report.result, MatchResult::rejected(MatchStatus::Blurry));
    }

    #[test]
    fn unknown_user_is_no_user() {
        let store = InMemoryStore::default();
        store
            .insert(&FingerprintTemplate::new("u1", "A", "1", vec![[0u8; 32]], vec![]))
            .unwrap();
        let report = verify(&stripes(), "u404", &PipelineSettings::default(), &store).unwrap();
        assert_eq!(report.result.status, MatchStatus::NoUser);
        assert_eq!(report.result.matched_username, None);
        assert_eq!(report.result.fused_score, 0.0);
    }
}
