pub mod backup;
pub mod descriptors;
pub mod enhance;
pub mod features;
pub mod filters;
pub mod matcher;
pub mod minutiae;
pub mod pipeline;
pub mod quality;
pub mod settings;
pub mod skeleton;
pub mod store;
pub mod template;

pub use backup::{write_backup_snapshot, BackupWorker, StoreEvent};

pub use descriptors::{
    cross_checked_matches, extract_descriptors, hamming_distance, Keypoint, LocalDescriptor,
    OrbConfig, DESCRIPTOR_BYTES,
};

pub use enhance::{enhance, WORKING_SIZE};

pub use features::{extract_features, FeatureSet};

pub use matcher::{
    decide, descriptor_score, fuse_scores, is_match, match_probe, minutiae_score, select_best,
    HypothesisScore, MatchResult, MatchStatus, MinutiaeIndex, ROTATION_ANGLES,
};

pub use minutiae::{extract_minutiae, Minutia, MinutiaKind, MinutiaPoint};

pub use pipeline::{
    enroll, load_probe, run_enrollment, run_verification, verify, EnrollOutcome,
    EnrollmentReport, EnrollmentRequest, Identity, VerificationReport, VerificationRequest,
};

pub use quality::{assess_quality, QualityReport, QualityVerdict};

pub use settings::PipelineSettings;

pub use skeleton::{skeletonize, Skeleton};

pub use store::{
    encode_user_id, read_template, show_user, validate_user_id, EnvStoreDirResolver,
    FilesystemTemplateStore, StoreDirResolver, TemplateStore, DEFAULT_STORE_DIR, STORE_DIR_ENV,
};

pub use template::{build_template, FingerprintTemplate, TemplateError, UserProfile, UserSummary};
