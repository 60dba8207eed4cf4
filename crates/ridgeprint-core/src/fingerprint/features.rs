use image::GrayImage;
use tracing::debug;

use super::descriptors::{extract_descriptors, Keypoint, LocalDescriptor};
use super::enhance::enhance;
use super::minutiae::{extract_minutiae, MinutiaPoint};
use super::settings::PipelineSettings;

/// Both feature families extracted from one enhanced image.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub minutiae: Vec<MinutiaPoint>,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<LocalDescriptor>,
}

/// Enhances `image`, then runs the skeleton/minutiae branch and the
/// descriptor branch concurrently on the same enhanced pixels.
pub fn extract_features(image: &GrayImage, settings: &PipelineSettings) -> FeatureSet {
    let enhanced = enhance(image, settings);
    let (minutiae, (keypoints, descriptors)) = rayon::join(
        || extract_minutiae(&enhanced, settings),
        || extract_descriptors(&enhanced, &settings.orb),
    );
    debug!(
        minutiae = minutiae.len(),
        keypoints = keypoints.len(),
        descriptors = descriptors.len(),
        "features extracted"
    );
    FeatureSet {
        minutiae,
        keypoints,
        descriptors,
    }
}
