use super::descriptors::OrbConfig;

/// Immutable pipeline configuration, built once and shared by reference
/// between enrollment, verification and every rotation hypothesis.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Run the oriented Gabor bank during enhancement.
    pub use_gabor: bool,
    /// Crop the enhanced image to the largest foreground region.
    pub use_roi: bool,
    /// Drop minutiae candidates in sparse skeleton neighbourhoods.
    pub use_minutiae_filtering: bool,
    pub orb: OrbConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            use_gabor: true,
            use_roi: false,
            use_minutiae_filtering: true,
            orb: OrbConfig::default(),
        }
    }
}
