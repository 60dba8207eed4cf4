//! Minutiae from the ridge skeleton by crossing count.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::settings::PipelineSettings;
use super::skeleton::{skeletonize, Skeleton};

/// Candidates with fewer ridge pixels than this in their 11x11 neighbourhood
/// are treated as noise.
pub const MIN_LOCAL_DENSITY: usize = 10;
const DENSITY_RADIUS: i64 = 5;

/// Skeleton coordinate. Serialized as a compact `[row, col]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct MinutiaPoint {
    pub row: u32,
    pub col: u32,
}

impl MinutiaPoint {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl From<(u32, u32)> for MinutiaPoint {
    fn from((row, col): (u32, u32)) -> Self {
        Self { row, col }
    }
}

impl From<MinutiaPoint> for (u32, u32) {
    fn from(point: MinutiaPoint) -> Self {
        (point.row, point.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MinutiaKind {
    Ending,
    Bifurcation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Minutia {
    pub kind: MinutiaKind,
    pub point: MinutiaPoint,
}

/// Skeletonizes `image` and returns its minutiae, endings first.
pub fn extract_minutiae(image: &GrayImage, settings: &PipelineSettings) -> Vec<MinutiaPoint> {
    let skeleton = skeletonize(image);
    let minutiae = classify(&skeleton, settings.use_minutiae_filtering);
    debug!(
        skeleton_pixels = skeleton.on_count(),
        minutiae = minutiae.len(),
        "minutiae extracted"
    );
    minutiae.into_iter().map(|m| m.point).collect()
}

/// Tagged minutiae of a skeleton: all endings in raster order, then all
/// bifurcations in raster order. The outer one-pixel frame is never examined.
pub fn classify(skeleton: &Skeleton, filter_sparse: bool) -> Vec<Minutia> {
    let mut endings = Vec::new();
    let mut bifurcations = Vec::new();
    let (height, width) = (i64::from(skeleton.height()), i64::from(skeleton.width()));

    for row in 1..height - 1 {
        for col in 1..width - 1 {
            if !skeleton.is_on(row, col) {
                continue;
            }
            let kind = match crossing_count(skeleton, row, col) {
                1 => MinutiaKind::Ending,
                n if n >= 3 => MinutiaKind::Bifurcation,
                _ => continue,
            };
            if filter_sparse && local_density(skeleton, row, col) < MIN_LOCAL_DENSITY {
                continue;
            }
            let point = MinutiaPoint::new(row as u32, col as u32);
            match kind {
                MinutiaKind::Ending => endings.push(Minutia { kind, point }),
                MinutiaKind::Bifurcation => bifurcations.push(Minutia { kind, point }),
            }
        }
    }

    endings.extend(bifurcations);
    endings
}

/// Number of ridge pixels among the eight neighbours.
pub fn crossing_count(skeleton: &Skeleton, row: i64, col: i64) -> usize {
    let mut count = 0;
    for dr in -1..=1 {
        for dc in -1..=1 {
            if (dr, dc) != (0, 0) && skeleton.is_on(row + dr, col + dc) {
                count += 1;
            }
        }
    }
    count
}

/// Ridge pixels in the 11x11 window centred on `(row, col)`, centre included,
/// clipped at the image border.
pub fn local_density(skeleton: &Skeleton, row: i64, col: i64) -> usize {
    let mut count = 0;
    for r in row - DENSITY_RADIUS..=row + DENSITY_RADIUS {
        for c in col - DENSITY_RADIUS..=col + DENSITY_RADIUS {
            if skeleton.is_on(r, c) {
                count += 1;
            }
        }
    }
    count
}
