//! Rotation-aware scoring of a probe image against a stored template.
//!
//! Every rotation hypothesis is scored independently on the descriptor and
//! minutiae signals; the best fused score decides the match.

use std::collections::HashMap;

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::descriptors::{cross_checked_matches, LocalDescriptor};
use super::features::{extract_features, FeatureSet};
use super::filters::rotate_about_center;
use super::minutiae::MinutiaPoint;
use super::settings::PipelineSettings;
use super::template::FingerprintTemplate;

/// Probe rotations tried during verification, in evaluation order.
pub const ROTATION_ANGLES: [f32; 5] = [-10.0, -5.0, 0.0, 5.0, 10.0];
pub const MATCH_THRESHOLD: f64 = 26.0;
pub const FALLBACK_DESCRIPTOR_SCORE: f64 = 45.0;
pub const FALLBACK_MINUTIAE_SCORE: f64 = 15.0;
pub const DESCRIPTOR_WEIGHT: f64 = 0.1;
pub const MINUTIAE_WEIGHT: f64 = 0.9;
/// Probe minutiae pair with a stored minutia strictly closer than this.
pub const MINUTIA_RADIUS: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Error,
    Blurry,
    NoFingerprint,
    NoUser,
    MatchFound,
    NoMatch,
}

impl MatchStatus {
    pub fn message(&self) -> &'static str {
        match self {
            MatchStatus::Error => "Invalid image file.",
            MatchStatus::Blurry => "Fingerprint image is too blurry.",
            MatchStatus::NoFingerprint => "No fingerprint detected. Please try again.",
            MatchStatus::NoUser => "No fingerprint data found for this user ID.",
            MatchStatus::MatchFound => "Match found",
            MatchStatus::NoMatch => "No match found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub status: MatchStatus,
    pub is_match: bool,
    pub fused_score: f64,
    pub descriptor_score: f64,
    pub minutiae_score: f64,
    pub matched_username: Option<String>,
    pub best_angle: Option<f32>,
}

impl MatchResult {
    /// Result for a probe that never reached the hypothesis loop.
    pub fn rejected(status: MatchStatus) -> Self {
        Self {
            status,
            is_match: false,
            fused_score: 0.0,
            descriptor_score: 0.0,
            minutiae_score: 0.0,
            matched_username: None,
            best_angle: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HypothesisScore {
    pub angle: f32,
    pub descriptor_score: f64,
    pub minutiae_score: f64,
    pub fused_score: f64,
}

pub fn fuse_scores(descriptor_score: f64, minutiae_score: f64) -> f64 {
    DESCRIPTOR_WEIGHT * descriptor_score + MINUTIAE_WEIGHT * minutiae_score
}

pub fn is_match(fused_score: f64, descriptor_score: f64, minutiae_score: f64) -> bool {
    fused_score >= MATCH_THRESHOLD
        || (descriptor_score > FALLBACK_DESCRIPTOR_SCORE
            && minutiae_score > FALLBACK_MINUTIAE_SCORE)
}

/// Percentage of mutual nearest-neighbour descriptor pairs relative to the
/// larger of the two sets.
pub fn descriptor_score(probe: &[LocalDescriptor], stored: &[LocalDescriptor]) -> f64 {
    let denominator = probe.len().max(stored.len());
    if denominator == 0 {
        return 0.0;
    }
    100.0 * cross_checked_matches(probe, stored).len() as f64 / denominator as f64
}

/// Uniform grid over minutiae with cells of [`MINUTIA_RADIUS`] pixels, so a
/// radius query only inspects the 3x3 block of cells around the probe.
#[derive(Debug, Clone, Default)]
pub struct MinutiaeIndex {
    cells: HashMap<(i64, i64), Vec<MinutiaPoint>>,
}

impl MinutiaeIndex {
    pub fn new(points: &[MinutiaPoint]) -> Self {
        let mut cells: HashMap<(i64, i64), Vec<MinutiaPoint>> = HashMap::new();
        for point in points {
            cells.entry(cell_of(point)).or_default().push(*point);
        }
        Self { cells }
    }

    /// Whether any indexed point lies strictly within [`MINUTIA_RADIUS`].
    pub fn has_neighbour(&self, point: &MinutiaPoint) -> bool {
        let (cr, cc) = cell_of(point);
        let limit = MINUTIA_RADIUS * MINUTIA_RADIUS;
        (cr - 1..=cr + 1).any(|row| {
            (cc - 1..=cc + 1).any(|col| {
                self.cells.get(&(row, col)).is_some_and(|bucket| {
                    bucket.iter().any(|other| squared_distance(point, other) < limit)
                })
            })
        })
    }
}

fn cell_of(point: &MinutiaPoint) -> (i64, i64) {
    let size = MINUTIA_RADIUS as i64;
    (i64::from(point.row) / size, i64::from(point.col) / size)
}

fn squared_distance(a: &MinutiaPoint, b: &MinutiaPoint) -> f64 {
    let dr = f64::from(a.row) - f64::from(b.row);
    let dc = f64::from(a.col) - f64::from(b.col);
    dr * dr + dc * dc
}

/// Percentage of probe minutiae with a stored minutia nearby, relative to the
/// larger set. Zero when either set is empty.
pub fn minutiae_score(probe: &[MinutiaPoint], stored: &[MinutiaPoint]) -> f64 {
    if probe.is_empty() || stored.is_empty() {
        return 0.0;
    }
    let index = MinutiaeIndex::new(stored);
    let paired = probe.iter().filter(|point| index.has_neighbour(point)).count();
    100.0 * paired as f64 / probe.len().max(stored.len()) as f64
}

/// Scores one hypothesis. A probe without descriptors contributes nothing.
pub fn score_features(
    angle: f32,
    features: &FeatureSet,
    template: &FingerprintTemplate,
) -> Option<HypothesisScore> {
    if features.descriptors.is_empty() {
        return None;
    }
    let descriptor = descriptor_score(&features.descriptors, &template.descriptors);
    let minutiae = minutiae_score(&features.minutiae, &template.minutiae);
    Some(HypothesisScore {
        angle,
        descriptor_score: descriptor,
        minutiae_score: minutiae,
        fused_score: fuse_scores(descriptor, minutiae),
    })
}

/// Keeps the first hypothesis with a strictly greater fused score than every
/// earlier one. Hypotheses that never exceed zero are not selected.
pub fn select_best(scores: impl IntoIterator<Item = HypothesisScore>) -> Option<HypothesisScore> {
    let mut best: Option<HypothesisScore> = None;
    for score in scores {
        let current = best.map_or(0.0, |b| b.fused_score);
        if score.fused_score > current {
            best = Some(score);
        }
    }
    best
}

/// Applies the decision rule to the winning hypothesis.
pub fn decide(best: Option<HypothesisScore>, username: &str) -> MatchResult {
    let (fused, descriptor, minutiae, angle) = match best {
        Some(score) => (
            score.fused_score,
            score.descriptor_score,
            score.minutiae_score,
            Some(score.angle),
        ),
        None => (0.0, 0.0, 0.0, None),
    };
    let matched = is_match(fused, descriptor, minutiae);
    MatchResult {
        status: if matched {
            MatchStatus::MatchFound
        } else {
            MatchStatus::NoMatch
        },
        is_match: matched,
        fused_score: fused,
        descriptor_score: descriptor,
        minutiae_score: minutiae,
        matched_username: Some(username.to_string()),
        best_angle: angle,
    }
}

/// Runs every rotation hypothesis (in parallel) and decides on the best one.
pub fn match_probe(
    probe: &GrayImage,
    template: &FingerprintTemplate,
    settings: &PipelineSettings,
) -> MatchResult {
    let hypotheses: Vec<Option<HypothesisScore>> = ROTATION_ANGLES
        .par_iter()
        .map(|&angle| {
            let rotated = rotate_about_center(probe, angle);
            let features = extract_features(&rotated, settings);
            let score = score_features(angle, &features, template);
            match &score {
                Some(s) => debug!(
                    angle,
                    descriptor_score = s.descriptor_score,
                    minutiae_score = s.minutiae_score,
                    fused_score = s.fused_score,
                    "hypothesis scored"
                ),
                None => debug!(angle, "hypothesis skipped: no descriptors"),
            }
            score
        })
        .collect();

    decide(select_best(hypotheses.into_iter().flatten()), &template.username)
}
