//! Oriented FAST keypoints with steered BRIEF descriptors, and brute-force
//! Hamming matching with a mutual nearest neighbour check.

use std::cmp::Ordering;

use image::GrayImage;
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

pub const DESCRIPTOR_BYTES: usize = 32;
const DESCRIPTOR_BITS: usize = DESCRIPTOR_BYTES * 8;

/// 256-bit binary descriptor.
pub type LocalDescriptor = [u8; DESCRIPTOR_BYTES];

const PATTERN_SEED: u64 = 0x0b1f_5eed_7269_6467;
const PATTERN_EXTENT: i32 = 13;
const ORIENTATION_RADIUS: i32 = 15;
const HARRIS_HALF_BLOCK: i32 = 3;
const HARRIS_K: f32 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TestPair {
    first: (i32, i32),
    second: (i32, i32),
}

/// Detector and descriptor parameters. Built once; the sampling pattern is
/// derived from a fixed seed so descriptors stay comparable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbConfig {
    pub max_features: usize,
    pub fast_threshold: u8,
    /// Keypoints closer than this to any border are discarded.
    pub edge_threshold: u32,
    /// Gaussian sigma applied before the intensity tests.
    pub smoothing_sigma: f32,
    pattern: Vec<TestPair>,
}

impl OrbConfig {
    pub fn new(max_features: usize, fast_threshold: u8) -> Self {
        Self {
            max_features,
            fast_threshold,
            edge_threshold: 31,
            smoothing_sigma: 2.0,
            pattern: sampling_pattern(PATTERN_SEED),
        }
    }
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self::new(600, 20)
    }
}

fn sampling_pattern(seed: u64) -> Vec<TestPair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = Vec::with_capacity(DESCRIPTOR_BITS);
    while pairs.len() < DESCRIPTOR_BITS {
        let mut point = || {
            (
                rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT),
                rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT),
            )
        };
        let first = point();
        let second = point();
        if first != second {
            pairs.push(TestPair { first, second });
        }
    }
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    pub response: f32,
    /// Orientation in radians.
    pub angle: f32,
}

/// Detects up to `max_features` keypoints and describes each one. An image
/// without usable corners yields two empty vectors.
pub fn extract_descriptors(
    image: &GrayImage,
    config: &OrbConfig,
) -> (Vec<Keypoint>, Vec<LocalDescriptor>) {
    let keypoints = detect_keypoints(image, config);
    if keypoints.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let smoothed = gaussian_blur_f32(image, config.smoothing_sigma);
    let descriptors: Vec<LocalDescriptor> = keypoints
        .par_iter()
        .map(|keypoint| describe(&smoothed, keypoint, &config.pattern))
        .collect();
    debug!(keypoints = keypoints.len(), "descriptors extracted");
    (keypoints, descriptors)
}

/// FAST-9 corners away from the border, ranked by Harris response (ties in
/// raster order) and oriented by intensity centroid.
pub fn detect_keypoints(image: &GrayImage, config: &OrbConfig) -> Vec<Keypoint> {
    let (width, height) = image.dimensions();
    let edge = config.edge_threshold;
    if width <= 2 * edge || height <= 2 * edge {
        return Vec::new();
    }

    let mut corners = suppress_non_maxima(corners_fast9(image, config.fast_threshold), width, height);
    corners.sort_by_key(|corner| (corner.y, corner.x));

    let mut keypoints: Vec<Keypoint> = corners
        .into_iter()
        .filter(|c| c.x >= edge && c.y >= edge && c.x < width - edge && c.y < height - edge)
        .map(|c| Keypoint {
            x: c.x,
            y: c.y,
            response: harris_response(image, c.x, c.y),
            angle: 0.0,
        })
        .collect();
    keypoints.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(Ordering::Equal));
    keypoints.truncate(config.max_features);

    for keypoint in &mut keypoints {
        keypoint.angle = intensity_centroid_angle(image, keypoint.x, keypoint.y);
    }
    keypoints
}

/// Keeps corners that beat their 3x3 neighbourhood. Equal scores go to the
/// corner earlier in raster order, so a plateau keeps exactly its first member.
fn suppress_non_maxima(corners: Vec<Corner>, width: u32, height: u32) -> Vec<Corner> {
    let w = width as usize;
    let mut scores = vec![0f32; w * height as usize];
    for corner in &corners {
        scores[corner.y as usize * w + corner.x as usize] = corner.score;
    }
    corners
        .into_iter()
        .filter(|corner| {
            let (x, y) = (i64::from(corner.x), i64::from(corner.y));
            (-1..=1i64).all(|dy| {
                (-1..=1i64).all(|dx| {
                    let (nx, ny) = (x + dx, y + dy);
                    if (dx == 0 && dy == 0)
                        || nx < 0
                        || ny < 0
                        || nx >= i64::from(width)
                        || ny >= i64::from(height)
                    {
                        return true;
                    }
                    let neighbour = scores[ny as usize * w + nx as usize];
                    if (dy, dx) < (0, 0) {
                        corner.score > neighbour
                    } else {
                        corner.score >= neighbour
                    }
                })
            })
        })
        .collect()
}

fn harris_response(image: &GrayImage, x: u32, y: u32) -> f32 {
    let p = |px: i32, py: i32| f32::from(image.get_pixel(px as u32, py as u32)[0]);
    let (cx, cy) = (x as i32, y as i32);
    let (mut a, mut b, mut c) = (0f32, 0f32, 0f32);
    for py in cy - HARRIS_HALF_BLOCK..=cy + HARRIS_HALF_BLOCK {
        for px in cx - HARRIS_HALF_BLOCK..=cx + HARRIS_HALF_BLOCK {
            let ix = (p(px + 1, py - 1) + 2.0 * p(px + 1, py) + p(px + 1, py + 1))
                - (p(px - 1, py - 1) + 2.0 * p(px - 1, py) + p(px - 1, py + 1));
            let iy = (p(px - 1, py + 1) + 2.0 * p(px, py + 1) + p(px + 1, py + 1))
                - (p(px - 1, py - 1) + 2.0 * p(px, py - 1) + p(px + 1, py - 1));
            a += ix * ix;
            b += iy * iy;
            c += ix * iy;
        }
    }
    a * b - c * c - HARRIS_K * (a + b) * (a + b)
}

fn intensity_centroid_angle(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (mut m01, mut m10) = (0f32, 0f32);
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let px = (x as i32 + dx) as u32;
            let py = (y as i32 + dy) as u32;
            let intensity = f32::from(image.get_pixel(px, py)[0]);
            m01 += intensity * dy as f32;
            m10 += intensity * dx as f32;
        }
    }
    m01.atan2(m10)
}

fn describe(image: &GrayImage, keypoint: &Keypoint, pattern: &[TestPair]) -> LocalDescriptor {
    let (sin, cos) = keypoint.angle.sin_cos();
    let (max_x, max_y) = (image.width() as i32 - 1, image.height() as i32 - 1);
    let sample = |(dx, dy): (i32, i32)| {
        let rx = (dx as f32 * cos - dy as f32 * sin).round() as i32;
        let ry = (dx as f32 * sin + dy as f32 * cos).round() as i32;
        let px = (keypoint.x as i32 + rx).clamp(0, max_x) as u32;
        let py = (keypoint.y as i32 + ry).clamp(0, max_y) as u32;
        image.get_pixel(px, py)[0]
    };

    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (byte, tests) in descriptor.iter_mut().zip(pattern.chunks(8)) {
        for (bit, test) in tests.iter().enumerate() {
            if sample(test.first) < sample(test.second) {
                *byte |= 1 << bit;
            }
        }
    }
    descriptor
}

pub fn hamming_distance(a: &LocalDescriptor, b: &LocalDescriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Index pairs `(query, train)` where each descriptor is the other's nearest
/// neighbour by Hamming distance. Ties pick the lowest index.
pub fn cross_checked_matches(
    query: &[LocalDescriptor],
    train: &[LocalDescriptor],
) -> Vec<(usize, usize)> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let distances: Vec<Vec<u32>> = query
        .par_iter()
        .map(|q| train.iter().map(|t| hamming_distance(q, t)).collect())
        .collect();

    let mut best_query = vec![(u32::MAX, 0usize); train.len()];
    for (qi, row) in distances.iter().enumerate() {
        for (ti, &distance) in row.iter().enumerate() {
            if distance < best_query[ti].0 {
                best_query[ti] = (distance, qi);
            }
        }
    }

    distances
        .iter()
        .enumerate()
        .filter_map(|(qi, row)| {
            let ti = first_min_index(row)?;
            (best_query[ti].1 == qi).then_some((qi, ti))
        })
        .collect()
}

fn first_min_index(values: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if best.map_or(true, |(_, current)| value < current) {
            best = Some((index, value));
        }
    }
    best.map(|(index, _)| index)
}
