//! Pre-processing quality gate: rejects blurry captures and captures without
//! a visible ridge pattern before any expensive feature extraction happens.

use std::f64::consts::FRAC_PI_2;

use image::{GrayImage, Luma};
use imageproc::contours::BorderType;
use imageproc::geometry::contour_area;
use serde::Serialize;
use tracing::debug;

use super::filters::{clahe, correlate, foreground_contours, gabor_kernel, laplacian_variance};
use super::filters::{ClaheParams, GaborParams};

/// Captures whose Laplacian variance falls below this are rejected as blurry.
pub const BLUR_THRESHOLD: f64 = 5.0;
/// Minimum enclosed area of a ridge region for the capture to count as a finger.
pub const MIN_CONTOUR_AREA: f64 = 1000.0;

const RIDGE_BINARY_LEVEL: u8 = 50;
const PRESENCE_GABOR: GaborParams = GaborParams {
    size: 21,
    sigma: 4.0,
    theta: FRAC_PI_2,
    lambda: 10.0,
    gamma: 0.5,
    psi: 0.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    Ok,
    Blurry,
    NoFingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub verdict: QualityVerdict,
    pub laplacian_variance: f64,
    /// Number of outer ridge regions above [`MIN_CONTOUR_AREA`]; zero
    /// when the blur check already failed.
    pub large_contours: usize,
}

/// Runs the blur check, then the fingerprint presence check.
pub fn assess_quality(image: &GrayImage) -> QualityReport {
    let variance = laplacian_variance(image);
    if variance < BLUR_THRESHOLD {
        debug!(variance, "capture rejected as blurry");
        return QualityReport {
            verdict: QualityVerdict::Blurry,
            laplacian_variance: variance,
            large_contours: 0,
        };
    }

    let large_contours = count_large_contours(image);
    let verdict = if large_contours == 0 {
        QualityVerdict::NoFingerprint
    } else {
        QualityVerdict::Ok
    };
    debug!(variance, large_contours, ?verdict, "quality gate evaluated");
    QualityReport {
        verdict,
        laplacian_variance: variance,
        large_contours,
    }
}

pub fn is_blurry(image: &GrayImage) -> bool {
    laplacian_variance(image) < BLUR_THRESHOLD
}

pub fn has_fingerprint(image: &GrayImage) -> bool {
    count_large_contours(image) > 0
}

/// Counts outermost regions of strong fixed-orientation Gabor response whose outline
/// encloses more than [`MIN_CONTOUR_AREA`] square pixels.
pub fn count_large_contours(image: &GrayImage) -> usize {
    if image.width() == 0 || image.height() == 0 {
        return 0;
    }
    let equalized = clahe(image, ClaheParams::default());
    let response = correlate(&equalized, &gabor_kernel(&PRESENCE_GABOR)).to_saturated_gray();
    let mask = GrayImage::from_fn(response.width(), response.height(), |x, y| {
        Luma([if response.get_pixel(x, y)[0] > RIDGE_BINARY_LEVEL {
            255u8
        } else {
            0
        }])
    });

    foreground_contours(&mask)
        .into_iter()
        .filter(|contour| contour.parent.is_none() && contour.border_type == BorderType::Outer)
        .filter(|contour| contour_area(&contour.points).abs() > MIN_CONTOUR_AREA)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripes(size: u32, period: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |_, y| {
            let phase = (y % period) as f32 / period as f32;
            let value = 127.5 + 127.5 * (phase * std::f32::consts::TAU).cos();
            Luma([value as u8])
        })
    }

    #[test]
    fn uniform_image_is_blurry() {
        let flat = GrayImage::from_pixel(128, 128, Luma([140]));
        let report = assess_quality(&flat);
        assert_eq!(report.verdict, QualityVerdict::Blurry);
        assert_eq!(report.large_contours, 0);
        assert!(is_blurry(&flat));
    }

    #[test]
    fn ridge_pattern_passes_the_gate() {
        let ridges = stripes(512, 10);
        let report = assess_quality(&ridges);
        assert!(report.laplacian_variance >= BLUR_THRESHOLD);
        assert_eq!(report.verdict, QualityVerdict::Ok);
        assert!(has_fingerprint(&ridges));
    }

    #[test]
    fn response_touching_every_border_is_counted() {
        let image = GrayImage::from_fn(256, 256, |x, _| Luma([if x % 10 < 5 { 255 } else { 0 }]));
        assert_eq!(count_large_contours(&image), 1);
        assert_eq!(assess_quality(&image).verdict, QualityVerdict::Ok);
    }

    #[test]
    fn sharp_but_tiny_detail_has_no_fingerprint() {
        let mut image = GrayImage::from_pixel(128, 128, Luma([0]));
        for (x, y) in [(10, 10), (60, 90), (100, 30)] {
            image.put_pixel(x, y, Luma([255]));
        }
        let report = assess_quality(&image);
        assert!(report.laplacian_variance >= BLUR_THRESHOLD);
        assert_eq!(report.verdict, QualityVerdict::NoFingerprint);
    }
}
