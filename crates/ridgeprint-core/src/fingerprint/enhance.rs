//! Ridge enhancement: normalizes size and contrast, then emphasizes ridges
//! with a bank of oriented Gabor filters.

use std::f64::consts::PI;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contrast::{equalize_histogram, otsu_level};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::contour_area;
use tracing::debug;

use super::filters::{bounding_rect, clahe, correlate, foreground_contours, gabor_kernel};
use super::filters::{ClaheParams, GaborParams, ResponseMap};
use super::settings::PipelineSettings;

/// Side length of the square working canvas.
pub const WORKING_SIZE: u32 = 512;
/// Sigma matching a 5x5 Gaussian kernel with automatic sigma.
pub const SMOOTHING_SIGMA: f32 = 1.1;
pub const GABOR_ORIENTATIONS: u32 = 8;

const BANK_KERNEL: GaborParams = GaborParams {
    size: 31,
    sigma: 4.0,
    theta: 0.0,
    lambda: 10.0,
    gamma: 0.5,
    psi: 0.0,
};

/// Produces the ridge image every later stage works on.
pub fn enhance(image: &GrayImage, settings: &PipelineSettings) -> GrayImage {
    let resized = imageops::resize(image, WORKING_SIZE, WORKING_SIZE, FilterType::Triangle);
    let equalized = equalize_histogram(&clahe(&resized, ClaheParams::default()));
    let smoothed = gaussian_blur_f32(&equalized, SMOOTHING_SIGMA);

    let filtered = if settings.use_gabor {
        gabor_bank(&smoothed)
    } else {
        smoothed
    };

    if settings.use_roi {
        crop_to_foreground(&filtered)
    } else {
        filtered
    }
}

/// Per-pixel maximum over [`GABOR_ORIENTATIONS`] evenly spaced orientations,
/// floored at zero and stretched onto the full 8-bit range.
pub fn gabor_bank(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut strongest = ResponseMap::zeros(width, height);
    for k in 0..GABOR_ORIENTATIONS {
        let params = GaborParams {
            theta: f64::from(k) * PI / f64::from(GABOR_ORIENTATIONS),
            ..BANK_KERNEL
        };
        strongest.max_assign(&correlate(image, &gabor_kernel(&params)));
    }
    strongest.to_normalized_gray()
}

/// Crops to the bounding box of the largest outer foreground contour after
/// Otsu binarization. Returns the input unchanged when nothing is found.
pub fn crop_to_foreground(image: &GrayImage) -> GrayImage {
    let blurred = gaussian_blur_f32(image, SMOOTHING_SIGMA);
    let level = otsu_level(&blurred);
    let mask = GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        Luma([if blurred.get_pixel(x, y)[0] > level { 255u8 } else { 0 }])
    });

    let largest = foreground_contours(&mask)
        .into_iter()
        .filter(|contour| contour.parent.is_none())
        .map(|contour| (contour_area(&contour.points).abs(), contour))
        .fold(None, |best: Option<(f64, _)>, candidate| match best {
            Some(current) if current.0 >= candidate.0 => Some(current),
            _ => Some(candidate),
        });

    let Some((area, contour)) = largest else {
        return image.clone();
    };
    let Some((x, y, w, h)) = bounding_rect(&contour.points) else {
        return image.clone();
    };
    debug!(x, y, w, h, area, "cropping to foreground");
    imageops::crop_imm(image, x, y, w, h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
    }

    #[test]
    fn output_is_working_size_without_roi() {
        let settings = PipelineSettings::default();
        let out = enhance(&ramp(300, 420), &settings);
        assert_eq!(out.dimensions(), (WORKING_SIZE, WORKING_SIZE));
    }

    #[test]
    fn enhancement_is_deterministic() {
        let settings = PipelineSettings::default();
        let input = ramp(200, 200);
        assert_eq!(enhance(&input, &settings), enhance(&input, &settings));
    }

    #[test]
    fn gabor_bank_spans_full_range() {
        let stripes = GrayImage::from_fn(96, 96, |x, _| Luma([if x % 10 < 5 { 30 } else { 220 }]));
        let out = gabor_bank(&stripes);
        let max = out.pixels().map(|p| p[0]).max().unwrap_or(0);
        let min = out.pixels().map(|p| p[0]).min().unwrap_or(255);
        assert!(max >= 254);
        assert_eq!(min, 0);
    }

    #[test]
    fn roi_crops_to_bright_block() {
        let mut image = GrayImage::from_pixel(100, 80, Luma([10]));
        for y in 20..50 {
            for x in 30..70 {
                image.put_pixel(x, y, Luma([240]));
            }
        }
        let cropped = crop_to_foreground(&image);
        let (w, h) = cropped.dimensions();
        assert!(w < 100 && h < 80);
        assert!((36..=46).contains(&w), "width {w}");
        assert!((26..=36).contains(&h), "height {h}");
    }

    #[test]
    fn roi_without_foreground_returns_input() {
        let flat = GrayImage::from_pixel(40, 40, Luma([0]));
        assert_eq!(crop_to_foreground(&flat), flat);
    }
}
