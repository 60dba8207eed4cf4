//! Low-level image filters shared by the quality gate, the enhancer and the
//! rotation search in the matcher.
//!
//! Border handling follows the reflect-101 convention (`dcb|abcd|cba`) for
//! neighbourhood filters and edge replication for geometric resampling.

use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, Contour};
use imageproc::point::Point;
use rayon::prelude::*;

/// Maps an out-of-range index back into `0..len` using reflect-101 borders.
pub(crate) fn reflect_101(index: i64, len: i64) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Variance of the 4-neighbour Laplacian response over the whole image.
///
/// A uniform or heavily smoothed image scores close to zero.
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let (w, h) = (i64::from(width), i64::from(height));
    let raw = image.as_raw();
    let at = |x: i64, y: i64| f64::from(raw[reflect_101(y, h) * width as usize + reflect_101(x, w)]);

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let laplacian =
                at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
        }
    }

    let count = (w * h) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Contrast-limited adaptive histogram equalization settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    pub clip_limit: f32,
    pub tiles: u32,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles: 8,
        }
    }
}

/// Applies CLAHE: per-tile clipped histogram equalization with bilinear
/// blending between neighbouring tile lookup tables.
pub fn clahe(image: &GrayImage, params: ClaheParams) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tiles = params.tiles.max(1);
    let tile_w = width.div_ceil(tiles.min(width));
    let tile_h = height.div_ceil(tiles.min(height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(image, x0..x1, y0..y1, params.clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    GrayImage::from_fn(width, height, |x, y| {
        let (tx1, tx2, xa) = blend_axis(x, tile_w, tiles_x);
        let (ty1, ty2, ya) = blend_axis(y, tile_h, tiles_y);
        let value = usize::from(image.get_pixel(x, y)[0]);
        let top = lut_at(tx1, ty1)[value] * (1.0 - xa) + lut_at(tx2, ty1)[value] * xa;
        let bottom = lut_at(tx1, ty2)[value] * (1.0 - xa) + lut_at(tx2, ty2)[value] * xa;
        let blended = top * (1.0 - ya) + bottom * ya;
        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

fn blend_axis(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = pos as f32 / tile as f32 - 0.5;
    let lower = f.floor();
    let weight = f - lower;
    let first = lower.max(0.0) as u32;
    let second = ((lower as i64 + 1).max(0) as u32).min(tiles - 1);
    (first.min(tiles - 1), second, weight)
}

fn tile_lut(
    image: &GrayImage,
    xs: std::ops::Range<u32>,
    ys: std::ops::Range<u32>,
    clip_limit: f32,
) -> [f32; 256] {
    let mut hist = [0u32; 256];
    for y in ys.clone() {
        for x in xs.clone() {
            hist[usize::from(image.get_pixel(x, y)[0])] += 1;
        }
    }
    let area = (xs.len() * ys.len()) as u32;

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let batch = excess / 256;
        let mut residual = excess - batch * 256;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (256 / residual as usize).max(1);
            for bin in hist.iter_mut().step_by(step) {
                if residual == 0 {
                    break;
                }
                *bin += 1;
                residual -= 1;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0f32; 256];
    let mut cumulative = 0u32;
    for (slot, count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *slot = (cumulative as f32 * scale).round().min(255.0);
    }
    lut
}

/// Parameters of a real Gabor kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaborParams {
    pub size: u32,
    pub sigma: f64,
    pub theta: f64,
    pub lambda: f64,
    pub gamma: f64,
    pub psi: f64,
}

/// Square correlation kernel with odd side length.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Vec<f32>,
}

impl Kernel {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn weight(&self, x: usize, y: usize) -> f32 {
        self.weights[y * self.size + x]
    }
}

pub fn gabor_kernel(params: &GaborParams) -> Kernel {
    let half = (params.size / 2) as i64;
    let size = (2 * half + 1) as usize;
    let sigma_x = params.sigma;
    let sigma_y = params.sigma / params.gamma;
    let ex = -0.5 / (sigma_x * sigma_x);
    let ey = -0.5 / (sigma_y * sigma_y);
    let wave = 2.0 * std::f64::consts::PI / params.lambda;
    let (s, c) = params.theta.sin_cos();

    let mut weights = vec![0f32; size * size];
    for y in -half..=half {
        for x in -half..=half {
            let (xf, yf) = (x as f64, y as f64);
            let xr = xf * c + yf * s;
            let yr = -xf * s + yf * c;
            let value = (ex * xr * xr + ey * yr * yr).exp() * (wave * xr + params.psi).cos();
            let row = (half - y) as usize;
            let col = (half - x) as usize;
            weights[row * size + col] = value as f32;
        }
    }
    Kernel { size, weights }
}

/// Floating point filter response, one value per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl ResponseMap {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Keeps the per-pixel maximum of `self` and `other`.
    pub fn max_assign(&mut self, other: &ResponseMap) {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        for (mine, theirs) in self.values.iter_mut().zip(other.values.iter()) {
            *mine = mine.max(*theirs);
        }
    }

    /// Rounds and saturates every response into `0..=255`.
    pub fn to_saturated_gray(&self) -> GrayImage {
        self.to_gray(|v| v.round().clamp(0.0, 255.0) as u8)
    }

    /// Stretches the response range linearly onto `0..=255`, truncating.
    /// A flat response maps to black.
    pub fn to_normalized_gray(&self) -> GrayImage {
        let (min, max) = self
            .values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let span = max - min;
        if !span.is_finite() || span <= f32::EPSILON {
            return GrayImage::new(self.width, self.height);
        }
        let scale = 255.0 / span;
        self.to_gray(|v| ((v - min) * scale).clamp(0.0, 255.0) as u8)
    }

    fn to_gray(&self, convert: impl Fn(f32) -> u8) -> GrayImage {
        let width = self.width as usize;
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([convert(self.values[y as usize * width + x as usize])])
        })
    }
}

/// Correlates `image` with `kernel` using reflect-101 borders. Rows are
/// processed in parallel.
pub fn correlate(image: &GrayImage, kernel: &Kernel) -> ResponseMap {
    let (width, height) = image.dimensions();
    let mut response = ResponseMap::zeros(width, height);
    if width == 0 || height == 0 {
        return response;
    }

    let (w, h) = (width as usize, height as usize);
    let radius = kernel.size / 2;
    let padded_w = w + 2 * radius;
    let raw = image.as_raw();
    let mut padded = Vec::with_capacity(padded_w * (h + 2 * radius));
    for py in 0..h + 2 * radius {
        let sy = reflect_101(py as i64 - radius as i64, h as i64);
        for px in 0..padded_w {
            let sx = reflect_101(px as i64 - radius as i64, w as i64);
            padded.push(f32::from(raw[sy * w + sx]));
        }
    }

    response
        .values
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for ky in 0..kernel.size {
                    let start = (y + ky) * padded_w + x;
                    let src = &padded[start..start + kernel.size];
                    let weights = &kernel.weights[ky * kernel.size..(ky + 1) * kernel.size];
                    acc += weights.iter().zip(src).map(|(k, p)| k * p).sum::<f32>();
                }
                *out = acc;
            }
        });
    response
}

/// Contours of the non-zero pixels of `mask`, in `mask` coordinates. The
/// mask is framed with one background pixel first so a region touching the
/// image border still yields an outer contour.
pub fn foreground_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    let (width, height) = mask.dimensions();
    let mut framed = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut framed, mask, 1, 1);

    let mut contours = find_contours::<i32>(&framed);
    for contour in &mut contours {
        for point in &mut contour.points {
            point.x -= 1;
            point.y -= 1;
        }
    }
    contours
}

/// Axis-aligned bounding rectangle `(x, y, width, height)` of a point set.
pub fn bounding_rect(points: &[Point<i32>]) -> Option<(u32, u32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some((
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Rotates about `(width / 2, height / 2)` by `angle_degrees`
/// (counter-clockwise on screen), keeping the original size. Samples are
/// bilinear and pixels outside the source replicate the nearest edge.
pub fn rotate_about_center(image: &GrayImage, angle_degrees: f32) -> GrayImage {
    if angle_degrees == 0.0 {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let cx = (width / 2) as f32;
    let cy = (height / 2) as f32;
    let (sin, cos) = angle_degrees.to_radians().sin_cos();

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        Luma([sample_replicated(image, sx, sy)])
    })
}

fn sample_replicated(image: &GrayImage, x: f32, y: f32) -> u8 {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p = |px: u32, py: u32| f32::from(image.get_pixel(px, py)[0]);
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}
