//! Ridge skeleton: Otsu binarization followed by Zhang-Suen thinning.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;

/// Binary ridge map one pixel wide, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Skeleton {
    /// Wraps a row-major mask. Returns `None` when the length does not match.
    pub fn from_mask(width: u32, height: u32, pixels: Vec<bool>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether `(row, col)` is a ridge pixel; out-of-range reads as off.
    pub fn is_on(&self, row: i64, col: i64) -> bool {
        if row < 0 || col < 0 || row >= i64::from(self.height) || col >= i64::from(self.width) {
            return false;
        }
        self.pixels[row as usize * self.width as usize + col as usize]
    }

    pub fn on_count(&self) -> usize {
        self.pixels.iter().filter(|on| **on).count()
    }

    /// Renders ridge pixels as 255 on a black background.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.is_on(i64::from(y), i64::from(x)) {
                255
            } else {
                0
            }])
        })
    }
}

/// Foreground mask of pixels strictly brighter than the Otsu level.
pub fn binarize(image: &GrayImage) -> Vec<bool> {
    let level = otsu_level(image);
    image.pixels().map(|p| p[0] > level).collect()
}

pub fn skeletonize(image: &GrayImage) -> Skeleton {
    let (width, height) = image.dimensions();
    let mut pixels = binarize(image);
    thin(&mut pixels, width as usize, height as usize);
    Skeleton {
        width,
        height,
        pixels,
    }
}

/// Zhang-Suen thinning in place, followed by staircase removal. Repeats
/// until neither step deletes anything, so a thinned mask is a fixed point.
fn thin(pixels: &mut [bool], width: usize, height: usize) {
    loop {
        zhang_suen(pixels, width, height);
        if remove_staircases(pixels, width, height) == 0 {
            break;
        }
    }
}

fn zhang_suen(pixels: &mut [bool], width: usize, height: usize) {
    let mut marked = Vec::new();
    loop {
        let mut changed = false;
        for step in 0..2 {
            marked.clear();
            for row in 0..height {
                for col in 0..width {
                    if pixels[row * width + col] && deletable(pixels, width, height, row, col, step)
                    {
                        marked.push(row * width + col);
                    }
                }
            }
            for &index in &marked {
                pixels[index] = false;
            }
            changed |= !marked.is_empty();
        }
        if !changed {
            break;
        }
    }
}

/// Deletes the inner corner of every L-shaped step: two orthogonal
/// neighbours on while the opposite side (both orthogonals and the diagonal
/// between them) is off. The two on neighbours stay 8-connected through
/// their shared diagonal. Runs sequentially so each deletion is seen by the
/// next test. Returns the number of pixels removed.
fn remove_staircases(pixels: &mut [bool], width: usize, height: usize) -> usize {
    let mut removed = 0;
    for row in 0..height {
        for col in 0..width {
            if !pixels[row * width + col] {
                continue;
            }
            let [n, ne, e, se, s, sw, w, nw] = neighbourhood(pixels, width, height, row, col);
            let corner = (n && e && !s && !w && !sw)
                || (e && s && !n && !w && !nw)
                || (s && w && !n && !e && !ne)
                || (w && n && !s && !e && !se);
            if corner {
                pixels[row * width + col] = false;
                removed += 1;
            }
        }
    }
    removed
}

/// P2..P9 clockwise from north; out-of-range reads as off.
fn neighbourhood(pixels: &[bool], width: usize, height: usize, row: usize, col: usize) -> [bool; 8] {
    let at = |dr: isize, dc: isize| -> bool {
        let r = row as isize + dr;
        let c = col as isize + dc;
        r >= 0
            && c >= 0
            && (r as usize) < height
            && (c as usize) < width
            && pixels[r as usize * width + c as usize]
    };
    [
        at(-1, 0),
        at(-1, 1),
        at(0, 1),
        at(1, 1),
        at(1, 0),
        at(1, -1),
        at(0, -1),
        at(-1, -1),
    ]
}

fn deletable(pixels: &[bool], width: usize, height: usize, row: usize, col: usize, step: u8) -> bool {
    let ring = neighbourhood(pixels, width, height, row, col);
    let neighbours = ring.iter().filter(|on| **on).count();
    if !(2..=6).contains(&neighbours) {
        return false;
    }
    let transitions = (0..8).filter(|&i| !ring[i] && ring[(i + 1) % 8]).count();
    if transitions != 1 {
        return false;
    }
    let (p2, p4, p6, p8) = (ring[0], ring[2], ring[4], ring[6]);
    if step == 0 {
        !(p2 && p4 && p6) && !(p4 && p6 && p8)
    } else {
        !(p2 && p4 && p8) && !(p2 && p6 && p8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thick_cross() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            let vertical = (28..36).contains(&x) && (8..56).contains(&y);
            let horizontal = (28..36).contains(&y) && (8..56).contains(&x);
            Luma([if vertical || horizontal { 230 } else { 20 }])
        })
    }

    #[test]
    fn skeleton_is_a_thin_subset_of_the_ridges() {
        let image = thick_cross();
        let foreground = binarize(&image);
        let skeleton = skeletonize(&image);
        let ridge_pixels = foreground.iter().filter(|on| **on).count();
        assert!(skeleton.on_count() > 0);
        assert!(skeleton.on_count() * 4 < ridge_pixels);
        for row in 0..64i64 {
            for col in 0..64i64 {
                if skeleton.is_on(row, col) {
                    assert!(foreground[(row * 64 + col) as usize]);
                }
            }
        }
    }

    #[test]
    fn skeletonization_is_idempotent() {
        let first = skeletonize(&thick_cross());
        let second = skeletonize(&first.to_image());
        assert_eq!(first, second);
    }

    fn thick_ring() -> GrayImage {
        GrayImage::from_fn(128, 128, |x, y| {
            let distance = (f64::from(x) - 63.5).hypot(f64::from(y) - 63.5);
            Luma([if (36.0..=44.0).contains(&distance) { 230 } else { 20 }])
        })
    }

    fn neighbour_count(skeleton: &Skeleton, row: i64, col: i64) -> usize {
        (-1..=1i64)
            .flat_map(|dr| (-1..=1i64).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| (dr, dc) != (0, 0) && skeleton.is_on(row + dr, col + dc))
            .count()
    }

    #[test]
    fn curved_ridge_thins_to_single_pixel_width() {
        let skeleton = skeletonize(&thick_ring());
        assert!(skeleton.on_count() > 100);
        for row in 0..128i64 {
            for col in 0..128i64 {
                if skeleton.is_on(row, col) {
                    assert_eq!(neighbour_count(&skeleton, row, col), 2, "pixel ({row}, {col})");
                }
            }
        }
        assert!(crate::fingerprint::minutiae::classify(&skeleton, false).is_empty());
    }

    #[test]
    fn staircase_corner_is_removed_without_splitting() {
        let mut pixels = vec![false; 25];
        for index in [2 * 5 + 1, 2 * 5 + 2, 5 + 2, 5 + 3] {
            pixels[index] = true;
        }
        assert_eq!(remove_staircases(&mut pixels, 5, 5), 1);
        assert_eq!(pixels.iter().filter(|on| **on).count(), 3);
        assert!(pixels[2 * 5 + 1] && pixels[5 + 3]);
    }

    #[test]
    fn empty_image_has_empty_skeleton() {
        let skeleton = skeletonize(&GrayImage::new(16, 16));
        assert_eq!(skeleton.on_count(), 0);
    }

    #[test]
    fn from_mask_checks_length() {
        assert!(Skeleton::from_mask(3, 2, vec![false; 6]).is_some());
        assert!(Skeleton::from_mask(3, 2, vec![false; 5]).is_none());
    }
}
