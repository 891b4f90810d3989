//! Pixel-level measurements and transforms on 8-bit grayscale pages.

use std::borrow::Cow;

use image::imageops::FilterType;
use image::{GrayImage, Luma};

/// Upscale pages narrower than this. Recognizers lose accuracy below ~20px x-height.
const UPSCALE_TARGET_WIDTH: u32 = 1800;
const MAX_UPSCALE_FACTOR: f32 = 3.0;

/// Bradley threshold: a pixel is ink when it is this many percent darker
/// than its neighbourhood mean.
const BINARIZE_SENSITIVITY: u32 = 15;

/// Laplacian variance with the 3x3 kernel `[0,1,0; 1,-4,1; 0,1,0]`.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = img.get_pixel(x, y).0[0] as f64;
            let top = img.get_pixel(x, y - 1).0[0] as f64;
            let bottom = img.get_pixel(x, y + 1).0[0] as f64;
            let left = img.get_pixel(x - 1, y).0[0] as f64;
            let right = img.get_pixel(x + 1, y).0[0] as f64;

            let laplacian = top + bottom + left + right - 4.0 * center;
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

/// Skew estimate by projection profile over -5..=5 degrees in 0.25 steps.
///
/// Positive angles mean text lines descend to the right. Returns `None` for
/// tiny images, pages with < 2% ink, or angles under 0.5 degrees.
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 50 || h < 50 {
        return None;
    }

    let ink_threshold = 128u8;
    let mut ink: Vec<(u32, u32)> = Vec::new();
    let mut dark_count = 0usize;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[0] < ink_threshold {
            dark_count += 1;
            // Subsample every other column for speed
            if x % 2 == 0 {
                ink.push((x, y));
            }
        }
    }
    if (dark_count as f32 / (w * h) as f32) < 0.02 {
        return None;
    }

    let mut best_angle = 0.0f32;
    let mut best_score = f64::NEG_INFINITY;

    for step in 0..=40 {
        let angle = -5.0 + step as f32 * 0.25;
        let score = projection_score(&ink, w, h, angle);
        // Strict comparison keeps the angle closest to -5 on exact ties;
        // prefer zero explicitly so flat pages stay untouched.
        if score > best_score || (score == best_score && angle.abs() < best_angle.abs()) {
            best_score = score;
            best_angle = angle;
        }
    }

    if best_angle.abs() < 0.5 {
        None
    } else {
        Some(best_angle)
    }
}

/// Sum of squared differences between adjacent bins of the ink histogram
/// projected along lines of slope `tan(angle)`. Crisp text rows score high.
fn projection_score(ink: &[(u32, u32)], w: u32, h: u32, angle_deg: f32) -> f64 {
    let tan_a = (angle_deg as f64).to_radians().tan();
    let margin = (w as f64 * tan_a.abs()).ceil() as i64 + 1;
    let bins = h as i64 + 2 * margin;
    let mut histogram = vec![0u32; bins.max(1) as usize];

    for &(x, y) in ink {
        let row = (y as f64 - x as f64 * tan_a).round() as i64 + margin;
        if (0..bins).contains(&row) {
            histogram[row as usize] += 1;
        }
    }

    histogram
        .windows(2)
        .map(|pair| {
            let diff = pair[1] as f64 - pair[0] as f64;
            diff * diff
        })
        .sum()
}

/// RMS contrast: standard deviation of pixel intensities.
pub fn compute_contrast_score(img: &GrayImage) -> f32 {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let val = pixel.0[0] as f64;
        sum += val;
        sum_sq += val * val;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0).sqrt() as f32
}

/// Noise estimate: std dev of the median block among the smoothest quartile
/// of 5x5 blocks.
pub fn assess_noise_level(img: &GrayImage) -> f32 {
    let (w, h) = img.dimensions();
    let block = 5u32;
    if w < block || h < block {
        return 0.0;
    }

    let mut variances = Vec::new();
    let mut y = 0;
    while y + block <= h {
        let mut x = 0;
        while x + block <= w {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for by in 0..block {
                for bx in 0..block {
                    let val = img.get_pixel(x + bx, y + by).0[0] as f64;
                    sum += val;
                    sum_sq += val * val;
                }
            }
            let n = (block * block) as f64;
            let mean = sum / n;
            variances.push(((sum_sq / n) - mean * mean).max(0.0) as f32);
            x += block;
        }
        y += block;
    }

    variances.sort_by(|a, b| a.total_cmp(b));
    let quartile_end = (variances.len() / 4).max(1);
    variances[quartile_end / 2].sqrt()
}

/// Linear stretch between the 1st and 99th intensity percentiles.
/// Returns whether any pixel changed.
pub fn stretch_contrast(img: &mut GrayImage) -> bool {
    let total = (img.width() as u64) * (img.height() as u64);
    if total == 0 {
        return false;
    }

    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let clip = total / 100;
    let lo = clipped_bound(&histogram, clip, 0..256).unwrap_or(0);
    let hi = clipped_bound(&histogram, clip, (0..256).rev()).unwrap_or(255);
    if hi <= lo || (lo == 0 && hi == 255) {
        return false;
    }

    let span = (hi - lo) as f32;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let scaled = (v as f32 - lo as f32) * 255.0 / span;
        *out = scaled.round().clamp(0.0, 255.0) as u8;
    }
    for p in img.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    true
}

/// First intensity, walking `order`, at which the running count passes `clip`.
fn clipped_bound(
    histogram: &[u64; 256],
    clip: u64,
    order: impl Iterator<Item = usize>,
) -> Option<u8> {
    let mut acc = 0u64;
    for v in order {
        acc += histogram[v];
        if acc > clip {
            return Some(v as u8);
        }
    }
    None
}

/// Edge-preserving smoothing (range-weighted box).
pub fn apply_bilateral_approximation(img: &GrayImage, radius: u32, range_sigma: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut output = GrayImage::new(w, h);
    let range_sigma_sq_2 = 2.0 * range_sigma * range_sigma;

    for y in 0..h {
        for x in 0..w {
            let center = img.get_pixel(x, y).0[0] as f32;
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;

            for ny in y.saturating_sub(radius)..(y + radius + 1).min(h) {
                for nx in x.saturating_sub(radius)..(x + radius + 1).min(w) {
                    let value = img.get_pixel(nx, ny).0[0] as f32;
                    let diff = value - center;
                    let weight = (-(diff * diff) / range_sigma_sq_2).exp();
                    sum += value * weight;
                    weight_sum += weight;
                }
            }

            let out = if weight_sum > 0.0 {
                (sum / weight_sum).round().clamp(0.0, 255.0) as u8
            } else {
                center as u8
            };
            output.put_pixel(x, y, Luma([out]));
        }
    }

    output
}

/// Rotate about the centre so that lines sloping by `angle_deg` become
/// horizontal. Bilinear sampling, white fill outside the source.
pub fn rotate_gray(img: &GrayImage, angle_deg: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut output = GrayImage::from_pixel(w, h, Luma([255]));
    if w == 0 || h == 0 {
        return output;
    }

    let (sin_a, cos_a) = (angle_deg as f64).to_radians().sin_cos();
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;

    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let sx = cx + dx * cos_a - dy * sin_a;
            let sy = cy + dx * sin_a + dy * cos_a;
            if let Some(v) = sample_bilinear(img, sx, sy) {
                output.put_pixel(x, y, Luma([v]));
            }
        }
    }

    output
}

fn sample_bilinear(img: &GrayImage, x: f64, y: f64) -> Option<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p = |px: u32, py: u32| img.get_pixel(px, py).0[0] as f64;
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    Some((top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8)
}

/// Upscale narrow pages toward `UPSCALE_TARGET_WIDTH`, at most `MAX_UPSCALE_FACTOR`.
/// Returns `None` when the page is already wide enough.
pub fn upscale_small(img: &GrayImage) -> Option<GrayImage> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || w >= UPSCALE_TARGET_WIDTH {
        return None;
    }
    let factor = (UPSCALE_TARGET_WIDTH as f32 / w as f32).min(MAX_UPSCALE_FACTOR);
    if factor <= 1.0 {
        return None;
    }
    let new_w = (w as f32 * factor).round() as u32;
    let new_h = (h as f32 * factor).round() as u32;
    Some(image::imageops::resize(img, new_w, new_h, FilterType::CatmullRom))
}

/// Bradley-Roth adaptive threshold over an integral image.
/// Window is 1/8 of the page width.
pub fn binarize_adaptive(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let stride = (w + 1) as usize;
    let mut integral = vec![0u64; stride * (h + 1) as usize];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            integral[idx] = integral[idx - stride] + row_sum;
        }
    }

    let half = ((w / 8).max(2) / 2) as i64;
    let mut output = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let x0 = (x as i64 - half).max(0) as usize;
            let y0 = (y as i64 - half).max(0) as usize;
            let x1 = ((x as i64 + half).min(w as i64 - 1) + 1) as usize;
            let y1 = ((y as i64 + half).min(h as i64 - 1) + 1) as usize;
            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];

            let value = img.get_pixel(x, y).0[0] as u64;
            let ink = value * count * 100 <= sum * (100 - BINARIZE_SENSITIVITY as u64);
            output.put_pixel(x, y, Luma([if ink { 0 } else { 255 }]));
        }
    }

    output
}

/// Aspect-preserving copy whose longest side is at most `max_dim`.
pub fn downscale_view(img: &GrayImage, max_dim: u32) -> Cow<'_, GrayImage> {
    let (w, h) = img.dimensions();
    let largest = w.max(h);
    if largest <= max_dim {
        return Cow::Borrowed(img);
    }
    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);
    Cow::Owned(image::imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::fixtures::make_lined_page;

    // ── Analysis ──

    #[test]
    fn laplacian_sharp_image_high_variance() {
        let mut img = GrayImage::new(100, 100);
        for y in 0..100 {
            for x in 0..100 {
                let val = if (x + y) % 2 == 0 { 0u8 } else { 255u8 };
                img.put_pixel(x, y, Luma([val]));
            }
        }
        let variance = compute_laplacian_variance(&img);
        assert!(variance > 1000.0, "Checkerboard should have high variance, got {variance}");
    }

    #[test]
    fn laplacian_uniform_and_tiny() {
        let img = GrayImage::from_pixel(100, 100, Luma([128]));
        assert!(compute_laplacian_variance(&img) < 1.0);
        assert_eq!(compute_laplacian_variance(&GrayImage::new(2, 2)), 0.0);
    }

    #[test]
    fn contrast_scores() {
        let mut img = GrayImage::new(100, 100);
        for y in 0..100 {
            for x in 0..100 {
                img.put_pixel(x, y, Luma([if x < 50 { 0 } else { 255 }]));
            }
        }
        assert!(compute_contrast_score(&img) > 100.0);
        assert!(compute_contrast_score(&GrayImage::from_pixel(50, 50, Luma([128]))) < 1.0);
        assert_eq!(compute_contrast_score(&GrayImage::new(0, 0)), 0.0);
    }

    #[test]
    fn skew_none_for_blank_or_tiny() {
        assert!(detect_skew_angle(&GrayImage::from_pixel(200, 200, Luma([255]))).is_none());
        assert!(detect_skew_angle(&GrayImage::new(10, 10)).is_none());
    }

    #[test]
    fn skew_straight_lines_not_reported() {
        let img = make_lined_page(400, 0.0);
        assert!(detect_skew_angle(&img).is_none());
    }

    #[test]
    fn skew_detects_sloped_lines() {
        let img = make_lined_page(400, 3.0);
        let angle = detect_skew_angle(&img).expect("skew should be detected");
        assert!((angle - 3.0).abs() <= 0.5, "Expected ~3 degrees, got {angle}");
    }

    #[test]
    fn deskew_straightens_sloped_lines() {
        let img = make_lined_page(400, 3.0);
        let angle = detect_skew_angle(&img).unwrap();
        let straightened = rotate_gray(&img, angle);
        match detect_skew_angle(&straightened) {
            None => {}
            Some(a) => assert!(a.abs() < 1.0, "Residual skew too large: {a}"),
        }
    }

    #[test]
    fn noise_levels() {
        let clean = GrayImage::from_pixel(100, 100, Luma([128]));
        assert!(assess_noise_level(&clean) < 5.0);

        let mut noisy = clean.clone();
        for y in 0..100 {
            for x in 0..100 {
                if (x * 7 + y * 13) % 3 == 0 {
                    noisy.put_pixel(x, y, Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
                }
            }
        }
        assert!(assess_noise_level(&noisy) > 10.0);
        assert_eq!(assess_noise_level(&GrayImage::new(3, 3)), 0.0);
    }

    #[test]
    fn stretch_expands_narrow_range() {
        let mut img = GrayImage::new(100, 1);
        for x in 0..100 {
            img.put_pixel(x, 0, Luma([100 + (x as u8) / 2]));
        }
        assert!(stretch_contrast(&mut img));
        let min = img.pixels().map(|p| p.0[0]).min().unwrap();
        let max = img.pixels().map(|p| p.0[0]).max().unwrap();
        assert!(min < 10, "min {min}");
        assert!(max > 245, "max {max}");
    }

    #[test]
    fn stretch_skips_full_range_and_uniform() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([255]));
        assert!(!stretch_contrast(&mut img));

        let mut uniform = GrayImage::from_pixel(10, 10, Luma([90]));
        assert!(!stretch_contrast(&mut uniform));
    }

    #[test]
    fn bilateral_preserves_uniform_and_edges() {
        let uniform = GrayImage::from_pixel(20, 20, Luma([150]));
        let out = apply_bilateral_approximation(&uniform, 2, 25.0);
        assert!(out.pixels().all(|p| p.0[0] == 150));

        let mut edge = GrayImage::new(20, 20);
        for y in 0..20 {
            for x in 0..20 {
                edge.put_pixel(x, y, Luma([if x < 10 { 0 } else { 255 }]));
            }
        }
        let out = apply_bilateral_approximation(&edge, 2, 25.0);
        assert!(out.get_pixel(5, 10).0[0] < 10);
        assert!(out.get_pixel(15, 10).0[0] > 245);
    }

    #[test]
    fn upscale_small_pages_only() {
        let small = GrayImage::new(300, 400);
        let up = upscale_small(&small).unwrap();
        assert_eq!(up.dimensions(), (900, 1200), "capped at 3x");

        let mid = GrayImage::new(1200, 1600);
        let up = upscale_small(&mid).unwrap();
        assert_eq!(up.width(), 1800);

        assert!(upscale_small(&GrayImage::new(2000, 2000)).is_none());
    }

    #[test]
    fn binarize_outputs_two_levels() {
        let img = make_lined_page(200, 0.0);
        let bin = binarize_adaptive(&img);
        assert!(bin.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(bin.get_pixel(100, 21).0[0], 0, "line pixel stays ink");
        assert_eq!(bin.get_pixel(100, 40).0[0], 255, "background stays white");
    }

    #[test]
    fn downscale_view_borrows_small_pages() {
        let small = GrayImage::new(800, 600);
        assert!(matches!(downscale_view(&small, 1000), Cow::Borrowed(_)));

        let large = GrayImage::new(4000, 2000);
        assert_eq!(downscale_view(&large, 1000).dimensions(), (1000, 500));
    }
}
