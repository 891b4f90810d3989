//! Raster preprocessing for OCR input.
//!
//! `PreprocessingPipeline` works on 8-bit grayscale and runs, in order:
//! EXIF orientation, grayscale, contrast stretch, conditional denoise,
//! deskew, upscale, adaptive binarization. Every stage after orientation is
//! toggled by `PreprocessOptions`.
//!
//! Quality is assessed on the oriented input before enhancement so that
//! warnings describe what the user uploaded.

use std::borrow::Cow;
use std::io::Cursor;

use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::raster::{
    apply_bilateral_approximation, assess_noise_level, binarize_adaptive, compute_contrast_score,
    compute_laplacian_variance, detect_skew_angle, downscale_view, rotate_gray, stretch_contrast,
    upscale_small,
};
use super::types::{PreprocessFlags, QualityIssue};
use super::NormalizationError;

/// Smallest plausible encoded image (a 1x1 PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Images larger than this on either side are pre-downscaled before any work.
const MAX_INPUT_DIMENSION: u32 = 6000;

/// Declared width × height above this is refused before decoding.
const MAX_DECODED_PIXELS: u64 = 64_000_000;

/// Quality and skew analysis run on a copy no larger than this.
const ANALYSIS_DIMENSION: u32 = 1000;

/// Laplacian variance below this = blurry.
const BLUR_THRESHOLD: f32 = 100.0;

/// Skew angle above this (degrees) triggers a warning.
const SKEW_THRESHOLD_DEG: f32 = 1.5;

/// RMS contrast below this = poor contrast.
const CONTRAST_THRESHOLD: f32 = 25.0;

/// Typical noise scores: clean scan 2-8, degraded photocopy 15-30, fax 25-50.
const NOISE_THRESHOLD: f32 = 12.0;
const BILATERAL_RADIUS: u32 = 2;
const BILATERAL_RANGE_SIGMA: f32 = 25.0;

/// Stage toggles. Keys left out of a JSON override take the `standard()` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreprocessOptions {
    pub grayscale: bool,
    pub contrast_normalize: bool,
    pub denoise: bool,
    pub deskew: bool,
    pub upscale: bool,
    pub binarize: bool,
}

impl PreprocessOptions {
    /// Cheap chain for clean inputs.
    pub fn standard() -> Self {
        Self {
            grayscale: true,
            contrast_normalize: true,
            denoise: false,
            deskew: false,
            upscale: true,
            binarize: false,
        }
    }

    /// Every stage, for phone photos and degraded scans.
    pub fn enhanced() -> Self {
        Self {
            grayscale: true,
            contrast_normalize: true,
            denoise: true,
            deskew: true,
            upscale: true,
            binarize: true,
        }
    }

    pub fn none() -> Self {
        Self {
            grayscale: false,
            contrast_normalize: false,
            denoise: false,
            deskew: false,
            upscale: false,
            binarize: false,
        }
    }

    pub fn for_enhanced(enhanced: bool) -> Self {
        if enhanced {
            Self::enhanced()
        } else {
            Self::standard()
        }
    }
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self::standard()
    }
}

/// A preprocessed raster, not yet tied to a page number.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub flags: PreprocessFlags,
    pub skew_angle: Option<f32>,
    pub issues: Vec<QualityIssue>,
}

#[derive(Debug, Default, Clone)]
struct QualityReport {
    issues: Vec<QualityIssue>,
    /// >95% near-white.
    is_blank: bool,
    /// >80% near-black.
    is_dark: bool,
    /// `None` when straight (< 0.5 deg).
    skew_angle: Option<f32>,
}

/// Blank, dark, blur, skew and contrast checks.
fn assess_quality(image: &GrayImage) -> QualityReport {
    let mut report = QualityReport::default();
    let pixel_count = (image.width() as usize) * (image.height() as usize);
    if pixel_count == 0 {
        return report;
    }

    let white = image.pixels().filter(|p| p.0[0] > 240).count();
    if white as f32 / pixel_count as f32 > 0.95 {
        report.is_blank = true;
        report.issues.push(QualityIssue::BlankPage);
    }

    let dark = image.pixels().filter(|p| p.0[0] < 15).count();
    if dark as f32 / pixel_count as f32 > 0.80 {
        report.is_dark = true;
        report.issues.push(QualityIssue::DarkPage);
    }

    if compute_laplacian_variance(image) < BLUR_THRESHOLD && !report.is_blank {
        report.issues.push(QualityIssue::BlurryImage);
    }

    report.skew_angle = detect_skew_angle(image);
    if let Some(angle) = report.skew_angle {
        if angle.abs() >= SKEW_THRESHOLD_DEG {
            report.issues.push(QualityIssue::SkewedDocument {
                angle_degrees: angle,
            });
        }
    }

    if compute_contrast_score(image) < CONTRAST_THRESHOLD && !report.is_blank && !report.is_dark {
        report.issues.push(QualityIssue::PoorContrast);
    }

    report
}

/// Bilateral filter on degraded inputs only. Returns whether it ran.
fn reduce_noise(image: GrayImage, quality: &QualityReport) -> (GrayImage, bool) {
    if quality.is_blank || quality.is_dark {
        return (image, false);
    }

    let noise_level = assess_noise_level(&image);
    if noise_level < NOISE_THRESHOLD {
        debug!(noise_level, "Clean image, skipping noise reduction");
        return (image, false);
    }

    debug!(noise_level, "Degraded image, applying bilateral filter");
    (
        apply_bilateral_approximation(&image, BILATERAL_RADIUS, BILATERAL_RANGE_SIGMA),
        true,
    )
}

pub struct PreprocessingPipeline {
    options: PreprocessOptions,
}

impl PreprocessingPipeline {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }

    /// Decode an uploaded image file, apply its EXIF orientation and prepare it.
    pub fn prepare_bytes(&self, image_bytes: &[u8]) -> Result<PreparedPage, NormalizationError> {
        let img = decode_image(image_bytes)?;
        let orientation = read_exif_orientation(image_bytes);
        if orientation != 1 {
            debug!(orientation, "Applying EXIF orientation");
        }
        self.prepare_image(apply_orientation(img, orientation))
    }

    /// Prepare an already-decoded image (rendered PDF page).
    pub fn prepare_image(&self, img: DynamicImage) -> Result<PreparedPage, NormalizationError> {
        let mut flags = PreprocessFlags::default();
        let opts = &self.options;

        let mut gray = pre_downscale(img.to_luma8(), MAX_INPUT_DIMENSION);

        let report = {
            let view = downscale_view(&gray, ANALYSIS_DIMENSION);
            assess_quality(&view)
        };

        // Every enhancement stage works on luma; without grayscale the
        // oriented colour image goes to the engines as-is.
        if !opts.grayscale {
            let (width, height) = (img.width(), img.height());
            return Ok(PreparedPage {
                png_bytes: encode_png(img)?,
                width,
                height,
                flags,
                skew_angle: report.skew_angle,
                issues: report.issues,
            });
        }
        flags.grayscale = true;

        if opts.contrast_normalize && !report.is_blank {
            flags.contrast_normalized = stretch_contrast(&mut gray);
        }

        if opts.denoise {
            let (filtered, applied) = reduce_noise(gray, &report);
            gray = filtered;
            flags.denoised = applied;
        }

        if opts.deskew {
            if let Some(angle) = report.skew_angle {
                gray = rotate_gray(&gray, angle);
                flags.deskewed = true;
            }
        }

        if opts.upscale {
            if let Some(scaled) = upscale_small(&gray) {
                gray = scaled;
                flags.upscaled = true;
            }
        }

        if opts.binarize && !report.is_blank {
            gray = binarize_adaptive(&gray);
            flags.binarized = true;
        }

        let (width, height) = gray.dimensions();
        let png_bytes = encode_png(DynamicImage::ImageLuma8(gray))?;

        debug!(
            width,
            height,
            png_size = png_bytes.len(),
            issues = report.issues.len(),
            ?flags,
            "Page preprocessed for OCR"
        );

        Ok(PreparedPage {
            png_bytes,
            width,
            height,
            flags,
            skew_angle: report.skew_angle,
            issues: report.issues,
        })
    }
}

/// EXIF tag 0x0112 value, or 1 (normal) when there is no EXIF block or
/// no orientation tag.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// 2 mirrored, 3 180deg, 4 flipped V, 5 mirrored + 90deg CW, 6 90deg CW,
/// 7 mirrored + 270deg CW, 8 270deg CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Decode after checking the header's pixel count, so a tiny file that
/// declares a huge canvas fails instead of allocating it.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, NormalizationError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(NormalizationError::CorruptInput("Image data too small to be valid".into()));
    }
    let reader = || {
        image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| NormalizationError::CorruptInput(format!("Unreadable image header: {e}")))
    };

    let (width, height) = reader()?
        .into_dimensions()
        .map_err(|e| NormalizationError::CorruptInput(format!("Unreadable image header: {e}")))?;
    if u64::from(width) * u64::from(height) > MAX_DECODED_PIXELS {
        return Err(NormalizationError::CorruptInput(format!(
            "Image declares {width}x{height} pixels, limit is {MAX_DECODED_PIXELS}"
        )));
    }

    reader()?
        .decode()
        .map_err(|e| NormalizationError::CorruptInput(format!("Failed to decode image: {e}")))
}

fn pre_downscale(img: GrayImage, max_dim: u32) -> GrayImage {
    match downscale_view(&img, max_dim) {
        Cow::Borrowed(_) => img,
        Cow::Owned(smaller) => {
            debug!(
                from = format!("{}x{}", img.width(), img.height()),
                to = format!("{}x{}", smaller.width(), smaller.height()),
                "Pre-downscaling oversized image"
            );
            smaller
        }
    }
}

pub fn encode_png(img: DynamicImage) -> Result<Vec<u8>, NormalizationError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| NormalizationError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
