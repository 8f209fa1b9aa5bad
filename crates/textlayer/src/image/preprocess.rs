//! Decode and normalize page rasters.
//!
//! Every page becomes a canonical RGBA raster with an opaque white
//! background so transparent and partially-covered pixels cannot leak
//! recognizer noise. The grayscale variant is contrast-stretched to the
//! observed min/max; binarization is classic Otsu over the luminance
//! histogram.

use image::{GrayImage, Rgba, RgbaImage};

use crate::error::{Result, TextlayerError};
use crate::types::ScriptKind;

/// Pages smaller than this on either side are rejected outright.
const MIN_DIMENSION: u32 = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessOptions {
    /// Apply Otsu thresholding and write the binarized channel back into
    /// the RGB planes.
    pub binarize: bool,
    /// Also return the contrast-stretched grayscale buffer.
    pub return_gray: bool,
}

/// A normalized page raster.
pub struct PreprocessedPage {
    pub image: RgbaImage,
    pub width: u32,
    pub height: u32,
    /// Contrast-stretched luminance, present when requested.
    pub gray: Option<GrayImage>,
}

/// Binarization helps Latin strokes but degrades dense CJK glyphs and the
/// above/below marks of Thai, so any language set containing either keeps
/// the original tones.
pub fn binarize_allowed(script: ScriptKind) -> bool {
    matches!(script, ScriptKind::Latin)
}

/// Decode raw bytes and normalize onto an opaque white canvas.
pub fn preprocess_image(bytes: &[u8], options: PreprocessOptions) -> Result<PreprocessedPage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| TextlayerError::Preprocess(format!("failed to decode image: {e}")))?;
    preprocess_decoded(decoded.to_rgba8(), options)
}

/// Normalize an already-decoded raster. Split out so tests and region crops
/// can skip the codec round-trip.
pub fn preprocess_decoded(decoded: RgbaImage, options: PreprocessOptions) -> Result<PreprocessedPage> {
    let (width, height) = decoded.dimensions();
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(TextlayerError::Preprocess(format!(
            "image dimensions {width}x{height} below minimum {MIN_DIMENSION}x{MIN_DIMENSION}"
        )));
    }

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    composite_over_white(&mut canvas, &decoded);

    let needs_luma = options.return_gray || options.binarize;
    let mut gray = needs_luma.then(|| luminance(&canvas));

    if let Some(g) = gray.as_mut() {
        contrast_stretch(g);
        if options.binarize {
            let threshold = otsu_threshold(g);
            write_binarized(&mut canvas, g, threshold);
        }
    }

    Ok(PreprocessedPage {
        image: canvas,
        width,
        height,
        gray: if options.return_gray { gray } else { None },
    })
}

/// Source-over composite assuming the destination is opaque white.
fn composite_over_white(canvas: &mut RgbaImage, src: &RgbaImage) {
    for (dst, px) in canvas.pixels_mut().zip(src.pixels()) {
        let a = px[3] as u32;
        if a == 255 {
            *dst = Rgba([px[0], px[1], px[2], 255]);
        } else if a > 0 {
            let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
            *dst = Rgba([blend(px[0]), blend(px[1]), blend(px[2]), 255]);
        }
    }
}

/// Rec. 601 luma over the composited canvas.
fn luminance(canvas: &RgbaImage) -> GrayImage {
    let (width, height) = canvas.dimensions();
    let mut data = Vec::with_capacity((width * height) as usize);
    for px in canvas.pixels() {
        let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
        data.push(y.round().clamp(0.0, 255.0) as u8);
    }
    GrayImage::from_raw(width, height, data).expect("buffer sized from dimensions")
}

/// Per-image linear stretch to `[0, 255]` using the observed min/max.
fn contrast_stretch(gray: &mut GrayImage) {
    let (mut min, mut max) = (255u8, 0u8);
    for px in gray.pixels() {
        min = min.min(px[0]);
        max = max.max(px[0]);
    }
    if max <= min {
        return;
    }
    let range = (max - min) as f32;
    for px in gray.pixels_mut() {
        px[0] = (((px[0] - min) as f32 / range) * 255.0).round() as u8;
    }
}

/// Otsu's threshold over the 256-bin luminance histogram.
fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for px in gray.pixels() {
        histogram[px[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 127;
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_back = 0.0f64;
    let mut weight_back = 0u64;
    let mut best_variance = -1.0f64;
    let mut best_threshold = 127u8;

    for (level, &count) in histogram.iter().enumerate() {
        weight_back += count;
        if weight_back == 0 {
            continue;
        }
        let weight_fore = total - weight_back;
        if weight_fore == 0 {
            break;
        }
        sum_back += level as f64 * count as f64;

        let mean_back = sum_back / weight_back as f64;
        let mean_fore = (sum_all - sum_back) / weight_fore as f64;
        let between = weight_back as f64 * weight_fore as f64 * (mean_back - mean_fore).powi(2);
        if between > best_variance {
            best_variance = between;
            best_threshold = level as u8;
        }
    }
    best_threshold
}

/// Write the thresholded channel back into the RGB planes.
fn write_binarized(canvas: &mut RgbaImage, gray: &GrayImage, threshold: u8) {
    for (dst, src) in canvas.pixels_mut().zip(gray.pixels()) {
        let v = if src[0] > threshold { 255 } else { 0 };
        *dst = Rgba([v, v, v, 255]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    #[test]
    fn test_rejects_tiny_images() {
        let tiny = solid_image(5, 5, [0, 0, 0, 255]);
        let result = preprocess_decoded(tiny, PreprocessOptions::default());
        assert!(matches!(result, Err(TextlayerError::Preprocess(_))));
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        let transparent = solid_image(16, 16, [0, 0, 0, 0]);
        let page = preprocess_decoded(transparent, PreprocessOptions::default()).unwrap();
        let px = page.image.get_pixel(8, 8);
        assert_eq!(px.0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_partial_alpha_blends_toward_white() {
        let half = solid_image(16, 16, [0, 0, 0, 128]);
        let page = preprocess_decoded(half, PreprocessOptions::default()).unwrap();
        let px = page.image.get_pixel(8, 8);
        assert!(px[0] > 100 && px[0] < 150);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_gray_is_contrast_stretched() {
        let mut img = solid_image(16, 16, [100, 100, 100, 255]);
        for x in 0..8 {
            img.put_pixel(x, 0, Rgba([140, 140, 140, 255]));
        }
        let page = preprocess_decoded(
            img,
            PreprocessOptions {
                return_gray: true,
                ..Default::default()
            },
        )
        .unwrap();
        let gray = page.gray.unwrap();
        let mut min = 255u8;
        let mut max = 0u8;
        for px in gray.pixels() {
            min = min.min(px[0]);
            max = max.max(px[0]);
        }
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_binarize_produces_two_levels() {
        let mut img = solid_image(16, 16, [240, 240, 240, 255]);
        for x in 0..16 {
            for y in 0..4 {
                img.put_pixel(x, y, Rgba([20, 20, 20, 255]));
            }
        }
        let page = preprocess_decoded(
            img,
            PreprocessOptions {
                binarize: true,
                ..Default::default()
            },
        )
        .unwrap();
        for px in page.image.pixels() {
            assert!(px[0] == 0 || px[0] == 255);
        }
    }

    #[test]
    fn test_otsu_separates_bimodal_histogram() {
        let mut img = GrayImage::new(16, 16);
        for (i, px) in img.pixels_mut().enumerate() {
            px[0] = if i % 2 == 0 { 30 } else { 220 };
        }
        let threshold = otsu_threshold(&img);
        assert!((30..220).contains(&threshold));
    }

    #[test]
    fn test_binarize_policy_per_script() {
        assert!(binarize_allowed(ScriptKind::Latin));
        assert!(!binarize_allowed(ScriptKind::Cjk { korean: false }));
        assert!(!binarize_allowed(ScriptKind::Thai));
        assert!(!binarize_allowed(ScriptKind::Mixed));
    }

    #[test]
    fn test_decode_failure_is_preprocess_error() {
        let result = preprocess_image(&[0xde, 0xad, 0xbe, 0xef], PreprocessOptions::default());
        assert!(matches!(result, Err(TextlayerError::Preprocess(_))));
    }
}
