//! Region and over-size recognition on top of the handle pool.
//!
//! Region recognitions crop with a white-fill background (minimum 8x8
//! canvas), override the segmentation mode for the call, restore the page
//! default afterwards, and translate results back into page coordinates.
//! Over-size pages are tiled vertically with an overlap and deduplicated by
//! quantized word identity.

use ahash::AHashSet;
use image::{Rgba, RgbaImage};

use crate::cancel::CancelToken;
use crate::config::PageSegMode;
use crate::error::{Result, TextlayerError};
use crate::tsv::parse_tsv;
use crate::types::{BBox, LineBox, ScriptKind, Word, WordKey};

use super::pool::{PooledRecognizer, RecognizerPool};
use super::RecognizerParams;

/// Region crops are padded up to this side length so the recognizer always
/// sees a workable raster.
const MIN_CROP_SIDE: u32 = 8;

/// Merged result of a chunked whole-page recognition.
#[derive(Debug, Default)]
pub struct ChunkedRecognition {
    pub text: String,
    pub confidence: f32,
    pub words: Vec<Word>,
    pub line_boxes: Vec<LineBox>,
    pub line_keys_with_words: AHashSet<String>,
}

/// Crop `region` out of `image` onto a white canvas of at least
/// `MIN_CROP_SIDE` per side. Returns the canvas and the page-space origin
/// of its top-left corner.
fn crop_with_white_fill(image: &RgbaImage, region: &BBox) -> Option<(RgbaImage, f32, f32)> {
    let (pw, ph) = image.dimensions();
    let clamped = region.clamp(pw as f32, ph as f32);
    let x0 = clamped.x0.floor() as u32;
    let y0 = clamped.y0.floor() as u32;
    let x1 = (clamped.x1.ceil() as u32).min(pw);
    let y1 = (clamped.y1.ceil() as u32).min(ph);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let crop_w = x1 - x0;
    let crop_h = y1 - y0;
    let canvas_w = crop_w.max(MIN_CROP_SIDE);
    let canvas_h = crop_h.max(MIN_CROP_SIDE);

    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([255, 255, 255, 255]));
    for dy in 0..crop_h {
        for dx in 0..crop_w {
            canvas.put_pixel(dx, dy, *image.get_pixel(x0 + dx, y0 + dy));
        }
    }
    Some((canvas, x0 as f32, y0 as f32))
}

/// Recognize a cropped region and return its words in page coordinates.
///
/// The segmentation mode is overridden for this call only; the page default
/// is restored before returning. Failures other than cancellation and
/// timeouts surface as the non-fatal [`TextlayerError::Region`].
pub async fn recognize_region(
    pool: &RecognizerPool,
    rec: &mut PooledRecognizer,
    page_image: &RgbaImage,
    region: &BBox,
    page_params: &RecognizerParams,
    region_psm: PageSegMode,
    script: ScriptKind,
    cancel: &CancelToken,
) -> Result<Vec<Word>> {
    cancel.bail()?;

    let Some((crop, origin_x, origin_y)) = crop_with_white_fill(page_image, region) else {
        return Ok(Vec::new());
    };

    let region_params = RecognizerParams {
        page_seg_mode: region_psm,
        ..*page_params
    };

    let outcome = pool.recognize(rec, &crop, &region_params, cancel).await;

    // Restore the page default even when the recognition failed; a poisoned
    // handle ignores the restore and is replaced on release.
    if let Err(e) = pool.set_parameters(rec, page_params).await {
        tracing::warn!(error = %e, "failed to restore page recognizer parameters");
    }

    let recognized = match outcome {
        Ok(page) => page,
        Err(e @ (TextlayerError::Aborted | TextlayerError::RecognizerTimeout { .. })) => return Err(e),
        Err(e) => return Err(TextlayerError::Region(e.to_string())),
    };

    let (pw, ph) = page_image.dimensions();
    let words = parse_tsv(&recognized.tsv, script)
        .words
        .into_iter()
        .map(|mut w| {
            w.bbox = w
                .bbox
                .translate(origin_x, origin_y)
                .clamp(pw as f32, ph as f32);
            w
        })
        .filter(|w| w.bbox.width() > 0.0 && w.bbox.height() > 0.0)
        .collect();
    Ok(words)
}

/// Recognize an over-size page in vertical chunks.
///
/// Chunks are `chunk_height` tall and advance by `chunk_height - overlap`;
/// duplicate words recognized inside the overlap band collapse onto their
/// quantized `(bbox, text)` identity.
#[allow(clippy::too_many_arguments)]
pub async fn recognize_chunked(
    pool: &RecognizerPool,
    rec: &mut PooledRecognizer,
    image: &RgbaImage,
    params: &RecognizerParams,
    script: ScriptKind,
    chunk_height: u32,
    overlap: u32,
    cancel: &CancelToken,
) -> Result<ChunkedRecognition> {
    let (width, height) = image.dimensions();
    let step = chunk_height.saturating_sub(overlap).max(1);

    let mut merged = ChunkedRecognition::default();
    let mut seen: AHashSet<WordKey> = AHashSet::new();
    let mut seen_boxes: AHashSet<String> = AHashSet::new();
    let mut text_parts: Vec<String> = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut conf_weight = 0.0f32;

    let mut chunk_index = 0u32;
    let mut y = 0u32;
    while y < height {
        cancel.bail()?;

        let y1 = (y + chunk_height).min(height);
        // Keep the tail chunk recognizable instead of emitting a sliver.
        let y0 = if y1 - y < MIN_CROP_SIDE { y1.saturating_sub(MIN_CROP_SIDE) } else { y };

        let region = BBox::new(0.0, y0 as f32, width as f32, y1 as f32);
        let (crop, _, origin_y) =
            crop_with_white_fill(image, &region).expect("chunk region is non-empty by construction");

        let recognized = pool.recognize(rec, &crop, params, cancel).await?;
        let parsed = parse_tsv(&recognized.tsv, script);

        let mut chunk_words = 0usize;
        for mut word in parsed.words {
            word.bbox = word
                .bbox
                .translate(0.0, origin_y)
                .clamp(width as f32, height as f32);
            if seen.insert(word.key()) {
                merged.words.push(word);
                chunk_words += 1;
            }
        }

        for mut line_box in parsed.line_boxes {
            line_box.bbox = line_box
                .bbox
                .translate(0.0, origin_y)
                .clamp(width as f32, height as f32);
            // Frame keys collide across chunks; prefix with the chunk index
            // to keep them stable and unique.
            let key = format!("{chunk_index}-{}", line_box.key);
            if parsed.line_keys_with_words.contains(&line_box.key) {
                merged.line_keys_with_words.insert(key.clone());
            }
            if seen_boxes.insert(key.clone()) {
                merged.line_boxes.push(LineBox {
                    key,
                    bbox: line_box.bbox,
                });
            }
        }

        let trimmed = recognized.text.trim();
        if !trimmed.is_empty() {
            text_parts.push(trimmed.to_string());
        }
        let weight = chunk_words.max(1) as f32;
        conf_sum += recognized.confidence * weight;
        conf_weight += weight;

        chunk_index += 1;
        y = y.saturating_add(step);
    }

    merged.text = text_parts.join("\n");
    merged.confidence = if conf_weight > 0.0 { conf_sum / conf_weight } else { 0.0 };
    tracing::debug!(
        chunks = chunk_index,
        words = merged.words.len(),
        "chunked recognition merged"
    );
    Ok(merged)
}

/// Number of chunks a page of `height` will be split into.
pub(crate) fn chunk_count(height: u32, chunk_height: u32, overlap: u32) -> u32 {
    let step = chunk_height.saturating_sub(overlap).max(1);
    height.div_ceil(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count_matches_ceil() {
        // 12000 / (4000 - 200) rounds up to 4.
        assert_eq!(chunk_count(12000, 4000, 200), 4);
        assert_eq!(chunk_count(3800, 4000, 200), 1);
        assert_eq!(chunk_count(7600, 4000, 200), 2);
    }

    #[test]
    fn test_crop_white_fill_pads_small_regions() {
        let image = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let region = BBox::new(10.0, 10.0, 13.0, 13.0);
        let (crop, ox, oy) = crop_with_white_fill(&image, &region).unwrap();
        assert_eq!(crop.dimensions(), (8, 8));
        assert_eq!((ox, oy), (10.0, 10.0));
        // The padded band is white, the source pixels are black.
        assert_eq!(crop.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(crop.get_pixel(7, 7).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_crop_outside_page_is_none() {
        let image = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255]));
        let region = BBox::new(200.0, 200.0, 300.0, 300.0);
        assert!(crop_with_white_fill(&image, &region).is_none());
    }

    #[test]
    fn test_crop_clamps_to_page() {
        let image = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255]));
        let region = BBox::new(40.0, 40.0, 90.0, 90.0);
        let (crop, ox, oy) = crop_with_white_fill(&image, &region).unwrap();
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!((ox, oy), (40.0, 40.0));
    }
}
