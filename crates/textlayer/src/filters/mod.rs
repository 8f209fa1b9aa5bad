//! Post-recognition noise filters.
//!
//! Every filter takes the page state plus the threshold table, decides
//! which words to reject, and applies the drops through
//! [`PageState::apply_drops`] so protection, drop records and line rebuilds
//! are handled uniformly. Filters never touch words in the protected set.

pub(crate) mod background;
pub(crate) mod cjk;
pub(crate) mod image_tile;
pub(crate) mod latin;
pub(crate) mod line_noise;

use image::GrayImage;

use crate::config::FilterThresholds;
use crate::pipeline::PageState;
use crate::types::BBox;

/// Clamped grayscale lookup.
pub(crate) fn gray_at(gray: &GrayImage, x: i64, y: i64) -> u8 {
    let (w, h) = gray.dimensions();
    let cx = x.clamp(0, w as i64 - 1) as u32;
    let cy = y.clamp(0, h as i64 - 1) as u32;
    gray.get_pixel(cx, cy)[0]
}

pub(crate) fn variance_of(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / samples.len() as f32
}

/// Grayscale variance of the surroundings of a box: a 5x5 grid over the
/// expanded rectangle, sampling only outside the slightly-expanded inner
/// rectangle so the glyph strokes themselves do not count as "busy".
pub(crate) fn surrounding_variance(gray: &GrayImage, bbox: &BBox) -> f32 {
    let height = bbox.height().max(1.0);
    let outer = bbox.expand(height * 0.8);
    let inner = bbox.expand(height * 0.15);

    let mut samples = Vec::with_capacity(25);
    for iy in 0..5 {
        for ix in 0..5 {
            let x = outer.x0 + outer.width() * (ix as f32 + 0.5) / 5.0;
            let y = outer.y0 + outer.height() * (iy as f32 + 0.5) / 5.0;
            if inner.contains_point(x, y) {
                continue;
            }
            samples.push(gray_at(gray, x as i64, y as i64) as f32);
        }
    }
    variance_of(&samples)
}

/// Re-apply the image-based noise filters after a recovery changed the word
/// set, so recovered tokens must survive the same scrutiny. Protected words
/// pass through untouched, as everywhere.
pub(crate) fn reapply_noise_filters(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let mut removed = image_tile::apply(state, thresholds);
    removed += background::apply(state, thresholds);
    if state.script.is_cjk() {
        removed += cjk::apply_isolated(state, thresholds);
        if state.script.is_korean() {
            removed += cjk::apply_jamo(state, thresholds);
        }
    }
    removed
}
