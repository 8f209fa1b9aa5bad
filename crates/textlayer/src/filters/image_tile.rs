//! Image-tile mask: reject words hallucinated over photographic regions.
//!
//! The page is tiled; each tile is classified image-likely from sparse
//! grayscale statistics and text-likely from the recognized words it holds.
//! Tiles that look like image but carry no credible text are marked, a
//! hole-fill pass closes isolated gaps, and short low-confidence words
//! centered in marked tiles are dropped. Large text always survives.

use image::GrayImage;

use crate::config::FilterThresholds;
use crate::pipeline::PageState;
use crate::text::{TokenScript, get_alphanum, token_script};
use crate::types::{Word, WordKey};

use super::{gray_at, variance_of};

const FILTER_NAME: &str = "image_tile";

/// Mid-luminance band: photographic pixels cluster here, text is bimodal.
const MID_LUMA_LO: f32 = 64.0;
const MID_LUMA_HI: f32 = 192.0;

struct TileGrid {
    side: u32,
    nx: usize,
    ny: usize,
    marked: Vec<bool>,
}

impl TileGrid {
    fn index_of(&self, x: f32, y: f32) -> Option<usize> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let tx = (x as u32 / self.side) as usize;
        let ty = (y as u32 / self.side) as usize;
        if tx >= self.nx || ty >= self.ny {
            return None;
        }
        Some(ty * self.nx + tx)
    }
}

struct TileStats {
    variance: f32,
    mid_ratio: f32,
    edge: f32,
}

fn tile_side(width: u32, height: u32) -> u32 {
    (width.min(height) / 40).clamp(32, 64)
}

fn sample_tile(gray: &GrayImage, x0: u32, y0: u32, side: u32) -> TileStats {
    let (gw, gh) = gray.dimensions();
    let x1 = (x0 + side).min(gw);
    let y1 = (y0 + side).min(gh);
    let step = (side / 8).max(1);

    let mut samples = Vec::with_capacity(64);
    let mut mid = 0usize;
    let mut edge_sum = 0.0f32;

    let mut y = y0;
    while y < y1 {
        let mut x = x0;
        while x < x1 {
            let v = gray_at(gray, x as i64, y as i64) as f32;
            samples.push(v);
            if (MID_LUMA_LO..=MID_LUMA_HI).contains(&v) {
                mid += 1;
            }
            let dx = (gray_at(gray, (x + step) as i64, y as i64) as f32 - v).abs();
            let dy = (gray_at(gray, x as i64, (y + step) as i64) as f32 - v).abs();
            edge_sum += dx + dy;
            x += step;
        }
        y += step;
    }

    let n = samples.len().max(1) as f32;
    TileStats {
        variance: variance_of(&samples),
        mid_ratio: mid as f32 / n,
        edge: edge_sum / n,
    }
}

fn build_grid(state: &PageState, gray: &GrayImage, thresholds: &FilterThresholds) -> TileGrid {
    let side = tile_side(state.width, state.height);
    let nx = state.width.div_ceil(side) as usize;
    let ny = state.height.div_ceil(side) as usize;

    // Word evidence per tile: count and strongest confidence.
    let mut word_count = vec![0usize; nx * ny];
    let mut best_conf = vec![0.0f32; nx * ny];
    let grid_probe = TileGrid {
        side,
        nx,
        ny,
        marked: Vec::new(),
    };
    for word in &state.words {
        let (cx, cy) = word.bbox.center();
        if let Some(idx) = grid_probe.index_of(cx, cy) {
            word_count[idx] += 1;
            best_conf[idx] = best_conf[idx].max(word.confidence);
        }
    }

    let mut marked = vec![false; nx * ny];
    for ty in 0..ny {
        for tx in 0..nx {
            let idx = ty * nx + tx;
            let stats = sample_tile(gray, tx as u32 * side, ty as u32 * side, side);

            let image_likely = (stats.mid_ratio >= thresholds.tile_mid_ratio_min
                && stats.variance >= thresholds.tile_variance_min)
                || (stats.edge >= thresholds.tile_edge_min
                    && stats.variance >= thresholds.tile_edge_variance_min);

            let text_likely = word_count[idx] >= thresholds.tile_text_min_words
                || (word_count[idx] >= 1 && best_conf[idx] >= thresholds.tile_text_single_word_conf);

            marked[idx] = image_likely && !text_likely;
        }
    }

    // Morphological hole fill: isolated clean tiles surrounded by image
    // tiles get absorbed into the mask.
    let mut filled = marked.clone();
    for ty in 0..ny {
        for tx in 0..nx {
            let idx = ty * nx + tx;
            if marked[idx] {
                continue;
            }
            let mut neighbors = 0usize;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx_i = tx as i64 + dx;
                    let ny_i = ty as i64 + dy;
                    if nx_i >= 0
                        && ny_i >= 0
                        && (nx_i as usize) < nx
                        && (ny_i as usize) < ny
                        && marked[ny_i as usize * nx + nx_i as usize]
                    {
                        neighbors += 1;
                    }
                }
            }
            if neighbors >= thresholds.tile_hole_fill_neighbors {
                filled[idx] = true;
            }
        }
    }

    TileGrid {
        side,
        nx,
        ny,
        marked: filled,
    }
}

fn classify_drop(
    word: &Word,
    grid: &TileGrid,
    page_height: f32,
    median_height: f32,
    thresholds: &FilterThresholds,
) -> Option<String> {
    let (cx, cy) = word.bbox.center();
    let idx = grid.index_of(cx, cy)?;
    if !grid.marked[idx] {
        return None;
    }

    let height = word.bbox.height();
    if height / page_height >= thresholds.tile_keep_page_height_ratio {
        return None;
    }
    if height >= thresholds.tile_keep_median_height_ratio * median_height {
        return None;
    }
    if get_alphanum(&word.text).chars().count() > thresholds.tile_drop_max_alnum_len {
        return None;
    }

    let conf_limit = if matches!(token_script(&word.text), TokenScript::Cjk) {
        thresholds.tile_cjk_drop_max_conf
    } else {
        thresholds.tile_drop_max_conf
    };
    if word.confidence < conf_limit {
        Some("short low-confidence word over image-likely tiles".to_string())
    } else {
        None
    }
}

pub(crate) fn apply(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let Some(gray) = state.gray.take() else {
        return 0;
    };

    let grid = build_grid(state, &gray, thresholds);
    let median_height = state.median_word_height().max(1.0);
    let page_height = state.page_height();

    let drops: Vec<(WordKey, String)> = state
        .words
        .iter()
        .filter_map(|w| classify_drop(w, &grid, page_height, median_height, thresholds).map(|r| (w.key(), r)))
        .collect();

    let removed = state.apply_drops(FILTER_NAME, drops);
    state.gray = Some(gray);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::{state, word};
    use crate::types::ScriptKind;

    fn thresholds() -> FilterThresholds {
        FilterThresholds::default()
    }

    /// Photographic noise everywhere except a clean white balloon rect.
    fn photo_with_balloon(width: u32, height: u32, bx0: u32, by0: u32, bx1: u32, by1: u32) -> GrayImage {
        let mut gray = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let v = if x >= bx0 && x < bx1 && y >= by0 && y < by1 {
                    250
                } else {
                    // Checkerboard-ish mid tones: busy and mid-luminance.
                    if (x / 3 + y / 5) % 2 == 0 { 90 } else { 170 }
                };
                gray.put_pixel(x, y, image::Luma([v]));
            }
        }
        gray
    }

    #[test]
    fn test_tile_side_clamps() {
        assert_eq!(tile_side(800, 600), 32);
        assert_eq!(tile_side(4000, 4000), 64);
        assert_eq!(tile_side(2000, 1600), 40);
    }

    #[test]
    fn test_drops_stray_word_over_photo_keeps_balloon() {
        let words = vec![
            // Balloon words: two in the same tile, clean background.
            word("I", 85.0, 210.0, 210.0, 222.0, 226.0),
            word("KNOW", 85.0, 226.0, 210.0, 280.0, 226.0),
            // Stray speck on the photo background.
            word("xt", 30.0, 600.0, 600.0, 616.0, 614.0),
        ];
        let mut s = state(1280, 1280, ScriptKind::Latin, words);
        s.gray = Some(photo_with_balloon(1280, 1280, 192, 192, 320, 320));

        let removed = apply(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert!(s.words.iter().all(|w| w.text != "xt"));
        assert_eq!(s.words.len(), 2);
    }

    #[test]
    fn test_large_text_always_kept() {
        // A word spanning 8% of page height survives even on the photo.
        let words = vec![word("BIG", 40.0, 600.0, 560.0, 760.0, 664.0)];
        let mut s = state(1280, 1280, ScriptKind::Latin, words);
        s.gray = Some(photo_with_balloon(1280, 1280, 0, 0, 1, 1));

        assert_eq!(apply(&mut s, &thresholds()), 0);
    }

    #[test]
    fn test_confident_long_word_kept() {
        let words = vec![word("LEGITIMATE", 90.0, 600.0, 600.0, 700.0, 616.0)];
        let mut s = state(1280, 1280, ScriptKind::Latin, words);
        s.gray = Some(photo_with_balloon(1280, 1280, 0, 0, 1, 1));

        // Alphanumeric length above the drop cap keeps it.
        assert_eq!(apply(&mut s, &thresholds()), 0);
    }

    #[test]
    fn test_no_gray_is_a_noop() {
        let words = vec![word("xt", 30.0, 600.0, 600.0, 616.0, 614.0)];
        let mut s = state(1280, 1280, ScriptKind::Latin, words);
        assert_eq!(apply(&mut s, &thresholds()), 0);
    }
}
