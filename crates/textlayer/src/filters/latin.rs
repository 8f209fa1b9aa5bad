//! Latin-specific pruners: watermark suppression, edge ghosts, isolated
//! noise lines and the high-recall cleanup for very sparse pages.
//!
//! Lexical word sets are used to protect and score lines only; nothing here
//! rewrites text.

use crate::config::FilterThresholds;
use crate::pipeline::PageState;
use crate::text::lexicon::{self, is_watermark_token, line_readability, token_readability};
use crate::types::{Line, Word, WordKey};

/// Watermark suppression: known site/publisher signatures in the top or
/// bottom band, plus their close same-band companions (the `.io` tail of a
/// split watermark).
pub(crate) fn apply_watermark(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let page_height = state.page_height();
    let band = thresholds.watermark_band_ratio * page_height;
    let median_height = state.median_word_height().max(1.0);
    let neighbor_range = thresholds.watermark_neighbor_range * median_height;

    let in_band = |word: &Word| word.bbox.y1 <= band || word.bbox.y0 >= page_height - band;
    let small = |word: &Word| word.bbox.height() / page_height <= thresholds.watermark_max_height_ratio;

    let seeds: Vec<Word> = state
        .words
        .iter()
        .filter(|w| is_watermark_token(&w.text) && in_band(w) && small(w))
        .cloned()
        .collect();
    if seeds.is_empty() {
        return 0;
    }

    let mut drops: Vec<(WordKey, String)> = Vec::new();
    for word in &state.words {
        if seeds.iter().any(|s| s.key() == word.key()) {
            drops.push((word.key(), "watermark signature".to_string()));
            continue;
        }
        if !in_band(word) || !small(word) {
            continue;
        }
        let near_seed = seeds.iter().any(|s| {
            word.bbox.vertical_overlap_ratio(&s.bbox) > 0.2
                && word.bbox.min_horizontal_gap(&s.bbox) <= neighbor_range
        });
        if near_seed {
            drops.push((word.key(), "adjacent to watermark signature".to_string()));
        }
    }

    state.apply_drops("latin_watermark", drops)
}

/// Edge ghosts: single-token lines hugging the page edges with unreadable
/// content, usually torn borders recognized as letters.
pub(crate) fn apply_edge_ghosts(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let page_height = state.page_height();
    let band = thresholds.edge_ghost_band_ratio * page_height;

    let mut drops: Vec<(WordKey, String)> = Vec::new();
    for line in &state.lines {
        if line.words.len() != 1 {
            continue;
        }
        let word = &line.words[0];
        let at_edge = line.bbox.y1 <= band || line.bbox.y0 >= page_height - band;
        if !at_edge {
            continue;
        }
        if token_readability(&word.text, word.confidence, thresholds) < thresholds.edge_ghost_max_readability {
            drops.push((word.key(), "unreadable single token at page edge".to_string()));
        }
    }
    state.apply_drops("latin_edge_ghost", drops)
}

/// Whether `line` has a close neighbor: row-adjacent (same row within
/// `5.4 x` its height horizontally) or block-adjacent (stacked within the
/// same range with an x-overlap of at least 16% of the shorter width).
fn has_close_neighbor(line: &Line, index: usize, lines: &[Line], thresholds: &FilterThresholds) -> bool {
    let height = line.bbox.height().max(1.0);
    let range = thresholds.isolated_line_row_range * height;
    lines.iter().enumerate().any(|(j, other)| {
        if j == index {
            return false;
        }
        let row_adjacent = line.bbox.vertical_overlap_ratio(&other.bbox) > 0.2
            && line.bbox.min_horizontal_gap(&other.bbox) <= range;

        let x_overlap = (line.bbox.x1.min(other.bbox.x1) - line.bbox.x0.max(other.bbox.x0)).max(0.0);
        let shorter = line.bbox.width().min(other.bbox.width()).max(1.0);
        let block_adjacent = x_overlap / shorter >= thresholds.isolated_line_min_x_overlap
            && vertical_distance(line, other) <= range;

        row_adjacent || block_adjacent
    })
}

fn vertical_distance(a: &Line, b: &Line) -> f32 {
    if a.bbox.y1 < b.bbox.y0 {
        b.bbox.y0 - a.bbox.y1
    } else if b.bbox.y1 < a.bbox.y0 {
        a.bbox.y0 - b.bbox.y1
    } else {
        0.0
    }
}

/// Isolated noise lines: short, unreadable, lexically empty lines with no
/// close neighbor anywhere on the page.
pub(crate) fn apply_isolated_lines(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let mut drops: Vec<(WordKey, String)> = Vec::new();
    for (i, line) in state.lines.iter().enumerate() {
        if line.words.len() > 2 {
            continue;
        }
        if lexicon::lexical_hits(&line.words) > 0 {
            continue;
        }
        if line_readability(&line.words, thresholds) >= thresholds.garbage_line_max_readability {
            continue;
        }
        if has_close_neighbor(line, i, &state.lines, thresholds) {
            continue;
        }
        for word in &line.words {
            drops.push((word.key(), "isolated unreadable line".to_string()));
        }
    }
    state.apply_drops("latin_isolated_line", drops)
}

/// High-recall cleanup for very sparse results: when recognition produced
/// almost nothing but at least one strongly readable line exists, the
/// remaining short non-lexical lines are more likely debris than speech.
pub(crate) fn apply_high_recall(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    if state.words.len() > thresholds.high_recall_max_words {
        return 0;
    }
    let has_strong_line = state.lines.iter().any(|line| {
        line_readability(&line.words, thresholds) >= thresholds.high_recall_strong_readability
            && lexicon::lexical_hits(&line.words) >= 1
    });
    if !has_strong_line {
        return 0;
    }

    let mut drops: Vec<(WordKey, String)> = Vec::new();
    for line in &state.lines {
        if line.words.len() > 2 {
            continue;
        }
        if lexicon::lexical_hits(&line.words) > 0 {
            continue;
        }
        if line_readability(&line.words, thresholds) >= 0.5 {
            continue;
        }
        for word in &line.words {
            drops.push((word.key(), "non-lexical debris on sparse page".to_string()));
        }
    }
    state.apply_drops("latin_high_recall", drops)
}

/// The whole Latin pruner family, in pipeline order.
pub(crate) fn apply_garbage_pruners(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let mut removed = apply_edge_ghosts(state, thresholds);
    removed += apply_isolated_lines(state, thresholds);
    removed += apply_high_recall(state, thresholds);
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

    #[test]
    fn test_watermark_in_top_band_dropped() {
        let words = vec![
            // Watermark at 3% of page height, well inside the 14% band.
            word("LikeManga.io", 80.0, 400.0, 30.0, 560.0, 58.0),
            // Real dialogue mid-page.
            word("I", 85.0, 300.0, 500.0, 312.0, 520.0),
            word("DON'T", 85.0, 318.0, 500.0, 380.0, 520.0),
            word("KNOW.", 85.0, 386.0, 500.0, 450.0, 520.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply_watermark(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert!(s.words.iter().all(|w| !w.text.contains("LikeManga")));
        assert_eq!(s.words.len(), 3);
    }

    #[test]
    fn test_watermark_neighbors_in_band_dropped() {
        let words = vec![
            word("MangaDex", 80.0, 400.0, 30.0, 500.0, 58.0),
            // Split-off tail right next to the signature.
            word("org", 60.0, 506.0, 30.0, 540.0, 58.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        assert_eq!(apply_watermark(&mut s, &thresholds()), 2);
    }

    #[test]
    fn test_watermark_like_text_mid_page_kept() {
        // Same signature but in the middle of the page: not a watermark.
        let words = vec![word("LikeManga.io", 80.0, 400.0, 500.0, 560.0, 528.0)];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        assert_eq!(apply_watermark(&mut s, &thresholds()), 0);
    }

    #[test]
    fn test_edge_ghost_dropped() {
        let words = vec![
            word("Jk", 20.0, 10.0, 5.0, 30.0, 20.0),
            word("HELLO", 90.0, 100.0, 500.0, 180.0, 520.0),
            word("THERE", 90.0, 188.0, 500.0, 266.0, 520.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply_edge_ghosts(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert!(s.words.iter().all(|w| w.text != "Jk"));
    }

    #[test]
    fn test_isolated_unreadable_line_dropped() {
        let words = vec![
            // Lone consonant garbage far from everything.
            word("XQZR", 30.0, 800.0, 400.0, 860.0, 416.0),
            // Real text cluster.
            word("HELLO", 90.0, 100.0, 100.0, 180.0, 120.0),
            word("THERE", 90.0, 188.0, 100.0, 266.0, 120.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply_isolated_lines(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert!(s.words.iter().all(|w| w.text != "XQZR"));
    }

    #[test]
    fn test_lexical_line_never_isolated_noise() {
        let words = vec![word("NO", 30.0, 800.0, 400.0, 830.0, 416.0)];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        assert_eq!(apply_isolated_lines(&mut s, &thresholds()), 0);
    }

    #[test]
    fn test_high_recall_drops_debris_when_anchor_exists() {
        let words = vec![
            word("I", 90.0, 100.0, 100.0, 112.0, 120.0),
            word("KNOW", 90.0, 118.0, 100.0, 170.0, 120.0),
            // Unreadable debris elsewhere.
            word("zx", 20.0, 700.0, 700.0, 716.0, 712.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply_high_recall(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert_eq!(s.words.len(), 2);
    }

    #[test]
    fn test_high_recall_noop_on_dense_pages() {
        let mut words: Vec<Word> = (0..20)
            .map(|i| word("WORD", 90.0, i as f32 * 60.0, 100.0, i as f32 * 60.0 + 50.0, 120.0))
            .collect();
        words.push(word("zx", 20.0, 700.0, 700.0, 716.0, 712.0));
        let mut s = state(2000, 1000, ScriptKind::Latin, words);
        assert_eq!(apply_high_recall(&mut s, &thresholds()), 0);
    }
}
