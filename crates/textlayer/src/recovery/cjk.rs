//! CJK recovery: the sparse retry condition and the vertical-gap rescan.
//!
//! Vertical CJK layouts fool dense page segmentation into skipping whole
//! columns; the gap rescan finds suspicious vertical voids between line
//! centers and re-recognizes them in sparse mode.

use crate::config::{FilterThresholds, PageSegMode};
use crate::error::Result;
use crate::pipeline::PageState;
use crate::text::get_alphanum;
use crate::types::BBox;

use super::{RecoveryCtx, admit_cjk, append_unique_words};

/// Whether the initial whole-page pass was weak enough to justify the
/// binarized sparse retry: almost no words, or almost no text.
pub(crate) fn retry_condition(state: &PageState, thresholds: &FilterThresholds) -> bool {
    state.script.is_cjk()
        && (state.words.len() < thresholds.cjk_retry_max_words
            || state.raw_text.trim().chars().count() < thresholds.cjk_retry_max_text_len)
}

/// Vertical gaps between successive line y-centers that exceed
/// `max(0.1 x page height, 1.5 x median line height)`, widest first,
/// capped per page.
fn candidate_gaps(state: &PageState, thresholds: &FilterThresholds) -> Vec<BBox> {
    if state.lines.len() < 2 {
        return Vec::new();
    }

    let mut centers: Vec<(f32, f32)> = state
        .lines
        .iter()
        .map(|l| (l.bbox.center().1, l.bbox.height()))
        .collect();
    centers.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut heights: Vec<f32> = centers.iter().map(|c| c.1).collect();
    let median_line_height = crate::text::median_in_place(&mut heights).max(1.0);
    let min_gap = (thresholds.gap_rescan_min_page_ratio * state.page_height())
        .max(thresholds.gap_rescan_min_line_ratio * median_line_height);

    let mut gaps: Vec<(f32, BBox)> = centers
        .windows(2)
        .filter_map(|pair| {
            let (top_center, top_height) = pair[0];
            let (bottom_center, bottom_height) = pair[1];
            let gap = bottom_center - top_center;
            if gap > min_gap {
                // The void between the two lines, shaved by half a line
                // height on each side so the rescan does not re-read them.
                let y0 = top_center + top_height / 2.0;
                let y1 = bottom_center - bottom_height / 2.0;
                if y1 > y0 {
                    return Some((gap, BBox::new(0.0, y0, state.page_width(), y1)));
                }
            }
            None
        })
        .collect();

    gaps.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    gaps.truncate(thresholds.gap_rescan_max_gaps);
    gaps.into_iter().map(|(_, bbox)| bbox).collect()
}

/// Re-recognize the widest vertical voids in sparse mode and admit
/// confident non-empty tokens.
pub(crate) async fn vertical_gap_rescan(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if !state.script.is_cjk() || state.budget_left() == 0 {
        return Ok(());
    }

    let gaps = candidate_gaps(state, ctx.thresholds);
    if gaps.is_empty() {
        return Ok(());
    }
    tracing::debug!(gaps = gaps.len(), "CJK vertical-gap rescan");

    let median_height = state.median_word_height();
    let mut changed = false;
    for gap in gaps {
        ctx.cancel.bail()?;
        if state.budget_left() == 0 {
            break;
        }
        let candidates = ctx
            .rescan(state, &gap, PageSegMode::SparseText, "cjk_vertical_gap")
            .await?;
        let admitted: Vec<_> = candidates
            .into_iter()
            .filter(|w| w.confidence >= ctx.thresholds.gap_rescan_min_conf)
            .filter(|w| !get_alphanum(&w.text).is_empty())
            .filter(|w| admit_cjk(w, median_height, ctx.thresholds))
            .collect();
        if append_unique_words(state, admitted, ctx.thresholds) > 0 {
            changed = true;
        }
    }

    if changed {
        state.rebuild_lines_by_y();
    }
    Ok(())
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
    fn test_retry_condition_sparse_cjk() {
        let mut s = state(
            1000,
            1000,
            ScriptKind::Cjk { korean: false },
            vec![word("字", 80.0, 0.0, 0.0, 20.0, 20.0)],
        );
        s.raw_text = "字".to_string();
        assert!(retry_condition(&s, &thresholds()));

        s.raw_text = "これは長い本文です".to_string();
        s.words = (0..10)
            .map(|i| word("字", 80.0, i as f32 * 24.0, 0.0, i as f32 * 24.0 + 20.0, 20.0))
            .collect();
        assert!(!retry_condition(&s, &thresholds()));
    }

    #[test]
    fn test_retry_condition_never_for_latin() {
        let s = state(1000, 1000, ScriptKind::Latin, vec![]);
        assert!(!retry_condition(&s, &thresholds()));
    }

    #[test]
    fn test_candidate_gaps_finds_void() {
        // Two columns: y in [50, 400] and [900, 1200] on a 1300px page.
        let words = vec![
            word("上", 80.0, 100.0, 50.0, 120.0, 80.0),
            word("上", 80.0, 100.0, 370.0, 120.0, 400.0),
            word("下", 80.0, 100.0, 900.0, 120.0, 930.0),
            word("下", 80.0, 100.0, 1170.0, 120.0, 1200.0),
        ];
        let s = state(1300, 1300, ScriptKind::Cjk { korean: false }, words);
        let gaps = candidate_gaps(&s, &thresholds());
        assert!(!gaps.is_empty());
        // The widest gap spans the void between the columns.
        assert!(gaps[0].y0 > 380.0 && gaps[0].y1 < 920.0);
    }

    #[test]
    fn test_candidate_gaps_ignores_normal_spacing() {
        let words = vec![
            word("一", 80.0, 100.0, 0.0, 120.0, 20.0),
            word("二", 80.0, 100.0, 30.0, 120.0, 50.0),
            word("三", 80.0, 100.0, 60.0, 120.0, 80.0),
        ];
        let s = state(1000, 1000, ScriptKind::Cjk { korean: false }, words);
        assert!(candidate_gaps(&s, &thresholds()).is_empty());
    }
}
