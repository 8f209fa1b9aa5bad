//! Line-frame recoveries: under-covered frames, frames that produced no
//! words at all, and large internal gaps inside accepted lines.

use crate::config::{FilterThresholds, PageSegMode};
use crate::error::Result;
use crate::pipeline::PageState;
use crate::spatial::{compute_line_coverage_ratio, find_large_gaps};
use crate::text::get_alphanum;
use crate::types::{BBox, Line, LineBox, Word};

use super::{RecoveryCtx, admit_cjk, admit_latin, append_unique_words};

/// The line frame best matching a line, by IoU.
fn best_frame<'a>(line: &Line, frames: &'a [LineBox]) -> Option<&'a LineBox> {
    frames
        .iter()
        .map(|frame| (frame, line.bbox.iou(&frame.bbox)))
        .filter(|(_, iou)| *iou > 0.1)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(frame, _)| frame)
}

fn admit_for_script(word: &Word, state: &PageState, median_height: f32, thresholds: &FilterThresholds) -> bool {
    if state.script.is_cjk() {
        admit_cjk(word, median_height, thresholds)
    } else {
        admit_latin(word, thresholds)
    }
}

/// Rescan line frames whose recognized words cover too little of the
/// frame's long axis. Horizontal frames re-run as a single line; vertical
/// CJK frames re-run sparse.
pub(crate) async fn low_coverage_rescan(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if state.budget_left() == 0 || state.line_boxes.is_empty() {
        return Ok(());
    }

    let coverage_floor = if state.script.is_cjk() {
        ctx.thresholds.coverage_rescan_cjk
    } else {
        ctx.thresholds.coverage_rescan_latin
    };
    let median_height = state.median_word_height().max(1.0);
    let pad = ctx.thresholds.rescan_pad_ratio * median_height;

    // Collect targets first; the state is mutated while rescanning.
    let targets: Vec<(BBox, bool)> = state
        .lines
        .iter()
        .filter_map(|line| {
            let frame = best_frame(line, &state.line_boxes)?;
            let coverage = compute_line_coverage_ratio(&line.words, frame);
            if coverage < coverage_floor {
                let vertical = frame.bbox.height() > frame.bbox.width();
                Some((frame.bbox.expand(pad), vertical))
            } else {
                None
            }
        })
        .collect();

    if targets.is_empty() {
        return Ok(());
    }
    tracing::debug!(targets = targets.len(), "low-coverage line rescan");

    let mut changed = false;
    for (region, vertical) in targets {
        ctx.cancel.bail()?;
        if state.budget_left() == 0 {
            break;
        }
        let psm = if vertical && state.script.is_cjk() {
            PageSegMode::SparseText
        } else {
            PageSegMode::SingleLine
        };
        let candidates = ctx.rescan(state, &region, psm, "low_coverage_line").await?;
        let admitted: Vec<Word> = candidates
            .into_iter()
            .filter(|w| admit_for_script(w, state, median_height, ctx.thresholds))
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

/// Rescan line frames whose key never produced a word: the recognizer saw
/// a line there but could not read it with the page-level segmentation.
pub(crate) async fn empty_frame_rescan(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if state.budget_left() == 0 {
        return Ok(());
    }

    let median_height = state.median_word_height().max(1.0);
    let pad = ctx.thresholds.rescan_pad_ratio * median_height;
    let empties: Vec<BBox> = state
        .line_boxes
        .iter()
        .filter(|frame| !state.line_keys_with_words.contains(&frame.key))
        .map(|frame| frame.bbox.expand(pad))
        .collect();

    if empties.is_empty() {
        return Ok(());
    }
    tracing::debug!(frames = empties.len(), "empty line-frame rescan");

    let mut changed = false;
    for region in empties {
        ctx.cancel.bail()?;
        if state.budget_left() == 0 {
            break;
        }
        let candidates = ctx.rescan(state, &region, PageSegMode::SingleLine, "empty_frame").await?;
        let admitted: Vec<Word> = candidates
            .into_iter()
            .filter(|w| admit_for_script(w, state, median_height, ctx.thresholds))
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

/// Probe the large internal gaps of accepted lines: single missing words
/// between recognized neighbors, usually eaten by a speck of art.
pub(crate) async fn large_gap_rescan(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if state.budget_left() == 0 {
        return Ok(());
    }

    let is_cjk = state.script.is_cjk();
    let gaps: Vec<BBox> = state
        .lines
        .iter()
        .flat_map(|line| find_large_gaps(&line.words, is_cjk))
        .collect();
    if gaps.is_empty() {
        return Ok(());
    }
    tracing::debug!(gaps = gaps.len(), "large-gap rescan");

    let median_height = state.median_word_height().max(1.0);
    let psm = if is_cjk { PageSegMode::SingleLine } else { PageSegMode::SingleWord };

    let mut changed = false;
    for gap in gaps {
        ctx.cancel.bail()?;
        if state.budget_left() == 0 {
            break;
        }
        let candidates = ctx.rescan(state, &gap, psm, "large_gap").await?;
        let admitted: Vec<Word> = candidates
            .into_iter()
            .filter(|w| get_alphanum(&w.text).chars().count() <= 12)
            .filter(|w| admit_for_script(w, state, median_height, ctx.thresholds))
            .collect();
        if append_unique_words(state, admitted, ctx.thresholds) > 0 {
            changed = true;
        }
    }

    if changed {
        state.rebuild_lines();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::word;
    use crate::types::ScriptKind;

    #[test]
    fn test_best_frame_picks_highest_iou() {
        let line = Line::from_words(vec![word("w", 90.0, 0.0, 0.0, 100.0, 20.0)], "w".to_string()).unwrap();
        let frames = vec![
            LineBox {
                key: "far".to_string(),
                bbox: BBox::new(0.0, 500.0, 100.0, 520.0),
            },
            LineBox {
                key: "close".to_string(),
                bbox: BBox::new(0.0, 0.0, 110.0, 22.0),
            },
        ];
        assert_eq!(best_frame(&line, &frames).unwrap().key, "close");
    }

    #[test]
    fn test_best_frame_requires_overlap() {
        let line = Line::from_words(vec![word("w", 90.0, 0.0, 0.0, 100.0, 20.0)], "w".to_string()).unwrap();
        let frames = vec![LineBox {
            key: "far".to_string(),
            bbox: BBox::new(0.0, 500.0, 100.0, 520.0),
        }];
        assert!(best_frame(&line, &frames).is_none());
    }

    #[test]
    fn test_admit_for_script_dispatches() {
        let thresholds = FilterThresholds::default();
        let latin_state = crate::filters::test_support::state(1000, 1000, ScriptKind::Latin, vec![]);
        let cjk_state = crate::filters::test_support::state(1000, 1000, ScriptKind::Cjk { korean: false }, vec![]);

        let latin_word = word("KNOW", 60.0, 0.0, 0.0, 40.0, 12.0);
        assert!(admit_for_script(&latin_word, &latin_state, 12.0, &thresholds));

        let cjk_word = word("字", 70.0, 0.0, 0.0, 20.0, 12.0);
        assert!(admit_for_script(&cjk_word, &cjk_state, 12.0, &thresholds));
        // The same token fails the Latin admission (not alphanumeric-plausible
        // confidence for a 1-char token at 70).
        assert!(!admit_for_script(&cjk_word, &latin_state, 12.0, &thresholds));
    }
}
