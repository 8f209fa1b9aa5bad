//! Latin rescues: balloon neighborhoods, the top band, and frames orphaned
//! by late pruning.

use crate::config::{FilterThresholds, PageSegMode};
use crate::error::Result;
use crate::pipeline::PageState;
use crate::text::lexicon::{lexical_hits, line_readability};
use crate::types::{BBox, Line, Word};

use super::{RecoveryCtx, admit_latin, admit_lexical_only, append_unique_words};

/// A line readable and lexical enough to anchor a rescue around it.
fn anchor_line<'a>(state: &'a PageState, thresholds: &FilterThresholds) -> Option<&'a Line> {
    state
        .lines
        .iter()
        .filter(|line| lexical_hits(&line.words) >= 1)
        .filter(|line| line_readability(&line.words, thresholds) >= thresholds.balloon_anchor_min_readability)
        .max_by(|a, b| {
            line_readability(&a.words, thresholds)
                .partial_cmp(&line_readability(&b.words, thresholds))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Neighborhood/balloon rescue: on sparse pages with one readable anchor,
/// re-recognize the block around the anchor and admit lexical tokens only.
/// Catches the rest of a speech balloon that page segmentation shredded.
pub(crate) async fn balloon_rescue(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if !state.script.is_latin()
        || state.words.len() > ctx.thresholds.balloon_rescue_max_words
        || state.budget_left() == 0
    {
        return Ok(());
    }
    let Some(anchor) = anchor_line(state, ctx.thresholds) else {
        return Ok(());
    };

    let line_height = anchor.bbox.height().max(1.0);
    let region = BBox::new(
        anchor.bbox.x0 - line_height * 2.0,
        anchor.bbox.y0 - line_height * 3.5,
        anchor.bbox.x1 + line_height * 2.0,
        anchor.bbox.y1 + line_height * 3.5,
    );
    tracing::debug!(anchor = %anchor.text, "balloon rescue around anchor line");

    let candidates = ctx.rescan(state, &region, PageSegMode::SingleBlock, "balloon_rescue").await?;
    let admitted: Vec<Word> = candidates
        .into_iter()
        .filter(|w| admit_lexical_only(w, ctx.thresholds))
        .collect();

    if append_unique_words(state, admitted, ctx.thresholds) > 0 {
        state.rebuild_lines_by_y();
    }
    Ok(())
}

/// Top-band probe: when the earliest recognized word starts surprisingly
/// far down the page, sweep the top strip in sparse mode. Title lines over
/// art are the usual victim.
pub(crate) async fn top_band_probe(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if !state.script.is_latin() || state.words.is_empty() || state.budget_left() == 0 {
        return Ok(());
    }

    let first_y = state
        .words
        .iter()
        .map(|w| w.bbox.y0)
        .fold(f32::INFINITY, f32::min);
    if first_y <= ctx.thresholds.top_probe_trigger_ratio * state.page_height() {
        return Ok(());
    }

    let strip = BBox::new(
        0.0,
        0.0,
        state.page_width(),
        ctx.thresholds.top_probe_strip_ratio * state.page_height(),
    );
    tracing::debug!(first_word_y = first_y, "probing empty top band");

    let candidates = ctx.rescan(state, &strip, PageSegMode::SparseText, "top_band_probe").await?;
    let admitted: Vec<Word> = candidates
        .into_iter()
        .filter(|w| admit_latin(w, ctx.thresholds))
        .collect();

    if append_unique_words(state, admitted, ctx.thresholds) > 0 {
        state.rebuild_lines_by_y();
    }
    Ok(())
}

/// Post-prune rescue: after the late pruners shrank the page, probe line
/// frames that no longer overlap any surviving line. A candidate batch is
/// accepted only when it reads as a lexical-heavy line on its own.
pub(crate) async fn post_prune_rescue(state: &mut PageState, ctx: &mut RecoveryCtx<'_>) -> Result<()> {
    if state.budget_left() == 0 {
        return Ok(());
    }

    let median_height = state.median_word_height().max(1.0);
    let pad = ctx.thresholds.rescan_pad_ratio * median_height;
    let orphaned: Vec<BBox> = state
        .line_boxes
        .iter()
        .filter(|frame| state.lines.iter().all(|line| line.bbox.iou(&frame.bbox) == 0.0))
        .map(|frame| frame.bbox.expand(pad))
        .collect();
    if orphaned.is_empty() {
        return Ok(());
    }
    tracing::debug!(frames = orphaned.len(), "post-prune line rescue");

    let mut changed = false;
    for region in orphaned {
        ctx.cancel.bail()?;
        if state.budget_left() == 0 {
            break;
        }
        let candidates = ctx.rescan(state, &region, PageSegMode::SingleLine, "post_prune").await?;
        let admitted: Vec<Word> = candidates
            .into_iter()
            .filter(|w| admit_latin(w, ctx.thresholds))
            .collect();
        if admitted.is_empty() {
            continue;
        }
        // The rescued batch must stand on its own as a readable line.
        if lexical_hits(&admitted) < 1
            || line_readability(&admitted, ctx.thresholds) < ctx.thresholds.post_prune_min_readability
        {
            continue;
        }
        if append_unique_words(state, admitted, ctx.thresholds) > 0 {
            changed = true;
        }
    }

    if changed {
        state.rebuild_lines_by_y();
    }
    Ok(())
}
