//! Recovery suite: targeted re-recognition of suspicious sub-regions.
//!
//! Every stage shares one page-scoped budget; candidates pass script
//! admission rules before being merged, and duplicates collapse by IoU.
//! A failed region recognition never kills the page: it is logged and the
//! stage moves on.

pub(crate) mod cjk;
pub(crate) mod latin;
pub(crate) mod lines;

use image::RgbaImage;

use crate::cancel::CancelToken;
use crate::config::{FilterThresholds, PageSegMode};
use crate::error::{Result, TextlayerError};
use crate::pipeline::PageState;
use crate::recognizer::{PooledRecognizer, RecognizerParams, RecognizerPool, recognize_region};
use crate::text::lexicon::{is_consonant_garbage, is_lexical_token, is_watermark_token};
use crate::text::{TokenScript, get_alphanum, is_jamo, token_script};
use crate::types::{BBox, Word};

/// Shared handles for one page's recovery stages.
pub(crate) struct RecoveryCtx<'a> {
    pub pool: &'a RecognizerPool,
    pub rec: &'a mut PooledRecognizer,
    pub image: &'a RgbaImage,
    pub page_params: RecognizerParams,
    pub cancel: CancelToken,
    pub thresholds: &'a FilterThresholds,
}

impl RecoveryCtx<'_> {
    /// Re-recognize a sub-region with a stage-specific segmentation mode.
    /// Region failures are swallowed here (empty result, warned); fatal
    /// errors propagate.
    pub(crate) async fn rescan(
        &mut self,
        state: &PageState,
        region: &BBox,
        psm: PageSegMode,
        stage: &'static str,
    ) -> Result<Vec<Word>> {
        self.cancel.bail()?;
        match recognize_region(
            self.pool,
            self.rec,
            self.image,
            region,
            &self.page_params,
            psm,
            state.script,
            &self.cancel,
        )
        .await
        {
            Ok(words) => Ok(words),
            Err(TextlayerError::Region(message)) => {
                tracing::warn!(stage, %message, "region rescan failed, skipping");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Merge recovery candidates into the page, skipping near-duplicates
/// (IoU above the dedup threshold against any existing word) and stopping
/// at the budget. Returns how many words were added.
pub(crate) fn append_unique_words(state: &mut PageState, incoming: Vec<Word>, thresholds: &FilterThresholds) -> usize {
    let mut added = 0usize;
    for word in incoming {
        if state.budget_left() == 0 {
            tracing::debug!("recovery budget exhausted, discarding remaining candidates");
            break;
        }
        let duplicate = state
            .words
            .iter()
            .any(|existing| existing.bbox.iou(&word.bbox) > thresholds.recovery_dedup_iou);
        if duplicate {
            continue;
        }
        state.words.push(word);
        state.recovery_added += 1;
        added += 1;
    }
    added
}

/// Latin recovery admission: plausible geometry, no watermark signatures,
/// no vowelless consonant runs, and a confidence floor that tightens as
/// tokens get shorter.
pub(crate) fn admit_latin(word: &Word, thresholds: &FilterThresholds) -> bool {
    let alnum = get_alphanum(&word.text);
    if alnum.is_empty() {
        return false;
    }
    if word.bbox.width() < thresholds.recovery_min_word_side
        || word.bbox.height() < thresholds.recovery_min_word_side
    {
        return false;
    }
    if is_watermark_token(&word.text) {
        return false;
    }
    if is_consonant_garbage(&word.text, thresholds) {
        return false;
    }
    let min_conf = match alnum.chars().count() {
        1 => thresholds.recovery_latin_conf_len1,
        2 => thresholds.recovery_latin_conf_len2,
        _ => thresholds.recovery_latin_conf_len3,
    };
    word.confidence >= min_conf
}

/// CJK recovery admission: height must sit inside the line-median band,
/// confidence must clear the floor, and Korean non-syllable fragments
/// follow the jamo rules. Neighbor checks are the caller's job because
/// they depend on what else the rescan produced.
pub(crate) fn admit_cjk(word: &Word, line_median_height: f32, thresholds: &FilterThresholds) -> bool {
    let alnum = get_alphanum(&word.text);
    if alnum.is_empty() {
        return false;
    }
    if word.confidence < thresholds.recovery_cjk_min_conf {
        return false;
    }
    if line_median_height > 0.0 {
        let ratio = word.bbox.height() / line_median_height;
        if !(thresholds.recovery_cjk_height_min..=thresholds.recovery_cjk_height_max).contains(&ratio) {
            return false;
        }
    }
    // Recovered pure-jamo fragments are held to the ghost rules outright.
    if matches!(token_script(&word.text), TokenScript::Cjk)
        && alnum.chars().all(is_jamo)
        && word.confidence < thresholds.jamo_max_conf
    {
        return false;
    }
    true
}

/// Admission for the lexical-only rescues: common/short-keep words only.
pub(crate) fn admit_lexical_only(word: &Word, thresholds: &FilterThresholds) -> bool {
    is_lexical_token(&word.text) && admit_latin(word, thresholds)
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
    fn test_append_unique_respects_budget() {
        let mut s = state(1000, 1000, ScriptKind::Latin, vec![]);
        s.recovery_budget = 2;
        let incoming = vec![
            word("a", 90.0, 0.0, 0.0, 20.0, 20.0),
            word("b", 90.0, 40.0, 0.0, 60.0, 20.0),
            word("c", 90.0, 80.0, 0.0, 100.0, 20.0),
        ];
        let added = append_unique_words(&mut s, incoming, &thresholds());
        assert_eq!(added, 2);
        assert_eq!(s.recovery_added, 2);
        assert_eq!(s.words.len(), 2);
    }

    #[test]
    fn test_append_unique_dedups_by_iou() {
        let existing = word("same", 90.0, 0.0, 0.0, 100.0, 20.0);
        let mut s = state(1000, 1000, ScriptKind::Latin, vec![existing]);
        s.recovery_budget = 10;
        let near_duplicate = word("same", 70.0, 2.0, 1.0, 98.0, 19.0);
        let added = append_unique_words(&mut s, vec![near_duplicate], &thresholds());
        assert_eq!(added, 0);
        assert_eq!(s.words.len(), 1);
    }

    #[test]
    fn test_admit_latin_rules() {
        let t = thresholds();
        assert!(admit_latin(&word("KNOW", 60.0, 0.0, 0.0, 40.0, 12.0), &t));
        // Short tokens need more confidence.
        assert!(!admit_latin(&word("K", 60.0, 0.0, 0.0, 10.0, 12.0), &t));
        assert!(admit_latin(&word("K", 80.0, 0.0, 0.0, 10.0, 12.0), &t));
        // Consonant garbage and watermarks never enter.
        assert!(!admit_latin(&word("XQZRT", 95.0, 0.0, 0.0, 40.0, 12.0), &t));
        assert!(!admit_latin(&word("MangaDex", 95.0, 0.0, 0.0, 40.0, 12.0), &t));
        // Tiny geometry is a recognizer artifact.
        assert!(!admit_latin(&word("OK", 95.0, 0.0, 0.0, 2.0, 2.0), &t));
    }

    #[test]
    fn test_admit_cjk_height_band() {
        let t = thresholds();
        // Median line height 20: admitted band is 11..=32.
        assert!(admit_cjk(&word("字", 70.0, 0.0, 0.0, 20.0, 20.0), 20.0, &t));
        assert!(!admit_cjk(&word("字", 70.0, 0.0, 0.0, 20.0, 8.0), 20.0, &t));
        assert!(!admit_cjk(&word("字", 70.0, 0.0, 0.0, 20.0, 50.0), 20.0, &t));
        assert!(!admit_cjk(&word("字", 40.0, 0.0, 0.0, 20.0, 20.0), 20.0, &t));
    }

    #[test]
    fn test_admit_cjk_rejects_weak_jamo() {
        let t = thresholds();
        assert!(!admit_cjk(&word("ㄴ", 70.0, 0.0, 0.0, 20.0, 20.0), 20.0, &t));
        assert!(admit_cjk(&word("내", 70.0, 0.0, 0.0, 20.0, 20.0), 20.0, &t));
    }

    #[test]
    fn test_admit_lexical_only() {
        let t = thresholds();
        assert!(admit_lexical_only(&word("KNOW", 60.0, 0.0, 0.0, 40.0, 12.0), &t));
        assert!(!admit_lexical_only(&word("QWERT", 90.0, 0.0, 0.0, 40.0, 12.0), &t));
    }
}
