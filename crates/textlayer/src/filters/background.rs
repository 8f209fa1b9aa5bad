//! Background-variance filter: words sitting on busy backgrounds.
//!
//! Decorative art, screentones and gradients around a word are a strong
//! noise signal when the word itself is small and uncertain. The variance
//! is measured outside the word's inner rectangle so the strokes do not
//! count against it.

use crate::config::FilterThresholds;
use crate::pipeline::PageState;
use crate::text::{TokenScript, get_alphanum, token_script};
use crate::types::{Word, WordKey};

use super::surrounding_variance;

const FILTER_NAME: &str = "background_variance";

fn classify_drop(
    word: &Word,
    variance: f32,
    page_height: f32,
    thresholds: &FilterThresholds,
) -> Option<String> {
    if variance <= thresholds.bg_variance_max {
        return None;
    }

    let height_ratio = word.bbox.height() / page_height;
    match token_script(&word.text) {
        TokenScript::Cjk => {
            let alnum_len = get_alphanum(&word.text).chars().count();
            if alnum_len <= thresholds.bg_cjk_max_alnum_len && word.confidence < thresholds.bg_cjk_drop_max_conf {
                return Some("short CJK token on busy background".to_string());
            }
        }
        _ => {
            if height_ratio <= thresholds.bg_drop_max_height_ratio && word.confidence < thresholds.bg_drop_max_conf {
                return Some("small low-confidence word on busy background".to_string());
            }
        }
    }
    None
}

pub(crate) fn apply(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let Some(gray) = state.gray.take() else {
        return 0;
    };

    let page_height = state.page_height();
    let drops: Vec<(WordKey, String)> = state
        .words
        .iter()
        .filter_map(|w| {
            let variance = surrounding_variance(&gray, &w.bbox);
            classify_drop(w, variance, page_height, thresholds).map(|r| (w.key(), r))
        })
        .collect();

    let removed = state.apply_drops(FILTER_NAME, drops);
    state.gray = Some(gray);
    removed
}
