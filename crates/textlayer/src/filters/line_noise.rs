//! Per-line token noise cleanup, the first filter after parsing.
//!
//! Targets the classic recognizer artifacts inside otherwise healthy lines:
//! stray low-confidence single characters, case-garbled two-letter
//! fragments, and bullet-like specks recognized as a leading `m`/`b`/`i`.
//! Non-Latin tokens are never dropped here, and sparse CJK pages skip the
//! pass entirely so thin balloons are not erased.

use crate::config::FilterThresholds;
use crate::pipeline::PageState;
use crate::text::{TokenScript, token_script};
use crate::types::{Word, WordKey};

const FILTER_NAME: &str = "line_noise";

/// Single characters that are legitimate words and survive when the line
/// context supports them.
const KEEPABLE_SINGLES: &[&str] = &["I", "A", "a"];

/// Leading specks commonly hallucinated from bullets and panel borders.
const BULLET_ARTIFACTS: &[&str] = &["m", "b", "i", "1", "e"];

pub(crate) fn apply(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    if state.script.is_cjk() && state.words.len() <= thresholds.noise_cjk_skip_max_words {
        return 0;
    }

    let median_height = state.median_word_height().max(1.0);
    let mut drops: Vec<(WordKey, String)> = Vec::new();

    for line in &state.lines {
        for (index, word) in line.words.iter().enumerate() {
            if let Some(reason) = classify_noise(word, index, line.words.len(), median_height, thresholds) {
                drops.push((word.key(), reason));
            }
        }
    }

    state.apply_drops(FILTER_NAME, drops)
}

fn classify_noise(
    word: &Word,
    index: usize,
    line_len: usize,
    median_height: f32,
    thresholds: &FilterThresholds,
) -> Option<String> {
    // Never touch CJK/Thai tokens in this pass.
    if !matches!(token_script(&word.text), TokenScript::Latin) {
        return None;
    }

    let char_count = word.text.chars().count();
    let height_ratio = word.bbox.height() / median_height;

    if char_count == 1 {
        if KEEPABLE_SINGLES.contains(&word.text.as_str())
            && line_len >= 2
            && height_ratio >= thresholds.noise_keep_min_height_ratio
        {
            return None;
        }
        if index == 0 && line_len >= 2 && BULLET_ARTIFACTS.contains(&word.text.as_str()) {
            return Some("leading bullet-like artifact".to_string());
        }
        if word.confidence < thresholds.noise_single_char_max_conf {
            return Some("low-confidence single character".to_string());
        }
        if height_ratio < thresholds.noise_keep_min_height_ratio {
            return Some("undersized single character".to_string());
        }
        return None;
    }

    if char_count <= 3
        && word.confidence < thresholds.noise_fragment_max_conf
        && is_case_garbled(&word.text)
    {
        return Some("case-garbled short fragment".to_string());
    }

    None
}

/// `"rE"`-style fragments: lowercase letter immediately followed by an
/// uppercase one.
fn is_case_garbled(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    chars
        .windows(2)
        .any(|pair| pair[0].is_lowercase() && pair[1].is_uppercase())
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
    fn test_drops_low_confidence_single_char() {
        let words = vec![
            word("x", 20.0, 0.0, 0.0, 12.0, 12.0),
            word("HELLO", 90.0, 20.0, 0.0, 80.0, 12.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert_eq!(s.words.len(), 1);
        assert_eq!(s.words[0].text, "HELLO");
    }

    #[test]
    fn test_keeps_designated_single_chars() {
        let words = vec![
            word("I", 70.0, 0.0, 0.0, 10.0, 12.0),
            word("KNOW", 90.0, 18.0, 0.0, 60.0, 12.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply(&mut s, &thresholds());
        assert_eq!(removed, 0);
        assert_eq!(s.words.len(), 2);
    }

    #[test]
    fn test_drops_leading_bullet_artifact() {
        let words = vec![
            word("m", 80.0, 0.0, 2.0, 8.0, 10.0),
            word("HELLO", 90.0, 20.0, 0.0, 80.0, 12.0),
            word("THERE", 90.0, 90.0, 0.0, 150.0, 12.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        let removed = apply(&mut s, &thresholds());
        assert_eq!(removed, 1);
        assert!(s.words.iter().all(|w| w.text != "m"));
    }

    #[test]
    fn test_drops_case_garbled_fragment() {
        let words = vec![
            word("rE", 40.0, 0.0, 0.0, 20.0, 12.0),
            word("REAL", 90.0, 30.0, 0.0, 80.0, 12.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        assert_eq!(apply(&mut s, &thresholds()), 1);
    }

    #[test]
    fn test_never_drops_cjk_tokens() {
        let words = vec![
            word("あ", 10.0, 0.0, 0.0, 12.0, 12.0),
            word("HELLO", 90.0, 20.0, 0.0, 80.0, 12.0),
            word("x", 90.0, 90.0, 0.0, 100.0, 12.0),
            word("y", 90.0, 110.0, 0.0, 120.0, 12.0),
            word("z", 90.0, 130.0, 0.0, 140.0, 12.0),
            word("w", 90.0, 150.0, 0.0, 160.0, 12.0),
            word("v", 90.0, 170.0, 0.0, 180.0, 12.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Cjk { korean: false }, words);
        apply(&mut s, &thresholds());
        assert!(s.words.iter().any(|w| w.text == "あ"));
    }

    #[test]
    fn test_sparse_cjk_page_is_skipped() {
        let words = vec![
            word("x", 10.0, 0.0, 0.0, 12.0, 12.0),
            word("日", 50.0, 20.0, 0.0, 32.0, 12.0),
        ];
        let mut s = state(1000, 1000, ScriptKind::Cjk { korean: false }, words);
        assert_eq!(apply(&mut s, &thresholds()), 0);
        assert_eq!(s.words.len(), 2);
    }

    #[test]
    fn test_protected_words_survive() {
        let words = vec![
            word("x", 10.0, 0.0, 0.0, 12.0, 12.0),
            word("HELLO", 90.0, 20.0, 0.0, 80.0, 12.0),
        ];
        let key = words[0].key();
        let mut s = state(1000, 1000, ScriptKind::Latin, words);
        s.protected.insert(key);
        assert_eq!(apply(&mut s, &thresholds()), 0);
    }
}
