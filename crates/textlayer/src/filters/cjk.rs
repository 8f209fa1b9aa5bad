//! CJK-specific noise filters: isolated tokens, Korean jamo ghosts and weak
//! orphan lines.

use crate::config::FilterThresholds;
use crate::pipeline::PageState;
use crate::text::{TokenScript, get_alphanum, is_hangul_syllable, is_jamo, token_script};
use crate::types::{Word, WordKey};

use super::surrounding_variance;

/// Isolated CJK noise: every non-Latin token needs at least one aligned
/// neighbor within `1.5 x` median height, or very high confidence.
/// Hallucinated ideographs over art are almost always alone.
pub(crate) fn apply_isolated(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    if state.words.len() < 2 {
        return 0;
    }
    let median_height = state.median_word_height().max(1.0);
    let range = thresholds.cjk_isolated_neighbor_range * median_height;

    let drops: Vec<(WordKey, String)> = state
        .words
        .iter()
        .filter(|w| !matches!(token_script(&w.text), TokenScript::Latin | TokenScript::Punctuation))
        .filter(|w| w.confidence < thresholds.cjk_isolated_keep_conf)
        .filter(|w| !has_aligned_neighbor(w, &state.words, range))
        .map(|w| (w.key(), "isolated CJK token without neighbors".to_string()))
        .collect();

    state.apply_drops("cjk_isolated", drops)
}

fn has_aligned_neighbor(word: &Word, words: &[Word], range: f32) -> bool {
    let (cx, cy) = word.bbox.center();
    words.iter().any(|other| {
        if std::ptr::eq(word, other) || other.key() == word.key() {
            return false;
        }
        let (ox, oy) = other.bbox.center();
        let horizontal = (oy - cy).abs() <= word.bbox.height() * 0.7
            && word.bbox.min_horizontal_gap(&other.bbox) <= range;
        let vertical = (ox - cx).abs() <= word.bbox.width() * 0.7
            && vertical_gap(&word.bbox, &other.bbox) <= range;
        horizontal || vertical
    })
}

fn vertical_gap(a: &crate::types::BBox, b: &crate::types::BBox) -> f32 {
    if a.y1 < b.y0 {
        b.y0 - a.y1
    } else if b.y1 < a.y0 {
        a.y0 - b.y1
    } else {
        0.0
    }
}

/// Korean jamo ghosts: standalone consonant/vowel fragments the recognizer
/// produces from stroke noise. Legitimate jamo runs exist (laughter like
/// ㅋㅋㅋ), so repeated high-confidence runs survive.
pub(crate) fn apply_jamo(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    if !state.script.is_korean() {
        return 0;
    }

    let drops: Vec<(WordKey, String)> = state
        .words
        .iter()
        .filter_map(|w| classify_jamo(w, thresholds).map(|r| (w.key(), r)))
        .collect();

    state.apply_drops("korean_jamo", drops)
}

fn classify_jamo(word: &Word, thresholds: &FilterThresholds) -> Option<String> {
    let alnum = get_alphanum(&word.text);
    if alnum.is_empty() {
        return None;
    }
    let chars: Vec<char> = alnum.chars().collect();
    let jamo_count = chars.iter().filter(|c| is_jamo(**c)).count();
    if jamo_count == 0 {
        return None;
    }

    let all_jamo = jamo_count == chars.len();
    if all_jamo {
        if is_laughter_run(&chars) && word.confidence >= thresholds.jamo_laughter_keep_conf {
            return None;
        }
        if chars.len() <= 2 && word.confidence < thresholds.jamo_max_conf {
            return Some("pure-jamo short token".to_string());
        }
        if word.confidence < thresholds.jamo_max_conf {
            return Some("pure-jamo token".to_string());
        }
        return None;
    }

    // Mixes like "ㄴ내": a jamo glued to a syllable edge is a ghost stroke.
    let has_syllable = chars.iter().any(|c| is_hangul_syllable(*c));
    let edge_jamo = is_jamo(chars[0]) || is_jamo(*chars.last().expect("non-empty"));
    if has_syllable && edge_jamo && word.confidence < thresholds.jamo_max_conf {
        return Some("jamo ghost at syllable edge".to_string());
    }
    None
}

/// ㅋㅋㅋ / ㅎㅎ / ㅠㅠ-style runs: at least two characters, all the same
/// laughter jamo.
fn is_laughter_run(chars: &[char]) -> bool {
    const LAUGHTER: &[char] = &['ㅋ', 'ㅎ', 'ㅠ', 'ㅜ'];
    chars.len() >= 2 && chars.iter().all(|c| *c == chars[0]) && LAUGHTER.contains(&chars[0])
}

/// Weak isolated CJK lines: short, uncertain lines on busy backgrounds that
/// have no stronger horizontally-overlapping neighbor nearby.
pub(crate) fn apply_weak_lines(state: &mut PageState, thresholds: &FilterThresholds) -> usize {
    let Some(gray) = state.gray.take() else {
        return 0;
    };

    let mut line_heights: Vec<f32> = state.lines.iter().map(|l| l.bbox.height()).collect();
    let median_line_height = crate::text::median_in_place(&mut line_heights).max(1.0);
    let range = thresholds.weak_line_neighbor_range * median_line_height;

    let mut drops: Vec<(WordKey, String)> = Vec::new();
    for (i, line) in state.lines.iter().enumerate() {
        let char_count: usize = line.words.iter().map(|w| get_alphanum(&w.text).chars().count()).sum();
        if char_count > thresholds.weak_line_max_chars || line.confidence >= thresholds.weak_line_max_conf {
            continue;
        }
        if surrounding_variance(&gray, &line.bbox) <= thresholds.bg_variance_max {
            continue;
        }

        let has_stronger_neighbor = state.lines.iter().enumerate().any(|(j, other)| {
            j != i
                && other.confidence > line.confidence
                && line.bbox.horizontal_overlap_ratio(&other.bbox) > 0.0
                && vertical_gap(&line.bbox, &other.bbox) <= range
        });
        if !has_stronger_neighbor {
            for word in &line.words {
                drops.push((word.key(), "weak isolated CJK line".to_string()));
            }
        }
    }

    let removed = state.apply_drops("cjk_weak_line", drops);
    state.gray = Some(gray);
    removed
}
