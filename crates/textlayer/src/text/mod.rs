//! Unicode-level text utilities: script classes, alphanumeric stripping and
//! language-aware word joining.

pub mod lexicon;

use unicode_normalization::UnicodeNormalization;

use crate::types::{ScriptKind, Word};

/// Script class of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharScript {
    Latin,
    Cjk,
    Thai,
    Other,
}

/// Script class of a whole token, derived from its letter/digit content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScript {
    Latin,
    Cjk,
    Thai,
    /// No letters or digits at all.
    Punctuation,
}

pub fn is_cjk_char(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}'   // Hiragana
        | '\u{30A0}'..='\u{30FF}' // Katakana
        | '\u{31F0}'..='\u{31FF}' // Katakana phonetic extensions
        | '\u{FF66}'..='\u{FF9D}' // Halfwidth katakana
        | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
        | '\u{3400}'..='\u{4DBF}' // CJK extension A
        | '\u{F900}'..='\u{FAFF}' // CJK compatibility ideographs
        | '\u{AC00}'..='\u{D7A3}' // Hangul syllables
        | '\u{1100}'..='\u{11FF}' // Hangul jamo
        | '\u{3130}'..='\u{318F}' // Hangul compatibility jamo
    )
}

pub fn is_thai_char(c: char) -> bool {
    matches!(c, '\u{0E00}'..='\u{0E7F}')
}

/// Standalone Hangul jamo (not a composed syllable).
pub fn is_jamo(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'
        | '\u{3130}'..='\u{318F}'
        | '\u{A960}'..='\u{A97F}'
        | '\u{D7B0}'..='\u{D7FF}'
    )
}

pub fn is_hangul_syllable(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}')
}

pub fn char_script(c: char) -> CharScript {
    if is_cjk_char(c) {
        CharScript::Cjk
    } else if is_thai_char(c) {
        CharScript::Thai
    } else if c.is_alphanumeric() {
        CharScript::Latin
    } else {
        CharScript::Other
    }
}

/// NFC-normalize a string, the canonical form for all stored word text.
pub fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Strip punctuation and symbols, keeping Unicode letters and numbers.
pub fn get_alphanum(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Dominant script of a token. A token with no letters or digits is
/// punctuation; otherwise the majority class among its alphanumerics wins,
/// with CJK taking precedence on ties (a single ideograph carries more
/// signal than a stray Latin digit).
pub fn token_script(s: &str) -> TokenScript {
    let mut latin = 0usize;
    let mut cjk = 0usize;
    let mut thai = 0usize;
    for c in s.chars() {
        match char_script(c) {
            CharScript::Latin => latin += 1,
            CharScript::Cjk => cjk += 1,
            CharScript::Thai => thai += 1,
            CharScript::Other => {}
        }
    }
    if latin == 0 && cjk == 0 && thai == 0 {
        TokenScript::Punctuation
    } else if cjk >= latin && cjk >= thai {
        TokenScript::Cjk
    } else if thai > latin {
        TokenScript::Thai
    } else {
        TokenScript::Latin
    }
}

/// Normalized-gap thresholds for inserting a space while joining.
const JOIN_GAP_CJK: f32 = 0.9;
const JOIN_GAP_LATIN: f32 = 0.2;

/// Concatenate words in reading order, inserting spaces only where the
/// median-height-normalized horizontal gap warrants one.
///
/// Between two CJK/Thai tokens no space is inserted unless the gap exceeds
/// `0.9 x` the median word height; between Latin tokens the threshold is
/// `0.2 x`. A script boundary always gets a space; punctuation-only tokens
/// attach without a leading space.
pub fn join_words_for_language(words: &[Word], script: ScriptKind) -> String {
    if words.is_empty() {
        return String::new();
    }

    let mut heights: Vec<f32> = words.iter().map(|w| w.bbox.height()).collect();
    let median_height = median_in_place(&mut heights).max(1.0);

    let mut out = String::with_capacity(words.iter().map(|w| w.text.len() + 1).sum());
    out.push_str(&words[0].text);

    for pair in words.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if needs_space(prev, next, median_height, script) {
            out.push(' ');
        }
        out.push_str(&next.text);
    }
    out
}

fn needs_space(prev: &Word, next: &Word, median_height: f32, script: ScriptKind) -> bool {
    let next_script = token_script(&next.text);
    if next_script == TokenScript::Punctuation {
        return false;
    }
    let prev_script = token_script(&prev.text);
    if prev_script == TokenScript::Punctuation {
        // Opening punctuation inherits the page script's spacing rule.
        return !script.is_cjk() && !script.is_thai();
    }

    let spacey = |s: TokenScript| s == TokenScript::Latin;
    if spacey(prev_script) != spacey(next_script) {
        return true;
    }

    let gap = next.bbox.x0 - prev.bbox.x1;
    let normalized = gap / median_height;
    let threshold = if spacey(prev_script) { JOIN_GAP_LATIN } else { JOIN_GAP_CJK };
    normalized > threshold
}

/// Median of a mutable sample; the slice order is consumed.
pub(crate) fn median_in_place(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Median height over a word set, `0.0` when empty.
pub fn median_word_height(words: &[Word]) -> f32 {
    let mut heights: Vec<f32> = words.iter().map(|w| w.bbox.height()).collect();
    median_in_place(&mut heights)
}
