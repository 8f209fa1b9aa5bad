//! Lexical guidance for the Latin filter families.
//!
//! The closed word sets below are used only to protect and score lines,
//! never for spell correction. Watermark signatures match against the
//! uppercase alphanumeric form of a token.

use ahash::AHashSet;
use once_cell::sync::Lazy;

use crate::config::FilterThresholds;
use crate::types::Word;

use super::get_alphanum;

/// Common short English words. Lines carrying two or more of these are
/// considered lexically anchored.
static COMMON_WORDS: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "THE", "A", "I", "YOU", "IT", "IS", "TO", "OF", "IN", "ON", "AND", "OR", "NOT", "NO", "YES", "DO", "DONT",
        "CANT", "WONT", "IM", "ILL", "ITS", "WE", "HE", "SHE", "THEY", "MY", "YOUR", "ME", "SO", "BUT", "FOR",
        "WITH", "THIS", "THAT", "ARE", "WAS", "BE", "CAN", "ALL", "JUST", "LIKE", "KNOW", "GET", "GO", "NOW",
        "HOW", "WHY", "WHAT", "WHO", "WHERE", "WHEN", "OK", "OH", "HEY", "HUH", "WOW", "WELL", "HERE", "THERE",
        "WAIT", "STOP", "LOOK", "COME", "BACK", "ONE", "OUT", "UP", "IF", "AT", "AS", "AN", "AM", "US", "HIM",
        "HER", "HIS", "OUR", "WAS", "DID", "HAS", "HAD", "HAVE", "WILL", "GOOD", "RIGHT", "THEN", "THAN",
        "ABOUT", "REALLY", "SOMETHING", "NOTHING", "PLEASE", "THANK", "THANKS", "SORRY", "SIR", "YEAH",
    ]
    .into_iter()
    .collect()
});

/// Short tokens that are legitimate words on their own and must survive
/// aggressive short-token pruning.
static SHORT_KEEP: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "I", "A", "IT", "TO", "DO", "GO", "NO", "OK", "OH", "HI", "MY", "WE", "HE", "SO", "UP", "AM", "AN", "AS",
        "AT", "BE", "BY", "IF", "IN", "IS", "ME", "OF", "ON", "OR", "US", "YA", "YO",
    ]
    .into_iter()
    .collect()
});

/// Known watermark signatures: aggregator site names and publisher tags.
/// Matched by substring against uppercase alphanumerics, so `LikeManga.io`
/// (alnum `LIKEMANGAIO`) hits `LIKEMANGA`.
static WATERMARK_SIGNATURES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "LIKEMANGA",
        "MANGADEX",
        "MANGAKAKALOT",
        "MANGAFOX",
        "MANGAHERE",
        "MANGAPARK",
        "READMANGA",
        "MANGAREADER",
        "WEBTOONS",
        "TOONILY",
        "ASURASCAN",
        "REAPERSCAN",
        "FLAMESCAN",
        "LUMINOUSSCAN",
        "SCANLATION",
        "RAWKUMA",
        "COMICK",
        "BATO",
        "NEWTOKI",
        "HTTPS",
        "HTTP",
        "WWWW",
    ]
});

const VOWELS: &str = "AEIOUY";

/// Whether a token's uppercase alnum form is one of the lexical sets.
pub fn is_lexical_token(text: &str) -> bool {
    let alnum = get_alphanum(text).to_uppercase();
    is_lexical_upper(&alnum)
}

fn is_lexical_upper(upper: &str) -> bool {
    !upper.is_empty() && (COMMON_WORDS.contains(upper) || SHORT_KEEP.contains(upper))
}

/// Whether the token is in the short allow-list specifically.
pub fn is_short_keep(text: &str) -> bool {
    let alnum = get_alphanum(text).to_uppercase();
    SHORT_KEEP.contains(alnum.as_str())
}

/// Number of lexical tokens in a word sequence.
pub fn lexical_hits(words: &[Word]) -> usize {
    words.iter().filter(|w| is_lexical_token(&w.text)).count()
}

/// Whether a token's uppercase alnum form matches a watermark signature.
pub fn is_watermark_token(text: &str) -> bool {
    let alnum = get_alphanum(text).to_uppercase();
    if alnum.len() < 4 {
        return false;
    }
    WATERMARK_SIGNATURES.iter().any(|sig| alnum.contains(sig))
}

/// Map common recognizer digit/letter confusions before structural checks,
/// so `L00K` scores like `LOOK`.
fn unleet(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '3' => 'E',
        '4' => 'A',
        '5' => 'S',
        '7' => 'T',
        '8' => 'B',
        _ => c,
    }
}

fn has_vowel(upper_alnum: &str) -> bool {
    upper_alnum.chars().any(|c| VOWELS.contains(c))
}

/// Longest run of consecutive consonant letters.
fn max_consonant_run(upper_alnum: &str) -> usize {
    let mut max_run = 0usize;
    let mut run = 0usize;
    for c in upper_alnum.chars() {
        if c.is_ascii_alphabetic() && !VOWELS.contains(c) {
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 0;
        }
    }
    max_run
}

/// Recovery admission guard: a vowelless token with a long consonant run
/// (after leet mapping) is recognizer garbage, not a word.
pub fn is_consonant_garbage(text: &str, thresholds: &FilterThresholds) -> bool {
    let upper: String = get_alphanum(text).chars().map(unleet).collect::<String>().to_uppercase();
    if upper.is_empty() {
        return false;
    }
    !has_vowel(&upper) && max_consonant_run(&upper) >= thresholds.readability_consonant_run
}

/// Lowercase letter immediately followed by an uppercase one inside a short
/// token (`"rE"`) marks a case-garbled fragment.
fn has_case_garble(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() > 4 {
        return false;
    }
    chars
        .windows(2)
        .any(|pair| pair[0].is_lowercase() && pair[1].is_uppercase())
}

/// Readability score in `[0, 1]` for a single token.
///
/// Combines recognizer confidence with structural plausibility: vowel
/// presence, consonant runs (after leet mapping), length class, and
/// case-garble penalties. Lexical tokens get a floor so closed-set words
/// always read as plausible.
pub fn token_readability(text: &str, confidence: f32, thresholds: &FilterThresholds) -> f32 {
    let alnum_raw = get_alphanum(text);
    if alnum_raw.is_empty() {
        // Pure punctuation carries no lexical evidence either way.
        return 0.3;
    }
    let upper: String = alnum_raw.chars().map(unleet).collect::<String>().to_uppercase();

    let w_conf = thresholds.readability_confidence_weight;
    let mut score = (confidence / 100.0).clamp(0.0, 1.0) * w_conf;

    let mut structure = 0.0f32;
    if has_vowel(&upper) {
        structure += 0.35;
    }
    let run = max_consonant_run(&upper);
    if run < thresholds.readability_consonant_run {
        structure += 0.25;
    } else if run >= thresholds.readability_consonant_run + 2 {
        structure -= 0.15;
    }
    structure += match upper.chars().count() {
        1 => {
            if matches!(upper.as_str(), "I" | "A" | "O") {
                0.2
            } else {
                0.0
            }
        }
        2..=12 => 0.25,
        13..=16 => 0.15,
        _ => 0.05,
    };
    if has_case_garble(text) {
        structure -= 0.2;
    }

    score += structure.clamp(0.0, 1.0) * (1.0 - w_conf);

    // The lexical floor applies to the unleeted form, so `L00K` reads as
    // well as `LOOK`.
    if is_lexical_upper(&upper) {
        score = score.max(0.8);
    }
    score.clamp(0.0, 1.0)
}

/// Mean token readability over a word sequence.
pub fn line_readability(words: &[Word], thresholds: &FilterThresholds) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    words
        .iter()
        .map(|w| token_readability(&w.text, w.confidence, thresholds))
        .sum::<f32>()
        / words.len() as f32
}
