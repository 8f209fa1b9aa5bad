//! Script classification derived from the requested recognizer language.
//!
//! The language string is a `+`-joined list of ISO 639 codes as accepted by
//! the recognizer (`"jpn+eng"`, `"kor"`). The derived [`ScriptKind`] drives
//! every per-script threshold in the filter and recovery suites.

use serde::{Deserialize, Serialize};

const CJK_CODES: &[&str] = &["jpn", "jpn_vert", "chi_sim", "chi_tra", "chi_sim_vert", "chi_tra_vert", "kor", "kor_vert"];
const THAI_CODES: &[&str] = &["tha"];

/// Derived classification of the requested language set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Latin,
    /// Japanese, Chinese or Korean. The Korean sub-flag gates the
    /// jamo-specific filters.
    Cjk {
        korean: bool,
    },
    Thai,
    /// CJK or Thai combined with a Latin language.
    Mixed,
}

impl ScriptKind {
    /// Classify a `+`-joined language string.
    pub fn from_language(language: &str) -> Self {
        let codes: Vec<&str> = language
            .split('+')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();

        let cjk = codes.iter().any(|c| CJK_CODES.contains(c));
        let thai = codes.iter().any(|c| THAI_CODES.contains(c));
        let latin = codes.iter().any(|c| !CJK_CODES.contains(c) && !THAI_CODES.contains(c));

        match (cjk, thai, latin) {
            (true, _, true) | (_, true, true) => Self::Mixed,
            (true, _, false) => Self::Cjk {
                korean: codes.iter().any(|c| c.starts_with("kor")),
            },
            (false, true, false) => Self::Thai,
            _ => Self::Latin,
        }
    }

    /// True for CJK and for mixed sets that include a CJK code.
    pub fn is_cjk(&self) -> bool {
        matches!(self, Self::Cjk { .. })
    }

    pub fn is_korean(&self) -> bool {
        matches!(self, Self::Cjk { korean: true })
    }

    pub fn is_thai(&self) -> bool {
        matches!(self, Self::Thai)
    }

    /// True when the Latin-specific filter families apply: the language set
    /// contains no CJK and no Thai code.
    pub fn is_latin(&self) -> bool {
        matches!(self, Self::Latin)
    }
}

/// Whether any code in the `+`-joined language string is a CJK language.
pub fn is_cjk_language(language: &str) -> bool {
    language
        .split('+')
        .map(str::trim)
        .any(|c| CJK_CODES.contains(&c))
}

/// Whether any code in the `+`-joined language string is Thai.
pub fn is_thai_language(language: &str) -> bool {
    language
        .split('+')
        .map(str::trim)
        .any(|c| THAI_CODES.contains(&c))
}

/// Whether the `+`-joined language string contains the given code.
pub fn has_lang_code(language: &str, code: &str) -> bool {
    language.split('+').map(str::trim).any(|c| c == code)
}

/// Canonical form used for cache validity: codes sorted and `+`-joined, so
/// `"eng+jpn"` and `"jpn+eng"` compare equal.
pub fn normalize_language(language: &str) -> String {
    let mut codes: Vec<&str> = language
        .split('+')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    codes.sort_unstable();
    codes.dedup();
    codes.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_language() {
        assert_eq!(ScriptKind::from_language("eng"), ScriptKind::Latin);
        assert_eq!(ScriptKind::from_language("deu+fra"), ScriptKind::Latin);
    }

    #[test]
    fn test_cjk_language() {
        assert_eq!(ScriptKind::from_language("jpn"), ScriptKind::Cjk { korean: false });
        assert_eq!(ScriptKind::from_language("kor"), ScriptKind::Cjk { korean: true });
        assert_eq!(
            ScriptKind::from_language("kor_vert"),
            ScriptKind::Cjk { korean: true }
        );
    }

    #[test]
    fn test_thai_language() {
        assert_eq!(ScriptKind::from_language("tha"), ScriptKind::Thai);
    }

    #[test]
    fn test_mixed_language() {
        assert_eq!(ScriptKind::from_language("jpn+eng"), ScriptKind::Mixed);
        assert_eq!(ScriptKind::from_language("tha+eng"), ScriptKind::Mixed);
    }

    #[test]
    fn test_has_lang_code() {
        assert!(has_lang_code("jpn+eng", "eng"));
        assert!(!has_lang_code("jpn+eng", "kor"));
    }

    #[test]
    fn test_normalize_language_sorts_and_dedups() {
        assert_eq!(normalize_language("jpn+eng"), "eng+jpn");
        assert_eq!(normalize_language("eng+jpn"), "eng+jpn");
        assert_eq!(normalize_language("eng+eng"), "eng");
        assert_eq!(normalize_language(" eng + jpn "), "eng+jpn");
    }
}
