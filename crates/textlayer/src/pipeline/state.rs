//! Mutable per-page state threaded through the pipeline stages.

use ahash::AHashSet;
use image::GrayImage;

use crate::config::{FilterThresholds, PageSegMode};
use crate::spatial::{build_lines_from_words_by_y, rebuild_lines_from_words};
use crate::text::{lexicon, median_word_height};
use crate::types::{DropRecord, Line, LineBox, ScriptKind, Word, WordKey};

/// Everything a stage needs to know about the page being processed.
///
/// Stages mutate `words` and rebuild `lines`; `gray` is written once by
/// preprocessing and read-only afterwards. The protected set records words
/// that no filter may drop.
pub struct PageState {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub language: String,
    pub script: ScriptKind,
    pub psm: PageSegMode,
    pub words: Vec<Word>,
    pub lines: Vec<Line>,
    pub line_boxes: Vec<LineBox>,
    pub line_keys_with_words: AHashSet<String>,
    pub gray: Option<GrayImage>,
    pub protected: AHashSet<WordKey>,
    pub recovery_added: u32,
    pub recovery_budget: u32,
    /// Raw whole-page recognizer text, the last-resort `full_text` source.
    pub raw_text: String,
    pub raw_confidence: f32,
    /// Drop records, collected only when the request asked for them.
    pub drops: Option<Vec<DropRecord>>,
}

impl PageState {
    pub fn page_width(&self) -> f32 {
        self.width as f32
    }

    pub fn page_height(&self) -> f32 {
        self.height as f32
    }

    pub fn median_word_height(&self) -> f32 {
        median_word_height(&self.words)
    }

    pub fn is_protected(&self, word: &Word) -> bool {
        self.protected.contains(&word.key())
    }

    /// Remaining recovery budget for this page.
    pub fn budget_left(&self) -> u32 {
        self.recovery_budget.saturating_sub(self.recovery_added)
    }

    /// Mark words of strong base lines as undroppable: lines long enough or
    /// confident enough to be trusted, plus Latin lines anchored by common
    /// lexical words.
    pub fn build_protected_set(&mut self, thresholds: &FilterThresholds) {
        for line in &self.lines {
            // The confidence rule needs at least two words: a lone confident
            // token is exactly what the noise filters exist to judge.
            let strong = line.words.len() >= thresholds.protect_min_words
                || (line.words.len() >= 2 && line.confidence >= thresholds.protect_min_confidence);
            let lexical = self.script.is_latin()
                && lexicon::lexical_hits(&line.words) >= thresholds.protect_lexical_hits;
            if strong || lexical {
                for word in &line.words {
                    self.protected.insert(word.key());
                }
            }
        }
        tracing::debug!(protected = self.protected.len(), "protected set built");
    }

    /// Drop the given words (by identity), record the reasons, and rebuild
    /// lines from the survivors. Protected words are silently retained.
    ///
    /// Returns the number of words actually removed.
    pub fn apply_drops(&mut self, filter: &'static str, drops: Vec<(WordKey, String)>) -> usize {
        if drops.is_empty() {
            return 0;
        }
        let mut doomed: ahash::AHashMap<WordKey, String> = ahash::AHashMap::new();
        for (key, reason) in drops {
            if !self.protected.contains(&key) {
                doomed.insert(key, reason);
            }
        }
        if doomed.is_empty() {
            return 0;
        }

        let mut removed = 0usize;
        let mut kept: Vec<Word> = Vec::with_capacity(self.words.len());
        for word in self.words.drain(..) {
            if let Some(reason) = doomed.get(&word.key()) {
                removed += 1;
                if let Some(records) = self.drops.as_mut() {
                    records.push(DropRecord {
                        filter: filter.to_string(),
                        reason: reason.clone(),
                        text: word.text.clone(),
                        bbox: word.bbox,
                    });
                }
            } else {
                kept.push(word);
            }
        }
        self.words = kept;

        if removed > 0 {
            tracing::debug!(filter, removed, remaining = self.words.len(), "filter dropped words");
            self.rebuild_lines();
        }
        removed
    }

    /// Rebuild lines from the current words, respecting the previous
    /// grouping where it survives.
    pub fn rebuild_lines(&mut self) {
        self.lines = rebuild_lines_from_words(&self.lines, &self.words, self.page_height(), self.script);
    }

    /// Regroup lines from scratch by y-center proximity.
    pub fn rebuild_lines_by_y(&mut self) {
        self.lines = build_lines_from_words_by_y(&self.words, self.page_height(), self.script);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    fn word(text: &str, conf: f32, x0: f32, y0: f32) -> Word {
        Word::new(text, conf, BBox::new(x0, y0, x0 + 30.0, y0 + 12.0))
    }

    fn state_with(words: Vec<Word>) -> PageState {
        let mut state = PageState {
            width: 1000,
            height: 1000,
            dpi: 300,
            language: "eng".to_string(),
            script: ScriptKind::Latin,
            psm: PageSegMode::Auto,
            words,
            lines: Vec::new(),
            line_boxes: Vec::new(),
            line_keys_with_words: AHashSet::new(),
            gray: None,
            protected: AHashSet::new(),
            recovery_added: 0,
            recovery_budget: 40,
            raw_text: String::new(),
            raw_confidence: 0.0,
            drops: Some(Vec::new()),
        };
        state.rebuild_lines_by_y();
        state
    }

    #[test]
    fn test_apply_drops_removes_and_records() {
        let words = vec![word("keep", 90.0, 0.0, 0.0), word("noise", 20.0, 500.0, 0.0)];
        let doomed = words[1].key();
        let mut state = state_with(words);

        let removed = state.apply_drops("test_filter", vec![(doomed, "low confidence".to_string())]);
        assert_eq!(removed, 1);
        assert_eq!(state.words.len(), 1);
        assert_eq!(state.words[0].text, "keep");
        let drops = state.drops.as_ref().unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].filter, "test_filter");
    }

    #[test]
    fn test_apply_drops_honors_protection() {
        let words = vec![word("vital", 90.0, 0.0, 0.0)];
        let key = words[0].key();
        let mut state = state_with(words);
        state.protected.insert(key.clone());

        let removed = state.apply_drops("test_filter", vec![(key, "should not happen".to_string())]);
        assert_eq!(removed, 0);
        assert_eq!(state.words.len(), 1);
    }

    #[test]
    fn test_protected_set_from_confident_line() {
        let words = vec![word("quite", 95.0, 0.0, 0.0), word("sure", 95.0, 40.0, 0.0)];
        let mut state = state_with(words);
        state.build_protected_set(&FilterThresholds::default());
        assert!(state.is_protected(&state.words[0].clone()));
        assert!(state.is_protected(&state.words[1].clone()));
    }

    #[test]
    fn test_lone_confident_token_not_protected() {
        let words = vec![word("watermark", 95.0, 0.0, 0.0)];
        let mut state = state_with(words);
        state.build_protected_set(&FilterThresholds::default());
        assert!(!state.is_protected(&state.words[0].clone()));
    }

    #[test]
    fn test_protected_set_from_lexical_line() {
        let words = vec![word("I", 30.0, 0.0, 0.0), word("KNOW", 30.0, 40.0, 0.0)];
        let mut state = state_with(words);
        state.build_protected_set(&FilterThresholds::default());
        // Low confidence, but two lexical hits protect the line.
        assert!(state.is_protected(&state.words[0].clone()));
        assert!(state.is_protected(&state.words[1].clone()));
    }

    #[test]
    fn test_budget_left_saturates() {
        let mut state = state_with(vec![]);
        state.recovery_added = 50;
        assert_eq!(state.budget_left(), 0);
    }
}
