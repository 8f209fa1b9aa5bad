//! Word, line and page-result entities.
//!
//! Words and lines are created by the TSV parser, replaced wholesale by the
//! filter suite, augmented by recovery stages, and frozen when the pipeline
//! emits a [`PageResult`]. The serialized JSON shape (including the
//! `pageSegMode` / `algorithmVersion` field casing) is a stable contract for
//! downstream consumers such as a text-layer attacher.

use serde::{Deserialize, Serialize};

use super::geometry::BBox;
use crate::config::PageSegMode;

/// Bumped whenever a filter threshold or stage-ordering change can alter
/// outputs; invalidates all previously cached page results.
pub const ALGORITHM_VERSION: u32 = 7;

/// A single recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// NFC-normalized text. Never empty after cleanup.
    pub text: String,
    /// Recognition confidence in `[0, 100]`.
    pub confidence: f32,
    pub bbox: BBox,
}

impl Word {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 100.0),
            bbox,
        }
    }

    /// Stable identity used by the protected set and by line rebuilds.
    pub fn key(&self) -> WordKey {
        WordKey::of(self)
    }
}

/// Identity of a word that survives vector rebuilds: quantized box corners
/// plus the text itself. Two distinct recognitions of the same region with
/// the same text compare equal, which is exactly the protection semantics
/// we want.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WordKey {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    text: String,
}

impl WordKey {
    pub fn of(word: &Word) -> Self {
        Self {
            x0: word.bbox.x0.round() as i32,
            y0: word.bbox.y0.round() as i32,
            x1: word.bbox.x1.round() as i32,
            y1: word.bbox.y1.round() as i32,
            text: word.text.clone(),
        }
    }
}

/// A reading-order line of words.
///
/// Invariants: `bbox` is the tight union of the word boxes, `confidence` is
/// the arithmetic mean of the word confidences, and `text` is the
/// language-aware join of the words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub words: Vec<Word>,
}

impl Line {
    /// Assemble a line from words already in reading order. `text` is
    /// supplied by the caller because joining is language-aware.
    pub fn from_words(words: Vec<Word>, text: String) -> Option<Self> {
        let first = words.first()?;
        let bbox = words.iter().skip(1).fold(first.bbox, |acc, w| acc.union(&w.bbox));
        let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
        Some(Self {
            text,
            confidence,
            bbox,
            words,
        })
    }
}

/// A recognizer-emitted line frame, possibly empty of words.
///
/// The key is `page-block-par-line` and stays stable across parses of the
/// same TSV, which lets recovery target frames that produced no words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineBox {
    pub key: String,
    pub bbox: BBox,
}

/// A word dropped by a filter, recorded when debug collection is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropRecord {
    /// Name of the filter that rejected the word.
    pub filter: String,
    pub reason: String,
    pub text: String,
    pub bbox: BBox,
}

/// The canonical per-page output of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub page_number: u32,
    /// Actual post-preprocess raster width in pixels.
    pub width: u32,
    /// Actual post-preprocess raster height in pixels.
    pub height: u32,
    /// The DPI that was requested from the recognizer.
    pub dpi: u32,
    pub language: String,
    #[serde(rename = "pageSegMode")]
    pub page_seg_mode: PageSegMode,
    #[serde(rename = "algorithmVersion")]
    pub algorithm_version: u32,
    pub words: Vec<Word>,
    pub lines: Vec<Line>,
    /// Lines joined by `\n`; falls back to space-joined words, then to the
    /// raw recognizer text when both are empty.
    pub text: String,
    /// Page confidence in `[0, 100]`: mean over the final words.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<DropRecord>>,
}
