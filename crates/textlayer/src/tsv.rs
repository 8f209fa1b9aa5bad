//! Parser for recognizer TSV output.
//!
//! The recognizer emits tab-separated rows `(level, page, block, par, line,
//! word, left, top, width, height, conf, text)`. Level 5 rows are words;
//! level 4 rows are line frames, recorded even when they produce no words
//! so recovery can target unfilled frames.

use ahash::{AHashMap, AHashSet};

use crate::text::{join_words_for_language, nfc};
use crate::types::{BBox, Line, LineBox, ScriptKind, Word};

const WORD_LEVEL: u32 = 5;
const LINE_LEVEL: u32 = 4;
const COLUMN_COUNT: usize = 12;

/// Typed output of a TSV parse.
#[derive(Debug, Default)]
pub struct ParsedTsv {
    pub words: Vec<Word>,
    pub lines: Vec<Line>,
    /// All line frames, in emission order.
    pub line_boxes: Vec<LineBox>,
    /// Keys of frames that produced at least one word.
    pub line_keys_with_words: AHashSet<String>,
}

struct LineAccumulator {
    words: Vec<Word>,
    bbox: BBox,
    conf_sum: f32,
    conf_count: u32,
}

/// Parse recognizer TSV into words, accumulated lines and line frames.
///
/// Rows with fewer than 12 columns (including the header) are skipped.
/// Word text is NFC-normalized; rows whose text trims to nothing are
/// dropped. Lines come out sorted by `bbox.y0`.
pub fn parse_tsv(tsv: &str, script: ScriptKind) -> ParsedTsv {
    let mut parsed = ParsedTsv::default();
    // Accumulators in first-seen order so line output is deterministic.
    let mut acc_order: Vec<String> = Vec::new();
    let mut accumulators: AHashMap<String, LineAccumulator> = AHashMap::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.splitn(COLUMN_COUNT, '\t').collect();
        if cols.len() < COLUMN_COUNT {
            continue;
        }

        let Some((level, bbox)) = parse_row_geometry(&cols) else {
            continue;
        };
        let key = format!("{}-{}-{}-{}", cols[1], cols[2], cols[3], cols[4]);

        match level {
            LINE_LEVEL => {
                parsed.line_boxes.push(LineBox { key, bbox });
            }
            WORD_LEVEL => {
                let Ok(conf) = cols[10].trim().parse::<f32>() else {
                    continue;
                };
                let text = nfc(cols[11].trim());
                if text.is_empty() {
                    continue;
                }
                let word = Word::new(text, conf.max(0.0), bbox);

                let acc = accumulators.entry(key.clone()).or_insert_with(|| {
                    acc_order.push(key.clone());
                    LineAccumulator {
                        words: Vec::new(),
                        bbox,
                        conf_sum: 0.0,
                        conf_count: 0,
                    }
                });
                acc.bbox = acc.bbox.union(&word.bbox);
                if conf >= 0.0 {
                    acc.conf_sum += conf;
                    acc.conf_count += 1;
                }
                acc.words.push(word.clone());

                parsed.line_keys_with_words.insert(key);
                parsed.words.push(word);
            }
            _ => {}
        }
    }

    for key in acc_order {
        let acc = accumulators
            .remove(&key)
            .expect("accumulator recorded for every ordered key");
        let confidence = if acc.conf_count > 0 {
            acc.conf_sum / acc.conf_count as f32
        } else {
            0.0
        };
        let text = join_words_for_language(&acc.words, script);
        parsed.lines.push(Line {
            text,
            confidence,
            bbox: acc.bbox,
            words: acc.words,
        });
    }

    parsed.lines.sort_by(|a, b| {
        a.bbox
            .y0
            .partial_cmp(&b.bbox.y0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    parsed
}

fn parse_row_geometry(cols: &[&str]) -> Option<(u32, BBox)> {
    let level = cols[0].trim().parse::<u32>().ok()?;
    let left = cols[6].trim().parse::<f32>().ok()?;
    let top = cols[7].trim().parse::<f32>().ok()?;
    let width = cols[8].trim().parse::<f32>().ok()?;
    let height = cols[9].trim().parse::<f32>().ok()?;
    Some((level, BBox::from_ltwh(left, top, width, height)))
}
