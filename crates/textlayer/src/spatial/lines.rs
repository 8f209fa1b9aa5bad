//! Line construction, coverage measurement and regrouping.

use ahash::AHashSet;

use crate::config::FilterThresholds;
use crate::text::{join_words_for_language, lexicon, median_word_height};
use crate::types::{BBox, Line, LineBox, ScriptKind, Word, WordKey};

use super::{median_bbox_height, median_positive_gap, sort_words_by_orientation};

/// Assemble a line from words already in reading order.
fn make_line(words: Vec<Word>, script: ScriptKind) -> Option<Line> {
    let text = join_words_for_language(&words, script);
    Line::from_words(words, text)
}

/// Bucket words into lines by y-center proximity, then order each bucket
/// along its dominant direction.
///
/// The bucket threshold is `max(4, 0.6 x median height, 0.001 x page
/// height)` so tall pages do not fragment and small text does not merge.
pub fn build_lines_from_words_by_y(words: &[Word], page_height: f32, script: ScriptKind) -> Vec<Line> {
    if words.is_empty() {
        return Vec::new();
    }

    let median_height = median_word_height(words).max(1.0);
    let threshold = (0.6 * median_height).max(4.0).max(0.001 * page_height);

    let mut order: Vec<usize> = (0..words.len()).collect();
    order.sort_by(|&a, &b| {
        words[a]
            .bbox
            .center()
            .1
            .partial_cmp(&words[b].bbox.center().1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                words[a]
                    .bbox
                    .x0
                    .partial_cmp(&words[b].bbox.x0)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    // Greedy buckets keyed by running mean y-center.
    let mut buckets: Vec<(f32, Vec<usize>)> = Vec::new();
    for idx in order {
        let cy = words[idx].bbox.center().1;
        match buckets.last_mut() {
            Some((mean, members)) if (cy - *mean).abs() <= threshold => {
                members.push(idx);
                *mean += (cy - *mean) / members.len() as f32;
            }
            _ => buckets.push((cy, vec![idx])),
        }
    }

    let mut lines: Vec<Line> = buckets
        .into_iter()
        .filter_map(|(_, members)| {
            let mut bucket_words: Vec<Word> = members.into_iter().map(|i| words[i].clone()).collect();
            sort_words_by_orientation(&mut bucket_words);
            make_line(bucket_words, script)
        })
        .collect();

    lines.sort_by(|a, b| {
        a.bbox
            .y0
            .partial_cmp(&b.bbox.y0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    lines
}

/// Padded rectangles covering the abnormally large horizontal gaps inside a
/// line, the targets for gap-fallback rescans.
///
/// A gap is large when it exceeds `max(12, 1.6 x median gap, 0.9 x median
/// height)`; CJK lines use the tighter `1.1 / 0.6` multipliers because
/// ideographs space more evenly.
pub fn find_large_gaps(line_words: &[Word], is_cjk: bool) -> Vec<BBox> {
    if line_words.len() < 2 {
        return Vec::new();
    }

    let mut sorted: Vec<&Word> = line_words.iter().collect();
    sorted.sort_by(|a, b| {
        a.bbox
            .x0
            .partial_cmp(&b.bbox.x0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let owned: Vec<Word> = sorted.iter().map(|w| (*w).clone()).collect();
    let median_gap = median_positive_gap(&owned);
    let median_height = median_word_height(&owned).max(1.0);

    let (gap_mult, height_mult) = if is_cjk { (1.1, 0.6) } else { (1.6, 0.9) };
    let threshold = 12.0f32.max(gap_mult * median_gap).max(height_mult * median_height);

    let line_bbox = owned
        .iter()
        .skip(1)
        .fold(owned[0].bbox, |acc, w| acc.union(&w.bbox));
    let pad = 0.25 * median_height;

    sorted
        .windows(2)
        .filter_map(|pair| {
            let gap = pair[1].bbox.x0 - pair[0].bbox.x1;
            if gap > threshold {
                Some(BBox::new(
                    pair[0].bbox.x1 - pad,
                    line_bbox.y0 - pad,
                    pair[1].bbox.x0 + pad,
                    line_bbox.y1 + pad,
                ))
            } else {
                None
            }
        })
        .collect()
}

/// Fraction of a line-box's long axis covered by word intervals.
///
/// Only words overlapping the line-box's short axis by at least 20% of
/// their own short extent participate. Under-covered frames are rescan
/// candidates.
pub fn compute_line_coverage_ratio(line_words: &[Word], line_box: &LineBox) -> f32 {
    let horizontal = line_box.bbox.width() >= line_box.bbox.height();
    let long_len = if horizontal {
        line_box.bbox.width()
    } else {
        line_box.bbox.height()
    };
    if long_len <= 0.0 {
        return 0.0;
    }

    let mut intervals: Vec<(f32, f32)> = line_words
        .iter()
        .filter_map(|w| {
            let (short_overlap, short_extent, lo, hi) = if horizontal {
                (
                    (w.bbox.y1.min(line_box.bbox.y1) - w.bbox.y0.max(line_box.bbox.y0)).max(0.0),
                    w.bbox.height(),
                    w.bbox.x0.max(line_box.bbox.x0),
                    w.bbox.x1.min(line_box.bbox.x1),
                )
            } else {
                (
                    (w.bbox.x1.min(line_box.bbox.x1) - w.bbox.x0.max(line_box.bbox.x0)).max(0.0),
                    w.bbox.width(),
                    w.bbox.y0.max(line_box.bbox.y0),
                    w.bbox.y1.min(line_box.bbox.y1),
                )
            };
            if short_extent > 0.0 && short_overlap / short_extent >= 0.2 && hi > lo {
                Some((lo, hi))
            } else {
                None
            }
        })
        .collect();

    if intervals.is_empty() {
        return 0.0;
    }

    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let mut covered = 0.0f32;
    let (mut cur_lo, mut cur_hi) = intervals[0];
    for &(lo, hi) in &intervals[1..] {
        if lo <= cur_hi {
            cur_hi = cur_hi.max(hi);
        } else {
            covered += cur_hi - cur_lo;
            cur_lo = lo;
            cur_hi = hi;
        }
    }
    covered += cur_hi - cur_lo;

    (covered / long_len).clamp(0.0, 1.0)
}

/// Redistribute surviving words into lines, respecting the old grouping.
///
/// Latin lines split where survivors leave a large gap; CJK groups stay
/// intact because vertical runs legitimately carry wide internal gaps.
/// Words not present in any old line (fresh recovery words) are regrouped
/// by y at the end.
pub fn rebuild_lines_from_words(
    old_lines: &[Line],
    kept_words: &[Word],
    page_height: f32,
    script: ScriptKind,
) -> Vec<Line> {
    let kept: AHashSet<WordKey> = kept_words.iter().map(Word::key).collect();
    let mut consumed: AHashSet<WordKey> = AHashSet::new();
    let mut lines: Vec<Line> = Vec::new();

    for old in old_lines {
        let survivors: Vec<Word> = old
            .words
            .iter()
            .filter(|w| kept.contains(&w.key()))
            .cloned()
            .collect();
        if survivors.is_empty() {
            continue;
        }
        for w in &survivors {
            consumed.insert(w.key());
        }

        if script.is_cjk() || survivors.len() < 2 {
            if let Some(line) = make_line(survivors, script) {
                lines.push(line);
            }
            continue;
        }

        // Latin: split the survivor run at large gaps. Gap rectangles are
        // padded, so locate them by center.
        let gaps = find_large_gaps(&survivors, false);
        let mut current: Vec<Word> = Vec::new();
        for word in survivors {
            let splits_before = current.last().is_some_and(|prev: &Word| {
                gaps.iter().any(|g| {
                    let center = (g.x0 + g.x1) / 2.0;
                    center >= prev.bbox.x1 && center <= word.bbox.x0
                })
            });
            if splits_before && !current.is_empty() {
                if let Some(line) = make_line(std::mem::take(&mut current), script) {
                    lines.push(line);
                }
            }
            current.push(word);
        }
        if let Some(line) = make_line(current, script) {
            lines.push(line);
        }
    }

    let leftovers: Vec<Word> = kept_words
        .iter()
        .filter(|w| !consumed.contains(&w.key()))
        .cloned()
        .collect();
    if !leftovers.is_empty() {
        lines.extend(build_lines_from_words_by_y(&leftovers, page_height, script));
    }

    lines.sort_by(|a, b| {
        a.bbox
            .y0
            .partial_cmp(&b.bbox.y0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    lines
}

/// Final ordering pass: sort by `y0` and, for Latin pages, merge adjacent
/// fragments whose baselines align into one lexical-heavy line.
pub fn normalize_final_lines(
    mut lines: Vec<Line>,
    script: ScriptKind,
    thresholds: &FilterThresholds,
) -> Vec<Line> {
    lines.sort_by(|a, b| {
        a.bbox
            .y0
            .partial_cmp(&b.bbox.y0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if !script.is_latin() || lines.len() < 2 {
        return lines;
    }

    let line_boxes: Vec<BBox> = lines.iter().map(|l| l.bbox).collect();
    let median_line_height = median_bbox_height(&line_boxes).max(1.0);
    let baseline_tolerance = thresholds.fragment_merge_baseline_tolerance * median_line_height;

    let mut merged: Vec<Line> = Vec::new();
    for line in lines {
        let mergeable = merged.last().is_some_and(|prev: &Line| {
            let baseline_aligned = (prev.bbox.y1 - line.bbox.y1).abs() <= baseline_tolerance;
            if !baseline_aligned {
                return false;
            }
            let all_words: Vec<Word> = prev.words.iter().chain(line.words.iter()).cloned().collect();
            let gap = prev.bbox.min_horizontal_gap(&line.bbox);
            let max_gap = thresholds.fragment_merge_max_gap * median_word_height(&all_words).max(1.0);
            gap <= max_gap && lexicon::lexical_hits(&all_words) >= 1
        });

        if mergeable {
            let prev = merged.pop().expect("mergeable implies a previous line");
            let mut words: Vec<Word> = prev.words;
            words.extend(line.words);
            sort_words_by_orientation(&mut words);
            if let Some(joined) = make_line(words, script) {
                merged.push(joined);
            }
        } else {
            merged.push(line);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> Word {
        Word::new(text, 90.0, BBox::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_build_lines_groups_by_y() {
        let words = vec![
            word("top", 0.0, 0.0, 30.0, 12.0),
            word("row", 40.0, 1.0, 70.0, 13.0),
            word("bottom", 0.0, 100.0, 60.0, 112.0),
        ];
        let lines = build_lines_from_words_by_y(&words, 500.0, ScriptKind::Latin);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "top row");
        assert_eq!(lines[1].text, "bottom");
    }

    #[test]
    fn test_build_lines_sorted_by_y0() {
        let words = vec![
            word("late", 0.0, 200.0, 40.0, 212.0),
            word("early", 0.0, 10.0, 40.0, 22.0),
        ];
        let lines = build_lines_from_words_by_y(&words, 500.0, ScriptKind::Latin);
        assert_eq!(lines[0].text, "early");
    }

    #[test]
    fn test_find_large_gaps_detects_wide_hole() {
        let words = vec![
            word("a", 0.0, 0.0, 20.0, 20.0),
            word("b", 24.0, 0.0, 44.0, 20.0),
            word("c", 200.0, 0.0, 220.0, 20.0),
        ];
        let gaps = find_large_gaps(&words, false);
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].x0 < 50.0 && gaps[0].x1 > 190.0);
    }

    #[test]
    fn test_find_large_gaps_none_for_even_spacing() {
        let words = vec![
            word("a", 0.0, 0.0, 20.0, 20.0),
            word("b", 26.0, 0.0, 46.0, 20.0),
            word("c", 52.0, 0.0, 72.0, 20.0),
        ];
        assert!(find_large_gaps(&words, false).is_empty());
    }

    #[test]
    fn test_coverage_full_line() {
        let line_box = LineBox {
            key: "1-1-1-1".to_string(),
            bbox: BBox::new(0.0, 0.0, 100.0, 20.0),
        };
        let words = vec![word("full", 0.0, 0.0, 100.0, 20.0)];
        assert!((compute_line_coverage_ratio(&words, &line_box) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_half_line() {
        let line_box = LineBox {
            key: "1-1-1-1".to_string(),
            bbox: BBox::new(0.0, 0.0, 100.0, 20.0),
        };
        let words = vec![word("half", 0.0, 0.0, 50.0, 20.0)];
        assert!((compute_line_coverage_ratio(&words, &line_box) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_ignores_off_axis_words() {
        let line_box = LineBox {
            key: "1-1-1-1".to_string(),
            bbox: BBox::new(0.0, 0.0, 100.0, 20.0),
        };
        // A word floating far below the frame does not count.
        let words = vec![word("ghost", 0.0, 90.0, 50.0, 110.0)];
        assert_eq!(compute_line_coverage_ratio(&words, &line_box), 0.0);
    }

    #[test]
    fn test_coverage_vertical_frame_uses_y_axis() {
        let line_box = LineBox {
            key: "1-1-1-1".to_string(),
            bbox: BBox::new(0.0, 0.0, 20.0, 100.0),
        };
        let words = vec![word("縦", 0.0, 0.0, 20.0, 60.0)];
        assert!((compute_line_coverage_ratio(&words, &line_box) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_rebuild_drops_missing_words_and_empty_lines() {
        let all = vec![
            word("keep", 0.0, 0.0, 40.0, 12.0),
            word("drop", 50.0, 0.0, 90.0, 12.0),
            word("gone", 0.0, 50.0, 40.0, 62.0),
        ];
        let lines = build_lines_from_words_by_y(&all, 500.0, ScriptKind::Latin);
        let kept = vec![all[0].clone()];
        let rebuilt = rebuild_lines_from_words(&lines, &kept, 500.0, ScriptKind::Latin);
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(rebuilt[0].text, "keep");
    }

    #[test]
    fn test_rebuild_regroups_fresh_words() {
        let lines = Vec::new();
        let fresh = vec![word("new", 0.0, 0.0, 30.0, 12.0)];
        let rebuilt = rebuild_lines_from_words(&lines, &fresh, 500.0, ScriptKind::Latin);
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(rebuilt[0].text, "new");
    }

    #[test]
    fn test_normalize_merges_aligned_lexical_fragments() {
        let thresholds = FilterThresholds::default();
        let a = make_line(
            vec![word("I", 0.0, 0.0, 10.0, 12.0), word("DON'T", 14.0, 0.0, 50.0, 12.0)],
            ScriptKind::Latin,
        )
        .unwrap();
        let b = make_line(vec![word("KNOW", 56.0, 0.0, 96.0, 12.0)], ScriptKind::Latin).unwrap();
        let merged = normalize_final_lines(vec![a, b], ScriptKind::Latin, &thresholds);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "I DON'T KNOW");
    }

    #[test]
    fn test_normalize_keeps_distant_lines_apart() {
        let thresholds = FilterThresholds::default();
        let a = make_line(vec![word("TOP", 0.0, 0.0, 30.0, 12.0)], ScriptKind::Latin).unwrap();
        let b = make_line(vec![word("BOTTOM", 0.0, 100.0, 60.0, 112.0)], ScriptKind::Latin).unwrap();
        let merged = normalize_final_lines(vec![a, b], ScriptKind::Latin, &thresholds);
        assert_eq!(merged.len(), 2);
    }
}
