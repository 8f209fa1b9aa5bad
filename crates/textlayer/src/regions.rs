//! Group final words into logical regions and classify them.
//!
//! Documents are all plain text; manga pages distinguish speech balloons,
//! sound effects and everything else by shape, density and confidence.

use serde::{Deserialize, Serialize};

use crate::spatial::sort_words_by_orientation;
use crate::text::join_words_for_language;
use crate::types::{BBox, ScriptKind, Word};

/// The kind of page being segmented, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Manga,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Text,
    Balloon,
    Sfx,
    Panel,
}

/// A clustered text region in page coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Stable within one page result: regions are numbered in reading
    /// order.
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: RegionKind,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub original_text: String,
    /// Mean recognition confidence normalized to `[0, 1]`.
    pub confidence: f32,
}

/// Sound effects are big: height above 10% of the page's shorter side.
const SFX_MIN_HEIGHT_RATIO: f32 = 0.1;
const SFX_MAX_WORDS: usize = 3;
const SFX_MAX_CONFIDENCE: f32 = 70.0;

const BALLOON_MIN_ASPECT: f32 = 0.3;
const BALLOON_MAX_ASPECT: f32 = 3.5;
const BALLOON_MIN_CONFIDENCE: f32 = 20.0;

/// Clustering proximity, relative to the page's shorter side. The shorter
/// side keeps very tall webtoon strips from inflating the thresholds.
const CLUSTER_X_GAP_RATIO: f32 = 0.05;
const CLUSTER_Y_GAP_RATIO: f32 = 0.02;

/// Cluster words into regions and classify each one.
pub fn group_regions(
    words: &[Word],
    script: ScriptKind,
    document_type: DocumentType,
    page_width: u32,
    page_height: u32,
) -> Vec<Region> {
    if words.is_empty() {
        return Vec::new();
    }

    let short_side = page_width.min(page_height) as f32;
    let x_gap = CLUSTER_X_GAP_RATIO * short_side;
    let y_gap = CLUSTER_Y_GAP_RATIO * short_side;

    let clusters = cluster_words(words, x_gap, y_gap);

    let mut regions: Vec<Region> = clusters
        .into_iter()
        .map(|mut cluster| {
            sort_words_by_orientation(&mut cluster);
            let bbox = cluster
                .iter()
                .skip(1)
                .fold(cluster[0].bbox, |acc, w| acc.union(&w.bbox));
            let confidence = cluster.iter().map(|w| w.confidence).sum::<f32>() / cluster.len() as f32;
            let kind = classify(document_type, &cluster, &bbox, confidence, short_side);
            Region {
                id: 0,
                kind,
                x: bbox.x0,
                y: bbox.y0,
                w: bbox.width(),
                h: bbox.height(),
                original_text: join_words_for_language(&cluster, script),
                confidence: (confidence / 100.0).clamp(0.0, 1.0),
            }
        })
        .collect();

    // Reading order, then stable ids.
    regions.sort_by(|a, b| {
        a.y.partial_cmp(&b.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });
    for (index, region) in regions.iter_mut().enumerate() {
        region.id = index as u32;
    }
    regions
}

/// Greedy agglomerative clustering: two words connect when they overlap in
/// y with a small x gap, or sit nearly on top of each other with an x
/// overlap.
fn cluster_words(words: &[Word], x_gap: f32, y_gap: f32) -> Vec<Vec<Word>> {
    let mut parent: Vec<usize> = (0..words.len()).collect();

    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        let up = parent[i];
        if up == i {
            return i;
        }
        let root = find(parent, up);
        parent[i] = root;
        root
    }

    for i in 0..words.len() {
        for j in (i + 1)..words.len() {
            if connected(&words[i].bbox, &words[j].bbox, x_gap, y_gap) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut clusters: Vec<Vec<Word>> = Vec::new();
    let mut root_to_cluster: ahash::AHashMap<usize, usize> = ahash::AHashMap::new();
    for i in 0..words.len() {
        let root = find(&mut parent, i);
        let idx = *root_to_cluster.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[idx].push(words[i].clone());
    }
    clusters
}

fn connected(a: &BBox, b: &BBox, x_gap: f32, y_gap: f32) -> bool {
    let y_overlaps = a.vertical_overlap_ratio(b) > 0.2;
    let x_close = a.min_horizontal_gap(b) <= x_gap;
    if y_overlaps && x_close {
        return true;
    }

    let x_overlaps = (a.x1.min(b.x1) - a.x0.max(b.x0)).max(0.0) > 0.0;
    let y_close = vertical_gap(a, b) <= y_gap;
    x_overlaps && y_close
}

fn vertical_gap(a: &BBox, b: &BBox) -> f32 {
    if a.y1 < b.y0 {
        b.y0 - a.y1
    } else if b.y1 < a.y0 {
        a.y0 - b.y1
    } else {
        0.0
    }
}

fn classify(
    document_type: DocumentType,
    words: &[Word],
    bbox: &BBox,
    confidence: f32,
    short_side: f32,
) -> RegionKind {
    match document_type {
        DocumentType::Document => RegionKind::Text,
        DocumentType::Manga => {
            let height_ratio = bbox.height() / short_side;
            if words.len() <= SFX_MAX_WORDS
                && height_ratio > SFX_MIN_HEIGHT_RATIO
                && confidence < SFX_MAX_CONFIDENCE
            {
                return RegionKind::Sfx;
            }
            let aspect = bbox.width() / bbox.height().max(1.0);
            if (BALLOON_MIN_ASPECT..=BALLOON_MAX_ASPECT).contains(&aspect)
                && !words.is_empty()
                && confidence >= BALLOON_MIN_CONFIDENCE
            {
                return RegionKind::Balloon;
            }
            RegionKind::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, conf: f32, x0: f32, y0: f32, x1: f32, y1: f32) -> Word {
        Word::new(text, conf, BBox::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_document_type_is_always_text() {
        let words = vec![word("hello", 90.0, 0.0, 0.0, 50.0, 20.0)];
        let regions = group_regions(&words, ScriptKind::Latin, DocumentType::Document, 1000, 1000);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, RegionKind::Text);
    }

    #[test]
    fn test_balloon_classification() {
        let words = vec![
            word("I", 85.0, 200.0, 200.0, 212.0, 220.0),
            word("KNOW", 85.0, 218.0, 200.0, 270.0, 220.0),
            word("THAT", 85.0, 200.0, 226.0, 252.0, 246.0),
        ];
        let regions = group_regions(&words, ScriptKind::Latin, DocumentType::Manga, 1000, 1000);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, RegionKind::Balloon);
        assert!((regions[0].confidence - 0.85).abs() < 1e-4);
    }

    #[test]
    fn test_sfx_classification() {
        // One huge uncertain word: a drawn sound effect.
        let words = vec![word("BOOM", 40.0, 100.0, 100.0, 400.0, 260.0)];
        let regions = group_regions(&words, ScriptKind::Latin, DocumentType::Manga, 1000, 1000);
        assert_eq!(regions[0].kind, RegionKind::Sfx);
    }

    #[test]
    fn test_distant_words_form_separate_regions() {
        let words = vec![
            word("first", 90.0, 0.0, 0.0, 50.0, 20.0),
            word("second", 90.0, 800.0, 800.0, 880.0, 820.0),
        ];
        let regions = group_regions(&words, ScriptKind::Latin, DocumentType::Document, 1000, 1000);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_region_ids_follow_reading_order() {
        let words = vec![
            word("lower", 90.0, 0.0, 800.0, 60.0, 820.0),
            word("upper", 90.0, 0.0, 0.0, 60.0, 20.0),
        ];
        let regions = group_regions(&words, ScriptKind::Latin, DocumentType::Document, 1000, 1000);
        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[0].original_text, "upper");
        assert_eq!(regions[1].id, 1);
        assert_eq!(regions[1].original_text, "lower");
    }

    #[test]
    fn test_region_serialization_uses_type_field() {
        let words = vec![word("hello", 90.0, 0.0, 0.0, 50.0, 20.0)];
        let regions = group_regions(&words, ScriptKind::Latin, DocumentType::Document, 1000, 1000);
        let json = serde_json::to_string(&regions[0]).unwrap();
        assert!(json.contains("\"type\":\"text\""));
    }
}
