//! Request, pipeline and threshold configuration.
//!
//! Every numeric threshold used by the filter and recovery suites lives in
//! [`FilterThresholds`] so the tuning surface is auditable in one place.
//! `Default` carries the production constants; tests override individual
//! fields with struct-update syntax.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TextlayerError};
use crate::types::ScriptKind;

/// Recognizer page-segmentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    #[default]
    Auto,
    SingleBlock,
    SingleLine,
    SingleWord,
    SparseText,
}

impl PageSegMode {
    /// Page default when the caller gave no override: sparse for CJK (dense
    /// page segmentation merges vertical columns), auto otherwise.
    pub fn default_for_script(script: ScriptKind) -> Self {
        if script.is_cjk() { Self::SparseText } else { Self::Auto }
    }
}

/// Per-page OCR request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRequest {
    /// `+`-joined recognizer language codes, e.g. `"jpn+eng"`.
    pub language: String,

    /// DPI requested from the recognizer.
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Page segmentation override; `None` selects the script default.
    #[serde(default)]
    pub page_seg_mode: Option<PageSegMode>,

    /// 1-indexed page number carried into the result and the cache key.
    #[serde(default = "default_page_number")]
    pub page_number: u32,

    /// Document identity for cache keying; caching is skipped when absent.
    #[serde(default)]
    pub document_id: Option<String>,

    /// Collect per-word drop records into `PageResult::debug`.
    #[serde(default)]
    pub debug_collect_drops: bool,
}

impl Default for OcrRequest {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            dpi: default_dpi(),
            page_seg_mode: None,
            page_number: default_page_number(),
            document_id: None,
            debug_collect_drops: false,
        }
    }
}

impl OcrRequest {
    /// Reject requests that cannot produce a meaningful recognition.
    pub fn validate(&self) -> Result<()> {
        if self.language.split('+').all(|c| c.trim().is_empty()) {
            return Err(TextlayerError::InvalidConfiguration(
                "language must contain at least one code".to_string(),
            ));
        }
        if !(50..=1200).contains(&self.dpi) {
            return Err(TextlayerError::InvalidConfiguration(format!(
                "dpi {} outside supported range 50..=1200",
                self.dpi
            )));
        }
        Ok(())
    }

    /// The effective PSM for this request.
    pub fn effective_psm(&self, script: ScriptKind) -> PageSegMode {
        self.page_seg_mode
            .unwrap_or_else(|| PageSegMode::default_for_script(script))
    }
}

fn default_dpi() -> u32 {
    300
}

fn default_page_number() -> u32 {
    1
}

/// Pipeline-level behaviour: pooling, timeouts and over-size chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent pages; `None` selects `max(1, min(2, cores / 2))`.
    #[serde(default)]
    pub page_pool_size: Option<usize>,

    /// Per-recognizer-call deadline in seconds.
    #[serde(default = "default_recognizer_timeout_secs")]
    pub recognizer_timeout_secs: u64,

    /// Retries after a timed-out call, with 1s/2s/4s backoff.
    #[serde(default = "default_recognizer_retries")]
    pub recognizer_retries: u32,

    /// Pages wider than this are recognized in vertical chunks.
    #[serde(default = "default_oversize_width")]
    pub oversize_width: u32,

    /// Pages taller than this are recognized in vertical chunks.
    #[serde(default = "default_oversize_height")]
    pub oversize_height: u32,

    /// Chunk height for over-size pages.
    #[serde(default = "default_chunk_height")]
    pub chunk_height: u32,

    /// Vertical overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    /// Interval of the pool's stale-request sweep, in seconds.
    #[serde(default = "default_health_sweep_secs")]
    pub health_sweep_secs: u64,

    #[serde(default)]
    pub thresholds: FilterThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_pool_size: None,
            recognizer_timeout_secs: default_recognizer_timeout_secs(),
            recognizer_retries: default_recognizer_retries(),
            oversize_width: default_oversize_width(),
            oversize_height: default_oversize_height(),
            chunk_height: default_chunk_height(),
            chunk_overlap: default_chunk_overlap(),
            health_sweep_secs: default_health_sweep_secs(),
            thresholds: FilterThresholds::default(),
        }
    }
}

impl PipelineConfig {
    pub fn recognizer_timeout(&self) -> Duration {
        Duration::from_secs(self.recognizer_timeout_secs)
    }

    /// Resolved page-pool bound.
    pub fn effective_page_pool_size(&self) -> usize {
        self.page_pool_size
            .unwrap_or_else(|| (num_cpus::get() / 2).clamp(1, 2))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_height {
            return Err(TextlayerError::InvalidConfiguration(format!(
                "chunk overlap {} must be smaller than chunk height {}",
                self.chunk_overlap, self.chunk_height
            )));
        }
        if self.recognizer_timeout_secs == 0 {
            return Err(TextlayerError::InvalidConfiguration(
                "recognizer timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_recognizer_timeout_secs() -> u64 {
    120
}

fn default_recognizer_retries() -> u32 {
    2
}

fn default_oversize_width() -> u32 {
    4000
}

fn default_oversize_height() -> u32 {
    8000
}

fn default_chunk_height() -> u32 {
    4000
}

fn default_chunk_overlap() -> u32 {
    200
}

fn default_health_sweep_secs() -> u64 {
    30
}

/// The complete numeric tuning surface of the filter and recovery suites.
///
/// Field names follow `family_parameter`. Confidences are on the recognizer
/// scale `[0, 100]`; ratios are dimensionless fractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterThresholds {
    // -- protection -------------------------------------------------------
    /// Lines with at least this many words protect all their words.
    pub protect_min_words: usize,
    /// Lines at or above this confidence protect all their words.
    pub protect_min_confidence: f32,
    /// Latin lines with at least this many lexical hits protect their words.
    pub protect_lexical_hits: usize,

    // -- line noise cleanup (F.1) -----------------------------------------
    /// Single characters below this confidence are dropped.
    pub noise_single_char_max_conf: f32,
    /// Mixed-case short fragments below this confidence are dropped.
    pub noise_fragment_max_conf: f32,
    /// Kept single-char tokens must reach this fraction of median height.
    pub noise_keep_min_height_ratio: f32,
    /// Skip the cleanup entirely for CJK pages at or below this word count.
    pub noise_cjk_skip_max_words: usize,

    // -- image-tile mask (F.3) --------------------------------------------
    /// Mid-luminance occupancy marking a tile image-likely.
    pub tile_mid_ratio_min: f32,
    /// Grayscale variance floor for the mid-ratio rule.
    pub tile_variance_min: f32,
    /// Mean edge magnitude marking a tile image-likely.
    pub tile_edge_min: f32,
    /// Grayscale variance floor for the edge rule.
    pub tile_edge_variance_min: f32,
    /// Unmarked tiles with at least this many marked neighbors are filled.
    pub tile_hole_fill_neighbors: usize,
    /// Words longer than this (alphanumeric length) are never tile-dropped.
    pub tile_drop_max_alnum_len: usize,
    /// Latin words below this confidence are eligible for tile drops.
    pub tile_drop_max_conf: f32,
    /// CJK words below this confidence are eligible for tile drops.
    pub tile_cjk_drop_max_conf: f32,
    /// Words at or above this fraction of page height are always kept.
    pub tile_keep_page_height_ratio: f32,
    /// Words at or above this multiple of the median height are kept.
    pub tile_keep_median_height_ratio: f32,
    /// Tiles holding at least this many word centers are text-likely.
    pub tile_text_min_words: usize,
    /// A single word at or above this confidence makes a tile text-likely.
    pub tile_text_single_word_conf: f32,

    // -- background variance (F.4) ----------------------------------------
    /// Surrounding variance above this marks the background busy.
    pub bg_variance_max: f32,
    /// Busy-background Latin words below this confidence are dropped.
    pub bg_drop_max_conf: f32,
    /// Busy-background drops only apply below this fraction of page height.
    pub bg_drop_max_height_ratio: f32,
    /// CJK variant of `bg_drop_max_conf` (stricter).
    pub bg_cjk_drop_max_conf: f32,
    /// CJK busy-background drops only apply at or below this alnum length.
    pub bg_cjk_max_alnum_len: usize,

    // -- isolated CJK noise (F.5) -----------------------------------------
    /// Neighbor search radius as a multiple of median word height.
    pub cjk_isolated_neighbor_range: f32,
    /// Isolated CJK tokens at or above this confidence are kept anyway.
    pub cjk_isolated_keep_conf: f32,

    // -- Korean jamo ghosts (F.6) -----------------------------------------
    /// Pure-jamo tokens below this confidence are dropped.
    pub jamo_max_conf: f32,
    /// Repeated-jamo laughter tokens at or above this confidence are kept.
    pub jamo_laughter_keep_conf: f32,

    // -- weak isolated CJK lines (F.7) ------------------------------------
    /// Maximum character count for a line to be considered weak.
    pub weak_line_max_chars: usize,
    /// Weak lines below this confidence are candidates for dropping.
    pub weak_line_max_conf: f32,
    /// Neighbor search range as a multiple of median line height.
    pub weak_line_neighbor_range: f32,

    // -- Latin watermark suppression (F.8) --------------------------------
    /// Top/bottom band (fraction of page height) where watermarks live.
    pub watermark_band_ratio: f32,
    /// Watermark candidates must be below this fraction of page height.
    pub watermark_max_height_ratio: f32,
    /// Same-band neighbors within this multiple of median height also drop.
    pub watermark_neighbor_range: f32,

    // -- Latin garbage pruners (F.9) --------------------------------------
    /// Single-token edge lines below this readability are ghosts.
    pub edge_ghost_max_readability: f32,
    /// Top/bottom band (fraction of page height) for edge ghosts.
    pub edge_ghost_band_ratio: f32,
    /// Row adjacency range as a multiple of line height.
    pub isolated_line_row_range: f32,
    /// Minimum x-overlap (fraction of shorter width) for block adjacency.
    pub isolated_line_min_x_overlap: f32,
    /// High-recall cleanup triggers at or below this final word count.
    pub high_recall_max_words: usize,
    /// High-recall cleanup requires a line at or above this readability.
    pub high_recall_strong_readability: f32,
    /// Lines below this readability with no lexical hits are rejected.
    pub garbage_line_max_readability: f32,
    /// Baseline alignment tolerance for fragment merging, as a multiple of
    /// median line height.
    pub fragment_merge_baseline_tolerance: f32,
    /// Maximum horizontal gap between merged fragments, as a multiple of
    /// median word height.
    pub fragment_merge_max_gap: f32,

    // -- recovery (G) -----------------------------------------------------
    /// Hard recovery budget for CJK pages.
    pub recovery_cjk_budget: u32,
    /// Latin budget bounds; the working budget is
    /// `clamp(2 * initial_words, min, max)`.
    pub recovery_latin_budget_min: u32,
    pub recovery_latin_budget_max: u32,
    /// IoU above which an incoming recovery word is a duplicate.
    pub recovery_dedup_iou: f32,
    /// CJK retry triggers below this initial word count...
    pub cjk_retry_max_words: usize,
    /// ...or below this raw text length in characters.
    pub cjk_retry_max_text_len: usize,
    /// Vertical-gap rescan: gap floor as a fraction of page height.
    pub gap_rescan_min_page_ratio: f32,
    /// Vertical-gap rescan: gap floor as a multiple of median line height.
    pub gap_rescan_min_line_ratio: f32,
    /// Vertical-gap rescan: at most this many widest gaps per page.
    pub gap_rescan_max_gaps: usize,
    /// Vertical-gap rescan admission confidence.
    pub gap_rescan_min_conf: f32,
    /// Line-coverage rescan threshold for Latin lines.
    pub coverage_rescan_latin: f32,
    /// Line-coverage rescan threshold for CJK lines.
    pub coverage_rescan_cjk: f32,
    /// Rescan crop padding as a multiple of median word height.
    pub rescan_pad_ratio: f32,
    /// Balloon rescue only runs at or below this word count.
    pub balloon_rescue_max_words: usize,
    /// Balloon rescue anchor lines need at least this readability.
    pub balloon_anchor_min_readability: f32,
    /// Top-band probe: triggers when the first word starts below this
    /// fraction of page height.
    pub top_probe_trigger_ratio: f32,
    /// Top-band probe: strip height as a fraction of page height.
    pub top_probe_strip_ratio: f32,
    /// CJK recovery words must fall in this height-ratio band of the line
    /// median.
    pub recovery_cjk_height_min: f32,
    pub recovery_cjk_height_max: f32,
    /// CJK recovery admission confidence.
    pub recovery_cjk_min_conf: f32,
    /// Latin recovery admission confidence by token length: 1 char.
    pub recovery_latin_conf_len1: f32,
    /// Latin recovery admission confidence: 2 chars.
    pub recovery_latin_conf_len2: f32,
    /// Latin recovery admission confidence: 3+ chars.
    pub recovery_latin_conf_len3: f32,
    /// Minimum recovered-word geometry in pixels.
    pub recovery_min_word_side: f32,
    /// Post-prune rescue admits lines at or above this readability.
    pub post_prune_min_readability: f32,

    // -- readability scoring (F.10) ---------------------------------------
    /// Consonant runs at or above this length penalize readability.
    pub readability_consonant_run: usize,
    /// Weight of recognizer confidence in the readability score.
    pub readability_confidence_weight: f32,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            protect_min_words: 5,
            protect_min_confidence: 80.0,
            protect_lexical_hits: 2,

            noise_single_char_max_conf: 55.0,
            noise_fragment_max_conf: 62.0,
            noise_keep_min_height_ratio: 0.6,
            noise_cjk_skip_max_words: 6,

            tile_mid_ratio_min: 0.55,
            tile_variance_min: 900.0,
            tile_edge_min: 18.0,
            tile_edge_variance_min: 420.0,
            tile_hole_fill_neighbors: 5,
            tile_drop_max_alnum_len: 4,
            tile_drop_max_conf: 70.0,
            tile_cjk_drop_max_conf: 78.0,
            tile_keep_page_height_ratio: 0.06,
            tile_keep_median_height_ratio: 2.2,
            tile_text_min_words: 2,
            tile_text_single_word_conf: 76.0,

            bg_variance_max: 1500.0,
            bg_drop_max_conf: 64.0,
            bg_drop_max_height_ratio: 0.035,
            bg_cjk_drop_max_conf: 72.0,
            bg_cjk_max_alnum_len: 2,

            cjk_isolated_neighbor_range: 1.5,
            cjk_isolated_keep_conf: 88.0,

            jamo_max_conf: 80.0,
            jamo_laughter_keep_conf: 85.0,

            weak_line_max_chars: 2,
            weak_line_max_conf: 70.0,
            weak_line_neighbor_range: 0.9,

            watermark_band_ratio: 0.14,
            watermark_max_height_ratio: 0.05,
            watermark_neighbor_range: 1.2,

            edge_ghost_max_readability: 0.45,
            edge_ghost_band_ratio: 0.12,
            isolated_line_row_range: 5.4,
            isolated_line_min_x_overlap: 0.16,
            high_recall_max_words: 10,
            high_recall_strong_readability: 0.55,
            garbage_line_max_readability: 0.38,
            fragment_merge_baseline_tolerance: 0.6,
            fragment_merge_max_gap: 2.4,

            recovery_cjk_budget: 40,
            recovery_latin_budget_min: 24,
            recovery_latin_budget_max: 160,
            recovery_dedup_iou: 0.55,
            cjk_retry_max_words: 8,
            cjk_retry_max_text_len: 6,
            gap_rescan_min_page_ratio: 0.1,
            gap_rescan_min_line_ratio: 1.5,
            gap_rescan_max_gaps: 4,
            gap_rescan_min_conf: 60.0,
            coverage_rescan_latin: 0.55,
            coverage_rescan_cjk: 0.45,
            rescan_pad_ratio: 0.6,
            balloon_rescue_max_words: 12,
            balloon_anchor_min_readability: 0.6,
            top_probe_trigger_ratio: 0.18,
            top_probe_strip_ratio: 0.15,
            recovery_cjk_height_min: 0.55,
            recovery_cjk_height_max: 1.6,
            recovery_cjk_min_conf: 62.0,
            recovery_latin_conf_len1: 78.0,
            recovery_latin_conf_len2: 66.0,
            recovery_latin_conf_len3: 55.0,
            recovery_min_word_side: 3.0,
            post_prune_min_readability: 0.55,

            readability_consonant_run: 4,
            readability_confidence_weight: 0.45,
        }
    }
}

impl FilterThresholds {
    /// Working recovery budget for a page that recognized `initial_words`
    /// words in the first pass.
    pub fn recovery_budget(&self, initial_words: usize, script: ScriptKind) -> u32 {
        if script.is_cjk() {
            self.recovery_cjk_budget
        } else {
            ((initial_words as u32).saturating_mul(2))
                .clamp(self.recovery_latin_budget_min, self.recovery_latin_budget_max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validate_rejects_empty_language() {
        let request = OcrRequest {
            language: " + ".to_string(),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_validate_rejects_bad_dpi() {
        let request = OcrRequest {
            dpi: 20,
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_effective_psm_defaults_per_script() {
        let request = OcrRequest::default();
        assert_eq!(request.effective_psm(ScriptKind::Latin), PageSegMode::Auto);
        assert_eq!(
            request.effective_psm(ScriptKind::Cjk { korean: false }),
            PageSegMode::SparseText
        );

        let overridden = OcrRequest {
            page_seg_mode: Some(PageSegMode::SingleBlock),
            ..Default::default()
        };
        assert_eq!(
            overridden.effective_psm(ScriptKind::Cjk { korean: true }),
            PageSegMode::SingleBlock
        );
    }

    #[test]
    fn test_pipeline_config_validate() {
        let bad = PipelineConfig {
            chunk_overlap: 5000,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_recovery_budget_scales_for_latin() {
        let t = FilterThresholds::default();
        assert_eq!(t.recovery_budget(4, ScriptKind::Latin), 24);
        assert_eq!(t.recovery_budget(50, ScriptKind::Latin), 100);
        assert_eq!(t.recovery_budget(5000, ScriptKind::Latin), 160);
    }

    #[test]
    fn test_recovery_budget_is_capped_for_cjk() {
        let t = FilterThresholds::default();
        assert_eq!(t.recovery_budget(5000, ScriptKind::Cjk { korean: false }), 40);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: PipelineConfig = serde_json::from_str("{\"chunk_height\": 2000}").unwrap();
        assert_eq!(config.chunk_height, 2000);
        assert_eq!(config.chunk_overlap, 200);
    }
}
