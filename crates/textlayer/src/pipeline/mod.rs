//! Pipeline orchestration: preprocess, recognize, filter, recover, emit.
//!
//! One page is one cooperative task; stages run strictly in order against
//! the shared [`PageState`]. Pages run concurrently up to the page-pool
//! bound, each holding one recognizer handle from the pool. Recovery and
//! late-filter errors are contained stage-locally; only preprocessing and
//! the initial whole-page recognition are fatal.

mod state;

pub use state::PageState;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ahash::AHashSet;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::{PageCache, cached_result_valid};
use crate::cancel::CancelToken;
use crate::config::{OcrRequest, PageSegMode, PipelineConfig};
use crate::error::{Result, TextlayerError};
use crate::filters;
use crate::image::{PreprocessOptions, PreprocessedPage, binarize_allowed, preprocess_image};
use crate::recognizer::{
    PooledRecognizer, RecognizerFactory, RecognizerParams, RecognizerPool, recognize_chunked,
};
use crate::recovery::{self, RecoveryCtx};
use crate::regions::{DocumentType, Region, group_regions};
use crate::spatial::normalize_final_lines;
use crate::text::lexicon;
use crate::tsv::parse_tsv;
use crate::types::{ALGORITHM_VERSION, PageResult, ScriptKind, Word, WordKey};

/// The OCR post-processing engine.
///
/// Construct once with an injected recognizer factory, optionally attach a
/// page cache, then run pages through [`OcrPipeline::ocr_page`].
pub struct OcrPipeline {
    pool: Arc<RecognizerPool>,
    cache: Option<Arc<dyn PageCache>>,
    config: PipelineConfig,
    page_permits: Arc<Semaphore>,
    sweep_started: OnceLock<()>,
}

impl OcrPipeline {
    pub fn new(factory: Arc<dyn RecognizerFactory>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(RecognizerPool::new(
            factory,
            config.recognizer_timeout(),
            config.recognizer_retries,
            Duration::from_secs(config.health_sweep_secs),
        ));
        let page_permits = Arc::new(Semaphore::new(config.effective_page_pool_size()));
        Ok(Self {
            pool,
            cache: None,
            config,
            page_permits,
            sweep_started: OnceLock::new(),
        })
    }

    /// Attach a page cache. Results are served from it when the embedded
    /// parameters match and written back after successful runs.
    pub fn with_cache(mut self, cache: Arc<dyn PageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// OCR a single page image into a [`PageResult`].
    pub async fn ocr_page(&self, image_bytes: &[u8], request: &OcrRequest) -> Result<PageResult> {
        self.ocr_page_with_cancel(image_bytes, request, &CancelToken::new()).await
    }

    /// [`OcrPipeline::ocr_page`] with an external cancellation signal.
    pub async fn ocr_page_with_cancel(
        &self,
        image_bytes: &[u8],
        request: &OcrRequest,
        cancel: &CancelToken,
    ) -> Result<PageResult> {
        request.validate()?;
        cancel.bail()?;
        self.sweep_started.get_or_init(|| self.pool.start_health_sweep());

        if let (Some(cache), Some(document_id)) = (&self.cache, &request.document_id) {
            match cache.get(document_id, request.page_number).await {
                Ok(Some(cached)) if cached_result_valid(&cached, request) => {
                    tracing::debug!(%document_id, page = request.page_number, "cache hit");
                    return Ok(cached);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "cache read failed, recognizing from scratch"),
            }
        }

        let _permit = self
            .page_permits
            .acquire()
            .await
            .map_err(|_| TextlayerError::Aborted)?;
        cancel.bail()?;

        let result = self.process_page(image_bytes, request, cancel).await?;

        if let (Some(cache), Some(document_id)) = (&self.cache, &request.document_id) {
            if let Err(e) = cache.put(document_id, request.page_number, &result).await {
                tracing::warn!(error = %e, "cache write failed, continuing without");
            }
        }
        Ok(result)
    }

    /// OCR a batch of `(page_number, image_bytes)` pages through the page
    /// pool. Results come back in input order; individual page failures do
    /// not abort the batch.
    pub async fn ocr_pages(
        self: &Arc<Self>,
        pages: Vec<(u32, Vec<u8>)>,
        request: &OcrRequest,
        cancel: &CancelToken,
    ) -> Vec<Result<PageResult>> {
        let mut join_set = JoinSet::new();
        let total = pages.len();
        for (index, (page_number, bytes)) in pages.into_iter().enumerate() {
            let pipeline = Arc::clone(self);
            let mut page_request = request.clone();
            page_request.page_number = page_number;
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let result = pipeline.ocr_page_with_cancel(&bytes, &page_request, &cancel).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<PageResult>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::warn!(error = %e, "page task failed to join"),
            }
        }
        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(TextlayerError::Recognizer("page task panicked".to_string()))))
            .collect()
    }

    /// Segment a page into classified regions.
    pub async fn segment_page(
        &self,
        image_bytes: &[u8],
        language: &str,
        document_type: DocumentType,
    ) -> Result<Vec<Region>> {
        let request = OcrRequest {
            language: language.to_string(),
            ..Default::default()
        };
        let result = self.ocr_page(image_bytes, &request).await?;
        let script = ScriptKind::from_language(language);
        Ok(group_regions(&result.words, script, document_type, result.width, result.height))
    }

    async fn process_page(
        &self,
        image_bytes: &[u8],
        request: &OcrRequest,
        cancel: &CancelToken,
    ) -> Result<PageResult> {
        let script = ScriptKind::from_language(&request.language);
        let page = preprocess_image(
            image_bytes,
            PreprocessOptions {
                binarize: binarize_allowed(script),
                return_gray: true,
            },
        )?;
        cancel.bail()?;

        let mut rec = self.pool.acquire(&request.language).await?;
        let outcome = self
            .run_stages(&mut rec, page, image_bytes, request, script, cancel)
            .await;
        self.pool.release(rec);
        outcome
    }

    async fn run_stages(
        &self,
        rec: &mut PooledRecognizer,
        page: PreprocessedPage,
        image_bytes: &[u8],
        request: &OcrRequest,
        script: ScriptKind,
        cancel: &CancelToken,
    ) -> Result<PageResult> {
        let thresholds = self.config.thresholds.clone();
        let psm = request.effective_psm(script);
        let params = RecognizerParams {
            create_tsv: true,
            dpi: request.dpi,
            page_seg_mode: psm,
        };

        // Initial whole-page recognition; failures here are fatal.
        let mut state = self
            .initial_recognition(rec, &page, request, script, psm, &params, cancel)
            .await?;
        state.gray = page.gray;
        state.drops = request.debug_collect_drops.then(Vec::new);

        // CJK retry: a nearly-empty first pass re-runs binarized and sparse.
        if recovery::cjk::retry_condition(&state, &thresholds) {
            self.cjk_sparse_retry(rec, image_bytes, &mut state, &params, cancel)
                .await?;
        }

        state.recovery_budget = thresholds.recovery_budget(state.words.len(), script);
        state.build_protected_set(&thresholds);

        filters::line_noise::apply(&mut state, &thresholds);

        // Recovery suite, budget-bounded; each stage that changes the word
        // set sends the newcomers back through the noise filters.
        {
            let mut ctx = RecoveryCtx {
                pool: &self.pool,
                rec: &mut *rec,
                image: &page.image,
                page_params: params,
                cancel: cancel.clone(),
                thresholds: &thresholds,
            };

            let before = state.recovery_added;
            recovery::cjk::vertical_gap_rescan(&mut state, &mut ctx).await?;
            recovery::lines::low_coverage_rescan(&mut state, &mut ctx).await?;
            recovery::latin::balloon_rescue(&mut state, &mut ctx).await?;
            recovery::lines::empty_frame_rescan(&mut state, &mut ctx).await?;
            recovery::lines::large_gap_rescan(&mut state, &mut ctx).await?;
            recovery::latin::top_band_probe(&mut state, &mut ctx).await?;
            if state.recovery_added > before {
                filters::reapply_noise_filters(&mut state, &thresholds);
            }
        }

        // Late filter pass.
        filters::image_tile::apply(&mut state, &thresholds);
        filters::background::apply(&mut state, &thresholds);
        if script.is_cjk() {
            filters::cjk::apply_isolated(&mut state, &thresholds);
            if script.is_korean() {
                filters::cjk::apply_jamo(&mut state, &thresholds);
            }
            filters::cjk::apply_weak_lines(&mut state, &thresholds);
        }
        if script.is_latin() {
            filters::latin::apply_watermark(&mut state, &thresholds);
            filters::latin::apply_garbage_pruners(&mut state, &thresholds);
        }

        // Post-prune rescue for frames the pruners emptied.
        {
            let mut ctx = RecoveryCtx {
                pool: &self.pool,
                rec: &mut *rec,
                image: &page.image,
                page_params: params,
                cancel: cancel.clone(),
                thresholds: &thresholds,
            };
            let before = state.recovery_added;
            recovery::latin::post_prune_rescue(&mut state, &mut ctx).await?;
            if state.recovery_added > before {
                filters::reapply_noise_filters(&mut state, &thresholds);
            }
        }

        cancel.bail()?;
        Ok(finalize(state, request, &self.config))
    }

    /// First recognition pass: chunked for over-size pages, whole-page
    /// otherwise. Builds the initial [`PageState`].
    #[allow(clippy::too_many_arguments)]
    async fn initial_recognition(
        &self,
        rec: &mut PooledRecognizer,
        page: &PreprocessedPage,
        request: &OcrRequest,
        script: ScriptKind,
        psm: PageSegMode,
        params: &RecognizerParams,
        cancel: &CancelToken,
    ) -> Result<PageState> {
        let oversize =
            page.width > self.config.oversize_width || page.height > self.config.oversize_height;

        let (words, lines, line_boxes, line_keys_with_words, raw_text, raw_confidence) = if oversize {
            tracing::debug!(width = page.width, height = page.height, "over-size page, chunked recognition");
            let merged = recognize_chunked(
                &self.pool,
                rec,
                &page.image,
                params,
                script,
                self.config.chunk_height,
                self.config.chunk_overlap,
                cancel,
            )
            .await?;
            let lines =
                crate::spatial::build_lines_from_words_by_y(&merged.words, page.height as f32, script);
            (
                merged.words,
                lines,
                merged.line_boxes,
                merged.line_keys_with_words,
                merged.text,
                merged.confidence,
            )
        } else {
            let recognized = self.pool.recognize(rec, &page.image, params, cancel).await?;
            let parsed = parse_tsv(&recognized.tsv, script);
            (
                parsed.words,
                parsed.lines,
                parsed.line_boxes,
                parsed.line_keys_with_words,
                recognized.text,
                recognized.confidence,
            )
        };

        tracing::debug!(
            words = words.len(),
            lines = lines.len(),
            frames = line_boxes.len(),
            "initial recognition parsed"
        );

        Ok(PageState {
            width: page.width,
            height: page.height,
            dpi: request.dpi,
            language: request.language.clone(),
            script,
            psm,
            words,
            lines,
            line_boxes,
            line_keys_with_words,
            gray: None,
            protected: AHashSet::new(),
            recovery_added: 0,
            recovery_budget: 0,
            raw_text,
            raw_confidence,
            drops: None,
        })
    }

    /// Re-run the whole page binarized and sparse, then union any words the
    /// first pass missed. Non-fatal: a failed retry keeps the first pass.
    async fn cjk_sparse_retry(
        &self,
        rec: &mut PooledRecognizer,
        image_bytes: &[u8],
        state: &mut PageState,
        params: &RecognizerParams,
        cancel: &CancelToken,
    ) -> Result<()> {
        tracing::debug!(words = state.words.len(), "weak CJK first pass, retrying binarized+sparse");
        let binarized = match preprocess_image(
            image_bytes,
            PreprocessOptions {
                binarize: true,
                return_gray: false,
            },
        ) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(error = %e, "binarized retry preprocess failed, keeping first pass");
                return Ok(());
            }
        };

        let retry_params = RecognizerParams {
            page_seg_mode: PageSegMode::SparseText,
            ..*params
        };
        let recognized = match self.pool.recognize(rec, &binarized.image, &retry_params, cancel).await {
            Ok(recognized) => recognized,
            Err(e @ (TextlayerError::Aborted | TextlayerError::RecognizerTimeout { .. })) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "binarized retry recognition failed, keeping first pass");
                return Ok(());
            }
        };

        let parsed = parse_tsv(&recognized.tsv, state.script);
        let existing: AHashSet<WordKey> = state.words.iter().map(Word::key).collect();
        let mut added = 0usize;
        for word in parsed.words {
            if !existing.contains(&word.key()) {
                state.words.push(word);
                added += 1;
            }
        }
        for line_box in parsed.line_boxes {
            let key = format!("retry-{}", line_box.key);
            if parsed.line_keys_with_words.contains(&line_box.key) {
                state.line_keys_with_words.insert(key.clone());
            }
            state.line_boxes.push(crate::types::LineBox {
                key,
                bbox: line_box.bbox,
            });
        }
        if state.raw_text.trim().is_empty() {
            state.raw_text = recognized.text;
            state.raw_confidence = recognized.confidence;
        }
        if added > 0 {
            tracing::debug!(added, "binarized sparse retry recovered words");
            state.rebuild_lines_by_y();
        }
        Ok(())
    }
}

/// Freeze the state into the emitted result: final line ordering, reading
/// order words, joined text and the page confidence.
fn finalize(mut state: PageState, request: &OcrRequest, config: &PipelineConfig) -> PageResult {
    state.rebuild_lines_by_y();
    state.rebuild_lines();
    let lines = normalize_final_lines(std::mem::take(&mut state.lines), state.script, &config.thresholds);

    let page_w = state.page_width();
    let page_h = state.page_height();
    let words: Vec<Word> = lines
        .iter()
        .flat_map(|line| line.words.iter())
        .map(|w| {
            let mut w = w.clone();
            w.bbox = w.bbox.clamp(page_w, page_h);
            w
        })
        .collect();

    let text = if !lines.is_empty() {
        lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n")
    } else if !words.is_empty() {
        words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
    } else {
        gated_raw_text(&state, &config.thresholds)
    };

    let confidence = if !words.is_empty() {
        words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32
    } else if !text.is_empty() {
        state.raw_confidence
    } else {
        0.0
    };

    PageResult {
        page_number: request.page_number,
        width: state.width,
        height: state.height,
        dpi: state.dpi,
        language: state.language.clone(),
        page_seg_mode: state.psm,
        algorithm_version: ALGORITHM_VERSION,
        words,
        lines,
        text,
        confidence,
        debug: state.drops.take(),
    }
}

/// Raw recognizer text is the last resort; for Latin pages it must pass a
/// readability gate so a page of pure art noise yields an empty string.
fn gated_raw_text(state: &PageState, thresholds: &crate::config::FilterThresholds) -> String {
    let trimmed = state.raw_text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if !state.script.is_latin() {
        return trimmed.to_string();
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.is_empty() {
        return String::new();
    }
    let mean_readability = tokens
        .iter()
        .map(|t| lexicon::token_readability(t, state.raw_confidence, thresholds))
        .sum::<f32>()
        / tokens.len() as f32;
    if mean_readability >= 0.4 {
        trimmed.to_string()
    } else {
        String::new()
    }
}
