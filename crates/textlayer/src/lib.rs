//! # textlayer
//!
//! An OCR post-processing engine: feed it a rasterized page and an injected
//! recognizer (Tesseract-shaped: TSV words with confidences and boxes) and
//! it produces a clean, spatially coherent set of words and lines suitable
//! for overlay as an invisible, selectable text layer.
//!
//! The hard part is everything between recognition and output: rejecting
//! noise from photos, watermarks and decorative backgrounds, recovering
//! text the page-level segmentation missed (vertical CJK columns, shredded
//! speech balloons, empty line frames), and reconstructing reading order.
//! All of it is deterministic: identical inputs produce byte-identical
//! results.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use textlayer::{OcrPipeline, OcrRequest, PipelineConfig};
//!
//! let pipeline = OcrPipeline::new(Arc::new(my_recognizer_factory), PipelineConfig::default())?;
//! let result = pipeline
//!     .ocr_page(&image_bytes, &OcrRequest { language: "jpn".into(), ..Default::default() })
//!     .await?;
//! println!("{}", result.text);
//! ```
//!
//! ## Architecture
//!
//! - [`image`]: decode and normalize rasters (white composite, grayscale,
//!   Otsu binarization)
//! - [`tsv`]: parse recognizer TSV into typed words, lines and line frames
//! - [`text`] / [`spatial`]: script-aware joining, orientation sorting,
//!   coverage statistics
//! - [`recognizer`]: the injected engine boundary, handle pool, region and
//!   chunked recognition
//! - filters and recovery: the staged noise/rescue engine described on
//!   [`OcrPipeline`]
//! - [`cache`]: the `(document_id, page_number)` result cache boundary
//!
//! Any change to filter thresholds or stage ordering that can alter
//! outputs must bump [`ALGORITHM_VERSION`], which invalidates all prior
//! cached entries.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod image;
pub mod recognizer;
pub mod regions;
pub mod spatial;
pub mod text;
pub mod tsv;
pub mod types;

mod filters;
mod pipeline;
mod recovery;

pub use cache::{CacheStats, MemoryPageCache, PageCache, cached_result_valid};
pub use cancel::CancelToken;
pub use config::{FilterThresholds, OcrRequest, PageSegMode, PipelineConfig};
pub use error::{Result, TextlayerError};
pub use pipeline::{OcrPipeline, PageState};
pub use recognizer::{RecognizedPage, RecognizerFactory, RecognizerHandle, RecognizerParams};
pub use regions::{DocumentType, Region, RegionKind};
pub use types::{ALGORITHM_VERSION, BBox, DropRecord, Line, LineBox, PageResult, ScriptKind, Word};
