//! Recognizer abstraction.
//!
//! The engine never talks to a concrete OCR engine directly: it is handed a
//! [`RecognizerFactory`] capability and drives handles created from it. A
//! handle is strictly serial; concurrency comes from pooling handles, one
//! per in-flight page.

mod driver;
mod pool;

pub use driver::{ChunkedRecognition, recognize_chunked, recognize_region};
pub use pool::{PooledRecognizer, RecognizerPool};

use async_trait::async_trait;
use image::RgbaImage;

use crate::config::PageSegMode;
use crate::error::Result;

/// Parameters applied to a handle before a recognition call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognizerParams {
    /// Ask the recognizer to emit word-level TSV alongside plain text.
    pub create_tsv: bool,
    pub dpi: u32,
    pub page_seg_mode: PageSegMode,
}

/// Raw output of one recognition call.
#[derive(Debug, Clone, Default)]
pub struct RecognizedPage {
    pub text: String,
    /// Mean recognition confidence in `[0, 100]`.
    pub confidence: f32,
    /// Word/line records in the TSV layout the parser expects.
    pub tsv: String,
}

/// One serial recognizer instance. Implementations wrap the underlying
/// engine's `init`/`set_parameters`/`recognize`/`terminate` lifecycle;
/// blocking engines are expected to dispatch through `spawn_blocking`.
#[async_trait]
pub trait RecognizerHandle: Send {
    async fn set_parameters(&mut self, params: &RecognizerParams) -> Result<()>;

    async fn recognize(&mut self, image: &RgbaImage) -> Result<RecognizedPage>;

    /// Release engine resources. Called when a handle is discarded or its
    /// language changes.
    async fn terminate(&mut self) -> Result<()>;
}

/// Creates language-bound handles.
#[async_trait]
pub trait RecognizerFactory: Send + Sync {
    async fn init(&self, language: &str) -> Result<Box<dyn RecognizerHandle>>;
}
