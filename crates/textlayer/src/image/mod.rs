//! Raster normalization ahead of recognition.

mod preprocess;

pub use preprocess::{PreprocessOptions, PreprocessedPage, binarize_allowed, preprocess_image};
