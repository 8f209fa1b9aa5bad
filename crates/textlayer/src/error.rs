//! Error types for the textlayer engine.
//!
//! Fatal and non-fatal kinds are separated by how the pipeline reacts to
//! them: preprocessing and the initial whole-page recognition propagate,
//! while region/recovery failures are logged and swallowed stage-locally so
//! the page keeps whatever words survived up to that point.

use thiserror::Error;

/// Errors surfaced by the OCR post-processing engine.
#[derive(Debug, Error)]
pub enum TextlayerError {
    /// Image decode failure or dimensions below the supported minimum.
    /// Fatal for the page.
    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    /// Unrecoverable failure of the initial whole-page recognition.
    /// Fatal for the page; the caller may retry.
    #[error("recognizer failed: {0}")]
    Recognizer(String),

    /// A recognizer call exceeded its deadline after the configured retries.
    /// Fatal for the page.
    #[error("recognizer call timed out after {attempts} attempt(s)")]
    RecognizerTimeout {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A single region or recovery recognition failed. Non-fatal: the
    /// recovery step is skipped and the pipeline continues.
    #[error("region recognition failed: {0}")]
    Region(String),

    /// Cancellation signal observed. Cache writes made before the signal
    /// remain valid.
    #[error("operation aborted")]
    Aborted,

    /// Cache get/put failed. Non-fatal: the pipeline proceeds uncached.
    #[error("cache operation failed: {0}")]
    Cache(String),

    /// A configuration value was rejected before any work started.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Ambient I/O failure (reading image files, persisting results).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TextlayerError {
    /// Whether the pipeline treats this error as fatal for the page.
    ///
    /// Non-fatal kinds are caught at the stage that produced them and only
    /// reported through logging.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Region(_) | Self::Cache(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TextlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_and_cache_errors_are_non_fatal() {
        assert!(!TextlayerError::Region("crop failed".into()).is_fatal());
        assert!(!TextlayerError::Cache("store closed".into()).is_fatal());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(TextlayerError::Preprocess("too small".into()).is_fatal());
        assert!(TextlayerError::Recognizer("init".into()).is_fatal());
        assert!(TextlayerError::RecognizerTimeout { attempts: 3 }.is_fatal());
        assert!(TextlayerError::Aborted.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = TextlayerError::RecognizerTimeout { attempts: 3 };
        assert!(err.to_string().contains("3 attempt"));
    }
}
