//! Page-OCR cache boundary.
//!
//! The engine only needs `get`/`put`/`latest_for_document` keyed by
//! `(document_id, page_number)`; the embedded kv store behind it is someone
//! else's concern. A cached entry is only served when its recognition
//! parameters and algorithm version match the current request; stale
//! entries are ignored, not deleted, and the next put overwrites them.

use std::time::SystemTime;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::OcrRequest;
use crate::error::Result;
use crate::types::{ALGORITHM_VERSION, PageResult, ScriptKind, normalize_language};

/// Cache occupancy summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
}

/// Storage interface for per-page OCR results.
///
/// `put` is an idempotent upsert with last-writer-wins semantics; readers
/// may observe earlier versions concurrently.
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, document_id: &str, page_number: u32) -> Result<Option<PageResult>>;

    async fn put(&self, document_id: &str, page_number: u32, result: &PageResult) -> Result<()>;

    /// Most recently upserted page for a document, with its upsert time.
    async fn latest_for_document(&self, document_id: &str) -> Result<Option<(u32, SystemTime, PageResult)>>;

    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<CacheStats>;
}

/// Whether a cached result satisfies the current request: language set
/// (order-insensitive), dpi, effective segmentation mode and algorithm
/// version must all match.
pub fn cached_result_valid(cached: &PageResult, request: &OcrRequest) -> bool {
    let script = ScriptKind::from_language(&request.language);
    normalize_language(&cached.language) == normalize_language(&request.language)
        && cached.dpi == request.dpi
        && cached.page_seg_mode == request.effective_psm(script)
        && cached.algorithm_version == ALGORITHM_VERSION
}

/// In-memory [`PageCache`] for tests and embedded use.
#[derive(Default)]
pub struct MemoryPageCache {
    entries: RwLock<AHashMap<(String, u32), (SystemTime, PageResult)>>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn get(&self, document_id: &str, page_number: u32) -> Result<Option<PageResult>> {
        let entries = self.entries.read();
        Ok(entries
            .get(&(document_id.to_string(), page_number))
            .map(|(_, result)| result.clone()))
    }

    async fn put(&self, document_id: &str, page_number: u32, result: &PageResult) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(
            (document_id.to_string(), page_number),
            (SystemTime::now(), result.clone()),
        );
        Ok(())
    }

    async fn latest_for_document(&self, document_id: &str) -> Result<Option<(u32, SystemTime, PageResult)>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|((doc, _), _)| doc == document_id)
            .max_by_key(|((_, page), (updated, _))| (*updated, *page))
            .map(|((_, page), (updated, result))| (*page, *updated, result.clone())))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            entries: self.entries.read().len(),
        })
    }
}
