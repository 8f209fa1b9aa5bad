//! Recognizer handle pool.
//!
//! Handles are strictly serial, so each page task acquires one for its
//! lifetime and releases it afterwards. The pool owns handle lifecycle: a
//! handle whose language no longer matches is terminated and re-initialized,
//! and a handle that produced a hard error is discarded instead of returned
//! to the free list. Timed-out requests leave the handle alive; only the
//! request fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use image::RgbaImage;
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::error::{Result, TextlayerError};

use super::{RecognizedPage, RecognizerFactory, RecognizerHandle, RecognizerParams};

/// A handle checked out of the pool for the duration of one page.
pub struct PooledRecognizer {
    handle: Box<dyn RecognizerHandle>,
    language: String,
    poisoned: bool,
}

impl PooledRecognizer {
    pub fn language(&self) -> &str {
        &self.language
    }
}

pub struct RecognizerPool {
    factory: Arc<dyn RecognizerFactory>,
    free: Mutex<Vec<PooledRecognizer>>,
    timeout: Duration,
    retries: u32,
    sweep_interval: Duration,
    next_request: AtomicU64,
    in_flight: Arc<Mutex<AHashMap<u64, Instant>>>,
}

impl RecognizerPool {
    pub fn new(
        factory: Arc<dyn RecognizerFactory>,
        timeout: Duration,
        retries: u32,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            factory,
            free: Mutex::new(Vec::new()),
            timeout,
            retries,
            sweep_interval,
            next_request: AtomicU64::new(0),
            in_flight: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Check out a handle bound to `language`, re-initializing a pooled one
    /// whose language differs.
    pub async fn acquire(&self, language: &str) -> Result<PooledRecognizer> {
        let reusable = {
            let mut free = self.free.lock();
            free.pop()
        };

        if let Some(mut pooled) = reusable {
            if pooled.language == language {
                return Ok(pooled);
            }
            tracing::info!(
                from = %pooled.language,
                to = %language,
                "recognizer language switch, re-initializing handle"
            );
            if let Err(e) = pooled.handle.terminate().await {
                tracing::warn!(error = %e, "terminating stale recognizer handle failed");
            }
        }

        let handle = self.factory.init(language).await?;
        Ok(PooledRecognizer {
            handle,
            language: language.to_string(),
            poisoned: false,
        })
    }

    /// Return a handle to the free list; poisoned handles are dropped.
    pub fn release(&self, pooled: PooledRecognizer) {
        if pooled.poisoned {
            tracing::info!(language = %pooled.language, "discarding poisoned recognizer handle");
            return;
        }
        self.free.lock().push(pooled);
    }

    /// Run one recognition with the configured deadline and retry policy.
    ///
    /// A timed-out attempt is retried with 1s/2s/4s backoff; the handle
    /// stays healthy. A recognizer error poisons the handle so the pool
    /// replaces it. Cancellation abandons the in-flight call and surfaces
    /// [`TextlayerError::Aborted`].
    pub async fn recognize(
        &self,
        pooled: &mut PooledRecognizer,
        image: &RgbaImage,
        params: &RecognizerParams,
        cancel: &CancelToken,
    ) -> Result<RecognizedPage> {
        cancel.bail()?;
        pooled.handle.set_parameters(params).await.inspect_err(|_| {
            pooled.poisoned = true;
        })?;

        let attempts = self.retries + 1;
        for attempt in 0..attempts {
            cancel.bail()?;

            let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
            self.in_flight.lock().insert(request_id, Instant::now());

            let outcome = tokio::select! {
                res = tokio::time::timeout(self.timeout, pooled.handle.recognize(image)) => res,
                _ = cancel.cancelled() => {
                    self.in_flight.lock().remove(&request_id);
                    return Err(TextlayerError::Aborted);
                }
            };
            self.in_flight.lock().remove(&request_id);

            match outcome {
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(e)) => {
                    pooled.poisoned = true;
                    return Err(e);
                }
                Err(_elapsed) => {
                    if attempt + 1 == attempts {
                        return Err(TextlayerError::RecognizerTimeout { attempts });
                    }
                    let backoff = Duration::from_secs(1u64 << attempt.min(2));
                    tracing::warn!(
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        "recognizer call timed out, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        Err(TextlayerError::RecognizerTimeout { attempts })
    }

    /// Apply parameters outside a recognition call, used to restore the
    /// page defaults after a region recognition overrode the PSM.
    pub async fn set_parameters(&self, pooled: &mut PooledRecognizer, params: &RecognizerParams) -> Result<()> {
        pooled.handle.set_parameters(params).await.inspect_err(|_| {
            pooled.poisoned = true;
        })
    }

    /// Spawn the periodic sweep that reaps bookkeeping for requests older
    /// than the timeout. Stops on its own once the pool is dropped.
    pub fn start_health_sweep(self: &Arc<Self>) {
        let in_flight = Arc::downgrade(&self.in_flight);
        let timeout = self.timeout;
        let interval = self.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(map) = in_flight.upgrade() else {
                    break;
                };
                let mut map = map.lock();
                let before = map.len();
                map.retain(|_, started| started.elapsed() < timeout);
                let reaped = before - map.len();
                if reaped > 0 {
                    tracing::warn!(reaped, "health sweep reaped stale recognizer requests");
                }
            }
        });
    }

    /// Number of idle handles currently pooled.
    pub fn idle_handles(&self) -> usize {
        self.free.lock().len()
    }
}
