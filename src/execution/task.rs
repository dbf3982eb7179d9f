//! # Upload Tasks and the Transport Seam
//!
//! The transport is an opaque, callback-based operation supplied by the
//! caller: [`Uploader::upload`] receives one item and an [`UploadCompletion`]
//! and must eventually report success or failure through it. The completion is
//! consumed when used, so it can answer at most once.
//!
//! Transports written as `async fn` can be plugged in through
//! [`AsyncUploader`] and [`AsyncUploadAdapter`].

use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;

/// Callback-based upload transport
///
/// Implementations start the upload and return promptly; the result is
/// delivered later, from any thread, via [`UploadCompletion::complete`].
///
/// Any `Fn(T, UploadCompletion)` closure is an `Uploader`.
pub trait Uploader<T>: Send + Sync + 'static {
    fn upload(&self, item: T, completion: UploadCompletion);
}

impl<T, F> Uploader<T> for F
where
    F: Fn(T, UploadCompletion) + Send + Sync + 'static,
{
    fn upload(&self, item: T, completion: UploadCompletion) {
        self(item, completion)
    }
}

/// One-shot success callback handed to the transport for a single attempt
pub struct UploadCompletion {
    sender: oneshot::Sender<bool>,
}

impl UploadCompletion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<bool>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Report the result of the attempt.
    ///
    /// If the attempt's unit was cancelled meanwhile, the result is discarded.
    pub fn complete(self, success: bool) {
        // The receiving side is gone once the unit was cancelled or timed out
        let _ = self.sender.send(success);
    }

    pub fn succeed(self) {
        self.complete(true)
    }

    pub fn fail(self) {
        self.complete(false)
    }

    /// Whether anyone is still waiting for this attempt's result
    pub fn is_awaited(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl fmt::Debug for UploadCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCompletion")
            .field("awaited", &self.is_awaited())
            .finish()
    }
}

/// Immutable description of one item's upload work
pub struct UploadTask<T> {
    payload: T,
    uploader: Arc<dyn Uploader<T>>,
}

impl<T> UploadTask<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(payload: T, uploader: Arc<dyn Uploader<T>>) -> Self {
        Self { payload, uploader }
    }

    /// Start one attempt: hand a copy of the payload to the transport
    pub(crate) fn attempt(&self, completion: UploadCompletion) {
        self.uploader.upload(self.payload.clone(), completion);
    }
}

impl<T: fmt::Debug> fmt::Debug for UploadTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// Upload transport written as an async function
#[async_trait]
pub trait AsyncUploader<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Upload one item, returning whether the server accepted it
    async fn upload(&self, item: T) -> bool;
}

/// Adapts an [`AsyncUploader`] to the callback-based [`Uploader`] seam.
///
/// Each attempt runs as its own tokio task. A panicking upload future reports
/// failure instead of abandoning the attempt.
pub struct AsyncUploadAdapter<U> {
    inner: Arc<U>,
}

impl<U> AsyncUploadAdapter<U> {
    pub fn new(inner: U) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl<T, U> Uploader<T> for AsyncUploadAdapter<U>
where
    T: Send + 'static,
    U: AsyncUploader<T>,
{
    fn upload(&self, item: T, completion: UploadCompletion) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let success = match AssertUnwindSafe(inner.upload(item)).catch_unwind().await {
                Ok(success) => success,
                Err(_) => {
                    warn!("Async upload panicked, reporting attempt as failed");
                    false
                }
            };
            completion.complete(success);
        });
    }
}
