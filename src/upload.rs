//! Batched uploads to the blob store.
//!
//! A batch is validated as a whole before anything is sent. Files then go
//! out ten at a time; one failing file does not stop its siblings, and a
//! cancellation aborts whatever is in flight and skips the rest.

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::TatttyError;
use crate::gallery::GalleryItem;
use crate::output::data_url;
use crate::ports::blob_store::{BlobObject, UploadFile};
use crate::ports::BlobStore;

/// Largest accepted file: 4.5 MB.
pub const MAX_UPLOAD_BYTES: usize = 4_718_592;
/// Files uploaded concurrently per batch.
pub const BATCH_SIZE: usize = 10;

/// Reject the batch if uploads are disabled or any file is too large.
///
/// # Errors
///
/// Returns [`TatttyError::Validation`] describing the first problem found.
pub fn validate_batch(files: &[UploadFile], demo_mode: bool) -> Result<(), TatttyError> {
    if demo_mode {
        return Err(TatttyError::Validation("Uploads are disabled in demo mode".into()));
    }
    if files.is_empty() {
        return Err(TatttyError::Validation("No files selected".into()));
    }
    let oversized = files.iter().filter(|f| f.data.len() > MAX_UPLOAD_BYTES).count();
    if oversized > 0 {
        let plural = if oversized > 1 { "s" } else { "" };
        return Err(TatttyError::Validation(format!(
            "{oversized} file{plural} exceed the 4.5MB limit"
        )));
    }
    Ok(())
}

/// Local previews shown before the store confirms anything.
#[must_use]
pub fn optimistic_previews(files: &[UploadFile]) -> Vec<GalleryItem> {
    files
        .iter()
        .map(|f| {
            let mut item = GalleryItem::from_url(
                data_url(&f.data, Some(&f.content_type)),
                u64::try_from(f.data.len()).ok(),
            );
            item.name = f.name.clone();
            item
        })
        .collect()
}

/// Progress after a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    /// Files attempted so far.
    pub completed: usize,
    /// Files in the whole upload.
    pub total: usize,
}

/// A file that did not make it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    /// File name.
    pub name: String,
    /// Why it failed.
    pub error: String,
}

/// Outcome of an upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    /// Stored blobs, in submission order.
    pub uploaded: Vec<BlobObject>,
    /// Failed files, in submission order.
    pub failed: Vec<UploadFailure>,
    /// Whether the run was cancelled before finishing.
    pub cancelled: bool,
}

impl UploadReport {
    /// One-line summary, e.g. `2 files uploaded successfully`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.uploaded.is_empty() {
            let n = self.uploaded.len();
            parts.push(format!("{n} file{} uploaded successfully", plural(n)));
        }
        if let Some(first) = self.failed.first() {
            let n = self.failed.len();
            parts.push(format!("Failed to upload {n} file{}: {}", plural(n), first.error));
        }
        if parts.is_empty() {
            return "Nothing uploaded".to_string();
        }
        parts.join(". ")
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Upload `files` in sequential batches of [`BATCH_SIZE`].
///
/// `on_progress` runs after every batch. Cancelling `cancel` fails the
/// in-flight uploads with "Upload cancelled" and skips later batches.
pub async fn upload_all(
    blobs: &dyn BlobStore,
    files: &[UploadFile],
    cancel: &CancellationToken,
    on_progress: impl Fn(UploadProgress),
) -> UploadReport {
    let total = files.len();
    let mut report = UploadReport::default();
    let mut completed = 0;

    for batch in files.chunks(BATCH_SIZE) {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let results = join_all(batch.iter().map(|file| upload_one(blobs, file, cancel))).await;
        for (file, result) in batch.iter().zip(results) {
            match result {
                Ok(blob) => report.uploaded.push(blob),
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "upload failed");
                    report.failed.push(UploadFailure {
                        name: file.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        completed += batch.len();
        on_progress(UploadProgress { completed, total });
    }

    report.cancelled |= cancel.is_cancelled();
    report
}

async fn upload_one(
    blobs: &dyn BlobStore,
    file: &UploadFile,
    cancel: &CancellationToken,
) -> Result<BlobObject, TatttyError> {
    tokio::select! {
        () = cancel.cancelled() => Err(TatttyError::Cancelled),
        result = blobs.put(file) => result,
    }
}
