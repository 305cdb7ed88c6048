//! Write sinks returned by the pusher

use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::upload::layer_writer::LayerWriter;
use crate::upload::manifest_writer::ManifestWriter;
use crate::upload::progress::{Status, StatusTracker, update_status};
use async_trait::async_trait;
use std::time::SystemTime;

/// How a successful commit concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Content was stored by this writer
    Committed,
    /// The registry already held the content; nothing was stored
    AlreadyExists,
}

/// Sink for one descriptor's bytes.
///
/// Bytes are written in order, then `commit` finalizes them against the
/// expected size and digest. `commit` must be called at most once; dropping
/// or closing a writer without committing registers nothing.
#[async_trait]
pub trait ContentWriter: Send {
    /// Accept the whole buffer, returning its length
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Finalize the content. A `size` of 0 skips the size check.
    async fn commit(&mut self, size: u64, expected: &Digest) -> Result<CommitOutcome>;

    /// Release buffered data without committing
    fn close(&mut self) -> Result<()>;

    /// Digest of the bytes written so far
    fn digest(&self) -> Digest;

    fn status(&self) -> Result<Status>;

    fn truncate(&mut self, size: u64) -> Result<()>;
}

/// Writer chosen by the pusher for a descriptor's media type
#[derive(Debug)]
pub enum PushWriter {
    Manifest(ManifestWriter),
    Layer(LayerWriter),
}

#[async_trait]
impl ContentWriter for PushWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self {
            PushWriter::Manifest(w) => w.write(data).await,
            PushWriter::Layer(w) => w.write(data).await,
        }
    }

    async fn commit(&mut self, size: u64, expected: &Digest) -> Result<CommitOutcome> {
        match self {
            PushWriter::Manifest(w) => w.commit(size, expected).await,
            PushWriter::Layer(w) => w.commit(size, expected).await,
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            PushWriter::Manifest(w) => w.close(),
            PushWriter::Layer(w) => w.close(),
        }
    }

    fn digest(&self) -> Digest {
        match self {
            PushWriter::Manifest(w) => w.digest(),
            PushWriter::Layer(w) => w.digest(),
        }
    }

    fn status(&self) -> Result<Status> {
        match self {
            PushWriter::Manifest(w) => w.status(),
            PushWriter::Layer(w) => w.status(),
        }
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        match self {
            PushWriter::Manifest(w) => w.truncate(size),
            PushWriter::Layer(w) => w.truncate(size),
        }
    }
}

pub(crate) fn mark_progress(tracker: &dyn StatusTracker, key: &str, offset: u64) {
    update_status(tracker, key, |status| {
        status.offset = offset;
        status.updated_at = Some(SystemTime::now());
    });
}

pub(crate) fn mark_committed(tracker: &dyn StatusTracker, key: &str, offset: u64) {
    update_status(tracker, key, |status| {
        status.offset = offset;
        status.committed = true;
        status.error = None;
        status.updated_at = Some(SystemTime::now());
    });
}

pub(crate) fn mark_failed(tracker: &dyn StatusTracker, key: &str, err: &RegistryError) {
    update_status(tracker, key, |status| {
        status.error = Some(err.to_string());
        status.updated_at = Some(SystemTime::now());
    });
}
