//! Parallel ranged downloads
//!
//! The payload is split into contiguous byte ranges of at most
//! [`MAX_RANGE_SIZE`] bytes, fetched with bounded, ordered concurrency.
//! Completed ranges are sent in offset order through a bounded channel that
//! backs the returned reader, so memory stays near `parallelism` ranges. A
//! failed range is logged and delivered as an I/O error, so the reader fails
//! instead of ending early.

use crate::download::{BlobReader, MAX_RANGE_SIZE, MIN_RANGE_SIZE, get, stream_body};
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::registry::base::cancellable;
use bytes::Bytes;
use futures::{StreamExt, stream};
use reqwest::Client;
use std::io;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Inclusive byte range of the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub first: u64,
    pub last: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.first, self.last)
    }
}

/// Split `total` bytes into contiguous ranges of near-equal length.
///
/// Small payloads get up to `parallelism` ranges, no more than one per
/// started [`MIN_RANGE_SIZE`] bytes. Large payloads get as many ranges as
/// needed to keep each one within [`MAX_RANGE_SIZE`].
pub fn split_ranges(total: u64, parallelism: usize) -> Vec<ByteRange> {
    if total == 0 || parallelism == 0 {
        return Vec::new();
    }
    let count = (parallelism as u64)
        .min(total.div_ceil(MIN_RANGE_SIZE))
        .max(total.div_ceil(MAX_RANGE_SIZE))
        .max(1);
    let base = total / count;
    let remainder = total % count;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut first = 0;
    for i in 0..count {
        let len = base + u64::from(i < remainder);
        ranges.push(ByteRange {
            first,
            last: first + len - 1,
        });
        first += len;
    }
    ranges
}

pub struct ParallelDownloader {
    http: Client,
    url: String,
    media_type: String,
    parallelism: usize,
    cancel: CancellationToken,
}

impl ParallelDownloader {
    pub fn new(
        http: Client,
        url: impl Into<String>,
        media_type: impl Into<String>,
        parallelism: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            media_type: media_type.into(),
            parallelism: parallelism.max(1),
            cancel,
        }
    }

    /// Learn the payload size with a plain GET, then stream it either directly or as parallel ranges
    pub async fn start(self) -> Result<BlobReader> {
        let response = get(&self.http, &self.url, &self.media_type, None, &self.cancel).await?;
        let Some(total) = response.content_length() else {
            debug!(url = %self.url, "no content length, downloading sequentially");
            return Ok(stream_body(response, &self.cancel));
        };

        let ranges = split_ranges(total, self.parallelism);
        if ranges.len() <= 1 {
            return Ok(stream_body(response, &self.cancel));
        }
        drop(response);

        debug!(url = %self.url, total, ranges = ranges.len(), "downloading in parallel");
        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(self.parallelism);
        tokio::spawn(self.run(ranges, tx));

        let chunks = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) });
        Ok(Box::pin(StreamReader::new(chunks)))
    }

    async fn run(self, ranges: Vec<ByteRange>, tx: mpsc::Sender<io::Result<Bytes>>) {
        let mut parts = stream::iter(ranges)
            .map(|range| self.fetch_range(range))
            .buffered(self.parallelism);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Some(Err(RegistryError::Cancelled)),
                _ = tx.closed() => {
                    debug!(url = %self.url, "reader dropped, stopping download");
                    return;
                }
                next = parts.next() => next,
            };

            match next {
                None => return,
                Some(Ok(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
                Some(Err(err)) => {
                    error!(url = %self.url, error = %err, "failed to download layer range");
                    let _ = tx.send(Err(NetworkErrorHandler::to_io_error(err))).await;
                    return;
                }
            }
        }
    }

    async fn fetch_range(&self, range: ByteRange) -> Result<Bytes> {
        let header = range.header_value();
        let response = get(&self.http, &self.url, &self.media_type, Some(&header), &self.cancel).await?;
        if response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            return Err(HttpErrorHandler::handle_range_error(
                response.status(),
                &self.url,
                &header,
            ));
        }

        let body = cancellable(&self.cancel, async {
            response.bytes().await.map_err(RegistryError::from)
        })
        .await?;
        if body.len() as u64 != range.len() {
            return Err(RegistryError::Transport(format!(
                "range {} of {} returned {} bytes",
                header,
                self.url,
                body.len()
            )));
        }
        Ok(body)
    }
}
