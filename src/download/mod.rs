//! Blob downloads from pre-signed layer URLs
//!
//! A download is either a single streamed GET, or, when parallelism is
//! configured, a set of ranged GETs fanned back into one ordered stream by
//! [`ParallelDownloader`].

pub mod parallel;

pub use parallel::ParallelDownloader;

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::registry::base::cancellable;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::header::{ACCEPT, RANGE};
use reqwest::{Client, Response};
use url::Url;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stream of blob or manifest bytes handed back to callers
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Smallest byte range worth a separate request
pub const MIN_RANGE_SIZE: u64 = 1024 * 1024;

/// Largest byte range held in memory at once by a parallel download
pub const MAX_RANGE_SIZE: u64 = 8 * 1024 * 1024;

/// Download `url`, splitting it into `parallelism` concurrent ranges when non-zero
pub async fn fetch_url(
    http: &Client,
    url: &str,
    media_type: &str,
    parallelism: usize,
    cancel: &CancellationToken,
) -> Result<BlobReader> {
    if parallelism > 0 {
        return ParallelDownloader::new(http.clone(), url, media_type, parallelism, cancel.clone())
            .start()
            .await;
    }
    let response = get(http, url, media_type, None, cancel).await?;
    Ok(stream_body(response, cancel))
}

fn accept_header(media_type: &str) -> String {
    format!("{}, *", media_type)
}

/// GET `url`, optionally restricted to a byte range, failing on non-success replies
pub(crate) async fn get(
    http: &Client,
    url: &str,
    media_type: &str,
    range: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Response> {
    debug!(url = %url, media_type = %media_type, range = ?range, "downloading");
    let parsed = Url::parse(url)?;
    let mut request = http.get(parsed).header(ACCEPT, accept_header(media_type));
    if let Some(range) = range {
        request = request.header(RANGE, range);
    }

    let response = cancellable(cancel, async { request.send().await.map_err(RegistryError::from) }).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(match range {
            Some(range) => HttpErrorHandler::handle_range_error(status, url, range),
            None => HttpErrorHandler::handle_download_error(status, url),
        });
    }
    Ok(response)
}

/// Expose a response body as a reader that fails once `cancel` fires
pub(crate) fn stream_body(response: Response, cancel: &CancellationToken) -> BlobReader {
    let body = Box::pin(response.bytes_stream().map_err(NetworkErrorHandler::to_io_error));
    let chunks = stream::unfold(Some((body, cancel.clone())), |state| async move {
        let Some((mut body, cancel)) = state else {
            return None;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Some((Err(NetworkErrorHandler::to_io_error(RegistryError::Cancelled)), None))
            }
            chunk = body.next() => chunk.map(|chunk| (chunk, Some((body, cancel)))),
        }
    });
    Box::pin(StreamReader::new(chunks))
}
