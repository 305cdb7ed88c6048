//! Content retrieval by descriptor

use crate::descriptor::Descriptor;
use crate::download::{self, BlobReader};
use crate::error::{RegistryError, Result};
use crate::media_types::ContentKind;
use crate::registry::api::GetDownloadUrlForLayerInput;
use crate::registry::base::{RegistryBase, cancellable};
use reqwest::Client;
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Fetches manifests and blobs of one repository
#[derive(Debug, Clone)]
pub struct Fetcher {
    base: RegistryBase,
    http: Client,
    parallelism: usize,
    cancel: CancellationToken,
}

impl Fetcher {
    pub(crate) fn new(base: RegistryBase, http: Client, parallelism: usize, cancel: CancellationToken) -> Self {
        Self {
            base,
            http,
            parallelism,
            cancel,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn base(&self) -> &RegistryBase {
        &self.base
    }

    /// Open a reader over the content a descriptor points at
    pub async fn fetch(&self, desc: &Descriptor) -> Result<BlobReader> {
        debug!(
            reference = %self.base.reference,
            digest = %desc.digest_str(),
            media_type = %desc.media_type,
            "fetch"
        );
        match desc.kind() {
            ContentKind::Manifest | ContentKind::Index => self.fetch_manifest(desc).await,
            ContentKind::Layer | ContentKind::Config => self.fetch_layer(desc).await,
            ContentKind::ForeignLayer => self.fetch_foreign_layer(desc).await,
            ContentKind::Unknown => {
                error!(media_type = %desc.media_type, "fetcher: unimplemented media type");
                Err(RegistryError::Unimplemented(format!(
                    "fetcher does not support media type {}",
                    desc.media_type
                )))
            }
        }
    }

    async fn fetch_manifest(&self, desc: &Descriptor) -> Result<BlobReader> {
        let image = match desc.digest {
            // First pull of a tag: nothing is known beyond the reference.
            None => {
                self.base
                    .get_image(self.base.reference.image_id(), Vec::new(), &self.cancel)
                    .await?
            }
            Some(_) => self.base.get_image_by_descriptor(desc, &self.cancel).await?,
        };

        let manifest = image.image_manifest.ok_or_else(|| {
            RegistryError::NotFound(format!("manifest for {} has no content", self.base.reference))
        })?;
        Ok(Box::pin(Cursor::new(manifest.into_bytes())))
    }

    async fn fetch_layer(&self, desc: &Descriptor) -> Result<BlobReader> {
        let digest = desc
            .digest
            .as_ref()
            .ok_or_else(|| RegistryError::FailedPrecondition("layer descriptor has no digest".to_string()))?;
        let input = GetDownloadUrlForLayerInput {
            registry_id: self.base.registry_id(),
            repository_name: self.base.repository_name(),
            layer_digest: digest.to_string(),
        };

        let client = Arc::clone(&self.base.client);
        let output = cancellable(&self.cancel, async move {
            client.get_download_url_for_layer(input).await.map_err(RegistryError::from)
        })
        .await?;
        let url = output
            .download_url
            .ok_or_else(|| RegistryError::NotFound(format!("no download url for layer {}", digest)))?;

        debug!(digest = %digest, url = %url, parallelism = self.parallelism, "fetching layer");
        download::fetch_url(&self.http, &url, &desc.media_type, self.parallelism, &self.cancel).await
    }

    /// Foreign layers live outside the registry; only the first URL is tried
    async fn fetch_foreign_layer(&self, desc: &Descriptor) -> Result<BlobReader> {
        let url = desc
            .urls
            .first()
            .ok_or_else(|| RegistryError::NotFound("foreign layer descriptor has no urls".to_string()))?;
        debug!(url = %url, "fetching foreign layer");
        download::fetch_url(&self.http, url, &desc.media_type, 0, &self.cancel).await
    }
}
