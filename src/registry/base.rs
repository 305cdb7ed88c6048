//! Shared state and image lookups for fetchers and pushers

use crate::descriptor::Descriptor;
use crate::error::{RegistryError, Result};
use crate::reference::RegistryReference;
use crate::registry::api::{
    BatchGetImageInput, EcrApi, IMAGE_NOT_FOUND, IMAGE_TAG_DOES_NOT_MATCH_DIGEST, Image, ImageIdentifier,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Race a remote call against cancellation
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RegistryError::Cancelled),
        result = call => result,
    }
}

/// Client and repository a fetcher or pusher is bound to
#[derive(Clone)]
pub struct RegistryBase {
    pub(crate) client: Arc<dyn EcrApi>,
    pub(crate) reference: RegistryReference,
}

impl std::fmt::Debug for RegistryBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBase")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl RegistryBase {
    pub fn new(client: Arc<dyn EcrApi>, reference: RegistryReference) -> Self {
        Self { client, reference }
    }

    pub fn reference(&self) -> &RegistryReference {
        &self.reference
    }

    pub(crate) fn registry_id(&self) -> String {
        self.reference.registry_id().to_string()
    }

    pub(crate) fn repository_name(&self) -> String {
        self.reference.repository().to_string()
    }

    /// Look up a single image, optionally limiting the manifest media types the registry may return
    pub async fn get_image(
        &self,
        image_id: ImageIdentifier,
        accepted_media_types: Vec<String>,
        token: &CancellationToken,
    ) -> Result<Image> {
        let input = BatchGetImageInput {
            registry_id: self.registry_id(),
            repository_name: self.repository_name(),
            image_ids: vec![image_id],
            accepted_media_types,
        };
        self.run_get_image(input, token).await
    }

    /// Look up the image a descriptor points at by its digest.
    ///
    /// The reference's tag is added to the query when the reference pins the
    /// same digest, so the registry also checks the tag.
    pub async fn get_image_by_descriptor(&self, desc: &Descriptor, token: &CancellationToken) -> Result<Image> {
        let mut image_id = ImageIdentifier {
            image_digest: desc.digest.as_ref().map(ToString::to_string),
            image_tag: None,
        };
        if desc.digest.is_some() && self.reference.digest() == desc.digest.as_ref() {
            image_id.image_tag = self.reference.tag().map(str::to_string);
        }

        let accepted_media_types = if desc.media_type.is_empty() {
            Vec::new()
        } else {
            vec![desc.media_type.clone()]
        };

        self.get_image(image_id, accepted_media_types, token).await
    }

    /// Run an image query that must match exactly one image
    pub(crate) async fn run_get_image(&self, input: BatchGetImageInput, token: &CancellationToken) -> Result<Image> {
        trace!(?input, "batch get image");
        let client = Arc::clone(&self.client);
        let output = cancellable(token, async move {
            client.batch_get_image(input).await.map_err(RegistryError::from)
        })
        .await?;
        trace!(?output, "batch get image reply");

        let mut images = output.images;
        if images.len() == 1 {
            return Ok(images.remove(0));
        }

        for failure in &output.failures {
            match failure.failure_code.as_deref() {
                Some(IMAGE_NOT_FOUND) | Some(IMAGE_TAG_DOES_NOT_MATCH_DIGEST) => {
                    debug!(reference = %self.reference, code = ?failure.failure_code, "image lookup failed");
                    return Err(RegistryError::NotFound(format!(
                        "image {}: {}",
                        self.reference,
                        failure.failure_reason.as_deref().unwrap_or_default()
                    )));
                }
                _ => {}
            }
        }

        Err(RegistryError::InvalidReference(format!(
            "{} matched {} images",
            self.reference,
            images.len()
        )))
    }
}
