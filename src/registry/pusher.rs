//! Opening write sinks for descriptors

use crate::descriptor::Descriptor;
use crate::error::{RegistryError, Result};
use crate::registry::api::BatchCheckLayerAvailabilityInput;
use crate::registry::base::{RegistryBase, cancellable};
use crate::upload::layer_writer::LayerWriter;
use crate::upload::manifest_writer::ManifestWriter;
use crate::upload::progress::{Status, StatusTracker};
use crate::upload::writer::PushWriter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Pushes manifests and blobs into one repository under one tag
#[derive(Clone)]
pub struct Pusher {
    base: RegistryBase,
    tracker: Arc<dyn StatusTracker>,
    ref_key_prefix: Option<String>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Pusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("base", &self.base)
            .field("ref_key_prefix", &self.ref_key_prefix)
            .finish_non_exhaustive()
    }
}

impl Pusher {
    pub(crate) fn new(base: RegistryBase, tracker: Arc<dyn StatusTracker>, cancel: CancellationToken) -> Self {
        Self {
            base,
            tracker,
            ref_key_prefix: None,
            cancel,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Qualify status keys, e.g. to separate concurrent pushes of the same content
    pub fn with_ref_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ref_key_prefix = Some(prefix.into());
        self
    }

    pub fn base(&self) -> &RegistryBase {
        &self.base
    }

    pub fn tracker(&self) -> &Arc<dyn StatusTracker> {
        &self.tracker
    }

    /// Status key for a descriptor pushed through this pusher
    pub fn ref_key(&self, desc: &Descriptor) -> String {
        desc.ref_key(self.ref_key_prefix.as_deref())
    }

    /// Open a writer for `desc`.
    ///
    /// Content the registry already holds is reported as
    /// [`RegistryError::AlreadyExists`] and recorded as committed.
    pub async fn push(&self, desc: &Descriptor) -> Result<PushWriter> {
        debug!(
            reference = %self.base.reference,
            digest = %desc.digest_str(),
            media_type = %desc.media_type,
            "push"
        );
        if desc.kind().is_image_metadata() {
            self.push_manifest(desc).await.map(PushWriter::Manifest)
        } else {
            self.push_blob(desc).await.map(PushWriter::Layer)
        }
    }

    async fn push_manifest(&self, desc: &Descriptor) -> Result<ManifestWriter> {
        if self.manifest_exists(desc).await? {
            return Err(self.mark_status_exists(desc));
        }

        let ref_key = self.ref_key(desc);
        self.tracker
            .set_status(&ref_key, Status::started(&ref_key, desc.size, desc.digest.clone()));
        Ok(ManifestWriter::new(
            self.base.clone(),
            Arc::clone(&self.tracker),
            ref_key,
            desc.clone(),
        ))
    }

    async fn manifest_exists(&self, desc: &Descriptor) -> Result<bool> {
        match self.base.get_image_by_descriptor(desc, &self.cancel).await {
            Ok(image) => Ok(desc.digest.is_some() && image.image_id.image_digest.as_deref() == Some(desc.digest_str())),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn push_blob(&self, desc: &Descriptor) -> Result<LayerWriter> {
        let digest = desc
            .digest
            .as_ref()
            .ok_or_else(|| RegistryError::FailedPrecondition("blob descriptor has no digest".to_string()))?;
        let input = BatchCheckLayerAvailabilityInput {
            registry_id: self.base.registry_id(),
            repository_name: self.base.repository_name(),
            layer_digests: vec![digest.to_string()],
        };
        trace!(?input, "batch check layer availability");

        let client = Arc::clone(&self.base.client);
        let output = cancellable(&self.cancel, async move {
            client
                .batch_check_layer_availability(input)
                .await
                .map_err(RegistryError::from)
        })
        .await?;
        trace!(?output, "batch check layer availability reply");

        let Some(layer) = output.layers.first() else {
            if !output.failures.is_empty() {
                return Err(RegistryError::NotFound("layer not found".to_string()));
            }
            return Err(RegistryError::NotFound(format!("no availability reported for layer {}", digest)));
        };
        if layer.is_available() {
            return Err(self.mark_status_exists(desc));
        }

        let ref_key = self.ref_key(desc);
        self.tracker
            .set_status(&ref_key, Status::started(&ref_key, desc.size, desc.digest.clone()));

        let mut writer = LayerWriter::new(
            self.base.clone(),
            Arc::clone(&self.tracker),
            ref_key,
            desc.clone(),
            self.cancel.clone(),
        );
        writer.initiate().await?;
        Ok(writer)
    }

    fn mark_status_exists(&self, desc: &Descriptor) -> RegistryError {
        let ref_key = self.ref_key(desc);
        debug!(ref_key = %ref_key, "content already exists on remote");
        self.tracker
            .set_status(&ref_key, Status::exists(&ref_key, desc.size, desc.digest.clone()));
        RegistryError::AlreadyExists(format!("content {} on remote", desc.digest_str()))
    }
}
