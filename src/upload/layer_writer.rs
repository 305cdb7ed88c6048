//! Multipart layer upload
//!
//! A layer push runs in three phases: `initiate` opens an upload session and
//! learns the part size, `write` streams full parts as they fill up, and
//! `commit` flushes the short tail and completes the upload.

use crate::descriptor::Descriptor;
use crate::digest::{Digest, Digester};
use crate::error::{RegistryError, Result};
use crate::registry::api::{CompleteLayerUploadInput, InitiateLayerUploadInput, UploadLayerPartInput};
use crate::registry::base::{RegistryBase, cancellable};
use crate::upload::chunked::{LayerPart, PartBuffer};
use crate::upload::progress::{Status, StatusTracker};
use crate::upload::writer::{CommitOutcome, ContentWriter, mark_committed, mark_failed, mark_progress};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Part size used when the registry does not advertise one
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug)]
struct UploadSession {
    upload_id: String,
    parts: PartBuffer,
}

pub struct LayerWriter {
    base: RegistryBase,
    tracker: Arc<dyn StatusTracker>,
    ref_key: String,
    desc: Descriptor,
    session: Option<UploadSession>,
    digester: Digester,
    cancel: CancellationToken,
    /// Set once a part upload fails; the upload cannot continue past a gap
    aborted: Option<String>,
}

impl std::fmt::Debug for LayerWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerWriter")
            .field("ref_key", &self.ref_key)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl LayerWriter {
    /// Writer with no upload session yet; see [`LayerWriter::initiate`]
    pub(crate) fn new(
        base: RegistryBase,
        tracker: Arc<dyn StatusTracker>,
        ref_key: String,
        desc: Descriptor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            base,
            tracker,
            ref_key,
            desc,
            session: None,
            digester: Digester::new(),
            cancel,
            aborted: None,
        }
    }

    /// Open the remote upload session
    pub(crate) async fn initiate(&mut self) -> Result<()> {
        let input = InitiateLayerUploadInput {
            registry_id: self.base.registry_id(),
            repository_name: self.base.repository_name(),
        };
        let client = Arc::clone(&self.base.client);
        let output = cancellable(&self.cancel, async move {
            client.initiate_layer_upload(input).await.map_err(RegistryError::from)
        })
        .await
        .map_err(|err| self.fail(err))?;

        let upload_id = output.upload_id.unwrap_or_default();
        let part_size = output.part_size.filter(|&size| size > 0).unwrap_or(DEFAULT_PART_SIZE);
        debug!(
            digest = %self.desc.digest_str(),
            upload_id = %upload_id,
            part_size,
            "initiated layer upload"
        );

        self.session = Some(UploadSession {
            upload_id,
            parts: PartBuffer::new(part_size),
        });
        Ok(())
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.upload_id.as_str())
    }

    fn written(&self) -> u64 {
        self.session.as_ref().map(|s| s.parts.written()).unwrap_or(0)
    }

    fn fail(&self, err: RegistryError) -> RegistryError {
        mark_failed(self.tracker.as_ref(), &self.ref_key, &err);
        err
    }

    fn ensure_not_aborted(&self) -> Result<()> {
        match &self.aborted {
            Some(cause) => Err(RegistryError::FailedPrecondition(format!(
                "layer upload aborted after a failed part: {}",
                cause
            ))),
            None => Ok(()),
        }
    }

    /// Upload one part. Parts sent from `commit` are not raced against cancellation.
    async fn upload_part(&mut self, upload_id: String, part: LayerPart, race_cancel: bool) -> Result<()> {
        let first_byte = part.first_byte;
        let last_byte = part.last_byte();
        let input = UploadLayerPartInput {
            registry_id: self.base.registry_id(),
            repository_name: self.base.repository_name(),
            upload_id,
            part_first_byte: first_byte,
            part_last_byte: last_byte,
            layer_part_blob: part.data.to_vec(),
        };
        debug!(upload_id = %input.upload_id, first_byte, last_byte, "uploading layer part");

        let client = Arc::clone(&self.base.client);
        let call = async move { client.upload_layer_part(input).await.map_err(RegistryError::from) };
        let result = if race_cancel {
            cancellable(&self.cancel, call).await
        } else {
            call.await
        };
        if let Err(err) = result {
            warn!(digest = %self.desc.digest_str(), first_byte, error = %err, "layer part upload failed");
            self.aborted = Some(err.to_string());
            return Err(self.fail(err));
        }

        mark_progress(self.tracker.as_ref(), &self.ref_key, last_byte + 1);
        Ok(())
    }

    fn next_part(&mut self, tail: bool) -> Option<(String, LayerPart)> {
        let session = self.session.as_mut()?;
        let part = if tail {
            session.parts.take_rest()
        } else {
            session.parts.take_full()
        }?;
        Some((session.upload_id.clone(), part))
    }
}

#[async_trait]
impl ContentWriter for LayerWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_not_aborted()?;
        match self.session.as_mut() {
            Some(session) => session.parts.extend(data),
            None => {
                return Err(self.fail(RegistryError::FailedPrecondition(
                    "layer upload was not initiated".to_string(),
                )));
            }
        }
        self.digester.update(data);

        while let Some((upload_id, part)) = self.next_part(false) {
            self.upload_part(upload_id, part, true).await?;
        }
        Ok(data.len())
    }

    async fn commit(&mut self, size: u64, expected: &Digest) -> Result<CommitOutcome> {
        self.ensure_not_aborted()?;
        if let Some((upload_id, part)) = self.next_part(true) {
            self.upload_part(upload_id, part, false).await?;
        }

        let written = self.written();
        if size > 0 && size != written {
            return Err(self.fail(RegistryError::SizeMismatch {
                expected: size,
                actual: written,
            }));
        }

        let input = CompleteLayerUploadInput {
            registry_id: self.base.registry_id(),
            repository_name: self.base.repository_name(),
            upload_id: self.upload_id().unwrap_or_default().to_string(),
            layer_digests: vec![expected.to_string()],
        };
        debug!(digest = %expected, upload_id = %input.upload_id, "completing layer upload");

        // Completion is not raced against cancellation so an "already exists"
        // reply is still recorded.
        let output = match self.base.client.complete_layer_upload(input).await {
            Ok(output) => output,
            Err(err) if err.is_already_exists() => {
                debug!(digest = %expected, "layer already exists");
                self.session = None;
                mark_committed(self.tracker.as_ref(), &self.ref_key, self.desc.size.max(written));
                return Ok(CommitOutcome::AlreadyExists);
            }
            Err(err) => {
                warn!(digest = %expected, error = %err, "failed to complete layer upload");
                return Err(self.fail(err.into()));
            }
        };

        let completed = output.layer_digest.unwrap_or_default();
        if completed != expected.as_str() {
            return Err(self.fail(RegistryError::DigestMismatch {
                expected: expected.clone(),
                actual: completed,
            }));
        }

        self.session = None;
        mark_committed(self.tracker.as_ref(), &self.ref_key, written);
        Ok(CommitOutcome::Committed)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            // The remote session is left for the registry to expire.
            debug!(upload_id = %session.upload_id, "abandoning layer upload");
        }
        Ok(())
    }

    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    fn status(&self) -> Result<Status> {
        self.tracker.get_status(&self.ref_key)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if size == 0 && self.written() == 0 {
            return Ok(());
        }
        Err(RegistryError::FailedPrecondition(format!(
            "cannot truncate layer upload to {} bytes",
            size
        )))
    }
}
