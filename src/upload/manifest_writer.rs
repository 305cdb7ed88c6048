//! Manifest registration

use crate::descriptor::Descriptor;
use crate::digest::{Digest, Digester};
use crate::error::{RegistryError, Result};
use crate::registry::api::PutImageInput;
use crate::registry::base::RegistryBase;
use crate::upload::progress::{Status, StatusTracker};
use crate::upload::writer::{CommitOutcome, ContentWriter, mark_committed, mark_failed, mark_progress};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Buffers a manifest in memory and registers it with the registry on commit
pub struct ManifestWriter {
    base: RegistryBase,
    tracker: Arc<dyn StatusTracker>,
    ref_key: String,
    desc: Descriptor,
    buf: Vec<u8>,
    digester: Digester,
}

impl std::fmt::Debug for ManifestWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestWriter")
            .field("ref_key", &self.ref_key)
            .field("buffered", &self.buf.len())
            .finish_non_exhaustive()
    }
}

impl ManifestWriter {
    pub(crate) fn new(base: RegistryBase, tracker: Arc<dyn StatusTracker>, ref_key: String, desc: Descriptor) -> Self {
        Self {
            base,
            tracker,
            ref_key,
            desc,
            buf: Vec::new(),
            digester: Digester::new(),
        }
    }

    /// The reference's tag is applied only to the root manifest it pins
    fn tag_for(&self, expected: &Digest) -> Option<String> {
        match self.base.reference.digest() {
            Some(root) if root == expected => self.base.reference.tag().map(str::to_string),
            _ => None,
        }
    }

    fn fail(&self, err: RegistryError) -> RegistryError {
        mark_failed(self.tracker.as_ref(), &self.ref_key, &err);
        err
    }
}

#[async_trait]
impl ContentWriter for ManifestWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.buf.extend_from_slice(data);
        self.digester.update(data);
        mark_progress(self.tracker.as_ref(), &self.ref_key, self.buf.len() as u64);
        Ok(data.len())
    }

    async fn commit(&mut self, size: u64, expected: &Digest) -> Result<CommitOutcome> {
        let written = self.buf.len() as u64;
        if size > 0 && size != written {
            return Err(self.fail(RegistryError::SizeMismatch {
                expected: size,
                actual: written,
            }));
        }

        let actual = self.digester.digest();
        if actual != *expected {
            return Err(self.fail(RegistryError::DigestMismatch {
                expected: expected.clone(),
                actual: actual.to_string(),
            }));
        }

        let manifest = match String::from_utf8(self.buf.clone()) {
            Ok(manifest) => manifest,
            Err(_) => {
                return Err(self.fail(RegistryError::FailedPrecondition(
                    "manifest is not valid UTF-8".to_string(),
                )));
            }
        };

        let input = PutImageInput {
            registry_id: self.base.registry_id(),
            repository_name: self.base.repository_name(),
            image_manifest: manifest,
            image_manifest_media_type: Some(self.desc.media_type.clone()).filter(|m| !m.is_empty()),
            image_tag: self.tag_for(expected),
        };
        debug!(
            reference = %self.base.reference,
            digest = %expected,
            tag = ?input.image_tag,
            "registering manifest"
        );

        let output = match self.base.client.put_image(input).await {
            Ok(output) => output,
            Err(err) if err.is_already_exists() => {
                debug!(digest = %expected, "manifest already exists");
                mark_committed(self.tracker.as_ref(), &self.ref_key, written);
                return Ok(CommitOutcome::AlreadyExists);
            }
            Err(err) => {
                warn!(reference = %self.base.reference, error = %err, "failed to put manifest");
                return Err(self.fail(err.into()));
            }
        };

        let pushed = output.image.and_then(|image| image.image_id.image_digest).unwrap_or_default();
        if pushed != expected.as_str() {
            return Err(self.fail(RegistryError::DigestMismatch {
                expected: expected.clone(),
                actual: pushed,
            }));
        }

        mark_committed(self.tracker.as_ref(), &self.ref_key, written);
        Ok(CommitOutcome::Committed)
    }

    fn close(&mut self) -> Result<()> {
        self.buf = Vec::new();
        Ok(())
    }

    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    fn status(&self) -> Result<Status> {
        self.tracker.get_status(&self.ref_key)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if size != 0 {
            return Err(RegistryError::FailedPrecondition(
                "a manifest writer can only truncate to 0".to_string(),
            ));
        }
        self.buf.clear();
        self.digester = Digester::new();
        mark_progress(self.tracker.as_ref(), &self.ref_key, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::samples;
    use crate::reference::RegistryReference;
    use crate::reference::fixtures::*;
    use crate::registry::api::{ApiError, IMAGE_ALREADY_EXISTS, Image, ImageIdentifier, PutImageOutput};
    use crate::registry::fake::FakeEcrClient;
    use crate::upload::progress::InMemoryTracker;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const REF_KEY: &str = "manifest-key";

    fn writer(client: FakeEcrClient, root: &Digest) -> (ManifestWriter, Arc<InMemoryTracker>) {
        let reference = RegistryReference::parse(&fake_ref_with_object(&format!(":{}@{}", FAKE_TAG, root))).unwrap();
        let tracker = Arc::new(InMemoryTracker::new());
        let sample = samples::OCI_IMAGE_MANIFEST;
        let writer = ManifestWriter::new(
            RegistryBase::new(client.into_client(), reference),
            tracker.clone(),
            REF_KEY.to_string(),
            sample.descriptor(),
        );
        (writer, tracker)
    }

    fn put_reply(digest: &str) -> PutImageOutput {
        PutImageOutput {
            image: Some(Image {
                image_id: ImageIdentifier {
                    image_digest: Some(digest.to_string()),
                    image_tag: None,
                },
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_commit_registers_root_manifest_under_tag() {
        let sample = samples::OCI_IMAGE_MANIFEST;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let reply = sample.digest().to_string();
        let client = FakeEcrClient::new().with_put_image(move |input| {
            captured.lock().unwrap().push(input);
            Ok(put_reply(&reply))
        });
        let (mut writer, tracker) = writer(client, &sample.digest());

        let body = sample.content().as_bytes();
        let (head, tail) = body.split_at(10);
        assert_eq!(writer.write(head).await.unwrap(), 10);
        writer.write(tail).await.unwrap();
        assert_eq!(writer.digest(), sample.digest());

        let outcome = writer.commit(body.len() as u64, &sample.digest()).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].image_manifest, sample.content());
        assert_eq!(seen[0].image_tag.as_deref(), Some(FAKE_TAG));
        assert_eq!(seen[0].image_manifest_media_type.as_deref(), Some(sample.media_type));
        assert_eq!(seen[0].registry_id, FAKE_REGISTRY_ID);

        let status = tracker.get_status(REF_KEY).unwrap();
        assert!(status.committed);
        assert_eq!(status.offset, body.len() as u64);
    }

    #[tokio::test]
    async fn test_child_manifest_is_not_tagged() {
        let sample = samples::OCI_IMAGE_MANIFEST;
        let seen = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let reply = sample.digest().to_string();
        let client = FakeEcrClient::new().with_put_image(move |input| {
            *captured.lock().unwrap() = Some(input.image_tag);
            Ok(put_reply(&reply))
        });
        let (mut writer, _) = writer(client, &Digest::sha256_of(b"some index"));

        writer.write(sample.content().as_bytes()).await.unwrap();
        writer.commit(0, &sample.digest()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(None));
    }

    #[tokio::test]
    async fn test_commit_already_exists() {
        let sample = samples::OCI_IMAGE_MANIFEST;
        let client =
            FakeEcrClient::new().with_put_image(|_| Err(ApiError::new(IMAGE_ALREADY_EXISTS, "already tagged")));
        let (mut writer, tracker) = writer(client, &sample.digest());

        writer.write(sample.content().as_bytes()).await.unwrap();
        let outcome = writer.commit(0, &sample.digest()).await.unwrap();
        assert_eq!(outcome, CommitOutcome::AlreadyExists);
        assert!(tracker.get_status(REF_KEY).unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_digest_mismatch_skips_registration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let client = FakeEcrClient::new().with_put_image(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(PutImageOutput::default())
        });
        let expected = Digest::sha256_of(b"something else");
        let (mut writer, tracker) = writer(client, &expected);

        writer.write(samples::OCI_IMAGE_MANIFEST.content().as_bytes()).await.unwrap();
        let err = writer.commit(0, &expected).await.unwrap_err();
        assert!(matches!(err, RegistryError::DigestMismatch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(tracker.get_status(REF_KEY).unwrap().error.is_some());
    }

    #[tokio::test]
    async fn test_size_mismatch() {
        let sample = samples::OCI_IMAGE_MANIFEST;
        let (mut writer, _) = writer(FakeEcrClient::new(), &sample.digest());
        writer.write(sample.content().as_bytes()).await.unwrap();
        let err = writer.commit(1, &sample.digest()).await.unwrap_err();
        assert!(matches!(err, RegistryError::SizeMismatch { expected: 1, .. }));
    }

    #[tokio::test]
    async fn test_put_image_failure_is_propagated() {
        let sample = samples::OCI_IMAGE_MANIFEST;
        let client = FakeEcrClient::new().with_put_image(|_| Err(ApiError::new("ServerException", "expected")));
        let (mut writer, tracker) = writer(client, &sample.digest());
        writer.write(sample.content().as_bytes()).await.unwrap();

        let err = writer.commit(0, &sample.digest()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Api(_)));
        let status = tracker.get_status(REF_KEY).unwrap();
        assert!(!status.committed);
        assert_eq!(status.error.as_deref(), Some("ServerException: expected"));
    }

    #[tokio::test]
    async fn test_truncate() {
        let sample = samples::OCI_IMAGE_MANIFEST;
        let (mut writer, _) = writer(FakeEcrClient::new(), &sample.digest());
        writer.write(b"partial").await.unwrap();
        assert!(writer.truncate(3).is_err());
        writer.truncate(0).unwrap();
        assert_eq!(writer.digest(), Digest::sha256_of(b""));
    }
}
