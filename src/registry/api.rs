//! Registry management API boundary
//!
//! [`EcrApi`] is the narrow set of remote operations the resolver needs. The
//! concrete client lives outside this crate; payloads below mirror the
//! backend's JSON shapes so an implementation can send them as-is.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Image lookup failure: no image matched the identifier
pub const IMAGE_NOT_FOUND: &str = "ImageNotFound";
/// Image lookup failure: the tag points at a different digest
pub const IMAGE_TAG_DOES_NOT_MATCH_DIGEST: &str = "ImageTagDoesNotMatchDigest";
/// `CompleteLayerUpload` error when the layer is already stored
pub const LAYER_ALREADY_EXISTS: &str = "LayerAlreadyExistsException";
/// `PutImage` error when the manifest is already registered under the tag
pub const IMAGE_ALREADY_EXISTS: &str = "ImageAlreadyExistsException";
/// Layer availability reported for stored layers
pub const LAYER_AVAILABLE: &str = "AVAILABLE";
pub const LAYER_UNAVAILABLE: &str = "UNAVAILABLE";

/// Error reported by the registry API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the backend refused the write because the content is already stored
    pub fn is_already_exists(&self) -> bool {
        self.code == LAYER_ALREADY_EXISTS || self.code == IMAGE_ALREADY_EXISTS
    }
}

/// Tag and/or digest selecting an image in a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
    #[serde(default)]
    pub image_id: ImageIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_manifest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_manifest_media_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetImageInput {
    pub registry_id: String,
    pub repository_name: String,
    pub image_ids: Vec<ImageIdentifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_media_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetImageOutput {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub failures: Vec<ImageFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDownloadUrlForLayerInput {
    pub registry_id: String,
    pub repository_name: String,
    pub layer_digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDownloadUrlForLayerOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckLayerAvailabilityInput {
    pub registry_id: String,
    pub repository_name: String,
    pub layer_digests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckLayerAvailabilityOutput {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub failures: Vec<LayerFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_availability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Layer {
    pub fn is_available(&self) -> bool {
        self.layer_availability.as_deref() == Some(LAYER_AVAILABLE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateLayerUploadInput {
    pub registry_id: String,
    pub repository_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateLayerUploadOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLayerPartInput {
    pub registry_id: String,
    pub repository_name: String,
    pub upload_id: String,
    /// Inclusive offset of the first byte in this part
    pub part_first_byte: u64,
    /// Inclusive offset of the last byte in this part
    pub part_last_byte: u64,
    #[serde(with = "base64_blob")]
    pub layer_part_blob: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLayerPartOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_byte_received: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLayerUploadInput {
    pub registry_id: String,
    pub repository_name: String,
    pub upload_id: String,
    pub layer_digests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLayerUploadOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutImageInput {
    pub registry_id: String,
    pub repository_name: String,
    pub image_manifest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_manifest_media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutImageOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
}

/// Remote operations used by the resolver, fetcher and pusher.
///
/// One client is bound to one region. Implementations must be safe to share
/// between concurrent fetches and pushes.
#[async_trait]
pub trait EcrApi: Send + Sync {
    async fn batch_get_image(&self, input: BatchGetImageInput) -> std::result::Result<BatchGetImageOutput, ApiError>;

    async fn get_download_url_for_layer(
        &self,
        input: GetDownloadUrlForLayerInput,
    ) -> std::result::Result<GetDownloadUrlForLayerOutput, ApiError>;

    async fn batch_check_layer_availability(
        &self,
        input: BatchCheckLayerAvailabilityInput,
    ) -> std::result::Result<BatchCheckLayerAvailabilityOutput, ApiError>;

    async fn initiate_layer_upload(
        &self,
        input: InitiateLayerUploadInput,
    ) -> std::result::Result<InitiateLayerUploadOutput, ApiError>;

    async fn upload_layer_part(&self, input: UploadLayerPartInput) -> std::result::Result<UploadLayerPartOutput, ApiError>;

    async fn complete_layer_upload(
        &self,
        input: CompleteLayerUploadInput,
    ) -> std::result::Result<CompleteLayerUploadOutput, ApiError>;

    async fn put_image(&self, input: PutImageInput) -> std::result::Result<PutImageOutput, ApiError>;
}

/// Credentials capability that produces region-bound API clients
pub trait Session: Send + Sync {
    fn client_for_region(&self, region: &str) -> Result<Arc<dyn EcrApi>>;
}

impl<F> Session for F
where
    F: Fn(&str) -> Result<Arc<dyn EcrApi>> + Send + Sync,
{
    fn client_for_region(&self, region: &str) -> Result<Arc<dyn EcrApi>> {
        self(region)
    }
}

/// Layer part blobs travel base64 encoded
mod base64_blob {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
