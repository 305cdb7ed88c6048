//! Manifest media type detection
//!
//! The registry stores manifest bodies without reliably recording their media
//! type, so it is recovered from the document itself with [`detect_media_type`].

use crate::media_types::{
    DOCKER_SCHEMA1_MANIFEST, DOCKER_SCHEMA1_MANIFEST_UNSIGNED, DOCKER_SCHEMA2_CONFIG, DOCKER_SCHEMA2_MANIFEST,
    DOCKER_SCHEMA2_MANIFEST_LIST, OCI_IMAGE_CONFIG, OCI_IMAGE_INDEX, OCI_IMAGE_MANIFEST,
};
use serde::Deserialize;
use tracing::warn;

/// Fields of a manifest document that hint at its media type
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestShape {
    #[serde(default)]
    schema_version: i64,
    #[serde(default)]
    media_type: Option<String>,
    /// Docker schema 1 JWS signatures
    #[serde(default)]
    signatures: Option<serde_json::Value>,
    /// Children of a manifest list or index
    #[serde(default)]
    manifests: Vec<ShapeDescriptor>,
    #[serde(default)]
    config: ShapeDescriptor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeDescriptor {
    #[serde(default)]
    media_type: String,
}

impl ManifestShape {
    fn has_signatures(&self) -> bool {
        match &self.signatures {
            Some(serde_json::Value::Array(items)) => !items.is_empty(),
            Some(serde_json::Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// Best-guess media type of a raw manifest document.
///
/// Undecodable documents default to the Docker schema 2 manifest type. An
/// empty string is returned when no rule applies; callers treat that as an
/// error.
pub fn detect_media_type(body: &[u8]) -> String {
    let manifest: ManifestShape = match serde_json::from_slice(body) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(error = %err, "could not parse manifest, assuming docker schema 2");
            return DOCKER_SCHEMA2_MANIFEST.to_string();
        }
    };

    if let Some(media_type) = manifest.media_type.as_deref().filter(|m| !m.is_empty()) {
        return media_type.to_string();
    }

    let detected = match manifest.schema_version {
        2 => match manifest.config.media_type.as_str() {
            DOCKER_SCHEMA2_CONFIG => DOCKER_SCHEMA2_MANIFEST,
            OCI_IMAGE_CONFIG => OCI_IMAGE_MANIFEST,
            _ if manifest.manifests.is_empty() => OCI_IMAGE_MANIFEST,
            _ => manifest
                .manifests
                .iter()
                .find_map(|child| match child.media_type.as_str() {
                    OCI_IMAGE_MANIFEST => Some(OCI_IMAGE_INDEX),
                    DOCKER_SCHEMA2_MANIFEST => Some(DOCKER_SCHEMA2_MANIFEST_LIST),
                    _ => None,
                })
                .unwrap_or(OCI_IMAGE_INDEX),
        },
        1 if manifest.has_signatures() => DOCKER_SCHEMA1_MANIFEST,
        1 => DOCKER_SCHEMA1_MANIFEST_UNSIGNED,
        _ => "",
    };

    detected.to_string()
}
