//! Content descriptors and the status keys derived from them

use crate::digest::Digest;
use crate::media_types::ContentKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation naming the reference a descriptor was resolved from
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// Content-addressed pointer to a manifest or blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    #[serde(default)]
    pub size: u64,
    /// Only set for layers hosted outside the registry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: Some(digest),
            size,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::of(&self.media_type)
    }

    /// Digest rendered for log lines and API calls; empty when unset
    pub fn digest_str(&self) -> &str {
        self.digest.as_ref().map(Digest::as_str).unwrap_or_default()
    }

    /// Key identifying this descriptor in a status tracker.
    ///
    /// The digest is qualified with the ref-name annotation when present and
    /// with the optional caller prefix, then tagged with the content kind:
    /// `layer-<prefix>-<name>@<digest>`.
    pub fn ref_key(&self, prefix: Option<&str>) -> String {
        let mut key = match self.annotations.get(ANNOTATION_REF_NAME) {
            Some(name) => format!("{}@{}", name, self.digest_str()),
            None => self.digest_str().to_string(),
        };
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            key = format!("{}-{}", prefix, key);
        }
        format!("{}-{}", self.kind().key_prefix(), key)
    }
}
