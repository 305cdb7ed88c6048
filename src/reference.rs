//! Registry references
//!
//! A reference names a repository in the registry by its ARN, optionally
//! followed by an object selecting a tag, a digest, or both:
//!
//! ```text
//! ecr.aws/arn:aws:ecr:us-west-2:123456789012:repository/team/app:latest
//! ecr.aws/arn:aws:ecr:us-west-2:123456789012:repository/team/app@sha256:...
//! ecr.aws/arn:aws:ecr:us-west-2:123456789012:repository/team/app:latest@sha256:...
//! ```
//!
//! [`RegistryReference::parse`] and [`RegistryReference::canonical`] round-trip:
//! parsing the canonical form of a parsed reference yields the same value.

use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::registry::api::ImageIdentifier;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Locator prefix carried by every reference
pub const REFERENCE_PREFIX: &str = "ecr.aws/";

const ARN_PREFIX: &str = "arn";
const SERVICE: &str = "ecr";
const REPOSITORY_RESOURCE: &str = "repository/";

static PARTITION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^aws(-[a-z]+)*$").unwrap());
static REGION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").unwrap());
static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static REPOSITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap());

/// Parsed location of a repository, and optionally an image within it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryReference {
    partition: String,
    region: String,
    account_id: String,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl RegistryReference {
    /// Parse a reference string
    pub fn parse(reference: &str) -> Result<Self> {
        let arn = reference.strip_prefix(REFERENCE_PREFIX).ok_or_else(|| {
            RegistryError::InvalidReference(format!("{:?} does not start with {}", reference, REFERENCE_PREFIX))
        })?;

        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        let [prefix, partition, service, region, account_id, resource] = parts[..] else {
            return Err(invalid(reference, "not enough ARN sections"));
        };

        if prefix != ARN_PREFIX {
            return Err(invalid(reference, "missing arn prefix"));
        }
        if !PARTITION_RE.is_match(partition) {
            return Err(invalid(reference, "malformed partition"));
        }
        if service != SERVICE {
            return Err(invalid(reference, "service is not ecr"));
        }
        if !REGION_RE.is_match(region) {
            return Err(invalid(reference, "malformed region"));
        }
        if !ACCOUNT_RE.is_match(account_id) {
            return Err(invalid(reference, "malformed account"));
        }

        let repository_and_object = resource
            .strip_prefix(REPOSITORY_RESOURCE)
            .ok_or_else(|| invalid(reference, "resource is not a repository"))?;

        let (repository, object) = match repository_and_object.find([':', '@']) {
            Some(idx) => repository_and_object.split_at(idx),
            None => (repository_and_object, ""),
        };

        if !REPOSITORY_RE.is_match(repository) {
            return Err(invalid(reference, "malformed repository name"));
        }

        let (tag, digest) = split_object(object.strip_prefix(':').unwrap_or(object))
            .map_err(|msg| invalid(reference, &msg))?;

        Ok(Self {
            partition: partition.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Registry ID, which is the owning account
    pub fn registry_id(&self) -> &str {
        &self.account_id
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Whether the reference selects an image rather than just a repository
    pub fn has_object(&self) -> bool {
        self.tag.is_some() || self.digest.is_some()
    }

    /// Object part: `tag`, `@digest`, `tag@digest`, or empty
    pub fn object(&self) -> String {
        match (&self.tag, &self.digest) {
            (Some(tag), Some(digest)) => format!("{}@{}", tag, digest),
            (Some(tag), None) => tag.clone(),
            (None, Some(digest)) => format!("@{}", digest),
            (None, None) => String::new(),
        }
    }

    /// Repository ARN without the object
    pub fn arn(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}{}",
            ARN_PREFIX, self.partition, SERVICE, self.region, self.account_id, REPOSITORY_RESOURCE, self.repository
        )
    }

    /// Reference without the object
    pub fn locator(&self) -> String {
        format!("{}{}", REFERENCE_PREFIX, self.arn())
    }

    pub fn canonical(&self) -> String {
        let object = self.object();
        if object.is_empty() {
            self.locator()
        } else if object.starts_with('@') {
            format!("{}{}", self.locator(), object)
        } else {
            format!("{}:{}", self.locator(), object)
        }
    }

    /// Image selector for metadata lookups
    pub fn image_id(&self) -> ImageIdentifier {
        ImageIdentifier {
            image_digest: self.digest.as_ref().map(ToString::to_string),
            image_tag: self.tag.clone(),
        }
    }

    /// Same repository, selecting a different object
    pub fn with_object(&self, tag: Option<&str>, digest: Option<Digest>) -> Result<Self> {
        if let Some(tag) = tag {
            if !TAG_RE.is_match(tag) {
                return Err(RegistryError::InvalidReference(format!("malformed tag {:?}", tag)));
            }
        }
        Ok(Self {
            tag: tag.map(str::to_string),
            digest,
            ..self.clone()
        })
    }
}

fn invalid(reference: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidReference(format!("{:?}: {}", reference, reason))
}

/// Split an object into its tag and digest; the digest follows the last `@`
fn split_object(object: &str) -> std::result::Result<(Option<String>, Option<Digest>), String> {
    let (tag, digest) = match object.rsplit_once('@') {
        Some((tag, digest)) => {
            let digest = Digest::parse(digest).map_err(|e| e.to_string())?;
            (tag, Some(digest))
        }
        None => (object, None),
    };

    let tag = if tag.is_empty() {
        None
    } else if TAG_RE.is_match(tag) {
        Some(tag.to_string())
    } else {
        return Err(format!("malformed tag {:?}", tag));
    };

    Ok((tag, digest))
}

impl fmt::Display for RegistryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for RegistryReference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        RegistryReference::parse(s)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const FAKE_REGION: &str = "is-fake-1";
    pub const FAKE_REGISTRY_ID: &str = "12345689012";
    pub const FAKE_REPOSITORY: &str = "example/repo-name";
    pub const FAKE_TAG: &str = "latest";
    pub const FAKE_DIGEST: &str = "sha256:9d2b264e346ccee1a96820dc5c3bd8cc2f5fa6c69c2dca4ed8be2173422779c7";

    pub fn fake_arn() -> String {
        format!("arn:aws:ecr:{}:{}:repository/{}", FAKE_REGION, FAKE_REGISTRY_ID, FAKE_REPOSITORY)
    }

    /// Fake reference with the given raw object suffix, e.g. `:latest`
    pub fn fake_ref_with_object(object: &str) -> String {
        format!("ecr.aws/{}{}", fake_arn(), object)
    }

    pub fn fake_ref() -> String {
        fake_ref_with_object(&format!(":{}", FAKE_TAG))
    }
}
