//! Media types understood by the fetch and push paths

/// OCI image manifest
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image config
pub const OCI_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_IMAGE_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const OCI_IMAGE_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_IMAGE_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";

/// Docker v2 schema 1 signed manifest
pub const DOCKER_SCHEMA1_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
/// Docker v2 schema 1 manifest without signatures
pub const DOCKER_SCHEMA1_MANIFEST_UNSIGNED: &str = "application/vnd.docker.distribution.manifest.v1+json";
/// Docker v2 schema 2 manifest
pub const DOCKER_SCHEMA2_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker v2 schema 2 manifest list
pub const DOCKER_SCHEMA2_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_SCHEMA2_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const DOCKER_SCHEMA2_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const DOCKER_SCHEMA2_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_SCHEMA2_LAYER_FOREIGN: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar";
pub const DOCKER_SCHEMA2_LAYER_FOREIGN_GZIP: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";

/// Manifest media types the registry serves; requested on every resolve
pub const SUPPORTED_IMAGE_MEDIA_TYPES: &[&str] = &[
    OCI_IMAGE_INDEX,
    OCI_IMAGE_MANIFEST,
    DOCKER_SCHEMA2_MANIFEST,
    DOCKER_SCHEMA2_MANIFEST_LIST,
    DOCKER_SCHEMA1_MANIFEST,
];

/// How a descriptor's content is stored and therefore fetched or pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Single-image manifest, stored as image metadata
    Manifest,
    /// Manifest list or index, stored as image metadata
    Index,
    /// Image config blob, stored as a layer
    Config,
    /// Filesystem layer blob
    Layer,
    /// Layer hosted outside the registry
    ForeignLayer,
    Unknown,
}

impl ContentKind {
    pub fn of(media_type: &str) -> Self {
        match media_type {
            OCI_IMAGE_MANIFEST | DOCKER_SCHEMA2_MANIFEST | DOCKER_SCHEMA1_MANIFEST => ContentKind::Manifest,
            OCI_IMAGE_INDEX | DOCKER_SCHEMA2_MANIFEST_LIST => ContentKind::Index,
            OCI_IMAGE_CONFIG | DOCKER_SCHEMA2_CONFIG => ContentKind::Config,
            OCI_IMAGE_LAYER | OCI_IMAGE_LAYER_GZIP | OCI_IMAGE_LAYER_ZSTD | DOCKER_SCHEMA2_LAYER
            | DOCKER_SCHEMA2_LAYER_GZIP => ContentKind::Layer,
            DOCKER_SCHEMA2_LAYER_FOREIGN | DOCKER_SCHEMA2_LAYER_FOREIGN_GZIP => ContentKind::ForeignLayer,
            _ => ContentKind::Unknown,
        }
    }

    /// Manifests and indexes live in image metadata rather than layer storage
    pub fn is_image_metadata(self) -> bool {
        matches!(self, ContentKind::Manifest | ContentKind::Index)
    }

    /// Prefix used when building status tracker keys
    pub fn key_prefix(self) -> &'static str {
        match self {
            ContentKind::Manifest => "manifest",
            ContentKind::Index => "index",
            ContentKind::Config => "config",
            ContentKind::Layer | ContentKind::ForeignLayer => "layer",
            ContentKind::Unknown => "unknown",
        }
    }
}
