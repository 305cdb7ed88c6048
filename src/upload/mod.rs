//! Upload module for part-sized layer uploads, manifest registration and status tracking

pub mod chunked;
pub mod layer_writer;
pub mod manifest_writer;
pub mod progress;
pub mod writer;

pub use chunked::{LayerPart, PartBuffer};
pub use layer_writer::LayerWriter;
pub use manifest_writer::ManifestWriter;
pub use progress::{InMemoryTracker, Status, StatusTracker};
pub use writer::{CommitOutcome, ContentWriter, PushWriter};
