pub mod format;
pub mod naming;
pub mod writer;

pub use format::AudioFormat;
pub use naming::{sanitize_label, MIXED_SOURCE_ID, UNKNOWN_LABEL};
pub use writer::{AudioWriterPool, CaptureArtifact, WriterHandle, WriterPoolConfig};
