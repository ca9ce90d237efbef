// ABOUTME: Image blob handling for the extraction pipeline
// ABOUTME: Payload normalization plus the filesystem writer for extracted files

pub mod payload;
pub mod writer;

pub use payload::BinaryPayload;
pub use writer::{resolve_relative, BlobWriter, FsBlobWriter};
