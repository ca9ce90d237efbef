// ABOUTME: Command implementations for each migration phase
// ABOUTME: Exports validate, extract-blobs, migrate-documents, and verify commands

pub mod extract;
pub mod migrate;
pub mod validate;
pub mod verify;

pub use extract::extract_blobs;
pub use migrate::migrate_documents;
pub use validate::validate;
pub use verify::verify;
