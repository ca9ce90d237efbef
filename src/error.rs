// ABOUTME: Typed error categories for recoverable migration failures
// ABOUTME: Field, record, and schema errors that callers match on before deciding to skip or abort

use thiserror::Error;

/// Failure to turn a `*Url` column value into raw image bytes.
///
/// Always field-level: the extractor logs it and persists NULL for the field.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unsupported value type '{0}' for a binary column")]
    UnsupportedType(&'static str),

    #[error("unsupported wrapped buffer object: {0}")]
    UnsupportedWrapper(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("payload is empty")]
    Empty,
}

/// Reasons a relational row cannot become a valid document.
///
/// Record-level: the schema migrator logs the record and moves on.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("required field '{0}' is missing")]
    MissingField(String),

    #[error("field '{field}' has value '{value}' outside the allowed set [{allowed}]")]
    InvalidEnum {
        field: &'static str,
        value: String,
        allowed: &'static str,
    },

    #[error("field '{field}' is not valid JSON: {source}")]
    MalformedJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("field '{field}' has unexpected shape: {reason}")]
    InvalidShape { field: &'static str, reason: String },

    #[error("field '{field}' cannot be read as {expected}: '{value}'")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("date of birth '{0}' is not a recognised date")]
    InvalidDate(String),

    #[error("LGA '{0}' is not a known Local Government Area")]
    UnknownLga(String),

    #[error("ward '{ward}' does not belong to LGA '{lga}'")]
    InvalidWard { lga: String, ward: String },

    #[error("column '{0}' still holds binary data; run extract-blobs first")]
    UnmigratedBlob(String),
}

/// Mismatch between the live table and the column manifest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table '{0}' does not exist or has no columns")]
    MissingTable(String),

    #[error(
        "live table has columns unknown to manifest v{version}: {columns:?} \
         (they would be dropped by the migration)"
    )]
    UnknownColumns { version: u32, columns: Vec<String> },

    #[error("live table is missing required columns from manifest v{version}: {columns:?}")]
    MissingRequired { version: u32, columns: Vec<String> },
}
