// ABOUTME: Reshapes flat opgrants rows into nested grant documents
// ABOUTME: Type coercion, JSON parsing, defaults, and required-field checks per record

use crate::document::{
    BusinessRegCat, Gender, GrantStatus, IdDocument, PurchasedItem, RegIssuer, TargetDocument,
};
use crate::error::RecordError;
use crate::sqlite::{self, SourceRow};
use bson::oid::ObjectId;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::Value;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Inputs that do not come from the row itself
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Operator credited as `capturedBy`; a fresh id per record when unset
    pub captured_by: Option<ObjectId>,
    /// LGA -> wards; empty disables LGA and ward validation
    pub wards: BTreeMap<String, Vec<String>>,
}

/// Typed read access to a path-referencing opgrants row
#[derive(Debug, Clone)]
pub struct SourceRecord {
    row: SourceRow,
}

impl From<SourceRow> for SourceRecord {
    fn from(row: SourceRow) -> Self {
        Self { row }
    }
}

impl SourceRecord {
    pub fn row(&self) -> &SourceRow {
        &self.row
    }

    /// `firstName lastName (phone)` as far as the row has them, for log lines
    pub fn summary(&self) -> String {
        let part = |column: &str| match self.value(column) {
            Value::Text(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Integer(i) => i.to_string(),
            _ => "?".to_string(),
        };
        format!(
            "{} {} ({})",
            part("firstName"),
            part("lastName"),
            part("phone")
        )
    }

    fn value(&self, column: &str) -> &Value {
        self.row.get(column).unwrap_or(&Value::Null)
    }

    /// Trimmed text; NULL and blank text read as `None`
    pub fn text(&self, column: &'static str) -> Result<Option<String>, RecordError> {
        match self.value(column) {
            Value::Null => Ok(None),
            Value::Text(s) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Value::Integer(i) => Ok(Some(i.to_string())),
            Value::Real(f) => Ok(Some(f.to_string())),
            Value::Blob(_) if sqlite::is_file_column(column) => {
                Err(RecordError::UnmigratedBlob(column.to_string()))
            }
            Value::Blob(b) => Err(RecordError::InvalidType {
                field: column,
                expected: "text",
                value: format!("<blob {} bytes>", b.len()),
            }),
        }
    }

    pub fn required_text(&self, column: &'static str, field: &str) -> Result<String, RecordError> {
        self.text(column)?
            .ok_or_else(|| RecordError::MissingField(field.to_string()))
    }

    pub fn integer(&self, column: &'static str) -> Result<Option<i64>, RecordError> {
        let invalid = |value: String| RecordError::InvalidType {
            field: column,
            expected: "an integer",
            value,
        };

        match self.value(column) {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            Value::Real(f) if f.fract() == 0.0 && f.is_finite() => Ok(Some(*f as i64)),
            Value::Real(f) => Err(invalid(f.to_string())),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(Some(i));
                }
                match trimmed.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(Some(f as i64)),
                    _ => Err(invalid(trimmed.to_string())),
                }
            }
            Value::Blob(b) => Err(invalid(format!("<blob {} bytes>", b.len()))),
        }
    }

    pub fn real(&self, column: &'static str) -> Result<Option<f64>, RecordError> {
        let invalid = |value: String| RecordError::InvalidType {
            field: column,
            expected: "a number",
            value,
        };

        match self.value(column) {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i as f64)),
            Value::Real(f) => Ok(Some(*f)),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                match trimmed.parse::<f64>() {
                    Ok(f) if f.is_finite() => Ok(Some(f)),
                    _ => Err(invalid(trimmed.to_string())),
                }
            }
            Value::Blob(b) => Err(invalid(format!("<blob {} bytes>", b.len()))),
        }
    }

    /// SQLite boolean: NULL and 0 are false, any other number is true
    pub fn flag(&self, column: &'static str) -> Result<bool, RecordError> {
        match self.value(column) {
            Value::Null => Ok(false),
            Value::Integer(i) => Ok(*i != 0),
            Value::Real(f) => Ok(*f != 0.0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "" | "0" | "false" | "no" => Ok(false),
                "1" | "true" | "yes" => Ok(true),
                other => Err(RecordError::InvalidType {
                    field: column,
                    expected: "a boolean",
                    value: other.to_string(),
                }),
            },
            Value::Blob(b) => Err(RecordError::InvalidType {
                field: column,
                expected: "a boolean",
                value: format!("<blob {} bytes>", b.len()),
            }),
        }
    }
}

/// Build the document for one record, or explain why it cannot be inserted
pub fn transform_record(
    record: &SourceRecord,
    options: &TransformOptions,
) -> Result<TargetDocument, RecordError> {
    let dob_raw = record.required_text("dob", "dob")?;
    let business_lga = record.required_text("businessLGA", "businessLGA")?;
    let business_ward = record.required_text("businessWard", "businessWard")?;
    check_ward(&options.wards, &business_lga, &business_ward)?;

    let now = bson::DateTime::now();

    Ok(TargetDocument {
        first_name: record.required_text("firstName", "firstName")?,
        last_name: record.required_text("lastName", "lastName")?,
        dob: parse_dob(&dob_raw)?,
        gender: Gender::parse(&record.required_text("gender", "gender")?)?,
        phone_number: record.required_text("phone", "phoneNumber")?,
        bvn: record.required_text("bvn", "bvn")?,
        id_document: IdDocument {
            id_doc_type: record.required_text("idDocType", "idDocument.idDocType")?,
            id_doc_photo_url: record.required_text("idDocPhotoUrl", "idDocument.idDocPhotoUrl")?,
        },
        email: record.text("email")?,
        owner_passport_photo_url: record
            .required_text("ownerPassportPhotoUrl", "ownerPassportPhotoUrl")?,
        address: record.required_text("homeAddress", "address")?,
        is_civil_servant: record.flag("civilServant")?,
        business_name: record.required_text("businessName", "businessName")?,
        business_address: record.required_text("businessAddress", "businessAddress")?,
        business_lga,
        business_lga_code: record.required_text("businessLGACode", "businessLGACode")?,
        business_ward,
        business_reg_cat: BusinessRegCat {
            cat_type: record.required_text("catType", "businessRegCat.catType")?,
            allowed: parse_reg_categories(record.text("businessRegCat")?)?,
            cert_photo_url: record.required_text("certPhotoUrl", "businessRegCat.certPhotoUrl")?,
            cac_proof_doc_photo_url: record.text("cacProofDocPhotoUrl")?,
        },
        business_reg_issuer: RegIssuer::parse(
            &record.required_text("businessRegIssuer", "businessRegIssuer")?,
        )?,
        business_reg_num: record.required_text("businessRegNum", "businessRegNum")?,
        owner_at_business_photo_url: record
            .required_text("ownerAtBusinessPhotoUrl", "ownerAtBusinessPhotoUrl")?,
        latitude: required(record.real("latitude")?, "latitude")?,
        longitude: required(record.real("longitude")?, "longitude")?,
        years_in_operation: required(record.integer("yearsInOperation")?, "yearsInOperation")?,
        num_staff: required(record.integer("numStaff")?, "numStaff")?,
        items_purchased: parse_items(record.text("itemsPurchased")?.as_deref())?,
        cost_of_items: record.integer("costOfItems")?.unwrap_or(0),
        bank: record.required_text("bank", "bank")?,
        account_number: record.required_text("accountNumber", "accountNumber")?,
        captured_by: options.captured_by.unwrap_or_else(ObjectId::new),
        status: GrantStatus::default(),
        created_at: now,
        updated_at: now,
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, RecordError> {
    value.ok_or_else(|| RecordError::MissingField(field.to_string()))
}

/// Accepts `YYYY-MM-DD`, RFC 3339, and `YYYY-MM-DD[ T]HH:MM:SS[.fff]` (UTC)
pub fn parse_dob(raw: &str) -> Result<bson::DateTime, RecordError> {
    let raw = raw.trim();

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(bson::DateTime::from_millis(dt.timestamp_millis()));
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(bson::DateTime::from_millis(
                Utc.from_utc_datetime(&naive).timestamp_millis(),
            ));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| bson::DateTime::from_millis(Utc.from_utc_datetime(&naive).timestamp_millis()))
        .ok_or_else(|| RecordError::InvalidDate(raw.to_string()))
}

/// Parse the `itemsPurchased` JSON text into purchased items
///
/// NULL and a JSON `null` mean no items. Anything that is not an array of
/// objects with non-empty `itemsList` and `receiptPhotoUrl` is rejected.
pub fn parse_items(raw: Option<&str>) -> Result<Vec<PurchasedItem>, RecordError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let parsed: JsonValue =
        serde_json::from_str(raw).map_err(|source| RecordError::MalformedJson {
            field: "itemsPurchased",
            source,
        })?;

    let entries = match parsed {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Array(entries) => entries,
        other => {
            return Err(RecordError::InvalidShape {
                field: "itemsPurchased",
                reason: format!("expected an array, found {}", json_kind(&other)),
            })
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let object = entry.as_object().ok_or_else(|| RecordError::InvalidShape {
                field: "itemsPurchased",
                reason: format!("entry {} is {}, not an object", idx, json_kind(entry)),
            })?;

            let field = |name: &str| -> Result<String, RecordError> {
                object
                    .get(name)
                    .and_then(JsonValue::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        RecordError::MissingField(format!("itemsPurchased[{}].{}", idx, name))
                    })
            };

            Ok(PurchasedItem {
                items_list: field("itemsList")?,
                receipt_photo_url: field("receiptPhotoUrl")?,
            })
        })
        .collect()
}

/// `businessRegCat` holds either a JSON string array or a single value
pub fn parse_reg_categories(raw: Option<String>) -> Result<Vec<String>, RecordError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    if !raw.starts_with('[') {
        return Ok(vec![raw]);
    }

    serde_json::from_str::<Vec<String>>(&raw).map_err(|source| RecordError::MalformedJson {
        field: "businessRegCat",
        source,
    })
}

fn check_ward(
    wards: &BTreeMap<String, Vec<String>>,
    lga: &str,
    ward: &str,
) -> Result<(), RecordError> {
    if wards.is_empty() {
        return Ok(());
    }

    let lga_wards = wards
        .get(lga)
        .ok_or_else(|| RecordError::UnknownLga(lga.to_string()))?;

    if lga_wards.iter().any(|w| w.eq_ignore_ascii_case(ward)) {
        Ok(())
    } else {
        Err(RecordError::InvalidWard {
            lga: lga.to_string(),
            ward: ward.to_string(),
        })
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
