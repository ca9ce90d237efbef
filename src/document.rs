// ABOUTME: Document shape of a grant application in the opsgrants collection
// ABOUTME: Nested sub-documents and the enumerated fields with their allowed values

use crate::error::RecordError;
use anyhow::{Context, Result};
use bson::oid::ObjectId;
use bson::{DateTime, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDocument {
    pub first_name: String,
    pub last_name: String,
    pub dob: DateTime,
    pub gender: Gender,
    pub phone_number: String,
    pub bvn: String,
    pub id_document: IdDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub owner_passport_photo_url: String,
    pub address: String,
    pub is_civil_servant: bool,
    pub business_name: String,
    pub business_address: String,
    #[serde(rename = "businessLGA")]
    pub business_lga: String,
    #[serde(rename = "businessLGACode")]
    pub business_lga_code: String,
    pub business_ward: String,
    pub business_reg_cat: BusinessRegCat,
    pub business_reg_issuer: RegIssuer,
    pub business_reg_num: String,
    pub owner_at_business_photo_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub years_in_operation: i64,
    pub num_staff: i64,
    pub items_purchased: Vec<PurchasedItem>,
    /// Field name as spelled by the consuming API
    #[serde(rename = "costOfIitems")]
    pub cost_of_items: i64,
    pub bank: String,
    pub account_number: String,
    pub captured_by: ObjectId,
    pub status: GrantStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdDocument {
    pub id_doc_type: String,
    pub id_doc_photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRegCat {
    pub cat_type: String,
    #[serde(rename = "enum")]
    pub allowed: Vec<String>,
    pub cert_photo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cac_proof_doc_photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedItem {
    pub items_list: String,
    pub receipt_photo_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALLOWED: &'static str = "Male, Female";

    pub fn parse(value: &str) -> Result<Self, RecordError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            _ => Err(RecordError::InvalidEnum {
                field: "gender",
                value: value.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegIssuer {
    Cooperative,
    Smedan,
    #[serde(rename = "CAC")]
    Cac,
}

impl RegIssuer {
    pub const ALLOWED: &'static str = "Cooperative, Smedan, CAC";

    pub fn parse(value: &str) -> Result<Self, RecordError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cooperative" => Ok(Self::Cooperative),
            "smedan" => Ok(Self::Smedan),
            "cac" => Ok(Self::Cac),
            _ => Err(RecordError::InvalidEnum {
                field: "businessRegIssuer",
                value: value.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GrantStatus {
    #[default]
    Pending,
    Eligible,
    Disbursed,
    Rejected,
}

impl TargetDocument {
    pub fn to_document(&self) -> Result<Document> {
        bson::to_document(self).context("Failed to serialize document to BSON")
    }

    /// Short description for log lines
    pub fn summary(&self) -> String {
        format!(
            "{} {} ({})",
            self.first_name, self.last_name, self.phone_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!(Gender::parse("FEMALE").unwrap(), Gender::Female);
        assert_eq!(Gender::parse(" m ").unwrap(), Gender::Male);
        assert_eq!(RegIssuer::parse("cac").unwrap(), RegIssuer::Cac);
        assert_eq!(RegIssuer::parse("Smedan").unwrap(), RegIssuer::Smedan);
    }

    #[test]
    fn test_enum_rejects_unknown_values() {
        let err = RegIssuer::parse("NAFDAC").unwrap_err();
        assert!(err.to_string().contains("Cooperative, Smedan, CAC"));
        assert!(Gender::parse("").is_err());
    }

    #[test]
    fn test_enums_serialize_to_canonical_strings() {
        assert_eq!(bson::to_bson(&RegIssuer::Cac).unwrap(), bson::Bson::String("CAC".into()));
        assert_eq!(
            bson::to_bson(&GrantStatus::default()).unwrap(),
            bson::Bson::String("Pending".into())
        );
        assert_eq!(bson::to_bson(&Gender::Female).unwrap(), bson::Bson::String("Female".into()));
    }

    #[test]
    fn test_reg_cat_field_names() {
        let cat = BusinessRegCat {
            cat_type: "Registered".into(),
            allowed: vec!["CAC".into()],
            cert_photo_url: "uploads/a.jpg".into(),
            cac_proof_doc_photo_url: None,
        };
        let doc = bson::to_document(&cat).unwrap();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["catType", "enum", "certPhotoUrl"]);
    }
}
