// ABOUTME: Versioned column manifest for the opgrants table
// ABOUTME: Generates both table layouts and checks the live schema against them

use crate::error::SchemaError;
use std::collections::HashSet;

/// Suffix marking columns that hold an image (blob before, path after)
pub const FILE_COLUMN_SUFFIX: &str = "Url";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub not_null: bool,
    pub default: Option<&'static str>,
    pub primary_key: bool,
}

impl ColumnSpec {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            not_null: false,
            default: None,
            primary_key: false,
        }
    }

    const fn required(mut self) -> Self {
        self.not_null = true;
        self
    }

    const fn default_to(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    const fn key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn is_file_column(&self) -> bool {
        is_file_column(self.name)
    }

    /// Whether an insert must name this column
    pub fn is_required(&self) -> bool {
        self.not_null && self.default.is_none() && !self.primary_key
    }
}

/// Which physical layout to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// File columns typed BLOB
    Blob,
    /// File columns typed TEXT holding relative paths
    Path,
}

#[derive(Debug)]
pub struct ColumnManifest {
    pub version: u32,
    pub table: &'static str,
    pub columns: &'static [ColumnSpec],
}

/// Outcome of comparing the live schema with the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCheck {
    /// Nullable or defaulted manifest columns absent from the live table
    pub missing_optional: Vec<String>,
}

pub fn is_file_column(name: &str) -> bool {
    name.ends_with(FILE_COLUMN_SUFFIX)
}

pub static OPGRANTS_MANIFEST: ColumnManifest = ColumnManifest {
    version: 1,
    table: "opgrants",
    columns: &[
        ColumnSpec::new("id", "INTEGER").key(),
        ColumnSpec::new("firstName", "TEXT").required(),
        ColumnSpec::new("lastName", "TEXT").required(),
        ColumnSpec::new("dob", "TEXT").required(),
        ColumnSpec::new("gender", "TEXT").required(),
        ColumnSpec::new("phone", "TEXT").required(),
        ColumnSpec::new("email", "TEXT"),
        ColumnSpec::new("homeAddress", "TEXT"),
        ColumnSpec::new("civilServant", "INTEGER").default_to("0"),
        ColumnSpec::new("bvn", "TEXT"),
        ColumnSpec::new("ownerPassportPhotoUrl", "BLOB"),
        ColumnSpec::new("idDocType", "TEXT"),
        ColumnSpec::new("idDocPhotoUrl", "BLOB"),
        ColumnSpec::new("businessName", "TEXT"),
        ColumnSpec::new("businessAddress", "TEXT"),
        ColumnSpec::new("businessLGA", "TEXT"),
        ColumnSpec::new("businessLGACode", "TEXT"),
        ColumnSpec::new("businessWard", "TEXT"),
        ColumnSpec::new("ownerAtBusinessPhotoUrl", "BLOB"),
        ColumnSpec::new("latitude", "REAL"),
        ColumnSpec::new("longitude", "REAL"),
        ColumnSpec::new("businessRegCat", "TEXT"),
        ColumnSpec::new("catType", "TEXT"),
        ColumnSpec::new("certPhotoUrl", "BLOB"),
        ColumnSpec::new("cacProofDocPhotoUrl", "BLOB"),
        ColumnSpec::new("businessRegIssuer", "TEXT"),
        ColumnSpec::new("businessRegNum", "TEXT"),
        ColumnSpec::new("yearsInOperation", "INTEGER"),
        ColumnSpec::new("numStaff", "INTEGER"),
        ColumnSpec::new("businessOpsExpenseCat", "TEXT"),
        ColumnSpec::new("itemsPurchased", "TEXT"),
        ColumnSpec::new("costOfItems", "INTEGER"),
        ColumnSpec::new("renumerationPhotoUrl", "BLOB"),
        ColumnSpec::new("groupPhotoUrl", "BLOB"),
        ColumnSpec::new("comment", "TEXT"),
        ColumnSpec::new("bank", "TEXT"),
        ColumnSpec::new("accountNumber", "TEXT"),
        ColumnSpec::new("accountName", "TEXT"),
        ColumnSpec::new("taxId", "TEXT"),
        ColumnSpec::new("issuer", "TEXT"),
        ColumnSpec::new("taxRegPhotoUrl", "BLOB"),
        ColumnSpec::new("dataType", "TEXT").default_to("'newData'"),
        ColumnSpec::new("syncStatus", "INTEGER").default_to("0"),
        ColumnSpec::new("dataComplete", "INTEGER").default_to("0"),
        ColumnSpec::new("serverVerified", "INTEGER").default_to("0"),
        ColumnSpec::new("syncErrorMessage", "TEXT"),
        ColumnSpec::new("createdAt", "DATETIME").default_to("CURRENT_TIMESTAMP"),
        ColumnSpec::new("updatedAt", "DATETIME").default_to("CURRENT_TIMESTAMP"),
    ],
};

impl ColumnManifest {
    pub fn file_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.is_file_column())
    }

    /// `CREATE TABLE` statement for the requested layout
    pub fn create_table_sql(&self, layout: Layout) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                let sql_type = match (layout, col.is_file_column()) {
                    (Layout::Path, true) => "TEXT",
                    _ => col.sql_type,
                };
                let mut def = format!("\"{}\" {}", col.name, sql_type);
                if col.primary_key {
                    def.push_str(" PRIMARY KEY AUTOINCREMENT");
                }
                if col.not_null {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = col.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                def
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\"", self.table)
    }

    /// Compare live column names with the manifest
    ///
    /// Unknown live columns are fatal because the migration would drop their
    /// data. Missing columns are fatal only when an insert must supply them.
    pub fn check_live_schema(&self, live_columns: &[String]) -> Result<SchemaCheck, SchemaError> {
        if live_columns.is_empty() {
            return Err(SchemaError::MissingTable(self.table.to_string()));
        }

        let known: HashSet<&str> = self.columns.iter().map(|c| c.name).collect();
        let live: HashSet<&str> = live_columns.iter().map(String::as_str).collect();

        let unknown: Vec<String> = live_columns
            .iter()
            .filter(|c| !known.contains(c.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(SchemaError::UnknownColumns {
                version: self.version,
                columns: unknown,
            });
        }

        let (missing_required, missing_optional): (Vec<&ColumnSpec>, Vec<&ColumnSpec>) = self
            .columns
            .iter()
            .filter(|c| !live.contains(c.name))
            .partition(|c| c.is_required());

        if !missing_required.is_empty() {
            return Err(SchemaError::MissingRequired {
                version: self.version,
                columns: missing_required
                    .iter()
                    .map(|c| c.name.to_string())
                    .collect(),
            });
        }

        Ok(SchemaCheck {
            missing_optional: missing_optional
                .iter()
                .map(|c| c.name.to_string())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_columns() -> Vec<String> {
        OPGRANTS_MANIFEST
            .columns
            .iter()
            .map(|c| c.name.to_string())
            .collect()
    }

    #[test]
    fn test_file_columns_are_exactly_url_suffixed() {
        let names: Vec<&str> = OPGRANTS_MANIFEST.file_columns().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "ownerPassportPhotoUrl",
                "idDocPhotoUrl",
                "ownerAtBusinessPhotoUrl",
                "certPhotoUrl",
                "cacProofDocPhotoUrl",
                "renumerationPhotoUrl",
                "groupPhotoUrl",
                "taxRegPhotoUrl",
            ]
        );
        assert!(OPGRANTS_MANIFEST.file_columns().all(|c| c.sql_type == "BLOB"));
    }

    #[test]
    fn test_path_layout_types_file_columns_as_text() {
        let blob = OPGRANTS_MANIFEST.create_table_sql(Layout::Blob);
        let path = OPGRANTS_MANIFEST.create_table_sql(Layout::Path);

        assert!(blob.contains("\"certPhotoUrl\" BLOB"));
        assert!(path.contains("\"certPhotoUrl\" TEXT"));
        assert!(!path.contains("BLOB"));
        assert!(path.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(path.contains("\"dataType\" TEXT DEFAULT 'newData'"));
        assert!(path.contains("\"firstName\" TEXT NOT NULL"));
    }

    #[test]
    fn test_full_schema_passes() {
        let check = OPGRANTS_MANIFEST.check_live_schema(&all_columns()).unwrap();
        assert!(check.missing_optional.is_empty());
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let mut live = all_columns();
        live.push("nin".to_string());
        let err = OPGRANTS_MANIFEST.check_live_schema(&live).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownColumns {
                version: 1,
                columns: vec!["nin".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_required_column_is_rejected() {
        let live: Vec<String> = all_columns()
            .into_iter()
            .filter(|c| c != "phone")
            .collect();
        let err = OPGRANTS_MANIFEST.check_live_schema(&live).unwrap_err();
        assert!(matches!(err, SchemaError::MissingRequired { ref columns, .. } if columns == &["phone"]));
    }

    #[test]
    fn test_missing_optional_column_is_reported() {
        let live: Vec<String> = all_columns()
            .into_iter()
            .filter(|c| c != "syncErrorMessage" && c != "id")
            .collect();
        let check = OPGRANTS_MANIFEST.check_live_schema(&live).unwrap();
        assert_eq!(check.missing_optional, vec!["id", "syncErrorMessage"]);
    }

    #[test]
    fn test_empty_table_is_missing() {
        assert_eq!(
            OPGRANTS_MANIFEST.check_live_schema(&[]).unwrap_err(),
            SchemaError::MissingTable("opgrants".to_string())
        );
    }
}
