//! Token table column definitions.

use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::types::{
    ACCESS_EXPIRES_AT_COLUMN, ACCESS_TOKEN_COLUMN, ERROR_CODE_COLUMN, REFRESH_TOKEN_COLUMN,
};

/// Fixed name of the token table.
pub const TOKEN_TABLE_NAME: &str = "OAuth Table";

/// Maximum length of the encrypted token columns.
pub const TEXT_COLUMN_LENGTH: u32 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberType {
    Integer,
}

/// Column type as understood by the datastore.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text { length: u32, encrypted: bool },
    DateTime,
    Number(NumberType),
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text { .. } => "TEXT",
            Self::DateTime => "DATETIME",
            Self::Number(_) => "NUMBER",
        }
    }
}

/// One column of the token table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub description: &'static str,
}

impl ColumnDefinition {
    /// Variables for the create-column mutation.
    pub fn to_input(&self, table_id: &str) -> Value {
        let mut input = Map::new();
        input.insert("tableId".into(), json!(table_id));
        input.insert("columnType".into(), json!(self.column_type.as_str()));
        input.insert("name".into(), json!(self.name));
        input.insert("description".into(), json!(self.description));

        match self.column_type {
            ColumnType::Text { length, encrypted } => {
                input.insert("textLength".into(), json!(length));
                input.insert("textEncrypted".into(), json!(encrypted));
            }
            ColumnType::Number(NumberType::Integer) => {
                input.insert("numberType".into(), json!("INTEGER"));
            }
            ColumnType::DateTime => {}
        }

        json!({ "input": Value::Object(input) })
    }
}

/// Columns the token table must have.
pub const REQUIRED_COLUMNS: [ColumnDefinition; 4] = [
    ColumnDefinition {
        name: ACCESS_TOKEN_COLUMN,
        column_type: ColumnType::Text {
            length: TEXT_COLUMN_LENGTH,
            encrypted: true,
        },
        description: "Holds the current access token",
    },
    ColumnDefinition {
        name: ACCESS_EXPIRES_AT_COLUMN,
        column_type: ColumnType::DateTime,
        description: "Holds the date and time at which the current access token expires",
    },
    ColumnDefinition {
        name: REFRESH_TOKEN_COLUMN,
        column_type: ColumnType::Text {
            length: TEXT_COLUMN_LENGTH,
            encrypted: true,
        },
        description: "Holds the current refresh token",
    },
    ColumnDefinition {
        name: ERROR_CODE_COLUMN,
        column_type: ColumnType::Number(NumberType::Integer),
        description: "Holds the latest error code",
    },
];

/// Required columns whose names are not in `existing`, in declaration order.
pub fn missing_columns<S: AsRef<str>>(
    required: &[ColumnDefinition],
    existing: &[S],
) -> Vec<ColumnDefinition> {
    let present: HashSet<&str> = existing.iter().map(AsRef::as_ref).collect();
    required
        .iter()
        .filter(|column| !present.contains(column.name))
        .copied()
        .collect()
}
