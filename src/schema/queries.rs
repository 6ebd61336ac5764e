//! GraphQL documents for table provisioning and row access.

use serde_json::{json, Value};

/// Looks up the token table and its column names under an application.
pub const FIND_TABLE: &str = r#"query FindTable($applicationId: ID!, $tableName: String!) {
  node(id: $applicationId) {
    ... on Application {
      table(name: $tableName) {
        id
        name
        columns {
          name
        }
      }
    }
  }
}"#;

pub const CREATE_TABLE: &str = r#"mutation CreateTable($input: CreateTableInput!) {
  createTable(input: $input) {
    table {
      id
      name
    }
  }
}"#;

pub const CREATE_TABLE_COLUMN: &str = r#"mutation CreateTableColumn($input: CreateTableColumnInput!) {
  createTableColumn(input: $input) {
    tableColumn {
      id
      name
    }
  }
}"#;

pub const GET_TABLE_ROW: &str = r#"query GetTableRow($tableId: ID!, $externalId: String!) {
  tableRow(tableId: $tableId, externalId: $externalId) {
    externalId
    data
  }
}"#;

pub const UPSERT_TABLE_ROW: &str = r#"mutation UpsertTableRow($input: UpsertTableRowInput!) {
  upsertTableRow(input: $input) {
    tableRow {
      externalId
      data
    }
  }
}"#;

pub fn find_table_variables(application_node_id: &str, table_name: &str) -> Value {
    json!({
        "applicationId": application_node_id,
        "tableName": table_name,
    })
}

pub fn create_table_variables(application_node_id: &str, table_name: &str) -> Value {
    json!({
        "input": {
            "applicationId": application_node_id,
            "name": table_name,
            "description": "Contains token data for OAuth",
        }
    })
}

pub fn get_row_variables(table_id: &str, external_id: &str) -> Value {
    json!({
        "tableId": table_id,
        "externalId": external_id,
    })
}

pub fn upsert_row_variables(table_id: &str, external_id: &str, data: Value) -> Value {
    json!({
        "input": {
            "tableId": table_id,
            "externalId": external_id,
            "data": data,
        }
    })
}
