//! Schema Provisioner
//!
//! Ensures the token table and its required columns exist before first use.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::core::{QueryClient, QueryRequest, QueryResponse};
use crate::error::{LifecycleResult, ProvisionError};
use crate::schema::columns::{missing_columns, ColumnDefinition, REQUIRED_COLUMNS, TOKEN_TABLE_NAME};
use crate::schema::queries::{
    create_table_variables, find_table_variables, CREATE_TABLE, CREATE_TABLE_COLUMN, FIND_TABLE,
};

/// Lazily provisions the token table.
///
/// The table id is cached after the first successful call; a failed attempt
/// leaves the cache empty so the next call provisions again.
pub struct SchemaProvisioner<Q: QueryClient> {
    client: Arc<Q>,
    application_node_id: String,
    table_name: String,
    columns: Vec<ColumnDefinition>,
    table_id: OnceCell<String>,
}

/// Table as reported by the lookup query.
struct ExistingTable {
    id: String,
    columns: Vec<String>,
}

impl<Q: QueryClient> SchemaProvisioner<Q> {
    /// Provisioner for the token table under `application_node_id`.
    pub fn new(client: Arc<Q>, application_node_id: impl Into<String>) -> Self {
        Self {
            client,
            application_node_id: application_node_id.into(),
            table_name: TOKEN_TABLE_NAME.to_string(),
            columns: REQUIRED_COLUMNS.to_vec(),
            table_id: OnceCell::new(),
        }
    }

    /// Override the required column set.
    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.columns = columns;
        self
    }

    /// Cached table id, if provisioning already succeeded.
    pub fn cached_table_id(&self) -> Option<&str> {
        self.table_id.get().map(String::as_str)
    }

    /// Return the table id, creating the table and any missing columns.
    pub async fn ensure_table(&self) -> LifecycleResult<String> {
        self.table_id
            .get_or_try_init(|| self.provision())
            .await
            .cloned()
    }

    async fn provision(&self) -> LifecycleResult<String> {
        match self.find_table().await? {
            Some(table) => {
                let missing = missing_columns(&self.columns, &table.columns);
                if missing.is_empty() {
                    debug!(table_id = %table.id, "token table exists");
                } else {
                    info!(
                        table_id = %table.id,
                        missing = missing.len(),
                        "token table is missing columns"
                    );
                    self.create_columns(&table.id, &missing).await?;
                }
                Ok(table.id)
            }
            None => {
                info!(table = %self.table_name, "creating token table");
                let table_id = self.create_table().await?;
                self.create_columns(&table_id, &self.columns).await?;
                info!(table_id = %table_id, "token table created");
                Ok(table_id)
            }
        }
    }

    async fn find_table(&self) -> LifecycleResult<Option<ExistingTable>> {
        let response = self
            .client
            .execute(QueryRequest::new(
                FIND_TABLE,
                find_table_variables(&self.application_node_id, &self.table_name),
            ))
            .await?;

        // A missing table can come back as `table: null` alongside an error.
        let node = response
            .data
            .as_ref()
            .and_then(|d| d.get("node"))
            .filter(|n| !n.is_null());

        let Some(node) = node else {
            let message = response
                .first_error_message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("application {} not found", self.application_node_id));
            error!(%message, "token table lookup failed");
            return Err(ProvisionError::LookupFailed { message }.into());
        };

        let table = match node.get("table") {
            Some(table) if !table.is_null() => table,
            _ => return Ok(None),
        };

        let id = table
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProvisionError::LookupFailed {
                message: "table lookup returned no id".to_string(),
            })?
            .to_string();

        let columns = table
            .get("columns")
            .and_then(Value::as_array)
            .map(|cols| {
                cols.iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(ExistingTable { id, columns }))
    }

    async fn create_table(&self) -> LifecycleResult<String> {
        let response = self
            .client
            .execute(QueryRequest::new(
                CREATE_TABLE,
                create_table_variables(&self.application_node_id, &self.table_name),
            ))
            .await?;

        let data = response.into_result().map_err(|failure| {
            error!(message = %failure.message(), "token table creation failed");
            ProvisionError::TableCreationFailed {
                message: failure.message(),
            }
        })?;

        data.pointer("/createTable/table/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProvisionError::TableCreationFailed {
                    message: "create table returned no id".to_string(),
                }
                .into()
            })
    }

    /// Create `columns` concurrently and wait for all of them.
    async fn create_columns(
        &self,
        table_id: &str,
        columns: &[ColumnDefinition],
    ) -> LifecycleResult<()> {
        if columns.is_empty() {
            return Ok(());
        }

        let requests = columns.iter().map(|column| {
            self.client.execute(QueryRequest::new(
                CREATE_TABLE_COLUMN,
                column.to_input(table_id),
            ))
        });
        let results = join_all(requests).await;

        let mut failed = Vec::new();
        let mut messages = Vec::new();
        for (column, result) in columns.iter().zip(results) {
            if let Some(message) = column_failure(result) {
                if is_already_exists(&message) {
                    warn!(column = column.name, "column already exists");
                    continue;
                }
                error!(column = column.name, %message, "column creation failed");
                failed.push(column.name.to_string());
                messages.push(message);
            }
        }

        if failed.is_empty() {
            debug!(table_id, created = columns.len(), "token table columns created");
            Ok(())
        } else {
            Err(ProvisionError::ColumnCreationFailed {
                columns: failed,
                message: messages.join("; "),
            }
            .into())
        }
    }
}

fn column_failure(result: LifecycleResult<QueryResponse>) -> Option<String> {
    match result {
        Err(e) => Some(e.to_string()),
        Ok(response) => response.into_result().err().map(|f| f.message()),
    }
}

fn is_already_exists(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MockQueryClient, QueryError};
    use crate::error::LifecycleError;
    use serde_json::json;

    fn table_with_columns(columns: &[&str]) -> QueryResponse {
        let cols: Vec<Value> = columns.iter().map(|c| json!({"name": c})).collect();
        QueryResponse::success(json!({
            "node": {"table": {"id": "table-1", "name": TOKEN_TABLE_NAME, "columns": cols}}
        }))
    }

    fn created_column_names(client: &MockQueryClient) -> Vec<String> {
        client
            .requests_matching("createTableColumn")
            .iter()
            .map(|r| r.variables.as_ref().unwrap()["input"]["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_creates_missing_columns_only() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(table_with_columns(&["accessToken", "refreshToken"]));
        client.set_handler(|_| QueryResponse::success(json!({"createTableColumn": {}})));

        let provisioner = SchemaProvisioner::new(client.clone(), "Application:app");
        let table_id = provisioner.ensure_table().await.unwrap();
        assert_eq!(table_id, "table-1");

        let mut created = created_column_names(&client);
        created.sort();
        assert_eq!(created, vec!["access_expires_at", "errorCode"]);
    }

    #[tokio::test]
    async fn test_second_call_uses_cache() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(table_with_columns(&[
            "accessToken",
            "access_expires_at",
            "refreshToken",
            "errorCode",
        ]));

        let provisioner = SchemaProvisioner::new(client.clone(), "Application:app");
        provisioner.ensure_table().await.unwrap();
        provisioner.ensure_table().await.unwrap();

        assert_eq!(client.get_requests().len(), 1);
        assert!(created_column_names(&client).is_empty());
        assert_eq!(provisioner.cached_table_id(), Some("table-1"));
    }

    #[tokio::test]
    async fn test_creates_table_and_all_columns() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(QueryResponse {
            data: Some(json!({"node": {"table": null}})),
            errors: vec![QueryError::new("table not found")],
        });
        client.queue_response(QueryResponse::success(json!({
            "createTable": {"table": {"id": "new-table"}}
        })));
        client.set_handler(|_| QueryResponse::success(json!({"createTableColumn": {}})));

        let provisioner = SchemaProvisioner::new(client.clone(), "Application:app");
        assert_eq!(provisioner.ensure_table().await.unwrap(), "new-table");
        assert_eq!(created_column_names(&client).len(), 4);

        let create = &client.requests_matching("createTable(")[0];
        assert_eq!(
            create.variables.as_ref().unwrap()["input"]["name"],
            TOKEN_TABLE_NAME
        );
    }

    #[tokio::test]
    async fn test_table_creation_failure_not_cached() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(QueryResponse::success(json!({"node": {"table": null}})));
        client.queue_response(QueryResponse::failure("permission denied"));

        let provisioner = SchemaProvisioner::new(client.clone(), "Application:app");
        let err = provisioner.ensure_table().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Provision(ProvisionError::TableCreationFailed { .. })
        ));
        assert!(provisioner.cached_table_id().is_none());

        client.queue_response(table_with_columns(&[
            "accessToken",
            "access_expires_at",
            "refreshToken",
            "errorCode",
        ]));
        assert_eq!(provisioner.ensure_table().await.unwrap(), "table-1");
    }

    #[tokio::test]
    async fn test_already_exists_is_tolerated() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(table_with_columns(&["accessToken"]));
        client.set_handler(|request| {
            let name = request.variables.as_ref().unwrap()["input"]["name"].clone();
            if name == "errorCode" {
                QueryResponse::failure("Column errorCode Already Exists")
            } else {
                QueryResponse::success(json!({}))
            }
        });

        let provisioner = SchemaProvisioner::new(client, "Application:app");
        assert!(provisioner.ensure_table().await.is_ok());
    }

    #[tokio::test]
    async fn test_one_failed_column_fails_provisioning() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(table_with_columns(&[]));
        client.set_handler(|request| {
            let name = request.variables.as_ref().unwrap()["input"]["name"].clone();
            if name == "refreshToken" {
                QueryResponse::failure("quota exceeded")
            } else {
                QueryResponse::success(json!({}))
            }
        });

        let provisioner = SchemaProvisioner::new(client, "Application:app");
        match provisioner.ensure_table().await {
            Err(LifecycleError::Provision(ProvisionError::ColumnCreationFailed { columns, .. })) => {
                assert_eq!(columns, vec!["refreshToken".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(provisioner.cached_table_id().is_none());
    }

    #[tokio::test]
    async fn test_lookup_failure() {
        let client = Arc::new(MockQueryClient::new());
        client.queue_response(QueryResponse::failure("unauthorized"));

        let provisioner = SchemaProvisioner::new(client, "Application:app");
        let err = provisioner.ensure_table().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Provision(ProvisionError::LookupFailed { .. })
        ));
    }
}
