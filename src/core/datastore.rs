//! Datastore Rows
//!
//! Row access on a provisioned table, keyed by external identity.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::core::{QueryClient, QueryRequest, QueryResponse};
use crate::error::{LifecycleError, LifecycleResult, NetworkError};
use crate::schema::queries::{get_row_variables, upsert_row_variables, GET_TABLE_ROW, UPSERT_TABLE_ROW};

/// Text carried by the error the datastore reports for a missing row.
pub const NOT_FOUND_MARKER: &str = "Could not find data";

fn not_found(table_id: &str, external_id: &str) -> QueryResponse {
    QueryResponse::failure(format!(
        "{} for externalId {} in table {}",
        NOT_FOUND_MARKER, external_id, table_id
    ))
}

/// Row-level access to a table.
///
/// Both calls return the raw backend response; only transport failures are
/// `Err`. A missing row is reported as an error containing
/// [`NOT_FOUND_MARKER`].
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get_row(&self, table_id: &str, external_id: &str) -> LifecycleResult<QueryResponse>;

    async fn upsert_row(
        &self,
        table_id: &str,
        external_id: &str,
        data: Value,
    ) -> LifecycleResult<QueryResponse>;
}

/// Datastore backed by the GraphQL row query and mutation.
pub struct GraphQlDatastore<Q: QueryClient> {
    client: Arc<Q>,
}

impl<Q: QueryClient> GraphQlDatastore<Q> {
    pub fn new(client: Arc<Q>) -> Self {
        Self { client }
    }
}

/// Row payload: stored either as a JSON object or as an encoded string.
fn row_data(row: &Value) -> Value {
    match row.get("data") {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

#[async_trait]
impl<Q: QueryClient> Datastore for GraphQlDatastore<Q> {
    async fn get_row(&self, table_id: &str, external_id: &str) -> LifecycleResult<QueryResponse> {
        let response = self
            .client
            .execute(QueryRequest::new(
                GET_TABLE_ROW,
                get_row_variables(table_id, external_id),
            ))
            .await?;

        if response.has_errors() {
            return Ok(response);
        }

        let row = response
            .data
            .as_ref()
            .and_then(|d| d.get("tableRow"))
            .filter(|r| !r.is_null());

        Ok(match row {
            Some(row) => QueryResponse::success(row_data(row)),
            None => not_found(table_id, external_id),
        })
    }

    async fn upsert_row(
        &self,
        table_id: &str,
        external_id: &str,
        data: Value,
    ) -> LifecycleResult<QueryResponse> {
        let response = self
            .client
            .execute(QueryRequest::new(
                UPSERT_TABLE_ROW,
                upsert_row_variables(table_id, external_id, data),
            ))
            .await?;

        let row = response
            .data
            .as_ref()
            .and_then(|d| d.get("upsertTableRow"))
            .and_then(|d| d.get("tableRow"))
            .map(row_data);

        Ok(QueryResponse {
            data: row,
            errors: response.errors,
        })
    }
}

/// Process-local datastore. Upserts merge into the existing row.
#[derive(Default)]
pub struct InMemoryDatastore {
    rows: Mutex<HashMap<(String, String), Map<String, Value>>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row contents.
    pub fn row(&self, table_id: &str, external_id: &str) -> Option<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(&(table_id.to_string(), external_id.to_string()))
            .cloned()
            .map(Value::Object)
    }

    /// Replace a row outright.
    pub fn insert_row(&self, table_id: &str, external_id: &str, data: Value) {
        let fields = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.rows
            .lock()
            .unwrap()
            .insert((table_id.to_string(), external_id.to_string()), fields);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn merge(&self, table_id: &str, external_id: &str, data: Value) -> Value {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows
            .entry((table_id.to_string(), external_id.to_string()))
            .or_default();
        if let Value::Object(fields) = data {
            entry.extend(fields);
        }
        Value::Object(entry.clone())
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_row(&self, table_id: &str, external_id: &str) -> LifecycleResult<QueryResponse> {
        Ok(match self.row(table_id, external_id) {
            Some(row) => QueryResponse::success(row),
            None => not_found(table_id, external_id),
        })
    }

    async fn upsert_row(
        &self,
        table_id: &str,
        external_id: &str,
        data: Value,
    ) -> LifecycleResult<QueryResponse> {
        debug!(table_id, external_id, "upserting in-memory row");
        Ok(QueryResponse::success(self.merge(table_id, external_id, data)))
    }
}

/// Recorded datastore call.
#[derive(Clone, Debug, PartialEq)]
pub struct UpsertCall {
    pub table_id: String,
    pub external_id: String,
    pub data: Value,
}

/// Mock datastore for testing: an in-memory store plus history and
/// failure injection.
#[derive(Default)]
pub struct MockDatastore {
    store: InMemoryDatastore,
    get_history: Mutex<Vec<(String, String)>>,
    upsert_history: Mutex<Vec<UpsertCall>>,
    should_fail: Mutex<bool>,
    next_get_error: Mutex<Option<String>>,
    next_upsert_error: Mutex<Option<String>>,
}

impl MockDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing history.
    pub fn seed_row(&self, table_id: &str, external_id: &str, data: Value) -> &Self {
        self.store.insert_row(table_id, external_id, data);
        self
    }

    pub fn row(&self, table_id: &str, external_id: &str) -> Option<Value> {
        self.store.row(table_id, external_id)
    }

    /// Fail every call at the transport level.
    pub fn set_should_fail(&self, fail: bool) -> &Self {
        *self.should_fail.lock().unwrap() = fail;
        self
    }

    /// Report a backend error for the next read.
    pub fn fail_next_get(&self, message: impl Into<String>) -> &Self {
        *self.next_get_error.lock().unwrap() = Some(message.into());
        self
    }

    /// Write the next upsert, but report a validation error alongside the
    /// written row.
    pub fn fail_next_upsert(&self, message: impl Into<String>) -> &Self {
        *self.next_upsert_error.lock().unwrap() = Some(message.into());
        self
    }

    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.get_history.lock().unwrap().clone()
    }

    pub fn upsert_calls(&self) -> Vec<UpsertCall> {
        self.upsert_history.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.get_history.lock().unwrap().len() + self.upsert_history.lock().unwrap().len()
    }

    fn check_fail(&self) -> LifecycleResult<()> {
        if *self.should_fail.lock().unwrap() {
            return Err(LifecycleError::Network(NetworkError::ConnectionFailed {
                message: "Mock datastore failure".to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl Datastore for MockDatastore {
    async fn get_row(&self, table_id: &str, external_id: &str) -> LifecycleResult<QueryResponse> {
        self.get_history
            .lock()
            .unwrap()
            .push((table_id.to_string(), external_id.to_string()));
        self.check_fail()?;

        if let Some(message) = self.next_get_error.lock().unwrap().take() {
            return Ok(QueryResponse::failure(message));
        }
        self.store.get_row(table_id, external_id).await
    }

    async fn upsert_row(
        &self,
        table_id: &str,
        external_id: &str,
        data: Value,
    ) -> LifecycleResult<QueryResponse> {
        self.upsert_history.lock().unwrap().push(UpsertCall {
            table_id: table_id.to_string(),
            external_id: external_id.to_string(),
            data: data.clone(),
        });
        self.check_fail()?;

        let mut response = self.store.upsert_row(table_id, external_id, data).await?;
        if let Some(message) = self.next_upsert_error.lock().unwrap().take() {
            response.errors.push(crate::core::QueryError::new(message));
        }
        Ok(response)
    }
}
