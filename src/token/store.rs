//! Token Store
//!
//! One token record per external identity, on the provisioned table.

use std::sync::Arc;
use tracing::{debug, error};

use crate::core::{Datastore, NOT_FOUND_MARKER};
use crate::error::{LifecycleError, LifecycleResult, StoreError, ValidationError};
use crate::types::{TokenFields, TokenRecord};

/// Read/write access to token records in one table.
pub struct TokenStore<D: Datastore> {
    datastore: Arc<D>,
    table_id: String,
}

impl<D: Datastore> TokenStore<D> {
    pub fn new(datastore: Arc<D>, table_id: impl Into<String>) -> Self {
        Self {
            datastore,
            table_id: table_id.into(),
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Load the record for `external_id`.
    ///
    /// A missing row is `LifecycleError::NotFound`; every other failure is a
    /// `StoreError`.
    pub async fn get(&self, external_id: &str) -> LifecycleResult<TokenRecord> {
        let response = self
            .datastore
            .get_row(&self.table_id, external_id)
            .await
            .map_err(|e| {
                error!(external_id, error = %e, "token read failed");
                StoreError::ReadFailed {
                    message: e.to_string(),
                }
            })?;

        let row = match response.into_result() {
            Ok(row) => row,
            Err(failure) if failure.mentions(NOT_FOUND_MARKER) => {
                debug!(external_id, "no token record");
                return Err(LifecycleError::NotFound {
                    external_id: external_id.to_string(),
                });
            }
            Err(failure) => {
                error!(external_id, message = %failure.message(), "token read failed");
                return Err(StoreError::ReadFailed {
                    message: failure.message(),
                }
                .into());
            }
        };

        TokenRecord::from_row(external_id, row).map_err(|e| {
            StoreError::CorruptedData {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Write the full field set for `external_id`.
    ///
    /// Errors reported alongside a written row still fail the write.
    pub async fn upsert(
        &self,
        external_id: &str,
        fields: &TokenFields,
    ) -> LifecycleResult<TokenRecord> {
        if external_id.is_empty() {
            return Err(ValidationError::MissingIdentity.into());
        }

        let response = self
            .datastore
            .upsert_row(&self.table_id, external_id, fields.to_row())
            .await
            .map_err(|e| {
                error!(external_id, error = %e, "token write failed");
                StoreError::WriteFailed {
                    message: e.to_string(),
                }
            })?;

        if let Err(failure) = response.into_result() {
            error!(external_id, message = %failure.message(), "token write failed");
            return Err(StoreError::WriteFailed {
                message: failure.message(),
            }
            .into());
        }

        debug!(external_id, "token record written");
        Ok(TokenRecord::new(external_id, fields.clone()))
    }
}
