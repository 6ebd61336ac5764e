//! Refresh operations for user/service-account tokens and the shared
//! client credentials token.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::{
    normalize_issued, CallerContext, LifecycleOrchestrator, StorageIdentity,
    CLIENT_CREDENTIALS_FAILED_MESSAGE, REFRESH_FAILED_MESSAGE,
};
use crate::core::{Datastore, HttpTransport, QueryClient};
use crate::error::LifecycleResult;
use crate::flows::OAuthProvider;
use crate::token::{RefreshDecision, TokenStore};
use crate::types::{
    ErrorCode, LifecycleResponse, TokenFields, TokenRecord, CLIENT_CREDENTIALS_EXTERNAL_KEY,
};

impl<Q, D, P, T> LifecycleOrchestrator<Q, D, P, T>
where
    Q: QueryClient,
    D: Datastore,
    P: OAuthProvider,
    T: HttpTransport,
{
    /// Return a usable token for the caller, refreshing it when due.
    ///
    /// | outcome                             | status | body         |
    /// |-------------------------------------|--------|--------------|
    /// | no record                           | 401    | error        |
    /// | probe rejected, credentials removed | 204    | empty        |
    /// | valid forever                       | 200    | empty        |
    /// | empty record                        | 204    | empty        |
    /// | refreshed                           | 200    | token        |
    /// | provider rejected refresh           | 401    | error        |
    /// | fresh                               | 200    | access token |
    ///
    /// Service accounts get an empty 200 body instead of token material.
    #[instrument(
        skip(self, caller),
        fields(username = %caller.username, service_account = caller.service_account)
    )]
    pub async fn refresh(&self, caller: &CallerContext) -> LifecycleResponse {
        match self.try_refresh(caller).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!("no stored token for caller");
                LifecycleResponse::from(&e)
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), "token refresh failed");
                LifecycleResponse::from(&e)
            }
        }
    }

    async fn try_refresh(&self, caller: &CallerContext) -> LifecycleResult<LifecycleResponse> {
        let identity = self.storage_identity(caller)?;
        let store = self.token_store().await?;
        let mut record = store.get(&identity.external_id).await?;
        let now = Utc::now();

        if let Some(probe) = &self.probe {
            if record.access_token.is_empty() {
                debug!("skipping inner authorization for empty token");
            } else if let Err(rejection) = probe.verify(&record.access_token).await {
                if probe.remove_credentials() {
                    store
                        .upsert(
                            &identity.external_id,
                            &TokenFields::empty_with_error(now, ErrorCode::InnerAuthorizationFailed),
                        )
                        .await?;
                    info!(
                        external_id = %identity.external_id,
                        error = %rejection,
                        "removed credentials rejected by inner authorization"
                    );
                    return Ok(LifecycleResponse::no_content());
                }

                warn!(
                    external_id = %identity.external_id,
                    error = %rejection,
                    "keeping credentials rejected by inner authorization"
                );
                let flagged = record.with_error(ErrorCode::InnerAuthorizationFailed);
                record = store.upsert(&identity.external_id, &flagged.fields()).await?;
            }
        }

        match self.policy.decide(&record, now) {
            RefreshDecision::ValidForever => {
                debug!("token never expires");
                Ok(LifecycleResponse::ok())
            }
            RefreshDecision::Empty => {
                debug!("stored token is empty");
                Ok(LifecycleResponse::no_content())
            }
            RefreshDecision::NeedsRefresh => {
                self.refresh_record(&store, &identity, &record, now).await
            }
            RefreshDecision::Fresh => {
                debug!("stored token is fresh");
                Ok(if identity.return_token_back {
                    LifecycleResponse::access_token(record.access_token)
                } else {
                    LifecycleResponse::ok()
                })
            }
        }
    }

    async fn refresh_record(
        &self,
        store: &TokenStore<D>,
        identity: &StorageIdentity,
        record: &TokenRecord,
        now: DateTime<Utc>,
    ) -> LifecycleResult<LifecycleResponse> {
        let material = match self.provider.refresh(&record.refresh_token).await {
            Ok(material) => material,
            Err(e) => {
                // Provider errors end this attempt; the caller has to re-authorize.
                error!(
                    external_id = %identity.external_id,
                    error = %e,
                    needs_reauth = e.needs_reauth(),
                    "provider rejected refresh"
                );
                return Ok(LifecycleResponse::error(401, REFRESH_FAILED_MESSAGE));
            }
        };

        let material = normalize_issued(
            material.with_fallback_refresh_token(&record.refresh_token),
            now,
        )?;
        store
            .upsert(&identity.external_id, &material.to_fields(now)?)
            .await?;
        info!(external_id = %identity.external_id, "token refreshed");

        Ok(if identity.return_token_back {
            LifecycleResponse::token(material)
        } else {
            LifecycleResponse::ok()
        })
    }

    /// Renew the shared client credentials token when it is missing or due.
    #[instrument(skip(self))]
    pub async fn refresh_client_credentials(&self) -> LifecycleResponse {
        match self.try_refresh_client_credentials().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "client credentials refresh failed");
                LifecycleResponse::error(500, CLIENT_CREDENTIALS_FAILED_MESSAGE)
            }
        }
    }

    async fn try_refresh_client_credentials(&self) -> LifecycleResult<LifecycleResponse> {
        let store = self.token_store().await?;
        let now = Utc::now();

        let existing = match store.get(CLIENT_CREDENTIALS_EXTERNAL_KEY).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "no usable client credentials token");
                None
            }
        };

        if !self.policy.client_credentials_due(existing.as_ref(), now) {
            debug!("client credentials token is fresh");
            return Ok(LifecycleResponse::ok());
        }

        let material = self
            .provider
            .client_credentials(self.config.token_scope.as_deref())
            .await?;

        // No expiry means due again on the next call.
        let material = normalize_issued(material, now)?;
        let fields = TokenFields {
            access_token: material.access_token.clone(),
            access_expires_at: material.expires_at.unwrap_or(now),
            refresh_token: String::new(),
            error_code: None,
        };
        store.upsert(CLIENT_CREDENTIALS_EXTERNAL_KEY, &fields).await?;
        info!("client credentials token refreshed");

        Ok(LifecycleResponse::ok())
    }
}
