//! Access tokens for the Firestore REST API.
//!
//! Tokens are cached until shortly before they expire. Refreshes are
//! serialized behind a mutex so concurrent requests share one refresh, and a
//! failed refresh falls back to the current token while it is still valid.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// OAuth scope for Firestore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::seconds(60);

/// Token the emulator accepts for admin access.
const EMULATOR_TOKEN: &str = "owner";

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn fresh(&self, now: DateTime<Utc>) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }

    fn usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Source of bearer tokens for Firestore requests.
#[derive(Clone)]
pub struct Authenticator {
    inner: Option<Arc<GoogleAuth>>,
}

struct GoogleAuth {
    provider: Arc<dyn TokenProvider>,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    /// Service-account auth from `GOOGLE_APPLICATION_CREDENTIALS`, falling
    /// back to the ambient provider (metadata server, gcloud).
    pub async fn google() -> FirestoreResult<Self> {
        let provider: Arc<dyn TokenProvider> = match CustomServiceAccount::from_env() {
            Ok(Some(account)) => Arc::new(account),
            Ok(None) => gcp_auth::provider()
                .await
                .map_err(|e| FirestoreError::auth_error(format!("No Google credentials found: {}", e)))?,
            Err(e) => {
                return Err(FirestoreError::auth_error(format!(
                    "Failed to load service account: {}",
                    e
                )))
            }
        };
        Ok(Self::with_provider(provider))
    }

    pub fn with_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner: Some(Arc::new(GoogleAuth {
                provider,
                cached: Mutex::new(None),
            })),
        }
    }

    /// Static token for the local emulator.
    pub fn emulator() -> Self {
        Self { inner: None }
    }

    pub fn is_emulator(&self) -> bool {
        self.inner.is_none()
    }

    /// Current bearer token, refreshing when close to expiry.
    pub async fn token(&self) -> FirestoreResult<String> {
        let Some(auth) = &self.inner else {
            return Ok(EMULATOR_TOKEN.to_string());
        };

        let mut cached = auth.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.fresh(now)) {
            return Ok(token.value.clone());
        }

        match auth.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let fresh = CachedToken {
                    value: token.as_str().to_string(),
                    expires_at: token.expires_at(),
                };
                debug!(expires_at = %fresh.expires_at, "Refreshed Firestore token");
                let value = fresh.value.clone();
                *cached = Some(fresh);
                Ok(value)
            }
            Err(e) => match cached.as_ref().filter(|t| t.usable(now)) {
                Some(token) => {
                    warn!("Token refresh failed, reusing current token: {}", e);
                    Ok(token.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }

    /// Drop the cached token after the server rejected it.
    pub async fn invalidate(&self) {
        if let Some(auth) = &self.inner {
            *auth.cached.lock().await = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_margin() {
        let now = Utc::now();
        let token = CachedToken {
            value: "t".into(),
            expires_at: now + Duration::seconds(30),
        };
        assert!(!token.fresh(now));
        assert!(token.usable(now));

        let long = CachedToken {
            value: "t".into(),
            expires_at: now + Duration::minutes(30),
        };
        assert!(long.fresh(now));
    }

    #[tokio::test]
    async fn test_emulator_token() {
        let auth = Authenticator::emulator();
        assert!(auth.is_emulator());
        assert_eq!(auth.token().await.unwrap(), "owner");
    }
}
