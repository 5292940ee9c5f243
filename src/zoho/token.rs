//! OAuth access-token lifecycle
//!
//! The token manager hands out the cached access token optimistically and
//! performs the refresh-token exchange when no usable token is cached or when
//! the API client reports that the current token was rejected.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

use super::credentials::{CachedToken, CredentialStore};

/// Refresh this many seconds before a known expiry
pub const EXPIRY_MARGIN_SECS: u64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Token persistence
// ============================================================================

/// Token as written to the operator-visible cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// Where refreshed tokens are surfaced so they survive a restart
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<StoredToken>;
    fn save(&self, token: &StoredToken) -> anyhow::Result<()>;
}

/// Discards refreshed tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTokenStore;

impl TokenStore for NoopTokenStore {
    fn load(&self) -> Option<StoredToken> {
        None
    }

    fn save(&self, _token: &StoredToken) -> anyhow::Result<()> {
        Ok(())
    }
}

/// JSON file cache: `{"access_token": "...", "expires_at": 1700000000}`
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<StoredToken> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredToken>(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable token cache");
                None
            }
        }
    }

    fn save(&self, token: &StoredToken) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string(token)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write token cache {}", self.path.display()))
    }
}

// ============================================================================
// Token endpoint response
// ============================================================================

/// Zoho answers rejected refreshes with HTTP 200 and an `error` field,
/// so every field is optional here and checked explicitly.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

// ============================================================================
// Token Manager
// ============================================================================

/// Produces access tokens for outbound calls and refreshes them on demand
pub struct TokenManager {
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    persistence: Arc<dyn TokenStore>,
    exchanges: AtomicU64,
}

impl TokenManager {
    /// # Arguments
    /// * `store` - credential store whose access token this manager owns
    /// * `http` - plain client for the token endpoint (timeouts already applied)
    /// * `persistence` - where refreshed tokens are surfaced
    pub fn new(
        store: Arc<CredentialStore>,
        http: reqwest::Client,
        persistence: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            store,
            http,
            persistence,
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Number of refresh exchanges performed so far
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Token to attach to the next request
    ///
    /// Returns the cached token without validating it upstream. Only when
    /// nothing usable is cached does this perform the refresh exchange.
    pub async fn get_valid_token(&self) -> Result<String> {
        let mut cached = self.store.lock().await;
        if let Some(token) = cached.usable(unix_now(), EXPIRY_MARGIN_SECS) {
            return Ok(token.to_string());
        }

        tracing::debug!("No usable access token cached, refreshing");
        self.refresh_locked(&mut cached).await
    }

    /// Unconditionally refresh, unless another caller already replaced `rejected`
    ///
    /// `rejected` is the token the upstream just refused. If the cached token
    /// no longer equals it, a concurrent refresh has already produced a newer
    /// token and that one is returned without a second exchange.
    pub async fn force_refresh(&self, rejected: Option<&str>) -> Result<String> {
        let mut cached = self.store.lock().await;

        if let (Some(rejected), Some(current)) = (rejected, cached.access_token.as_deref())
            && current != rejected
            && !current.is_empty()
        {
            tracing::debug!("Access token already refreshed by a concurrent caller");
            return Ok(current.to_string());
        }

        self.refresh_locked(&mut cached).await
    }

    /// Exchange and overwrite the cached token; caller holds the lock
    async fn refresh_locked(&self, cached: &mut CachedToken) -> Result<String> {
        let fresh = self.exchange().await?;
        let token = fresh.access_token.clone().unwrap_or_default();
        *cached = fresh;

        let stored = StoredToken {
            access_token: token.clone(),
            expires_at: cached.expires_at,
        };
        if let Err(e) = self.persistence.save(&stored) {
            tracing::warn!(error = %e, "Failed to persist refreshed access token");
        }

        tracing::info!(expires_at = ?cached.expires_at, "Access token refreshed");
        Ok(token)
    }

    /// Perform the refresh-token exchange against the OAuth endpoint
    async fn exchange(&self) -> Result<CachedToken> {
        let credentials = self.store.credentials();
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let response = self
            .http
            .post(credentials.token_url())
            .query(&[
                ("refresh_token", credentials.refresh_token.as_str()),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_server_error() {
            return Err(InventoryError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(InventoryError::AuthFatal(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            InventoryError::AuthFatal(format!("unreadable token response: {}", e))
        })?;

        match parsed.access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
                Ok(CachedToken::new(token, Some(unix_now() + expires_in)))
            }
            None => Err(InventoryError::AuthFatal(format!(
                "refresh rejected: {}",
                parsed.error.as_deref().unwrap_or("no access_token in response")
            ))),
        }
    }
}

/// Seed for the credential store: explicit token first, then an unexpired cached one
pub fn initial_token(explicit: Option<&str>, persistence: &dyn TokenStore) -> CachedToken {
    if let Some(token) = explicit.filter(|t| !t.is_empty()) {
        return CachedToken::new(token, None);
    }

    match persistence.load() {
        Some(stored) => {
            let cached = CachedToken::new(stored.access_token, stored.expires_at);
            if cached.usable(unix_now(), EXPIRY_MARGIN_SECS).is_some() {
                tracing::debug!("Loaded access token from cache");
                cached
            } else {
                CachedToken::default()
            }
        }
        None => CachedToken::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zoho::credentials::Credentials;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every saved token
    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<StoredToken>>,
    }

    impl TokenStore for RecordingStore {
        fn load(&self) -> Option<StoredToken> {
            None
        }

        fn save(&self, token: &StoredToken) -> anyhow::Result<()> {
            self.saved.lock().unwrap().push(token.clone());
            Ok(())
        }
    }

    fn manager(server: &MockServer, seed: CachedToken, persistence: Arc<dyn TokenStore>) -> TokenManager {
        let credentials = Credentials {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            refresh_token: "rtoken".to_string(),
            api_domain: server.base_url(),
            accounts_url: server.base_url(),
            organization_id: "42".to_string(),
        };
        TokenManager::new(
            Arc::new(CredentialStore::new(credentials, seed)),
            reqwest::Client::new(),
            persistence,
        )
    }

    #[tokio::test]
    async fn test_get_valid_token_refreshes_once_and_caches() {
        let server = MockServer::start_async().await;
        let oauth = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/v2/token")
                    .query_param("refresh_token", "rtoken")
                    .query_param("client_id", "cid")
                    .query_param("client_secret", "csecret")
                    .query_param("grant_type", "refresh_token");
                then.status(200)
                    .json_body(json!({"access_token": "fresh", "expires_in": 3600}));
            })
            .await;

        let recorder = Arc::new(RecordingStore::default());
        let tokens = manager(&server, CachedToken::default(), recorder.clone());

        let first = tokens.get_valid_token().await.unwrap();
        let second = tokens.get_valid_token().await.unwrap();

        assert_eq!(first, "fresh");
        assert_eq!(first, second);
        oauth.assert_hits_async(1).await;
        assert_eq!(tokens.exchange_count(), 1);

        let saved = recorder.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].access_token, "fresh");
        assert!(saved[0].expires_at.is_some());
    }

    #[tokio::test]
    async fn test_cached_token_returned_without_exchange() {
        let server = MockServer::start_async().await;
        let oauth = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(200).json_body(json!({"access_token": "fresh"}));
            })
            .await;

        let tokens = manager(&server, CachedToken::new("seeded", None), Arc::new(NoopTokenStore));

        assert_eq!(tokens.get_valid_token().await.unwrap(), "seeded");
        assert_eq!(tokens.get_valid_token().await.unwrap(), "seeded");
        oauth.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let server = MockServer::start_async().await;
        let oauth = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(200).json_body(json!({"access_token": "fresh"}));
            })
            .await;

        let expired = CachedToken::new("old", Some(unix_now().saturating_sub(10)));
        let tokens = manager(&server, expired, Arc::new(NoopTokenStore));

        assert_eq!(tokens.get_valid_token().await.unwrap(), "fresh");
        oauth.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_force_refresh_overwrites_cached_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(200).json_body(json!({"access_token": "fresh"}));
            })
            .await;

        let tokens = manager(&server, CachedToken::new("stale", None), Arc::new(NoopTokenStore));

        assert_eq!(tokens.force_refresh(Some("stale")).await.unwrap(), "fresh");
        assert_eq!(tokens.store().current_token().await.as_deref(), Some("fresh"));
        assert_eq!(tokens.get_valid_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_force_refresh_skips_when_already_replaced() {
        let server = MockServer::start_async().await;
        let oauth = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(200).json_body(json!({"access_token": "fresh"}));
            })
            .await;

        let tokens = manager(&server, CachedToken::new("newer", None), Arc::new(NoopTokenStore));

        assert_eq!(tokens.force_refresh(Some("older")).await.unwrap(), "newer");
        oauth.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_concurrent_force_refresh_exchanges_once() {
        let server = MockServer::start_async().await;
        let oauth = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(200)
                    .delay(std::time::Duration::from_millis(50))
                    .json_body(json!({"access_token": "fresh"}));
            })
            .await;

        let tokens = Arc::new(manager(&server, CachedToken::new("stale", None), Arc::new(NoopTokenStore)));

        let a = tokio::spawn({
            let tokens = Arc::clone(&tokens);
            async move { tokens.force_refresh(Some("stale")).await }
        });
        let b = tokio::spawn({
            let tokens = Arc::clone(&tokens);
            async move { tokens.force_refresh(Some("stale")).await }
        });

        assert_eq!(a.await.unwrap().unwrap(), "fresh");
        assert_eq!(b.await.unwrap().unwrap(), "fresh");
        oauth.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_in_200_body_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(200).json_body(json!({"error": "invalid_code"}));
            })
            .await;

        let tokens = manager(&server, CachedToken::default(), Arc::new(NoopTokenStore));
        let err = tokens.get_valid_token().await.unwrap_err();

        assert!(matches!(err, InventoryError::AuthFatal(ref msg) if msg.contains("invalid_code")));
        assert_eq!(tokens.store().current_token().await, None);
    }

    #[tokio::test]
    async fn test_rejected_refresh_status_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(400).body("invalid_client");
            })
            .await;

        let tokens = manager(&server, CachedToken::default(), Arc::new(NoopTokenStore));
        let err = tokens.force_refresh(None).await.unwrap_err();

        assert!(matches!(err, InventoryError::AuthFatal(_)));
    }

    #[tokio::test]
    async fn test_token_endpoint_outage_is_not_fatal() {
        let server = MockServer::start_async().await;
        let oauth = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/v2/token");
                then.status(503).body("maintenance");
            })
            .await;

        let tokens = manager(&server, CachedToken::new("stale", None), Arc::new(NoopTokenStore));
        let err = tokens.force_refresh(Some("stale")).await.unwrap_err();

        assert!(
            matches!(err, InventoryError::Upstream { status: 503, ref body } if body == "maintenance"),
            "got {:?}",
            err
        );
        // The rejected token stays until a refresh succeeds
        assert_eq!(tokens.store().current_token().await.as_deref(), Some("stale"));
        oauth.assert_hits_async(1).await;
    }

    #[test]
    fn test_file_token_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token.json"));
        assert!(store.load().is_none());

        let token = StoredToken {
            access_token: "abc".to_string(),
            expires_at: Some(unix_now() + 3600),
        };
        store.save(&token).unwrap();
        assert_eq!(store.load(), Some(token));
    }

    #[test]
    fn test_initial_token_prefers_explicit_then_unexpired_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));

        store
            .save(&StoredToken {
                access_token: "cached".to_string(),
                expires_at: Some(unix_now() + 3600),
            })
            .unwrap();
        assert_eq!(initial_token(Some("explicit"), &store).access_token.as_deref(), Some("explicit"));
        assert_eq!(initial_token(None, &store).access_token.as_deref(), Some("cached"));

        store
            .save(&StoredToken {
                access_token: "expired".to_string(),
                expires_at: Some(unix_now().saturating_sub(1)),
            })
            .unwrap();
        assert_eq!(initial_token(None, &store), CachedToken::default());
    }
}
