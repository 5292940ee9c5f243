//! Credential store shared by the token manager and the API client

use std::fmt;

use tokio::sync::{Mutex, MutexGuard};

/// Static OAuth client configuration for a single organization
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// e.g. `https://www.zohoapis.eu`
    pub api_domain: String,
    /// e.g. `https://accounts.zoho.eu`
    pub accounts_url: String,
    pub organization_id: String,
}

impl Credentials {
    /// Base URL for inventory endpoints (`{api_domain}/inventory/v1`)
    pub fn api_base(&self) -> String {
        format!("{}/inventory/v1", self.api_domain.trim_end_matches('/'))
    }

    /// OAuth refresh endpoint
    pub fn token_url(&self) -> String {
        format!("{}/oauth/v2/token", self.accounts_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("api_domain", &self.api_domain)
            .field("accounts_url", &self.accounts_url)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// The mutable half of the credentials: the current access token
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: Option<String>,
    /// Unix seconds; `None` when the upstream did not say
    pub expires_at: Option<u64>,
}

impl CachedToken {
    pub fn new(access_token: impl Into<String>, expires_at: Option<u64>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            expires_at,
        }
    }

    /// The token, unless it is absent or known to expire within `margin_secs` of `now`
    pub fn usable(&self, now: u64, margin_secs: u64) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        match self.expires_at {
            Some(expires_at) if now.saturating_add(margin_secs) >= expires_at => None,
            _ => Some(token),
        }
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process-wide credential store
///
/// The static credentials are immutable after construction; the access token
/// sits behind an async mutex so refreshes form a single writer section.
#[derive(Debug)]
pub struct CredentialStore {
    credentials: Credentials,
    token: Mutex<CachedToken>,
}

impl CredentialStore {
    pub fn new(credentials: Credentials, token: CachedToken) -> Self {
        Self {
            credentials,
            token: Mutex::new(token),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Enter the single-writer section for the access token
    pub async fn lock(&self) -> MutexGuard<'_, CachedToken> {
        self.token.lock().await
    }

    /// Snapshot of the current access token, if any
    pub async fn current_token(&self) -> Option<String> {
        self.token.lock().await.access_token.clone()
    }
}
