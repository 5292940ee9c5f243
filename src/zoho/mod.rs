//! Zoho Inventory upstream: credentials, OAuth token lifecycle and the REST client

pub mod client;
pub mod credentials;
pub mod middleware;
pub mod token;
pub mod types;

pub use client::{ClientOptions, InventoryClient};
pub use credentials::{CachedToken, CredentialStore, Credentials};
pub use token::{FileTokenStore, NoopTokenStore, StoredToken, TokenManager, TokenStore};
pub use types::{InventoryItem, StockAdjustment, Warehouse, WarehouseStock};

/// Mock-server wiring shared by the unit tests of this crate
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    /// Credentials pointing both the API and the OAuth endpoint at `server`
    pub fn credentials(server: &MockServer) -> Credentials {
        Credentials {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            refresh_token: "rtoken".to_string(),
            api_domain: server.base_url(),
            accounts_url: server.base_url(),
            organization_id: "42".to_string(),
        }
    }

    /// Client seeded with the access token `stale`
    pub fn client_with(server: &MockServer, options: &ClientOptions) -> InventoryClient {
        let store = Arc::new(CredentialStore::new(
            credentials(server),
            CachedToken::new("stale", None),
        ));
        InventoryClient::new(store, Arc::new(NoopTokenStore), options).unwrap()
    }

    pub fn test_client(server: &MockServer) -> InventoryClient {
        client_with(server, &ClientOptions::default())
    }

    /// Token endpoint that always mints `fresh`
    pub async fn oauth_mock(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/v2/token")
                    .query_param("grant_type", "refresh_token");
                then.status(200)
                    .json_body(json!({"access_token": "fresh", "expires_in": 3600}));
            })
            .await
    }
}
