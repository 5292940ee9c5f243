//! Inventory API Client
//!
//! Single entry point for every upstream call. Authorization and the
//! one-shot refresh retry live in [`OAuthMiddleware`]; this layer adds the
//! organization scope, classifies failures and hands back parsed JSON.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use reqwest_middleware::{self as rqm, ClientWithMiddleware};
use serde_json::Value;

use crate::error::{InventoryError, Result};

use super::credentials::CredentialStore;
use super::middleware::OAuthMiddleware;
use super::token::{TokenManager, TokenStore};
use super::types::{
    AdjustmentRequest, InventoryItem, ItemsPage, StockAdjustment, StockUpdate, Warehouse,
    extract, extract_any, parse_items_page,
};

/// Largest `per_page` Zoho accepts
pub const MAX_PAGE_SIZE: u32 = 200;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport tuning for the upstream client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Option<Duration>,
    /// Bound on every upstream call, token exchange included
    pub request_timeout: Duration,
    pub page_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

pub struct InventoryClient {
    http: ClientWithMiddleware,
    base_url: String,
    organization_id: String,
    tokens: Arc<TokenManager>,
    page_size: u32,
}

impl InventoryClient {
    /// Build the client and its token manager over a shared credential store
    pub fn new(
        store: Arc<CredentialStore>,
        persistence: Arc<dyn TokenStore>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(options.request_timeout);
        if let Some(connect_timeout) = options.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let plain = builder
            .build()
            .map_err(|e| InventoryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = store.credentials().api_base();
        let organization_id = store.credentials().organization_id.clone();
        let tokens = Arc::new(TokenManager::new(store, plain.clone(), persistence));

        let http = rqm::ClientBuilder::new(plain)
            .with(OAuthMiddleware::new(Arc::clone(&tokens)))
            .build();

        Ok(Self {
            http,
            base_url,
            organization_id,
            tokens,
            page_size: options.page_size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Issue one upstream call and return its JSON body
    ///
    /// `organization_id` is appended to `query`. Non-2xx responses become
    /// [`InventoryError::Upstream`] with the body verbatim, as do 2xx bodies
    /// whose Zoho `code` is non-zero.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .query(&[("organization_id", self.organization_id.as_str())])
            .query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(method = %method, path = %path, status = status.as_u16(), "Upstream response");

        if !status.is_success() {
            return Err(InventoryError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| InventoryError::parse(format!("{} {}: {}", method, path, e)))?;

        if let Some(code) = json.get("code").and_then(Value::as_i64)
            && code != 0
        {
            return Err(InventoryError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(json)
    }

    // ========================================================================
    // Typed endpoints
    // ========================================================================

    /// `GET items`, one page, optionally filtered by SKU
    pub async fn list_items_page(&self, page: u32, sku: Option<&str>) -> Result<ItemsPage> {
        let page = page.to_string();
        let per_page = self.page_size.to_string();
        let mut query = vec![("page", page.as_str()), ("per_page", per_page.as_str())];
        if let Some(sku) = sku {
            query.push(("sku", sku));
        }

        let json = self.request(Method::GET, "items", &query, None).await?;
        parse_items_page(&json)
    }

    /// `GET items/{id}`, including the per-warehouse breakdown
    pub async fn get_item(&self, item_id: &str) -> Result<InventoryItem> {
        let json = self
            .request(Method::GET, &format!("items/{}", item_id), &[], None)
            .await?;
        extract(&json, "item")
    }

    /// `PUT items/{id}` with a new stock level; returns the item as confirmed
    pub async fn update_item_stock(&self, item_id: &str, quantity: u64) -> Result<InventoryItem> {
        let body = serde_json::to_value(StockUpdate {
            stock_on_hand: quantity,
        })
        .map_err(|e| InventoryError::parse(e.to_string()))?;

        let json = self
            .request(Method::PUT, &format!("items/{}", item_id), &[], Some(&body))
            .await?;
        extract(&json, "item")
    }

    pub async fn list_warehouses(&self) -> Result<Vec<Warehouse>> {
        let json = self.request(Method::GET, "warehouses", &[], None).await?;
        extract(&json, "warehouses")
    }

    pub async fn get_warehouse(&self, warehouse_id: &str) -> Result<Warehouse> {
        let json = self
            .request(Method::GET, &format!("warehouses/{}", warehouse_id), &[], None)
            .await?;
        extract(&json, "warehouse")
    }

    /// `POST inventoryadjustments`
    pub async fn create_adjustment(&self, adjustment: &AdjustmentRequest) -> Result<StockAdjustment> {
        let body =
            serde_json::to_value(adjustment).map_err(|e| InventoryError::parse(e.to_string()))?;

        let json = self
            .request(Method::POST, "inventoryadjustments", &[], Some(&body))
            .await?;
        extract_any(&json, &["inventoryadjustment", "inventory_adjustment"])
    }
}
