//! Tool Dispatcher
//!
//! Mutating operations. Each resolves its target to exactly one item and
//! then issues a single mutating call; nothing here retries a mutation.

use serde::Serialize;

use crate::error::{InventoryError, Result};
use crate::zoho::types::AdjustmentRequest;
use crate::zoho::{InventoryItem, StockAdjustment};

use super::resolver::ResourceResolver;

pub const DEFAULT_ADJUSTMENT_REASON: &str = "Stock update via API";

/// What an update addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockTarget {
    ItemName(String),
    ItemId(String),
}

/// Validated request to set an item's stock level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStockRequest {
    pub target: StockTarget,
    pub quantity: u64,
}

impl UpdateStockRequest {
    /// Reject empty targets and negative quantities before anything goes upstream
    pub fn new(target: StockTarget, quantity: i64) -> Result<Self> {
        let (key, what) = match &target {
            StockTarget::ItemName(v) => (v, "Item name"),
            StockTarget::ItemId(v) => (v, "Item id"),
        };
        if key.trim().is_empty() {
            return Err(InventoryError::invalid(format!("{} cannot be empty", what)));
        }
        let quantity = u64::try_from(quantity).map_err(|_| {
            InventoryError::invalid(format!("Quantity must be a non-negative integer, got {}", quantity))
        })?;
        Ok(Self { target, quantity })
    }

    pub fn by_name(name: impl Into<String>, quantity: i64) -> Result<Self> {
        Self::new(StockTarget::ItemName(name.into()), quantity)
    }

    pub fn by_id(item_id: impl Into<String>, quantity: i64) -> Result<Self> {
        Self::new(StockTarget::ItemId(item_id.into()), quantity)
    }
}

/// Validated request to bring an item's stock to a level via an adjustment
#[derive(Debug, Clone, PartialEq)]
pub struct SkuStockRequest {
    pub sku: String,
    pub quantity: u64,
    pub reason: String,
    pub warehouse_name: Option<String>,
}

impl SkuStockRequest {
    pub fn new(
        sku: impl Into<String>,
        quantity: i64,
        reason: Option<String>,
        warehouse_name: Option<String>,
    ) -> Result<Self> {
        let sku = sku.into();
        if sku.trim().is_empty() {
            return Err(InventoryError::invalid("SKU cannot be empty"));
        }
        let quantity = u64::try_from(quantity).map_err(|_| {
            InventoryError::invalid(format!("Quantity must be a non-negative integer, got {}", quantity))
        })?;
        Ok(Self {
            sku,
            quantity,
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ADJUSTMENT_REASON.to_string()),
            warehouse_name: warehouse_name.filter(|w| !w.trim().is_empty()),
        })
    }
}

/// Result of `update_stock`
#[derive(Debug, Clone, Serialize)]
pub struct StockUpdateOutcome {
    pub item_id: String,
    pub name: String,
    /// Stock level as confirmed by the upstream response
    pub quantity: f64,
    pub item: InventoryItem,
}

/// Result of `update_stock_by_sku`
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    pub item_id: String,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    pub previous_quantity: f64,
    pub quantity: u64,
    pub delta: f64,
    /// `None` when the stock was already at the requested level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<StockAdjustment>,
}

#[derive(Clone)]
pub struct ToolDispatcher {
    resolver: ResourceResolver,
}

impl ToolDispatcher {
    pub fn new(resolver: ResourceResolver) -> Self {
        Self { resolver }
    }

    /// Resolve the target to exactly one item and set its stock level
    pub async fn update_stock(&self, request: &UpdateStockRequest) -> Result<StockUpdateOutcome> {
        let item_id = match &request.target {
            StockTarget::ItemId(id) => id.trim().to_string(),
            StockTarget::ItemName(name) => {
                let matches = self.resolver.find_by_name(name).await?;
                exactly_one(name, matches)?.item_id
            }
        };

        tracing::info!(item_id = %item_id, quantity = request.quantity, "Updating stock");
        let item = self
            .resolver
            .client()
            .update_item_stock(&item_id, request.quantity)
            .await?;

        Ok(StockUpdateOutcome {
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            quantity: item.stock_on_hand,
            item,
        })
    }

    /// Bring the stock for `sku` to `quantity` with a quantity adjustment
    pub async fn update_stock_by_sku(&self, request: &SkuStockRequest) -> Result<AdjustmentOutcome> {
        let matches = self.resolver.find_by_sku(&request.sku).await?;
        let item_id = exactly_one(&request.sku, matches)?.item_id;

        let warehouse_id = match &request.warehouse_name {
            Some(name) => Some(self.resolver.warehouse_by_name(name).await?.warehouse_id),
            None => None,
        };

        let details = self.resolver.item_details(&item_id).await?;
        let current = details.stock_in(warehouse_id.as_deref()).ok_or_else(|| {
            InventoryError::NotFound(format!(
                "Item {} has no stock record in warehouse {}",
                item_id,
                request.warehouse_name.as_deref().unwrap_or_default()
            ))
        })?;
        let delta = request.quantity as f64 - current;

        let mut outcome = AdjustmentOutcome {
            item_id: item_id.clone(),
            sku: request.sku.clone(),
            warehouse_id: warehouse_id.clone(),
            previous_quantity: current,
            quantity: request.quantity,
            delta,
            adjustment: None,
        };

        if delta == 0.0 {
            tracing::debug!(item_id = %item_id, "Stock already at requested level");
            return Ok(outcome);
        }

        let body = AdjustmentRequest::quantity(
            &item_id,
            delta,
            warehouse_id.as_deref(),
            &request.reason,
            chrono::Local::now().date_naive(),
        );
        tracing::info!(item_id = %item_id, delta, "Creating inventory adjustment");
        outcome.adjustment = Some(self.resolver.client().create_adjustment(&body).await?);
        Ok(outcome)
    }
}

fn exactly_one(key: &str, mut matches: Vec<InventoryItem>) -> Result<InventoryItem> {
    if matches.len() == 1
        && let Some(item) = matches.pop()
    {
        return Ok(item);
    }
    Err(InventoryError::AmbiguousTarget {
        name: key.trim().to_string(),
        candidates: matches.into_iter().map(|i| i.item_id).collect(),
    })
}
