//! Resource Resolver
//!
//! Maps logical stock and warehouse lookups onto API client calls and
//! returns normalized structures only.

use std::sync::Arc;

use crate::error::{InventoryError, Result};
use crate::zoho::{InventoryClient, InventoryItem, Warehouse};

/// Which key a stock lookup is addressed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockQuery {
    ByName(String),
    BySku(String),
}

/// Items whose name equals `name`, or failing that, equals it ignoring case
///
/// Exact matches take precedence so that "widget" and "Widget" can coexist
/// without one lookup returning both.
pub fn match_by_name(items: Vec<InventoryItem>, name: &str) -> Vec<InventoryItem> {
    let (exact, rest): (Vec<_>, Vec<_>) = items.into_iter().partition(|item| item.name == name);
    if !exact.is_empty() {
        return exact;
    }

    let lowered = name.to_lowercase();
    rest.into_iter()
        .filter(|item| item.name.to_lowercase() == lowered)
        .collect()
}

fn required<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InventoryError::invalid(format!("{} cannot be empty", what)));
    }
    Ok(trimmed)
}

fn not_found_on_404(error: InventoryError, what: String) -> InventoryError {
    match error {
        InventoryError::Upstream { status: 404, .. } => InventoryError::NotFound(what),
        other => other,
    }
}

/// Upper bound on pages followed for one listing
pub const MAX_PAGES: u32 = 500;

#[derive(Clone)]
pub struct ResourceResolver {
    client: Arc<InventoryClient>,
}

impl ResourceResolver {
    pub fn new(client: Arc<InventoryClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<InventoryClient> {
        &self.client
    }

    pub async fn stock(&self, query: &StockQuery) -> Result<Vec<InventoryItem>> {
        match query {
            StockQuery::ByName(name) => self.stock_by_name(name).await,
            StockQuery::BySku(sku) => self.stock_by_sku(sku).await,
        }
    }

    /// Every item matching `name`, each with its per-warehouse breakdown
    pub async fn stock_by_name(&self, name: &str) -> Result<Vec<InventoryItem>> {
        let matches = self.find_by_name(name).await?;
        if matches.is_empty() {
            return Err(InventoryError::NotFound(format!("Item not found: {}", name.trim())));
        }
        if matches.len() > 1 {
            tracing::info!(name = %name, count = matches.len(), "Name matches several items");
        }
        self.enrich(matches).await
    }

    /// Every item carrying `sku`, each with its per-warehouse breakdown
    pub async fn stock_by_sku(&self, sku: &str) -> Result<Vec<InventoryItem>> {
        let matches = self.find_by_sku(sku).await?;
        if matches.is_empty() {
            return Err(InventoryError::NotFound(format!("No item with SKU: {}", sku)));
        }
        self.enrich(matches).await
    }

    /// Name matches from the item list, without per-warehouse details
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<InventoryItem>> {
        let name = required("Item name", name)?;
        let items = self.collect_pages(None).await?;
        Ok(match_by_name(items, name))
    }

    /// SKU matches, without per-warehouse details
    ///
    /// The SKU goes upstream as a query parameter untouched; the exact filter
    /// afterwards guards against the upstream treating it as a prefix.
    pub async fn find_by_sku(&self, sku: &str) -> Result<Vec<InventoryItem>> {
        required("SKU", sku)?;
        let items = self.collect_pages(Some(sku)).await?;
        Ok(items.into_iter().filter(|item| item.sku == sku).collect())
    }

    /// Full item list, upstream order preserved across pages
    pub async fn all_items(&self) -> Result<Vec<InventoryItem>> {
        self.collect_pages(None).await
    }

    pub async fn all_warehouses(&self) -> Result<Vec<Warehouse>> {
        self.client.list_warehouses().await
    }

    pub async fn item_details(&self, item_id: &str) -> Result<InventoryItem> {
        let item_id = required("Item id", item_id)?;
        self.client
            .get_item(item_id)
            .await
            .map_err(|e| not_found_on_404(e, format!("Item not found: {}", item_id)))
    }

    pub async fn warehouse_by_id(&self, warehouse_id: &str) -> Result<Warehouse> {
        let warehouse_id = required("Warehouse id", warehouse_id)?;
        self.client
            .get_warehouse(warehouse_id)
            .await
            .map_err(|e| not_found_on_404(e, format!("Warehouse not found: {}", warehouse_id)))
    }

    pub async fn warehouse_by_name(&self, name: &str) -> Result<Warehouse> {
        let name = required("Warehouse name", name)?;
        self.all_warehouses()
            .await?
            .into_iter()
            .find(|w| w.warehouse_name == name)
            .ok_or_else(|| InventoryError::NotFound(format!("Warehouse not found: {}", name)))
    }

    /// Id match first, then exact name, from a single warehouse listing
    pub async fn warehouse(&self, id_or_name: &str) -> Result<Warehouse> {
        let key = required("Warehouse", id_or_name)?;
        let warehouses = self.all_warehouses().await?;

        let by_id = warehouses.iter().position(|w| w.warehouse_id == key);
        let by_name = || warehouses.iter().position(|w| w.warehouse_name == key);
        match by_id.or_else(by_name) {
            Some(index) => Ok(warehouses[index].clone()),
            None => Err(InventoryError::NotFound(format!("Warehouse not found: {}", key))),
        }
    }

    /// Follows `has_more_page`, stopping early on an empty page
    ///
    /// More than [`MAX_PAGES`] pages is reported as an upstream fault rather
    /// than followed forever.
    async fn collect_pages(&self, sku: Option<&str>) -> Result<Vec<InventoryItem>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.client.list_items_page(page, sku).await?;
            let empty = batch.items.is_empty();
            items.extend(batch.items);
            if !batch.has_more_page || empty {
                break;
            }
            if page >= MAX_PAGES {
                return Err(InventoryError::parse(format!(
                    "item listing still reports more pages after {} pages",
                    MAX_PAGES
                )));
            }
            page += 1;
        }
        tracing::debug!(pages = page, count = items.len(), "Collected item pages");
        Ok(items)
    }

    async fn enrich(&self, items: Vec<InventoryItem>) -> Result<Vec<InventoryItem>> {
        let mut detailed = Vec::with_capacity(items.len());
        for item in items {
            detailed.push(self.client.get_item(&item.item_id).await?);
        }
        Ok(detailed)
    }
}
