//! Normalized inventory structures and the strict parse from upstream JSON

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{InventoryError, Result};

/// Zoho serializes ids as strings but older endpoints emit numbers
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a non-empty id, got {}",
            other
        ))),
    }
}

/// A number, or a string holding one; anything else fails the parse
///
/// A missing stock level must never read as zero: the adjustment delta is
/// computed from it.
fn quantity<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|q| q.is_finite())
        .ok_or_else(|| serde::de::Error::custom(format!("expected a stock quantity, got {}", value)))
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Items
// ============================================================================

/// Stock held for an item in one warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseStock {
    #[serde(deserialize_with = "id_string")]
    pub warehouse_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub warehouse_name: String,
    #[serde(alias = "warehouse_stock_on_hand", deserialize_with = "quantity")]
    pub stock_on_hand: f64,
    #[serde(default)]
    pub is_primary: bool,
}

/// Normalized inventory item
///
/// `warehouses` is only populated by the single-item endpoint; list
/// endpoints leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(deserialize_with = "id_string")]
    pub item_id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sku: String,
    #[serde(deserialize_with = "quantity")]
    pub stock_on_hand: f64,
    #[serde(default)]
    pub warehouses: Vec<WarehouseStock>,
}

impl InventoryItem {
    /// Stock in one warehouse, or the item total when `warehouse_id` is `None`
    ///
    /// `None` when the item has no row for that warehouse.
    pub fn stock_in(&self, warehouse_id: Option<&str>) -> Option<f64> {
        match warehouse_id {
            None => Some(self.stock_on_hand),
            Some(id) => self
                .warehouses
                .iter()
                .find(|w| w.warehouse_id == id)
                .map(|w| w.stock_on_hand),
        }
    }
}

/// One page of `GET items`
#[derive(Debug, Clone)]
pub struct ItemsPage {
    pub items: Vec<InventoryItem>,
    pub has_more_page: bool,
}

// ============================================================================
// Warehouses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    #[serde(deserialize_with = "id_string")]
    pub warehouse_id: String,
    pub warehouse_name: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

// ============================================================================
// Mutations
// ============================================================================

/// Body of `PUT items/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct StockUpdate {
    pub stock_on_hand: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentLine {
    pub item_id: String,
    pub quantity_adjusted: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
}

/// Body of `POST inventoryadjustments`
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentRequest {
    pub adjustment_type: String,
    pub reason: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub line_items: Vec<AdjustmentLine>,
}

impl AdjustmentRequest {
    pub fn quantity(
        item_id: &str,
        delta: f64,
        warehouse_id: Option<&str>,
        reason: &str,
        date: chrono::NaiveDate,
    ) -> Self {
        Self {
            adjustment_type: "quantity".to_string(),
            reason: reason.to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            line_items: vec![AdjustmentLine {
                item_id: item_id.to_string(),
                quantity_adjusted: delta,
                warehouse_id: warehouse_id.map(str::to_string),
            }],
        }
    }
}

/// Adjustment as confirmed by the upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjustment {
    #[serde(alias = "inventory_adjustment_id", deserialize_with = "id_string")]
    pub adjustment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// Strict parse
// ============================================================================

/// Deserialize `envelope[key]`, failing on a missing key or a malformed value
pub fn extract<T>(envelope: &Value, key: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let value = envelope
        .get(key)
        .ok_or_else(|| InventoryError::parse(format!("response has no '{}' field", key)))?;
    T::deserialize(value).map_err(|e| InventoryError::parse(format!("'{}': {}", key, e)))
}

/// First of several possible envelope keys
pub fn extract_any<T>(envelope: &Value, keys: &[&str]) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    match keys.iter().find(|k| envelope.get(**k).is_some()) {
        Some(key) => extract(envelope, key),
        None => Err(InventoryError::parse(format!(
            "response has none of the fields {}",
            keys.join(", ")
        ))),
    }
}

pub fn parse_items_page(envelope: &Value) -> Result<ItemsPage> {
    let items = extract(envelope, "items")?;
    let has_more_page = envelope
        .pointer("/page_context/has_more_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(ItemsPage {
        items,
        has_more_page,
    })
}
