//! Tool definitions and argument validation

use serde_json::{Map, Value, json};

use crate::error::{InventoryError, Result};
use crate::inventory::{SkuStockRequest, StockTarget, UpdateStockRequest};

use super::protocol::ToolInfo;

pub const UPDATE_STOCK: &str = "update_stock";
pub const UPDATE_STOCK_BY_SKU: &str = "update_stock_by_sku";

/// A `tools/call` with validated arguments
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    UpdateStock(UpdateStockRequest),
    UpdateStockBySku(SkuStockRequest),
}

impl ToolCall {
    /// Validate `arguments` for tool `name`; nothing has gone upstream yet
    pub fn parse(name: &str, arguments: Option<&Value>) -> Result<Self> {
        let empty = Map::new();
        let args = match arguments {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(InventoryError::invalid("Tool arguments must be an object")),
        };

        match name {
            UPDATE_STOCK => {
                let target = match (
                    optional_string(args, "item_name")?,
                    optional_string(args, "item_id")?,
                ) {
                    (Some(name), None) => StockTarget::ItemName(name),
                    (None, Some(id)) => StockTarget::ItemId(id),
                    (None, None) => {
                        return Err(InventoryError::invalid(
                            "Missing required argument 'item_name' (or 'item_id')",
                        ));
                    }
                    (Some(_), Some(_)) => {
                        return Err(InventoryError::invalid(
                            "Give either 'item_name' or 'item_id', not both",
                        ));
                    }
                };
                let quantity = quantity(args)?;
                Ok(ToolCall::UpdateStock(UpdateStockRequest::new(target, quantity)?))
            }
            UPDATE_STOCK_BY_SKU => {
                let sku = required_string(args, "sku")?;
                let quantity = quantity(args)?;
                Ok(ToolCall::UpdateStockBySku(SkuStockRequest::new(
                    sku,
                    quantity,
                    optional_string(args, "reason")?,
                    optional_string(args, "warehouse_name")?,
                )?))
            }
            other => Err(InventoryError::invalid(format!("Unknown tool: {}", other))),
        }
    }
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String> {
    optional_string(args, key)?
        .ok_or_else(|| InventoryError::invalid(format!("Missing required argument '{}'", key)))
}

fn optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(InventoryError::invalid(format!(
            "Argument '{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// Integer quantity; `100.0` is accepted, `1.5` and `"100"` are not
fn quantity(args: &Map<String, Value>) -> Result<i64> {
    let value = args
        .get("quantity")
        .ok_or_else(|| InventoryError::invalid("Missing required argument 'quantity'"))?;

    let not_integer =
        || InventoryError::invalid(format!("Quantity must be a non-negative integer, got {}", value));

    let Value::Number(n) = value else {
        return Err(not_integer());
    };
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    if n.is_u64() {
        return Err(InventoryError::invalid("Quantity is too large"));
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(not_integer()),
    }
}

/// Entries of `tools/list`
pub fn tool_list() -> Vec<ToolInfo> {
    vec![
        ToolInfo {
            name: UPDATE_STOCK.to_string(),
            description: "Set the stock on hand of the single item with this name (or id). \
                Fails without changing anything if the name matches no item or several."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item_name": {
                        "type": "string",
                        "description": "Exact item name (matched case-insensitively if no exact match)"
                    },
                    "item_id": {
                        "type": "string",
                        "description": "Item id, instead of item_name"
                    },
                    "quantity": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "New stock on hand"
                    }
                },
                "required": ["quantity"]
            }),
        },
        ToolInfo {
            name: UPDATE_STOCK_BY_SKU.to_string(),
            description: "Bring the stock of the item with this SKU to the given level \
                by recording a quantity adjustment, optionally in one warehouse."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sku": {
                        "type": "string",
                        "description": "Item SKU, spaces and punctuation allowed"
                    },
                    "quantity": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Target stock level"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Adjustment reason (default: \"Stock update via API\")"
                    },
                    "warehouse_name": {
                        "type": "string",
                        "description": "Warehouse to adjust; the item total when omitted"
                    }
                },
                "required": ["sku", "quantity"]
            }),
        },
    ]
}
