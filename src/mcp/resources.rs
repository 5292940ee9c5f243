//! `inventory://` resource addressing

use std::fmt;

use crate::error::{InventoryError, Result};
use crate::inventory::StockQuery;

use super::protocol::{ResourceInfo, ResourceTemplateInfo};

pub const SCHEME: &str = "inventory://";
pub const MIME_JSON: &str = "application/json";

/// A parsed resource URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryResource {
    Stock(StockQuery),
    AllItems,
    AllWarehouses,
    Warehouse(String),
}

impl InventoryResource {
    /// Parse an `inventory://` URI, percent-decoding the path segment
    ///
    /// `inventory://sku/LED%20Strip` and `inventory://sku/LED Strip` address
    /// the same resource.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| InventoryError::NotFound(format!("Unknown resource: {}", uri)))?;

        let (kind, arg) = match rest.split_once('/') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (rest, None),
        };

        match (kind, arg) {
            ("all", None | Some("")) => Ok(InventoryResource::AllItems),
            ("warehouses", None | Some("")) => Ok(InventoryResource::AllWarehouses),
            ("stock", Some(arg)) => Ok(InventoryResource::Stock(StockQuery::ByName(decode(arg, "Item name")?))),
            ("sku", Some(arg)) => Ok(InventoryResource::Stock(StockQuery::BySku(decode(arg, "SKU")?))),
            ("warehouse", Some(arg)) => Ok(InventoryResource::Warehouse(decode(arg, "Warehouse")?)),
            ("stock" | "sku" | "warehouse", None) => Err(InventoryError::invalid(format!(
                "Resource {} needs a value after '{}/'",
                uri, kind
            ))),
            _ => Err(InventoryError::NotFound(format!("Unknown resource: {}", uri))),
        }
    }
}

fn decode(raw: &str, what: &str) -> Result<String> {
    let decoded = urlencoding::decode(raw)
        .map_err(|e| InventoryError::invalid(format!("{} is not valid UTF-8: {}", what, e)))?;
    if decoded.trim().is_empty() {
        return Err(InventoryError::invalid(format!("{} cannot be empty", what)));
    }
    Ok(decoded.into_owned())
}

impl fmt::Display for InventoryResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryResource::Stock(StockQuery::ByName(name)) => {
                write!(f, "{}stock/{}", SCHEME, urlencoding::encode(name))
            }
            InventoryResource::Stock(StockQuery::BySku(sku)) => {
                write!(f, "{}sku/{}", SCHEME, urlencoding::encode(sku))
            }
            InventoryResource::AllItems => write!(f, "{}all", SCHEME),
            InventoryResource::AllWarehouses => write!(f, "{}warehouses", SCHEME),
            InventoryResource::Warehouse(key) => {
                write!(f, "{}warehouse/{}", SCHEME, urlencoding::encode(key))
            }
        }
    }
}

/// Fixed resources for `resources/list`
pub fn resource_list() -> Vec<ResourceInfo> {
    vec![
        ResourceInfo {
            uri: InventoryResource::AllItems.to_string(),
            name: "all-items".to_string(),
            description: "Every inventory item with its stock on hand".to_string(),
            mime_type: MIME_JSON.to_string(),
        },
        ResourceInfo {
            uri: InventoryResource::AllWarehouses.to_string(),
            name: "all-warehouses".to_string(),
            description: "Every warehouse of the organization".to_string(),
            mime_type: MIME_JSON.to_string(),
        },
    ]
}

/// Parameterized resources for `resources/templates/list`
pub fn template_list() -> Vec<ResourceTemplateInfo> {
    let template = |uri: &str, name: &str, description: &str| ResourceTemplateInfo {
        uri_template: uri.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        mime_type: MIME_JSON.to_string(),
    };
    vec![
        template(
            "inventory://stock/{item_name}",
            "item-stock",
            "Stock per warehouse for every item with this name",
        ),
        template(
            "inventory://sku/{sku}",
            "item-by-sku",
            "Stock per warehouse for the item with this SKU",
        ),
        template(
            "inventory://warehouse/{id_or_name}",
            "warehouse",
            "A single warehouse, addressed by id or exact name",
        ),
    ]
}
