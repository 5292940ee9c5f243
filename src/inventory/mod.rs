//! Resource resolution and tool dispatch over the inventory client

pub mod dispatcher;
pub mod resolver;

pub use dispatcher::{
    AdjustmentOutcome, SkuStockRequest, StockTarget, StockUpdateOutcome, ToolDispatcher,
    UpdateStockRequest,
};
pub use resolver::{ResourceResolver, StockQuery};
