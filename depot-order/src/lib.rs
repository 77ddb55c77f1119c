pub mod code;
pub mod items;
pub mod models;
pub mod pricing;

pub use items::LineItemManager;
pub use models::{Order, OrderLineItem, OrderStatus, StatusHistoryEntry};
pub use pricing::LinePricing;
