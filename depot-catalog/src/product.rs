use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog product. The order engine only ever reads these; the catalog
/// itself is maintained elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    /// Current catalog price. Orders snapshot it at pricing time, so later
    /// catalog edits never rewrite an existing line item.
    pub price: Option<Decimal>,
    /// Purchase cost, when known. Feeds the per-line profit snapshot.
    pub cost_price: Option<Decimal>,
    /// Sales unit, e.g. "kg" or "box".
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
