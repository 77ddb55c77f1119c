use chrono::{DateTime, NaiveDate, Utc};
use depot_core::error::{DomainError, DomainResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status lifecycle. `Delivered` and `Cancelled` are terminal: an
/// order in either state accepts no further mutation of any kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    InPreparation,
    ReadyForDelivery,
    InDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::InPreparation => "in_preparation",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "in_preparation" => Ok(OrderStatus::InPreparation),
            "ready_for_delivery" => Ok(OrderStatus::ReadyForDelivery),
            "in_delivery" => Ok(OrderStatus::InDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order aggregate: header plus its line items. Status history is
/// loaded separately, it is only read for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-readable code, e.g. `ORD-2025-00042`. Unique, immutable.
    pub code: String,
    pub customer_id: Uuid,
    pub address_id: Option<Uuid>,
    /// The seller who created the order. Null once that user is removed.
    pub seller_id: Option<Uuid>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Always equals the sum of the line items' subtotals.
    pub total: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub items: Vec<OrderLineItem>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Re-derive `total` from the current item set.
    pub fn recompute_total(&mut self) {
        self.total = self.items.iter().map(|item| item.subtotal).sum();
    }

    pub fn item(&self, item_id: Uuid) -> Option<&OrderLineItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn has_product(&self, product_id: Uuid) -> bool {
        self.items.iter().any(|item| item.product_id == product_id)
    }

    /// Terminal orders are immutable; every mutating operation calls this
    /// first.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            Err(DomainError::invalid_state(format!(
                "order {} is {} and can no longer be modified",
                self.code, self.status
            )))
        } else {
            Ok(())
        }
    }
}

/// One product on an order. At most one line item per (order, product).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// Snapshot of the product name at pricing time, kept so the audit
    /// trail stays readable after catalog renames.
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Catalog cost at the moment of pricing, when the catalog knew it.
    pub cost_price: Option<Decimal>,
    /// `(unit_price - cost_price) * quantity`, stored alongside the cost
    /// snapshot. Absent whenever `cost_price` is.
    pub profit: Option<Decimal>,
    /// `unit_price * quantity`, rounded to 2 decimals.
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry. Written on creation and on every status,
/// payment or material change; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    /// The order's status at the time of the entry - not necessarily a
    /// status *change* (payment and item edits record the unchanged one).
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub actor_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_with_subtotals(subtotals: &[Decimal]) -> Order {
        let order_id = Uuid::new_v4();
        let items = subtotals
            .iter()
            .map(|subtotal| OrderLineItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: Uuid::new_v4(),
                product_name: "Test product".to_string(),
                quantity: 1,
                unit_price: *subtotal,
                cost_price: None,
                profit: None,
                subtotal: *subtotal,
                created_at: Utc::now(),
            })
            .collect();
        Order {
            id: order_id,
            code: "ORD-2025-00001".to_string(),
            customer_id: Uuid::new_v4(),
            address_id: None,
            seller_id: None,
            delivery_date: None,
            notes: None,
            total: Decimal::ZERO,
            status: OrderStatus::Pending,
            is_paid: false,
            items,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn total_is_sum_of_item_subtotals() {
        let mut order = order_with_subtotals(&[dec!(20.00), dec!(5.00)]);
        order.recompute_total();
        assert_eq!(order.total, dec!(25.00));
    }

    #[test]
    fn terminal_states_reject_mutation() {
        let mut order = order_with_subtotals(&[dec!(10.00)]);
        order.status = OrderStatus::Delivered;
        assert!(matches!(
            order.ensure_mutable(),
            Err(DomainError::InvalidState(_))
        ));

        order.status = OrderStatus::Cancelled;
        assert!(matches!(
            order.ensure_mutable(),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn non_terminal_states_allow_mutation() {
        let mut order = order_with_subtotals(&[dec!(10.00)]);
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::InPreparation,
            OrderStatus::ReadyForDelivery,
            OrderStatus::InDelivery,
        ] {
            order.status = status;
            assert!(order.ensure_mutable().is_ok(), "{status} should be mutable");
        }
    }

    #[test]
    fn status_round_trips_through_wire_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::InPreparation,
            OrderStatus::ReadyForDelivery,
            OrderStatus::InDelivery,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }
}
