use chrono::Utc;
use depot_catalog::Product;
use depot_core::error::{DomainError, DomainResult};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Order, OrderLineItem};
use crate::pricing;

/// Mutations over an order's line item set. All three operations check
/// the terminal-state guard, keep the per-order product uniqueness and
/// non-empty invariants, and leave `order.total` equal to the sum of
/// subtotals. Persistence mirrors the mutated aggregate afterwards,
/// inside the calling operation's transaction.
pub struct LineItemManager;

impl LineItemManager {
    /// Add `product` to the order. The unit price is the caller-supplied
    /// value when present, else the product's current catalog price.
    pub fn add_item(
        order: &mut Order,
        product: &Product,
        quantity: i32,
        unit_price: Option<Decimal>,
    ) -> DomainResult<OrderLineItem> {
        order.ensure_mutable()?;

        if order.has_product(product.id) {
            return Err(DomainError::conflict(format!(
                "product {} is already part of this order",
                product.name
            )));
        }

        let unit_price = resolve_unit_price(product, unit_price)?;
        let priced = pricing::price_line(unit_price, quantity, product.cost_price)?;

        let item = OrderLineItem {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price,
            cost_price: priced.cost_price,
            profit: priced.profit,
            subtotal: priced.subtotal,
            created_at: Utc::now(),
        };

        order.items.push(item.clone());
        order.recompute_total();
        Ok(item)
    }

    /// Re-price an existing item, merging the new quantity and/or unit
    /// price over the stored values. `cost_price` is the product's
    /// current catalog cost, re-snapshotted at update time.
    pub fn update_item(
        order: &mut Order,
        item_id: Uuid,
        quantity: Option<i32>,
        unit_price: Option<Decimal>,
        cost_price: Option<Decimal>,
    ) -> DomainResult<OrderLineItem> {
        order.ensure_mutable()?;

        let position = order
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| DomainError::not_found("line item not found in this order"))?;

        let quantity = quantity.unwrap_or(order.items[position].quantity);
        let unit_price = unit_price.unwrap_or(order.items[position].unit_price);
        let priced = pricing::price_line(unit_price, quantity, cost_price)?;

        let item = &mut order.items[position];
        item.quantity = quantity;
        item.unit_price = unit_price;
        item.cost_price = priced.cost_price;
        item.profit = priced.profit;
        item.subtotal = priced.subtotal;
        let updated = item.clone();

        order.recompute_total();
        Ok(updated)
    }

    /// Remove an item. The last remaining item can never be removed: an
    /// order holds at least one line item for its whole life.
    pub fn remove_item(order: &mut Order, item_id: Uuid) -> DomainResult<OrderLineItem> {
        order.ensure_mutable()?;

        if order.items.len() <= 1 {
            return Err(DomainError::validation(
                "cannot remove the last line item of an order",
            ));
        }

        let position = order
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| DomainError::not_found("line item not found in this order"))?;

        let removed = order.items.remove(position);
        order.recompute_total();
        Ok(removed)
    }
}

fn resolve_unit_price(product: &Product, requested: Option<Decimal>) -> DomainResult<Decimal> {
    let price = requested.or(product.price).unwrap_or(Decimal::ZERO);
    if price <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "invalid price for product {}",
            product.name
        )));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product(name: &str, price: Option<Decimal>, cost: Option<Decimal>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: format!("P-{name}"),
            price,
            cost_price: cost,
            unit: None,
            notes: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn empty_order() -> Order {
        Order {
            id: Uuid::new_v4(),
            code: "ORD-2025-00001".to_string(),
            customer_id: Uuid::new_v4(),
            address_id: None,
            seller_id: None,
            delivery_date: None,
            notes: None,
            total: Decimal::ZERO,
            status: OrderStatus::Pending,
            is_paid: false,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_item_uses_catalog_price_when_none_given() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);

        let item = LineItemManager::add_item(&mut order, &coffee, 2, None).unwrap();
        assert_eq!(item.unit_price, dec!(10.00));
        assert_eq!(item.subtotal, dec!(20.00));
        assert_eq!(order.total, dec!(20.00));
    }

    #[test]
    fn add_item_prefers_caller_price() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);

        let item =
            LineItemManager::add_item(&mut order, &coffee, 1, Some(dec!(12.50))).unwrap();
        assert_eq!(item.unit_price, dec!(12.50));
        assert_eq!(order.total, dec!(12.50));
    }

    #[test]
    fn add_item_snapshots_cost_and_profit() {
        let mut order = empty_order();
        let beans = product("Beans", Some(dec!(20.00)), Some(dec!(12.00)));

        let item = LineItemManager::add_item(&mut order, &beans, 3, None).unwrap();
        assert_eq!(item.cost_price, Some(dec!(12.00)));
        assert_eq!(item.profit, Some(dec!(24.00)));
        assert_eq!(item.subtotal, dec!(60.00));
    }

    #[test]
    fn duplicate_product_is_a_conflict_and_leaves_order_unchanged() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);

        LineItemManager::add_item(&mut order, &coffee, 2, None).unwrap();
        let before_total = order.total;
        let before_count = order.items.len();

        let err = LineItemManager::add_item(&mut order, &coffee, 1, None).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(order.total, before_total);
        assert_eq!(order.items.len(), before_count);
    }

    #[test]
    fn add_item_rejects_unpriceable_product() {
        let mut order = empty_order();
        let unpriced = product("Mystery", None, None);

        let err = LineItemManager::add_item(&mut order, &unpriced, 1, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(order.items.is_empty());
    }

    #[test]
    fn update_item_merges_partial_changes_and_recomputes_total() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);
        let tea = product("Tea", Some(dec!(5.00)), None);

        let item = LineItemManager::add_item(&mut order, &coffee, 2, None).unwrap();
        LineItemManager::add_item(&mut order, &tea, 1, None).unwrap();
        assert_eq!(order.total, dec!(25.00));

        // Quantity only; unit price carries over.
        let updated =
            LineItemManager::update_item(&mut order, item.id, Some(3), None, None).unwrap();
        assert_eq!(updated.unit_price, dec!(10.00));
        assert_eq!(updated.subtotal, dec!(30.00));
        assert_eq!(order.total, dec!(35.00));

        // Price only; quantity carries over.
        let updated =
            LineItemManager::update_item(&mut order, item.id, None, Some(dec!(9.00)), None)
                .unwrap();
        assert_eq!(updated.quantity, 3);
        assert_eq!(updated.subtotal, dec!(27.00));
        assert_eq!(order.total, dec!(32.00));
    }

    #[test]
    fn update_item_refreshes_cost_snapshot() {
        let mut order = empty_order();
        let beans = product("Beans", Some(dec!(20.00)), Some(dec!(12.00)));
        let item = LineItemManager::add_item(&mut order, &beans, 1, None).unwrap();

        let updated = LineItemManager::update_item(
            &mut order,
            item.id,
            Some(2),
            None,
            Some(dec!(14.00)),
        )
        .unwrap();
        assert_eq!(updated.cost_price, Some(dec!(14.00)));
        assert_eq!(updated.profit, Some(dec!(12.00)));
    }

    #[test]
    fn update_unknown_item_is_not_found() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);
        LineItemManager::add_item(&mut order, &coffee, 1, None).unwrap();

        let err = LineItemManager::update_item(&mut order, Uuid::new_v4(), Some(2), None, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn update_item_rejects_bad_quantity() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);
        let item = LineItemManager::add_item(&mut order, &coffee, 1, None).unwrap();

        let err = LineItemManager::update_item(&mut order, item.id, Some(0), None, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        // Aggregate untouched on failure.
        assert_eq!(order.items[0].quantity, 1);
        assert_eq!(order.total, dec!(10.00));
    }

    #[test]
    fn remove_item_recomputes_total() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);
        let tea = product("Tea", Some(dec!(5.00)), None);

        let first = LineItemManager::add_item(&mut order, &coffee, 2, None).unwrap();
        LineItemManager::add_item(&mut order, &tea, 1, None).unwrap();

        let removed = LineItemManager::remove_item(&mut order, first.id).unwrap();
        assert_eq!(removed.product_name, "Coffee");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total, dec!(5.00));
    }

    #[test]
    fn last_item_cannot_be_removed() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);
        let item = LineItemManager::add_item(&mut order, &coffee, 1, None).unwrap();

        let err = LineItemManager::remove_item(&mut order, item.id).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total, dec!(10.00));
    }

    #[test]
    fn terminal_order_rejects_every_item_mutation() {
        let mut order = empty_order();
        let coffee = product("Coffee", Some(dec!(10.00)), None);
        let tea = product("Tea", Some(dec!(5.00)), None);
        let item = LineItemManager::add_item(&mut order, &coffee, 2, None).unwrap();
        LineItemManager::add_item(&mut order, &tea, 1, None).unwrap();

        for status in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            order.status = status;
            let snapshot_total = order.total;

            let extra = product("Sugar", Some(dec!(2.00)), None);
            assert!(matches!(
                LineItemManager::add_item(&mut order, &extra, 1, None),
                Err(DomainError::InvalidState(_))
            ));
            assert!(matches!(
                LineItemManager::update_item(&mut order, item.id, Some(5), None, None),
                Err(DomainError::InvalidState(_))
            ));
            assert!(matches!(
                LineItemManager::remove_item(&mut order, item.id),
                Err(DomainError::InvalidState(_))
            ));
            assert_eq!(order.total, snapshot_total);
            assert_eq!(order.items.len(), 2);
        }
    }
}
