//! The Order Lifecycle Service: the only mutation surface over orders,
//! line items and status history.
//!
//! Every operation runs as one transaction. The order row is locked
//! (`FOR UPDATE`) before any read-modify-write, the authorization policy
//! is consulted before any write, and a failed validation rolls the whole
//! transaction back - nothing partial is ever visible.

use chrono::{Datelike, NaiveDate, Utc};
use depot_core::authz::{ensure_can_act, OrderOp};
use depot_core::error::{DomainError, DomainResult};
use depot_core::identity::{Actor, Role};
use depot_order::items::LineItemManager;
use depot_order::models::{Order, OrderStatus, StatusHistoryEntry};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::database::DbClient;
use crate::{lookups, order_repo, storage_failure};

/// Attempts at allocating a unique order code before giving up. The
/// advisory lock makes collisions all but impossible; the loop exists for
/// codes inserted outside this service.
const CODE_ALLOCATION_ATTEMPTS: u32 = 3;

/// One product line of a new order, or a line added later.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Overrides the catalog price when present.
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub delivery_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<NewLineItem>,
}

/// Partial header update; absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateOrder {
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub address_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub delivery_date: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    /// Matches order code, customer name or customer email.
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub data: Vec<Order>,
    pub meta: PageMeta,
}

enum CreateAttempt {
    CodeConflict,
    Failed(DomainError),
}

impl From<DomainError> for CreateAttempt {
    fn from(err: DomainError) -> Self {
        CreateAttempt::Failed(err)
    }
}

pub struct OrderLifecycleService {
    db: DbClient,
}

impl OrderLifecycleService {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    /// Create an order with its first line items and the initial history
    /// entry, atomically.
    pub async fn create(&self, req: CreateOrder, actor: &Actor) -> DomainResult<Order> {
        validate_new_order(&req)?;

        // Pre-flight check against the pool; redone inside the
        // transaction where it actually counts.
        {
            let mut conn = self
                .db
                .pool
                .acquire()
                .await
                .map_err(|err| storage_failure("create order", &err))?;
            if lookups::address_for_customer(&mut conn, req.address_id, req.customer_id)
                .await?
                .is_none()
            {
                return Err(address_mismatch());
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_create(&req, actor).await {
                Ok(order) => return Ok(order),
                Err(CreateAttempt::CodeConflict) if attempt < CODE_ALLOCATION_ATTEMPTS => {
                    tracing::warn!(attempt, "order code collision, retrying allocation");
                }
                Err(CreateAttempt::CodeConflict) => {
                    return Err(DomainError::conflict(
                        "could not allocate a unique order code",
                    ));
                }
                Err(CreateAttempt::Failed(err)) => return Err(err),
            }
        }
    }

    async fn try_create(&self, req: &CreateOrder, actor: &Actor) -> Result<Order, CreateAttempt> {
        let mut tx = self
            .db
            .pool
            .begin()
            .await
            .map_err(|err| storage_failure("create order", &err))?;

        // Everything below reads the transactional view, closing the
        // race against concurrent customer/address/product edits.
        let customer = lookups::customer_by_id(&mut tx, req.customer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("customer not found"))?;
        ensure_can_act(actor, customer.seller_id, OrderOp::Create)?;

        let address = lookups::address_for_customer(&mut tx, req.address_id, customer.id)
            .await?
            .ok_or_else(address_mismatch)?;

        let code = order_repo::allocate_code(&mut tx, Utc::now().year()).await?;

        let mut order = Order {
            id: Uuid::new_v4(),
            code,
            customer_id: customer.id,
            address_id: Some(address.id),
            seller_id: Some(actor.id),
            delivery_date: Some(req.delivery_date),
            notes: req.notes.clone(),
            total: Decimal::ZERO,
            status: OrderStatus::Pending,
            is_paid: false,
            items: Vec::new(),
            created_at: Utc::now(),
        };

        for line in &req.items {
            let product = lookups::active_product_by_id(&mut tx, line.product_id)
                .await?
                .ok_or_else(|| {
                    DomainError::not_found(format!(
                        "product {} not found or inactive",
                        line.product_id
                    ))
                })?;
            LineItemManager::add_item(&mut order, &product, line.quantity, line.unit_price)?;
        }

        if order.total <= Decimal::ZERO {
            return Err(
                DomainError::validation("order total must be greater than zero").into(),
            );
        }

        if let Err(err) = order_repo::insert_order(&mut tx, &order).await {
            if order_repo::is_code_conflict(&err) {
                return Err(CreateAttempt::CodeConflict);
            }
            return Err(storage_failure("create order", &err).into());
        }

        order_repo::record_history(
            &mut tx,
            order.id,
            order.status,
            Some(actor.id),
            "Order created",
        )
        .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("create order", &err))?;

        tracing::info!(order_id = %order.id, code = %order.code, "order created");
        Ok(self.hydrate(order.id).await?)
    }

    /// Update header fields (delivery date, notes, delivery address).
    pub async fn update(
        &self,
        order_id: Uuid,
        req: UpdateOrder,
        actor: &Actor,
    ) -> DomainResult<Order> {
        if let Some(notes) = &req.notes {
            if notes.trim().is_empty() {
                return Err(DomainError::validation("notes cannot be blank"));
            }
        }
        if let Some(date) = req.delivery_date {
            ensure_not_past(date)?;
        }

        let mut tx = self.begin(order_id, "update order").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::Update)?;
        order.ensure_mutable()?;

        let mut changes: Vec<String> = Vec::new();
        if let Some(date) = req.delivery_date {
            order.delivery_date = Some(date);
            changes.push(format!("new delivery date: {date}"));
        }
        if let Some(address_id) = req.address_id {
            let address =
                lookups::address_for_customer(&mut tx, address_id, order.customer_id)
                    .await?
                    .ok_or_else(address_mismatch)?;
            order.address_id = Some(address.id);
            changes.push("delivery address updated".to_string());
        }
        if let Some(notes) = req.notes {
            changes.push(format!("notes: {notes}"));
            order.notes = Some(notes);
        }

        order_repo::update_header(&mut tx, &order).await?;

        if !changes.is_empty() {
            let note = format!("Order updated - {}", changes.join(" - "));
            order_repo::record_history(&mut tx, order.id, order.status, Some(actor.id), &note)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|err| storage_failure("update order", &err))?;
        self.hydrate(order_id).await
    }

    /// Cancel the order. Cancellation is a terminal status, not a row
    /// deletion; the order and its history stay queryable forever.
    pub async fn cancel(&self, order_id: Uuid, actor: &Actor) -> DomainResult<()> {
        let mut tx = self.begin(order_id, "cancel order").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::Cancel)?;

        if order.status == OrderStatus::Delivered {
            return Err(DomainError::invalid_state(
                "a delivered order cannot be cancelled",
            ));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(DomainError::invalid_state("order is already cancelled"));
        }

        order.status = OrderStatus::Cancelled;
        order_repo::update_header(&mut tx, &order).await?;

        let by = match actor.role {
            Role::Admin => "administrator",
            Role::Seller => "seller",
        };
        order_repo::record_history(
            &mut tx,
            order.id,
            order.status,
            Some(actor.id),
            &format!("Order cancelled by {by}"),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("cancel order", &err))?;
        tracing::info!(order_id = %order_id, "order cancelled");
        Ok(())
    }

    /// Move the order to `new_status`. Terminal orders are immutable;
    /// intermediate ordering is left to the back office.
    pub async fn change_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        notes: Option<String>,
        actor: &Actor,
    ) -> DomainResult<Order> {
        let mut tx = self.begin(order_id, "change order status").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::ChangeStatus)?;
        order.ensure_mutable()?;

        let previous = order.status;
        order.status = new_status;
        order_repo::update_header(&mut tx, &order).await?;

        let note = notes
            .unwrap_or_else(|| format!("Status changed from {previous} to {new_status}"));
        order_repo::record_history(&mut tx, order.id, order.status, Some(actor.id), &note)
            .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("change order status", &err))?;
        tracing::info!(order_id = %order_id, from = %previous, to = %new_status, "order status changed");
        self.hydrate(order_id).await
    }

    /// Flip the payment flag. Always leaves a history entry, carrying
    /// the unchanged status.
    pub async fn update_payment(
        &self,
        order_id: Uuid,
        is_paid: bool,
        notes: Option<String>,
        actor: &Actor,
    ) -> DomainResult<Order> {
        let mut tx = self.begin(order_id, "update payment status").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::UpdatePayment)?;
        order.ensure_mutable()?;

        order.is_paid = is_paid;
        order_repo::update_header(&mut tx, &order).await?;

        let note = notes.unwrap_or_else(|| {
            format!(
                "Payment status changed to: {}",
                if is_paid { "paid" } else { "not paid" }
            )
        });
        order_repo::record_history(&mut tx, order.id, order.status, Some(actor.id), &note)
            .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("update payment status", &err))?;
        self.hydrate(order_id).await
    }

    /// Add a product to an existing order.
    pub async fn add_item(
        &self,
        order_id: Uuid,
        line: NewLineItem,
        actor: &Actor,
    ) -> DomainResult<Order> {
        let mut tx = self.begin(order_id, "add line item").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::AddItem)?;
        order.ensure_mutable()?;

        let product = lookups::active_product_by_id(&mut tx, line.product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product not found or inactive"))?;

        let item = LineItemManager::add_item(&mut order, &product, line.quantity, line.unit_price)?;

        order_repo::insert_item(&mut tx, &item).await?;
        order_repo::update_total(&mut tx, order.id, order.total).await?;
        order_repo::record_history(
            &mut tx,
            order.id,
            order.status,
            Some(actor.id),
            &format!("Product added: {} (x{})", item.product_name, item.quantity),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("add line item", &err))?;
        self.hydrate(order_id).await
    }

    /// Re-price an existing line item with a new quantity and/or unit
    /// price. The cost snapshot is refreshed from the catalog.
    pub async fn update_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        quantity: Option<i32>,
        unit_price: Option<Decimal>,
        actor: &Actor,
    ) -> DomainResult<Order> {
        let mut tx = self.begin(order_id, "update line item").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::UpdateItem)?;
        order.ensure_mutable()?;

        let product_id = order
            .item(item_id)
            .ok_or_else(|| DomainError::not_found("line item not found in this order"))?
            .product_id;
        let cost_price = lookups::product_by_id(&mut tx, product_id)
            .await?
            .and_then(|product| product.cost_price);

        let item =
            LineItemManager::update_item(&mut order, item_id, quantity, unit_price, cost_price)?;

        order_repo::update_item(&mut tx, &item).await?;
        order_repo::update_total(&mut tx, order.id, order.total).await?;
        order_repo::record_history(
            &mut tx,
            order.id,
            order.status,
            Some(actor.id),
            &format!("Product updated: {}", item.product_name),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("update line item", &err))?;
        self.hydrate(order_id).await
    }

    /// Remove a line item. The last remaining item can never be removed.
    pub async fn remove_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        actor: &Actor,
    ) -> DomainResult<Order> {
        let mut tx = self.begin(order_id, "remove line item").await?;
        let mut order = self.locked(&mut tx, order_id).await?;
        ensure_can_act(actor, order.seller_id, OrderOp::RemoveItem)?;
        order.ensure_mutable()?;

        let removed = LineItemManager::remove_item(&mut order, item_id)?;

        order_repo::delete_item(&mut tx, removed.id).await?;
        order_repo::update_total(&mut tx, order.id, order.total).await?;
        order_repo::record_history(
            &mut tx,
            order.id,
            order.status,
            Some(actor.id),
            &format!("Product removed: {}", removed.product_name),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|err| storage_failure("remove line item", &err))?;
        self.hydrate(order_id).await
    }

    /// Load one order. Sellers may only see orders they created.
    pub async fn get(&self, order_id: Uuid, actor: &Actor) -> DomainResult<Order> {
        let mut conn = self
            .db
            .pool
            .acquire()
            .await
            .map_err(|err| storage_failure("load order", &err))?;
        let order = order_repo::fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order not found"))?;
        ensure_can_act(actor, order.seller_id, OrderOp::View)?;
        Ok(order)
    }

    /// Filtered, paginated listing. Sellers are scoped to the customers
    /// they own; admins see everything.
    pub async fn list(&self, filter: OrderFilter, actor: &Actor) -> DomainResult<OrderPage> {
        // Listing is scoped to the caller's own book, so the caller is
        // the owner for policy purposes.
        ensure_can_act(actor, Some(actor.id), OrderOp::View)?;

        let seller_scope = match actor.role {
            Role::Admin => None,
            Role::Seller => Some(actor.id),
        };
        let limit = filter.limit.clamp(1, 100);
        let page = filter.page.max(1);
        let offset = (page - 1) * limit;

        let mut conn = self
            .db
            .pool
            .acquire()
            .await
            .map_err(|err| storage_failure("list orders", &err))?;
        let (orders, total_items) =
            order_repo::search_orders(&mut conn, &filter, seller_scope, limit, offset).await?;

        let total_pages = (total_items + limit - 1) / limit;
        Ok(OrderPage {
            data: orders,
            meta: PageMeta {
                page,
                limit,
                total_pages,
                total_items,
                has_next_page: page < total_pages,
                has_prev_page: page > 1,
            },
        })
    }

    /// Audit trail for one order, newest entry first.
    pub async fn history(
        &self,
        order_id: Uuid,
        actor: &Actor,
    ) -> DomainResult<Vec<StatusHistoryEntry>> {
        let mut conn = self
            .db
            .pool
            .acquire()
            .await
            .map_err(|err| storage_failure("load status history", &err))?;
        let order = order_repo::fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order not found"))?;
        ensure_can_act(actor, order.seller_id, OrderOp::View)?;

        order_repo::fetch_history(&mut conn, order_id).await
    }

    async fn begin(
        &self,
        order_id: Uuid,
        operation: &str,
    ) -> DomainResult<sqlx::Transaction<'_, sqlx::Postgres>> {
        self.db.pool.begin().await.map_err(|err| {
            tracing::error!(error = %err, %order_id, operation, "failed to open transaction");
            DomainError::internal(format!("{operation} failed unexpectedly"))
        })
    }

    async fn locked(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
    ) -> DomainResult<Order> {
        order_repo::lock_order(tx, order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order not found"))
    }

    async fn hydrate(&self, order_id: Uuid) -> DomainResult<Order> {
        let mut conn = self
            .db
            .pool
            .acquire()
            .await
            .map_err(|err| storage_failure("load order", &err))?;
        order_repo::fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| DomainError::internal("failed to load order after write"))
    }
}

fn address_mismatch() -> DomainError {
    DomainError::validation("address does not belong to the customer or does not exist")
}

fn ensure_not_past(date: NaiveDate) -> DomainResult<()> {
    if date < Utc::now().date_naive() {
        return Err(DomainError::validation(
            "delivery date cannot be in the past",
        ));
    }
    Ok(())
}

fn validate_new_order(req: &CreateOrder) -> DomainResult<()> {
    if req.items.is_empty() {
        return Err(DomainError::validation(
            "order must contain at least one product",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for line in &req.items {
        if !seen.insert(line.product_id) {
            return Err(DomainError::validation(
                "duplicate products are not allowed in one order",
            ));
        }
        if line.quantity <= 0 {
            return Err(DomainError::validation(
                "quantity must be greater than zero",
            ));
        }
    }

    ensure_not_past(req.delivery_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid_request() -> CreateOrder {
        CreateOrder {
            customer_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            delivery_date: Utc::now().date_naive(),
            notes: None,
            items: vec![NewLineItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: None,
            }],
        }
    }

    #[test]
    fn accepts_a_well_formed_request() {
        assert!(validate_new_order(&valid_request()).is_ok());
    }

    #[test]
    fn rejects_empty_item_list() {
        let mut req = valid_request();
        req.items.clear();
        assert!(matches!(
            validate_new_order(&req),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_duplicate_products() {
        let mut req = valid_request();
        let duplicate = req.items[0].clone();
        req.items.push(duplicate);
        assert!(matches!(
            validate_new_order(&req),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let mut req = valid_request();
        req.items[0].quantity = 0;
        assert!(matches!(
            validate_new_order(&req),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_past_delivery_date() {
        let mut req = valid_request();
        req.delivery_date = Utc::now().date_naive() - Duration::days(1);
        assert!(matches!(
            validate_new_order(&req),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn today_is_a_valid_delivery_date() {
        assert!(ensure_not_past(Utc::now().date_naive()).is_ok());
        assert!(ensure_not_past(Utc::now().date_naive() + Duration::days(30)).is_ok());
    }
}
