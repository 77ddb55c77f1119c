//! Row-level persistence for the three tables this engine owns: orders,
//! order line items and the append-only status history.
//!
//! Functions take an explicit `&mut PgConnection`; mutating operations
//! are always called with a transaction's connection, never a pooled one,
//! so nothing here commits on its own.

use chrono::{DateTime, NaiveDate, Utc};
use depot_core::error::{DomainError, DomainResult};
use depot_order::code::next_code;
use depot_order::models::{Order, OrderLineItem, OrderStatus, StatusHistoryEntry};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::service::OrderFilter;
use crate::storage_failure;

/// Lock class for per-year order code allocation; paired with the year in
/// `pg_advisory_xact_lock(class, year)`.
const CODE_ALLOCATION_LOCK_CLASS: i32 = 4001;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    code: String,
    customer_id: Uuid,
    address_id: Option<Uuid>,
    seller_id: Option<Uuid>,
    delivery_date: Option<NaiveDate>,
    notes: Option<String>,
    total: Decimal,
    status: String,
    is_paid: bool,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderLineItem>) -> DomainResult<Order> {
        let status: OrderStatus = self.status.parse().map_err(|_| {
            DomainError::internal(format!("order {} carries an unknown status", self.id))
        })?;
        Ok(Order {
            id: self.id,
            code: self.code,
            customer_id: self.customer_id,
            address_id: self.address_id,
            seller_id: self.seller_id,
            delivery_date: self.delivery_date,
            notes: self.notes,
            total: self.total,
            status,
            is_paid: self.is_paid,
            items,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    cost_price: Option<Decimal>,
    profit: Option<Decimal>,
    subtotal: Decimal,
    created_at: DateTime<Utc>,
}

impl From<LineItemRow> for OrderLineItem {
    fn from(row: LineItemRow) -> Self {
        OrderLineItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            cost_price: row.cost_price,
            profit: row.profit,
            subtotal: row.subtotal,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    order_id: Uuid,
    status: String,
    notes: Option<String>,
    actor_id: Option<Uuid>,
    recorded_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> DomainResult<StatusHistoryEntry> {
        let status: OrderStatus = self.status.parse().map_err(|_| {
            DomainError::internal(format!(
                "history entry {} carries an unknown status",
                self.id
            ))
        })?;
        Ok(StatusHistoryEntry {
            id: self.id,
            order_id: self.order_id,
            status,
            notes: self.notes,
            actor_id: self.actor_id,
            recorded_at: self.recorded_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, code, customer_id, address_id, seller_id, delivery_date, \
                             notes, total, status, is_paid, created_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unit_price, \
                            cost_price, profit, subtotal, created_at";

/// Load the aggregate (header + items) without locking.
pub async fn fetch_order(conn: &mut PgConnection, id: Uuid) -> DomainResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|err| storage_failure("load order", &err))?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, id).await?;
            row.into_order(items).map(Some)
        }
        None => Ok(None),
    }
}

/// Load the aggregate with the order row locked (`FOR UPDATE`) for the
/// rest of the transaction. Every mutating operation goes through this,
/// so two concurrent item mutations on the same order serialize and the
/// total recompute never loses an update.
pub async fn lock_order(conn: &mut PgConnection, id: Uuid) -> DomainResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|err| storage_failure("lock order", &err))?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, id).await?;
            row.into_order(items).map(Some)
        }
        None => Ok(None),
    }
}

async fn fetch_items(conn: &mut PgConnection, order_id: Uuid) -> DomainResult<Vec<OrderLineItem>> {
    let rows = sqlx::query_as::<_, LineItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_line_items WHERE order_id = $1 ORDER BY created_at, id"
    ))
    .bind(order_id)
    .fetch_all(conn)
    .await
    .map_err(|err| storage_failure("load order items", &err))?;

    Ok(rows.into_iter().map(OrderLineItem::from).collect())
}

/// Insert the order header and its line items.
///
/// Returns the raw driver error so the caller can tell an order-code
/// unique violation (retryable) apart from anything else.
pub async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, code, customer_id, address_id, seller_id, delivery_date, \
                             notes, total, status, is_paid, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(order.id)
    .bind(&order.code)
    .bind(order.customer_id)
    .bind(order.address_id)
    .bind(order.seller_id)
    .bind(order.delivery_date)
    .bind(&order.notes)
    .bind(order.total)
    .bind(order.status.as_str())
    .bind(order.is_paid)
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;

    for item in &order.items {
        insert_item_raw(conn, item).await?;
    }

    Ok(())
}

/// True when `err` is the UNIQUE violation of the order code column.
pub fn is_code_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some("orders_code_key"))
}

pub async fn insert_item(conn: &mut PgConnection, item: &OrderLineItem) -> DomainResult<()> {
    insert_item_raw(conn, item)
        .await
        .map_err(|err| storage_failure("insert line item", &err))
}

async fn insert_item_raw(conn: &mut PgConnection, item: &OrderLineItem) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO order_line_items (id, order_id, product_id, product_name, quantity, \
                                       unit_price, cost_price, profit, subtotal, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(item.id)
    .bind(item.order_id)
    .bind(item.product_id)
    .bind(&item.product_name)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.cost_price)
    .bind(item.profit)
    .bind(item.subtotal)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_item(conn: &mut PgConnection, item: &OrderLineItem) -> DomainResult<()> {
    sqlx::query(
        "UPDATE order_line_items \
         SET quantity = $2, unit_price = $3, cost_price = $4, profit = $5, subtotal = $6 \
         WHERE id = $1",
    )
    .bind(item.id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.cost_price)
    .bind(item.profit)
    .bind(item.subtotal)
    .execute(conn)
    .await
    .map_err(|err| storage_failure("update line item", &err))?;
    Ok(())
}

pub async fn delete_item(conn: &mut PgConnection, item_id: Uuid) -> DomainResult<()> {
    sqlx::query("DELETE FROM order_line_items WHERE id = $1")
        .bind(item_id)
        .execute(conn)
        .await
        .map_err(|err| storage_failure("delete line item", &err))?;
    Ok(())
}

/// Persist the mutable header fields. The code, customer and created_at
/// columns are immutable and deliberately absent.
pub async fn update_header(conn: &mut PgConnection, order: &Order) -> DomainResult<()> {
    sqlx::query(
        "UPDATE orders \
         SET address_id = $2, delivery_date = $3, notes = $4, total = $5, status = $6, \
             is_paid = $7 \
         WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.address_id)
    .bind(order.delivery_date)
    .bind(&order.notes)
    .bind(order.total)
    .bind(order.status.as_str())
    .bind(order.is_paid)
    .execute(conn)
    .await
    .map_err(|err| storage_failure("update order", &err))?;
    Ok(())
}

pub async fn update_total(
    conn: &mut PgConnection,
    order_id: Uuid,
    total: Decimal,
) -> DomainResult<()> {
    sqlx::query("UPDATE orders SET total = $2 WHERE id = $1")
        .bind(order_id)
        .bind(total)
        .execute(conn)
        .await
        .map_err(|err| storage_failure("update order total", &err))?;
    Ok(())
}

/// Append one immutable audit entry carrying the order's current status.
/// There is no update or delete counterpart anywhere in this crate.
pub async fn record_history(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
    actor_id: Option<Uuid>,
    notes: &str,
) -> DomainResult<()> {
    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, status, notes, actor_id) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(status.as_str())
    .bind(notes)
    .bind(actor_id)
    .execute(conn)
    .await
    .map_err(|err| storage_failure("record status history", &err))?;
    Ok(())
}

/// History for display: newest first, insertion order breaking ties.
pub async fn fetch_history(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> DomainResult<Vec<StatusHistoryEntry>> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, order_id, status, notes, actor_id, recorded_at \
         FROM order_status_history WHERE order_id = $1 \
         ORDER BY recorded_at DESC, seq DESC",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await
    .map_err(|err| storage_failure("load status history", &err))?;

    rows.into_iter().map(HistoryRow::into_entry).collect()
}

/// Allocate the next order code for `year`.
///
/// Takes a per-year advisory transaction lock first, so concurrent
/// creates serialize their read of the last issued code until commit;
/// the UNIQUE constraint on `orders.code` backstops anything that slips
/// past (e.g. codes inserted out of band), and the service retries on
/// that conflict.
pub async fn allocate_code(conn: &mut PgConnection, year: i32) -> DomainResult<String> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(CODE_ALLOCATION_LOCK_CLASS)
        .bind(year)
        .execute(&mut *conn)
        .await
        .map_err(|err| storage_failure("serialize code allocation", &err))?;

    // Length-first ordering keeps the comparison numeric once the
    // sequence grows past five digits.
    let last: Option<String> = sqlx::query_scalar(
        "SELECT code FROM orders WHERE code LIKE $1 \
         ORDER BY length(code) DESC, code DESC LIMIT 1",
    )
    .bind(format!("ORD-{year}-%"))
    .fetch_optional(conn)
    .await
    .map_err(|err| storage_failure("read last order code", &err))?;

    Ok(next_code(last.as_deref(), year))
}

/// Filtered, paginated listing. Filters are assembled with bound
/// parameters only; caller-supplied values never reach the query text.
pub async fn search_orders(
    conn: &mut PgConnection,
    filter: &OrderFilter,
    seller_scope: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> DomainResult<(Vec<Order>, i64)> {
    let mut count_query = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM orders o JOIN customers c ON c.id = o.customer_id WHERE 1=1",
    );
    push_filters(&mut count_query, filter, seller_scope);
    let total: i64 = count_query
        .build_query_scalar()
        .fetch_one(&mut *conn)
        .await
        .map_err(|err| storage_failure("count orders", &err))?;

    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT o.id, o.code, o.customer_id, o.address_id, o.seller_id, o.delivery_date, \
                o.notes, o.total, o.status, o.is_paid, o.created_at \
         FROM orders o JOIN customers c ON c.id = o.customer_id WHERE 1=1",
    );
    push_filters(&mut query, filter, seller_scope);
    query.push(" ORDER BY o.created_at DESC LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    let rows: Vec<OrderRow> = query
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .map_err(|err| storage_failure("list orders", &err))?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = fetch_items(conn, row.id).await?;
        orders.push(row.into_order(items)?);
    }

    Ok((orders, total))
}

fn push_filters(
    query: &mut QueryBuilder<'_, Postgres>,
    filter: &OrderFilter,
    seller_scope: Option<Uuid>,
) {
    if let Some(seller_id) = seller_scope {
        query.push(" AND c.seller_id = ");
        query.push_bind(seller_id);
    }
    if let Some(date) = filter.delivery_date {
        query.push(" AND o.delivery_date = ");
        query.push_bind(date);
    }
    if let Some(status) = filter.status {
        query.push(" AND o.status = ");
        query.push_bind(status.as_str());
    }
    if let Some(customer_id) = filter.customer_id {
        query.push(" AND o.customer_id = ");
        query.push_bind(customer_id);
    }
    if let Some(term) = &filter.search {
        let pattern = format!("%{term}%");
        query.push(" AND (o.code ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR c.name ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR c.email ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
}
