use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use depot_core::identity::Actor;
use depot_order::models::{Order, OrderLineItem, OrderStatus, StatusHistoryEntry};
use depot_store::service::{
    CreateOrder, NewLineItem, OrderFilter, OrderPage, PageMeta, UpdateOrder,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub delivery_date: NaiveDate,
    pub notes: Option<String>,
    pub products: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
}

impl From<OrderItemRequest> for NewLineItem {
    fn from(req: OrderItemRequest) -> Self {
        NewLineItem {
            product_id: req.product_id,
            quantity: req.quantity,
            unit_price: req.unit_price,
        }
    }
}

impl From<CreateOrderRequest> for CreateOrder {
    fn from(req: CreateOrderRequest) -> Self {
        CreateOrder {
            customer_id: req.customer_id,
            address_id: req.address_id,
            delivery_date: req.delivery_date,
            notes: req.notes,
            items: req.products.into_iter().map(NewLineItem::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub address_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub is_paid: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub delivery_date: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    /// Matches order code, customer name or customer email.
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub code: String,
    pub customer_id: Uuid,
    pub address_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub cost_price: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub actor_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetaResponse {
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderPageResponse {
    pub data: Vec<OrderResponse>,
    pub meta: PageMetaResponse,
}

impl From<OrderLineItem> for OrderItemResponse {
    fn from(item: OrderLineItem) -> Self {
        OrderItemResponse {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            cost_price: item.cost_price,
            profit: item.profit,
            subtotal: item.subtotal,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        OrderResponse {
            id: order.id,
            code: order.code,
            customer_id: order.customer_id,
            address_id: order.address_id,
            seller_id: order.seller_id,
            delivery_date: order.delivery_date,
            notes: order.notes,
            total: order.total,
            status: order.status,
            is_paid: order.is_paid,
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
        }
    }
}

impl From<StatusHistoryEntry> for HistoryEntryResponse {
    fn from(entry: StatusHistoryEntry) -> Self {
        HistoryEntryResponse {
            id: entry.id,
            status: entry.status,
            notes: entry.notes,
            actor_id: entry.actor_id,
            recorded_at: entry.recorded_at,
        }
    }
}

impl From<PageMeta> for PageMetaResponse {
    fn from(meta: PageMeta) -> Self {
        PageMetaResponse {
            page: meta.page,
            limit: meta.limit,
            total_pages: meta.total_pages,
            total_items: meta.total_items,
            has_next_page: meta.has_next_page,
            has_prev_page: meta.has_prev_page,
        }
    }
}

impl From<OrderPage> for OrderPageResponse {
    fn from(page: OrderPage) -> Self {
        OrderPageResponse {
            data: page.data.into_iter().map(OrderResponse::from).collect(),
            meta: page.meta.into(),
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route(
            "/v1/orders/{id}",
            get(get_order).patch(update_order).delete(cancel_order),
        )
        .route("/v1/orders/{id}/status", post(change_status))
        .route("/v1/orders/{id}/payment", post(update_payment))
        .route("/v1/orders/{id}/items", post(add_item))
        .route(
            "/v1/orders/{id}/items/{item_id}",
            axum::routing::patch(update_item).delete(remove_item),
        )
        .route("/v1/orders/{id}/history", get(get_history))
        .layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.service.create(req.into(), &actor).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderPageResponse>, ApiError> {
    let filter = OrderFilter {
        delivery_date: query.delivery_date,
        status: query.status,
        customer_id: query.customer_id,
        search: query.search,
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(10),
    };
    let page = state.service.list(filter, &actor).await?;
    Ok(Json(page.into()))
}

/// GET /v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.service.get(order_id, &actor).await?;
    Ok(Json(order.into()))
}

/// PATCH /v1/orders/:id
pub async fn update_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let changes = UpdateOrder {
        delivery_date: req.delivery_date,
        notes: req.notes,
        address_id: req.address_id,
    };
    let order = state.service.update(order_id, changes, &actor).await?;
    Ok(Json(order.into()))
}

/// DELETE /v1/orders/:id
///
/// Cancellation, not deletion: the order is kept with a terminal status.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.cancel(order_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/orders/:id/status
pub async fn change_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .service
        .change_status(order_id, req.status, req.notes, &actor)
        .await?;
    Ok(Json(order.into()))
}

/// POST /v1/orders/:id/payment
pub async fn update_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdatePaymentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .service
        .update_payment(order_id, req.is_paid, req.notes, &actor)
        .await?;
    Ok(Json(order.into()))
}

/// POST /v1/orders/:id/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<OrderItemRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.service.add_item(order_id, req.into(), &actor).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// PATCH /v1/orders/:id/items/:item_id
pub async fn update_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .service
        .update_item(order_id, item_id, req.quantity, req.unit_price, &actor)
        .await?;
    Ok(Json(order.into()))
}

/// DELETE /v1/orders/:id/items/:item_id
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.service.remove_item(order_id, item_id, &actor).await?;
    Ok(Json(order.into()))
}

/// GET /v1/orders/:id/history
pub async fn get_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntryResponse>>, ApiError> {
    let entries = state.service.history(order_id, &actor).await?;
    Ok(Json(
        entries.into_iter().map(HistoryEntryResponse::from).collect(),
    ))
}
