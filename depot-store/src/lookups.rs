//! Read-only lookups of the external collaborators: customers, addresses
//! and products. This engine never writes to these tables.
//!
//! Every function takes an explicit `&mut PgConnection` so the boundary
//! of atomicity is visible in the signature: called with a transaction's
//! connection, the lookup sees the transactional view.

use chrono::{DateTime, Utc};
use depot_catalog::Product;
use depot_core::error::DomainResult;
use depot_parties::{Customer, CustomerAddress};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::storage_failure;

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    tax_id: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    contact_person: Option<String>,
    notes: Option<String>,
    seller_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            name: row.name,
            tax_id: row.tax_id,
            email: row.email,
            phone: row.phone,
            contact_person: row.contact_person,
            notes: row.notes,
            seller_id: row.seller_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    customer_id: Uuid,
    address: String,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AddressRow> for CustomerAddress {
    fn from(row: AddressRow) -> Self {
        CustomerAddress {
            id: row.id,
            customer_id: row.customer_id,
            address: row.address,
            city: row.city,
            state: row.state,
            postal_code: row.postal_code,
            country: row.country,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    code: String,
    price: Option<Decimal>,
    cost_price: Option<Decimal>,
    unit: Option<String>,
    notes: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            code: row.code,
            price: row.price,
            cost_price: row.cost_price,
            unit: row.unit,
            notes: row.notes,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Customer with its owning seller, for the authorization policy.
pub async fn customer_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> DomainResult<Option<Customer>> {
    let row = sqlx::query_as::<_, CustomerRow>(
        "SELECT id, name, tax_id, email, phone, contact_person, notes, seller_id, created_at \
         FROM customers WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(|err| storage_failure("load customer", &err))?;

    Ok(row.map(Customer::from))
}

/// The address, only when it is registered under the given customer.
pub async fn address_for_customer(
    conn: &mut PgConnection,
    address_id: Uuid,
    customer_id: Uuid,
) -> DomainResult<Option<CustomerAddress>> {
    let row = sqlx::query_as::<_, AddressRow>(
        "SELECT id, customer_id, address, city, state, postal_code, country, created_at \
         FROM customer_addresses WHERE id = $1 AND customer_id = $2",
    )
    .bind(address_id)
    .bind(customer_id)
    .fetch_optional(conn)
    .await
    .map_err(|err| storage_failure("load customer address", &err))?;

    Ok(row.map(CustomerAddress::from))
}

/// Product lookup restricted to active catalog entries; orders only ever
/// add products that are currently sold.
pub async fn active_product_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> DomainResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, name, code, price, cost_price, unit, notes, is_active, created_at \
         FROM products WHERE id = $1 AND is_active = TRUE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(|err| storage_failure("load product", &err))?;

    Ok(row.map(Product::from))
}

/// Unfiltered product lookup, used to refresh cost snapshots on items
/// that already reference the product.
pub async fn product_by_id(conn: &mut PgConnection, id: Uuid) -> DomainResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, name, code, price, cost_price, unit, notes, is_active, created_at \
         FROM products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(|err| storage_failure("load product", &err))?;

    Ok(row.map(Product::from))
}
