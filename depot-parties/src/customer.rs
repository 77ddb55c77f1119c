use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer of the distribution business. Read-only for the order
/// engine; customer CRUD lives in its own service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    /// NIT / tax identification number.
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
    /// The seller this customer belongs to. Drives order authorization:
    /// sellers may only open orders for their own customers.
    pub seller_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A delivery address registered under one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAddress {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CustomerAddress {
    pub fn belongs_to(&self, customer_id: Uuid) -> bool {
        self.customer_id == customer_id
    }
}
