pub mod authz;
pub mod error;
pub mod identity;

pub use authz::{can_act, ensure_can_act, OrderOp};
pub use error::{DomainError, DomainResult};
pub use identity::{Actor, Role};
