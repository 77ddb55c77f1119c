use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::identity::{Actor, Role};

/// Order operations subject to the authorization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    Create,
    View,
    Update,
    Cancel,
    AddItem,
    UpdateItem,
    RemoveItem,
    ChangeStatus,
    UpdatePayment,
}

impl OrderOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOp::Create => "create order",
            OrderOp::View => "view order",
            OrderOp::Update => "update order",
            OrderOp::Cancel => "cancel order",
            OrderOp::AddItem => "add line item",
            OrderOp::UpdateItem => "update line item",
            OrderOp::RemoveItem => "remove line item",
            OrderOp::ChangeStatus => "change order status",
            OrderOp::UpdatePayment => "update payment status",
        }
    }
}

impl std::fmt::Display for OrderOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single authorization policy consulted by every lifecycle operation.
///
/// `owner` is the seller the target belongs to: the order's creating
/// seller, or for `Create` the customer's owning seller. `None` means the
/// owning seller was removed; only admins can act on those.
pub fn can_act(actor: &Actor, owner: Option<Uuid>, _op: OrderOp) -> bool {
    if !actor.is_active {
        return false;
    }
    match actor.role {
        Role::Admin => true,
        Role::Seller => owner == Some(actor.id),
    }
}

/// `can_act`, raised as `Forbidden` on refusal.
pub fn ensure_can_act(actor: &Actor, owner: Option<Uuid>, op: OrderOp) -> DomainResult<()> {
    if can_act(actor, owner, op) {
        Ok(())
    } else {
        Err(DomainError::forbidden(format!(
            "you are not allowed to {op}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, is_active: bool) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            role,
            is_active,
        }
    }

    #[test]
    fn admin_can_act_on_any_order() {
        let admin = actor(Role::Admin, true);
        assert!(can_act(&admin, Some(Uuid::new_v4()), OrderOp::Update));
        assert!(can_act(&admin, None, OrderOp::Cancel));
    }

    #[test]
    fn seller_can_act_on_own_orders_only() {
        let seller = actor(Role::Seller, true);
        assert!(can_act(&seller, Some(seller.id), OrderOp::Update));
        assert!(!can_act(&seller, Some(Uuid::new_v4()), OrderOp::Update));
    }

    #[test]
    fn seller_cannot_act_on_orphaned_order() {
        // Owning seller removed: only admins may touch the order.
        let seller = actor(Role::Seller, true);
        assert!(!can_act(&seller, None, OrderOp::ChangeStatus));
    }

    #[test]
    fn inactive_actor_is_always_refused() {
        let admin = actor(Role::Admin, false);
        let seller = actor(Role::Seller, false);
        assert!(!can_act(&admin, None, OrderOp::View));
        assert!(!can_act(&seller, Some(seller.id), OrderOp::View));
    }

    #[test]
    fn ensure_can_act_raises_forbidden() {
        let seller = actor(Role::Seller, true);
        let err = ensure_can_act(&seller, None, OrderOp::Cancel).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }
}
