use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, QueryFilter, QuerySelect,
    RelationTrait,
};
use uuid::Uuid;

use crate::{
    domain::status::OrderStatus,
    entity::{order_items, orders, products, OrderItems},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Role},
};

/// Builds the filter applied to every order read for the given actor.
/// List endpoints and single fetches share this, so an order outside an
/// actor's scope is indistinguishable from one that does not exist (404).
pub async fn visibility_condition<C: ConnectionTrait>(
    conn: &C,
    actor: &AuthUser,
) -> AppResult<Condition> {
    match actor.role {
        Role::Admin => Ok(Condition::all()),
        Role::Customer => Ok(Condition::all().add(orders::Column::CustomerId.eq(actor.user_id))),
        Role::Supplier => {
            let ids = supplier_order_ids(conn, actor.user_id).await?;
            Ok(Condition::all().add(orders::Column::Id.is_in(ids)))
        }
    }
}

/// Orders containing at least one item whose product belongs to the supplier.
async fn supplier_order_ids<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
) -> AppResult<Vec<Uuid>> {
    let ids = OrderItems::find()
        .join(JoinType::InnerJoin, order_items::Relation::Products.def())
        .filter(products::Column::SupplierId.eq(supplier_id))
        .select_only()
        .column(order_items::Column::OrderId)
        .distinct()
        .into_tuple::<Uuid>()
        .all(conn)
        .await?;
    Ok(ids)
}

/// Whether the actor may request the given status transition on an order
/// they can already see. Legality of the transition itself is checked
/// separately against the state machine table.
pub fn can_transition(
    actor: &AuthUser,
    order: &orders::Model,
    next: OrderStatus,
) -> Result<(), AppError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Supplier => {
            // Claim rule: an order being processed by one supplier cannot
            // be driven by another.
            let claimed_by_other = order
                .processing_supplier_id
                .map(|id| id != actor.user_id)
                .unwrap_or(false);
            match next {
                OrderStatus::Shipped | OrderStatus::Delivered if !claimed_by_other => Ok(()),
                _ => Err(AppError::Forbidden),
            }
        }
        Role::Customer => {
            let own = order.customer_id == actor.user_id;
            if next == OrderStatus::Cancelled && own && order.status == OrderStatus::Pending.as_str()
            {
                Ok(())
            } else {
                Err(AppError::Forbidden)
            }
        }
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order(customer_id: Uuid, status: OrderStatus, supplier: Option<Uuid>) -> orders::Model {
        orders::Model {
            id: Uuid::new_v4(),
            customer_id,
            status: status.as_str().to_string(),
            payment_status: "pending".to_string(),
            shipping_address: "12 Ring Rd, Accra".to_string(),
            contact_phone: "+233200000000".to_string(),
            total_amount: 100,
            tracking_code: None,
            estimated_delivery_date: None,
            processing_supplier_id: supplier,
            payment_reference: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn admin_may_request_any_transition() {
        let admin = actor(Role::Admin);
        let o = order(Uuid::new_v4(), OrderStatus::Processing, None);
        for next in OrderStatus::ALL {
            assert!(can_transition(&admin, &o, next).is_ok());
        }
    }

    #[test]
    fn supplier_may_only_ship_and_deliver() {
        let supplier = actor(Role::Supplier);
        let o = order(Uuid::new_v4(), OrderStatus::Processing, None);
        assert!(can_transition(&supplier, &o, OrderStatus::Shipped).is_ok());
        assert!(can_transition(&supplier, &o, OrderStatus::Delivered).is_ok());
        for next in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Cancelled,
        ] {
            assert!(matches!(
                can_transition(&supplier, &o, next),
                Err(AppError::Forbidden)
            ));
        }
    }

    #[test]
    fn supplier_cannot_drive_an_order_claimed_by_another() {
        let supplier = actor(Role::Supplier);
        let o = order(
            Uuid::new_v4(),
            OrderStatus::Processing,
            Some(Uuid::new_v4()),
        );
        assert!(matches!(
            can_transition(&supplier, &o, OrderStatus::Shipped),
            Err(AppError::Forbidden)
        ));

        let claimed = order(
            Uuid::new_v4(),
            OrderStatus::Processing,
            Some(supplier.user_id),
        );
        assert!(can_transition(&supplier, &claimed, OrderStatus::Shipped).is_ok());
    }

    #[test]
    fn customer_may_only_cancel_their_own_pending_order() {
        let customer = actor(Role::Customer);
        let own = order(customer.user_id, OrderStatus::Pending, None);
        assert!(can_transition(&customer, &own, OrderStatus::Cancelled).is_ok());

        let processing = order(customer.user_id, OrderStatus::Processing, None);
        assert!(matches!(
            can_transition(&customer, &processing, OrderStatus::Cancelled),
            Err(AppError::Forbidden)
        ));

        let someone_elses = order(Uuid::new_v4(), OrderStatus::Pending, None);
        assert!(matches!(
            can_transition(&customer, &someone_elses, OrderStatus::Cancelled),
            Err(AppError::Forbidden)
        ));

        assert!(matches!(
            can_transition(&customer, &own, OrderStatus::Shipped),
            Err(AppError::Forbidden)
        ));
    }
}
