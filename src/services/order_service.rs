//! Order Orchestrator: checkout, role-scoped reads and the validated
//! status transitions of the order state machine.

use std::collections::HashMap;

use anyhow::anyhow;
use chrono::{Duration, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    domain::{
        policy,
        status::{OrderStatus, PaymentStatus},
    },
    dto::orders::{
        CreateOrderRequest, OrderList, OrderWithItems, PurgeResult, TrackingRequest,
        UpdateOrderStatusRequest,
    },
    entity::{
        cart_items::Column as CartCol,
        order_items::{self, Column as OrderItemCol},
        orders::{self, Column as OrderCol},
        products, CartItems, OrderItems, Orders, Products,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Role},
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::inventory_service,
    state::AppState,
};

/// Checkout: consumes the cart snapshot, reserves stock per item and
/// persists the order with snapshotted prices, all inside one transaction.
/// The first failed reservation aborts the transaction, rolling back any
/// reservations already made for this order.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.shipping_address.trim().is_empty() {
        return Err(AppError::BadRequest("shipping address is required".into()));
    }
    if payload.contact_phone.trim().is_empty() {
        return Err(AppError::BadRequest("contact phone is required".into()));
    }

    let txn = state.orm.begin().await?;

    let cart = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let product_ids: Vec<Uuid> = cart.iter().map(|c| c.product_id).collect();
    let products_by_id: HashMap<Uuid, products::Model> = Products::find()
        .filter(products::Column::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let order_id = Uuid::new_v4();
    let mut total_amount: i64 = 0;
    let mut item_models = Vec::with_capacity(cart.len());

    for entry in &cart {
        if entry.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        let product = products_by_id.get(&entry.product_id).ok_or_else(|| {
            AppError::BadRequest(format!("product {} no longer exists", entry.product_id))
        })?;

        inventory_service::reserve(&txn, product.supplier_id, product.id, entry.quantity).await?;

        // Price snapshot: current price minus discount, never recalculated.
        let unit_price = (product.price - product.discount).max(0);
        total_amount += unit_price * entry.quantity as i64;

        item_models.push(order_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            quantity: Set(entry.quantity),
            size: Set(entry.size.clone()),
            color: Set(entry.color.clone()),
            price_at_purchase: Set(unit_price),
            created_at: NotSet,
        });
    }

    let order = orders::ActiveModel {
        id: Set(order_id),
        customer_id: Set(user.user_id),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
        shipping_address: Set(payload.shipping_address.trim().to_string()),
        contact_phone: Set(payload.contact_phone.trim().to_string()),
        total_amount: Set(total_amount),
        tracking_code: Set(None),
        estimated_delivery_date: Set(None),
        processing_supplier_id: Set(None),
        payment_reference: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(item_models.len());
    for model in item_models {
        items.push(OrderItem::from_entity(model.insert(&txn).await?));
    }

    // clear cart
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: Order::from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = policy::visibility_condition(&state.orm, user).await?;
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = status
            .parse::<OrderStatus>()
            .map_err(AppError::BadRequest)?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::paginated(
        "Ok",
        OrderList { items: orders },
        page,
        limit,
        total,
    ))
}

/// Single fetch goes through the same visibility condition as the list,
/// so an invisible order is a 404 on both paths.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let condition = policy::visibility_condition(&state.orm, user)
        .await?
        .add(OrderCol::Id.eq(id));
    let order = Orders::find()
        .filter(condition)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: Order::from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Applies one validated status transition. The write is compare-and-swap
/// on the status read above (and on the supplier claim when shipping), so
/// two concurrent updates cannot both win; the loser gets a conflict.
pub async fn transition(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let next = payload.status;

    let txn = state.orm.begin().await?;

    let condition = policy::visibility_condition(&txn, user)
        .await?
        .add(OrderCol::Id.eq(id));
    let order = Orders::find()
        .filter(condition)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = order
        .status
        .parse::<OrderStatus>()
        .map_err(|e| anyhow!(e))?;
    if !current.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: current,
            to: next,
        });
    }
    policy::can_transition(user, &order, next)?;

    let paid = order.payment_status == PaymentStatus::Paid.as_str();
    if next == OrderStatus::Processing && !paid && user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    let now = Utc::now();
    let mut update = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(next.as_str()))
        .col_expr(OrderCol::UpdatedAt, Expr::value(now));
    let mut guard = Condition::all()
        .add(OrderCol::Id.eq(order.id))
        .add(OrderCol::Status.eq(current.as_str()));

    if next == OrderStatus::Shipped {
        let tracking = payload
            .tracking_code
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| order.tracking_code.clone())
            .ok_or_else(|| AppError::BadRequest("tracking code is required to ship".into()))?;
        let eta = payload
            .estimated_delivery_date
            .or_else(|| {
                order
                    .estimated_delivery_date
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or_else(|| now + Duration::days(7));
        update = update
            .col_expr(OrderCol::TrackingCode, Expr::value(Some(tracking)))
            .col_expr(OrderCol::EstimatedDeliveryDate, Expr::value(Some(eta)));

        // Shipping claims fulfilment: only succeeds while the order is
        // unclaimed or already claimed by this supplier.
        if user.role == Role::Supplier {
            update =
                update.col_expr(OrderCol::ProcessingSupplierId, Expr::value(Some(user.user_id)));
            guard = guard.add(
                Condition::any()
                    .add(OrderCol::ProcessingSupplierId.is_null())
                    .add(OrderCol::ProcessingSupplierId.eq(user.user_id)),
            );
        }
    }

    if next == OrderStatus::Cancelled && paid {
        update = update.col_expr(
            OrderCol::PaymentStatus,
            Expr::value(PaymentStatus::Refunded.as_str()),
        );
    }

    let result = update.filter(guard).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::ConflictingUpdate);
    }

    if next == OrderStatus::Cancelled {
        release_order_items(&txn, order.id).await?;
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "from": current.as_str(), "to": next.as_str() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    fetch_with_items(state, order.id, "Order updated").await
}

/// Returns every reserved item of a cancelled order to the ledger.
async fn release_order_items<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .find_also_related(Products)
        .all(conn)
        .await?;

    for (item, product) in items {
        let Some(product) = product else {
            tracing::warn!(order_item = %item.id, "product missing while releasing stock");
            continue;
        };
        inventory_service::release(conn, product.supplier_id, product.id, item.quantity).await?;
    }
    Ok(())
}

/// Admin attaches or corrects a tracking code outside a status change.
pub async fn set_tracking(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: TrackingRequest,
) -> AppResult<ApiResponse<Order>> {
    policy::ensure_admin(user)?;
    if payload.tracking_code.trim().is_empty() {
        return Err(AppError::BadRequest("tracking code must not be empty".into()));
    }

    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = order
        .status
        .parse::<OrderStatus>()
        .map_err(|e| anyhow!(e))?;
    if current.is_terminal() {
        return Err(AppError::BadRequest("order is closed".into()));
    }

    let mut active: orders::ActiveModel = order.into();
    active.tracking_code = Set(Some(payload.tracking_code.trim().to_string()));
    if let Some(eta) = payload.estimated_delivery_date {
        active.estimated_delivery_date = Set(Some(eta.into()));
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_tracking_set",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Tracking updated",
        Order::from_entity(order)?,
        Some(Meta::empty()),
    ))
}

/// Administrative escape hatch: deletes every order and its items without
/// going through the state machine. Orders still holding a reservation
/// (pending or processing) give their stock back before the rows go;
/// shipped and delivered orders consumed theirs, cancelled ones already
/// released.
pub async fn purge_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<PurgeResult>> {
    policy::ensure_admin(user)?;

    let txn = state.orm.begin().await?;

    let open = Orders::find()
        .filter(OrderCol::Status.is_in([
            OrderStatus::Pending.as_str(),
            OrderStatus::Processing.as_str(),
        ]))
        .all(&txn)
        .await?;
    for order in &open {
        release_order_items(&txn, order.id).await?;
    }

    let items_deleted = OrderItems::delete_many().exec(&txn).await?.rows_affected;
    let orders_deleted = Orders::delete_many().exec(&txn).await?.rows_affected;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "orders_purged",
        Some("orders"),
        Some(serde_json::json!({ "orders_deleted": orders_deleted })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Orders purged",
        PurgeResult {
            orders_deleted,
            items_deleted,
        },
        Some(Meta::empty()),
    ))
}

pub(crate) async fn fetch_with_items(
    state: &AppState,
    id: Uuid,
    message: &str,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from_entity)
        .collect();

    Ok(ApiResponse::success(
        message,
        OrderWithItems {
            order: Order::from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}
