//! Payment flow: initialize an intent with the gateway, then apply the
//! verified outcome to the order. Verification may arrive repeatedly
//! (webhook plus polling); applying it is compare-and-swap so a second
//! application is a no-op.

use anyhow::anyhow;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, TransactionTrait,
};

use crate::{
    audit::log_audit,
    domain::status::{OrderStatus, PaymentStatus},
    dto::{
        orders::OrderWithItems,
        payments::{InitializePaymentRequest, PaymentInitData},
    },
    entity::{
        orders::{self, Column as OrderCol},
        Orders,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    payment::{PaymentIntent, PaymentOutcome},
    response::{ApiResponse, Meta},
    services::order_service,
    state::AppState,
};

pub async fn initiate_payment(
    state: &AppState,
    user: &AuthUser,
    payload: InitializePaymentRequest,
) -> AppResult<ApiResponse<PaymentInitData>> {
    if payload.email.trim().is_empty() {
        return Err(AppError::BadRequest("email is required".into()));
    }

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(payload.order_id))
                .add(OrderCol::CustomerId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = order
        .status
        .parse::<OrderStatus>()
        .map_err(|e| anyhow!(e))?;
    if status.is_terminal() {
        return Err(AppError::BadRequest("order is closed".into()));
    }
    if order.payment_status == PaymentStatus::Paid.as_str() {
        return Err(AppError::BadRequest("Order already paid".into()));
    }

    let intent = PaymentIntent {
        order_id: order.id,
        amount: order.total_amount,
        email: payload.email.trim().to_string(),
        method: payload.method,
    };
    let init = state.gateway.initialize(&intent).await?;

    let order_id = order.id;
    let mut active: orders::ActiveModel = order.into();
    active.payment_reference = Set(Some(init.reference.clone()));
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "payment_initialized",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id, "reference": init.reference })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment initialized",
        PaymentInitData {
            reference: init.reference,
            authorization_url: init.authorization_url,
        },
        Some(Meta::empty()),
    ))
}

/// Confirms the payment outcome for a reference and applies it to the
/// owning order. Success marks the order paid and auto-advances
/// `pending -> processing`; failure marks the payment failed but keeps the
/// order and its reservation so the customer can retry.
pub async fn complete_payment(
    state: &AppState,
    reference: &str,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let verified = state.gateway.verify(reference).await?;

    let txn = state.orm.begin().await?;
    let order = Orders::find()
        .filter(OrderCol::PaymentReference.eq(reference))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut outcome = verified.outcome;
    if outcome == PaymentOutcome::Success && verified.amount != order.total_amount {
        tracing::warn!(
            order_id = %order.id,
            expected = order.total_amount,
            received = verified.amount,
            "verified amount does not match order total, treating as failed"
        );
        outcome = PaymentOutcome::Failed;
    }

    match outcome {
        PaymentOutcome::Success => {
            // Pending or failed flips to paid (failed payments are
            // retryable); a replayed verification of a paid order and a
            // late verification of a cancelled order both match zero rows
            // and change nothing.
            let applied = Orders::update_many()
                .col_expr(
                    OrderCol::PaymentStatus,
                    Expr::value(PaymentStatus::Paid.as_str()),
                )
                .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
                .filter(
                    Condition::all()
                        .add(OrderCol::Id.eq(order.id))
                        .add(OrderCol::Status.ne(OrderStatus::Cancelled.as_str()))
                        .add(OrderCol::PaymentStatus.is_in([
                            PaymentStatus::Pending.as_str(),
                            PaymentStatus::Failed.as_str(),
                        ])),
                )
                .exec(&txn)
                .await?;

            if applied.rows_affected > 0 {
                Orders::update_many()
                    .col_expr(
                        OrderCol::Status,
                        Expr::value(OrderStatus::Processing.as_str()),
                    )
                    .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
                    .filter(
                        Condition::all()
                            .add(OrderCol::Id.eq(order.id))
                            .add(OrderCol::Status.eq(OrderStatus::Pending.as_str())),
                    )
                    .exec(&txn)
                    .await?;
            } else {
                tracing::debug!(
                    order_id = %order.id,
                    "payment not applied: already paid or order cancelled"
                );
            }
        }
        PaymentOutcome::Failed => {
            // Never downgrades a paid order.
            Orders::update_many()
                .col_expr(
                    OrderCol::PaymentStatus,
                    Expr::value(PaymentStatus::Failed.as_str()),
                )
                .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
                .filter(
                    Condition::all()
                        .add(OrderCol::Id.eq(order.id))
                        .add(OrderCol::PaymentStatus.eq(PaymentStatus::Pending.as_str())),
                )
                .exec(&txn)
                .await?;
        }
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        None,
        "payment_verified",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "reference": reference,
            "outcome": match outcome {
                PaymentOutcome::Success => "success",
                PaymentOutcome::Failed => "failed",
            },
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    order_service::fetch_with_items(state, order.id, "Payment verified").await
}
