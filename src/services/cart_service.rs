use std::collections::HashSet;

use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{CartItemDto, CartList, ReplaceCartRequest},
    entity::{
        cart_items::{self, Column as CartCol},
        products::Column as ProdCol,
        CartItems, Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartList>> {
    let rows = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_desc(CartCol::CreatedAt)
        .find_also_related(Products)
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .filter_map(|(item, product)| {
            let product = product?;
            Some(CartItemDto {
                id: item.id,
                product: Product::from_entity(product),
                quantity: item.quantity,
                size: item.size,
                color: item.color,
            })
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        CartList { items },
        Some(Meta::empty()),
    ))
}

/// Wholesale replacement: the submitted list becomes the cart, and an empty
/// list clears it. Last write wins; no merging.
pub async fn replace_cart(
    state: &AppState,
    user: &AuthUser,
    payload: ReplaceCartRequest,
) -> AppResult<ApiResponse<CartList>> {
    for item in &payload.items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".into(),
            ));
        }
    }

    let txn = state.orm.begin().await?;

    let wanted: HashSet<Uuid> = payload.items.iter().map(|i| i.product_id).collect();
    if !wanted.is_empty() {
        let found: HashSet<Uuid> = Products::find()
            .filter(ProdCol::Id.is_in(wanted.iter().copied()))
            .select_only()
            .column(ProdCol::Id)
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();
        if let Some(missing) = wanted.difference(&found).next() {
            return Err(AppError::BadRequest(format!("product {missing} not found")));
        }
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    if !payload.items.is_empty() {
        let models = payload.items.iter().map(|item| cart_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            size: Set(item.size.clone()),
            color: Set(item.color.clone()),
            created_at: NotSet,
        });
        CartItems::insert_many(models).exec(&txn).await?;
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_replace",
        Some("cart_items"),
        Some(serde_json::json!({ "item_count": payload.items.len() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    get_cart(state, user).await
}
