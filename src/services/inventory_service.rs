//! Inventory Ledger: the only place stock counters are mutated. Reserve,
//! release and set_stock all mirror `products.stock` in the same
//! transaction so catalog reads stay consistent without a join.

use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    domain::policy,
    dto::inventory::{ProductList, SetStockRequest},
    entity::{
        inventory_records::{self, Column as InvCol},
        products::{Column as ProdCol, Entity as Products},
        InventoryRecords,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Role},
    models::Product,
    response::{ApiResponse, Meta},
    routes::admin::LowStockQuery,
    state::AppState,
};

/// Atomic check-and-decrement for one `(supplier, product)` key. Two
/// concurrent reservations cannot both succeed past the available stock:
/// the decrement only applies where `stock >= quantity`.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be positive".into()));
    }

    let mut updated = try_decrement(conn, supplier_id, product_id, quantity).await?;
    if updated == 0 {
        // Either the record does not exist yet or stock is short. Create
        // the record lazily, seeded from the product mirror, and retry once.
        ensure_record(conn, supplier_id, product_id).await?;
        updated = try_decrement(conn, supplier_id, product_id, quantity).await?;
    }
    if updated == 0 {
        return Err(AppError::InsufficientStock(product_id));
    }

    mirror_stock_delta(conn, product_id, -quantity).await?;
    Ok(())
}

/// Returns a reservation to the ledger (cancellation path).
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be positive".into()));
    }

    ensure_record(conn, supplier_id, product_id).await?;
    InventoryRecords::update_many()
        .col_expr(InvCol::Stock, Expr::col(InvCol::Stock).add(quantity))
        .col_expr(InvCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(
            Condition::all()
                .add(InvCol::SupplierId.eq(supplier_id))
                .add(InvCol::ProductId.eq(product_id)),
        )
        .exec(conn)
        .await?;

    mirror_stock_delta(conn, product_id, quantity).await?;
    Ok(())
}

/// Restocking override: overwrites the counter instead of adjusting it.
/// Clamped to zero; does not go through reserve/release semantics.
pub async fn set_stock<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
    product_id: Uuid,
    new_stock: i32,
) -> AppResult<i32> {
    let new_stock = new_stock.max(0);

    ensure_record(conn, supplier_id, product_id).await?;
    InventoryRecords::update_many()
        .col_expr(InvCol::Stock, Expr::value(new_stock))
        .col_expr(InvCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(
            Condition::all()
                .add(InvCol::SupplierId.eq(supplier_id))
                .add(InvCol::ProductId.eq(product_id)),
        )
        .exec(conn)
        .await?;

    Products::update_many()
        .col_expr(ProdCol::Stock, Expr::value(new_stock))
        .filter(ProdCol::Id.eq(product_id))
        .exec(conn)
        .await?;

    Ok(new_stock)
}

async fn try_decrement<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<u64> {
    let result = InventoryRecords::update_many()
        .col_expr(InvCol::Stock, Expr::col(InvCol::Stock).sub(quantity))
        .col_expr(InvCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(
            Condition::all()
                .add(InvCol::SupplierId.eq(supplier_id))
                .add(InvCol::ProductId.eq(product_id))
                .add(InvCol::Stock.gte(quantity)),
        )
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Creates the ledger record on first use, seeded from the product mirror.
async fn ensure_record<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
    product_id: Uuid,
) -> AppResult<()> {
    let product = Products::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;
    if product.supplier_id != supplier_id {
        return Err(AppError::BadRequest(format!(
            "product {product_id} does not belong to supplier {supplier_id}"
        )));
    }

    let record = inventory_records::ActiveModel {
        id: Set(Uuid::new_v4()),
        supplier_id: Set(supplier_id),
        product_id: Set(product_id),
        stock: Set(product.stock.max(0)),
        updated_at: NotSet,
    };
    InventoryRecords::insert(record)
        .on_conflict(
            OnConflict::columns([InvCol::SupplierId, InvCol::ProductId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn mirror_stock_delta<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: i32,
) -> AppResult<()> {
    Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(delta))
        .filter(ProdCol::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Supplier restock endpoint. Suppliers may only touch their own products;
/// admins may touch any.
pub async fn set_stock_for_product(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: SetStockRequest,
) -> AppResult<ApiResponse<Product>> {
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let own = product.supplier_id == user.user_id;
    match user.role {
        Role::Admin => {}
        Role::Supplier if own => {}
        _ => return Err(AppError::Forbidden),
    }

    set_stock(&txn, product.supplier_id, product_id, payload.stock).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "inventory_set",
        Some("inventory_records"),
        Some(serde_json::json!({ "product_id": product_id, "stock": payload.stock })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let updated = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "Inventory updated",
        Product::from_entity(updated),
        Some(Meta::empty()),
    ))
}

/// Low-stock signal derived from the product mirror.
pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    policy::ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Products::find().filter(ProdCol::Stock.lte(threshold));
    finder = finder
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from_entity)
        .collect();

    let data = ProductList { items };
    Ok(ApiResponse::paginated("Low stock", data, page, limit, total))
}
