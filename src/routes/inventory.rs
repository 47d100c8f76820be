use axum::{
    Json, Router,
    extract::{Path, State},
    routing::put,
};
use uuid::Uuid;

use crate::{
    dto::inventory::SetStockRequest,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Product,
    response::ApiResponse,
    services::inventory_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{product_id}", put(set_stock))
}

#[utoipa::path(
    put,
    path = "/inventory/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    request_body = SetStockRequest,
    responses(
        (status = 200, description = "Stock overwritten", body = ApiResponse<Product>),
        (status = 400, description = "Negative stock"),
        (status = 403, description = "Not the product's supplier"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Inventory"
)]
pub async fn set_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<SetStockRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = inventory_service::set_stock_for_product(&state, &user, product_id, payload).await?;
    Ok(Json(resp))
}
