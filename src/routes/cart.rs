use axum::{
    Json, Router,
    extract::State,
    routing::get,
};

use crate::{
    dto::cart::{CartList, ReplaceCartRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_cart).put(replace_cart))
}

#[utoipa::path(
    get,
    path = "/cart",
    responses(
        (status = 200, description = "Current cart contents", body = ApiResponse<CartList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartList>>> {
    let resp = cart_service::get_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/cart",
    request_body = ReplaceCartRequest,
    responses(
        (status = 200, description = "Cart replaced", body = ApiResponse<CartList>),
        (status = 400, description = "Invalid quantity or unknown product"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn replace_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ReplaceCartRequest>,
) -> AppResult<Json<ApiResponse<CartList>>> {
    let resp = cart_service::replace_cart(&state, &user, payload).await?;
    Ok(Json(resp))
}
