use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::{
        orders::OrderWithItems,
        payments::{InitializePaymentRequest, PaymentInitData},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initialize", post(initialize_payment))
        .route("/verify/{reference}", get(verify_payment))
}

#[utoipa::path(
    post,
    path = "/payments/initialize",
    request_body = InitializePaymentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = ApiResponse<PaymentInitData>),
        (status = 400, description = "Order already paid or invalid input"),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Payment gateway unavailable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn initialize_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<InitializePaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentInitData>>> {
    let resp = payment_service::initiate_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

// No auth: this is hit by provider webhooks and client polling alike, and
// only confirms an outcome the provider already knows.
#[utoipa::path(
    get,
    path = "/payments/verify/{reference}",
    params(("reference" = String, Path, description = "Provider payment reference")),
    responses(
        (status = 200, description = "Verified outcome applied to the order", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Unknown reference"),
        (status = 500, description = "Payment gateway unavailable"),
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = payment_service::complete_payment(&state, &reference).await?;
    Ok(Json(resp))
}
