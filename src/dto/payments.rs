use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::status::PaymentMethod;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitializePaymentRequest {
    pub order_id: Uuid,
    pub email: String,
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentInitData {
    pub reference: String,
    pub authorization_url: String,
}
