use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::status::{OrderStatus, PaymentStatus},
    entity::{order_items, orders, products},
    error::AppResult,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub discount: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn from_entity(model: products::Model) -> Self {
        Self {
            id: model.id,
            supplier_id: model.supplier_id,
            name: model.name,
            description: model.description,
            price: model.price,
            discount: model.discount,
            stock: model.stock,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_address: String,
    pub contact_phone: String,
    pub total_amount: i64,
    pub tracking_code: Option<String>,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    pub processing_supplier_id: Option<Uuid>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Fails only on a status string the state machine does not know,
    /// which would mean the row was written outside the enum codecs.
    pub fn from_entity(model: orders::Model) -> AppResult<Self> {
        let status = model
            .status
            .parse::<OrderStatus>()
            .map_err(|e| anyhow!(e))?;
        let payment_status = model
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|e| anyhow!(e))?;
        Ok(Self {
            id: model.id,
            customer_id: model.customer_id,
            status,
            payment_status,
            shipping_address: model.shipping_address,
            contact_phone: model.contact_phone,
            total_amount: model.total_amount,
            tracking_code: model.tracking_code,
            estimated_delivery_date: model
                .estimated_delivery_date
                .map(|dt| dt.with_timezone(&Utc)),
            processing_supplier_id: model.processing_supplier_id,
            payment_reference: model.payment_reference,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price_at_purchase: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn from_entity(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            quantity: model.quantity,
            size: model.size,
            color: model.color,
            price_at_purchase: model.price_at_purchase,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
