use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    domain::status::{OrderStatus, PaymentMethod, PaymentStatus},
    dto::{
        cart::{CartItemDto, CartItemInput, CartList, ReplaceCartRequest},
        inventory::{ProductList, SetStockRequest},
        orders::{
            CreateOrderRequest, OrderList, OrderWithItems, PurgeResult, TrackingRequest,
            UpdateOrderStatusRequest,
        },
        payments::{InitializePaymentRequest, PaymentInitData},
    },
    models::{Order, OrderItem, Product},
    response::{ApiResponse, Meta},
    routes::{admin, cart, health, inventory, orders, params, payments},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::get_cart,
        cart::replace_cart,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order_status,
        orders::set_tracking,
        inventory::set_stock,
        payments::initialize_payment,
        payments::verify_payment,
        admin::purge_orders,
        admin::list_low_stock
    ),
    components(
        schemas(
            Product,
            Order,
            OrderItem,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            CartItemInput,
            ReplaceCartRequest,
            CartItemDto,
            CartList,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            TrackingRequest,
            OrderList,
            OrderWithItems,
            PurgeResult,
            SetStockRequest,
            ProductList,
            InitializePaymentRequest,
            PaymentInitData,
            admin::LowStockQuery,
            params::Pagination,
            params::OrderListQuery,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<CartList>,
            ApiResponse<ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart snapshot endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Inventory", description = "Supplier stock management"),
        (name = "Payments", description = "Payment gateway endpoints"),
        (name = "Admin", description = "Administrative endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
