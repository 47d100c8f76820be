use std::sync::Arc;

use axum_marketplace_api::{
    db::{create_orm_conn, run_migrations},
    domain::status::{OrderStatus, PaymentMethod, PaymentStatus},
    dto::{
        cart::{CartItemInput, ReplaceCartRequest},
        orders::{CreateOrderRequest, UpdateOrderStatusRequest},
        payments::InitializePaymentRequest,
    },
    entity::{products, users, Orders, Products},
    error::AppError,
    middleware::auth::{AuthUser, Role},
    payment::{mock::MockGateway, PaymentOutcome},
    routes::params::{OrderListQuery, Pagination},
    services::{cart_service, order_service, payment_service},
    state::AppState,
};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, EntityTrait};
use uuid::Uuid;

// Allow skipping when no DB is configured in the environment.
async fn setup() -> anyhow::Result<Option<(AppState, Arc<MockGateway>)>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests."
                );
                return Ok(None);
            }
        };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let mock = Arc::new(MockGateway::new());
    let state = AppState {
        orm,
        gateway: mock.clone(),
    };
    Ok(Some((state, mock)))
}

async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    users::ActiveModel {
        id: Set(id),
        email: Set(format!("{role}-{id}@example.com")),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let role = match role {
        "admin" => Role::Admin,
        "supplier" => Role::Supplier,
        _ => Role::Customer,
    };
    Ok(AuthUser { user_id: id, role })
}

async fn create_product(
    state: &AppState,
    supplier_id: Uuid,
    price: i64,
    discount: i64,
    stock: i32,
) -> anyhow::Result<products::Model> {
    let id = Uuid::new_v4();
    let product = products::ActiveModel {
        id: Set(id),
        supplier_id: Set(supplier_id),
        name: Set(format!("Test Product {id}")),
        description: Set(Some("integration test product".into())),
        price: Set(price),
        discount: Set(discount),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

async fn fill_cart(
    state: &AppState,
    customer: &AuthUser,
    items: &[(Uuid, i32)],
) -> anyhow::Result<()> {
    let items = items
        .iter()
        .map(|(product_id, quantity)| CartItemInput {
            product_id: *product_id,
            quantity: *quantity,
            size: None,
            color: None,
        })
        .collect();
    cart_service::replace_cart(state, customer, ReplaceCartRequest { items }).await?;
    Ok(())
}

fn checkout_payload() -> CreateOrderRequest {
    CreateOrderRequest {
        shipping_address: "12 Oxford Street, Accra".into(),
        contact_phone: "+233200000000".into(),
    }
}

fn status_change(status: OrderStatus) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status,
        tracking_code: None,
        estimated_delivery_date: None,
    }
}

async fn product_stock(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok(product.stock)
}

// Full happy path: cart -> checkout -> pay -> ship -> deliver, with the
// payment verification replayed to prove it only applies once.
#[tokio::test]
async fn checkout_pay_ship_deliver_flow() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let customer = create_user(&state, "customer").await?;
    let supplier = create_user(&state, "supplier").await?;
    let product = create_product(&state, supplier.user_id, 100, 10, 10).await?;

    fill_cart(&state, &customer, &[(product.id, 2)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");

    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.order.payment_status, PaymentStatus::Pending);
    assert_eq!(created.order.total_amount, 180);
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].price_at_purchase, 90);
    assert_eq!(product_stock(&state, product.id).await?, 8);

    // Checkout consumed the cart.
    let cart = cart_service::get_cart(&state, &customer)
        .await?
        .data
        .expect("cart data");
    assert!(cart.items.is_empty());

    let init = payment_service::initiate_payment(
        &state,
        &customer,
        InitializePaymentRequest {
            order_id: created.order.id,
            email: "customer@example.com".into(),
            method: PaymentMethod::MtnMobile,
        },
    )
    .await?
    .data
    .expect("payment init data");

    let paid = payment_service::complete_payment(&state, &init.reference)
        .await?
        .data
        .expect("order data");
    assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.order.status, OrderStatus::Processing);

    // Replayed verification is a no-op.
    let replayed = payment_service::complete_payment(&state, &init.reference)
        .await?
        .data
        .expect("order data");
    assert_eq!(replayed.order.payment_status, PaymentStatus::Paid);
    assert_eq!(replayed.order.status, OrderStatus::Processing);

    let shipped = order_service::transition(
        &state,
        &supplier,
        created.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
            tracking_code: Some("GH-TRACK-001".into()),
            estimated_delivery_date: None,
        },
    )
    .await?
    .data
    .expect("order data");
    assert_eq!(shipped.order.status, OrderStatus::Shipped);
    assert_eq!(shipped.order.tracking_code.as_deref(), Some("GH-TRACK-001"));
    assert_eq!(shipped.order.processing_supplier_id, Some(supplier.user_id));
    assert!(shipped.order.estimated_delivery_date.is_some());

    let delivered = order_service::transition(
        &state,
        &supplier,
        created.order.id,
        status_change(OrderStatus::Delivered),
    )
    .await?
    .data
    .expect("order data");
    assert_eq!(delivered.order.status, OrderStatus::Delivered);

    Ok(())
}

// Two customers race for the last unit; exactly one checkout wins.
#[tokio::test]
async fn last_unit_goes_to_exactly_one_customer() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier = create_user(&state, "supplier").await?;
    let product = create_product(&state, supplier.user_id, 50, 0, 1).await?;

    let first = create_user(&state, "customer").await?;
    let second = create_user(&state, "customer").await?;
    fill_cart(&state, &first, &[(product.id, 1)]).await?;
    fill_cart(&state, &second, &[(product.id, 1)]).await?;

    let (a, b) = tokio::join!(
        order_service::create_order(&state, &first, checkout_payload()),
        order_service::create_order(&state, &second, checkout_payload()),
    );

    let wins = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1, "exactly one checkout should win the last unit");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser,
        Err(AppError::InsufficientStock(id)) if id == product.id
    ));

    assert_eq!(product_stock(&state, product.id).await?, 0);
    Ok(())
}

// A multi-item checkout where one line cannot be reserved leaves no trace:
// earlier reservations roll back and the cart stays intact.
#[tokio::test]
async fn failed_checkout_rolls_back_all_reservations() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier = create_user(&state, "supplier").await?;
    let plenty = create_product(&state, supplier.user_id, 100, 0, 5).await?;
    let scarce = create_product(&state, supplier.user_id, 80, 0, 1).await?;

    let customer = create_user(&state, "customer").await?;
    fill_cart(&state, &customer, &[(plenty.id, 2), (scarce.id, 3)]).await?;

    let result = order_service::create_order(&state, &customer, checkout_payload()).await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientStock(id)) if id == scarce.id
    ));

    assert_eq!(product_stock(&state, plenty.id).await?, 5);
    assert_eq!(product_stock(&state, scarce.id).await?, 1);

    let cart = cart_service::get_cart(&state, &customer)
        .await?
        .data
        .expect("cart data");
    assert_eq!(cart.items.len(), 2);
    Ok(())
}

// Cancelling a paid order refunds it and returns every unit to stock.
#[tokio::test]
async fn cancellation_refunds_and_releases_stock() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier = create_user(&state, "supplier").await?;
    let admin = create_user(&state, "admin").await?;
    let customer = create_user(&state, "customer").await?;
    let product = create_product(&state, supplier.user_id, 100, 0, 10).await?;

    fill_cart(&state, &customer, &[(product.id, 4)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");
    assert_eq!(product_stock(&state, product.id).await?, 6);

    let init = payment_service::initiate_payment(
        &state,
        &customer,
        InitializePaymentRequest {
            order_id: created.order.id,
            email: "customer@example.com".into(),
            method: PaymentMethod::CreditCard,
        },
    )
    .await?
    .data
    .expect("payment init data");
    payment_service::complete_payment(&state, &init.reference).await?;

    let cancelled = order_service::transition(
        &state,
        &admin,
        created.order.id,
        status_change(OrderStatus::Cancelled),
    )
    .await?
    .data
    .expect("order data");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.order.payment_status, PaymentStatus::Refunded);
    assert_eq!(product_stock(&state, product.id).await?, 10);

    // Terminal state: no further transitions.
    let again = order_service::transition(
        &state,
        &admin,
        created.order.id,
        status_change(OrderStatus::Processing),
    )
    .await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));
    Ok(())
}

// A customer may cancel their own order only while it is still pending.
#[tokio::test]
async fn customer_cancels_own_pending_order() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier = create_user(&state, "supplier").await?;
    let customer = create_user(&state, "customer").await?;
    let product = create_product(&state, supplier.user_id, 60, 0, 3).await?;

    fill_cart(&state, &customer, &[(product.id, 1)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");

    let cancelled = order_service::transition(
        &state,
        &customer,
        created.order.id,
        status_change(OrderStatus::Cancelled),
    )
    .await?
    .data
    .expect("order data");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(product_stock(&state, product.id).await?, 3);
    Ok(())
}

// A failed verification keeps the order and its reservation; a fresh
// attempt can still complete the payment.
#[tokio::test]
async fn failed_payment_can_be_retried() -> anyhow::Result<()> {
    let Some((state, mock)) = setup().await? else {
        return Ok(());
    };

    let supplier = create_user(&state, "supplier").await?;
    let customer = create_user(&state, "customer").await?;
    let product = create_product(&state, supplier.user_id, 100, 0, 5).await?;

    fill_cart(&state, &customer, &[(product.id, 1)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");

    let request = InitializePaymentRequest {
        order_id: created.order.id,
        email: "customer@example.com".into(),
        method: PaymentMethod::Telecel,
    };
    let init = payment_service::initiate_payment(&state, &customer, request)
        .await?
        .data
        .expect("payment init data");

    mock.set_outcome(PaymentOutcome::Failed);
    let failed = payment_service::complete_payment(&state, &init.reference)
        .await?
        .data
        .expect("order data");
    assert_eq!(failed.order.payment_status, PaymentStatus::Failed);
    assert_eq!(failed.order.status, OrderStatus::Pending);
    assert_eq!(product_stock(&state, product.id).await?, 4);

    mock.set_outcome(PaymentOutcome::Success);
    let retry = payment_service::initiate_payment(
        &state,
        &customer,
        InitializePaymentRequest {
            order_id: created.order.id,
            email: "customer@example.com".into(),
            method: PaymentMethod::Telecel,
        },
    )
    .await?
    .data
    .expect("payment init data");
    let paid = payment_service::complete_payment(&state, &retry.reference)
        .await?
        .data
        .expect("order data");
    assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.order.status, OrderStatus::Processing);
    Ok(())
}

// A cancelled order can no longer be paid: new payment attempts are
// rejected, and a verification that arrives after the cancellation does
// not mark the order paid.
#[tokio::test]
async fn cancelled_order_cannot_be_paid() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier = create_user(&state, "supplier").await?;
    let customer = create_user(&state, "customer").await?;
    let product = create_product(&state, supplier.user_id, 100, 0, 5).await?;

    fill_cart(&state, &customer, &[(product.id, 1)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");

    // Payment is initialized while the order is still open...
    let init = payment_service::initiate_payment(
        &state,
        &customer,
        InitializePaymentRequest {
            order_id: created.order.id,
            email: "customer@example.com".into(),
            method: PaymentMethod::CreditCard,
        },
    )
    .await?
    .data
    .expect("payment init data");

    // ...but the customer cancels before verifying.
    order_service::transition(
        &state,
        &customer,
        created.order.id,
        status_change(OrderStatus::Cancelled),
    )
    .await?;
    assert_eq!(product_stock(&state, product.id).await?, 5);

    // The late verification must not mark the cancelled order paid.
    let verified = payment_service::complete_payment(&state, &init.reference)
        .await?
        .data
        .expect("order data");
    assert_eq!(verified.order.status, OrderStatus::Cancelled);
    assert_ne!(verified.order.payment_status, PaymentStatus::Paid);

    // And a fresh payment attempt on the closed order is rejected.
    let retry = payment_service::initiate_payment(
        &state,
        &customer,
        InitializePaymentRequest {
            order_id: created.order.id,
            email: "customer@example.com".into(),
            method: PaymentMethod::CreditCard,
        },
    )
    .await;
    assert!(matches!(retry, Err(AppError::BadRequest(_))));
    Ok(())
}

// Shipping claims fulfilment: when two suppliers both have items in an
// order, only one of them can ship it.
#[tokio::test]
async fn only_one_supplier_ships_a_shared_order() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier_a = create_user(&state, "supplier").await?;
    let supplier_b = create_user(&state, "supplier").await?;
    let admin = create_user(&state, "admin").await?;
    let customer = create_user(&state, "customer").await?;
    let product_a = create_product(&state, supplier_a.user_id, 100, 0, 5).await?;
    let product_b = create_product(&state, supplier_b.user_id, 80, 0, 5).await?;

    fill_cart(&state, &customer, &[(product_a.id, 1), (product_b.id, 1)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");

    let init = payment_service::initiate_payment(
        &state,
        &customer,
        InitializePaymentRequest {
            order_id: created.order.id,
            email: "customer@example.com".into(),
            method: PaymentMethod::BankTransfer,
        },
    )
    .await?
    .data
    .expect("payment init data");
    payment_service::complete_payment(&state, &init.reference).await?;

    let ship = |supplier: AuthUser, code: &str| {
        let state = state.clone();
        let order_id = created.order.id;
        let payload = UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
            tracking_code: Some(code.to_string()),
            estimated_delivery_date: None,
        };
        async move { order_service::transition(&state, &supplier, order_id, payload).await }
    };

    let (a, b) = tokio::join!(
        ship(supplier_a.clone(), "GH-TRACK-A"),
        ship(supplier_b.clone(), "GH-TRACK-B"),
    );
    let wins = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1, "exactly one supplier should claim the shipment");

    let order = Orders::find_by_id(created.order.id)
        .one(&state.orm)
        .await?
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::Shipped.as_str());
    let claimed = order.processing_supplier_id.expect("order is claimed");
    assert!(claimed == supplier_a.user_id || claimed == supplier_b.user_id);

    // Admin still sees a consistent order after the race.
    let fetched = order_service::get_order(&state, &admin, created.order.id)
        .await?
        .data
        .expect("order data");
    assert_eq!(fetched.order.status, OrderStatus::Shipped);
    Ok(())
}

// List and single fetch share one visibility rule, so an order invisible
// in the list is a 404 on direct fetch.
#[tokio::test]
async fn visibility_is_symmetric_between_list_and_get() -> anyhow::Result<()> {
    let Some((state, _mock)) = setup().await? else {
        return Ok(());
    };

    let supplier_a = create_user(&state, "supplier").await?;
    let supplier_b = create_user(&state, "supplier").await?;
    let customer = create_user(&state, "customer").await?;
    let other_customer = create_user(&state, "customer").await?;
    let product = create_product(&state, supplier_a.user_id, 100, 0, 5).await?;

    fill_cart(&state, &customer, &[(product.id, 1)]).await?;
    let created = order_service::create_order(&state, &customer, checkout_payload())
        .await?
        .data
        .expect("order data");

    let list_query = || OrderListQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        status: None,
        sort_order: None,
    };

    // The fulfilling supplier sees the order both ways.
    let listed = order_service::list_orders(&state, &supplier_a, list_query())
        .await?
        .data
        .expect("order list");
    assert!(listed.items.iter().any(|o| o.id == created.order.id));
    order_service::get_order(&state, &supplier_a, created.order.id).await?;

    // A supplier with no items in the order sees nothing.
    let listed = order_service::list_orders(&state, &supplier_b, list_query())
        .await?
        .data
        .expect("order list");
    assert!(listed.items.iter().all(|o| o.id != created.order.id));
    let fetched = order_service::get_order(&state, &supplier_b, created.order.id).await;
    assert!(matches!(fetched, Err(AppError::NotFound)));

    // Another customer cannot see it either.
    let fetched = order_service::get_order(&state, &other_customer, created.order.id).await;
    assert!(matches!(fetched, Err(AppError::NotFound)));
    Ok(())
}
