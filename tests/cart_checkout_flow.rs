use axum_storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::AddCartItemRequest,
    dto::orders::CheckoutRequest,
    entity::{
        carts::{Column as CartCol, Entity as Carts},
        cart_items::{Column as ItemCol, Entity as CartItems},
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Entity as Products},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::CartState,
    routes::admin::InventoryAdjustRequest,
    routes::params::Pagination,
    services::{admin_service, cart_service, order_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use uuid::Uuid;

// Every test provisions its own users and products (unique emails and
// names), so the suite can run in parallel against one database without
// truncating between tests.

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    Ok(Some(AppState { pool, orm }))
}

async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{}@example.com", Uuid::new_v4())),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: role.into(),
    })
}

async fn create_product(
    state: &AppState,
    price: i64,
    stock: i32,
) -> anyhow::Result<axum_storefront_api::entity::products::Model> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Test Widget {}", Uuid::new_v4())),
        description: Set(Some("A product for testing".into())),
        price: Set(price),
        stock: Set(stock),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product)
}

async fn add(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    quantity: i32,
) -> anyhow::Result<axum_storefront_api::models::CartItem> {
    let resp = cart_service::add_item(
        state,
        user,
        AddCartItemRequest {
            product_id,
            quantity,
        },
    )
    .await?;
    Ok(resp.data.unwrap())
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product should exist");
    Ok(product.stock)
}

async fn order_count(state: &AppState, user: &AuthUser) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?)
}

async fn active_cart_count(state: &AppState, user: &AuthUser) -> anyhow::Result<u64> {
    Ok(Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Active.eq(true))
        .count(&state.orm)
        .await?)
}

// Scenario: adding the same product twice merges into one line whose
// quantity is the sum, priced at the captured unit price.
#[tokio::test]
async fn adding_same_product_merges_lines() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    add(&state, &user, product.id, 2).await?;
    let merged = add(&state, &user, product.id, 3).await?;
    assert_eq!(merged.quantity, 5);
    assert_eq!(merged.unit_price, 1_000);

    let view = cart_service::get_cart_view(&state, &user)
        .await?
        .data
        .unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.totals.subtotal, 5_000);
    assert_eq!(active_cart_count(&state, &user).await?, 1);

    Ok(())
}

// Scenario: stock drops below the carted quantity after the add; checkout
// is rejected with the blocking product named and nothing changes.
#[tokio::test]
async fn insufficient_stock_blocks_checkout() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_product(&state, 1_000, 10).await?;

    add(&state, &user, product.id, 10).await?;

    // Someone else's conversion (here: an admin write-off) takes the
    // stock down to 5 while the cart still asks for 10.
    admin_service::adjust_inventory(
        &state,
        &admin,
        product.id,
        InventoryAdjustRequest { delta: -5 },
    )
    .await?;

    let err = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await
        .expect_err("checkout must be rejected");
    match &err {
        AppError::CartNotReady(CartState::InsufficientStock {
            product_id,
            available,
            requested,
            ..
        }) => {
            assert_eq!(*product_id, product.id);
            assert_eq!(*available, 5);
            assert_eq!(*requested, 10);
        }
        other => panic!("expected CartNotReady(InsufficientStock), got {other:?}"),
    }

    assert_eq!(stock_of(&state, product.id).await?, 5);
    assert_eq!(order_count(&state, &user).await?, 0);
    assert_eq!(active_cart_count(&state, &user).await?, 1);

    Ok(())
}

// Scenario: a READY cart converts; the order detail carries the price
// captured at add time even though the catalog price moved, stock drops
// by the converted quantity and the cart becomes history.
#[tokio::test]
async fn conversion_locks_prices_and_decrements_stock() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    add(&state, &user, product.id, 3).await?;

    // Price hike between add and checkout must not reach the buyer.
    let mut repriced: ProductActive = Products::find_by_id(product.id)
        .one(&state.orm)
        .await?
        .unwrap()
        .into();
    repriced.price = Set(2_000);
    repriced.update(&state.orm).await?;

    let summary = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await?
        .data
        .unwrap();

    assert_eq!(summary.details.len(), 1);
    let detail = &summary.details[0];
    assert_eq!(detail.product_id, product.id);
    assert_eq!(detail.quantity, 3);
    assert_eq!(detail.unit_price, 1_000);
    assert_eq!(detail.subtotal, 3_000);

    // subtotal 30.00, tax 3.00, shipping 5.99
    assert_eq!(summary.totals.subtotal, 3_000);
    assert_eq!(summary.totals.tax, 300);
    assert_eq!(summary.totals.shipping, 599);
    assert_eq!(summary.order.total_amount, 3_899);
    assert_eq!(summary.order.status, "PENDING");

    // Grand total reconciles with the line items.
    let line_sum: i64 = summary.details.iter().map(|d| d.subtotal).sum();
    assert_eq!(
        summary.order.total_amount,
        line_sum - summary.totals.discount + summary.totals.tax + summary.totals.shipping
    );

    assert_eq!(stock_of(&state, product.id).await?, 2);

    let old_cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Status.eq("CONVERTED"))
        .one(&state.orm)
        .await?
        .expect("converted cart should remain as history");
    assert!(!old_cart.active);
    assert_eq!(active_cart_count(&state, &user).await?, 0);

    // The next cart access lazily creates a fresh empty cart.
    let view = cart_service::get_cart_view(&state, &user)
        .await?
        .data
        .unwrap();
    assert_ne!(view.cart.id, old_cart.id);
    assert!(view.items.is_empty());
    assert_eq!(active_cart_count(&state, &user).await?, 1);

    Ok(())
}

// Scenario: two buyers race for the last unit; exactly one order exists
// afterwards and stock lands on zero, never below.
#[tokio::test]
async fn concurrent_checkouts_cannot_oversell() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let buyer_a = create_user(&state, "customer").await?;
    let buyer_b = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 1).await?;

    add(&state, &buyer_a, product.id, 1).await?;
    add(&state, &buyer_b, product.id, 1).await?;

    let (result_a, result_b) = tokio::join!(
        order_service::checkout(&state, &buyer_a, CheckoutRequest::default()),
        order_service::checkout(&state, &buyer_b, CheckoutRequest::default()),
    );

    let successes = [result_a.is_ok(), result_b.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1, "exactly one of the racing checkouts may win");

    for result in [result_a, result_b] {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    AppError::CartNotReady(CartState::InsufficientStock { .. })
                        | AppError::InsufficientStock { .. }
                ),
                "loser must fail on stock, got {err:?}"
            );
        }
    }

    assert_eq!(stock_of(&state, product.id).await?, 0);
    assert_eq!(
        order_count(&state, &buyer_a).await? + order_count(&state, &buyer_b).await?,
        1
    );

    Ok(())
}

#[tokio::test]
async fn clear_is_idempotent() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    add(&state, &user, product.id, 2).await?;

    cart_service::clear(&state, &user).await?;
    cart_service::clear(&state, &user).await?;

    let view = cart_service::get_cart_view(&state, &user)
        .await?
        .data
        .unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.totals.grand_total, 0);
    assert_eq!(active_cart_count(&state, &user).await?, 1);

    Ok(())
}

#[tokio::test]
async fn zero_quantity_update_removes_item() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    let item = add(&state, &user, product.id, 2).await?;

    let updated = cart_service::update_item_quantity(&state, &user, item.id, 0).await?;
    assert!(updated.is_none());

    let view = cart_service::get_cart_view(&state, &user)
        .await?
        .data
        .unwrap();
    assert!(view.items.is_empty());

    // The line is gone; touching it again is NotFound.
    let err = cart_service::update_item_quantity(&state, &user, item.id, 1)
        .await
        .expect_err("item no longer exists");
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

#[tokio::test]
async fn foreign_cart_item_is_forbidden() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let owner = create_user(&state, "customer").await?;
    let intruder = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    let item = add(&state, &owner, product.id, 2).await?;

    let err = cart_service::update_item_quantity(&state, &intruder, item.id, 1)
        .await
        .expect_err("foreign update must fail");
    assert!(matches!(err, AppError::Forbidden));

    let err = cart_service::remove_item(&state, &intruder, item.id)
        .await
        .expect_err("foreign remove must fail");
    assert!(matches!(err, AppError::Forbidden));

    // The owner's line is untouched.
    let line = CartItems::find_by_id(item.id)
        .one(&state.orm)
        .await?
        .expect("item should survive");
    assert_eq!(line.quantity, 2);

    Ok(())
}

#[tokio::test]
async fn empty_cart_cannot_check_out() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;

    // Never touched a cart: still EMPTY, not a 500.
    let err = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await
        .expect_err("no cart means nothing to convert");
    assert!(matches!(err, AppError::CartNotReady(CartState::Empty)));

    // An existing-but-empty cart classifies the same way.
    cart_service::get_cart_view(&state, &user).await?;
    let err = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await
        .expect_err("empty cart means nothing to convert");
    assert!(matches!(err, AppError::CartNotReady(CartState::Empty)));

    Ok(())
}

#[tokio::test]
async fn converted_cart_cannot_convert_again() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    add(&state, &user, product.id, 1).await?;
    order_service::checkout(&state, &user, CheckoutRequest::default()).await?;

    let err = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await
        .expect_err("second conversion of the same cart must fail");
    assert!(matches!(err, AppError::CartAlreadyConverted));

    assert_eq!(order_count(&state, &user).await?, 1);
    assert_eq!(stock_of(&state, product.id).await?, 4);

    Ok(())
}

// Atomicity: when one line blocks the conversion, no order, no detail, no
// stock movement and no cart deactivation may leak out.
#[tokio::test]
async fn failed_conversion_leaves_no_trace() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let healthy = create_product(&state, 1_000, 5).await?;
    let doomed = create_product(&state, 2_000, 5).await?;

    add(&state, &user, healthy.id, 2).await?;
    add(&state, &user, doomed.id, 1).await?;

    // The second product is pulled from the catalog before checkout.
    let mut pulled: ProductActive = Products::find_by_id(doomed.id)
        .one(&state.orm)
        .await?
        .unwrap()
        .into();
    pulled.active = Set(false);
    pulled.update(&state.orm).await?;

    let err = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await
        .expect_err("unavailable product must block the conversion");
    match &err {
        AppError::CartNotReady(CartState::HasUnavailableItems { product_id, .. }) => {
            assert_eq!(*product_id, doomed.id);
        }
        other => panic!("expected CartNotReady(HasUnavailableItems), got {other:?}"),
    }

    assert_eq!(order_count(&state, &user).await?, 0);
    assert_eq!(stock_of(&state, healthy.id).await?, 5);
    assert_eq!(stock_of(&state, doomed.id).await?, 5);
    assert_eq!(active_cart_count(&state, &user).await?, 1);

    let items = CartItems::find()
        .filter(ItemCol::ProductId.is_in([healthy.id, doomed.id]))
        .count(&state.orm)
        .await?;
    assert_eq!(items, 2, "cart lines must survive a failed conversion");

    Ok(())
}

#[tokio::test]
async fn saved_for_later_is_excluded_from_totals_and_checkout() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let wanted = create_product(&state, 1_000, 5).await?;
    let parked = create_product(&state, 9_000, 5).await?;

    add(&state, &user, wanted.id, 2).await?;
    let parked_item = add(&state, &user, parked.id, 1).await?;

    cart_service::save_item_for_later(&state, &user, parked_item.id).await?;

    let view = cart_service::get_cart_view(&state, &user)
        .await?
        .data
        .unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.totals.subtotal, 2_000);

    let summary = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await?
        .data
        .unwrap();
    assert_eq!(summary.details.len(), 1);
    assert_eq!(summary.details[0].product_id, wanted.id);

    // The parked line stays behind in the converted cart and the parked
    // product's stock is untouched.
    assert_eq!(stock_of(&state, parked.id).await?, 5);
    let survivor = CartItems::find_by_id(parked_item.id)
        .one(&state.orm)
        .await?;
    assert!(survivor.is_some());

    Ok(())
}

#[tokio::test]
async fn cart_with_only_saved_items_is_empty_for_checkout() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    let item = add(&state, &user, product.id, 1).await?;
    cart_service::save_item_for_later(&state, &user, item.id).await?;

    let err = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await
        .expect_err("nothing active to convert");
    assert!(matches!(err, AppError::CartNotReady(CartState::Empty)));

    // Restoring brings the line back into play.
    cart_service::restore_item(&state, &user, item.id).await?;
    let summary = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await?
        .data
        .unwrap();
    assert_eq!(summary.details.len(), 1);

    Ok(())
}

#[tokio::test]
async fn pay_order_checks_invoice_and_is_single_shot() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let product = create_product(&state, 1_000, 5).await?;

    add(&state, &user, product.id, 1).await?;
    let summary = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await?
        .data
        .unwrap();
    let order = summary.order;

    let err = order_service::pay_order(
        &state,
        &user,
        order.id,
        axum_storefront_api::dto::orders::PayOrderRequest {
            invoice_number: "INV-bogus".into(),
        },
    )
    .await
    .expect_err("wrong invoice number must be rejected");
    assert!(matches!(err, AppError::BadRequest(_)));

    let paid = order_service::pay_order(
        &state,
        &user,
        order.id,
        axum_storefront_api::dto::orders::PayOrderRequest {
            invoice_number: order.invoice_number.clone(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(paid.order.status, "PAID");
    assert_eq!(paid.order.payment_status, "paid");

    let err = order_service::pay_order(
        &state,
        &user,
        order.id,
        axum_storefront_api::dto::orders::PayOrderRequest {
            invoice_number: order.invoice_number,
        },
    )
    .await
    .expect_err("paying twice must be rejected");
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

// Cancelling an order returns its quantities to stock, once.
#[tokio::test]
async fn cancellation_restocks_converted_quantities() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_product(&state, 1_000, 5).await?;

    add(&state, &user, product.id, 3).await?;
    let summary = order_service::checkout(&state, &user, CheckoutRequest::default())
        .await?
        .data
        .unwrap();
    assert_eq!(stock_of(&state, product.id).await?, 2);

    admin_service::update_order_status(
        &state,
        &admin,
        summary.order.id,
        axum_storefront_api::routes::admin::UpdateOrderStatusRequest {
            status: "CANCELLED".into(),
        },
    )
    .await?;
    assert_eq!(stock_of(&state, product.id).await?, 5);

    // A cancelled order is immutable; no double restock.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        summary.order.id,
        axum_storefront_api::routes::admin::UpdateOrderStatusRequest {
            status: "CANCELLED".into(),
        },
    )
    .await
    .expect_err("cancelled orders must not change status again");
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, product.id).await?, 5);

    Ok(())
}

#[tokio::test]
async fn admin_sees_low_stock_after_conversion() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "customer").await?;
    let admin = create_user(&state, "admin").await?;
    let product = create_product(&state, 1_000, 10).await?;

    add(&state, &user, product.id, 8).await?;
    order_service::checkout(&state, &user, CheckoutRequest::default()).await?;

    let low = admin_service::list_low_stock(
        &state,
        &admin,
        axum_storefront_api::routes::admin::LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(100),
            },
            threshold: Some(5),
        },
    )
    .await?;
    assert!(
        low.data.unwrap().items.iter().any(|p| p.id == product.id),
        "expected product to appear in low-stock list"
    );

    Ok(())
}
