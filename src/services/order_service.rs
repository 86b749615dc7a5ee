use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CheckoutRequest, OrderList, OrderSummary, OrderWithDetails, PayOrderRequest},
    entity::{
        cart_items::{Column as ItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        order_details::{
            ActiveModel as DetailActive, Column as DetailCol, Entity as OrderDetails,
            Model as DetailModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, CartState, Order, OrderDetail, Product},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{cart_service, inventory, pricing, validator},
    state::AppState,
};

/// Convert the caller's active cart into an order: one transaction, all or
/// nothing.
///
/// Concurrency discipline: the cart row and every referenced product row
/// are taken `FOR UPDATE` for the duration of the conversion, so competing
/// conversions serialize; the ledger's conditional decrement backstops the
/// stock floor on top of that. A failure at any step before commit drops
/// the transaction and rolls everything back.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderSummary>> {
    let txn = state.orm.begin().await?;

    // The most recent cart, locked. The loser of a double-checkout race
    // blocks here and then observes the deactivated row.
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_desc(CartCol::CreatedAt)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let cart = match cart {
        Some(c) => c,
        None => return Err(AppError::CartNotReady(CartState::Empty)),
    };
    if !cart.active {
        return Err(AppError::CartAlreadyConverted);
    }

    let items: Vec<CartItem> = CartItems::find()
        .filter(ItemCol::CartId.eq(cart.id))
        .filter(ItemCol::SavedForLater.eq(false))
        .order_by_asc(ItemCol::CreatedAt)
        .all(&txn)
        .await?
        .iter()
        .map(cart_service::cart_item_from_entity)
        .collect();

    // Lock product rows in sorted id order so concurrent conversions
    // acquire them in the same sequence.
    let mut product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    product_ids.sort();
    product_ids.dedup();
    let products: HashMap<Uuid, Product> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| {
            (
                p.id,
                Product {
                    id: p.id,
                    name: p.name,
                    description: p.description,
                    price: p.price,
                    stock: p.stock,
                    active: p.active,
                    created_at: p.created_at.with_timezone(&Utc),
                },
            )
        })
        .collect();

    // Re-validate against the rows just locked; an earlier classification
    // is worthless by now.
    let cart_state = validator::classify(&items, &products);
    if !cart_state.is_ready() {
        return Err(AppError::CartNotReady(cart_state));
    }

    let totals = pricing::compute_totals(&items, 0);

    let order_id = Uuid::new_v4();
    let invoice_number = build_invoice_number(order_id);
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        status: Set("PENDING".into()),
        total_amount: Set(totals.grand_total),
        payment_status: Set("unpaid".into()),
        invoice_number: Set(invoice_number),
        shipping_address: Set(payload.shipping_address),
        paid_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut details: Vec<OrderDetail> = Vec::with_capacity(items.len());
    for item in &items {
        // Quantity and unit price come verbatim from the cart line, never
        // re-read from the product: the buyer pays the price they saw.
        let detail = DetailActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            discount: Set(0),
            tax: Set(0),
            subtotal: Set(item.unit_price * item.quantity as i64),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        details.push(order_detail_from_entity(detail));

        if !inventory::decrement_stock(&txn, item.product_id, item.quantity).await? {
            // Validated a moment ago under lock, so this is belt over
            // braces; still, abort the whole conversion rather than
            // over-commit stock.
            let name = products
                .get(&item.product_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| item.product_id.to_string());
            return Err(AppError::InsufficientStock {
                product_id: item.product_id,
                name,
            });
        }
    }

    // The cart becomes immutable history; a fresh one appears lazily on
    // the next cart access.
    let mut cart_active: CartActive = cart.into();
    cart_active.active = Set(false);
    cart_active.status = Set("CONVERTED".into());
    cart_active.updated_at = Set(Utc::now().into());
    cart_active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, user_id = %user.user_id, "cart converted to order");
    audit::record(
        &state.pool,
        user.user_id,
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total": order.total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderSummary {
            order: order_from_entity(order),
            details,
            totals,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithDetails>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let details = OrderDetails::find()
        .filter(DetailCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_detail_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithDetails {
            order: order_from_entity(order),
            details,
        },
        Some(Meta::empty()),
    ))
}

pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<OrderWithDetails>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if order.payment_status == "paid" {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    if order.invoice_number != payload.invoice_number {
        return Err(AppError::BadRequest("Invoice number mismatch".into()));
    }

    let mut active: OrderActive = order.into();
    active.payment_status = Set("paid".into());
    active.status = Set("PAID".into());
    active.paid_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    let details = OrderDetails::find()
        .filter(DetailCol::OrderId.eq(order.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(order_detail_from_entity)
        .collect();

    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment recorded",
        OrderWithDetails {
            order: order_from_entity(order),
            details,
        },
        Some(Meta::empty()),
    ))
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        status: model.status,
        total_amount: model.total_amount,
        payment_status: model.payment_status,
        invoice_number: model.invoice_number,
        shipping_address: model.shipping_address,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_detail_from_entity(model: DetailModel) -> OrderDetail {
    OrderDetail {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        discount: model.discount,
        tax: model.tax,
        subtotal: model.subtotal,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("INV-{}-{}", date, short)
}
