use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddCartItemRequest, CartItemView, CartView},
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as ItemCol, Entity as CartItems,
            Model as CartItemModel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem},
    response::{ApiResponse, Meta},
    services::pricing,
    state::AppState,
};

/// Safety cap carried over from the storefront rules: no line may hold
/// more than this many units.
pub const MAX_ITEM_QUANTITY: i32 = 100;

/// Resolve the caller to a shopper. Unknown users are NotFound; inactive
/// users and vendors may not hold a cart.
async fn resolve_shopper<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<()> {
    let user = Users::find_by_id(user_id).one(conn).await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    if !user.active || (user.role != "customer" && user.role != "admin") {
        return Err(AppError::Forbidden);
    }

    Ok(())
}

/// The user's active cart, created lazily on first access.
pub async fn get_or_create_active_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<CartModel> {
    let existing = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .filter(CartCol::Active.eq(true))
        .one(conn)
        .await?;

    if let Some(cart) = existing {
        return Ok(cart);
    }

    tracing::info!(%user_id, "creating new cart");
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        active: Set(true),
        status: Set("ACTIVE".into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;

    Ok(cart)
}

/// The active cart joined with live product rows, totals recomputed on
/// every read.
pub async fn get_cart_view(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    resolve_shopper(&state.orm, user.user_id).await?;
    let cart = get_or_create_active_cart(&state.orm, user.user_id).await?;

    let items = CartItems::find()
        .filter(ItemCol::CartId.eq(cart.id))
        .order_by_asc(ItemCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let domain_items: Vec<CartItem> = items.iter().map(cart_item_from_entity).collect();
    let totals = pricing::compute_totals(&domain_items, 0);

    let item_views = items
        .iter()
        .map(|item| {
            let product = products.get(&item.product_id);
            CartItemView {
                id: item.id,
                product_id: item.product_id,
                product_name: product.map(|p| p.name.clone()),
                quantity: item.quantity,
                unit_price: item.unit_price,
                saved_for_later: item.saved_for_later,
                available: product
                    .map(|p| p.active && p.stock >= item.quantity)
                    .unwrap_or(false),
                price_changed: product.map(|p| p.price != item.unit_price).unwrap_or(false),
            }
        })
        .collect();

    let view = CartView {
        cart: cart_from_entity(cart),
        items: item_views,
        totals,
    };

    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

/// Add a product to the active cart. Re-adding an existing product merges
/// into the one line per (cart, product); the unit price stays the one
/// captured on first add.
pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    ensure_valid_quantity(payload.quantity)?;

    let txn = state.orm.begin().await?;

    resolve_shopper(&txn, user.user_id).await?;
    let cart = get_or_create_active_cart(&txn, user.user_id).await?;

    let product = Products::find_by_id(payload.product_id).one(&txn).await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let existing = CartItems::find()
        .filter(ItemCol::CartId.eq(cart.id))
        .filter(ItemCol::ProductId.eq(product.id))
        .one(&txn)
        .await?;

    let item = match existing {
        Some(existing) => {
            let quantity = existing.quantity + payload.quantity;
            ensure_valid_quantity(quantity)?;
            ensure_product_available(&product, quantity)?;

            let mut active: CartItemActive = existing.into();
            active.quantity = Set(quantity);
            // A saved line the user adds to again belongs back in the cart.
            active.saved_for_later = Set(false);
            active.update(&txn).await?
        }
        None => {
            ensure_product_available(&product, payload.quantity)?;

            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(payload.quantity),
                unit_price: Set(product.price),
                saved_for_later: Set(false),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?
        }
    };

    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_item_add",
        "cart_items",
        serde_json::json!({ "product_id": item.product_id, "quantity": item.quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Added to cart",
        cart_item_from_entity(&item),
        None,
    ))
}

/// Set a line's quantity. A quantity of zero or less removes the line and
/// yields None, matching the 204 on the wire.
pub async fn update_item_quantity(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    quantity: i32,
) -> AppResult<Option<CartItem>> {
    if quantity <= 0 {
        remove_item(state, user, item_id).await?;
        return Ok(None);
    }
    ensure_valid_quantity(quantity)?;

    let txn = state.orm.begin().await?;

    resolve_shopper(&txn, user.user_id).await?;
    let cart = get_or_create_active_cart(&txn, user.user_id).await?;
    let item = find_owned_item(&txn, &cart, item_id).await?;

    let product = Products::find_by_id(item.product_id).one(&txn).await?;
    let product = match product {
        Some(p) => p,
        None => {
            return Err(AppError::BadRequest(format!(
                "product no longer exists: {}",
                item.product_id
            )));
        }
    };
    ensure_product_available(&product, quantity)?;

    let mut active: CartItemActive = item.into();
    active.quantity = Set(quantity);
    let item = active.update(&txn).await?;

    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_item_update",
        "cart_items",
        serde_json::json!({ "item_id": item.id, "quantity": item.quantity }),
    )
    .await;

    Ok(Some(cart_item_from_entity(&item)))
}

pub async fn remove_item(state: &AppState, user: &AuthUser, item_id: Uuid) -> AppResult<()> {
    let txn = state.orm.begin().await?;

    resolve_shopper(&txn, user.user_id).await?;
    let cart = get_or_create_active_cart(&txn, user.user_id).await?;
    let item = find_owned_item(&txn, &cart, item_id).await?;

    CartItems::delete_by_id(item.id).exec(&txn).await?;
    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_item_remove",
        "cart_items",
        serde_json::json!({ "item_id": item_id }),
    )
    .await;

    Ok(())
}

/// Empty the active cart. Idempotent: clearing an already-empty cart is
/// not an error.
pub async fn clear(state: &AppState, user: &AuthUser) -> AppResult<()> {
    let txn = state.orm.begin().await?;

    resolve_shopper(&txn, user.user_id).await?;
    let cart = get_or_create_active_cart(&txn, user.user_id).await?;

    CartItems::delete_many()
        .filter(ItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_clear",
        "cart_items",
        serde_json::json!({}),
    )
    .await;

    Ok(())
}

/// Park a line without deleting it; it no longer counts toward totals or
/// checkout.
pub async fn save_item_for_later(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    set_saved_flag(state, user, item_id, true).await
}

/// Bring a parked line back into the active cart.
pub async fn restore_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    set_saved_flag(state, user, item_id, false).await
}

async fn set_saved_flag(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    saved: bool,
) -> AppResult<ApiResponse<CartItem>> {
    let txn = state.orm.begin().await?;

    resolve_shopper(&txn, user.user_id).await?;
    let cart = get_or_create_active_cart(&txn, user.user_id).await?;
    let item = find_owned_item(&txn, &cart, item_id).await?;

    let mut active: CartItemActive = item.into();
    active.saved_for_later = Set(saved);
    let item = active.update(&txn).await?;

    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    let action = if saved {
        "cart_item_saved"
    } else {
        "cart_item_restored"
    };
    audit::record(
        &state.pool,
        user.user_id,
        action,
        "cart_items",
        serde_json::json!({ "item_id": item.id }),
    )
    .await;

    let message = if saved {
        "Saved for later"
    } else {
        "Restored to cart"
    };
    Ok(ApiResponse::success(
        message,
        cart_item_from_entity(&item),
        None,
    ))
}

/// Fetch a line and verify it belongs to the caller's cart. An ownership
/// mismatch is Forbidden, never a silent success.
async fn find_owned_item<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
    item_id: Uuid,
) -> AppResult<CartItemModel> {
    let item = CartItems::find_by_id(item_id).one(conn).await?;
    let item = match item {
        Some(i) => i,
        None => return Err(AppError::NotFound),
    };

    if item.cart_id != cart.id {
        return Err(AppError::Forbidden);
    }

    Ok(item)
}

async fn touch_cart<C: ConnectionTrait>(conn: &C, cart: CartModel) -> AppResult<()> {
    let mut active: CartActive = cart.into();
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

fn ensure_valid_quantity(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "no more than {MAX_ITEM_QUANTITY} units of a product"
        )));
    }
    Ok(())
}

/// Add-time availability check. Checkout re-validates inside its own
/// transaction; this one exists so the user hears about a problem while
/// still editing the cart.
fn ensure_product_available(product: &ProductModel, quantity: i32) -> AppResult<()> {
    if !product.active {
        return Err(AppError::BadRequest(format!(
            "product not available: {}",
            product.name
        )));
    }
    if product.stock < quantity {
        return Err(AppError::BadRequest(format!(
            "insufficient stock for {}: available {}, requested {}",
            product.name, product.stock, quantity
        )));
    }
    Ok(())
}

pub(crate) fn cart_from_entity(model: CartModel) -> Cart {
    Cart {
        id: model.id,
        user_id: model.user_id,
        active: model.active,
        status: model.status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn cart_item_from_entity(model: &CartItemModel) -> CartItem {
    CartItem {
        id: model.id,
        cart_id: model.cart_id,
        product_id: model.product_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        saved_for_later: model.saved_for_later,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
