use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddCartItemRequest, CartView, UpdateCartItemRequest},
    dto::orders::{CheckoutRequest, OrderSummary},
    error::AppResult,
    middleware::auth::{AuthUser, ensure_can_shop},
    models::CartItem,
    response::ApiResponse,
    services::{cart_service, order_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/{item_id}", put(update_item).delete(remove_item))
        .route("/items/{item_id}/save-for-later", post(save_for_later))
        .route("/items/{item_id}/restore", post(restore_item))
        .route("/checkout", post(checkout))
}

#[utoipa::path(
    get,
    path = "/api/carrito",
    responses(
        (status = 200, description = "Active cart with computed totals", body = ApiResponse<CartView>),
        (status = 404, description = "Unknown user"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartView>>> {
    ensure_can_shop(&user)?;
    let resp = cart_service::get_cart_view(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/carrito/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Item added or merged into the existing line", body = ApiResponse<CartItem>),
        (status = 400, description = "Invalid quantity or product unavailable"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartItemRequest>,
) -> AppResult<impl IntoResponse> {
    ensure_can_shop(&user)?;
    let resp = cart_service::add_item(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/carrito/items/{item_id}",
    params(
        ("item_id" = Uuid, Path, description = "Cart item ID")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated item", body = ApiResponse<CartItem>),
        (status = 204, description = "Quantity was zero or less; item removed"),
        (status = 403, description = "Item belongs to another cart"),
        (status = 404, description = "Item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Response> {
    ensure_can_shop(&user)?;
    let updated =
        cart_service::update_item_quantity(&state, &user, item_id, payload.quantity).await?;

    let response = match updated {
        Some(item) => Json(ApiResponse::success("Updated", item, None)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}

#[utoipa::path(
    delete,
    path = "/api/carrito/items/{item_id}",
    params(
        ("item_id" = Uuid, Path, description = "Cart item ID")
    ),
    responses(
        (status = 204, description = "Item removed"),
        (status = 403, description = "Item belongs to another cart"),
        (status = 404, description = "Item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    ensure_can_shop(&user)?;
    cart_service::remove_item(&state, &user, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/carrito",
    responses(
        (status = 204, description = "Cart cleared (idempotent)"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> AppResult<StatusCode> {
    ensure_can_shop(&user)?;
    cart_service::clear(&state, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/carrito/items/{item_id}/save-for-later",
    params(
        ("item_id" = Uuid, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Item parked; excluded from totals and checkout", body = ApiResponse<CartItem>),
        (status = 403, description = "Item belongs to another cart"),
        (status = 404, description = "Item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn save_for_later(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    ensure_can_shop(&user)?;
    let resp = cart_service::save_item_for_later(&state, &user, item_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/carrito/items/{item_id}/restore",
    params(
        ("item_id" = Uuid, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Item restored to the active cart", body = ApiResponse<CartItem>),
        (status = 403, description = "Item belongs to another cart"),
        (status = 404, description = "Item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn restore_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    ensure_can_shop(&user)?;
    let resp = cart_service::restore_item(&state, &user, item_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/carrito/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Cart converted to an order", body = ApiResponse<OrderSummary>),
        (status = 400, description = "Cart not ready; body carries code EMPTY, HAS_UNAVAILABLE_ITEMS or INSUFFICIENT_STOCK"),
        (status = 409, description = "Cart already converted, or stock raced away during conversion"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Option<Json<CheckoutRequest>>,
) -> AppResult<Json<ApiResponse<OrderSummary>>> {
    ensure_can_shop(&user)?;
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resp = order_service::checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}
