use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Minor units (cents).
    pub price: i64,
    pub stock: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The mutable shopping cart. At most one row per user has `active = true`;
/// deactivated carts are immutable history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub active: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Captured when the product is first added; deliberately not resynced,
    /// so the buyer is charged the price they saw.
    pub unit_price: i64,
    pub saved_for_later: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: i64,
    pub payment_status: String,
    pub invoice_number: String,
    pub shipping_address: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub discount: i64,
    pub tax: i64,
    pub subtotal: i64,
    pub created_at: DateTime<Utc>,
}

/// Derived pricing breakdown for a cart. Never persisted from a cart view;
/// the order row stores the figures recomputed at conversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Totals {
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub shipping: i64,
    pub grand_total: i64,
}

/// Checkout-readiness of a cart. Produced by the validator; only `Ready`
/// carts may convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartState {
    Empty,
    HasUnavailableItems {
        product_id: Uuid,
        name: Option<String>,
    },
    InsufficientStock {
        product_id: Uuid,
        name: String,
        available: i32,
        requested: i32,
    },
    Ready,
}

impl CartState {
    pub fn code(&self) -> &'static str {
        match self {
            CartState::Empty => "EMPTY",
            CartState::HasUnavailableItems { .. } => "HAS_UNAVAILABLE_ITEMS",
            CartState::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CartState::Ready => "READY",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CartState::Ready)
    }

    /// The product blocking checkout, when one can be named.
    pub fn blocking_product(&self) -> Option<Uuid> {
        match self {
            CartState::HasUnavailableItems { product_id, .. }
            | CartState::InsufficientStock { product_id, .. } => Some(*product_id),
            _ => None,
        }
    }
}

impl std::fmt::Display for CartState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartState::Empty => write!(f, "cart is empty"),
            CartState::HasUnavailableItems { product_id, name } => match name {
                Some(name) => write!(f, "product not available: {name}"),
                None => write!(f, "product no longer exists: {product_id}"),
            },
            CartState::InsufficientStock {
                name,
                available,
                requested,
                ..
            } => write!(
                f,
                "insufficient stock for {name}: available {available}, requested {requested}"
            ),
            CartState::Ready => write!(f, "ready"),
        }
    }
}
