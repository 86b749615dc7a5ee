use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Cart, Totals};

// Wire names on the cart surface are fixed by the public API contract
// (productoId / cantidad), hence the serde renames.

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    #[serde(rename = "productoId")]
    pub product_id: Uuid,
    #[serde(rename = "cantidad")]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    #[serde(rename = "cantidad")]
    pub quantity: i32,
}

/// A cart line joined with the live product row it references.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub saved_for_later: bool,
    /// Product still exists, is active, and covers the requested quantity.
    pub available: bool,
    /// Live price differs from the captured unit price.
    pub price_changed: bool,
}

/// The active cart with its derived view: line items plus totals
/// recomputed on every read.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItemView>,
    pub totals: Totals,
}
