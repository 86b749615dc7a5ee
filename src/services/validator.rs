//! Checkout-readiness classification. Pure over already-loaded rows: the
//! conversion engine feeds it product rows it has just read and locked, so
//! the verdict is never stale at the moment it matters.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{CartItem, CartState, Product};

/// Classify a cart. Rules are evaluated in order and the first match wins:
/// empty, then unavailable products, then stock shortfalls, then ready.
/// Saved-for-later lines are invisible here.
pub fn classify(items: &[CartItem], products: &HashMap<Uuid, Product>) -> CartState {
    let checked: Vec<&CartItem> = items.iter().filter(|i| !i.saved_for_later).collect();

    if checked.is_empty() {
        return CartState::Empty;
    }

    for item in &checked {
        match products.get(&item.product_id) {
            None => {
                return CartState::HasUnavailableItems {
                    product_id: item.product_id,
                    name: None,
                };
            }
            Some(product) if !product.active => {
                return CartState::HasUnavailableItems {
                    product_id: product.id,
                    name: Some(product.name.clone()),
                };
            }
            Some(_) => {}
        }
    }

    for item in &checked {
        // Unwrap is safe: the previous pass returned on any missing product.
        let product = &products[&item.product_id];
        if item.quantity > product.stock {
            return CartState::InsufficientStock {
                product_id: product.id,
                name: product.name.clone(),
                available: product.stock,
                requested: item.quantity,
            };
        }
    }

    CartState::Ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: Uuid, stock: i32, active: bool) -> Product {
        Product {
            id,
            name: format!("product-{id}"),
            description: None,
            price: 1_000,
            stock,
            active,
            created_at: Utc::now(),
        }
    }

    fn item(product_id: Uuid, quantity: i32, saved_for_later: bool) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id,
            quantity,
            unit_price: 1_000,
            saved_for_later,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_items_is_empty() {
        assert_eq!(classify(&[], &HashMap::new()), CartState::Empty);
    }

    #[test]
    fn only_saved_items_is_empty() {
        let pid = Uuid::new_v4();
        let products = HashMap::from([(pid, product(pid, 10, true))]);
        assert_eq!(classify(&[item(pid, 2, true)], &products), CartState::Empty);
    }

    #[test]
    fn deleted_product_is_unavailable() {
        let pid = Uuid::new_v4();
        let state = classify(&[item(pid, 1, false)], &HashMap::new());
        assert_eq!(state.code(), "HAS_UNAVAILABLE_ITEMS");
        assert_eq!(state.blocking_product(), Some(pid));
    }

    #[test]
    fn inactive_product_is_unavailable() {
        let pid = Uuid::new_v4();
        let products = HashMap::from([(pid, product(pid, 10, false))]);
        let state = classify(&[item(pid, 1, false)], &products);
        assert_eq!(state.code(), "HAS_UNAVAILABLE_ITEMS");
    }

    #[test]
    fn unavailable_wins_over_insufficient_stock() {
        // One inactive product, another over-requested: rule 2 fires first
        // even though the stock rule would also match.
        let inactive = Uuid::new_v4();
        let short = Uuid::new_v4();
        let products = HashMap::from([
            (inactive, product(inactive, 10, false)),
            (short, product(short, 1, true)),
        ]);
        let state = classify(
            &[item(short, 5, false), item(inactive, 1, false)],
            &products,
        );
        assert_eq!(state.code(), "HAS_UNAVAILABLE_ITEMS");
    }

    #[test]
    fn over_requested_quantity_is_insufficient_stock() {
        let pid = Uuid::new_v4();
        let products = HashMap::from([(pid, product(pid, 5, true))]);
        let state = classify(&[item(pid, 10, false)], &products);
        match state {
            CartState::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 5);
                assert_eq!(requested, 10);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn exact_stock_is_ready() {
        let pid = Uuid::new_v4();
        let products = HashMap::from([(pid, product(pid, 5, true))]);
        assert_eq!(classify(&[item(pid, 5, false)], &products), CartState::Ready);
    }
}
