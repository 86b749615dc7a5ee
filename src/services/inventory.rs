//! The inventory ledger: the only code allowed to move `products.stock`.
//! Decrements are conditional writes so the count can never go negative,
//! no matter how many conversions race on the same product.

use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    entity::products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    error::{AppError, AppResult},
};

/// `stock = stock - quantity` guarded by `stock >= quantity`. Returns
/// whether the decrement applied; zero rows affected means the product is
/// gone or the stock no longer covers the quantity, and the caller must
/// abort its unit of work.
pub async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<bool> {
    let result = Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
        .filter(ProdCol::Id.eq(product_id))
        .filter(ProdCol::Stock.gte(quantity))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Unconditional restock (returns, cancellations).
pub async fn increment_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<bool> {
    let result = Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(quantity))
        .filter(ProdCol::Id.eq(product_id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Signed adjustment under a row lock, used by the admin surface. Fails
/// rather than letting stock drop below zero.
pub async fn adjust_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: i32,
) -> AppResult<crate::entity::products::Model> {
    let product = Products::find_by_id(product_id)
        .lock(LockType::Update)
        .one(conn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let new_stock = product.stock + delta;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    let updated = active.update(conn).await?;

    Ok(updated)
}
