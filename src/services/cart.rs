use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::Decimal, sea_query::Expr, sea_query::SimpleExpr, ActiveModelTrait, ColumnTrait,
    ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::entities::{cart, cart_item, product};
use crate::error::ServiceError;
use crate::services::{
    catalog::{summarize, ProductSummary},
    money,
};

/// Whoever a cart belongs to. Resolved per request by the cart middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartOwner {
    User(i32),
    Session(String),
}

impl CartOwner {
    fn filter(&self) -> SimpleExpr {
        match self {
            CartOwner::User(id) => cart::Column::UserId.eq(*id),
            CartOwner::Session(token) => cart::Column::SessionId.eq(token.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub id: Option<i32>,
    pub items: Vec<CartLineView>,
    pub total_price: Decimal,
    pub total_items: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLineView {
    pub id: i32,
    pub product: ProductSummary,
    pub quantity: i32,
    pub selected_color: Option<String>,
    pub selected_size: Option<String>,
    pub subtotal: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddItem {
    pub product_id: i32,
    #[serde(default = "one")]
    pub quantity: i32,
    pub selected_color: Option<String>,
    pub selected_size: Option<String>,
}

fn one() -> i32 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdateItem {
    pub item_id: i32,
    pub quantity: i32,
}

#[derive(Clone, Debug)]
pub struct AddOutcome {
    pub cart: CartView,
    /// Set when an identical add landed inside the debounce window and was
    /// ignored.
    pub debounced: bool,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn same_variant(column: cart_item::Column, value: &Option<String>) -> SimpleExpr {
    match value {
        Some(v) => column.eq(v.clone()),
        None => column.is_null(),
    }
}

pub async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> Result<Option<cart::Model>, ServiceError> {
    Ok(cart::Entity::find().filter(owner.filter()).one(conn).await?)
}

async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> Result<cart::Model, ServiceError> {
    if let Some(existing) = find_cart(conn, owner).await? {
        return Ok(existing);
    }
    let now = Utc::now();
    let (user_id, session_id) = match owner {
        CartOwner::User(id) => (Some(*id), None),
        CartOwner::Session(token) => (None, Some(token.clone())),
    };
    let created = cart::ActiveModel {
        user_id: Set(user_id),
        session_id: Set(session_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    debug!(cart_id = created.id, owner = ?owner, "Cart created");
    Ok(created)
}

async fn touch<C: ConnectionTrait>(conn: &C, cart_id: i32) -> Result<(), ServiceError> {
    cart::Entity::update_many()
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Full recomputed cart: every line with its product and subtotal, plus the
/// totals.
pub async fn build_view<C: ConnectionTrait>(
    conn: &C,
    cart: Option<&cart::Model>,
) -> Result<CartView, ServiceError> {
    let Some(cart) = cart else {
        return Ok(CartView {
            id: None,
            items: Vec::new(),
            total_price: money(Decimal::ZERO),
            total_items: 0,
        });
    };

    let lines = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::AddedAt)
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?;

    let ids: Vec<i32> = lines.iter().map(|l| l.product_id).collect();
    let products = product::Entity::find()
        .filter(product::Column::Id.is_in(ids))
        .all(conn)
        .await?;
    let summaries: HashMap<i32, ProductSummary> = summarize(conn, products)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let Some(product) = summaries.get(&line.product_id).cloned() else {
            continue;
        };
        items.push(CartLineView {
            id: line.id,
            subtotal: money(product.price * Decimal::from(line.quantity)),
            product,
            quantity: line.quantity,
            selected_color: line.selected_color,
            selected_size: line.selected_size,
            added_at: line.added_at,
        });
    }

    Ok(CartView {
        id: Some(cart.id),
        total_price: money(items.iter().map(|i| i.subtotal).sum()),
        total_items: items.iter().map(|i| i.quantity).sum(),
        items,
    })
}

pub async fn current<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> Result<CartView, ServiceError> {
    let cart = find_cart(conn, owner).await?;
    build_view(conn, cart.as_ref()).await
}

pub async fn add_item<C: TransactionTrait>(
    db: &C,
    config: &AppConfig,
    owner: &CartOwner,
    payload: AddItem,
) -> Result<AddOutcome, ServiceError> {
    if payload.quantity < 1 {
        return Err(ServiceError::validation("Quantity must be at least 1"));
    }
    let color = blank_to_none(payload.selected_color);
    let size = blank_to_none(payload.selected_size);

    let txn = db.begin().await?;
    let product = product::Entity::find_by_id(payload.product_id)
        .filter(product::Column::IsActive.eq(true))
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product not found"))?;

    if !product.in_stock || product.stock < payload.quantity {
        return Err(ServiceError::validation(
            "Product is out of stock or insufficient quantity",
        ));
    }

    let cart = get_or_create_cart(&txn, owner).await?;
    let line = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .filter(cart_item::Column::ProductId.eq(product.id))
        .filter(same_variant(cart_item::Column::SelectedColor, &color))
        .filter(same_variant(cart_item::Column::SelectedSize, &size))
        .one(&txn)
        .await?;

    let now = Utc::now();
    let debounced = match line {
        Some(line) if now.signed_duration_since(line.updated_at) < config.cart_debounce => {
            debug!(cart_item_id = line.id, "Ignoring repeated add inside debounce window");
            true
        }
        Some(line) => {
            // The quantity guard makes the increment and the stock check one
            // statement.
            let updated = cart_item::Entity::update_many()
                .col_expr(
                    cart_item::Column::Quantity,
                    Expr::col(cart_item::Column::Quantity).add(payload.quantity),
                )
                .col_expr(cart_item::Column::UpdatedAt, Expr::value(now))
                .filter(cart_item::Column::Id.eq(line.id))
                .filter(cart_item::Column::Quantity.lte(product.stock - payload.quantity))
                .exec(&txn)
                .await?;
            if updated.rows_affected == 0 {
                return Err(ServiceError::validation(format!(
                    "Only {} items available in stock",
                    product.stock
                )));
            }
            false
        }
        None => {
            cart_item::ActiveModel {
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(payload.quantity),
                selected_color: Set(color),
                selected_size: Set(size),
                added_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            false
        }
    };

    if !debounced {
        touch(&txn, cart.id).await?;
    }
    let view = build_view(&txn, Some(&cart)).await?;
    txn.commit().await?;

    if !debounced {
        info!(cart_id = cart.id, product_id = product.id, quantity = payload.quantity, "Item added to cart");
    }
    Ok(AddOutcome {
        cart: view,
        debounced,
    })
}

pub async fn update_item<C: TransactionTrait>(
    db: &C,
    owner: &CartOwner,
    payload: UpdateItem,
) -> Result<CartView, ServiceError> {
    if payload.quantity < 1 {
        return Err(ServiceError::validation("Quantity must be at least 1"));
    }

    let txn = db.begin().await?;
    let cart = find_cart(&txn, owner)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart item not found"))?;
    let line = cart_item::Entity::find_by_id(payload.item_id)
        .filter(cart_item::Column::CartId.eq(cart.id))
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart item not found"))?;
    let product = product::Entity::find_by_id(line.product_id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product not found"))?;

    if product.stock < payload.quantity {
        return Err(ServiceError::validation(format!(
            "Only {} items available",
            product.stock
        )));
    }

    let mut active: cart_item::ActiveModel = line.into();
    active.quantity = Set(payload.quantity);
    active.updated_at = Set(Utc::now());
    active.update(&txn).await?;
    touch(&txn, cart.id).await?;

    let view = build_view(&txn, Some(&cart)).await?;
    txn.commit().await?;
    Ok(view)
}

pub async fn remove_item<C: TransactionTrait>(
    db: &C,
    owner: &CartOwner,
    item_id: i32,
) -> Result<CartView, ServiceError> {
    let txn = db.begin().await?;
    let cart = find_cart(&txn, owner)
        .await?
        .ok_or_else(|| ServiceError::not_found("Cart item not found"))?;

    let deleted = cart_item::Entity::delete_many()
        .filter(cart_item::Column::Id.eq(item_id))
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found("Cart item not found"));
    }
    touch(&txn, cart.id).await?;

    let view = build_view(&txn, Some(&cart)).await?;
    txn.commit().await?;
    Ok(view)
}

/// Empties the cart. Returns the cart and how many lines were removed.
pub async fn clear<C: TransactionTrait>(
    db: &C,
    owner: &CartOwner,
) -> Result<(CartView, u64), ServiceError> {
    let txn = db.begin().await?;
    let Some(cart) = find_cart(&txn, owner).await? else {
        return Ok((build_view(&txn, None).await?, 0));
    };

    let removed = cart_item::Entity::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(&txn)
        .await?
        .rows_affected;
    touch(&txn, cart.id).await?;

    let view = build_view(&txn, Some(&cart)).await?;
    txn.commit().await?;
    Ok((view, removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_variants_are_unset() {
        assert_eq!(blank_to_none(Some("  ".into())), None);
        assert_eq!(blank_to_none(Some(" Red ".into())), Some("Red".into()));
        assert_eq!(blank_to_none(None), None);
    }

    #[test]
    fn add_defaults_to_one() {
        let payload: AddItem = serde_json::from_str(r#"{"product_id": 3}"#).unwrap();
        assert_eq!(payload.quantity, 1);
        assert!(payload.selected_color.is_none());
    }
}
