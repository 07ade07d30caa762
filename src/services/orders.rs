use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    prelude::Decimal, sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::{
    cart_item,
    order::{self, PaymentMethod, PaymentStatus, Status},
    order_item, product, product_image,
};
use crate::error::ServiceError;
use crate::integrations::payment::PaymentGateway;
use crate::services::{
    cart::{find_cart, CartOwner},
    money,
    payment::to_minor_units,
};

static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").unwrap());

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ShippingDetails {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    pub shipping_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub shipping_email: String,
    #[validate(regex(path = *PHONE_REGEX, message = "must be a valid phone number"))]
    pub shipping_phone: String,
    #[validate(length(min = 1, message = "is required"))]
    pub shipping_address: String,
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub shipping_city: String,
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub shipping_state: String,
    #[validate(length(min = 1, max = 20, message = "is required"))]
    pub shipping_zip_code: String,
    pub shipping_country: Option<String>,
}

/// Gateway identifiers of a payment whose signature already checked out.
#[derive(Clone, Debug)]
pub struct VerifiedPayment {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderItemView {
    #[serde(flatten)]
    pub item: order_item::Model,
    pub product_image: Option<String>,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefundInfo {
    pub requested_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<OrderItemView>,
    pub can_cancel: bool,
    pub can_refund: bool,
    pub refund_status: Option<&'static str>,
    pub refund_info: Option<RefundInfo>,
}

impl OrderView {
    fn new(mut order: order::Model, items: Vec<OrderItemView>) -> Self {
        order.total_amount = money(order.total_amount);
        let can_cancel = order.check_cancel().is_ok();
        let can_refund = order.payment_status == PaymentStatus::Paid
            && matches!(order.status, Status::Shipped | Status::Delivered)
            && order.gateway_payment_id.is_some();
        let refund_status = match order.payment_status {
            PaymentStatus::RefundPending => Some("pending"),
            PaymentStatus::Refunded => Some("completed"),
            _ => None,
        };
        let refund_info = refund_status.map(|_| RefundInfo {
            requested_at: order.refund_requested_at,
            reason: order.refund_reason.clone(),
            completed_at: order.refund_completed_at,
        });
        OrderView {
            order,
            items,
            can_cancel,
            can_refund,
            refund_status,
            refund_info,
        }
    }
}

fn order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}

async fn primary_images<C: ConnectionTrait>(
    conn: &C,
    product_ids: Vec<i32>,
) -> Result<HashMap<i32, String>, ServiceError> {
    let mut images: HashMap<i32, (bool, String)> = HashMap::new();
    for image in product_image::Entity::find()
        .filter(product_image::Column::ProductId.is_in(product_ids))
        .order_by_asc(product_image::Column::Position)
        .all(conn)
        .await?
    {
        match images.get(&image.product_id) {
            Some((true, _)) => {}
            Some((false, _)) if !image.is_primary => {}
            _ => {
                images.insert(image.product_id, (image.is_primary, image.image_url));
            }
        }
    }
    Ok(images.into_iter().map(|(id, (_, url))| (id, url)).collect())
}

pub async fn build_views<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderView>, ServiceError> {
    let ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(ids))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;
    let images = primary_images(conn, items.iter().filter_map(|i| i.product_id).collect()).await?;

    let mut grouped: HashMap<i32, Vec<OrderItemView>> = HashMap::new();
    for mut item in items {
        item.product_price = money(item.product_price);
        grouped.entry(item.order_id).or_default().push(OrderItemView {
            product_image: item.product_id.and_then(|id| images.get(&id).cloned()),
            subtotal: money(item.subtotal()),
            item,
        });
    }

    Ok(orders
        .into_iter()
        .map(|o| {
            let items = grouped.remove(&o.id).unwrap_or_default();
            OrderView::new(o, items)
        })
        .collect())
}

async fn build_view<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderView, ServiceError> {
    build_views(conn, vec![order])
        .await?
        .pop()
        .ok_or_else(|| ServiceError::Internal("Order view missing".into()))
}

/// Turns the user's cart into an order inside the caller's transaction:
/// reserves stock for every line, snapshots names and prices, then empties
/// the cart. Any failure leaves the transaction to roll back.
pub async fn place_order<C: ConnectionTrait>(
    conn: &C,
    config: &AppConfig,
    user_id: i32,
    shipping: ShippingDetails,
    payment: Option<VerifiedPayment>,
) -> Result<OrderView, ServiceError> {
    shipping.validate()?;

    let cart = find_cart(conn, &CartOwner::User(user_id))
        .await?
        .ok_or_else(|| ServiceError::validation("Cart is empty"))?;
    let lines = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::AddedAt)
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?;
    if lines.is_empty() {
        return Err(ServiceError::validation("Cart is empty"));
    }

    let products: HashMap<i32, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(lines.iter().map(|l| l.product_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut total = Decimal::ZERO;
    for line in &lines {
        let product = products
            .get(&line.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::validation("A product in your cart is no longer available"))?;

        let reserved = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(line.quantity),
            )
            .col_expr(
                product::Column::InStock,
                Expr::expr(Expr::col(product::Column::Stock).sub(line.quantity)).gt(0),
            )
            .filter(product::Column::Id.eq(product.id))
            .filter(product::Column::Stock.gte(line.quantity))
            .exec(conn)
            .await?;
        if reserved.rows_affected == 0 {
            return Err(ServiceError::validation(format!(
                "Only {} items of {} available in stock",
                product.stock, product.name
            )));
        }
        total += money(product.price) * Decimal::from(line.quantity);
    }

    let now = Utc::now();
    let (status, payment_method, payment_status) = match payment {
        Some(_) => (Status::Processing, PaymentMethod::Gateway, PaymentStatus::Paid),
        None => (Status::Pending, PaymentMethod::Cod, PaymentStatus::Pending),
    };
    let created = order::ActiveModel {
        order_number: Set(order_number()),
        user_id: Set(user_id),
        total_amount: Set(money(total)),
        status: Set(status),
        payment_method: Set(payment_method),
        payment_status: Set(payment_status),
        shipping_name: Set(shipping.shipping_name),
        shipping_email: Set(shipping.shipping_email),
        shipping_phone: Set(shipping.shipping_phone),
        shipping_address: Set(shipping.shipping_address),
        shipping_city: Set(shipping.shipping_city),
        shipping_state: Set(shipping.shipping_state),
        shipping_zip_code: Set(shipping.shipping_zip_code),
        shipping_country: Set(shipping
            .shipping_country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| config.default_country.clone())),
        gateway_order_id: Set(payment.as_ref().map(|p| p.gateway_order_id.clone())),
        gateway_payment_id: Set(payment.as_ref().map(|p| p.gateway_payment_id.clone())),
        gateway_signature: Set(payment.map(|p| p.gateway_signature)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    for line in &lines {
        let Some(product) = products.get(&line.product_id) else {
            continue;
        };
        order_item::ActiveModel {
            order_id: Set(created.id),
            product_id: Set(Some(product.id)),
            product_name: Set(product.name.clone()),
            product_price: Set(money(product.price)),
            quantity: Set(line.quantity),
            selected_color: Set(line.selected_color.clone()),
            selected_size: Set(line.selected_size.clone()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }

    cart_item::Entity::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await?;

    build_view(conn, created).await
}

/// Cash-on-delivery checkout: the order starts pending and unpaid.
pub async fn checkout(
    db: &DatabaseConnection,
    config: &AppConfig,
    user_id: i32,
    shipping: ShippingDetails,
) -> Result<OrderView, ServiceError> {
    let txn = db.begin().await?;
    let view = place_order(&txn, config, user_id, shipping, None).await?;
    txn.commit().await?;

    info!(
        order_number = %view.order.order_number,
        user_id,
        total = %view.order.total_amount,
        "Order placed"
    );
    Ok(view)
}

async fn find_owned<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .filter(order::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order not found"))
}

pub async fn list_orders<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Vec<OrderView>, ServiceError> {
    let orders = order::Entity::find()
        .filter(order::Column::UserId.eq(user_id))
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(conn)
        .await?;
    build_views(conn, orders).await
}

pub async fn get_order<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    order_id: i32,
) -> Result<OrderView, ServiceError> {
    let order = find_owned(conn, user_id, order_id).await?;
    build_view(conn, order).await
}

fn concurrent_change() -> ServiceError {
    ServiceError::Conflict("Order was updated by another request, please retry".into())
}

/// Cancels a pending or processing order and puts its stock back. A paid
/// order moves to REFUND_PENDING; the refund itself is completed by the back
/// office.
pub async fn cancel(
    db: &DatabaseConnection,
    user_id: i32,
    order_id: i32,
    reason: Option<String>,
) -> Result<(OrderView, &'static str), ServiceError> {
    let txn = db.begin().await?;
    let current = find_owned(&txn, user_id, order_id).await?;
    let refund = current.check_cancel()?;

    let now = Utc::now();
    let mut update = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(Status::Cancelled))
        .col_expr(order::Column::CancelledAt, Expr::value(now))
        .col_expr(order::Column::UpdatedAt, Expr::value(now));
    if refund {
        let reason = reason
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Order cancelled by customer".to_owned());
        update = update
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::RefundPending))
            .col_expr(order::Column::RefundRequestedAt, Expr::value(now))
            .col_expr(order::Column::RefundReason, Expr::value(reason));
    }
    let changed = update
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Status.eq(current.status))
        .filter(order::Column::PaymentStatus.eq(current.payment_status))
        .exec(&txn)
        .await?;
    if changed.rows_affected == 0 {
        return Err(concurrent_change());
    }

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(current.id))
        .all(&txn)
        .await?;
    for item in items {
        let Some(product_id) = item.product_id else {
            continue;
        };
        product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(item.quantity),
            )
            .col_expr(
                product::Column::InStock,
                Expr::expr(Expr::col(product::Column::Stock).add(item.quantity)).gt(0),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(&txn)
            .await?;
    }

    let updated = find_owned(&txn, user_id, order_id).await?;
    let view = build_view(&txn, updated).await?;
    txn.commit().await?;

    info!(order_number = %view.order.order_number, refund, "Order cancelled");
    let message = if refund {
        "Order cancelled. Refund is being processed and will be completed within 5-7 business days."
    } else {
        "Order cancelled successfully."
    };
    Ok((view, message))
}

pub async fn request_refund(
    db: &DatabaseConnection,
    user_id: i32,
    order_id: i32,
    reason: &str,
) -> Result<OrderView, ServiceError> {
    let txn = db.begin().await?;
    let current = find_owned(&txn, user_id, order_id).await?;
    current.check_refund(reason)?;

    let now = Utc::now();
    let changed = order::Entity::update_many()
        .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::RefundPending))
        .col_expr(order::Column::RefundRequestedAt, Expr::value(now))
        .col_expr(order::Column::RefundReason, Expr::value(reason.trim().to_owned()))
        .col_expr(order::Column::UpdatedAt, Expr::value(now))
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
        .filter(order::Column::Status.eq(current.status))
        .exec(&txn)
        .await?;
    if changed.rows_affected == 0 {
        return Err(concurrent_change());
    }

    let updated = find_owned(&txn, user_id, order_id).await?;
    let view = build_view(&txn, updated).await?;
    txn.commit().await?;

    info!(order_number = %view.order.order_number, "Refund requested");
    Ok(view)
}

//Back office
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<String>,
}

pub async fn list_all_orders<C: ConnectionTrait>(
    conn: &C,
    filter: &OrderFilter,
) -> Result<Vec<OrderView>, ServiceError> {
    let mut select = order::Entity::find();
    if let Some(status) = filter.status.as_deref() {
        let status: Status = status.parse().map_err(ServiceError::Validation)?;
        select = select.filter(order::Column::Status.eq(status));
    }
    let orders = select
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(conn)
        .await?;
    build_views(conn, orders).await
}

async fn find_any<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order not found"))
}

pub async fn advance_status(
    db: &DatabaseConnection,
    order_id: i32,
    target: Status,
) -> Result<OrderView, ServiceError> {
    let current = find_any(db, order_id).await?;
    current.check_advance(target)?;

    let changed = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(target))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Status.eq(current.status))
        .filter(order::Column::PaymentStatus.eq(current.payment_status))
        .exec(db)
        .await?;
    if changed.rows_affected == 0 {
        return Err(concurrent_change());
    }

    info!(order_number = %current.order_number, from = %current.status, to = %target, "Order status advanced");
    build_view(db, find_any(db, order_id).await?).await
}

/// Marks a pending refund as done. With `execute_refund` the money is
/// returned through the gateway first and its refund id is kept.
pub async fn complete_refund(
    db: &DatabaseConnection,
    gateway: &dyn PaymentGateway,
    order_id: i32,
    execute_refund: bool,
) -> Result<OrderView, ServiceError> {
    let current = find_any(db, order_id).await?;
    current.check_complete_refund()?;

    let refund_id = match (execute_refund, current.gateway_payment_id.as_deref()) {
        (false, _) => None,
        (true, None) => return Err(ServiceError::validation("No payment ID found for refund")),
        (true, Some(payment_id)) => {
            let refund = gateway
                .refund(payment_id, Some(to_minor_units(current.total_amount)))
                .await
                .map_err(|err| {
                    warn!(order_number = %current.order_number, error = %err, "Gateway refund failed");
                    ServiceError::Gateway(err.to_string())
                })?;
            Some(refund.id)
        }
    };

    let now = Utc::now();
    let mut update = order::Entity::update_many()
        .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Refunded))
        .col_expr(order::Column::RefundCompletedAt, Expr::value(now))
        .col_expr(order::Column::UpdatedAt, Expr::value(now));
    if let Some(refund_id) = refund_id {
        update = update.col_expr(order::Column::GatewayRefundId, Expr::value(refund_id));
    }
    let changed = update
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::RefundPending))
        .exec(db)
        .await?;
    if changed.rows_affected == 0 {
        return Err(concurrent_change());
    }

    info!(order_number = %current.order_number, executed = execute_refund, "Refund completed");
    build_view(db, find_any(db, order_id).await?).await
}
