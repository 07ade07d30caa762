use rust_decimal::{prelude::ToPrimitive, Decimal};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::entities::order;
use crate::error::ServiceError;
use crate::integrations::payment::{GatewayError, PaymentGateway};
use crate::services::{
    cart::{current, CartOwner},
    money,
    orders::{place_order, OrderView, ShippingDetails, VerifiedPayment},
};

/// Amount in the gateway's smallest currency unit, truncated.
pub fn to_minor_units(amount: Decimal) -> i64 {
    (money(amount) * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .unwrap_or(i64::MAX)
}

#[derive(Clone, Debug, Serialize)]
pub struct GatewayCheckout {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key: String,
    pub cart_total: Decimal,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VerifyPayment {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: Option<String>,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_id: Option<String>,
    #[serde(alias = "razorpay_signature")]
    pub gateway_signature: Option<String>,
    #[serde(flatten)]
    pub shipping: ShippingDetails,
}

fn gateway_failure(err: GatewayError) -> ServiceError {
    ServiceError::Gateway(err.to_string())
}

/// Opens a gateway order for the current cart total. Nothing is written
/// locally; the order only exists once the payment is verified.
pub async fn create_gateway_order(
    db: &DatabaseConnection,
    gateway: &dyn PaymentGateway,
    user_id: i32,
    email: &str,
) -> Result<GatewayCheckout, ServiceError> {
    let cart = current(db, &CartOwner::User(user_id)).await?;
    let cart_id = match cart.id {
        Some(id) if !cart.items.is_empty() => id,
        _ => return Err(ServiceError::validation("Cart is empty")),
    };

    let amount = to_minor_units(cart.total_price);
    let receipt = format!("cart-{cart_id}");
    let notes = json!({
        "user_id": user_id.to_string(),
        "user_email": email,
        "cart_id": cart_id.to_string(),
    });
    let created = gateway
        .create_order(amount, &receipt, notes)
        .await
        .map_err(|err| {
            error!(user_id, error = %err, "Failed to create gateway order");
            gateway_failure(err)
        })?;

    Ok(GatewayCheckout {
        gateway_order_id: created.id,
        amount: created.amount,
        currency: created.currency,
        key: gateway.key_id().to_owned(),
        cart_total: cart.total_price,
    })
}

async fn already_finalized(
    db: &DatabaseConnection,
    payment_id: &str,
) -> Result<bool, ServiceError> {
    Ok(order::Entity::find()
        .filter(order::Column::GatewayPaymentId.eq(payment_id))
        .one(db)
        .await?
        .is_some())
}

fn replayed() -> ServiceError {
    ServiceError::Conflict("Payment has already been processed".into())
}

/// Checks the payment signature and turns the cart into a paid order. A
/// payment id can finalize at most one order; replays are rejected and leave
/// the cart alone.
pub async fn verify_and_finalize(
    db: &DatabaseConnection,
    config: &AppConfig,
    gateway: &dyn PaymentGateway,
    user_id: i32,
    payload: VerifyPayment,
) -> Result<OrderView, ServiceError> {
    let (Some(order_id), Some(payment_id), Some(signature)) = (
        payload.gateway_order_id.filter(|v| !v.is_empty()),
        payload.gateway_payment_id.filter(|v| !v.is_empty()),
        payload.gateway_signature.filter(|v| !v.is_empty()),
    ) else {
        return Err(ServiceError::validation(
            "Missing payment verification parameters",
        ));
    };

    if let Err(err) = gateway.verify_payment_signature(&order_id, &payment_id, &signature) {
        warn!(user_id, gateway_order_id = %order_id, error = %err, "Payment signature rejected");
        return Err(match err {
            GatewayError::SignatureMismatch => {
                ServiceError::Verification("Payment verification failed".into())
            }
            other => gateway_failure(other),
        });
    }

    if already_finalized(db, &payment_id).await? {
        warn!(user_id, gateway_payment_id = %payment_id, "Replayed payment verification");
        return Err(replayed());
    }

    let txn = db.begin().await?;
    let payment = VerifiedPayment {
        gateway_order_id: order_id,
        gateway_payment_id: payment_id.clone(),
        gateway_signature: signature,
    };
    let view = match place_order(&txn, config, user_id, payload.shipping, Some(payment)).await {
        Ok(view) => view,
        Err(ServiceError::Database(err))
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
        {
            warn!(user_id, gateway_payment_id = %payment_id, "Concurrent replay of payment verification");
            return Err(replayed());
        }
        Err(err) => return Err(err),
    };
    txn.commit().await?;

    info!(
        order_number = %view.order.order_number,
        gateway_payment_id = %payment_id,
        total = %view.order.total_amount,
        "Payment verified and order created"
    );
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_truncate() {
        assert_eq!(to_minor_units(Decimal::new(4000, 2)), 4000);
        assert_eq!(to_minor_units(Decimal::new(1999, 2)), 1999);
        assert_eq!(to_minor_units(Decimal::new(10, 0)), 1000);
    }

    #[test]
    fn accepts_razorpay_field_names() {
        let payload: VerifyPayment = serde_json::from_str(
            r#"{"razorpay_order_id": "order_1", "razorpay_payment_id": "pay_1",
                "razorpay_signature": "abc", "shipping_city": "Pune"}"#,
        )
        .unwrap();
        assert_eq!(payload.gateway_order_id.as_deref(), Some("order_1"));
        assert_eq!(payload.shipping.shipping_city, "Pune");
    }
}
