use sea_orm::entity::prelude::*;
use serde::Serialize;
use std::str::FromStr;

use crate::error::ServiceError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "order")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_number: String,
    #[sea_orm(indexed)]
    #[serde(skip)]
    pub user_id: i32,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,
    pub status: Status,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub shipping_name: String,
    pub shipping_email: String,
    pub shipping_phone: String,
    #[sea_orm(column_type = "Text")]
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_zip_code: String,
    pub shipping_country: String,
    pub gateway_order_id: Option<String>,
    /// Unique so a verified payment can finalize at most one order.
    #[sea_orm(unique)]
    pub gateway_payment_id: Option<String>,
    #[serde(skip)]
    pub gateway_signature: Option<String>,
    pub gateway_refund_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub refund_reason: Option<String>,
    pub refund_requested_at: Option<DateTimeUtc>,
    pub refund_completed_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(
    enum_name = "status_enum",
    db_type = "String(StringLen::N(20))",
    rs_type = "String"
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl Status {
    /// The only status an order may advance to from this one.
    pub fn next(self) -> Option<Status> {
        match self {
            Self::Pending => Some(Self::Processing),
            Self::Processing => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        };
        f.write_str(value)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(
    enum_name = "payment_status_enum",
    db_type = "String(StringLen::N(20))",
    rs_type = "String"
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "REFUND_PENDING")]
    RefundPending,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::RefundPending => "REFUND_PENDING",
            Self::Refunded => "REFUNDED",
        };
        f.write_str(value)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(
    enum_name = "payment_method_enum",
    db_type = "String(StringLen::N(20))",
    rs_type = "String"
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "gateway")]
    Gateway,
    #[sea_orm(string_value = "cod")]
    Cod,
}

// Transition rules. They only inspect the order; callers persist the result.
impl Model {
    fn rejected_by_status(&self, action: &'static str) -> ServiceError {
        ServiceError::InvalidTransition {
            current: format!("status: {}", self.status),
            action,
        }
    }

    fn rejected_by_payment(&self, action: &'static str) -> ServiceError {
        ServiceError::InvalidTransition {
            current: format!("payment status: {}", self.payment_status),
            action,
        }
    }

    /// Returns whether cancelling must also open a refund.
    pub fn check_cancel(&self) -> Result<bool, ServiceError> {
        if !matches!(self.status, Status::Pending | Status::Processing) {
            return Err(self.rejected_by_status("cancel"));
        }
        match self.payment_status {
            PaymentStatus::RefundPending | PaymentStatus::Refunded => {
                Err(self.rejected_by_payment("cancel"))
            }
            PaymentStatus::Paid => Ok(true),
            PaymentStatus::Pending | PaymentStatus::Failed => Ok(false),
        }
    }

    pub fn check_refund(&self, reason: &str) -> Result<(), ServiceError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(self.rejected_by_payment("refund"));
        }
        if !matches!(self.status, Status::Shipped | Status::Delivered) {
            return Err(self.rejected_by_status("refund"));
        }
        if self.gateway_payment_id.is_none() {
            return Err(ServiceError::validation("No payment ID found for refund"));
        }
        if reason.trim().is_empty() {
            return Err(ServiceError::validation("Refund reason is required"));
        }
        Ok(())
    }

    pub fn check_complete_refund(&self) -> Result<(), ServiceError> {
        match self.payment_status {
            PaymentStatus::RefundPending => Ok(()),
            _ => Err(self.rejected_by_payment("complete refund for")),
        }
    }

    pub fn check_advance(&self, target: Status) -> Result<(), ServiceError> {
        if self.status.next() != Some(target) {
            return Err(self.rejected_by_status("advance"));
        }
        if matches!(
            self.payment_status,
            PaymentStatus::RefundPending | PaymentStatus::Refunded
        ) {
            return Err(self.rejected_by_payment("advance"));
        }
        Ok(())
    }
}
