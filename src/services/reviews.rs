use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::Decimal, sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use validator::Validate;

use crate::entities::{product, review, user};
use crate::error::ServiceError;

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewReview {
    pub product_id: i32,
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub rating: i32,
    #[serde(default)]
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub comment: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewView {
    pub id: i32,
    pub product_id: i32,
    pub user: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Arithmetic mean rounded to one decimal place.
pub fn mean_rating(ratings: &[i32]) -> Decimal {
    if ratings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    (Decimal::from(sum) / Decimal::from(ratings.len() as i64)).round_dp(1)
}

fn display_name(user: &user::Model) -> String {
    let full = format!("{} {}", user.first_name, user.last_name);
    match full.trim() {
        "" => user.email.split('@').next().unwrap_or_default().to_owned(),
        name => name.to_owned(),
    }
}

async fn views<C: ConnectionTrait>(
    conn: &C,
    reviews: Vec<review::Model>,
) -> Result<Vec<ReviewView>, ServiceError> {
    let names: HashMap<i32, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(reviews.iter().map(|r| r.user_id)))
        .all(conn)
        .await?
        .iter()
        .map(|u| (u.id, display_name(u)))
        .collect();

    Ok(reviews
        .into_iter()
        .map(|r| ReviewView {
            id: r.id,
            product_id: r.product_id,
            user: names.get(&r.user_id).cloned().unwrap_or_default(),
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
        })
        .collect())
}

pub async fn list_reviews<C: ConnectionTrait>(
    conn: &C,
    product_id: Option<i32>,
) -> Result<Vec<ReviewView>, ServiceError> {
    let mut select = review::Entity::find();
    if let Some(product_id) = product_id {
        select = select.filter(review::Column::ProductId.eq(product_id));
    }
    let reviews = select
        .order_by_desc(review::Column::CreatedAt)
        .order_by_desc(review::Column::Id)
        .all(conn)
        .await?;
    views(conn, reviews).await
}

/// Stores the review and recomputes the product's rating and review count
/// from every stored review, all in one transaction.
pub async fn add_review(
    db: &DatabaseConnection,
    user_id: i32,
    payload: NewReview,
) -> Result<ReviewView, ServiceError> {
    payload.validate()?;

    let txn = db.begin().await?;
    product::Entity::find_by_id(payload.product_id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product not found"))?;

    let duplicate = || ServiceError::validation("You have already reviewed this product");
    let existing = review::Entity::find()
        .filter(review::Column::ProductId.eq(payload.product_id))
        .filter(review::Column::UserId.eq(user_id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(duplicate());
    }

    let created = review::ActiveModel {
        product_id: Set(payload.product_id),
        user_id: Set(user_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment.trim().to_owned()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => duplicate(),
        _ => ServiceError::from(err),
    })?;

    let ratings: Vec<i32> = review::Entity::find()
        .filter(review::Column::ProductId.eq(payload.product_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();
    let rating = mean_rating(&ratings);

    product::Entity::update_many()
        .col_expr(product::Column::Rating, Expr::value(rating))
        .col_expr(product::Column::ReviewsCount, Expr::value(ratings.len() as i32))
        .filter(product::Column::Id.eq(payload.product_id))
        .exec(&txn)
        .await?;

    let view = views(&txn, vec![created])
        .await?
        .pop()
        .ok_or_else(|| ServiceError::Internal("Review view missing".into()))?;
    txn.commit().await?;

    info!(product_id = payload.product_id, user_id, %rating, "Review added");
    Ok(view)
}
