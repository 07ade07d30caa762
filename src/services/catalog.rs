use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    prelude::Decimal, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    JoinType, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use validator::Validate;

use crate::entities::{
    category, product, product_color, product_image, product_material, product_size,
    product_specification,
};
use crate::error::ServiceError;
use crate::services::money;

static SLUG_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    SLUG_SEPARATOR
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_owned()
}

//Views
#[derive(Clone, Debug, Serialize)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub category: String,
    pub image: Option<String>,
    pub images: Vec<product_image::Model>,
    pub rating: Decimal,
    pub reviews_count: i32,
    pub stock: i32,
    pub in_stock: bool,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub summary: ProductSummary,
    pub category_slug: String,
    pub original_price: Option<Decimal>,
    pub description: String,
    pub specifications: Vec<String>,
    pub material: Option<MaterialView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MaterialView {
    pub shell: Option<String>,
    pub lining: Option<String>,
    pub care_instructions: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u64,
    pub total_pages: u64,
    pub next: Option<u64>,
    pub previous: Option<u64>,
    pub results: Vec<T>,
}

//Queries
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub ordering: Option<String>,
    pub page: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ordering {
    Price,
    PriceDesc,
    Rating,
    RatingDesc,
    Oldest,
    Newest,
}

impl Ordering {
    fn parse(value: Option<&str>) -> Result<Self, ServiceError> {
        match value.map(str::trim) {
            None | Some("") | Some("-created_at") => Ok(Self::Newest),
            Some("created_at") => Ok(Self::Oldest),
            Some("price") => Ok(Self::Price),
            Some("-price") => Ok(Self::PriceDesc),
            Some("rating") => Ok(Self::Rating),
            Some("-rating") => Ok(Self::RatingDesc),
            Some(other) => Err(ServiceError::validation(format!(
                "Unsupported ordering: {other}"
            ))),
        }
    }
}

//Admin payloads
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewImage {
    pub image_url: String,
    pub color_name: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewMaterial {
    pub shell: Option<String>,
    pub lining: Option<String>,
    #[serde(default)]
    pub care_instructions: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductVariants {
    #[serde(default)]
    pub images: Vec<NewImage>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub specifications: Vec<String>,
    pub material: Option<NewMaterial>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: String,
    pub category_id: i32,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0, message = "cannot be negative"))]
    pub stock: i32,
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub variants: ProductVariants,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 255, message = "must be 1-255 characters"))]
    pub name: Option<String>,
    pub category_id: Option<i32>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "cannot be negative"))]
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

fn check_price(price: Decimal) -> Result<(), ServiceError> {
    if price.is_sign_negative() {
        return Err(ServiceError::validation("price: cannot be negative"));
    }
    Ok(())
}

//Reads
pub async fn list_categories<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<category::Model>, ServiceError> {
    Ok(category::Entity::find()
        .order_by_asc(category::Column::Name)
        .all(conn)
        .await?)
}

pub async fn get_category<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
) -> Result<category::Model, ServiceError> {
    category::Entity::find()
        .filter(category::Column::Slug.eq(slug))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("No category with slug {slug} was found")))
}

pub async fn list_products<C: ConnectionTrait>(
    conn: &C,
    page_size: u64,
    query: &ProductQuery,
) -> Result<Page<ProductSummary>, ServiceError> {
    let ordering = Ordering::parse(query.ordering.as_deref())?;

    let mut select = product::Entity::find()
        .join(JoinType::InnerJoin, product::Relation::Category.def())
        .filter(product::Column::IsActive.eq(true));

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(product::Column::Name.contains(search))
                .add(product::Column::Description.contains(search))
                .add(category::Column::Name.contains(search)),
        );
    }

    if let Some(category) = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
    {
        // LIKE without wildcards is SQLite's case-insensitive equality.
        select = select.filter(
            Condition::any()
                .add(category::Column::Slug.eq(category))
                .add(category::Column::Name.like(category)),
        );
    }

    if let Some(in_stock) = query.in_stock {
        select = select.filter(product::Column::InStock.eq(in_stock));
    }
    if let Some(min) = query.min_price {
        select = select.filter(product::Column::Price.gte(min));
    }
    if let Some(max) = query.max_price {
        select = select.filter(product::Column::Price.lte(max));
    }

    select = match ordering {
        Ordering::Price => select.order_by_asc(product::Column::Price),
        Ordering::PriceDesc => select.order_by_desc(product::Column::Price),
        Ordering::Rating => select.order_by_asc(product::Column::Rating),
        Ordering::RatingDesc => select.order_by_desc(product::Column::Rating),
        Ordering::Oldest => select.order_by_asc(product::Column::CreatedAt),
        Ordering::Newest => select.order_by_desc(product::Column::CreatedAt),
    }
    .order_by_asc(product::Column::Id);

    let page_size = page_size.max(1);
    let paginator = select.paginate(conn, page_size);
    let count = paginator.num_items().await?;
    let total_pages = count.div_ceil(page_size);
    let page = query.page.unwrap_or(1).max(1);
    let products = paginator.fetch_page(page - 1).await?;

    Ok(Page {
        count,
        page,
        total_pages,
        next: (page < total_pages).then_some(page + 1),
        previous: (page > 1).then(|| (page - 1).min(total_pages.max(1))),
        results: summarize(conn, products).await?,
    })
}

pub async fn get_product<C: ConnectionTrait>(
    conn: &C,
    id_or_slug: &str,
) -> Result<ProductDetail, ServiceError> {
    let select = product::Entity::find().filter(product::Column::IsActive.eq(true));
    let select = match id_or_slug.parse::<i32>() {
        Ok(id) => select.filter(product::Column::Id.eq(id)),
        Err(_) => select.filter(product::Column::Slug.eq(id_or_slug)),
    };
    let product = select
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product not found"))?;

    detail(conn, product).await
}

async fn detail<C: ConnectionTrait>(
    conn: &C,
    product: product::Model,
) -> Result<ProductDetail, ServiceError> {
    let specifications = product
        .find_related(product_specification::Entity)
        .order_by_asc(product_specification::Column::Position)
        .all(conn)
        .await?
        .into_iter()
        .map(|s| s.specification)
        .collect();
    let material = product
        .find_related(product_material::Entity)
        .one(conn)
        .await?
        .map(|m| MaterialView {
            shell: m.shell,
            lining: m.lining,
            care_instructions: serde_json::from_value(m.care_instructions).unwrap_or_default(),
        });
    let category_slug = product
        .find_related(category::Entity)
        .one(conn)
        .await?
        .map(|c| c.slug)
        .unwrap_or_default();

    let original_price = product.original_price.map(money);
    let description = product.description.clone();
    let created_at = product.created_at;
    let summary = summarize(conn, vec![product])
        .await?
        .pop()
        .ok_or_else(|| ServiceError::Internal("Product summary missing".into()))?;

    Ok(ProductDetail {
        summary,
        category_slug,
        original_price,
        description,
        specifications,
        material,
        created_at,
    })
}

/// Builds list views for a batch of products with one query per variant
/// table.
pub async fn summarize<C: ConnectionTrait>(
    conn: &C,
    products: Vec<product::Model>,
) -> Result<Vec<ProductSummary>, ServiceError> {
    if products.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = products.iter().map(|p| p.id).collect();
    let category_ids: Vec<i32> = products.iter().map(|p| p.category_id).collect();

    let categories: HashMap<i32, String> = category::Entity::find()
        .filter(category::Column::Id.is_in(category_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut images: HashMap<i32, Vec<product_image::Model>> = HashMap::new();
    for image in product_image::Entity::find()
        .filter(product_image::Column::ProductId.is_in(ids.clone()))
        .order_by_asc(product_image::Column::Position)
        .all(conn)
        .await?
    {
        images.entry(image.product_id).or_default().push(image);
    }

    let mut colors: HashMap<i32, Vec<String>> = HashMap::new();
    for color in product_color::Entity::find()
        .filter(product_color::Column::ProductId.is_in(ids.clone()))
        .order_by_asc(product_color::Column::Id)
        .all(conn)
        .await?
    {
        colors.entry(color.product_id).or_default().push(color.color_name);
    }

    let mut sizes: HashMap<i32, Vec<String>> = HashMap::new();
    for size in product_size::Entity::find()
        .filter(product_size::Column::ProductId.is_in(ids))
        .order_by_asc(product_size::Column::Id)
        .all(conn)
        .await?
    {
        sizes.entry(size.product_id).or_default().push(size.size_name);
    }

    Ok(products
        .into_iter()
        .map(|p| {
            let images = images.remove(&p.id).unwrap_or_default();
            let image = images
                .iter()
                .find(|i| i.is_primary)
                .or_else(|| images.first())
                .map(|i| i.image_url.clone());
            ProductSummary {
                id: p.id,
                category: categories.get(&p.category_id).cloned().unwrap_or_default(),
                name: p.name,
                slug: p.slug,
                price: money(p.price),
                image,
                images,
                rating: p.rating.round_dp(1),
                reviews_count: p.reviews_count,
                stock: p.stock,
                in_stock: p.in_stock,
                colors: colors.remove(&p.id).unwrap_or_default(),
                sizes: sizes.remove(&p.id).unwrap_or_default(),
            }
        })
        .collect())
}

//Writes
pub async fn create_category<C: ConnectionTrait>(
    conn: &C,
    payload: NewCategory,
) -> Result<category::Model, ServiceError> {
    payload.validate()?;
    let slug = slugify(&payload.name);
    if slug.is_empty() {
        return Err(ServiceError::validation("name: must contain letters or digits"));
    }

    let existing = category::Entity::find()
        .filter(
            Condition::any()
                .add(category::Column::Slug.eq(&slug))
                .add(category::Column::Name.eq(&payload.name)),
        )
        .one(conn)
        .await?;
    if existing.is_some() {
        return Err(ServiceError::validation("Category with this name already exists"));
    }

    let created = category::ActiveModel {
        name: Set(payload.name),
        slug: Set(slug),
        description: Set(payload.description),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    info!(category_id = created.id, slug = %created.slug, "Category created");
    Ok(created)
}

/// Admin create. Rejects a product whose slug is already taken.
pub async fn create_product<C: TransactionTrait>(
    db: &C,
    payload: NewProduct,
) -> Result<ProductDetail, ServiceError> {
    let txn = db.begin().await?;
    let slug = slugify(&payload.name);
    if product::Entity::find()
        .filter(product::Column::Slug.eq(&slug))
        .one(&txn)
        .await?
        .is_some()
    {
        return Err(ServiceError::validation("Product with this name already exists"));
    }
    let (created, _) = upsert_product(&txn, payload).await?;
    let view = detail(&txn, created).await?;
    txn.commit().await?;
    Ok(view)
}

/// Inserts the product, or updates the one with the same slug and replaces
/// its variants. Returns whether a row was created.
pub async fn upsert_product<C: ConnectionTrait>(
    conn: &C,
    payload: NewProduct,
) -> Result<(product::Model, bool), ServiceError> {
    payload.validate()?;
    check_price(payload.price)?;
    if let Some(original) = payload.original_price {
        check_price(original)?;
    }
    let slug = slugify(&payload.name);
    if slug.is_empty() {
        return Err(ServiceError::validation("name: must contain letters or digits"));
    }
    category::Entity::find_by_id(payload.category_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::not_found(format!("No category with {} id was found", payload.category_id))
        })?;

    let existing = product::Entity::find()
        .filter(product::Column::Slug.eq(&slug))
        .one(conn)
        .await?;

    let (saved, created) = match existing {
        Some(current) => {
            let mut active: product::ActiveModel = current.into();
            active.name = Set(payload.name);
            active.category_id = Set(payload.category_id);
            active.price = Set(money(payload.price));
            active.original_price = Set(payload.original_price.map(money));
            active.description = Set(payload.description);
            active.stock = Set(payload.stock);
            active.is_active = Set(payload.is_active.unwrap_or(true));
            (active.update(conn).await?, false)
        }
        None => {
            let active = product::ActiveModel {
                name: Set(payload.name),
                slug: Set(slug),
                category_id: Set(payload.category_id),
                price: Set(money(payload.price)),
                original_price: Set(payload.original_price.map(money)),
                description: Set(payload.description),
                rating: Set(Decimal::ZERO),
                reviews_count: Set(0),
                stock: Set(payload.stock),
                is_active: Set(payload.is_active.unwrap_or(true)),
                created_at: Set(Utc::now()),
                ..Default::default()
            };
            (active.insert(conn).await?, true)
        }
    };

    replace_variants(conn, saved.id, payload.variants).await?;
    Ok((saved, created))
}

async fn replace_variants<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    variants: ProductVariants,
) -> Result<(), ServiceError> {
    product_image::Entity::delete_many()
        .filter(product_image::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    product_color::Entity::delete_many()
        .filter(product_color::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    product_size::Entity::delete_many()
        .filter(product_size::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    product_specification::Entity::delete_many()
        .filter(product_specification::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    product_material::Entity::delete_many()
        .filter(product_material::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;

    for (position, image) in variants.images.into_iter().enumerate() {
        product_image::ActiveModel {
            product_id: Set(product_id),
            image_url: Set(image.image_url),
            color_name: Set(image.color_name),
            is_primary: Set(image.is_primary),
            position: Set(position as i32),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    for color_name in variants.colors {
        product_color::ActiveModel {
            product_id: Set(product_id),
            color_name: Set(color_name),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    for size_name in variants.sizes {
        product_size::ActiveModel {
            product_id: Set(product_id),
            size_name: Set(size_name),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    for (position, specification) in variants.specifications.into_iter().enumerate() {
        product_specification::ActiveModel {
            product_id: Set(product_id),
            specification: Set(specification),
            position: Set(position as i32),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    if let Some(material) = variants.material {
        product_material::ActiveModel {
            product_id: Set(product_id),
            shell: Set(material.shell),
            lining: Set(material.lining),
            care_instructions: Set(serde_json::json!(material.care_instructions)),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

pub async fn update_product<C: TransactionTrait>(
    db: &C,
    id: i32,
    patch: ProductPatch,
) -> Result<ProductDetail, ServiceError> {
    patch.validate()?;
    let txn = db.begin().await?;
    let current = product::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("No product with {id} id was found")))?;

    let mut active: product::ActiveModel = current.into();
    if let Some(name) = patch.name {
        active.name = Set(name);
    }
    if let Some(category_id) = patch.category_id {
        category::Entity::find_by_id(category_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("No category with {category_id} id was found"))
            })?;
        active.category_id = Set(category_id);
    }
    if let Some(price) = patch.price {
        check_price(price)?;
        active.price = Set(money(price));
    }
    if let Some(original) = patch.original_price {
        check_price(original)?;
        active.original_price = Set(Some(money(original)));
    }
    if let Some(description) = patch.description {
        active.description = Set(description);
    }
    if let Some(stock) = patch.stock {
        active.stock = Set(stock);
    }
    if let Some(is_active) = patch.is_active {
        active.is_active = Set(is_active);
    }

    let saved = active.update(&txn).await?;
    info!(product_id = saved.id, stock = saved.stock, "Product updated");
    let view = detail(&txn, saved).await?;
    txn.commit().await?;
    Ok(view)
}
