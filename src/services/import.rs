use chrono::Utc;
use sea_orm::{
    prelude::Decimal, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::entities::category;
use crate::error::ServiceError;
use crate::services::catalog::{
    slugify, upsert_product, NewImage, NewMaterial, NewProduct, ProductVariants,
};

/// Catalog file accepted by `storefront import`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub categories: Vec<ImportCategory>,
    #[serde(default)]
    pub products: Vec<ImportProduct>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImportCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImportProduct {
    pub name: String,
    /// Category name; created when missing.
    pub category: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stock: i32,
    pub is_active: Option<bool>,
    /// The first image becomes the primary one.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub specifications: Vec<String>,
    pub material: Option<NewMaterial>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub categories_created: usize,
    pub products_created: usize,
    pub products_updated: usize,
}

pub fn parse_catalog(raw: &str) -> Result<CatalogFile, ServiceError> {
    serde_json::from_str(raw)
        .map_err(|err| ServiceError::validation(format!("Malformed catalog file: {err}")))
}

async fn ensure_category<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    description: Option<String>,
    known: &mut HashMap<String, i32>,
    report: &mut ImportReport,
) -> Result<i32, ServiceError> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(ServiceError::validation(format!("Invalid category name: {name:?}")));
    }
    if let Some(id) = known.get(&slug) {
        return Ok(*id);
    }

    let id = match category::Entity::find()
        .filter(category::Column::Slug.eq(&slug))
        .one(conn)
        .await?
    {
        Some(existing) => {
            if description.is_some() {
                let mut active: category::ActiveModel = existing.into();
                active.description = Set(description);
                active.update(conn).await?.id
            } else {
                existing.id
            }
        }
        None => {
            report.categories_created += 1;
            category::ActiveModel {
                name: Set(name.trim().to_owned()),
                slug: Set(slug.clone()),
                description: Set(description),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(conn)
            .await?
            .id
        }
    };
    known.insert(slug, id);
    Ok(id)
}

/// Upserts every category and product by slug. Runs in one transaction, so
/// a bad entry leaves the catalog as it was.
pub async fn import_catalog(
    db: &DatabaseConnection,
    file: CatalogFile,
) -> Result<ImportReport, ServiceError> {
    let txn = db.begin().await?;
    let mut report = ImportReport::default();
    let mut known = HashMap::new();

    for entry in file.categories {
        ensure_category(&txn, &entry.name, entry.description, &mut known, &mut report).await?;
    }

    for entry in file.products {
        let category_id = ensure_category(&txn, &entry.category, None, &mut known, &mut report).await?;
        let images = entry
            .images
            .into_iter()
            .enumerate()
            .map(|(i, image_url)| NewImage {
                image_url,
                color_name: None,
                is_primary: i == 0,
            })
            .collect();

        let (saved, created) = upsert_product(
            &txn,
            NewProduct {
                name: entry.name,
                category_id,
                price: entry.price,
                original_price: entry.original_price,
                description: entry.description,
                stock: entry.stock,
                is_active: entry.is_active,
                variants: ProductVariants {
                    images,
                    colors: entry.colors,
                    sizes: entry.sizes,
                    specifications: entry.specifications,
                    material: entry.material,
                },
            },
        )
        .await?;

        if created {
            report.products_created += 1;
        } else {
            report.products_updated += 1;
        }
        info!(product_id = saved.id, slug = %saved.slug, created, "Imported product");
    }

    txn.commit().await?;
    info!(
        categories_created = report.categories_created,
        products_created = report.products_created,
        products_updated = report.products_updated,
        "Catalog import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_catalog() {
        let file = parse_catalog(
            r#"{"products": [{"name": "Classic Tee", "category": "T-Shirts", "price": "29.99",
                 "stock": 4, "images": ["a.jpg", "b.jpg"], "sizes": ["S", "M"]}]}"#,
        )
        .unwrap();
        assert!(file.categories.is_empty());
        assert_eq!(file.products[0].price, Decimal::new(2999, 2));
        assert_eq!(file.products[0].sizes, vec!["S", "M"]);
    }

    #[test]
    fn malformed_catalog_is_a_validation_error() {
        assert!(matches!(
            parse_catalog("{\"products\": 3}"),
            Err(ServiceError::Validation(_))
        ));
    }
}
