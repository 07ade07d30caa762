pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_color;
pub mod product_image;
pub mod product_material;
pub mod product_size;
pub mod product_specification;
pub mod review;
pub mod revoked_token;
pub mod user;

use sea_orm::{
    sea_query::{Index, IndexCreateStatement},
    ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema,
};

/// Creates every table and the composite unique indexes. Safe to run on an
/// existing database.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, user::Entity).await?;
    create_table(db, category::Entity).await?;
    create_table(db, product::Entity).await?;
    create_table(db, product_image::Entity).await?;
    create_table(db, product_color::Entity).await?;
    create_table(db, product_size::Entity).await?;
    create_table(db, product_specification::Entity).await?;
    create_table(db, product_material::Entity).await?;
    create_table(db, cart::Entity).await?;
    create_table(db, cart_item::Entity).await?;
    create_table(db, order::Entity).await?;
    create_table(db, order_item::Entity).await?;
    create_table(db, review::Entity).await?;
    create_table(db, revoked_token::Entity).await?;

    for index in unique_indexes() {
        db.execute(db.get_database_backend().build(&index)).await?;
    }
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("uq_cart_item_line")
            .table(cart_item::Entity)
            .col(cart_item::Column::CartId)
            .col(cart_item::Column::ProductId)
            .col(cart_item::Column::SelectedColor)
            .col(cart_item::Column::SelectedSize)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uq_review_product_user")
            .table(review::Entity)
            .col(review::Column::ProductId)
            .col(review::Column::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;

    #[tokio::test]
    async fn schema_setup_is_repeatable() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        setup_schema(&db).await.unwrap();
        setup_schema(&db).await.unwrap();
    }
}
