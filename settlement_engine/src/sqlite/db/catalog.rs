use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewProduct, NewProductVariant, NewShop, Product, ProductVariant, Shop},
    traits::StockReservation,
    SettlementError,
};

pub async fn fetch_shop(shop_id: i64, conn: &mut SqliteConnection) -> Result<Option<Shop>, sqlx::Error> {
    let shop = sqlx::query_as("SELECT * FROM shops WHERE id = $1").bind(shop_id).fetch_optional(conn).await?;
    Ok(shop)
}

pub async fn fetch_shops_for_seller(seller_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Shop>, sqlx::Error> {
    let shops =
        sqlx::query_as("SELECT * FROM shops WHERE seller_id = $1 ORDER BY id").bind(seller_id).fetch_all(conn).await?;
    Ok(shops)
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product =
        sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn fetch_variant(
    variant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductVariant>, sqlx::Error> {
    let variant =
        sqlx::query_as("SELECT * FROM product_variants WHERE id = $1").bind(variant_id).fetch_optional(conn).await?;
    Ok(variant)
}

pub async fn insert_shop(shop: NewShop, conn: &mut SqliteConnection) -> Result<Shop, sqlx::Error> {
    let shop = sqlx::query_as(
        r#"
            INSERT INTO shops (
                seller_id,
                name,
                commission_rate,
                shipping_flat_rate,
                free_shipping_threshold,
                reimburse_shipping
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(shop.seller_id)
    .bind(shop.name)
    .bind(shop.commission_rate)
    .bind(shop.shipping.flat_rate)
    .bind(shop.shipping.free_shipping_threshold)
    .bind(shop.shipping.reimburse_shipping)
    .fetch_one(conn)
    .await?;
    Ok(shop)
}

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, sqlx::Error> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (shop_id, name, slug, image_url, sku, price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(product.shop_id)
    .bind(product.name)
    .bind(product.slug)
    .bind(product.image_url)
    .bind(product.sku)
    .bind(product.price)
    .bind(product.stock)
    .fetch_one(conn)
    .await?;
    Ok(product)
}

pub async fn insert_variant(
    variant: NewProductVariant,
    conn: &mut SqliteConnection,
) -> Result<ProductVariant, sqlx::Error> {
    let variant = sqlx::query_as(
        r#"
            INSERT INTO product_variants (product_id, name, sku, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(variant.product_id)
    .bind(variant.name)
    .bind(variant.sku)
    .bind(variant.price)
    .bind(variant.stock)
    .fetch_one(conn)
    .await?;
    Ok(variant)
}

pub async fn update_shop_payment_account(
    shop_id: i64,
    account_id: &str,
    payouts_enabled: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Shop>, sqlx::Error> {
    let shop = sqlx::query_as(
        r#"
            UPDATE shops SET connected_account_id = $1, payouts_enabled = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(account_id)
    .bind(payouts_enabled)
    .bind(shop_id)
    .fetch_optional(conn)
    .await?;
    Ok(shop)
}

pub async fn update_payouts_enabled(
    account_id: &str,
    enabled: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Shop>, sqlx::Error> {
    let shop = sqlx::query_as(
        r#"
            UPDATE shops SET payouts_enabled = $1, updated_at = CURRENT_TIMESTAMP
            WHERE connected_account_id = $2
            RETURNING *;
        "#,
    )
    .bind(enabled)
    .bind(account_id)
    .fetch_optional(conn)
    .await?;
    Ok(shop)
}

fn stock_table(reservation: &StockReservation) -> (&'static str, i64) {
    match reservation.variant_id {
        Some(vid) => ("product_variants", vid),
        None => ("products", reservation.product_id),
    }
}

/// Takes stock with a conditional decrement. The row is only touched if enough stock remains, so two concurrent
/// checkouts can never both take the last unit. Must be called inside the checkout transaction.
pub async fn take_stock(reservation: &StockReservation, conn: &mut SqliteConnection) -> Result<(), SettlementError> {
    let (table, id) = stock_table(reservation);
    let sql = format!(
        "UPDATE {table} SET stock = stock - $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND stock >= $1"
    );
    let result = sqlx::query(&sql).bind(reservation.quantity).bind(id).execute(&mut *conn).await?;
    if result.rows_affected() == 1 {
        trace!("🗃️ Took {} units from {table} #{id}", reservation.quantity);
        return Ok(());
    }
    let available: Option<i64> = sqlx::query_scalar(&format!("SELECT stock FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match (available, reservation.variant_id) {
        (Some(available), _) => {
            debug!("🗃️ Not enough stock in {table} #{id}. {} requested, {available} available", reservation.quantity);
            Err(SettlementError::OutOfStock {
                product_id: reservation.product_id,
                variant_id: reservation.variant_id,
                requested: reservation.quantity,
                available,
            })
        },
        (None, Some(vid)) => Err(SettlementError::VariantNotFound(vid)),
        (None, None) => Err(SettlementError::ProductNotFound(reservation.product_id)),
    }
}

pub async fn return_stock(reservation: &StockReservation, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let (table, id) = stock_table(reservation);
    let sql = format!("UPDATE {table} SET stock = stock + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2");
    sqlx::query(&sql).bind(reservation.quantity).bind(id).execute(conn).await?;
    trace!("🗃️ Returned {} units to {table} #{id}", reservation.quantity);
    Ok(())
}
