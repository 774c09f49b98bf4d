use log::{debug, trace, warn};
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, NewOrderItem, Order, OrderItem, OrderNumber},
    helpers::{OrderNumberGenerator, MAX_ORDER_NUMBER_ATTEMPTS},
    traits::OrderStatusUpdate,
    SettlementError,
};

/// Inserts a new order using the given connection. This is not atomic. You can embed this call inside a transaction
/// if you need to ensure atomicity, and pass `&mut tx` as the connection argument.
pub async fn insert_order(
    order: &NewOrder,
    number: &OrderNumber,
    parent_order_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                shipping_address,
                billing_address,
                subtotal,
                shipping_total,
                discount_total,
                total,
                currency,
                parent_order_id,
                is_sub_order,
                shop_id,
                seller_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(number.as_str())
    .bind(&order.customer_id)
    .bind(Json(&order.shipping_address))
    .bind(Json(&order.billing_address))
    .bind(order.subtotal)
    .bind(order.shipping_total)
    .bind(order.discount_total)
    .bind(order.total)
    .bind(&order.currency)
    .bind(parent_order_id)
    .bind(parent_order_id.is_some())
    .bind(order.shop_id)
    .bind(&order.seller_id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Inserts a parent order under a fresh order number. A clash with an existing number is retried with a new number,
/// up to [`MAX_ORDER_NUMBER_ATTEMPTS`] times.
pub async fn insert_order_with_new_number(
    order: &NewOrder,
    numbers: &OrderNumberGenerator,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementError> {
    for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
        let number = numbers.next_number();
        match insert_order(order, &number, None, &mut *conn).await {
            Ok(order) => {
                debug!("🗃️ Order {} inserted with id {}", order.order_number, order.id);
                return Ok(order);
            },
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!("🗃️ Order number {number} is taken (attempt {attempt}/{MAX_ORDER_NUMBER_ATTEMPTS})");
            },
            Err(e) => return Err(e.into()),
        }
    }
    Err(SettlementError::OrderNumberGenerationFailed(MAX_ORDER_NUMBER_ATTEMPTS))
}

pub async fn insert_item(
    order_id: i64,
    item: &NewOrderItem,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id,
                shop_id,
                seller_id,
                product_id,
                variant_id,
                product_snapshot,
                quantity,
                unit_price,
                total_price,
                commission_rate,
                commission_amount,
                seller_payout,
                shipping_cost
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(item.shop_id)
    .bind(&item.seller_id)
    .bind(item.product_id)
    .bind(item.variant_id)
    .bind(Json(&item.product_snapshot))
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.total_price)
    .bind(item.commission_rate)
    .bind(item.commission_amount)
    .bind(item.seller_payout)
    .bind(item.shipping_cost)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Sub-orders of a checkout, in creation order.
pub async fn fetch_sub_orders(parent_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE parent_order_id = $1 ORDER BY id")
        .bind(parent_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Every item of every sub-order of the given parent.
pub async fn fetch_checkout_items(parent_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as(
        r#"
            SELECT * FROM order_items
            WHERE order_id IN (SELECT id FROM orders WHERE parent_order_id = $1)
            ORDER BY id
        "#,
    )
    .bind(parent_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Applies a conditional status change. If the order is no longer in the expected status, nothing is written and a
/// [`SettlementError::ConcurrencyConflict`] is returned.
pub async fn apply_status_update(
    update: &OrderStatusUpdate,
    cancellation_reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementError> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP");
    if let Some(status) = update.new_status {
        builder.push(", status = ");
        builder.push_bind(status.to_string());
    }
    if let Some(status) = update.payment_status {
        builder.push(", payment_status = ");
        builder.push_bind(status.to_string());
    }
    if let Some(reason) = cancellation_reason {
        builder.push(", cancellation_reason = ");
        builder.push_bind(reason);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(update.order_id);
    builder.push(" AND status = ");
    builder.push_bind(update.expected_status.to_string());
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order: Option<Order> = builder.build_query_as().fetch_optional(conn).await?;
    order.ok_or_else(|| {
        SettlementError::ConcurrencyConflict(format!(
            "Order #{} is no longer {}",
            update.order_id, update.expected_status
        ))
    })
}

/// Links the parent order and all its sub-orders to a payment.
pub async fn set_payment_id(parent_id: i64, payment_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET payment_id = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 OR parent_order_id = $2
        "#,
    )
    .bind(payment_id)
    .bind(parent_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
