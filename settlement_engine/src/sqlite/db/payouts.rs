use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{NewPayout, Payout};

/// Inserts the payout unless one already exists for the same payment and shop, in which case `None` is returned.
pub async fn insert_payout(payout: &NewPayout, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let b = &payout.breakdown;
    let payout = sqlx::query_as(
        r#"
            INSERT INTO payouts (
                seller_id,
                shop_id,
                amount,
                currency,
                connected_account_id,
                period_start,
                period_end,
                total_sales,
                total_orders,
                platform_commission,
                shipping_reimbursement,
                adjustments,
                order_ids,
                payment_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (payment_id, shop_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(&payout.seller_id)
    .bind(payout.shop_id)
    .bind(payout.amount())
    .bind(&payout.currency)
    .bind(&payout.connected_account_id)
    .bind(payout.period_start)
    .bind(payout.period_end)
    .bind(b.total_sales)
    .bind(b.total_orders)
    .bind(b.platform_commission)
    .bind(b.shipping_reimbursement)
    .bind(b.adjustments)
    .bind(Json(&payout.order_ids))
    .bind(payout.payment_id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

pub async fn fetch_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payout)
}

pub async fn fetch_payouts_for_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payout>, sqlx::Error> {
    let payouts = sqlx::query_as("SELECT * FROM payouts WHERE payment_id = $1 ORDER BY id")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(payouts)
}

pub async fn fetch_payouts_for_shop(shop_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payout>, sqlx::Error> {
    let payouts =
        sqlx::query_as("SELECT * FROM payouts WHERE shop_id = $1 ORDER BY id").bind(shop_id).fetch_all(conn).await?;
    Ok(payouts)
}

/// Succeeded payments with at least one split that has no payout yet.
pub async fn fetch_payments_missing_payouts(conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let ids = sqlx::query_scalar(
        r#"
            SELECT p.id FROM payments p
            WHERE p.status = 'Succeeded'
            AND EXISTS (
                SELECT 1 FROM orders po
                WHERE po.id = p.order_id AND po.payment_id = p.id AND po.status NOT IN ('Cancelled', 'Refunded')
            )
            AND EXISTS (
                SELECT 1 FROM payment_splits s
                WHERE s.payment_id = p.id
                AND NOT EXISTS (SELECT 1 FROM payouts o WHERE o.payment_id = p.id AND o.shop_id = s.shop_id)
            )
            ORDER BY p.id
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Moves a payout from Pending to Processing. Returns `None` if the payout was not pending, meaning another worker
/// has already claimed it (or it is finished).
pub async fn claim_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET status = 'Processing', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

pub async fn complete_payout(
    id: i64,
    transfer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET
                status = 'Paid',
                transfer_id = $1,
                processed_at = CURRENT_TIMESTAMP,
                failure_reason = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'Processing'
            RETURNING *;
        "#,
    )
    .bind(transfer_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

pub async fn fail_payout(id: i64, reason: &str, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET status = 'Failed', failure_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'Processing'
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

pub async fn cancel_payout(id: i64, reason: &str, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET status = 'Cancelled', failure_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Cancels every pending payout funded by the payment. Payouts already processing or paid are left alone.
pub async fn cancel_pending_for_payment(
    payment_id: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE payouts SET status = 'Cancelled', failure_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE payment_id = $2 AND status = 'Pending'
        "#,
    )
    .bind(reason)
    .bind(payment_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
