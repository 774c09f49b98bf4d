use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, NewPaymentSplit, NewRefundRecord, Payment, PaymentRefund, PaymentSplit, SplitStatus},
    traits::PaymentStateUpdate,
    SettlementError,
};

/// Inserts the payment row only. Splits are inserted separately with [`insert_split`].
pub async fn insert_payment(payment: &NewPayment, conn: &mut SqliteConnection) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payments (
                order_id,
                customer_id,
                amount,
                currency,
                payment_intent_id,
                client_secret,
                total_commission
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(payment.order_id)
    .bind(&payment.customer_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.payment_intent_id)
    .bind(&payment.client_secret)
    .bind(payment.total_commission)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn insert_split(
    payment_id: i64,
    split: &NewPaymentSplit,
    conn: &mut SqliteConnection,
) -> Result<PaymentSplit, sqlx::Error> {
    let split = sqlx::query_as(
        r#"
            INSERT INTO payment_splits (
                payment_id,
                sub_order_id,
                seller_id,
                shop_id,
                connected_account_id,
                amount,
                platform_commission,
                seller_payout,
                shipping_reimbursement
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(payment_id)
    .bind(split.sub_order_id)
    .bind(&split.seller_id)
    .bind(split.shop_id)
    .bind(&split.connected_account_id)
    .bind(split.amount)
    .bind(split.platform_commission)
    .bind(split.seller_payout)
    .bind(split.shipping_reimbursement)
    .fetch_one(conn)
    .await?;
    Ok(split)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment: Option<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    match payment {
        Some(p) => Ok(Some(load_details(p, conn).await?)),
        None => Ok(None),
    }
}

pub async fn fetch_payment_by_intent_id(
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment: Option<Payment> = sqlx::query_as("SELECT * FROM payments WHERE payment_intent_id = $1")
        .bind(intent_id)
        .fetch_optional(&mut *conn)
        .await?;
    match payment {
        Some(p) => Ok(Some(load_details(p, conn).await?)),
        None => Ok(None),
    }
}

/// All payments ever created for the order, oldest first.
pub async fn fetch_payments_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    let rows: Vec<Payment> = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut payments = Vec::with_capacity(rows.len());
    for p in rows {
        payments.push(load_details(p, &mut *conn).await?);
    }
    Ok(payments)
}

/// Attaches splits, refunds and processed event ids to a payment row.
async fn load_details(mut payment: Payment, conn: &mut SqliteConnection) -> Result<Payment, sqlx::Error> {
    payment.splits = sqlx::query_as("SELECT * FROM payment_splits WHERE payment_id = $1 ORDER BY id")
        .bind(payment.id)
        .fetch_all(&mut *conn)
        .await?;
    payment.refunds = sqlx::query_as::<_, PaymentRefund>("SELECT * FROM payment_refunds WHERE payment_id = $1 ORDER BY id")
        .bind(payment.id)
        .fetch_all(&mut *conn)
        .await?;
    payment.webhook_events =
        sqlx::query_scalar("SELECT event_id FROM payment_webhook_events WHERE payment_id = $1 ORDER BY id")
            .bind(payment.id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(payment)
}

/// Writes the new payment state, if and only if the payment is still at `expected_version`. The version is
/// incremented on every successful write.
pub async fn update_state(
    payment_id: i64,
    expected_version: i64,
    state: &PaymentStateUpdate,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    let result = sqlx::query(
        r#"
            UPDATE payments SET
                status = $1,
                paid_at = $2,
                charge_id = $3,
                payment_method = $4,
                failure_reason = $5,
                refunded_amount = $6,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $7 AND version = $8
        "#,
    )
    .bind(state.status.to_string())
    .bind(state.paid_at)
    .bind(&state.charge_id)
    .bind(&state.payment_method)
    .bind(&state.failure_reason)
    .bind(state.refunded_amount)
    .bind(payment_id)
    .bind(expected_version)
    .execute(conn)
    .await?;
    check_version(result.rows_affected(), payment_id, expected_version)
}

/// Increments the version without any other change.
pub async fn bump_version(
    payment_id: i64,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    let result = sqlx::query(
        "UPDATE payments SET version = version + 1, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND version = $2",
    )
    .bind(payment_id)
    .bind(expected_version)
    .execute(conn)
    .await?;
    check_version(result.rows_affected(), payment_id, expected_version)
}

fn check_version(rows: u64, payment_id: i64, expected_version: i64) -> Result<(), SettlementError> {
    if rows == 1 {
        trace!("🗃️ Payment #{payment_id} moved past version {expected_version}");
        Ok(())
    } else {
        Err(SettlementError::ConcurrencyConflict(format!(
            "Payment #{payment_id} is no longer at version {expected_version}"
        )))
    }
}

/// Moves every split of the payment to `status`. Splits that have already been transferred keep their status.
pub async fn update_split_status(
    payment_id: i64,
    status: SplitStatus,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE payment_splits SET status = $1 WHERE payment_id = $2 AND status <> 'Transferred'")
        .bind(status.to_string())
        .bind(payment_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn mark_split_transferred(
    payment_id: i64,
    shop_id: i64,
    transfer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE payment_splits SET status = 'Transferred', transfer_id = $1
            WHERE payment_id = $2 AND shop_id = $3 AND status = 'Paid'
        "#,
    )
    .bind(transfer_id)
    .bind(payment_id)
    .bind(shop_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Inserts the refund record, or updates the amount and status of the existing record with the same refund id.
pub async fn upsert_refund(
    payment_id: i64,
    refund: &NewRefundRecord,
    conn: &mut SqliteConnection,
) -> Result<PaymentRefund, sqlx::Error> {
    let refund = sqlx::query_as(
        r#"
            INSERT INTO payment_refunds (payment_id, refund_id, amount, reason, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (refund_id) DO UPDATE SET
                amount = excluded.amount,
                status = excluded.status,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(payment_id)
    .bind(&refund.refund_id)
    .bind(refund.amount)
    .bind(&refund.reason)
    .bind(refund.status.to_string())
    .fetch_one(conn)
    .await?;
    Ok(refund)
}

/// Records that an event has been applied to the payment. A second delivery of the same event id fails with a unique
/// violation, which callers report as a concurrency conflict.
pub async fn record_event(
    payment_id: i64,
    event_id: &str,
    event_type: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    sqlx::query("INSERT INTO payment_webhook_events (event_id, payment_id, event_type) VALUES ($1, $2, $3)")
        .bind(event_id)
        .bind(payment_id)
        .bind(event_type)
        .execute(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(err) if err.is_unique_violation() => {
                SettlementError::ConcurrencyConflict(format!("Event {event_id} was recorded by another worker"))
            },
            _ => SettlementError::from(e),
        })?;
    Ok(())
}
