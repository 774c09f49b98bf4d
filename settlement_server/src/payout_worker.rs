use std::time::Duration;

use log::*;
use settlement_engine::{events::EventProducers, PayoutApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::integrations::stripe::StripeGateway;

/// Starts the payout sweeper. Every `interval` it accrues payouts for succeeded payments that have none, which happens
/// if the server stops between recording a payment and writing its payouts. Do not await the returned JoinHandle, as
/// it will run indefinitely.
pub fn start_payout_worker(
    db: SqliteDatabase,
    gateway: StripeGateway,
    producers: EventProducers,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = PayoutApi::new(db, gateway, producers);
        info!("🏦️ Payout sweeper started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            debug!("🏦️ Looking for payments with missing payouts");
            match api.sweep_missing_payouts().await {
                Ok(0) => trace!("🏦️ No missing payouts"),
                Ok(n) => info!("🏦️ Accrued {n} missing payouts"),
                Err(e) => error!("🏦️ Error running the payout sweep: {e}"),
            }
        }
    })
}
