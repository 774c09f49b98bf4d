use crate::{
    db_types::{NewPayout, Payout},
    SettlementError,
};

/// Storage of seller payouts.
#[allow(async_fn_in_trait)]
pub trait PayoutManagement: Clone {
    /// Inserts the payouts, skipping any for which a payout already exists for the same payment and shop.
    /// Returns only the payouts that were newly created.
    async fn insert_payouts(&self, payouts: Vec<NewPayout>) -> Result<Vec<Payout>, SettlementError>;

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementError>;

    async fn fetch_payouts_for_payment(&self, payment_id: i64) -> Result<Vec<Payout>, SettlementError>;

    async fn fetch_payouts_for_shop(&self, shop_id: i64) -> Result<Vec<Payout>, SettlementError>;

    /// Ids of succeeded payments for which no payout has been accrued yet. Only payments that still pay for a live
    /// order are returned.
    async fn fetch_payments_missing_payouts(&self) -> Result<Vec<i64>, SettlementError>;

    /// Moves the payout from `Pending` to `Processing`. Returns `None` if the payout was not pending, which means
    /// another worker got to it first.
    async fn claim_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementError>;

    /// Marks a processing payout as paid and the corresponding payment split as transferred.
    async fn complete_payout(&self, payout_id: i64, transfer_id: &str) -> Result<Payout, SettlementError>;

    /// Marks a processing payout as failed.
    async fn fail_payout(&self, payout_id: i64, reason: &str) -> Result<Payout, SettlementError>;

    /// Cancels a pending payout. Returns `None` if the payout was not pending.
    async fn cancel_payout(&self, payout_id: i64, reason: &str) -> Result<Option<Payout>, SettlementError>;
}
