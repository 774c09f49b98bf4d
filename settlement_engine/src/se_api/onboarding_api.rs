use std::fmt::Debug;

use log::*;

use crate::{
    db_types::Shop,
    traits::{CatalogManagement, ConnectedAccountRequest, PaymentGateway},
    SettlementError,
};

/// Connects shops to the payment gateway so that they can receive split payments and payouts.
pub struct OnboardingApi<B, G> {
    db: B,
    gateway: G,
}

impl<B, G> Debug for OnboardingApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OnboardingApi")
    }
}

impl<B, G> OnboardingApi<B, G>
where
    B: CatalogManagement,
    G: PaymentGateway,
{
    pub fn new(db: B, gateway: G) -> Self {
        Self { db, gateway }
    }

    /// Creates a connected account for the shop and stores it. A shop that already has an account is returned
    /// unchanged.
    pub async fn onboard_shop(&self, shop_id: i64, email: &str, country: &str) -> Result<Shop, SettlementError> {
        let shop = self.db.fetch_shop(shop_id).await?.ok_or(SettlementError::ShopNotFound(shop_id))?;
        if let Some(account) = &shop.connected_account_id {
            debug!("🏪️ Shop #{shop_id} is already connected to {account}");
            return Ok(shop);
        }
        let request = ConnectedAccountRequest {
            shop_id,
            seller_id: shop.seller_id.clone(),
            email: email.to_string(),
            country: country.to_string(),
        };
        let account = self.gateway.create_connected_account(request).await?;
        let shop = self.db.update_shop_payment_account(shop_id, &account.account_id, account.payouts_enabled).await?;
        info!(
            "🏪️ Shop #{shop_id} connected to account {}. Payouts enabled: {}",
            account.account_id, account.payouts_enabled
        );
        Ok(shop)
    }

    pub async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, SettlementError> {
        self.db.fetch_shop(shop_id).await
    }
}
