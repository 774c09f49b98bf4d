use crate::{
    db_types::{NewProduct, NewProductVariant, NewShop, Product, ProductVariant, Shop},
    SettlementError,
};

/// Read access to the marketplace catalog (shops, products, variants), plus the handful of writes the settlement
/// flows need: seeding, and recording a shop's connected payment account.
///
/// Stock is not modified through this trait. Stock moves only inside the checkout and cancellation transactions of
/// [`crate::traits::SettlementDatabase`].
#[allow(async_fn_in_trait)]
pub trait CatalogManagement: Clone {
    async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, SettlementError>;

    async fn fetch_shops_for_seller(&self, seller_id: &str) -> Result<Vec<Shop>, SettlementError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SettlementError>;

    async fn fetch_variant(&self, variant_id: i64) -> Result<Option<ProductVariant>, SettlementError>;

    async fn insert_shop(&self, shop: NewShop) -> Result<Shop, SettlementError>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product, SettlementError>;

    async fn insert_variant(&self, variant: NewProductVariant) -> Result<ProductVariant, SettlementError>;

    /// Stores the gateway's connected account for the shop. Returns the updated shop.
    async fn update_shop_payment_account(
        &self,
        shop_id: i64,
        account_id: &str,
        payouts_enabled: bool,
    ) -> Result<Shop, SettlementError>;

    /// Updates the payout capability of whichever shop owns `account_id`. Returns `None` if no shop uses the account.
    async fn update_payouts_enabled(&self, account_id: &str, enabled: bool) -> Result<Option<Shop>, SettlementError>;
}
