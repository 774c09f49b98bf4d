//! A small marketplace used across the engine and server tests.
//!
//! * Shop A (seller `sam`, 20% commission) sells a lamp at 50.00 and a mug at 30.00.
//! * Shop B (seller `bea`, 10% commission) sells a notebook at 20.00.
//! * Shop C (seller `cal`, 15% commission) sells a poster at 40.00. It charges a flat 5.00 for shipping, which is
//!   reimbursed to the seller.
//!
//! Every shop is onboarded with payouts enabled. Shops A and B charge no shipping.
use crate::{
    db_types::{Address, CommissionRate, Money, NewProduct, NewShop, Product, ShippingPolicy, Shop},
    se_api::checkout_objects::{Cart, CartItem, CheckoutRequest},
    traits::CatalogManagement,
};

#[derive(Debug, Clone)]
pub struct Marketplace {
    pub shop_a: Shop,
    pub shop_b: Shop,
    pub shop_c: Shop,
    pub lamp: Product,
    pub mug: Product,
    pub notebook: Product,
    pub poster: Product,
}

impl Marketplace {
    /// Lamp x1 and mug x2 from shop A, notebook x1 from shop B.
    pub fn standard_cart(&self, owner: &str) -> Cart {
        Cart::new(owner)
            .with_item(cart_item(&self.lamp, 1))
            .with_item(cart_item(&self.mug, 2))
            .with_item(cart_item(&self.notebook, 1))
    }

    /// Poster x1 from shop C, which charges shipping, and notebook x1 from shop B.
    pub fn shipped_cart(&self, owner: &str) -> Cart {
        Cart::new(owner).with_item(cart_item(&self.poster, 1)).with_item(cart_item(&self.notebook, 1))
    }
}

pub fn cart_item(product: &Product, quantity: i64) -> CartItem {
    CartItem { product_id: product.id, variant_id: None, shop_id: product.shop_id, quantity, unit_price: product.price }
}

pub fn test_address() -> Address {
    Address {
        name: "Alice Smith".into(),
        line1: "1 Main Street".into(),
        line2: None,
        city: "Lisbon".into(),
        postal_code: "1000-001".into(),
        country: "PT".into(),
    }
}

pub fn checkout_request(customer_id: &str, cart: Cart) -> CheckoutRequest {
    CheckoutRequest { customer_id: customer_id.into(), cart, shipping_address: test_address(), billing_address: None }
}

pub async fn seed_marketplace<B: CatalogManagement>(db: &B, stock: i64) -> Marketplace {
    let rate_a = CommissionRate::from_percent(20).expect("Invalid commission rate");
    let rate_b = CommissionRate::from_percent(10).expect("Invalid commission rate");
    let shop_a = db.insert_shop(NewShop::new("sam", "Sam's Lamps").with_commission_rate(rate_a)).await.expect("shop A");
    let shop_b = db.insert_shop(NewShop::new("bea", "Bea's Books").with_commission_rate(rate_b)).await.expect("shop B");
    let shop_a = db.update_shop_payment_account(shop_a.id, "acct_sam", true).await.expect("onboard shop A");
    let shop_b = db.update_shop_payment_account(shop_b.id, "acct_bea", true).await.expect("onboard shop B");
    let rate_c = CommissionRate::from_percent(15).expect("Invalid commission rate");
    let shipping =
        ShippingPolicy { flat_rate: Money::from(500), free_shipping_threshold: None, reimburse_shipping: true };
    let shop_c = NewShop::new("cal", "Cal's Posters").with_commission_rate(rate_c).with_shipping(shipping);
    let shop_c = db.insert_shop(shop_c).await.expect("shop C");
    let shop_c = db.update_shop_payment_account(shop_c.id, "acct_cal", true).await.expect("onboard shop C");
    let lamp = db.insert_product(NewProduct::new(shop_a.id, "Desk Lamp", Money::from(5_000), stock)).await.expect("lamp");
    let mug = db.insert_product(NewProduct::new(shop_a.id, "Coffee Mug", Money::from(3_000), stock)).await.expect("mug");
    let notebook =
        db.insert_product(NewProduct::new(shop_b.id, "Notebook", Money::from(2_000), stock)).await.expect("notebook");
    let poster =
        db.insert_product(NewProduct::new(shop_c.id, "Poster", Money::from(4_000), stock)).await.expect("poster");
    Marketplace { shop_a, shop_b, shop_c, lamp, mug, notebook, poster }
}
