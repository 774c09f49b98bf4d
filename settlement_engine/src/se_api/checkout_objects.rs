use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Address, Money, Order},
    settlement::TransitionActor,
};

/// One line of a shopping cart, as held by the cart store. The unit price is the price the customer saw when adding
/// the item and is carried into the order unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    #[serde(default)]
    pub variant_id: Option<i64>,
    pub shop_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
}

/// The checkout input: the items of a user's (or guest's) cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub owner_id: String,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new<S: Into<String>>(owner_id: S) -> Self {
        Self { owner_id: owner_id.into(), items: Vec::new() }
    }

    pub fn with_item(mut self, item: CartItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The sum of all line totals, at cart prices.
    pub fn running_total(&self) -> Money {
        self.items.iter().map(|i| i.unit_price * i.quantity).sum()
    }
}

/// A cart line by reference only. Used to build a [`Cart`] priced from the current catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    #[serde(default)]
    pub variant_id: Option<i64>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub cart: Cart,
    pub shipping_address: Address,
    /// Defaults to the shipping address
    #[serde(default)]
    pub billing_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentResult {
    pub payment_id: i64,
    pub order_id: i64,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: Money,
    pub currency: String,
    /// True when an existing live intent was returned instead of creating a new one.
    pub reused: bool,
}

/// The authenticated party behind an API call, used for ownership and role checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub actor: TransitionActor,
    /// Shops the requester sells through. Only meaningful for sellers.
    #[serde(default)]
    pub shop_ids: Vec<i64>,
}

impl Requester {
    pub fn customer<S: Into<String>>(user_id: S) -> Self {
        Self { user_id: user_id.into(), actor: TransitionActor::Customer, shop_ids: vec![] }
    }

    pub fn seller<S: Into<String>>(user_id: S, shop_ids: Vec<i64>) -> Self {
        Self { user_id: user_id.into(), actor: TransitionActor::Seller, shop_ids }
    }

    pub fn admin<S: Into<String>>(user_id: S) -> Self {
        Self { user_id: user_id.into(), actor: TransitionActor::Admin, shop_ids: vec![] }
    }

    pub fn is_admin(&self) -> bool {
        self.actor == TransitionActor::Admin
    }

    pub fn owns(&self, order: &Order) -> bool {
        order.customer_id == self.user_id
    }

    pub fn sells_through(&self, shop_id: Option<i64>) -> bool {
        self.actor == TransitionActor::Seller && shop_id.map(|id| self.shop_ids.contains(&id)).unwrap_or(false)
    }
}
