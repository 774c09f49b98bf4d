use std::{fmt::Debug, sync::Arc};

use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::db_types::OrderNumber;

/// How many fresh order numbers are tried before giving up on a uniqueness clash.
pub const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

const ORDER_NUMBER_PATTERN: &str = r"^ORD-(\d{4})-(\d{6})(?:-(\d{2}))?$";

static ORDER_NUMBER_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(ORDER_NUMBER_PATTERN).ok());

/// Creates a new random order number for the current year, `ORD-<year>-<6 digits>`.
pub fn new_order_number() -> OrderNumber {
    let suffix = rand::thread_rng().gen_range(0..1_000_000u32);
    order_number_for(Utc::now().year(), suffix)
}

pub fn order_number_for(year: i32, suffix: u32) -> OrderNumber {
    OrderNumber(format!("ORD-{year}-{:06}", suffix % 1_000_000))
}

/// The order number of the `index`th (1-based) sub-order of a checkout.
pub fn sub_order_number(parent: &OrderNumber, index: usize) -> OrderNumber {
    OrderNumber(format!("{}-{index:02}", parent.as_str()))
}

/// Supplies candidate order numbers to the checkout writer. The default draws random numbers; tests substitute a
/// deterministic source to provoke collisions.
#[derive(Clone)]
pub struct OrderNumberGenerator {
    source: Arc<dyn Fn() -> OrderNumber + Send + Sync>,
}

impl Default for OrderNumberGenerator {
    fn default() -> Self {
        Self { source: Arc::new(new_order_number) }
    }
}

impl Debug for OrderNumberGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderNumberGenerator")
    }
}

impl OrderNumberGenerator {
    pub fn from_fn<F>(f: F) -> Self
    where F: Fn() -> OrderNumber + Send + Sync + 'static {
        Self { source: Arc::new(f) }
    }

    pub fn next_number(&self) -> OrderNumber {
        (self.source)()
    }
}

/// The pieces of a well-formed order number: year, random suffix and, for sub-orders, the sub-order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderNumberParts {
    pub year: i32,
    pub suffix: u32,
    pub sub_order_index: Option<u32>,
}

pub fn parse_order_number(number: &str) -> Option<OrderNumberParts> {
    let caps = ORDER_NUMBER_REGEX.as_ref()?.captures(number.trim())?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let suffix = caps.get(2)?.as_str().parse().ok()?;
    let sub_order_index = match caps.get(3) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    Some(OrderNumberParts { year, suffix, sub_order_index })
}
