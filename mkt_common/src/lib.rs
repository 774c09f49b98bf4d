mod commission;
mod money;

pub mod op;
mod secret;

pub use commission::{CommissionRate, CommissionRateError, DEFAULT_COMMISSION_RATE};
pub use money::{Money, MoneyConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
