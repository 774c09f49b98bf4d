mod api;
mod config;
mod error;

mod data_objects;
pub mod webhook;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{
    ConnectedAccount,
    NewConnectedAccount,
    NewPaymentIntent,
    NewRefund,
    NewTransfer,
    StripeEvent,
    StripeEventData,
    StripePaymentIntent,
    StripeRefund,
    StripeTransfer,
};
pub use error::{StripeApiError, WebhookSignatureError};
