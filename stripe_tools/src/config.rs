use log::*;
use mkt_common::Secret;

pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com/v1";
/// Stripe's own libraries reject webhook signatures older than five minutes.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("MKT_STRIPE_API_URL").unwrap_or_else(|_| {
            info!("MKT_STRIPE_API_URL not set, using {DEFAULT_STRIPE_API_URL}");
            DEFAULT_STRIPE_API_URL.to_string()
        });
        let secret_key = Secret::new(std::env::var("MKT_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("MKT_STRIPE_SECRET_KEY not set, using (probably useless) default");
            "sk_test_00000000000000".to_string()
        }));
        let webhook_secret = Secret::new(std::env::var("MKT_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("MKT_STRIPE_WEBHOOK_SECRET not set, using (probably useless) default");
            "whsec_00000000000000".to_string()
        }));
        let webhook_tolerance_secs = std::env::var("MKT_STRIPE_WEBHOOK_TOLERANCE_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| warn!("Invalid MKT_STRIPE_WEBHOOK_TOLERANCE_SECS value: {s}. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS);
        Self { api_url, secret_key, webhook_secret, webhook_tolerance_secs }
    }
}
