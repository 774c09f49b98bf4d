use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------   Requests   ---------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct NewPaymentIntent {
    /// Amount in minor currency units
    pub amount: i64,
    pub currency: String,
    pub transfer_group: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

impl NewPaymentIntent {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            ("currency".to_string(), self.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        if let Some(group) = &self.transfer_group {
            form.push(("transfer_group".to_string(), group.clone()));
        }
        metadata_to_form(&self.metadata, &mut form);
        form
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewRefund {
    pub payment_intent: String,
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

impl NewRefund {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![("payment_intent".to_string(), self.payment_intent.clone())];
        if let Some(amount) = self.amount {
            form.push(("amount".to_string(), amount.to_string()));
        }
        if let Some(reason) = &self.reason {
            form.push(("reason".to_string(), reason.clone()));
        }
        metadata_to_form(&self.metadata, &mut form);
        form
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewConnectedAccount {
    pub email: String,
    pub country: String,
    pub metadata: HashMap<String, String>,
}

impl NewConnectedAccount {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("type".to_string(), "express".to_string()),
            ("email".to_string(), self.email.clone()),
            ("country".to_string(), self.country.clone()),
            ("capabilities[transfers][requested]".to_string(), "true".to_string()),
            ("capabilities[card_payments][requested]".to_string(), "true".to_string()),
        ];
        metadata_to_form(&self.metadata, &mut form);
        form
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTransfer {
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub idempotency_key: Option<String>,
}

impl NewTransfer {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            ("currency".to_string(), self.currency.to_lowercase()),
            ("destination".to_string(), self.destination.clone()),
        ];
        if let Some(group) = &self.transfer_group {
            form.push(("transfer_group".to_string(), group.clone()));
        }
        form
    }
}

fn metadata_to_form(metadata: &HashMap<String, String>, form: &mut Vec<(String, String)>) {
    let mut keys = metadata.keys().collect::<Vec<_>>();
    keys.sort();
    for k in keys {
        form.push((format!("metadata[{k}]"), metadata[k].clone()));
    }
}

//--------------------------------------   Responses   --------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeTransfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    #[serde(default)]
    pub transfer_group: Option<String>,
}

/// A webhook event envelope. The `data.object` payload depends on `event_type`, so it is left as raw JSON and
/// interpreted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

impl StripeEvent {
    pub fn object_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}
