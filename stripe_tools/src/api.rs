use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    config::StripeConfig,
    data_objects::{ConnectedAccount, NewConnectedAccount, NewPaymentIntent, NewRefund, NewTransfer},
    StripeApiError,
    StripePaymentIntent,
    StripeRefund,
    StripeTransfer,
};

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, StripeApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut val = HeaderValue::from_str(&bearer).map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        headers.insert("Stripe-Version", HeaderValue::from_static("2024-06-20"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Sends a form-encoded request to the Stripe REST API. When `idempotency_key` is given, Stripe guarantees that
    /// replaying the request returns the original result instead of performing the operation twice.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        idempotency_key: Option<&str>,
        form: Option<Vec<(String, String)>>,
    ) -> Result<T, StripeApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(form) = form {
            req = req.form(&form);
        }
        let response = req.send().await.map_err(|e| StripeApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| StripeApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| StripeApiError::RestResponseError(e.to_string()))?;
            Err(StripeApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    pub async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
    ) -> Result<StripePaymentIntent, StripeApiError> {
        debug!("Creating payment intent for {} {}", intent.amount, intent.currency);
        let result = self
            .rest_query::<StripePaymentIntent>(
                Method::POST,
                "/payment_intents",
                intent.idempotency_key.as_deref(),
                Some(intent.to_form()),
            )
            .await?;
        info!("Created payment intent {}", result.id);
        Ok(result)
    }

    pub async fn cancel_payment_intent(&self, intent_id: &str) -> Result<StripePaymentIntent, StripeApiError> {
        let path = format!("/payment_intents/{intent_id}/cancel");
        debug!("Cancelling payment intent {intent_id}");
        let result = self.rest_query::<StripePaymentIntent>(Method::POST, &path, None, None).await?;
        info!("Cancelled payment intent {intent_id}");
        Ok(result)
    }

    pub async fn create_refund(&self, refund: &NewRefund) -> Result<StripeRefund, StripeApiError> {
        debug!("Requesting refund of {:?} on {}", refund.amount, refund.payment_intent);
        let result = self
            .rest_query::<StripeRefund>(Method::POST, "/refunds", refund.idempotency_key.as_deref(), Some(refund.to_form()))
            .await?;
        info!("Refund {} requested on {}. Status: {}", result.id, refund.payment_intent, result.status);
        Ok(result)
    }

    pub async fn create_connected_account(
        &self,
        account: &NewConnectedAccount,
    ) -> Result<ConnectedAccount, StripeApiError> {
        debug!("Creating connected account for {}", account.email);
        let result =
            self.rest_query::<ConnectedAccount>(Method::POST, "/accounts", None, Some(account.to_form())).await?;
        info!("Created connected account {} for {}", result.id, account.email);
        Ok(result)
    }

    pub async fn create_transfer(&self, transfer: &NewTransfer) -> Result<StripeTransfer, StripeApiError> {
        debug!("Transferring {} {} to {}", transfer.amount, transfer.currency, transfer.destination);
        let result = self
            .rest_query::<StripeTransfer>(
                Method::POST,
                "/transfers",
                transfer.idempotency_key.as_deref(),
                Some(transfer.to_form()),
            )
            .await?;
        info!("Transfer {} to {} created", result.id, transfer.destination);
        Ok(result)
    }
}
