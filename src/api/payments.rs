use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::quota::UserId;

const NOWPAYMENTS_API_URL: &str = "https://api.nowpayments.io";
pub(crate) const PREMIUM_PRICE_INR: u32 = 99;
/// Where the provider sends the user after paying.
const SUCCESS_URL: &str = "https://t.me/cherry_video_bot";

#[derive(Serialize)]
struct InvoiceRequest<'a> {
    price_amount: u32,
    price_currency: &'a str,
    order_id: String,
    order_description: &'a str,
    ipn_callback_url: &'a str,
    success_url: &'a str,
}

#[derive(Deserialize)]
struct InvoiceResponse {
    invoice_url: String,
}

/// NowPayments invoice client.
pub(crate) struct PaymentsApi {
    client: Client,
    base_url: String,
    api_key: String,
    callback_url: String,
}

impl PaymentsApi {
    pub(crate) fn new(api_key: String, callback_url: String) -> Self {
        Self::with_base_url(NOWPAYMENTS_API_URL.to_string(), api_key, callback_url)
    }

    fn with_base_url(base_url: String, api_key: String, callback_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            callback_url,
        }
    }

    pub(crate) async fn create_invoice(
        &self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let request = InvoiceRequest {
            price_amount: PREMIUM_PRICE_INR,
            price_currency: "inr",
            order_id: order_id_for(user, now),
            order_description: "Premium plan for 1 month",
            ipn_callback_url: &self.callback_url,
            success_url: SUCCESS_URL,
        };
        let response = self
            .client
            .post(format!("{}/v1/invoice", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Invoice creation request failed")?;
        if response.status().is_success() {
            let invoice: InvoiceResponse = response
                .json()
                .await
                .context("Failed to decode invoice response")?;
            Ok(invoice.invoice_url)
        } else {
            Err(anyhow::anyhow!(
                "Invoice creation failed with status {}:\n{}",
                response.status(),
                response.text().await.unwrap_or_default()
            ))
        }
    }
}

/// Order ids carry the user id so the payment webhook can correlate a
/// notification back to a user. The `user_{id}_{unix_ts}` shape is an
/// external contract shared with `user_id_from_order_id`.
pub(crate) fn order_id_for(user: UserId, now: DateTime<Utc>) -> String {
    format!("user_{}_{}", user, now.timestamp())
}

pub(crate) fn user_id_from_order_id(order_id: &str) -> Option<UserId> {
    let mut parts = order_id.split('_');
    if parts.next()? != "user" {
        return None;
    }
    parts.next()?.parse().ok()
}
