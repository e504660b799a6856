use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use opsgate_core::config::PaymentsConfig;
use opsgate_core::UpstreamError;

/// One checkout line: either a reference to a pre-existing provider price, or
/// an inline price carrying amount/currency/name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutLine {
    PriceRef { price: String, quantity: u32 },
    Inline { amount_cents: i64, currency: String, name: String, quantity: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub mode: String,
    pub success_url: String,
    pub cancel_url: String,
    pub lines: Vec<CheckoutLine>,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionRequest {
    /// Flatten into the provider's form encoding: indexed `line_items[i][...]`
    /// entries plus `metadata[key]` entries.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), self.mode.clone()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        for (index, line) in self.lines.iter().enumerate() {
            match line {
                CheckoutLine::PriceRef { price, quantity } => {
                    form.push((format!("line_items[{index}][price]"), price.clone()));
                    form.push((format!("line_items[{index}][quantity]"), quantity.to_string()));
                }
                CheckoutLine::Inline { amount_cents, currency, name, quantity } => {
                    form.push((
                        format!("line_items[{index}][price_data][currency]"),
                        currency.clone(),
                    ));
                    form.push((
                        format!("line_items[{index}][price_data][unit_amount]"),
                        amount_cents.to_string(),
                    ));
                    form.push((
                        format!("line_items[{index}][price_data][product_data][name]"),
                        name.clone(),
                    ));
                    form.push((format!("line_items[{index}][quantity]"), quantity.to_string()));
                }
            }
        }

        for (key, value) in &self.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        form
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ConnectAccount {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OnboardingLink {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Transfer {
    pub id: String,
}

/// Narrow seam over the payment provider's session/account/transfer APIs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, UpstreamError>;

    async fn create_connect_account(&self, email: &str) -> Result<ConnectAccount, UpstreamError>;

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<OnboardingLink, UpstreamError>;

    async fn create_transfer(
        &self,
        amount_cents: i64,
        destination: &str,
        description: &str,
    ) -> Result<Transfer, UpstreamError>;
}

/// Form-encoded HTTP client for the provider API.
pub struct StripeGateway {
    http: reqwest::Client,
    api_base_url: String,
    secret_key: SecretString,
    timeout: Duration,
}

impl StripeGateway {
    pub fn new(http: reqwest::Client, config: &PaymentsConfig) -> Self {
        Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .http
            .post(format!("{}{path}", self.api_base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .timeout(self.timeout)
            .form(form)
            .send()
            .await
            .map_err(|error| UpstreamError::transport("stripe", error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new("stripe", Some(status.as_u16()), body));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| UpstreamError::transport("stripe", error.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, UpstreamError> {
        self.post_form("/v1/checkout/sessions", &request.to_form()).await
    }

    async fn create_connect_account(&self, email: &str) -> Result<ConnectAccount, UpstreamError> {
        let form = vec![
            ("type".to_string(), "express".to_string()),
            ("email".to_string(), email.to_string()),
            ("capabilities[transfers][requested]".to_string(), "true".to_string()),
        ];
        self.post_form("/v1/accounts", &form).await
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<OnboardingLink, UpstreamError> {
        let form = vec![
            ("account".to_string(), account_id.to_string()),
            ("refresh_url".to_string(), refresh_url.to_string()),
            ("return_url".to_string(), return_url.to_string()),
            ("type".to_string(), "account_onboarding".to_string()),
        ];
        self.post_form("/v1/account_links", &form).await
    }

    async fn create_transfer(
        &self,
        amount_cents: i64,
        destination: &str,
        description: &str,
    ) -> Result<Transfer, UpstreamError> {
        let form = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), "usd".to_string()),
            ("destination".to_string(), destination.to_string()),
            ("description".to_string(), description.to_string()),
        ];
        self.post_form("/v1/transfers", &form).await
    }
}

/// Gateway double for tests: fixed replies, recorded calls.
#[derive(Default)]
pub struct RecordingGateway {
    pub sessions: std::sync::Mutex<Vec<CheckoutSessionRequest>>,
    pub accounts: std::sync::Mutex<Vec<String>>,
    pub links: std::sync::Mutex<Vec<String>>,
    pub transfers: std::sync::Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, UpstreamError> {
        self.sessions.lock().expect("lock").push(request.clone());
        Ok(CheckoutSession {
            id: "cs_test_1".to_string(),
            url: "https://pay.example/cs_test_1".to_string(),
        })
    }

    async fn create_connect_account(&self, email: &str) -> Result<ConnectAccount, UpstreamError> {
        self.accounts.lock().expect("lock").push(email.to_string());
        Ok(ConnectAccount { id: "acct_test_1".to_string() })
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> Result<OnboardingLink, UpstreamError> {
        self.links.lock().expect("lock").push(account_id.to_string());
        Ok(OnboardingLink { url: "https://onboard.example/acct_test_1".to_string() })
    }

    async fn create_transfer(
        &self,
        amount_cents: i64,
        destination: &str,
        _description: &str,
    ) -> Result<Transfer, UpstreamError> {
        self.transfers.lock().expect("lock").push((amount_cents, destination.to_string()));
        Ok(Transfer { id: "tr_test_1".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{CheckoutLine, CheckoutSessionRequest};

    #[test]
    fn form_encoding_indexes_line_items_and_metadata() {
        let request = CheckoutSessionRequest {
            mode: "payment".to_string(),
            success_url: "https://site.example/ok".to_string(),
            cancel_url: "https://site.example/cancel".to_string(),
            lines: vec![
                CheckoutLine::PriceRef { price: "price_123".to_string(), quantity: 2 },
                CheckoutLine::Inline {
                    amount_cents: 250_000,
                    currency: "usd".to_string(),
                    name: "Tax Prep Training".to_string(),
                    quantity: 1,
                },
            ],
            metadata: BTreeMap::from([("program".to_string(), "tax-prep".to_string())]),
        };

        let form = request.to_form();
        let get = |key: &str| {
            form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).unwrap_or_default()
        };

        assert_eq!(get("mode"), "payment");
        assert_eq!(get("line_items[0][price]"), "price_123");
        assert_eq!(get("line_items[0][quantity]"), "2");
        assert_eq!(get("line_items[1][price_data][currency]"), "usd");
        assert_eq!(get("line_items[1][price_data][unit_amount]"), "250000");
        assert_eq!(get("line_items[1][price_data][product_data][name]"), "Tax Prep Training");
        assert_eq!(get("line_items[1][quantity]"), "1");
        assert_eq!(get("metadata[program]"), "tax-prep");
    }
}
