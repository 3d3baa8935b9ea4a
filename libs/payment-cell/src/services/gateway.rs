// libs/payment-cell/src/services/gateway.rs
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{
    GatewayEnvelope, GatewayProvider, InitializeData, InitializeRequest, MakePaymentData, MakePaymentRequest,
    PaymentError, PaymentStatusData,
};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializeData, PaymentError>;

    async fn make_payment(&self, request: &MakePaymentRequest) -> Result<MakePaymentData, PaymentError>;

    /// Bounded by the configured status timeout.
    async fn get_status(&self, transaction_id: &str) -> Result<PaymentStatusData, PaymentError>;

    async fn providers(&self, t_url: &str, t_id: &str, t_sum: &str) -> Result<Vec<GatewayProvider>, PaymentError>;
}

/// PayUnit hosted-checkout client.
#[derive(Debug)]
pub struct PayUnitClient {
    client: Client,
    base_url: String,
    api_key: String,
    mode: String,
    basic_credentials: String,
    status_timeout: Duration,
}

impl PayUnitClient {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_payment_configured() {
            return Err(PaymentError::NotConfigured);
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: config.payunit_base_url.trim_end_matches('/').to_string(),
            api_key: config.payunit_api_key.clone(),
            mode: config.payunit_mode.to_ascii_lowercase(),
            basic_credentials: STANDARD.encode(format!("{}:{}", config.payunit_username, config.payunit_password)),
            status_timeout: Duration::from_secs(config.payunit_status_timeout_seconds),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("mode", &self.mode)
            .header("Authorization", format!("Basic {}", self.basic_credentials))
    }

    /// Sends the request and unwraps `data` from the envelope. Bodies are logged, never returned.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, operation: &str) -> Result<T, PaymentError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            error!("PayUnit {} request failed: {}", operation, e);
            PaymentError::Upstream {
                message: format!("{} request failed", operation),
            }
        })?;

        let status = response.status();
        let response_text = response.text().await?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            error!("PayUnit {} failed: {} - {}", operation, status, response_text);
            return Err(PaymentError::Upstream {
                message: format!("{} failed with HTTP {}", operation, status),
            });
        }

        let envelope: GatewayEnvelope<T> = serde_json::from_str(&response_text).map_err(|e| {
            error!("PayUnit {} returned an unreadable body: {} - {}", operation, e, response_text);
            PaymentError::Upstream {
                message: format!("{} returned a malformed payload", operation),
            }
        })?;

        envelope.data.ok_or_else(|| {
            error!(
                "PayUnit {} returned no data: {}",
                operation,
                envelope.message.unwrap_or_default()
            );
            PaymentError::Upstream {
                message: format!("{} returned no data", operation),
            }
        })
    }
}

#[async_trait]
impl PaymentGateway for PayUnitClient {
    async fn initialize(&self, request: &InitializeRequest) -> Result<InitializeData, PaymentError> {
        info!("Initializing PayUnit transaction {}", request.transaction_id);
        let url = format!("{}/api/gateway/initialize", self.base_url);
        self.send(self.client.post(&url).json(request), "initialize").await
    }

    async fn make_payment(&self, request: &MakePaymentRequest) -> Result<MakePaymentData, PaymentError> {
        info!(
            "Requesting PayUnit payment for {} via {}",
            request.transaction_id, request.gateway
        );
        let url = format!("{}/api/gateway/makepayment", self.base_url);
        self.send(self.client.post(&url).json(request), "makepayment").await
    }

    async fn get_status(&self, transaction_id: &str) -> Result<PaymentStatusData, PaymentError> {
        debug!("Fetching PayUnit status for {}", transaction_id);
        let url = format!("{}/api/gateway/paymentstatus/{}", self.base_url, transaction_id);
        self.send(self.client.get(&url).timeout(self.status_timeout), "paymentstatus")
            .await
    }

    async fn providers(&self, t_url: &str, t_id: &str, t_sum: &str) -> Result<Vec<GatewayProvider>, PaymentError> {
        let url = format!("{}/api/gateway/gateways", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("t_url", t_url), ("t_id", t_id), ("t_sum", t_sum)]);
        self.send(request, "gateways").await
    }
}
