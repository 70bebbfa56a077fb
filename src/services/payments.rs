use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::PaymentConfig;
use crate::entities::order::{self, PaymentStatus};
use crate::errors::ServiceError;
use crate::services::orders::{OrderLookup, OrderService};
use crate::services::tokens;

/// Result of a successful initialize call: where to send the customer.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentInitialization {
    pub redirect_url: String,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
struct ProviderEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

/// HTTP client for the external payment provider. Every call carries the
/// configured hard timeout; a timeout maps to its own error variant so the
/// caller can distinguish "provider slow" from "provider said no".
#[derive(Clone)]
pub struct PaymentProvider {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PaymentProvider {
    pub fn new(cfg: &PaymentConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Other(anyhow::anyhow!("http client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    /// Registers a pending transaction with the provider. Amount travels in
    /// minor units as the provider expects.
    pub async fn initialize(
        &self,
        reference: &str,
        email: &str,
        amount: Decimal,
    ) -> Result<PaymentInitialization, ServiceError> {
        let minor_units = (amount * Decimal::from(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::ValidationError("order total out of payable range".to_string())
            })?;

        let body = serde_json::json!({
            "reference": reference,
            "email": email,
            "amount": minor_units,
        });

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentProviderUnavailable(format!(
                "initialize returned HTTP {}",
                response.status()
            )));
        }

        let envelope: ProviderEnvelope<InitializeData> =
            response.json().await.map_err(map_transport_error)?;

        let data = envelope
            .data
            .filter(|_| envelope.status)
            .ok_or_else(|| {
                ServiceError::PaymentProviderUnavailable(
                    envelope
                        .message
                        .unwrap_or_else(|| "malformed initialize response".to_string()),
                )
            })?;

        Ok(PaymentInitialization {
            redirect_url: data.authorization_url,
            reference: data.reference,
        })
    }

    /// Asks the provider for the final state of a transaction. `Ok(true)`
    /// means settled, `Ok(false)` means the provider reported a failure.
    pub async fn verify(&self, reference: &str) -> Result<bool, ServiceError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentProviderUnavailable(format!(
                "verify returned HTTP {}",
                response.status()
            )));
        }

        let envelope: ProviderEnvelope<VerifyData> =
            response.json().await.map_err(map_transport_error)?;

        let data = envelope.data.ok_or_else(|| {
            ServiceError::PaymentProviderUnavailable(
                envelope
                    .message
                    .unwrap_or_else(|| "malformed verify response".to_string()),
            )
        })?;

        Ok(data.status == "success")
    }
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::PaymentProviderTimeout
    } else {
        ServiceError::PaymentProviderUnavailable(err.to_string())
    }
}

/// Orchestrates payment against order state. Orders always exist before a
/// payment is initialized, and their payment status stays `pending` across
/// provider failures, so both calls are safe to retry.
#[derive(Clone)]
pub struct PaymentService {
    provider: PaymentProvider,
    orders: Arc<OrderService>,
}

impl PaymentService {
    pub fn new(provider: PaymentProvider, orders: Arc<OrderService>) -> Self {
        Self { provider, orders }
    }

    #[instrument(skip(self, principal), fields(customer_id = %principal.id))]
    pub async fn initialize(
        &self,
        principal: &AuthUser,
        order_id: Uuid,
    ) -> Result<PaymentInitialization, ServiceError> {
        let detail = self.orders.get_for(principal, order_id).await?;
        let order = detail.order;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::AlreadyProcessed("paid".to_string()));
        }

        let email = principal.email.clone().ok_or_else(|| {
            ServiceError::ValidationError(
                "an email address is required to initialize payment".to_string(),
            )
        })?;

        // Reuse an existing reference so a retried initialize stays tied to
        // the same provider transaction.
        let reference = match &order.payment_reference {
            Some(reference) => reference.clone(),
            None => {
                let reference = tokens::payment_reference();
                self.orders
                    .set_payment_reference(order.id, &reference)
                    .await?;
                reference
            }
        };

        self.provider
            .initialize(&reference, &email, order.total)
            .await
    }

    /// Settles an order against the provider's answer. Re-verifying an
    /// already-paid order returns it unchanged without calling out; provider
    /// failure or unreachability records a failed payment and the transport
    /// error still reaches the caller.
    #[instrument(skip(self, principal))]
    pub async fn verify(
        &self,
        principal: &AuthUser,
        reference: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.orders.find_by_payment_reference(reference).await?;

        if !principal.is_admin() && order.customer_id != principal.id {
            return Err(ServiceError::Unauthorized(
                "order belongs to another customer".to_string(),
            ));
        }

        if order.payment_status == PaymentStatus::Paid {
            return Ok(order);
        }

        match self.provider.verify(reference).await {
            Ok(true) => {
                let (updated, _) = self
                    .orders
                    .update_payment(
                        OrderLookup::Id(order.id),
                        PaymentStatus::Paid,
                        Some(format!("reference {}", reference)),
                    )
                    .await?;
                Ok(updated)
            }
            Ok(false) => {
                let (updated, _) = self
                    .orders
                    .update_payment(
                        OrderLookup::Id(order.id),
                        PaymentStatus::Failed,
                        Some("provider reported failure".to_string()),
                    )
                    .await?;
                Ok(updated)
            }
            Err(err) => {
                if let Err(record_err) = self
                    .orders
                    .update_payment(
                        OrderLookup::Id(order.id),
                        PaymentStatus::Failed,
                        Some("provider unreachable during verification".to_string()),
                    )
                    .await
                {
                    warn!(error = %record_err, "failed to record payment failure");
                }
                Err(err)
            }
        }
    }
}
