use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{Amount, Customer, InvoiceRef};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request never reached the provider.
    #[error("could not reach payment gateway: {0}")]
    Transport(String),

    #[error("payment gateway timed out")]
    Timeout,

    /// The request was sent but the exchange broke off; the invoice may exist.
    #[error("payment gateway exchange interrupted: {0}")]
    Interrupted(String),

    #[error("payment gateway rejected invoice ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected payment gateway response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Only failures where no invoice can have been created are safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_connect() || err.is_builder() {
            GatewayError::Transport(err.to_string())
        } else if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Interrupted(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub name: String,
    pub quantity: u32,
    pub price: Amount,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    /// Reservation id; payment callbacks come back keyed by it.
    pub external_reference: Uuid,
    pub amount: Amount,
    pub payer_email: String,
    pub description: String,
    pub items: Vec<InvoiceItem>,
    pub success_url: String,
    pub failure_url: String,
    pub customer: Customer,
}

/// Hosted payment page provider. Implementations report failures and never retry.
#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceRef, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct XenditSettings {
    pub base_url: String,
    pub secret_key: String,
    pub currency: String,
    pub invoice_duration_secs: u64,
    pub timeout: Duration,
}

pub struct XenditGateway {
    client: reqwest::Client,
    settings: XenditSettings,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: String,
    amount: Amount,
    payer_email: &'a str,
    description: &'a str,
    invoice_duration: u64,
    currency: &'a str,
    success_redirect_url: &'a str,
    failure_redirect_url: &'a str,
    items: &'a [InvoiceItem],
    customer: XenditCustomer<'a>,
    customer_notification_preference: NotificationPreference,
    locale: &'static str,
}

#[derive(Debug, Serialize)]
struct XenditCustomer<'a> {
    given_names: &'a str,
    email: &'a str,
    mobile_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    addresses: Option<Vec<XenditAddress<'a>>>,
}

#[derive(Debug, Serialize)]
struct XenditAddress<'a> {
    street_line1: &'a str,
    city: &'a str,
    postal_code: &'a str,
    country: &'static str,
}

#[derive(Debug, Serialize)]
struct NotificationPreference {
    invoice_created: [&'static str; 1],
    invoice_reminder: [&'static str; 1],
    invoice_paid: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceResponse {
    id: String,
    invoice_url: String,
}

#[derive(Debug, Deserialize)]
struct XenditErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

impl XenditGateway {
    pub fn new(settings: XenditSettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, settings })
    }

    fn body<'a>(&'a self, request: &'a InvoiceRequest) -> CreateInvoiceBody<'a> {
        let customer = &request.customer;
        let addresses = customer.address.as_deref().filter(|a| !a.is_empty()).map(|street| {
            vec![XenditAddress {
                street_line1: street,
                city: customer.city.as_deref().unwrap_or(""),
                postal_code: customer.postal_code.as_deref().unwrap_or(""),
                country: "Indonesia",
            }]
        });

        CreateInvoiceBody {
            external_id: request.external_reference.to_string(),
            amount: request.amount,
            payer_email: &request.payer_email,
            description: &request.description,
            invoice_duration: self.settings.invoice_duration_secs,
            currency: &self.settings.currency,
            success_redirect_url: &request.success_url,
            failure_redirect_url: &request.failure_url,
            items: &request.items,
            customer: XenditCustomer {
                given_names: &customer.name,
                email: &customer.email,
                mobile_number: &customer.phone,
                addresses,
            },
            customer_notification_preference: NotificationPreference {
                invoice_created: ["email"],
                invoice_reminder: ["email"],
                invoice_paid: ["email"],
            },
            locale: "id",
        }
    }
}

#[async_trait]
impl InvoiceGateway for XenditGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<InvoiceRef, GatewayError> {
        let url = format!("{}/v2/invoices", self.settings.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.settings.secret_key, Some(""))
            .json(&self.body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<XenditErrorBody>(&text) {
                Ok(XenditErrorBody { error_code, message }) => match (error_code, message) {
                    (Some(code), Some(message)) => format!("{}: {}", code, message),
                    (code, message) => message.or(code).unwrap_or(text),
                },
                Err(_) => text,
            };
            warn!(
                reservation_id = %request.external_reference,
                status = status.as_u16(),
                "Xendit rejected invoice: {}", message
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let invoice: CreateInvoiceResponse = response.json().await?;
        info!(
            reservation_id = %request.external_reference,
            invoice_id = %invoice.id,
            "Xendit invoice created"
        );
        Ok(InvoiceRef {
            invoice_id: invoice.id,
            invoice_url: invoice.invoice_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> XenditSettings {
        XenditSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            secret_key: "xnd_development_key".to_string(),
            currency: "IDR".to_string(),
            invoice_duration_secs: 86_400,
            timeout: Duration::from_secs(1),
        }
    }

    fn request(address: Option<&str>) -> InvoiceRequest {
        InvoiceRequest {
            external_reference: Uuid::nil(),
            amount: 2_160_000,
            payer_email: "guest@example.com".to_string(),
            description: "Booking for Kampung House".to_string(),
            items: vec![InvoiceItem {
                name: "Tourism Tax".to_string(),
                quantity: 2,
                price: 30_000,
                category: "Tax".to_string(),
            }],
            success_url: "http://localhost:3000/booking/success".to_string(),
            failure_url: "http://localhost:3000/booking/failed".to_string(),
            customer: Customer {
                name: "Guest".to_string(),
                email: "guest@example.com".to_string(),
                phone: "+62811".to_string(),
                address: address.map(str::to_string),
                city: Some("Yogyakarta".to_string()),
                postal_code: None,
            },
        }
    }

    #[test]
    fn body_uses_reservation_id_as_external_id() {
        let gateway = XenditGateway::new(settings()).unwrap();
        let request = request(None);
        let body = serde_json::to_value(gateway.body(&request)).unwrap();

        assert_eq!(body["external_id"], Uuid::nil().to_string());
        assert_eq!(body["amount"], 2_160_000);
        assert_eq!(body["currency"], "IDR");
        assert_eq!(body["invoice_duration"], 86_400);
        assert_eq!(body["items"][0]["quantity"], 2);
        assert!(body["customer"].get("addresses").is_none());
    }

    #[test]
    fn address_block_only_when_street_given() {
        let gateway = XenditGateway::new(settings()).unwrap();
        let request = request(Some("Jl. Parangtritis Km 8"));
        let body = serde_json::to_value(gateway.body(&request)).unwrap();
        let address = &body["customer"]["addresses"][0];
        assert_eq!(address["street_line1"], "Jl. Parangtritis Km 8");
        assert_eq!(address["city"], "Yogyakarta");
        assert_eq!(address["postal_code"], "");
        assert_eq!(address["country"], "Indonesia");
    }

    #[test]
    fn only_unsent_requests_are_retryable() {
        assert!(GatewayError::Transport("connection refused".into()).is_retryable());
        assert!(!GatewayError::Timeout.is_retryable());
        assert!(!GatewayError::Interrupted("reset".into()).is_retryable());
        assert!(!GatewayError::Rejected {
            status: 400,
            message: "API_VALIDATION_ERROR".into()
        }
        .is_retryable());
    }
}
