use crate::database::order_repository::Order;
use crate::http::{HttpCallError, ProviderHttpClient, RequestAuth};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("mail service request failed: {0}")]
    Delivery(#[from] HttpCallError),

    #[error("order {order_id} has no billing email")]
    MissingRecipient { order_id: String },
}

/// Confirmation sent to the buyer once an order is fully dispatched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderConfirmation {
    pub to: String,
    pub buyer_name: String,
    pub order_id: String,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub total: Decimal,
}

impl OrderConfirmation {
    pub fn for_order(order: &Order) -> Result<Self, NotificationError> {
        if order.billing.email.trim().is_empty() {
            return Err(NotificationError::MissingRecipient {
                order_id: order.id.to_string(),
            });
        }
        Ok(Self {
            to: order.billing.email.trim().to_string(),
            buyer_name: order.billing.name.clone(),
            order_id: order.id.to_string(),
            shipment_id: order.shipment_id.clone(),
            awb_code: order.awb_code.clone(),
            total: order.totals.total,
        })
    }

    pub fn subject(&self) -> String {
        format!("Your order {} is confirmed", self.order_id)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Hi {},\n\nThanks for shopping with us. Your order {} for {} has been confirmed and handed to our courier partner.",
            self.buyer_name, self.order_id, self.total
        );
        if let Some(awb) = &self.awb_code {
            body.push_str(&format!("\nTracking number (AWB): {}", awb));
        }
        body
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError>;
}

/// Posts confirmations to the mail relay at `MAIL_SERVICE_URL`
pub struct HttpMailer {
    http: ProviderHttpClient,
    service_url: String,
}

impl HttpMailer {
    pub fn new(service_url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        Ok(Self {
            http: ProviderHttpClient::new(timeout, 0)?,
            service_url: service_url.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "to": confirmation.to,
            "subject": confirmation.subject(),
            "text": confirmation.body(),
        });
        let _: JsonValue = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.service_url,
                RequestAuth::None,
                Some(&payload),
            )
            .await?;
        info!(order_id = %confirmation.order_id, "confirmation email sent");
        Ok(())
    }
}

/// Used when no mail relay is configured; records the confirmation in the log
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %confirmation.order_id,
            to = %crate::logging::mask_email(&confirmation.to),
            awb_code = confirmation.awb_code.as_deref().unwrap_or(""),
            "mail relay not configured, confirmation logged only"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_mentions_awb_when_known() {
        let confirmation = OrderConfirmation {
            to: "asha@example.in".to_string(),
            buyer_name: "Asha".to_string(),
            order_id: "ord-1".to_string(),
            shipment_id: Some("900112".to_string()),
            awb_code: Some("AWB123".to_string()),
            total: Decimal::from(500),
        };
        assert!(confirmation.body().contains("AWB123"));
        assert!(confirmation.subject().contains("ord-1"));
    }
}
