use crate::http::{ProviderHttpClient, RequestAuth};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{to_minor_units, OrderIntent, PaymentCallback, SignatureCheck};
use crate::payments::utils::{checkout_signature, secure_eq};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const PROVIDER: &str = "razorpay";

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub currency: String,
    pub timeout_secs: u64,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: String::new(),
            base_url: "https://api.razorpay.com".to_string(),
            currency: "INR".to_string(),
            timeout_secs: 15,
        }
    }
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    http: ProviderHttpClient,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> PaymentResult<Self> {
        let http = ProviderHttpClient::new(Duration::from_secs(config.timeout_secs), 0)
            .map_err(|e| PaymentError::from_http(PROVIDER, e))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn receipt_tag() -> String {
        format!("rcpt_{}", Uuid::new_v4().simple())
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order_intent(&self, amount: Decimal) -> PaymentResult<OrderIntent> {
        let minor = to_minor_units(amount)?;
        let receipt = Self::receipt_tag();

        let payload = serde_json::json!({
            "amount": minor,
            "currency": self.config.currency,
            "receipt": receipt,
        });

        let raw: RazorpayOrder = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/orders"),
                RequestAuth::Basic {
                    username: &self.config.key_id,
                    password: &self.config.key_secret,
                },
                Some(&payload),
            )
            .await
            .map_err(|e| PaymentError::from_http(PROVIDER, e))?;

        info!(
            gateway_order_id = %raw.id,
            amount_minor = raw.amount,
            receipt = %receipt,
            "razorpay order intent created"
        );

        Ok(OrderIntent {
            id: raw.id,
            amount: raw.amount,
            currency: raw.currency,
            receipt: raw.receipt.unwrap_or(receipt),
            status: raw.status,
        })
    }

    fn verify_payment(&self, callback: &PaymentCallback) -> PaymentResult<SignatureCheck> {
        let fields = [
            ("razorpay_order_id", &callback.razorpay_order_id),
            ("razorpay_payment_id", &callback.razorpay_payment_id),
            ("razorpay_signature", &callback.razorpay_signature),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(PaymentError::VerificationError {
                message: format!("{} is missing from the callback", name),
            });
        }
        if self.config.key_secret.is_empty() {
            return Err(PaymentError::VerificationError {
                message: "payment key secret is not configured".to_string(),
            });
        }

        let expected = checkout_signature(
            &self.config.key_secret,
            callback.razorpay_order_id.trim(),
            callback.razorpay_payment_id.trim(),
        )
        .ok_or_else(|| PaymentError::VerificationError {
            message: "could not initialise signature MAC".to_string(),
        })?;

        // Exact match against lowercase hex; a case change is a different signature
        if secure_eq(expected.as_bytes(), callback.razorpay_signature.trim().as_bytes()) {
            Ok(SignatureCheck::Valid)
        } else {
            warn!(
                gateway_order_id = %callback.razorpay_order_id,
                payment_id = %callback.razorpay_payment_id,
                "razorpay signature mismatch"
            );
            Ok(SignatureCheck::Mismatch)
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> RazorpayGateway {
        RazorpayGateway::new(RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: "rzp_test_secret".to_string(),
            ..Default::default()
        })
        .expect("gateway init should succeed")
    }

    fn signed_callback(order_id: &str, payment_id: &str) -> PaymentCallback {
        PaymentCallback {
            razorpay_order_id: order_id.to_string(),
            razorpay_payment_id: payment_id.to_string(),
            razorpay_signature: checkout_signature("rzp_test_secret", order_id, payment_id)
                .unwrap(),
        }
    }

    #[test]
    fn valid_signature_is_accepted() {
        let check = gateway()
            .verify_payment(&signed_callback("order_abc", "pay_123"))
            .expect("verification should run");
        assert_eq!(check, SignatureCheck::Valid);
    }

    #[test]
    fn any_single_character_mutation_is_rejected() {
        let gateway = gateway();
        let callback = signed_callback("order_abc", "pay_123");
        let signature = callback.razorpay_signature.clone();

        for (i, c) in signature.char_indices() {
            let replacement = if c == '0' { '1' } else { '0' };
            let mut mutated = signature.clone();
            mutated.replace_range(i..i + 1, &replacement.to_string());

            let check = gateway
                .verify_payment(&PaymentCallback {
                    razorpay_signature: mutated,
                    ..callback.clone()
                })
                .expect("verification should run");
            assert_eq!(check, SignatureCheck::Mismatch, "mutation at index {}", i);

            if c.is_ascii_alphabetic() {
                let mut recased = signature.clone();
                recased.replace_range(i..i + 1, &c.to_ascii_uppercase().to_string());
                let check = gateway
                    .verify_payment(&PaymentCallback {
                        razorpay_signature: recased,
                        ..callback.clone()
                    })
                    .expect("verification should run");
                assert_eq!(check, SignatureCheck::Mismatch, "case flip at index {}", i);
            }
        }
    }

    #[test]
    fn uppercased_signature_is_rejected() {
        let gateway = gateway();
        let callback = signed_callback("order_abc", "pay_1");
        let check = gateway
            .verify_payment(&PaymentCallback {
                razorpay_signature: callback.razorpay_signature.to_ascii_uppercase(),
                ..callback.clone()
            })
            .unwrap();
        assert_eq!(check, SignatureCheck::Mismatch);
    }

    #[test]
    fn signature_for_other_payment_is_rejected() {
        let gateway = gateway();
        let mut callback = signed_callback("order_abc", "pay_123");
        callback.razorpay_payment_id = "pay_999".to_string();
        assert_eq!(
            gateway.verify_payment(&callback).unwrap(),
            SignatureCheck::Mismatch
        );
    }

    #[test]
    fn missing_fields_are_verification_errors_not_mismatches() {
        let result = gateway().verify_payment(&PaymentCallback {
            razorpay_order_id: "order_abc".to_string(),
            razorpay_payment_id: String::new(),
            razorpay_signature: "abc".to_string(),
        });
        assert!(matches!(result, Err(PaymentError::VerificationError { .. })));
    }

    #[test]
    fn receipt_tags_are_unique() {
        assert_ne!(RazorpayGateway::receipt_tag(), RazorpayGateway::receipt_tag());
        assert!(RazorpayGateway::receipt_tag().len() <= 40);
    }
}
