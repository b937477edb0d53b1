use crate::payments::error::{PaymentError, PaymentResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Order intent created at the gateway before the client-side checkout runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderIntent {
    /// Gateway order id, e.g. `order_Nx3...`
    pub id: String,
    /// Amount in minor units (paise)
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
}

/// Fields posted back by the gateway's client-side checkout redirect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallback {
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
}

/// Outcome of a signature check that could actually be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCheck {
    Valid,
    Mismatch,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureCheck::Valid)
    }
}

/// Round to the nearest whole currency unit and convert to minor units.
///
/// Halves round away from zero, so `499.5` becomes `50000`.
pub fn to_minor_units(amount: Decimal) -> PaymentResult<i64> {
    let whole = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    if whole <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount must be at least one whole currency unit".to_string(),
        });
    }

    whole
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| PaymentError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount is too large".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn minor_units_round_half_away_from_zero() {
        assert_eq!(to_minor_units(Decimal::from(500)).unwrap(), 50000);
        assert_eq!(to_minor_units(Decimal::from_str("499.5").unwrap()).unwrap(), 50000);
        assert_eq!(to_minor_units(Decimal::from_str("499.49").unwrap()).unwrap(), 49900);
    }

    #[test]
    fn sub_unit_amounts_are_rejected() {
        assert!(matches!(
            to_minor_units(Decimal::from_str("0.4").unwrap()),
            Err(PaymentError::InvalidAmount { .. })
        ));
        assert!(to_minor_units(Decimal::from(-5)).is_err());
    }

    #[test]
    fn callback_deserializes_with_missing_fields() {
        let parsed: PaymentCallback =
            serde_json::from_value(serde_json::json!({"razorpay_order_id": "order_1"}))
                .expect("deserialization should succeed");
        assert_eq!(parsed.razorpay_order_id, "order_1");
        assert!(parsed.razorpay_signature.is_empty());
    }
}
