use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Aggregator ids arrive as JSON numbers on some endpoints and strings on others
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

/// Route lookup for the serviceability endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub pickup_postcode: String,
    pub delivery_postcode: String,
    /// Cash on delivery
    #[serde(default)]
    pub cod: bool,
    /// Package weight in kg
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierQuote {
    pub courier_name: String,
    #[serde(default)]
    pub etd: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub selling_price: Decimal,
}

/// Ad-hoc order payload in the aggregator's field layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    /// Our order id, echoed back by the aggregator
    pub order_id: String,
    /// `YYYY-MM-DD HH:MM`
    pub order_date: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    #[serde(default)]
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    #[serde(default = "default_true")]
    pub shipping_is_billing: bool,
    pub order_items: Vec<ShipmentItem>,
    pub payment_method: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sub_total: Decimal,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    #[serde(deserialize_with = "string_or_number")]
    pub shipment_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwbAssignment {
    pub shipment_id: String,
    pub awb_code: String,
    pub courier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupScheduled {
    pub shipment_id: String,
    pub pickup_scheduled_date: Option<String>,
    pub pickup_token_number: Option<String>,
}

/// Vendor dispatch address registered with the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupLocation {
    /// Nickname used as `pickup_location` on shipments
    pub pickup_location: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub pin_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub is_invoice_created: bool,
    #[serde(default)]
    pub invoice_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipment_ids_accept_numbers_and_strings() {
        let numeric: ShipmentCreated =
            serde_json::from_str(r#"{"order_id": 5512, "shipment_id": 900112}"#).unwrap();
        assert_eq!(numeric.shipment_id, "900112");

        let text: ShipmentCreated =
            serde_json::from_str(r#"{"order_id": "A1", "shipment_id": "900113", "status": "NEW"}"#)
                .unwrap();
        assert_eq!(text.shipment_id, "900113");
        assert_eq!(text.status.as_deref(), Some("NEW"));
    }

    #[test]
    fn quote_rate_parses_from_number() {
        let quote: CourierQuote =
            serde_json::from_str(r#"{"courier_name": "Xpressbees", "etd": "Oct 21, 2026", "rate": 87.5}"#)
                .unwrap();
        assert_eq!(quote.rate, Decimal::new(875, 1));
    }
}
