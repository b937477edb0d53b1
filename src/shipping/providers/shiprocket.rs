use crate::http::{ProviderHttpClient, RequestAuth};
use crate::shipping::aggregator::ShippingAggregator;
use crate::shipping::error::{ShippingError, ShippingResult};
use crate::shipping::quote::QuoteSelection;
use crate::shipping::session::ShippingSession;
use crate::shipping::types::{
    AwbAssignment, CourierQuote, Invoice, PickupLocation, PickupScheduled, QuoteRequest,
    ShipmentCreated, ShipmentRequest,
};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{info, warn};

const PROVIDER: &str = "shiprocket";

#[derive(Debug, Clone)]
pub struct ShiprocketConfig {
    pub email: String,
    pub password: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Retries for idempotent GETs only
    pub max_get_retries: u32,
    pub quote_selection: QuoteSelection,
}

impl Default for ShiprocketConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            base_url: "https://apiv2.shiprocket.in".to_string(),
            timeout_secs: 20,
            max_get_retries: 2,
            quote_selection: QuoteSelection::default(),
        }
    }
}

pub struct ShiprocketClient {
    config: ShiprocketConfig,
    http: ProviderHttpClient,
    session: ShippingSession,
}

impl ShiprocketClient {
    pub fn new(config: ShiprocketConfig, session: ShippingSession) -> ShippingResult<Self> {
        let http = ProviderHttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.max_get_retries,
        )
        .map_err(ShippingError::from_http)?;
        Ok(Self {
            config,
            http,
            session,
        })
    }

    pub fn session(&self) -> &ShippingSession {
        &self.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn login_with_configured_account(&self) -> ShippingResult<String> {
        if self.config.email.is_empty() || self.config.password.is_empty() {
            return Err(ShippingError::AuthenticationFailed {
                message: "shipping account credentials are not configured".to_string(),
            });
        }
        self.authenticate(&self.config.email, &self.config.password)
            .await
    }

    async fn bearer_token(&self) -> ShippingResult<String> {
        match self.session.current_token().await {
            Some(token) => Ok(token),
            None => self.login_with_configured_account().await,
        }
    }

    /// Authenticated call; a 401 drops the cached token and retries once
    /// with a fresh login
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
    ) -> ShippingResult<T> {
        let token = self.bearer_token().await?;
        match self
            .http
            .request_json(method.clone(), url, RequestAuth::Bearer(&token), body)
            .await
        {
            Err(e) if e.is_unauthorized() => {
                warn!(url = %url, "shipping token rejected, logging in again");
                self.session.invalidate().await;
                let token = self.login_with_configured_account().await?;
                self.http
                    .request_json(method, url, RequestAuth::Bearer(&token), body)
                    .await
                    .map_err(ShippingError::from_http)
            }
            other => other.map_err(ShippingError::from_http),
        }
    }
}

#[async_trait]
impl ShippingAggregator for ShiprocketClient {
    async fn authenticate(&self, email: &str, password: &str) -> ShippingResult<String> {
        let payload = json!({ "email": email, "password": password });
        let response: LoginResponse = self
            .http
            .request_json(
                Method::POST,
                &self.endpoint("/v1/external/auth/login"),
                RequestAuth::None,
                Some(&payload),
            )
            .await
            .map_err(|e| match ShippingError::from_http(e) {
                ShippingError::ProviderError { message, .. } => {
                    ShippingError::AuthenticationFailed { message }
                }
                other => other,
            })?;

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ShippingError::AuthenticationFailed {
                message: response
                    .message
                    .unwrap_or_else(|| "login response carried no token".to_string()),
            })?;

        self.session.store_token(token.clone()).await;
        info!(provider = PROVIDER, "shipping session established");
        Ok(token)
    }

    async fn ensure_session(&self) -> ShippingResult<()> {
        self.bearer_token().await.map(|_| ())
    }

    async fn delivery_quote(&self, request: &QuoteRequest) -> ShippingResult<CourierQuote> {
        let url = Url::parse_with_params(
            &self.endpoint("/v1/external/courier/serviceability/"),
            &[
                ("pickup_postcode", request.pickup_postcode.clone()),
                ("delivery_postcode", request.delivery_postcode.clone()),
                ("cod", if request.cod { "1" } else { "0" }.to_string()),
                ("weight", request.weight.to_string()),
            ],
        )
        .map_err(|e| ShippingError::InvalidResponse {
            message: format!("could not build serviceability URL: {}", e),
        })?;

        let response: ServiceabilityResponse = self.call(Method::GET, url.as_str(), None).await?;
        let quotes = response
            .data
            .map(|d| d.available_courier_companies)
            .unwrap_or_default();

        self.config
            .quote_selection
            .select(quotes)
            .ok_or_else(|| ShippingError::NoCourierAvailable {
                pickup_postcode: request.pickup_postcode.clone(),
                delivery_postcode: request.delivery_postcode.clone(),
            })
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> ShippingResult<ShipmentCreated> {
        let payload = serde_json::to_value(request).map_err(|e| ShippingError::InvalidResponse {
            message: format!("could not encode shipment request: {}", e),
        })?;
        let created: ShipmentCreated = self
            .call(
                Method::POST,
                &self.endpoint("/v1/external/orders/create/adhoc"),
                Some(&payload),
            )
            .await?;

        if created.shipment_id.is_empty() || created.shipment_id == "0" {
            return Err(ShippingError::InvalidResponse {
                message: "shipment created without a shipment id".to_string(),
            });
        }
        info!(
            provider = PROVIDER,
            order_id = %request.order_id,
            shipment_id = %created.shipment_id,
            "shipment created"
        );
        Ok(created)
    }

    async fn assign_awb(&self, shipment_id: &str) -> ShippingResult<AwbAssignment> {
        let payload = json!({ "shipment_id": shipment_id });
        let response: JsonValue = self
            .call(
                Method::POST,
                &self.endpoint("/v1/external/courier/assign/awb"),
                Some(&payload),
            )
            .await?;

        let data = &response["response"]["data"];
        let awb_code = data["awb_code"]
            .as_str()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| ShippingError::ProviderError {
                status: 200,
                message: data["awb_assign_error"]
                    .as_str()
                    .or_else(|| response["message"].as_str())
                    .unwrap_or("AWB was not assigned")
                    .to_string(),
            })?;

        Ok(AwbAssignment {
            shipment_id: shipment_id.to_string(),
            awb_code: awb_code.to_string(),
            courier_name: data["courier_name"].as_str().map(str::to_string),
        })
    }

    async fn request_pickup(&self, shipment_id: &str) -> ShippingResult<PickupScheduled> {
        let payload = json!({ "shipment_id": [shipment_id] });
        let response: JsonValue = self
            .call(
                Method::POST,
                &self.endpoint("/v1/external/courier/generate/pickup"),
                Some(&payload),
            )
            .await?;

        if response["pickup_status"].as_i64() != Some(1) {
            return Err(ShippingError::ProviderError {
                status: 200,
                message: response["message"]
                    .as_str()
                    .unwrap_or("pickup was not scheduled")
                    .to_string(),
            });
        }

        let details = &response["response"];
        Ok(PickupScheduled {
            shipment_id: shipment_id.to_string(),
            pickup_scheduled_date: details["pickup_scheduled_date"].as_str().map(str::to_string),
            pickup_token_number: details["pickup_token_number"]
                .as_str()
                .map(str::to_string)
                .or_else(|| details["pickup_token_number"].as_i64().map(|n| n.to_string())),
        })
    }

    async fn tracking(&self, shipment_id: &str) -> ShippingResult<JsonValue> {
        self.call(
            Method::GET,
            &self.endpoint(&format!("/v1/external/courier/track/shipment/{}", shipment_id)),
            None,
        )
        .await
    }

    async fn all_orders(&self) -> ShippingResult<Vec<JsonValue>> {
        let response: OrdersResponse = self
            .call(Method::GET, &self.endpoint("/v1/external/orders"), None)
            .await?;
        Ok(response.data)
    }

    async fn add_pickup_location(&self, location: &PickupLocation) -> ShippingResult<JsonValue> {
        let payload = serde_json::to_value(location).map_err(|e| ShippingError::InvalidResponse {
            message: format!("could not encode pickup location: {}", e),
        })?;
        self.call(
            Method::POST,
            &self.endpoint("/v1/external/settings/company/addpickup"),
            Some(&payload),
        )
        .await
    }

    async fn generate_invoice(&self, order_ids: &[String]) -> ShippingResult<Invoice> {
        let payload = json!({ "ids": order_ids });
        self.call(
            Method::POST,
            &self.endpoint("/v1/external/orders/print/invoice"),
            Some(&payload),
        )
        .await
    }

    async fn session_active(&self) -> bool {
        self.session.is_active().await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityResponse {
    #[serde(default)]
    data: Option<ServiceabilityData>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityData {
    #[serde(default)]
    available_courier_companies: Vec<CourierQuote>,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    data: Vec<JsonValue>,
}
