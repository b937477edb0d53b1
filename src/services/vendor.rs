use crate::database::order_repository::{Order, OrderRepository, OrderStatus};
use crate::database::user_repository::{User, UserRepository};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorSales {
    pub vendor_id: Uuid,
    pub confirmed_orders: usize,
    pub pending_orders: usize,
    pub units_sold: u64,
    pub gross_sales: Decimal,
}

/// Brand lookups for checkout and the vendor dashboards
pub struct VendorService {
    users: Arc<dyn UserRepository>,
    orders: Arc<dyn OrderRepository>,
}

impl VendorService {
    pub fn new(users: Arc<dyn UserRepository>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { users, orders }
    }

    /// Find the brand an order ships from.
    ///
    /// An explicit `vendor_id` wins. Otherwise brands are matched on the
    /// pickup location label; when several brands share a label the oldest
    /// account (then lowest id) is chosen.
    pub async fn resolve(&self, vendor_id: Option<Uuid>, pickup_location: &str) -> AppResult<User> {
        if let Some(id) = vendor_id {
            return match self.users.find_by_id(id).await? {
                Some(user) if user.is_brand => Ok(user),
                _ => Err(vendor_not_found(id.to_string())),
            };
        }

        let label = pickup_location.trim();
        if label.is_empty() {
            return Err(AppError::missing_field("pickup_location"));
        }

        let candidates = self.users.find_brands_by_pickup_location(label).await?;
        if candidates.len() > 1 {
            warn!(
                pickup_location = %label,
                matches = candidates.len(),
                "several brands share a pickup location, using the oldest account"
            );
        }

        let vendor = candidates
            .into_iter()
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .ok_or_else(|| vendor_not_found(label.to_string()))?;

        debug!(vendor_id = %vendor.id, pickup_location = %label, "vendor resolved");
        Ok(vendor)
    }

    pub async fn brand(&self, vendor_id: Uuid) -> AppResult<User> {
        match self.users.find_by_id(vendor_id).await? {
            Some(user) if user.is_brand => Ok(user),
            _ => Err(vendor_not_found(vendor_id.to_string())),
        }
    }

    pub async fn orders(&self, vendor_id: Uuid) -> AppResult<Vec<Order>> {
        self.brand(vendor_id).await?;
        Ok(self.orders.list_by_vendor(vendor_id).await?)
    }

    pub async fn sales(&self, vendor_id: Uuid) -> AppResult<VendorSales> {
        let orders = self.orders(vendor_id).await?;
        Ok(summarize_sales(vendor_id, &orders))
    }

    pub async fn set_pickup_location(&self, vendor_id: Uuid, label: &str) -> AppResult<()> {
        self.brand(vendor_id).await?;
        self.users.update_pickup_location(vendor_id, label).await?;
        Ok(())
    }
}

fn vendor_not_found(lookup: String) -> AppError {
    AppError::new(AppErrorKind::Domain(DomainError::VendorNotFound { lookup }))
}

/// Only confirmed orders count towards sales
pub fn summarize_sales(vendor_id: Uuid, orders: &[Order]) -> VendorSales {
    let mut summary = VendorSales {
        vendor_id,
        confirmed_orders: 0,
        pending_orders: 0,
        units_sold: 0,
        gross_sales: Decimal::ZERO,
    };

    for order in orders.iter().filter(|o| o.vendor_id == vendor_id) {
        match order.status {
            OrderStatus::Confirmed => {
                summary.confirmed_orders += 1;
                summary.gross_sales += order.totals.total;
                summary.units_sold += order.items.iter().map(|i| u64::from(i.quantity)).sum::<u64>();
            }
            OrderStatus::Pending => summary.pending_orders += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{InMemoryOrderRepository, InMemoryUserRepository};
    use crate::error::ErrorCode;
    use chrono::{Duration, Utc};

    fn brand(id: Uuid, label: &str, age_days: i64) -> User {
        User {
            id,
            email: format!("{}@brands.in", id.simple()),
            name: "Brand".to_string(),
            is_brand: true,
            pickup_location: Some(label.to_string()),
            address: None,
            city: None,
            pincode: Some("560001".to_string()),
            state: None,
            country: None,
            phone: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    async fn service(users: Vec<User>) -> VendorService {
        let repo = InMemoryUserRepository::new();
        for user in users {
            repo.add(user).await;
        }
        VendorService::new(Arc::new(repo), Arc::new(InMemoryOrderRepository::new()))
    }

    #[tokio::test]
    async fn explicit_vendor_id_wins_over_label() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let svc = service(vec![brand(a, "Primary", 10), brand(b, "Other", 1)]).await;

        let vendor = svc.resolve(Some(b), "Primary").await.unwrap();
        assert_eq!(vendor.id, b);
    }

    #[tokio::test]
    async fn non_brand_vendor_id_is_not_found() {
        let id = Uuid::new_v4();
        let mut user = brand(id, "Primary", 1);
        user.is_brand = false;
        let svc = service(vec![user]).await;

        let err = svc.resolve(Some(id), "").await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::VendorNotFound);
    }

    #[tokio::test]
    async fn unknown_label_is_not_found() {
        let svc = service(vec![]).await;
        let err = svc.resolve(None, "Nowhere").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
