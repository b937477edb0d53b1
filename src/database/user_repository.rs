use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Storefront account, reduced to the fields checkout and shipping read
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_brand: bool,
    /// Shipping aggregator pickup nickname registered for this brand
    pub pickup_location: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub pincode: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// Brand accounts registered under `pickup_location`
    async fn find_brands_by_pickup_location(
        &self,
        pickup_location: &str,
    ) -> Result<Vec<User>, DatabaseError>;

    async fn update_pickup_location(
        &self,
        id: Uuid,
        pickup_location: &str,
    ) -> Result<(), DatabaseError>;
}

#[cfg(feature = "database")]
pub use pg::PgUserRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use sqlx::PgPool;

    const USER_COLUMNS: &str = "id, email, name, is_brand, pickup_location, address, city, \
         pincode, state, country, phone, created_at";

    pub struct PgUserRepository {
        pool: PgPool,
    }

    impl PgUserRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl UserRepository for PgUserRepository {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
            let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)
        }

        async fn find_brands_by_pickup_location(
            &self,
            pickup_location: &str,
        ) -> Result<Vec<User>, DatabaseError> {
            let sql = format!(
                "SELECT {} FROM users
                 WHERE is_brand = TRUE AND pickup_location = $1
                 ORDER BY created_at ASC, id ASC",
                USER_COLUMNS
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(pickup_location)
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)
        }

        async fn update_pickup_location(
            &self,
            id: Uuid,
            pickup_location: &str,
        ) -> Result<(), DatabaseError> {
            let result = sqlx::query("UPDATE users SET pickup_location = $2 WHERE id = $1")
                .bind(id)
                .bind(pickup_location)
                .execute(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::not_found("user", id));
            }
            Ok(())
        }
    }
}
