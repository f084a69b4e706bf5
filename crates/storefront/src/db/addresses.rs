//! Customer shipping addresses.

use sqlx::PgPool;

use bozor_core::models::Address;
use bozor_core::{AddressId, UserId};

use super::RepositoryError;

macro_rules! address_columns {
    () => {
        "id, user_id, full_name, phone, line1, line2, city, region, postal_code, country, \
         is_default, created_at, updated_at"
    };
}

/// Column widths of the `addresses` table.
pub mod limits {
    pub const FULL_NAME: usize = 120;
    pub const PHONE: usize = 30;
    pub const LINE: usize = 200;
    pub const CITY: usize = 80;
    pub const REGION: usize = 80;
    pub const POSTAL_CODE: usize = 20;
}

/// Validated fields for a new address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
}

pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A user's addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let addresses = sqlx::query_as::<_, Address>(concat!(
            "SELECT ",
            address_columns!(),
            " FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, full_name, id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(addresses)
    }

    /// Address by ID, whoever owns it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(concat!(
            "SELECT ",
            address_columns!(),
            " FROM addresses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(address)
    }

    /// Save an address. A default address clears `is_default` on the user's
    /// other addresses in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn create(
        &self,
        user_id: UserId,
        address: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if address.is_default {
            sqlx::query(
                "UPDATE addresses SET is_default = FALSE, updated_at = now() \
                 WHERE user_id = $1 AND is_default",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        let created = sqlx::query_as::<_, Address>(concat!(
            "INSERT INTO addresses \
             (user_id, full_name, phone, line1, line2, city, region, postal_code, country, is_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING ",
            address_columns!()
        ))
        .bind(user_id)
        .bind(&address.full_name)
        .bind(&address.phone)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.region)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(address.is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }
}
