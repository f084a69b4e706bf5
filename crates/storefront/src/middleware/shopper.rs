//! The current shopper: optional logged-in user plus the session cart token.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use bozor_core::UserId;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};
use crate::services::cart::{CartError, CartManager};

/// Extractor for anyone browsing the shop.
///
/// Makes sure the session carries a cart token, so anonymous visitors can
/// fill a cart before logging in.
pub struct Shopper {
    pub user: Option<CurrentUser>,
    pub cart_token: String,
    session: Session,
}

impl<S> FromRequestParts<S> for Shopper
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let user = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten();

        let cart_token = ensure_cart_token(&session).await?;

        Ok(Self {
            user,
            cart_token,
            session,
        })
    }
}

async fn ensure_cart_token(session: &Session) -> Result<String, AppError> {
    if let Some(token) = session
        .get::<String>(session_keys::CART_TOKEN)
        .await
        .map_err(|e| AppError::Internal(format!("session read failed: {e}")))?
        .filter(|t| !t.is_empty())
    {
        return Ok(token);
    }

    let token = Uuid::new_v4().simple().to_string();
    session
        .insert(session_keys::CART_TOKEN, &token)
        .await
        .map_err(|e| AppError::Internal(format!("session write failed: {e}")))?;
    Ok(token)
}

impl Shopper {
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Open (or create) this shopper's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the cart cannot be loaded.
    pub async fn cart<'a>(&self, pool: &'a PgPool) -> Result<CartManager<'a>, CartError> {
        CartManager::open(pool, self.user_id(), Some(&self.cart_token)).await
    }

    /// Header badge count. Failures are logged and shown as zero.
    pub async fn cart_count(&self, pool: &PgPool) -> i64 {
        match CartManager::badge_count(pool, self.user_id(), Some(&self.cart_token)).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count cart items");
                0
            }
        }
    }
}
