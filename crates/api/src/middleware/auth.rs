//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use waitline_core::error::CoreError;
use waitline_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated merchant extracted from a JWT Bearer token in the
/// `Authorization` header.
///
/// Besides validating the token, admission is checked against the
/// idle-session guard: a token whose dashboard session idled out is rejected
/// even if the JWT itself has not expired.
///
/// ```ignore
/// async fn my_handler(merchant: AuthMerchant) -> AppResult<Json<()>> {
///     tracing::info!(merchant_id = merchant.merchant_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthMerchant {
    /// The merchant's internal id (from `claims.sub`).
    pub merchant_id: DbId,
    /// The merchant's role name (e.g. `"owner"`, `"staff"`).
    pub role: String,
    /// The token's unique id (`jti`); keys the idle-session guard.
    pub session_id: String,
}

impl FromRequestParts<AppState> for AuthMerchant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        // Reject tokens whose dashboard session idled out.
        state.idle.ensure_active(&claims.jti, chrono::Utc::now())?;

        Ok(AuthMerchant {
            merchant_id: claims.sub,
            role: claims.role,
            session_id: claims.jti,
        })
    }
}
