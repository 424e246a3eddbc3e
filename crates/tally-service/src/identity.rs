//! Caller identity extraction.
//!
//! Authentication happens at the upstream gateway; this service trusts the
//! `x-user-id` header the gateway sets after validating credentials. The
//! extractor rejects requests where the header is missing or not a UUID.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tally_core::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated account id, set by the gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    /// The caller's account id.
    pub user_id: UserId,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {USER_ID_HEADER} header")))?;

        let user_id = value
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))?;

        Ok(Self { user_id })
    }
}
