//! Session keys written by the auth service and the extractor that reads
//! them.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::{AppError, db::UserId};

pub const USER_ID: &str = "user_id";

/// The authenticated caller. Rejects with 401 when the session carries no
/// user id; the id itself is trusted as issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| AppError::Internal(anyhow::anyhow!(message)))?;

        session
            .get::<UserId>(USER_ID)
            .await?
            .map(AuthUser)
            .ok_or(AppError::Unauthenticated)
    }
}
