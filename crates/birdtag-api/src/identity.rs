//! Caller identity
//!
//! Authentication happens upstream; the service only receives an opaque user
//! id, in the `X-User-Id` header or the `userID` query parameter.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use birdtag_core::validation::USER_ID_PARAM;
use birdtag_core::AppError;

use crate::constants::USER_ID_HEADER;
use crate::error::HttpAppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

impl CallerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_parts(parts: &Parts) -> Option<Self> {
        let from_header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if from_header.is_some() {
            return from_header.map(CallerIdentity);
        }

        let Query(params) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri).ok()?;
        params
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(USER_ID_PARAM))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(CallerIdentity)
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts).ok_or_else(|| {
            HttpAppError(AppError::Unauthorized(
                "Missing caller identity: send an X-User-Id header or a userID parameter"
                    .to_string(),
            ))
        })
    }
}
