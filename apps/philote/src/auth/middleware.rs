//! Access token extraction for the gateway upgrade.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::auth::AccessKey;
use crate::error::ApiError;
use crate::AppState;

/// Capabilities of the caller, verified from `Authorization: Bearer <token>`
/// or, when that header is empty, the `auth` query-string parameter.
#[derive(Debug, Clone)]
pub struct AccessGrant(pub AccessKey);

#[derive(Debug, Deserialize)]
struct AuthQuery {
    auth: Option<String>,
}

impl FromRequestParts<AppState> for AccessGrant {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(&parts.headers) {
            Some(token) => token,
            None => {
                tracing::debug!("empty Authorization header, trying auth query parameter");
                Query::<AuthQuery>::try_from_uri(&parts.uri)
                    .ok()
                    .and_then(|Query(q)| q.auth)
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| ApiError::unauthorized("Missing access token"))?
            }
        };

        let key = state.tokens.verify(token.trim())?;
        Ok(Self(key))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer").unwrap_or(header).trim();
    (!token.is_empty()).then(|| token.to_string())
}
