//! REST endpoint handlers organized by resource.

pub mod aggregation;
pub mod enrollment;
pub mod system;

use axum::Router;
use axum::http::HeaderMap;

use crate::app_state::AppState;
use crate::error::GuaranteeError;

/// Header carrying the identity of the acting admin.
pub const ADMIN_ACTOR_HEADER: &str = "x-admin-actor";

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(enrollment::routes())
        .merge(aggregation::routes())
}

/// Reads the acting admin from [`ADMIN_ACTOR_HEADER`].
///
/// # Errors
///
/// Returns [`GuaranteeError::Unauthorized`] if the header is missing,
/// blank or not valid text.
pub fn admin_actor(headers: &HeaderMap) -> Result<String, GuaranteeError> {
    headers
        .get(ADMIN_ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|actor| !actor.is_empty())
        .map(str::to_string)
        .ok_or(GuaranteeError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn actor_is_read_and_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_ACTOR_HEADER, HeaderValue::from_static(" ops@example.com "));
        assert_eq!(admin_actor(&headers).ok().as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn missing_or_blank_actor_is_unauthorized() {
        assert!(matches!(
            admin_actor(&HeaderMap::new()),
            Err(GuaranteeError::Unauthorized)
        ));
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_ACTOR_HEADER, HeaderValue::from_static("   "));
        assert!(matches!(
            admin_actor(&headers),
            Err(GuaranteeError::Unauthorized)
        ));
    }
}
