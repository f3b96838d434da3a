//! Caller identity from a trusted request header.
//!
//! The server sits behind an authenticating proxy that sets the configured
//! header to the user id. A missing, empty or non-UTF-8 header means the
//! request is unauthenticated; the service layer turns that into a 401.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};
use taskdeck::service::Authenticate;
use taskdeck_proto::task::UserId;

use crate::api::AppState;

/// The identity a request arrived with, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderIdentity(Option<UserId>);

impl HeaderIdentity {
    /// Reads `header` from `headers`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, header: &HeaderName) -> Self {
        let user = headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(UserId::new);
        Self(user)
    }
}

impl Authenticate for HeaderIdentity {
    fn caller(&self) -> Option<UserId> {
        self.0.clone()
    }
}

impl FromRequestParts<Arc<AppState>> for HeaderIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, state.identity_header()))
    }
}
