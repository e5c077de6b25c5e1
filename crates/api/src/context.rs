//! Per-request identity and correlation context.
//!
//! Token issuance and verification live outside this system; the gateway in
//! front of these services authenticates callers and forwards the verified
//! identity in `x-user-id`. Handlers that record a creator reject requests
//! without it.

use axum::http::HeaderMap;
use uuid::Uuid;

use tableshop_core::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// The authenticated caller, as asserted by the gateway.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    user_id: UserId,
}

impl RequestIdentity {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Extract the caller identity from headers; `None` when absent or not
    /// a UUID.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(USER_ID_HEADER)?.to_str().ok()?;
        let user_id: UserId = raw.parse().ok()?;
        Some(Self { user_id })
    }
}

/// Correlation id for the request: propagated from the inbound header when
/// present and well-formed, freshly generated otherwise.
pub fn correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::now_v7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_requires_a_valid_uuid_header() {
        let mut headers = HeaderMap::new();
        assert!(RequestIdentity::from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(RequestIdentity::from_headers(&headers).is_none());

        let user_id = UserId::new();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&user_id.to_string()).unwrap(),
        );
        assert_eq!(
            RequestIdentity::from_headers(&headers).unwrap().user_id(),
            user_id
        );
    }

    #[test]
    fn correlation_id_propagates_or_generates() {
        let mut headers = HeaderMap::new();
        let generated = correlation_id(&headers);
        assert!(!generated.is_nil());

        let inbound = Uuid::now_v7();
        headers.insert(
            CORRELATION_ID_HEADER,
            HeaderValue::from_str(&inbound.to_string()).unwrap(),
        );
        assert_eq!(correlation_id(&headers), inbound);
    }
}
