//! Principal extraction from trusted upstream headers.
//!
//! Authentication happens in front of this service; it forwards the
//! resolved identity as `x-principal-*` headers. A missing or unparsable id
//! yields no principal and the core answers `Unauthenticated`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use recordbase_core::{Principal, Role};
use std::convert::Infallible;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";
pub const PRINCIPAL_EMAIL_HEADER: &str = "x-principal-email";

/// The request's principal, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Option<Principal>);

impl Caller {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(principal_from_headers(&parts.headers)))
    }
}

pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    };
    let id = header(PRINCIPAL_ID_HEADER)?.parse::<i64>().ok()?;
    let role = header(PRINCIPAL_ROLE_HEADER)
        .map(Role::parse)
        .unwrap_or(Role::User);
    let email = header(PRINCIPAL_EMAIL_HEADER).unwrap_or_default();
    Some(Principal::new(id, role, email))
}

#[cfg(test)]
mod tests {
    use super::principal_from_headers;
    use axum::http::{HeaderMap, HeaderValue};
    use recordbase_core::Role;

    #[test]
    fn parses_principal_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-principal-id", HeaderValue::from_static(" 42 "));
        headers.insert("x-principal-role", HeaderValue::from_static("admin"));
        headers.insert("x-principal-email", HeaderValue::from_static("a@example.com"));

        let principal = principal_from_headers(&headers).unwrap();
        assert_eq!(principal.id, 42);
        assert_eq!(principal.role, Role::Admin);
        assert_eq!(principal.email, "a@example.com");
    }

    #[test]
    fn missing_or_invalid_id_yields_none() {
        assert!(principal_from_headers(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-principal-id", HeaderValue::from_static("abc"));
        assert!(principal_from_headers(&headers).is_none());
    }

    #[test]
    fn role_defaults_to_user() {
        let mut headers = HeaderMap::new();
        headers.insert("x-principal-id", HeaderValue::from_static("7"));
        let principal = principal_from_headers(&headers).unwrap();
        assert_eq!(principal.role, Role::User);
    }
}
