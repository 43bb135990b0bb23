use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use procura_core::RequesterContext;

use super::{ApiError, ApiState, CORRELATION_ID_HEADER, REQUESTER_ID_HEADER, REQUESTER_ROLE_HEADER};

/// Caller identity and correlation id resolved from request headers.
///
/// The workflow trusts `x-requester-id` / `x-requester-role` as supplied by the fronting
/// gateway. When an API token is configured, requests must also carry `Authorization: Bearer`.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub requester: RequesterContext,
    pub correlation_id: String,
}

impl FromRequestParts<ApiState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = header(parts, CORRELATION_ID_HEADER)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4()));

        if let Some(expected) = &state.api_token {
            let presented = header(parts, AUTHORIZATION.as_str())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim);
            if !presented.is_some_and(|token| token_matches(expected, token)) {
                return Err(ApiError::unauthorized(
                    "missing or invalid bearer token",
                    correlation_id,
                ));
            }
        }

        let Some(user_id) = header(parts, REQUESTER_ID_HEADER) else {
            return Err(ApiError::unauthorized(
                format!("missing `{REQUESTER_ID_HEADER}` header"),
                correlation_id,
            ));
        };
        let role = header(parts, REQUESTER_ROLE_HEADER).unwrap_or_default();

        Ok(Self { requester: RequesterContext::new(user_id, role), correlation_id })
    }
}

/// Constant-time comparison of the presented bearer token with the configured one.
fn token_matches(expected: &SecretString, presented: &str) -> bool {
    expected.expose_secret().as_bytes().ct_eq(presented.as_bytes()).into()
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::token_matches;

    #[test]
    fn bearer_token_must_match_exactly() {
        let expected = SecretString::from("procura-local-token".to_owned());

        assert!(token_matches(&expected, "procura-local-token"));
        assert!(!token_matches(&expected, "procura-local-tokeN"));
        assert!(!token_matches(&expected, "procura-local"));
        assert!(!token_matches(&expected, ""));
    }
}
