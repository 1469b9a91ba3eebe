//! Admission and identity middleware.

use super::error::ApiError;
use crate::{
    accounts::{AccountError, Accounts},
    model::{Principal, User},
    ratelimit::{forwarded_client_ip, RateLimitDecision, RateLimiter},
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::debug;

#[derive(Clone)]
pub struct Limiting {
    pub limiter: Arc<dyn RateLimiter>,
    /// Key on `X-Forwarded-For` / `X-Real-IP` instead of the peer address.
    pub trust_proxy: bool,
}

fn client_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_client_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

/// Reject with 429 before the request reaches anything else.
pub async fn rate_limit(State(limiting): State<Limiting>, request: Request, next: Next) -> Response {
    let key = client_key(&request, limiting.trust_proxy);
    match limiting.limiter.check(&key) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited => {
            debug!(client = %key, "rate limited");
            ApiError::RateLimited.into_response()
        }
    }
}

enum Bearer {
    Absent,
    Malformed,
    Token(String),
}

fn bearer(headers: &HeaderMap) -> Bearer {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Bearer::Absent;
    };
    let Ok(value) = value.to_str() else {
        return Bearer::Malformed;
    };
    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(char::is_whitespace) => {
            Bearer::Token(token.to_string())
        }
        _ => Bearer::Malformed,
    }
}

fn vary_on_authorization(mut response: Response) -> Response {
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Resolve the bearer token, if any, into a [`Principal`] request extension.
pub async fn authenticate(
    State(accounts): State<Arc<Accounts>>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = match bearer(request.headers()) {
        Bearer::Absent => Principal::Anonymous,
        Bearer::Malformed => {
            let err = ApiError::from(AccountError::InvalidAuthenticationToken);
            return vary_on_authorization(err.into_response());
        }
        Bearer::Token(token) => match accounts.authenticate(&token).await {
            Ok(user) => Principal::User(user),
            Err(err) => return vary_on_authorization(ApiError::from(err).into_response()),
        },
    };

    request.extensions_mut().insert(principal);
    vary_on_authorization(next.run(request).await)
}

/// Extractor for handlers that need a signed-in user.
#[derive(Debug)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Principal>() {
            Some(Principal::User(user)) => Ok(Self(user.clone())),
            Some(Principal::Anonymous) | None => Err(ApiError::AuthenticationRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_parsing() {
        assert!(matches!(bearer(&HeaderMap::new()), Bearer::Absent));
        assert!(matches!(bearer(&headers("Bearer abc")), Bearer::Token(t) if t == "abc"));
        assert!(matches!(bearer(&headers("Bearer")), Bearer::Malformed));
        assert!(matches!(bearer(&headers("Bearer ")), Bearer::Malformed));
        assert!(matches!(bearer(&headers("Basic abc")), Bearer::Malformed));
        assert!(matches!(bearer(&headers("Bearer a b")), Bearer::Malformed));
    }

    #[test]
    fn client_key_prefers_proxy_headers_only_when_trusted() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));

        assert_eq!(client_key(&request, true), "203.0.113.9");
        assert_eq!(client_key(&request, false), "192.0.2.1");
    }
}
