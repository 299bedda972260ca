//! Request identity extractors.
//!
//! The router sits behind an authenticating gateway that sets the tenant,
//! actor and step-up headers. Nothing here authenticates; it only reads.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use sealform_core::Principal;

use super::error::ApiError;

/// Tenant the gateway authenticated the caller for.
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Caller identity recorded in the audit log.
pub const ACTOR_HEADER: &str = "x-actor";
/// Set to `1` when the caller re-authenticated recently.
pub const STEP_UP_HEADER: &str = "x-step-up";
/// Participant capability for self-service routes.
pub const SELF_TOKEN_HEADER: &str = "x-self-token";
/// Turnstile token, as an alternative to the body field.
pub const TURNSTILE_HEADER: &str = "cf-turnstile-response";
/// Client chain set by the reverse proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Authenticated tenant admin.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let tenant = header(&parts.headers, TENANT_HEADER)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized(TENANT_HEADER))?;
        let actor = header(&parts.headers, ACTOR_HEADER)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized(ACTOR_HEADER))?;

        let mut principal = Principal::new(tenant, actor);
        if header(&parts.headers, STEP_UP_HEADER) == Some("1") {
            principal = principal.with_step_up();
        }

        Ok(Self(principal))
    }
}

/// Best-known client address: first `x-forwarded-for` hop, else the peer.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let forwarded = header(&parts.headers, FORWARDED_FOR_HEADER)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };

        Ok(Self(forwarded.or_else(peer)))
    }
}

/// Header value as UTF-8, if present and valid.
pub(crate) fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn caller_reads_gateway_headers() {
        let mut parts = parts(&[(TENANT_HEADER, "T1"), (ACTOR_HEADER, "alice")]);
        let Caller(principal) = Caller::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(principal, Principal::new("T1", "alice"));
    }

    #[tokio::test]
    async fn step_up_requires_exact_flag() {
        let mut on = parts(&[(TENANT_HEADER, "T1"), (ACTOR_HEADER, "a"), (STEP_UP_HEADER, "1")]);
        let mut off =
            parts(&[(TENANT_HEADER, "T1"), (ACTOR_HEADER, "a"), (STEP_UP_HEADER, "true")]);

        assert!(Caller::from_request_parts(&mut on, &()).await.unwrap().0.step_up);
        assert!(!Caller::from_request_parts(&mut off, &()).await.unwrap().0.step_up);
    }

    #[tokio::test]
    async fn missing_tenant_is_rejected() {
        let mut parts = parts(&[(ACTOR_HEADER, "alice")]);
        let err = Caller::from_request_parts(&mut parts, &()).await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized(TENANT_HEADER)));
    }

    #[tokio::test]
    async fn forwarded_for_takes_first_hop() {
        let mut parts = parts(&[(FORWARDED_FOR_HEADER, " 1.2.3.4 , 10.0.0.1")]);
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(ip.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn falls_back_to_peer_address() {
        let mut parts = parts(&[]);
        parts.extensions.insert(ConnectInfo(SocketAddr::from(([9, 9, 9, 9], 443))));
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(ip.as_deref(), Some("9.9.9.9"));
    }

    #[tokio::test]
    async fn no_address_at_all() {
        let mut parts = parts(&[]);
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(ip, None);
    }
}
