//! Client address resolution and request logging.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Originating client address: first `X-Forwarded-For` hop, else the peer.
///
/// Use as an Axum extractor; it never rejects.
/// ```ignore
/// async fn handler(client: ClientAddr) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub Option<String>);

impl ClientAddr {
    fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self(forwarded.or_else(|| peer.map(|p| p.ip().to_string())))
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or("unknown"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::resolve(&parts.headers, peer))
    }
}

/// Log method, URI and client address of every request.
pub async fn log_request(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientAddr::resolve(request.headers(), peer);
    tracing::info!(
        method = %request.method(),
        uri = %request.uri(),
        client = %client,
        "Request received"
    );
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer = Some(SocketAddr::from(([127, 0, 0, 1], 4000)));

        assert_eq!(
            ClientAddr::resolve(&headers, peer),
            ClientAddr(Some("203.0.113.7".into()))
        );
    }

    #[test]
    fn falls_back_to_peer_ip() {
        let peer = Some(SocketAddr::from(([127, 0, 0, 1], 4000)));
        let client = ClientAddr::resolve(&HeaderMap::new(), peer);
        assert_eq!(client.to_string(), "127.0.0.1");
    }

    #[test]
    fn unknown_without_any_source() {
        let client = ClientAddr::resolve(&HeaderMap::new(), None);
        assert_eq!(client.to_string(), "unknown");
    }
}
