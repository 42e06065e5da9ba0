// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, Request},
};

/// Maximum request body size buffered into the unified request.
// TODO limit body size by configuration.
pub const MAX_BODY_SIZE: usize = 65535;

/// Trusted proxy header carrying the originating client address.
pub const TRUSTED_CLIENT_ADDR_HEADER: &str = "CF-Connecting-IP";
/// Secondary forwarded-for header, consulted when the trusted header is absent.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

#[derive(Clone)]
pub struct HttpIncomingRequest {
    pub method: String,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub headers: HashMap<String, Option<String>>,
    pub path: String,
    pub query: Option<String>,
    /// Buffered request body. `None` when the body could not be read within
    /// [`MAX_BODY_SIZE`]; such a request must not be forwarded as if it had
    /// an empty body.
    pub body: Option<Bytes>,
    /// Candidate client address, resolved with the precedence: trusted proxy
    /// header, forwarded-for header, connection peer address. `None` when no
    /// usable address could be derived, which callers must treat as banned
    /// (deny by default).
    pub client_addr: Option<String>,
}

impl HttpIncomingRequest {
    pub async fn new(req: Request<Body>) -> Arc<Self> {
        let (parts, body) = req.into_parts();
        let body = match to_bytes(body, MAX_BODY_SIZE).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Failed to buffer request body within {} bytes: {}", MAX_BODY_SIZE, e);
                None
            }
        };
        let req = Request::from_parts(parts, Body::empty());
        let uri = req.uri();

        // Extract request headers.
        let headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                let key = name.as_str().to_string();
                let value = value.to_str().map(|v| v.to_string()).ok();
                (key, value)
            })
            .collect();

        let client_addr = Self::extract_client_addr(&req);

        Arc::new(HttpIncomingRequest {
            method: req.method().to_string(),
            scheme: uri.scheme().map(|s| s.to_string()),
            host: uri.host().map(|s| s.to_string()),
            port: uri.port_u16(),
            headers,
            path: uri.path().to_string(),
            query: uri.query().map(|s| s.to_string()),
            body,
            client_addr,
        })
    }

    // Extract the candidate client address with the trusted proxy header
    // first, then the forwarded-for header, then the literal connection peer
    // address. Empty header values count as absent.
    fn extract_client_addr(req: &Request<Body>) -> Option<String> {
        Self::header_value(req, TRUSTED_CLIENT_ADDR_HEADER)
            .or_else(|| Self::header_value(req, FORWARDED_FOR_HEADER))
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|connect_info| connect_info.0.ip().to_string())
            })
    }

    fn header_value(req: &Request<Body>, name: &str) -> Option<String> {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_builder() -> axum::http::request::Builder {
        Request::builder().method("GET").uri("http://localhost:9000/some/path?foo=bar")
    }

    #[tokio::test]
    async fn test_trusted_header_takes_precedence() {
        let req = request_builder()
            .header(TRUSTED_CLIENT_ADDR_HEADER, "203.0.113.7")
            .header(FORWARDED_FOR_HEADER, "198.51.100.1")
            .body(Body::empty())
            .unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.client_addr.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_forwarded_for_fallback() {
        let req = request_builder()
            .header(FORWARDED_FOR_HEADER, "198.51.100.1")
            .body(Body::empty())
            .unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.client_addr.as_deref(), Some("198.51.100.1"));
    }

    #[tokio::test]
    async fn test_peer_addr_fallback() {
        let mut req = request_builder().body(Body::empty()).unwrap();
        let peer: SocketAddr = "192.0.2.9:51234".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.client_addr.as_deref(), Some("192.0.2.9"));
    }

    #[tokio::test]
    async fn test_no_usable_address_is_none() {
        let req = request_builder().body(Body::empty()).unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.client_addr, None);
    }

    #[tokio::test]
    async fn test_empty_header_value_counts_as_absent() {
        let mut req = request_builder()
            .header(TRUSTED_CLIENT_ADDR_HEADER, "")
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "192.0.2.9:51234".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.client_addr.as_deref(), Some("192.0.2.9"));
    }

    #[tokio::test]
    async fn test_empty_trusted_header_falls_to_forwarded_for() {
        let req = request_builder()
            .header(TRUSTED_CLIENT_ADDR_HEADER, "")
            .header(FORWARDED_FOR_HEADER, "198.51.100.1")
            .body(Body::empty())
            .unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.client_addr.as_deref(), Some("198.51.100.1"));
    }

    #[tokio::test]
    async fn test_body_within_limit_is_buffered() {
        let req = request_builder().body(Body::from("hello")).unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.body.as_deref(), Some("hello".as_bytes()));
    }

    #[tokio::test]
    async fn test_oversized_body_is_not_buffered_as_empty() {
        let req = request_builder()
            .body(Body::from(vec![0u8; MAX_BODY_SIZE + 1]))
            .unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.body, None);
    }

    #[tokio::test]
    async fn test_headers_flattened_lowercase() {
        let req = request_builder()
            .header("X-Custom-Header", "value")
            .body(Body::empty())
            .unwrap();

        let incoming = HttpIncomingRequest::new(req).await;
        assert_eq!(incoming.headers.get("x-custom-header"), Some(&Some("value".to_string())));
        assert_eq!(incoming.method, "GET");
        assert_eq!(incoming.path, "/some/path");
        assert_eq!(incoming.query.as_deref(), Some("foo=bar"));
    }
}
