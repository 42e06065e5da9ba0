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

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{body::Body, response::Response};
use banguard_types::server::HttpIncomingRequest;
use reqwest::{header, Method, Proxy};

use crate::config::config::ForwardProperties;

use super::IForwardHandler;

pub struct HttpForwardHandler {
    client: reqwest::Client,
    // Lowercased, header keys of the unified request are lowercase.
    upstream_header_name: String,
}

impl HttpForwardHandler {
    pub fn new(config: &ForwardProperties) -> Self {
        let mut builder = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .read_timeout(Duration::from_secs(config.read_timeout))
            .timeout(Duration::from_secs(config.total_timeout))
            .connection_verbose(config.verbose);
        if let Some(proxy) = &config.http_proxy {
            builder = builder.proxy(Proxy::http(proxy).expect("parse http proxy addr error"));
        }
        Self {
            client: builder.build().expect("build http client error"),
            upstream_header_name: config.upstream_destination_header_name.to_lowercase(),
        }
    }

    // Extract the upstream URL from the request headers.
    fn get_upstream_url(&self, incoming: &HttpIncomingRequest) -> Result<String> {
        let upstream_base_uri = incoming
            .headers
            .get(&self.upstream_header_name)
            .and_then(|v| v.as_deref())
            .ok_or_else(||
                // Only record warning logs instead of error stack
                anyhow::anyhow!(format!(
                    "Missing upstream destination header with '{}'",
                    self.upstream_header_name
                )))?;

        // If the upstream base URL ends with a slash and the path starts with a slash to prevent duplicate slash.
        let path = incoming.path.as_str();
        let mut url = if upstream_base_uri.ends_with('/') && path.starts_with('/') {
            format!("{}{}", upstream_base_uri, &path[1..])
        } else if !upstream_base_uri.ends_with('/') && !path.starts_with('/') {
            format!("{}/{}", upstream_base_uri, path)
        } else {
            format!("{}{}", upstream_base_uri, path)
        };
        if let Some(query) = &incoming.query {
            url = format!("{}?{}", url, query);
        }

        tracing::debug!("Extracted the upstream uri: {}", url);
        Ok(url)
    }

    // Forward the request to the upstream server.
    async fn do_forward_request(&self, incoming: Arc<HttpIncomingRequest>, url: String) -> Result<Response<Body>> {
        tracing::debug!("Forwarding request to upstream: {}", url);

        let method = Method::from_bytes(incoming.method.as_bytes()).context("Invalid request method")?;
        let mut req_builder = self.client.request(method, url.to_owned());

        // Copy original request headers, but exclude certain headers
        for (name, value) in incoming.headers.iter() {
            // Skip certain headers, such as custom upstream destination header and connection related headers.
            if name == &self.upstream_header_name
                || name == header::HOST.as_str()
                || name == header::CONNECTION.as_str()
            {
                continue;
            }
            if let Some(value) = value {
                req_builder = req_builder.header(name.as_str(), value.as_str());
            }
        }

        // Addidtional set the request body if provided.
        if let Some(body) = &incoming.body {
            req_builder = req_builder.body(body.clone());
        }

        // Execute the request.
        let resp = req_builder.send().await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.context("Failed to read response body from upstream")?;

        tracing::debug!("Forwarded response from upstream status: {}, url: {}", status, url);

        // Build the response.
        let mut response = Response::builder()
            .status(status.as_u16())
            .body(Body::from(bytes))
            .context("Failed to build response")?;

        // Copy the headers from the upstream response.
        let resp_headers = response.headers_mut();
        for (name, value) in headers {
            if let Some(name) = name {
                if name != header::CONNECTION {
                    resp_headers.insert(name, value);
                }
            }
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl IForwardHandler for HttpForwardHandler {
    async fn http_forward(&self, incoming: Arc<HttpIncomingRequest>) -> Result<Response<Body>> {
        match self.get_upstream_url(&incoming) {
            Ok(url) => self.do_forward_request(incoming, url).await,
            Err(err) => Err(err),
        }
    }
}
