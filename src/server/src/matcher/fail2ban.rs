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

use std::sync::Arc;

use anyhow::Error;
use banguard_registry::BanRegistry;
use banguard_types::server::HttpIncomingRequest;

use super::RequestMatcher;

/// Matches requests whose source address is listed in the ban registry.
///
/// The decision is deliberately fail-closed: a request whose client address
/// cannot be determined is treated as banned rather than waved through.
pub struct Fail2BanMatcher {
    registry: Arc<BanRegistry>,
    // Lowercased, header keys of the unified request are lowercase.
    force_ban_header: String,
}

impl Fail2BanMatcher {
    pub const NAME: &'static str = "Fail2Ban";

    pub fn new(registry: Arc<BanRegistry>, force_ban_header: &str) -> Arc<Self> {
        Arc::new(Self {
            registry,
            force_ban_header: force_ban_header.to_lowercase(),
        })
    }
}

#[async_trait::async_trait]
impl RequestMatcher for Fail2BanMatcher {
    async fn is_banned(&self, incoming: Arc<HttpIncomingRequest>) -> Result<bool, Error> {
        // The explicit override signal bans unconditionally, regardless of
        // the registry contents.
        if incoming.headers.contains_key(&self.force_ban_header) {
            tracing::info!("Force banned by header '{}': {}", self.force_ban_header, incoming.path);
            return Ok(true);
        }

        let client_addr = match incoming.client_addr.as_deref() {
            Some(addr) => addr,
            None => {
                // Deny by default.
                tracing::error!("No client address found in headers or peer address: {}", incoming.path);
                return Ok(true);
            }
        };

        if self.registry.is_banned(client_addr) {
            tracing::info!("Banned client address: {}", client_addr);
            return Ok(true);
        }

        tracing::debug!("Received request from client address: {}", client_addr);
        Ok(false)
    }
}
