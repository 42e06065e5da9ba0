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

use std::{env, sync::Arc};

use arc_swap::ArcSwap;
use common_telemetry::logging::LoggingOptions;
use config::Config;
use dotenv::dotenv;
use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Environment variable pointing at the external configuration file.
pub const CFG_PATH_ENV: &str = "BANGUARD_CFG_PATH";

// Global program information.
pub const GIT_VERSION: &str = env!("GIT_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("GIT_COMMIT_HASH");
pub const GIT_BUILD_DATE: &str = env!("GIT_BUILD_DATE");

lazy_static! {
    pub static ref VERSION: String = format!(
        "GitVersion: {}, GitHash: {}, GitBuildDate: {}",
        env!("GIT_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("GIT_BUILD_DATE")
    );
}

pub type AppConfig = AppConfigProperties;

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfigProperties {
    #[serde(rename = "service-name", default = "AppConfigProperties::default_service_name")]
    #[validate(length(min = 1, max = 32))]
    pub service_name: String,
    #[serde(default = "ServerProperties::default")]
    pub server: ServerProperties,
    #[serde(default = "LoggingOptions::default")]
    pub logging: LoggingOptions,
    #[serde(default = "BanguardProperties::default")]
    #[validate(nested)]
    pub banguard: BanguardProperties,
}

impl AppConfigProperties {
    fn default_service_name() -> String {
        "banguard".to_string()
    }
}

impl Default for AppConfigProperties {
    fn default() -> Self {
        Self {
            service_name: Self::default_service_name(),
            server: ServerProperties::default(),
            logging: LoggingOptions::default(),
            banguard: BanguardProperties::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ServerProperties {
    pub host: String,
    pub port: u16,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct BanguardProperties {
    /// The only required token: path of the externally maintained ban file.
    #[serde(rename = "ban-file", default)]
    #[validate(length(min = 1, message = "the 'ban-file' path is required"))]
    pub ban_file: String,
    /// Fallback reload period in seconds when change notifications are missed.
    #[serde(rename = "reload-interval", default = "BanguardProperties::default_reload_interval")]
    pub reload_interval: u64,
    /// Debounce window in milliseconds collapsing bursts of file changes.
    #[serde(rename = "reload-debounce-ms", default = "BanguardProperties::default_reload_debounce_ms")]
    pub reload_debounce_ms: u64,
    // Notice: Nginx support status code range: 300-599.
    #[serde(rename = "blocked-status-code", default = "BanguardProperties::default_blocked_status_code")]
    pub blocked_status_code: Option<u16>,
    #[serde(rename = "blocked-header-name", default = "BanguardProperties::default_blocked_header_name")]
    pub blocked_header_name: String,
    /// Requests carrying this header are banned unconditionally, bypassing
    /// the registry lookup (testing / manual ban trigger).
    #[serde(rename = "force-ban-header", default = "BanguardProperties::default_force_ban_header")]
    pub force_ban_header: String,
    #[serde(rename = "forward", default = "ForwardProperties::default")]
    pub forward: ForwardProperties,
}

impl BanguardProperties {
    fn default_reload_interval() -> u64 {
        10
    }

    fn default_reload_debounce_ms() -> u64 {
        200
    }

    fn default_blocked_status_code() -> Option<u16> {
        Some(403)
    }

    fn default_blocked_header_name() -> String {
        "X-Banguard-Blocked".to_string()
    }

    fn default_force_ban_header() -> String {
        "X-Banguard-Ban".to_string()
    }
}

impl Default for BanguardProperties {
    fn default() -> Self {
        Self {
            ban_file: String::new(),
            reload_interval: Self::default_reload_interval(),
            reload_debounce_ms: Self::default_reload_debounce_ms(),
            blocked_status_code: Self::default_blocked_status_code(),
            blocked_header_name: Self::default_blocked_header_name(),
            force_ban_header: Self::default_force_ban_header(),
            forward: ForwardProperties::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ForwardProperties {
    #[serde(rename = "upstream-destination-header-name")]
    pub upstream_destination_header_name: String,
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,
    #[serde(rename = "read-timeout")]
    pub read_timeout: u64,
    #[serde(rename = "total-timeout")]
    pub total_timeout: u64,
    pub verbose: bool,
    #[serde(rename = "http-proxy")]
    pub http_proxy: Option<String>,
}

impl Default for ForwardProperties {
    fn default() -> Self {
        Self {
            upstream_destination_header_name: "X-Upstream-Destination".to_string(),
            connect_timeout: 5,
            read_timeout: 10,
            total_timeout: 15,
            verbose: false,
            http_proxy: None,
        }
    }
}

fn init() -> Arc<AppConfig> {
    dotenv().ok(); // Notice: Must be called before parse from environment file (.env).

    let config = env::var(CFG_PATH_ENV)
        .map(|path| {
            Config::builder()
                .add_source(config::File::with_name(path.as_str()))
                .add_source(
                    // Notice: Use double "_" to distinguish between different hierarchy struct or attribute alies at the same level.
                    config::Environment::with_prefix("BANGUARD").separator("__"),
                )
                .build()
                .unwrap_or_else(|err| panic!("Error parsing config: {}", err))
                .try_deserialize::<AppConfigProperties>()
                .unwrap_or_else(|err| panic!("Error deserialize config: {}", err))
        })
        .unwrap_or_default();

    // Misconfiguration is fatal at startup: the server must not come up with
    // this module half-configured.
    if let Err(err) = config.validate() {
        panic!("Invalid configuration: {}", err);
    }

    if env::var("BANGUARD_CFG_VERBOSE").is_ok() || env::var("VERBOSE").is_ok() {
        tracing::info!(
            "Loaded the config details: {}",
            serde_json::to_string(&config).unwrap_or_default()
        );
    }

    Arc::new(config)
}

pub fn get_config() -> Arc<AppConfig> {
    CONFIG.load().clone()
}

pub fn refresh_config() -> Result<(), anyhow::Error> {
    CONFIG.store(init());
    Ok(())
}

// Global the single refreshable configuration instance.
static CONFIG: Lazy<ArcSwap<AppConfig>> = Lazy::new(|| ArcSwap::from(init()));
