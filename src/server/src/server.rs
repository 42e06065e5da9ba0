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

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use banguard_registry::{BanRegistry, RegistryOptions};
use banguard_types::server::HttpIncomingRequest;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    config::config::{self, GIT_BUILD_DATE, GIT_COMMIT_HASH, GIT_VERSION},
    forward::{http::HttpForwardHandler, IForwardHandler},
    matcher::{fail2ban::Fail2BanMatcher, RequestMatcher},
};

// Default router URIs paths to excluding.
pub const URI_HEALTHZ: &str = "/healthz";
pub const EXCLUDED_PATHS: [&str; 1] = [URI_HEALTHZ];

#[derive(Clone)]
pub struct BanguardState {
    pub registry: Arc<BanRegistry>,
    pub matcher: Arc<dyn RequestMatcher + Send + Sync>,
    pub forward_handler: Arc<dyn IForwardHandler + Send + Sync>,
}

impl BanguardState {
    pub async fn new() -> Self {
        let config = config::get_config();
        let registry = Arc::new(BanRegistry::new(
            &config.banguard.ban_file,
            RegistryOptions {
                reload_interval: Duration::from_secs(config.banguard.reload_interval),
                reload_debounce: Duration::from_millis(config.banguard.reload_debounce_ms),
            },
        ));
        registry.start().await;

        BanguardState {
            matcher: Fail2BanMatcher::new(registry.clone(), &config.banguard.force_ban_header),
            forward_handler: Arc::new(HttpForwardHandler::new(&config.banguard.forward)),
            registry,
        }
    }
}

async fn banguard_middleware(State(state): State<BanguardState>, req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();
    // Skip the excluded paths.
    if EXCLUDED_PATHS.contains(&uri.path()) {
        tracing::debug!("Passing excluded path: {}", &uri.path());
        return next.run(req).await;
    }

    // Wrap to unified incoming request.
    let incoming = HttpIncomingRequest::new(req).await;

    // Check if the request client address is banned. A matcher failure is
    // treated as banned as well, never fail-open.
    if state.matcher.is_banned(incoming.clone()).await.unwrap_or(true) {
        let config = config::get_config();
        let code = config
            .banguard
            .blocked_status_code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::FORBIDDEN);
        tracing::info!("[Banguard] [AccessDenied] - {}", incoming.path);
        return Response::builder()
            .status(code)
            .header(config.banguard.blocked_header_name.to_owned(), Fail2BanMatcher::NAME)
            .body("Access denied by Banguard".into())
            .unwrap_or_else(|_| StatusCode::FORBIDDEN.into_response());
    }

    // A body that could not be buffered must be rejected here: forwarding it
    // as empty would corrupt the upstream request while keeping its headers.
    if incoming.body.is_none() {
        tracing::warn!("[Banguard] [BodyTooLarge] - {}", &incoming.path);
        return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string()).into_response();
    }

    // Forwarding request to the upstream servers.
    match state.forward_handler.http_forward(incoming.clone()).await {
        Ok(response) => {
            tracing::debug!("[Banguard] [Forwarded] - {}", &incoming.path);
            response
        }
        Err(err) => {
            tracing::warn!("[Banguard] [ForwardErr] - {} - {}", &incoming.path, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Gateway Forwarded Error".to_string()).into_response()
        }
    }
}

pub fn build_app_router(state: BanguardState) -> Router {
    Router::new()
        .route(URI_HEALTHZ, axum::routing::get(|| async { "Banguard is Running!" }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(state, banguard_middleware)),
        )
}

pub async fn start() -> Result<(), Box<dyn std::error::Error>> {
    // http://www.network-science.de/ascii/#larry3d,graffiti,basic,drpepper,rounded,roman
    let ascii_name = r#"
     ____                                                         __
    /\  _`\                                                      /\ \
    \ \ \L\ \     __      ___      __   __  __     __     _ __   \_\ \
     \ \  _ <'  /'__`\  /' _ `\  /'_ `\/\ \/\ \  /'__`\  /\`'__\ /'_` \
      \ \ \L\ \/\ \L\.\_/\ \/\ \/\ \L\ \ \ \_\ \/\ \L\.\_\ \ \/ /\ \L\ \
       \ \____/\ \__/.\_\ \_\ \_\ \____ \ \____/\ \__/.\_\\ \_\ \ \___,_\
        \/___/  \/__/\/_/\/_/\/_/\/___L\ \/___/  \/__/\/_/ \/_/  \/__,_ /
                                   /\____/
                                   \_/__/
"#;
    eprintln!("");
    eprintln!("{}", ascii_name);
    eprintln!("                Program Version: {:?}", GIT_VERSION);
    eprintln!("                Package Version: {:?}", env!("CARGO_PKG_VERSION").to_string());
    eprintln!("                Git Commit Hash: {:?}", GIT_COMMIT_HASH);
    eprintln!("                 Git Build Date: {:?}", GIT_BUILD_DATE);

    let config = config::get_config();
    let _log_guards = common_telemetry::init_global_logging(&config.service_name, &config.logging);
    common_telemetry::set_panic_hook();

    let state = BanguardState::new().await;
    let registry = state.registry.clone();
    let app_routes = build_app_router(state);

    let bind_addr = config.server.host.clone() + ":" + &config.server.port.to_string();
    tracing::info!("Starting Banguard web server on {}", bind_addr);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => {
            tracing::info!("Banguard web server is ready on {}", bind_addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            panic!("Failed to bind to {}: {}", bind_addr, e);
        }
    };

    match axum::serve(listener, app_routes.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        Ok(_) => {
            tracing::info!("Banguard web server shut down gracefully");
        }
        Err(e) => {
            tracing::error!("Error running web server: {}", e);
            panic!("Error starting API server: {}", e);
        }
    }

    // Stop the ban registry watch loop after the listener has drained.
    registry.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install shutdown signal handler: {}", e);
    }
}
