// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::{
    Router, extract::DefaultBodyLimit, http::StatusCode, response::IntoResponse, routing::get,
};
use axum_tracing_opentelemetry::middleware::{OtelAxumLayer, OtelInResponseLayer};
use mole_base::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::{BindSnafu, ParseAddressSnafu, Result, ServiceHandler};

/// Form posts only carry a URL and an option.
pub const DEFAULT_MAX_HTTP_BODY_SIZE: ReadableSize = ReadableSize::mb(1);

/// Configuration options for the REST server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct RestServerConfig {
    /// The address to bind the REST server
    #[default = "127.0.0.1:3000"]
    #[builder(default = "127.0.0.1:3000".to_string(), into)]
    pub bind_address:  String,
    /// Maximum HTTP request body size
    #[default(_code = "DEFAULT_MAX_HTTP_BODY_SIZE")]
    #[builder(default = DEFAULT_MAX_HTTP_BODY_SIZE)]
    pub max_body_size: ReadableSize,
    /// Whether to enable CORS
    #[default = true]
    #[builder(default = true)]
    pub enable_cors:   bool,
}

/// Binds the configured address and serves `/health` plus whatever the
/// `route_handlers` add, in order.
///
/// Binding happens before this returns, so an unusable address is reported
/// here rather than from the background task.
pub async fn start_rest_server<F>(
    config: RestServerConfig,
    route_handlers: Vec<F>,
) -> Result<ServiceHandler>
where
    F: Fn(Router) -> Router + Send + Sync + 'static,
{
    let bind_addr = config
        .bind_address
        .parse::<std::net::SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;

    let mut router = Router::new().route("/health", get(health_check));
    for handler in &route_handlers {
        router = handler(router);
    }
    info!(handlers = route_handlers.len(), "Registered REST route handlers");

    #[allow(clippy::cast_possible_truncation)]
    let body_limit = config.max_body_size.as_bytes() as usize;
    router = router
        .layer(OtelInResponseLayer::default())
        .layer(OtelAxumLayer::default())
        .layer(DefaultBodyLimit::max(body_limit));
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context(BindSnafu {
            addr: config.bind_address.clone(),
        })?;
    let local_addr = listener.local_addr().context(BindSnafu {
        addr: config.bind_address.clone(),
    })?;

    let cancellation_token = CancellationToken::new();
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let shutdown = cancellation_token.clone();
    let join_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                info!("REST server (on {local_addr}) started");
                let _ = started_tx.send(());
                shutdown.cancelled().await;
                info!("REST server (on {local_addr}) received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => info!("REST server (on {local_addr}) stopped"),
            Err(e) => warn!(error = %e, "REST server (on {local_addr}) stopped with an error"),
        }
    });

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        local_addr,
    })
}

async fn health_check() -> impl IntoResponse { (StatusCode::OK, "OK") }

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn ephemeral(enable_cors: bool) -> RestServerConfig {
        RestServerConfig::builder()
            .bind_address("127.0.0.1:0")
            .enable_cors(enable_cors)
            .build()
    }

    #[tokio::test]
    async fn serves_health_until_shutdown() {
        init_test_logging();
        let handlers: Vec<fn(Router) -> Router> = vec![];
        let mut handler = start_rest_server(ephemeral(true), handlers).await.unwrap();
        handler.wait_for_start().await.unwrap();

        let response = reqwest::get(format!("http://{}/health", handler.local_addr()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "OK");

        handler.shutdown();
        handler.wait_for_stop().await.unwrap();
    }

    #[tokio::test]
    async fn registers_extra_routes_without_cors() {
        init_test_logging();
        fn hello_routes(router: Router) -> Router {
            router.route("/hello", get(|| async { "hello" }))
        }

        let mut handler = start_rest_server(ephemeral(false), vec![hello_routes])
            .await
            .unwrap();
        handler.wait_for_start().await.unwrap();

        let response = reqwest::get(format!("http://{}/hello", handler.local_addr()))
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "hello");

        handler.shutdown();
        handler.wait_for_stop().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_addresses() {
        let handlers: Vec<fn(Router) -> Router> = vec![];
        let config = RestServerConfig::builder().bind_address("nowhere").build();
        assert!(start_rest_server(config, handlers).await.is_err());
    }

    #[test]
    fn config_defaults_and_toml() {
        let config: RestServerConfig = toml::from_str(r#"bind_address = "0.0.0.0:8080""#).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.max_body_size, ReadableSize::mb(1));
        assert!(config.enable_cors);
    }
}
