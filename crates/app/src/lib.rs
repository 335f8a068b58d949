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

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::Router;
use bon::Builder;
use mole_common_telemetry::{
    logging::{LoggingOptions, init_global_logging},
    panic_hook::set_panic_hook,
};
use mole_proxy::{ProxyConfig, RedirectController};
use mole_server::{
    ServiceHandler,
    http::{RestServerConfig, start_rest_server},
    routes::page_routes,
};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu, Whatever};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("Failed to read config file {}", path.display()))]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config file {}", path.display()))]
    Parse {
        path:   PathBuf,
        source: toml::de::Error,
    },
}

/// Everything `mole server` needs, usually read from a TOML file.
///
/// ```toml
/// enable_graceful_shutdown = true
///
/// [http]
/// bind_address = "0.0.0.0:3000"
///
/// [proxy]
/// storage_dir = "/srv/mole"
/// memory_limit = "256MiB"
/// carrier = "session"
///
/// [logging]
/// level = "info,mole_proxy=debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct AppConfig {
    #[builder(default)]
    pub http:                     RestServerConfig,
    #[builder(default)]
    pub proxy:                    ProxyConfig,
    #[builder(default)]
    pub logging:                  LoggingOptions,
    /// Stop on Ctrl+C / SIGTERM
    #[default = true]
    #[builder(default = true)]
    pub enable_graceful_shutdown: bool,
}

impl AppConfig {
    /// Reads `path`, or returns the defaults when there is none.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        toml::from_str(&raw).context(ParseSnafu { path })
    }

    #[must_use]
    pub fn open(self) -> App {
        App {
            config: self,
            ..Default::default()
        }
    }
}

/// The running service: logging, the storage directory and the HTTP server.
#[derive(SmartDefault)]
pub struct App {
    pub config:             AppConfig,
    #[default(_code = "Arc::new(AtomicBool::new(false))")]
    pub running:            Arc<AtomicBool>,
    #[default(_code = "CancellationToken::new()")]
    pub cancellation_token: CancellationToken,
}

/// Controls a started [`App`].
pub struct AppHandle {
    shutdown_tx:        Option<oneshot::Sender<()>>,
    running:            Arc<AtomicBool>,
    cancellation_token: CancellationToken,
    local_addr:         std::net::SocketAddr,
}

impl AppHandle {
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    /// Where the HTTP server listens.
    #[must_use]
    pub const fn local_addr(&self) -> std::net::SocketAddr { self.local_addr }

    pub async fn wait_for_shutdown(&self) { self.cancellation_token.cancelled().await; }
}

impl App {
    /// Prepares the storage directory and starts serving. Logging must
    /// already be initialised.
    pub async fn start(&self) -> Result<AppHandle, Whatever> {
        let proxy = &self.config.proxy;
        tokio::fs::create_dir_all(&proxy.storage_dir)
            .await
            .with_whatever_context(|_| {
                format!("Failed to create storage directory {}", proxy.storage_dir.display())
            })?;

        let controller = Arc::new(
            RedirectController::new(proxy.clone())
                .whatever_context("Failed to build the proxy controller")?,
        );
        info!(
            storage_dir = %proxy.storage_dir.display(),
            carrier = %proxy.carrier,
            memory_limit = %proxy.memory_limit,
            "Proxy ready"
        );

        let routes = move |router: Router| {
            router.merge(page_routes(Arc::clone(&controller)))
        };
        let mut http_handle = start_rest_server(self.config.http.clone(), vec![routes])
            .await
            .whatever_context("Failed to start REST server")?;
        http_handle
            .wait_for_start()
            .await
            .whatever_context("REST server did not start")?;
        let local_addr = http_handle.local_addr();
        info!(%local_addr, "mole started");

        self.running.store(true, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::clone(&self.running);
        let cancellation_token = self.cancellation_token.clone();
        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;

        tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                let _ = shutdown_rx.await;
            }
            stop_server(http_handle).await;
            running.store(false, Ordering::SeqCst);
            cancellation_token.cancel();
            info!("Application shutdown complete");
        });

        Ok(AppHandle {
            shutdown_tx: Some(shutdown_tx),
            running: Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
            local_addr,
        })
    }

    /// Initialises logging and the panic hook, then serves until shut down.
    pub async fn run(self) -> Result<(), Whatever> {
        let _guards = init_global_logging("mole", &self.config.logging);
        set_panic_hook();

        let handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

async fn stop_server(handle: ServiceHandler) {
    info!("Shutting down REST server");
    handle.shutdown();
    if let Err(e) = handle.wait_for_stop().await {
        warn!(error = %e, "REST server did not stop cleanly");
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        _ = shutdown_rx => { info!("Received shutdown signal"); },
    }
}
