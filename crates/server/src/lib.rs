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

pub mod http;
pub mod routes;

use snafu::{ResultExt, Snafu};
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Network { source: NetworkError },

    #[snafu(display("Server task ended before it started serving"))]
    StartSignal {
        source: tokio::sync::oneshot::error::RecvError,
    },

    #[snafu(display("Server task failed"))]
    Join { source: tokio::task::JoinError },
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum NetworkError {
    #[snafu(display("Failed to bind {addr}"))]
    BindError {
        addr:   String,
        #[snafu(source)]
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse address {addr}"))]
    ParseAddressError {
        addr:   String,
        #[snafu(source)]
        source: std::net::AddrParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle for a running HTTP server.
///
/// Shutdown is cooperative: [`shutdown`](Self::shutdown) cancels the token,
/// in-flight requests finish, then the task ends.
pub struct ServiceHandler {
    join_handle:        JoinHandle<()>,
    cancellation_token: CancellationToken,
    started_rx:         Option<Receiver<()>>,
    local_addr:         std::net::SocketAddr,
}

impl ServiceHandler {
    /// Waits until the server accepts connections. Returns immediately on
    /// later calls.
    pub async fn wait_for_start(&mut self) -> Result<()> {
        if let Some(started_rx) = self.started_rx.take() {
            started_rx.await.context(StartSignalSnafu)?;
        }
        Ok(())
    }

    /// Waits for the server task to end. Call after [`shutdown`](Self::shutdown).
    pub async fn wait_for_stop(self) -> Result<()> { self.join_handle.await.context(JoinSnafu) }

    pub fn shutdown(&self) { self.cancellation_token.cancel(); }

    /// The address actually bound, useful when the configured port is `0`.
    pub const fn local_addr(&self) -> std::net::SocketAddr { self.local_addr }
}
