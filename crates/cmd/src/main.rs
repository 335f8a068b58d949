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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mole_app::AppConfig;
use mole_proxy::{CarrierKind, MemoryLimit};
use snafu::{ResultExt, Whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "mole",
about = "Fetch a remote file through this server, streamed or stored",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Server(ServerArgs),
    Version(VersionArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the mole server.
Examples:

mole server
mole server --config mole.toml
mole server --bind 0.0.0.0:8080 --storage-dir /srv/mole --carrier session

")]
struct ServerArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config:       Option<PathBuf>,
    /// Address to listen on, overrides `http.bind_address`
    #[arg(long)]
    bind:         Option<String>,
    /// Where file-mode downloads are stored, overrides `proxy.storage_dir`
    #[arg(long)]
    storage_dir:  Option<PathBuf>,
    /// `query` or `session`, overrides `proxy.carrier`
    #[arg(long)]
    carrier:      Option<CarrierKind>,
    /// Memory ceiling for streaming (`128MiB`, `-1` for unlimited)
    #[arg(long, allow_hyphen_values = true)]
    memory_limit: Option<MemoryLimit>,
}

impl ServerArgs {
    fn config(self) -> Result<AppConfig, Whatever> {
        let mut config = AppConfig::load(self.config.as_deref())
            .whatever_context("Failed to load configuration")?;
        if let Some(bind) = self.bind {
            config.http.bind_address = bind;
        }
        if let Some(storage_dir) = self.storage_dir {
            config.proxy.storage_dir = storage_dir;
        }
        if let Some(carrier) = self.carrier {
            config.proxy.carrier = carrier;
        }
        if let Some(memory_limit) = self.memory_limit {
            config.proxy.memory_limit = memory_limit;
        }
        Ok(config)
    }

    async fn run(self) -> Result<(), Whatever> { self.config()?.open().run().await }
}

#[derive(Debug, Clone, Args)]
struct VersionArgs {}

impl VersionArgs {
    #[allow(clippy::unused_self)]
    fn run(&self) {
        println!("{}", build_info::report());
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    match cli.commands {
        Commands::Server(args) => args.run().await,
        Commands::Version(args) => {
            args.run();
            Ok(())
        }
    }
}
