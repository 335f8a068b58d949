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

use std::{collections::HashMap, env, io::IsTerminal, sync::Once};

use bon::Builder;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::resource;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::{self, LevelFilter},
    fmt::MakeWriter,
    layer::SubscriberExt,
    registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// Lets a config file write `log_format = ""` to mean "use the default".
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default OTLP endpoint for HTTP/protobuf trace export.
pub const DEFAULT_OTLP_HTTP_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// Fallback filter when neither `level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly-rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Filter string such as `"info"` or `"info,mole_proxy=debug"`. Falls
    /// back to `RUST_LOG`, then `"info"`.
    pub level: Option<String>,

    /// Output format for both stdout and file layers.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated files kept per log stream (30 days of
    /// hourly files by default).
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to write to stdout as well as to files.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,

    /// Export spans to an OTLP collector over HTTP.
    #[default = false]
    #[builder(default)]
    pub enable_otlp_tracing: bool,

    /// Collector endpoint. URLs without a scheme get `http://` prepended.
    pub otlp_endpoint: Option<String>,

    /// Extra headers sent with every export, e.g. an auth token.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    #[default(_code = "HashMap::new()")]
    #[builder(default)]
    pub otlp_headers: HashMap<String, String>,

    /// Fraction of root traces to sample, `None` samples everything.
    pub sample_ratio: Option<f64>,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with the current span and span list.
    Json,
    /// Human-readable lines.
    #[default]
    Text,
}

/// Initialize the global subscriber.
///
/// Returns the `WorkerGuard`s of the non-blocking writers; they must be held
/// for as long as logs should be flushed. Only the first call has any
/// effect.
///
/// # Panics
///
/// Panics when the log directory cannot be opened, the filter string does
/// not parse, or the OTLP exporter cannot be built. A service that cannot
/// log is not started.
#[must_use]
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let stdout_layer = opts.append_stdout.then(|| {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            fmt_layer(writer, opts.log_format, std::io::stdout().is_terminal())
        });

        let file_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(app_name, opts));
            guards.push(guard);
            fmt_layer(writer, opts.log_format, false)
        });

        let err_file_layer = (!opts.dir.is_empty()).then(|| {
            let appender = rolling_appender(&format!("{app_name}-err"), opts);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            fmt_layer(writer, opts.log_format, false)
                .with_filter(LevelFilter::ERROR)
                .boxed()
        });

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .with(err_file_layer);

        if opts.enable_otlp_tracing {
            global::set_text_map_propagator(TraceContextPropagator::new());

            let root = opts
                .sample_ratio
                .map_or(Sampler::AlwaysOn, Sampler::TraceIdRatioBased);
            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(build_otlp_exporter(opts))
                .with_sampler(Sampler::ParentBased(Box::new(root)))
                .with_resource(
                    Resource::builder_empty()
                        .with_attributes([
                            KeyValue::new(resource::SERVICE_NAME, app_name.to_string()),
                            KeyValue::new(resource::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                            KeyValue::new(resource::PROCESS_PID, std::process::id().to_string()),
                        ])
                        .build(),
                )
                .build();
            let tracer = provider.tracer("mole");
            global::set_tracer_provider(provider);

            tracing::subscriber::set_global_default(
                subscriber.with(tracing_opentelemetry::layer().with_tracer(tracer)),
            )
            .expect("error setting global tracing subscriber");
        } else {
            tracing::subscriber::set_global_default(subscriber)
                .expect("error setting global tracing subscriber");
        }
    });

    guards
}

fn fmt_layer<S, W>(writer: W, format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::Layer::new()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn rolling_appender(prefix: &str, opts: &LoggingOptions) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {}",
                &opts.dir, e
            )
        })
}

fn otlp_endpoint(opts: &LoggingOptions) -> String {
    opts.otlp_endpoint.as_ref().map_or_else(
        || DEFAULT_OTLP_HTTP_ENDPOINT.to_string(),
        |e| {
            if e.starts_with("http") {
                e.clone()
            } else {
                format!("http://{e}")
            }
        },
    )
}

fn build_otlp_exporter(opts: &LoggingOptions) -> SpanExporter {
    SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint(opts))
        .with_protocol(Protocol::HttpBinary)
        .with_headers(opts.otlp_headers.clone())
        .build()
        .expect("Failed to create OTLP HTTP exporter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_to_stdout_only() {
        let opts = LoggingOptions::default();
        assert!(opts.dir.is_empty());
        assert!(opts.append_stdout);
        assert!(!opts.enable_otlp_tracing);
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.max_log_files, 720);
    }

    #[test]
    fn empty_log_format_falls_back_to_default() {
        let opts: LoggingOptions = toml::from_str("log_format = \"\"\nlevel = \"debug\"").unwrap();
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.level.as_deref(), Some("debug"));

        let opts: LoggingOptions = toml::from_str("log_format = \"json\"").unwrap();
        assert_eq!(opts.log_format, LogFormat::Json);
    }

    #[test]
    fn otlp_endpoint_gets_a_scheme() {
        let mut opts = LoggingOptions::default();
        assert_eq!(otlp_endpoint(&opts), DEFAULT_OTLP_HTTP_ENDPOINT);

        opts.otlp_endpoint = Some("collector:4318/v1/traces".to_string());
        assert_eq!(otlp_endpoint(&opts), "http://collector:4318/v1/traces");

        opts.otlp_endpoint = Some("https://collector/v1/traces".to_string());
        assert_eq!(otlp_endpoint(&opts), "https://collector/v1/traces");
    }

    #[test]
    fn builder_fills_defaults() {
        let opts = LoggingOptions::builder().level("warn".to_string()).build();
        assert_eq!(opts.level.as_deref(), Some("warn"));
        assert_eq!(opts.max_log_files, 720);
        assert!(opts.append_stdout);
    }
}
