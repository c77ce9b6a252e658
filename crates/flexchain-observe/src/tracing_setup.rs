//! Tracing subscriber initialization: human or JSON logs on stderr, with
//! optional OpenTelemetry span export.
//!
//! # Usage
//!
//! ```no_run
//! use flexchain_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing};
//!
//! // `-v` on a terminal
//! init_tracing(&TracingOptions::from_verbosity(1, false)).unwrap();
//!
//! // JSON lines for log shippers, spans exported through OTel
//! let options = TracingOptions {
//!     format: LogFormat::Json,
//!     otel: true,
//!     ..TracingOptions::default()
//! };
//! init_tracing(&options).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Tracer name reported on exported spans.
pub const TRACER_NAME: &str = "flexchain";

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Shape of log lines on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, with the current span's fields.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    /// Directives used when `RUST_LOG` is unset or unparsable.
    pub default_filter: String,
    pub format: LogFormat,
    /// Bridge spans (`chain_run` and friends) to a stdout OTel exporter.
    pub otel: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            default_filter: "warn".to_string(),
            format: LogFormat::Text,
            otel: false,
        }
    }
}

impl TracingOptions {
    /// Options for a `-v` count and `--quiet` flag.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        Self {
            default_filter: default_filter(verbose, quiet).to_string(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_otel(mut self, otel: bool) -> Self {
        self.otel = otel;
        self
    }
}

/// Filter directives for a verbosity level. `quiet` only applies at level 0.
pub fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,flexchain_core=debug",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = build_filter(&options.default_filter);

    let text_layer = (options.format == LogFormat::Text).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
    });
    let json_layer = (options.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
    });

    let otel_layer = if options.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer(TRACER_NAME);

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// `RUST_LOG` wins over the supplied default.
pub fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Flush pending spans and shut down the tracer provider.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(default_filter(0, false), "warn");
        assert_eq!(default_filter(0, true), "error");
        assert_eq!(default_filter(1, true), "info,flexchain_core=debug");
        assert_eq!(default_filter(3, false), "trace");
    }

    #[test]
    fn options_builders() {
        let options = TracingOptions::from_verbosity(1, false)
            .with_format(LogFormat::Json)
            .with_otel(true);
        assert_eq!(options.default_filter, "info,flexchain_core=debug");
        assert_eq!(options.format, LogFormat::Json);
        assert!(options.otel);
        assert_eq!(TracingOptions::default().format, LogFormat::Text);
    }

    #[test]
    fn json_subscriber_installs_once() {
        let options = TracingOptions::default().with_format(LogFormat::Json);
        init_tracing(&options).unwrap();
        tracing::warn!(chain_id = "c", "json log line");
        assert!(init_tracing(&TracingOptions::default()).is_err());
    }
}
