use anyhow::Context;
use inference::{BackendOptions, ExecutionProvider, ModelPaths};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

pub use common::Environment;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_ARCHITECTURE_PATH: &str = "models/config.json";
const DEFAULT_WEIGHTS_PATH: &str = "models/model.onnx";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub model_paths: ModelPaths,
    pub max_upload_bytes: usize,
    pub backend: BackendOptions,
    pub otel_endpoint: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let environment = lookup("ENVIRONMENT")
            .map(|value| Environment::parse(&value))
            .unwrap_or_default();

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("BIND_ADDR {} is not a socket address", bind_addr))?;

        let model_paths = ModelPaths::new(
            lookup("MODEL_ARCHITECTURE_PATH")
                .unwrap_or_else(|| DEFAULT_ARCHITECTURE_PATH.to_string()),
            lookup("MODEL_WEIGHTS_PATH").unwrap_or_else(|| DEFAULT_WEIGHTS_PATH.to_string()),
        );

        let max_upload_bytes = parsed_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES);

        let defaults = BackendOptions::default();
        let provider = match lookup("EXECUTION_PROVIDER") {
            Some(value) => value
                .parse::<ExecutionProvider>()
                .map_err(anyhow::Error::msg)?,
            None => defaults.provider,
        };
        let intra_threads = parsed_or(&lookup, "INTRA_THREADS", defaults.intra_threads);

        let otel_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|s| !s.trim().is_empty());

        Ok(Self {
            environment,
            bind_addr,
            model_paths,
            max_upload_bytes,
            backend: BackendOptions {
                provider,
                intra_threads,
            },
            otel_endpoint,
        })
    }
}

/// Unparseable values fall back to the default.
fn parsed_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
