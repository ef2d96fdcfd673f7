//! Typed configuration, populated once from the environment at startup and
//! passed by `Arc` to every component. No process-wide mutable config
//! globals (§9 re-architecture note on "ad-hoc global connection pools").

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Upstream RPC (C1)
    pub upstream_rpc_key: String,
    pub max_concurrent_upstream: usize,
    pub upstream_rps: u32,
    pub upstream_timeout: Duration,

    // Price Oracle (C5)
    pub external_price_key: Option<String>,
    pub price_helius_only: bool,
    pub price_sol_spot_only: bool,
    pub external_provider_enabled: bool,
    pub stale_ttl: Duration,
    pub sol_spot_ttl: Duration,

    // Cache (C8)
    pub position_cache_ttl: Duration,
    pub position_cache_max: usize,
    pub distributed_cache_url: Option<String>,

    // Pipeline (C9)
    pub request_timeout: Duration,

    // Streaming transport (C11)
    pub sse_keepalive: Duration,
    pub sse_max_stream: Duration,

    // HTTP surface (C10)
    pub api_key_required: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub max_concurrent_streams_per_key: u32,

    // Feature flags (§4.10, §9 "BETA" positions caveat)
    pub trades_endpoint_enabled: bool,
    pub positions_endpoint_enabled: bool,
    pub stream_endpoint_enabled: bool,

    // Upstream RPC endpoint (C1)
    pub upstream_rpc_endpoint: String,
    pub max_signature_pages: Option<u32>,

    // Ambient stack (§10.3)
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub metrics_bind_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    /// Load from environment, applying the defaults enumerated in §6.1.
    pub fn from_env() -> Result<Self, String> {
        let cfg = Self {
            upstream_rpc_key: require_env("UPSTREAM_RPC_KEY")?,
            max_concurrent_upstream: env_parse("MAX_CONCURRENT_UPSTREAM", 40)?,
            upstream_rps: env_parse("UPSTREAM_RPS", 50)?,
            upstream_timeout: Duration::from_secs(env_parse("UPSTREAM_TIMEOUT_SEC", 20)?),

            external_price_key: env::var("EXTERNAL_PRICE_KEY").ok(),
            price_helius_only: env_bool("PRICE_HELIUS_ONLY", false),
            price_sol_spot_only: env_bool("PRICE_SOL_SPOT_ONLY", true),
            external_provider_enabled: env_bool("EXTERNAL_PROVIDER_ENABLED", true),
            stale_ttl: Duration::from_secs(env_parse("PRICE_STALE_TTL_SEC", 21600)?),
            sol_spot_ttl: Duration::from_secs(env_parse("SOL_SPOT_TTL_SEC", 30)?),

            position_cache_ttl: Duration::from_secs(env_parse("POSITION_CACHE_TTL_SEC", 900)?),
            position_cache_max: env_parse("POSITION_CACHE_MAX", 2000)?,
            distributed_cache_url: env::var("DISTRIBUTED_CACHE_URL").ok(),

            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT_SEC", 120)?),

            sse_keepalive: Duration::from_secs(env_parse("SSE_KEEPALIVE_SEC", 30)?),
            sse_max_stream: Duration::from_secs(env_parse("SSE_MAX_STREAM_SEC", 600)?),

            api_key_required: env_bool("API_KEY_REQUIRED", true),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", 50)?,
            max_concurrent_streams_per_key: env_parse("MAX_CONCURRENT_STREAMS_PER_KEY", 10)?,

            trades_endpoint_enabled: env_bool("TRADES_ENDPOINT_ENABLED", true),
            positions_endpoint_enabled: env_bool("POSITIONS_ENDPOINT_ENABLED", true),
            stream_endpoint_enabled: env_bool("STREAM_ENDPOINT_ENABLED", true),

            upstream_rpc_endpoint: env::var("UPSTREAM_RPC_ENDPOINT")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
            max_signature_pages: env::var("MAX_SIGNATURE_PAGES")
                .ok()
                .and_then(|v| v.parse().ok()),

            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("pretty") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
            metrics_bind_addr: env::var("METRICS_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), String> {
        if self.upstream_rpc_key.is_empty() {
            return Err("UPSTREAM_RPC_KEY is required".to_string());
        }
        if self.max_concurrent_upstream == 0 {
            return Err("MAX_CONCURRENT_UPSTREAM must be positive".to_string());
        }
        if self.upstream_rps == 0 {
            return Err("UPSTREAM_RPS must be positive".to_string());
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} is required"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| format!("{key} is not a valid value: {v}")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_defaults_when_unset() {
        env::remove_var("TEST_FLAG_UNLIKELY_TO_EXIST");
        assert!(!env_bool("TEST_FLAG_UNLIKELY_TO_EXIST", false));
        assert!(env_bool("TEST_FLAG_UNLIKELY_TO_EXIST", true));
    }

    #[test]
    fn env_parse_falls_back_to_default() {
        env::remove_var("TEST_NUM_UNLIKELY_TO_EXIST");
        let v: u32 = env_parse("TEST_NUM_UNLIKELY_TO_EXIST", 7).unwrap();
        assert_eq!(v, 7);
    }
}
