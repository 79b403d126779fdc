//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the webhook gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Inbound and outbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Replay guard window and capacity.
    pub replay: ReplayConfig,

    /// Timestamp freshness window.
    pub freshness: FreshnessConfig,

    /// Distributed lock defaults.
    pub locks: LockConfig,

    /// Backing store for replay set and locks.
    pub store: StoreConfig,

    /// Per-provider signing secrets.
    pub providers: ProvidersConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,

    pub admin: AdminConfig,

    pub maintenance: MaintenanceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted webhook body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Token bucket settings for one limiter.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct BucketConfig {
    /// Bucket capacity (maximum burst).
    pub capacity: u32,

    /// Time in which a full bucket's worth of tokens is refilled, in milliseconds.
    pub interval_ms: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable inbound per-IP limiting.
    pub enabled: bool,

    /// Inbound webhooks per source IP.
    pub inbound: BucketConfig,

    /// Outbound provider API calls (booking flow).
    pub outbound: BucketConfig,

    /// Buckets untouched for this long are dropped by maintenance.
    pub idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inbound: BucketConfig {
                capacity: 100,
                interval_ms: 60_000,
            },
            outbound: BucketConfig {
                capacity: 10,
                interval_ms: 1_000,
            },
            idle_secs: 600,
        }
    }
}

/// Replay guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// How long a fingerprint is remembered, in seconds.
    pub window_secs: u64,

    /// Maximum remembered fingerprints (in-memory store).
    pub max_entries: usize,

    /// Accept webhooks when the replay store is unreachable.
    pub fail_open: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            max_entries: 10_000,
            fail_open: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Maximum allowed skew between request timestamp and now, in seconds.
    pub window_secs: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self { window_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// TTL applied to booking locks, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { default_ttl_secs: 30 }
    }
}

/// Which store backs the replay set and locks.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL (required when backend = "redis").
    pub redis_url: Option<String>,

    /// Prefix applied to every key written to the shared store.
    pub key_prefix: Option<String>,
}

/// Signing secret for one provider.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProviderSecretConfig {
    /// Inline secret. Prefer `secret_env` outside development.
    pub secret: Option<String>,

    /// Name of the environment variable holding the secret.
    pub secret_env: Option<String>,

    /// Public notification URL (Square signs `url + body`).
    pub notification_url: Option<String>,
}

impl std::fmt::Debug for ProviderSecretConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSecretConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secret_env", &self.secret_env)
            .field("notification_url", &self.notification_url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub whatsapp: Option<ProviderSecretConfig>,
    pub square: Option<ProviderSecretConfig>,
    pub stripe: Option<ProviderSecretConfig>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Take the client IP from X-Forwarded-For / X-Real-IP.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Validation rejects it when enabled.
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between purge passes, in seconds.
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_limits() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit.inbound.capacity, 100);
        assert_eq!(config.rate_limit.inbound.interval_ms, 60_000);
        assert_eq!(config.rate_limit.outbound.capacity, 10);
        assert_eq!(config.freshness.window_secs, 300);
        assert_eq!(config.replay.window_secs, 3600);
        assert!(!config.replay.fail_open);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [providers.square]
            secret = "sq-key"
            notification_url = "https://salon.example/webhooks/square"

            [store]
            backend = "redis"
            redis_url = "redis://127.0.0.1/"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.max_body_size, 1024 * 1024);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        let square = config.providers.square.unwrap();
        assert_eq!(square.secret.as_deref(), Some("sq-key"));
        assert!(config.providers.whatsapp.is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let secret = ProviderSecretConfig {
            secret: Some("hunter2".into()),
            ..Default::default()
        };
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
