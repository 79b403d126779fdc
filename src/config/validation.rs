//! Configuration validation.
//!
//! Semantic checks run after serde has parsed the file. All errors are
//! collected so an operator sees every problem in one pass.

use url::Url;

use crate::config::schema::{
    BucketConfig, GatewayConfig, ProviderSecretConfig, StoreBackend, PLACEHOLDER_API_KEY,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("provider {provider} has no secret configured")]
    MissingSecret { provider: &'static str },

    #[error("provider square requires an absolute notification_url")]
    InvalidNotificationUrl,

    #[error("admin api is enabled with the placeholder api_key")]
    PlaceholderApiKey,

    #[error("rate_limit.idle_secs must cover at least one inbound refill interval")]
    IdleShorterThanInterval,

    #[error("store backend is redis but redis_url is not set")]
    MissingRedisUrl,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key == PLACEHOLDER_API_KEY || config.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderApiKey);
        }
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    positive(&mut errors, "listener.max_body_size", config.listener.max_body_size as u64);
    positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_bucket(&mut errors, "rate_limit.inbound", &config.rate_limit.inbound);
    check_bucket(&mut errors, "rate_limit.outbound", &config.rate_limit.outbound);
    positive(&mut errors, "rate_limit.idle_secs", config.rate_limit.idle_secs);
    if config.rate_limit.idle_secs > 0
        && config.rate_limit.idle_secs.saturating_mul(1000) < config.rate_limit.inbound.interval_ms
    {
        errors.push(ValidationError::IdleShorterThanInterval);
    }
    positive(&mut errors, "replay.window_secs", config.replay.window_secs);
    positive(&mut errors, "replay.max_entries", config.replay.max_entries as u64);
    positive(&mut errors, "freshness.window_secs", config.freshness.window_secs);
    positive(&mut errors, "locks.default_ttl_secs", config.locks.default_ttl_secs);
    positive(&mut errors, "maintenance.interval_secs", config.maintenance.interval_secs);

    if config.store.backend == StoreBackend::Redis
        && config.store.redis_url.as_deref().map_or(true, str::is_empty)
    {
        errors.push(ValidationError::MissingRedisUrl);
    }

    check_provider(&mut errors, "whatsapp", config.providers.whatsapp.as_ref());
    check_provider(&mut errors, "stripe", config.providers.stripe.as_ref());
    if let Some(square) = config.providers.square.as_ref() {
        check_provider(&mut errors, "square", Some(square));
        let url_ok = square
            .notification_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .is_some_and(|u| matches!(u.scheme(), "http" | "https"));
        if !url_ok {
            errors.push(ValidationError::InvalidNotificationUrl);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::MustBePositive { field });
    }
}

fn check_bucket(errors: &mut Vec<ValidationError>, field: &'static str, bucket: &BucketConfig) {
    if bucket.capacity == 0 || bucket.interval_ms == 0 {
        errors.push(ValidationError::MustBePositive { field });
    }
}

// Runs after env resolution, so only the inline secret matters here.
fn check_provider(
    errors: &mut Vec<ValidationError>,
    provider: &'static str,
    secret: Option<&ProviderSecretConfig>,
) {
    if let Some(secret) = secret {
        if secret.secret.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingSecret { provider });
        }
    }
}
