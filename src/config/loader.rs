//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{GatewayConfig, ProviderSecretConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var} for provider {provider} is not set")]
    MissingEnv { provider: &'static str, var: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, resolve and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration text. Split out so reload and tests share one path.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = toml::from_str(content)?;
    resolve_secrets(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Replace every `secret_env` reference with the variable's value.
pub fn resolve_secrets<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let providers = &mut config.providers;
    for (name, slot) in [
        ("whatsapp", &mut providers.whatsapp),
        ("square", &mut providers.square),
        ("stripe", &mut providers.stripe),
    ] {
        if let Some(secret) = slot.as_mut() {
            resolve_one(name, secret, &lookup)?;
        }
    }
    Ok(())
}

fn resolve_one<F>(
    provider: &'static str,
    secret: &mut ProviderSecretConfig,
    lookup: &F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(var) = secret.secret_env.as_deref() else {
        return Ok(());
    };
    match lookup(var) {
        Some(value) => {
            secret.secret = Some(value);
            Ok(())
        }
        None => Err(ConfigError::MissingEnv {
            provider,
            var: var.to_string(),
        }),
    }
}
