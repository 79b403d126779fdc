//! Payload shape validation per provider.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::webhook::request::Provider;

/// A validated provider payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderEvent {
    WhatsApp {
        entries: Vec<Value>,
    },
    Square {
        event_id: String,
        event_type: String,
        merchant_id: Option<String>,
        data: Value,
    },
    Stripe {
        id: String,
        event_type: String,
        data: Value,
    },
}

impl ProviderEvent {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderEvent::WhatsApp { .. } => Provider::WhatsApp,
            ProviderEvent::Square { .. } => Provider::Square,
            ProviderEvent::Stripe { .. } => Provider::Stripe,
        }
    }

    /// Short label for logs.
    pub fn summary(&self) -> String {
        match self {
            ProviderEvent::WhatsApp { entries } => format!("entries={}", entries.len()),
            ProviderEvent::Square { event_id, event_type, .. } => format!("{event_type} {event_id}"),
            ProviderEvent::Stripe { id, event_type, .. } => format!("{event_type} {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("body is not valid JSON")]
    NotJson,

    #[error("body is not a JSON object")]
    NotObject,

    #[error("field `{0}` is missing or has the wrong type")]
    InvalidField(&'static str),
}

/// Check the body has the shape the provider is expected to send.
pub fn validate_payload(provider: Provider, body: &[u8]) -> Result<ProviderEvent, PayloadError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| PayloadError::NotJson)?;
    let Value::Object(mut obj) = value else {
        return Err(PayloadError::NotObject);
    };

    match provider {
        Provider::WhatsApp => match obj.remove("entry") {
            Some(Value::Array(entries)) => Ok(ProviderEvent::WhatsApp { entries }),
            _ => Err(PayloadError::InvalidField("entry")),
        },
        Provider::Square => Ok(ProviderEvent::Square {
            event_type: required_str(&obj, "type")?,
            event_id: required_str(&obj, "event_id")?,
            merchant_id: obj.get("merchant_id").and_then(Value::as_str).map(str::to_string),
            data: required_object(&mut obj, "data")?,
        }),
        Provider::Stripe => Ok(ProviderEvent::Stripe {
            event_type: required_str(&obj, "type")?,
            id: required_str(&obj, "id")?,
            data: required_object(&mut obj, "data")?,
        }),
    }
}

fn required_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, PayloadError> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(PayloadError::InvalidField(field))
}

fn required_object(obj: &mut Map<String, Value>, field: &'static str) -> Result<Value, PayloadError> {
    match obj.remove(field) {
        Some(v @ Value::Object(_)) => Ok(v),
        _ => Err(PayloadError::InvalidField(field)),
    }
}
