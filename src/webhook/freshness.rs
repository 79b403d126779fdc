//! Timestamp extraction and freshness window.

use std::time::Duration;

use serde_json::Value;

use crate::webhook::request::{Provider, WebhookRequest};
use crate::webhook::signature::{StripeSignature, SQUARE_TIMESTAMP_HEADER, STRIPE_SIGNATURE_HEADER};

/// True when `|now - timestamp| <= window`. Both values are unix seconds.
pub fn is_fresh(timestamp: i64, now: i64, window: Duration) -> bool {
    now.abs_diff(timestamp) <= window.as_secs()
}

/// The provider's send timestamp for this delivery, in unix seconds.
pub fn extract_timestamp(request: &WebhookRequest) -> Option<i64> {
    match request.provider() {
        Provider::Square => request
            .header(SQUARE_TIMESTAMP_HEADER)
            .and_then(|t| t.trim().parse().ok()),
        Provider::Stripe => request
            .header(STRIPE_SIGNATURE_HEADER)
            .and_then(StripeSignature::parse)
            .and_then(|sig| sig.timestamp.parse().ok()),
        Provider::WhatsApp => whatsapp_timestamp(request.raw_body()),
    }
}

/// Top-level `timestamp`, else the first message or status timestamp.
fn whatsapp_timestamp(body: &[u8]) -> Option<i64> {
    let value: Value = serde_json::from_slice(body).ok()?;

    if let Some(ts) = value.get("timestamp").and_then(as_unix) {
        return Some(ts);
    }

    value
        .get("entry")?
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("changes").and_then(Value::as_array))
        .flatten()
        .filter_map(|change| change.get("value"))
        .flat_map(|v| {
            ["messages", "statuses"]
                .into_iter()
                .filter_map(move |field| v.get(field).and_then(Value::as_array))
                .flatten()
        })
        .find_map(|item| item.get("timestamp").and_then(as_unix))
}

// WhatsApp sends timestamps as decimal strings.
fn as_unix(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
