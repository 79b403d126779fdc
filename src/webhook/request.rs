//! Inbound webhook request model.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Webhook providers the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    WhatsApp,
    Square,
    Stripe,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::WhatsApp, Provider::Square, Provider::Stripe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::WhatsApp => "whatsapp",
            Provider::Square => "square",
            Provider::Stripe => "stripe",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown webhook provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "whatsapp" => Ok(Provider::WhatsApp),
            "square" => Ok(Provider::Square),
            "stripe" => Ok(Provider::Stripe),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// A webhook delivery as received. Immutable once built.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    provider: Provider,
    raw_body: Bytes,
    headers: HeaderMap,
    received_at: SystemTime,
    client_ip: String,
}

impl WebhookRequest {
    /// Build a request stamped with the current time.
    pub fn new(
        provider: Provider,
        raw_body: impl Into<Bytes>,
        headers: HeaderMap,
        client_ip: impl Into<String>,
    ) -> Self {
        Self::received_at(provider, raw_body, headers, client_ip, SystemTime::now())
    }

    /// Build a request with an explicit receive time.
    pub fn received_at(
        provider: Provider,
        raw_body: impl Into<Bytes>,
        headers: HeaderMap,
        client_ip: impl Into<String>,
        received_at: SystemTime,
    ) -> Self {
        Self {
            provider,
            raw_body: raw_body.into(),
            headers,
            received_at,
            client_ip: client_ip.into(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and valid ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn received_at_time(&self) -> SystemTime {
        self.received_at
    }

    /// Receive time as unix seconds.
    pub fn received_at_unix(&self) -> i64 {
        unix_secs(self.received_at)
    }
}

/// Seconds since the epoch; times before the epoch map to negative values.
pub fn unix_secs(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_provider_parse() {
        assert_eq!("whatsapp".parse::<Provider>().unwrap(), Provider::WhatsApp);
        assert_eq!("Square".parse::<Provider>().unwrap(), Provider::Square);
        assert_eq!("stripe".parse::<Provider>().unwrap(), Provider::Stripe);
        assert!("paypal".parse::<Provider>().is_err());
    }

    #[test]
    fn test_provider_serde_names() {
        let json = serde_json::to_string(&Provider::WhatsApp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_request_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Square-Request-Timestamp", "1700000000".parse().unwrap());
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_010);

        let req = WebhookRequest::received_at(Provider::Square, "{}", headers, "10.0.0.1", at);
        assert_eq!(req.provider(), Provider::Square);
        assert_eq!(req.header("x-square-request-timestamp"), Some("1700000000"));
        assert_eq!(req.raw_body().as_ref(), b"{}");
        assert_eq!(req.client_ip(), "10.0.0.1");
        assert_eq!(req.received_at_unix(), 1_700_000_010);
    }
}
