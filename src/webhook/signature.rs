//! Provider-specific HMAC-SHA256 signature verification.
//!
//! | Provider | Header                          | Signed bytes          | Encoding |
//! |----------|---------------------------------|-----------------------|----------|
//! | WhatsApp | `x-hub-signature-256`           | body                  | hex      |
//! | Square   | `x-square-hmacsha256-signature` | notification url+body | base64   |
//! | Stripe   | `stripe-signature` (`t=`,`v1=`) | `t + "." + body`      | hex      |
//!
//! Every comparison runs on decoded bytes through `subtle`. Malformed or
//! missing headers verify as `false`; nothing here returns an error.

use std::fmt;

use axum::http::HeaderMap;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};

use crate::config::ProvidersConfig;
use crate::webhook::request::Provider;

type HmacSha256 = Hmac<Sha256>;

pub const WHATSAPP_SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const SQUARE_SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";
pub const SQUARE_TIMESTAMP_HEADER: &str = "x-square-request-timestamp";
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

const WHATSAPP_PREFIX: &str = "sha256=";

/// HMAC key for one provider, plus the notification URL Square signs over.
#[derive(Clone)]
pub struct SigningSecret {
    key: Vec<u8>,
    notification_url: Option<String>,
}

impl SigningSecret {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            notification_url: None,
        }
    }

    pub fn with_notification_url(key: impl Into<Vec<u8>>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            notification_url: Some(url.into()),
        }
    }

    pub fn notification_url(&self) -> Option<&str> {
        self.notification_url.as_deref()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("key", &"<redacted>")
            .field("notification_url", &self.notification_url)
            .finish()
    }
}

/// Signing secrets for every configured provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSecrets {
    pub whatsapp: Option<SigningSecret>,
    pub square: Option<SigningSecret>,
    pub stripe: Option<SigningSecret>,
}

impl ProviderSecrets {
    /// Build from already-resolved provider configuration.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let build = |cfg: &Option<crate::config::ProviderSecretConfig>| {
            cfg.as_ref().and_then(|c| {
                c.secret.as_ref().map(|key| SigningSecret {
                    key: key.as_bytes().to_vec(),
                    notification_url: c.notification_url.clone(),
                })
            })
        };
        Self {
            whatsapp: build(&config.whatsapp),
            square: build(&config.square),
            stripe: build(&config.stripe),
        }
    }

    pub fn get(&self, provider: Provider) -> Option<&SigningSecret> {
        match provider {
            Provider::WhatsApp => self.whatsapp.as_ref(),
            Provider::Square => self.square.as_ref(),
            Provider::Stripe => self.stripe.as_ref(),
        }
    }

    pub fn configured(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.get(*p).is_some())
            .collect()
    }
}

/// Verify a delivery's signature for the given provider.
pub fn verify(provider: Provider, raw_body: &[u8], headers: &HeaderMap, secret: &SigningSecret) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    match provider {
        Provider::WhatsApp => header(WHATSAPP_SIGNATURE_HEADER)
            .map(|sig| verify_whatsapp(secret, raw_body, sig))
            .unwrap_or(false),
        Provider::Square => header(SQUARE_SIGNATURE_HEADER)
            .map(|sig| verify_square(secret, raw_body, sig))
            .unwrap_or(false),
        Provider::Stripe => header(STRIPE_SIGNATURE_HEADER)
            .map(|sig| verify_stripe(secret, raw_body, sig))
            .unwrap_or(false),
    }
}

fn verify_whatsapp(secret: &SigningSecret, body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.trim().strip_prefix(WHATSAPP_PREFIX) else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_sig) else {
        return false;
    };
    let expected = compute(&secret.key, &[body]);
    constant_time_eq(&expected, &provided)
}

fn verify_square(secret: &SigningSecret, body: &[u8], header: &str) -> bool {
    let Some(url) = secret.notification_url.as_deref() else {
        tracing::warn!("Square secret has no notification_url; rejecting signature");
        return false;
    };
    let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(header.trim()) else {
        return false;
    };
    let expected = compute(&secret.key, &[url.as_bytes(), body]);
    constant_time_eq(&expected, &provided)
}

fn verify_stripe(secret: &SigningSecret, body: &[u8], header: &str) -> bool {
    let Some(parsed) = StripeSignature::parse(header) else {
        return false;
    };
    let expected = compute(&secret.key, &[parsed.timestamp.as_bytes(), b".".as_slice(), body]);

    // All candidates are checked; no early exit on the first match.
    let mut matched = Choice::from(0);
    for candidate in &parsed.signatures {
        match hex::decode(candidate) {
            Ok(bytes) => matched |= ct_eq_choice(&expected, &bytes),
            Err(_) => continue,
        }
    }
    matched.into()
}

/// Parsed `stripe-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignature<'a> {
    pub timestamp: &'a str,
    pub signatures: Vec<&'a str>,
}

impl<'a> StripeSignature<'a> {
    /// Parse `t=<ts>,v1=<sig>[,v1=<sig>...]`. Unknown schemes are ignored.
    /// Returns `None` without a `t=` element or without any `v1=` element.
    pub fn parse(header: &'a str) -> Option<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for element in header.split(',') {
            let Some((key, value)) = element.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.filter(|t| !t.is_empty())?;
        if signatures.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            signatures,
        })
    }
}

fn compute(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn ct_eq_choice(a: &[u8], b: &[u8]) -> Choice {
    // Length is public; content comparison is constant-time.
    if a.len() != b.len() {
        return Choice::from(0);
    }
    a.ct_eq(b)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ct_eq_choice(a, b).into()
}

/// `x-hub-signature-256` value for a WhatsApp body.
pub fn sign_whatsapp(key: &[u8], body: &[u8]) -> String {
    format!("{}{}", WHATSAPP_PREFIX, hex::encode(compute(key, &[body])))
}

/// `x-square-hmacsha256-signature` value for a Square body.
pub fn sign_square(key: &[u8], notification_url: &str, body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(compute(key, &[notification_url.as_bytes(), body]))
}

/// `stripe-signature` value for a Stripe body.
pub fn sign_stripe(key: &[u8], timestamp: i64, body: &[u8]) -> String {
    let ts = timestamp.to_string();
    let sig = hex::encode(compute(key, &[ts.as_bytes(), b".".as_slice(), body]));
    format!("t={},v1={}", ts, sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const URL: &str = "https://salon.example/webhooks/square";

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, value.parse().unwrap());
        map
    }

    /// Replace the character at `idx` with another one valid in both the hex
    /// and base64 alphabets, so the signature still decodes.
    fn mutate_char(s: &str, idx: usize) -> String {
        let mut bytes = s.as_bytes().to_vec();
        bytes[idx] = if bytes[idx] == b'0' { b'1' } else { b'0' };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_whatsapp_valid_and_mutated() {
        let secret = SigningSecret::new("wa-secret");
        let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let sig = sign_whatsapp(b"wa-secret", body);

        let h = headers(WHATSAPP_SIGNATURE_HEADER, &sig);
        assert!(verify(Provider::WhatsApp, body, &h, &secret));

        // Every single-byte mutation of the payload fails.
        for i in 0..body.len() {
            let mut mutated = body.to_vec();
            mutated[i] ^= 0x01;
            assert!(!verify(Provider::WhatsApp, &mutated, &h, &secret), "payload byte {i}");
        }

        // Every single-character mutation of the hex signature fails.
        for i in WHATSAPP_PREFIX.len()..sig.len() {
            let h = headers(WHATSAPP_SIGNATURE_HEADER, &mutate_char(&sig, i));
            assert!(!verify(Provider::WhatsApp, body, &h, &secret), "signature char {i}");
        }
    }

    #[test]
    fn test_whatsapp_malformed_headers() {
        let secret = SigningSecret::new("wa-secret");
        let body = b"{}";
        assert!(!verify(Provider::WhatsApp, body, &HeaderMap::new(), &secret));
        for bad in ["", "sha256=", "sha1=abcd", "sha256=not-hex", "sha256=abc"] {
            let h = headers(WHATSAPP_SIGNATURE_HEADER, bad);
            assert!(!verify(Provider::WhatsApp, body, &h, &secret), "{bad}");
        }
    }

    #[test]
    fn test_square_signs_url_and_body() {
        let secret = SigningSecret::with_notification_url("sq-key", URL);
        let body = br#"{"type":"booking.created","event_id":"e1","data":{}}"#;
        let sig = sign_square(b"sq-key", URL, body);

        let h = headers(SQUARE_SIGNATURE_HEADER, &sig);
        assert!(verify(Provider::Square, body, &h, &secret));

        // Same key, different URL: must fail.
        let other = SigningSecret::with_notification_url("sq-key", "https://evil.example/hook");
        assert!(!verify(Provider::Square, body, &h, &other));

        // No URL configured: fails closed.
        assert!(!verify(Provider::Square, body, &h, &SigningSecret::new("sq-key")));

        let mut mutated = body.to_vec();
        mutated[3] ^= 0x20;
        assert!(!verify(Provider::Square, &mutated, &h, &secret));

        let flipped = headers(SQUARE_SIGNATURE_HEADER, &mutate_char(&sig, 0));
        assert!(!verify(Provider::Square, body, &flipped, &secret));

        let garbage = headers(SQUARE_SIGNATURE_HEADER, "%%%not-base64%%%");
        assert!(!verify(Provider::Square, body, &garbage, &secret));
    }

    #[test]
    fn test_stripe_any_v1_matches() {
        let secret = SigningSecret::new("whsec_test");
        let body = br#"{"id":"evt_1","type":"charge.succeeded","data":{}}"#;
        let valid = sign_stripe(b"whsec_test", 1_700_000_000, body);
        let valid_sig = valid.split_once("v1=").unwrap().1;

        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), valid_sig);
        let h = headers(STRIPE_SIGNATURE_HEADER, &header);
        assert!(verify(Provider::Stripe, body, &h, &secret));

        // Timestamp is part of the signed payload.
        let header = format!("t=1700000001,v1={}", valid_sig);
        let h = headers(STRIPE_SIGNATURE_HEADER, &header);
        assert!(!verify(Provider::Stripe, body, &h, &secret));
    }

    #[test]
    fn test_stripe_header_parsing() {
        let parsed = StripeSignature::parse("t=123, v1=aa ,v0=bb,v1=cc").unwrap();
        assert_eq!(parsed.timestamp, "123");
        assert_eq!(parsed.signatures, vec!["aa", "cc"]);

        assert!(StripeSignature::parse("v1=aa").is_none());
        assert!(StripeSignature::parse("t=123").is_none());
        assert!(StripeSignature::parse("t=,v1=aa").is_none());
        assert!(StripeSignature::parse("garbage").is_none());
    }

    #[test]
    fn test_stripe_malformed_never_panics() {
        let secret = SigningSecret::new("whsec_test");
        for bad in ["", ",,,", "t=1,v1=zz", "t=1,v1=", "=,=", "t==1,v1==2"] {
            let h = headers(STRIPE_SIGNATURE_HEADER, bad);
            assert!(!verify(Provider::Stripe, b"{}", &h, &secret), "{bad}");
        }
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = SigningSecret::new("super-secret");
        assert!(!format!("{:?}", secret).contains("super-secret"));
    }

    #[test]
    fn test_provider_secrets_from_config() {
        let config: crate::config::GatewayConfig = toml::from_str(
            r#"
            [providers.whatsapp]
            secret = "wa"
            [providers.square]
            secret = "sq"
            notification_url = "https://salon.example/webhooks/square"
            "#,
        )
        .unwrap();
        let secrets = ProviderSecrets::from_config(&config.providers);
        assert_eq!(secrets.configured(), vec![Provider::WhatsApp, Provider::Square]);
        assert_eq!(
            secrets.get(Provider::Square).and_then(|s| s.notification_url()),
            Some("https://salon.example/webhooks/square")
        );
        assert!(secrets.get(Provider::Stripe).is_none());
    }

    /// Median verify time for a signature matching in all but the last byte
    /// must not stand apart from one that is wrong from the first byte.
    #[test]
    fn test_verify_timing_independent_of_matching_prefix() {
        let secret = SigningSecret::new("timing-secret");
        let body = vec![b'x'; 512];
        let valid = sign_whatsapp(b"timing-secret", &body);

        let near = headers(WHATSAPP_SIGNATURE_HEADER, &mutate_char(&valid, valid.len() - 1));
        let far = headers(
            WHATSAPP_SIGNATURE_HEADER,
            &format!("{}{}", WHATSAPP_PREFIX, "f0".repeat(32)),
        );

        const ROUNDS: usize = 2_000;
        let mut near_samples = Vec::with_capacity(ROUNDS);
        let mut far_samples = Vec::with_capacity(ROUNDS);

        // Interleave so drift affects both series equally.
        for _ in 0..ROUNDS {
            let start = Instant::now();
            assert!(!verify(Provider::WhatsApp, &body, &near, &secret));
            near_samples.push(start.elapsed().as_nanos());

            let start = Instant::now();
            assert!(!verify(Provider::WhatsApp, &body, &far, &secret));
            far_samples.push(start.elapsed().as_nanos());
        }

        near_samples.sort_unstable();
        far_samples.sort_unstable();
        let near_median = near_samples[ROUNDS / 2].max(1) as f64;
        let far_median = far_samples[ROUNDS / 2].max(1) as f64;
        let ratio = near_median / far_median;

        assert!(
            (0.5..2.0).contains(&ratio),
            "near={near_median}ns far={far_median}ns ratio={ratio}"
        );
    }
}
