use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::service::resilience::backoff_delay;

type HmacSha256 = Hmac<Sha256>;

/// Serializes a JSON value with object keys sorted at every level, so
/// both ends of a webhook compute the signature over identical bytes.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// HMAC-SHA256 signature of the canonical payload, hex-encoded. An
/// empty secret yields an empty signature and the header is omitted.
pub fn sign_payload(payload: &Value, secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let canonical = canonical_json(payload);
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(canonical.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Outgoing webhook delivery with HMAC signing and exponential-backoff
/// retries on transient failures. A non-2xx, non-5xx response is
/// dropped without retrying.
pub struct WebhookNotifier {
    http: reqwest::Client,
    secret: String,
    max_retries: u32,
}

impl WebhookNotifier {
    pub fn new(secret: String, max_retries: u32, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        WebhookNotifier {
            http,
            secret,
            max_retries: max_retries.max(1),
        }
    }

    /// Posts `{job_id, status, timestamp, data}` to the caller's URL.
    /// Returns whether a 2xx was obtained within the retry budget.
    pub async fn deliver(&self, job_id: &str, status: &str, data: Value, url: &str) -> bool {
        if url.is_empty() {
            tracing::warn!("No webhook URL configured for job {}", job_id);
            return false;
        }

        let payload = json!({
            "job_id": job_id,
            "status": status,
            "timestamp": chrono::Utc::now().timestamp(),
            "data": data,
        });
        let signature = sign_payload(&payload, &self.secret);

        for attempt in 0..self.max_retries {
            let mut request = self
                .http
                .post(url)
                .header("Content-Type", "application/json")
                .header("User-Agent", "matching-service/1.0")
                .json(&payload);
            if !signature.is_empty() {
                request = request.header("X-Signature", signature.as_str());
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("Webhook delivered for job {}", job_id);
                    return true;
                }
                Ok(response) if response.status().is_server_error() => {
                    tracing::warn!(
                        "Webhook for job {} got HTTP {}, attempt {}/{}",
                        job_id,
                        response.status(),
                        attempt + 1,
                        self.max_retries
                    );
                }
                Ok(response) => {
                    tracing::error!(
                        "Webhook for job {} rejected with HTTP {}, not retrying",
                        job_id,
                        response.status()
                    );
                    return false;
                }
                Err(e) => {
                    tracing::warn!(
                        "Webhook error for job {}: {} (attempt {}/{})",
                        job_id,
                        e,
                        attempt + 1,
                        self.max_retries
                    );
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        tracing::error!(
            "Webhook permanently failed for job {} after {} attempts",
            job_id,
            self.max_retries
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "m": [1, 2]}});
        assert_eq!(canonical_json(&value), r#"{"a":{"m":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn signature_is_independent_of_key_order() {
        let a = json!({"job_id": "1", "status": "completed", "data": {"x": 1, "y": 2}});
        let b = json!({"status": "completed", "data": {"y": 2, "x": 1}, "job_id": "1"});
        assert_eq!(sign_payload(&a, "secret"), sign_payload(&b, "secret"));
    }

    #[test]
    fn signature_is_hex_sha256_sized() {
        let payload = json!({"job_id": "1"});
        let signature = sign_payload(&payload, "secret");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_changes_with_secret_and_payload() {
        let payload = json!({"job_id": "1"});
        assert_ne!(sign_payload(&payload, "secret-a"), sign_payload(&payload, "secret-b"));
        assert_ne!(
            sign_payload(&json!({"job_id": "1"}), "secret"),
            sign_payload(&json!({"job_id": "2"}), "secret")
        );
    }

    #[test]
    fn empty_secret_produces_no_signature() {
        assert_eq!(sign_payload(&json!({"a": 1}), ""), "");
    }
}
