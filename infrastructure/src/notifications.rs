//! Notification Manager (§4.9): fans a lifecycle event out to every
//! matching webhook/email target, dispatching targets concurrently and
//! collecting per-target results without ever propagating a failure back
//! into the run.
//!
//! Grounded on `infrastructure::tools::web::fetch`'s `reqwest::Client`
//! usage (shared client, explicit `User-Agent`, status-code-based
//! failure) for the webhook path, and the teacher's `futures` dependency
//! for the per-target fan-out (`futures::future::join_all`).

use async_trait::async_trait;
use conductor_application::ports::notification_sender::{NotificationResult, NotificationSenderPort};
use conductor_domain::{Notification, NotificationEventKind};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// §4.9's baked-in defaults, used when the host config doesn't override
/// them via `NotificationManager::new`.
const FALLBACK_TIMEOUT_SECS: u64 = 5;
const FALLBACK_RETRY_SCHEDULE_SECS: [u64; 5] = [1, 5, 30, 120, 300];
const FALLBACK_RETRIES: u32 = 3;

/// Default implementation of the notification sender port. Carries the
/// host-configured HTTP timeout and retry schedule (§3's `HostConfig`
/// ambient concern) as per-target fallbacks, used only when a target
/// doesn't declare its own `timeout_ms`/`retries`.
pub struct NotificationManager {
    client: reqwest::Client,
    default_timeout: Duration,
    default_retries: u32,
    retry_schedule_secs: Vec<u64>,
}

impl NotificationManager {
    pub fn new(default_timeout: Duration, default_retries: u32, retry_schedule_secs: Vec<u64>) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_timeout,
            default_retries,
            retry_schedule_secs: if retry_schedule_secs.is_empty() {
                FALLBACK_RETRY_SCHEDULE_SECS.to_vec()
            } else {
                retry_schedule_secs
            },
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(FALLBACK_TIMEOUT_SECS),
            FALLBACK_RETRIES,
            FALLBACK_RETRY_SCHEDULE_SECS.to_vec(),
        )
    }
}

#[async_trait]
impl NotificationSenderPort for NotificationManager {
    async fn dispatch(
        &self,
        event: NotificationEventKind,
        ensemble_name: &str,
        data: Value,
        targets: &[Notification],
    ) -> Vec<NotificationResult> {
        let timestamp = unix_timestamp();
        let body = serde_json::json!({
            "event": event.as_str(),
            "timestamp": chrono::DateTime::<chrono::Utc>::from(
                UNIX_EPOCH + Duration::from_secs(timestamp)
            ).to_rfc3339(),
            "data": merge_ensemble_name(ensemble_name, data),
        });

        let futures = targets
            .iter()
            .filter(|target| target.subscribes_to(event))
            .map(|target| self.dispatch_one(event, target, &body, timestamp));

        futures::future::join_all(futures).await
    }
}

impl NotificationManager {
    async fn dispatch_one(
        &self,
        event: NotificationEventKind,
        target: &Notification,
        body: &Value,
        timestamp: u64,
    ) -> NotificationResult {
        match target {
            Notification::Webhook { url, secret, retries, timeout_ms, .. } => {
                self.dispatch_webhook(event, url, secret.as_deref(), *retries, *timeout_ms, body, timestamp)
                    .await
            }
            Notification::Email { to, subject, from, .. } => {
                self.dispatch_email(event, to, subject.as_deref(), from.as_deref(), body)
                    .await
            }
        }
    }

    async fn dispatch_webhook(
        &self,
        event: NotificationEventKind,
        url: &str,
        secret: Option<&str>,
        retries: Option<u32>,
        timeout_ms: Option<u64>,
        body: &Value,
        timestamp: u64,
    ) -> NotificationResult {
        let start = Instant::now();
        let body_str = body.to_string();
        let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(self.default_timeout);
        let max_attempts = retries.unwrap_or(self.default_retries).max(1);

        let mut last_error = None;
        let mut last_status = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay_secs = self
                    .retry_schedule_secs
                    .get((attempt as usize).saturating_sub(2))
                    .copied()
                    .unwrap_or(*self.retry_schedule_secs.last().unwrap());
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            }

            let mut request = self
                .client
                .post(url)
                .timeout(timeout)
                .header("Content-Type", "application/json")
                .header("User-Agent", "Conductor-Webhook/1.0")
                .header("X-Conductor-Event", event.as_str())
                .header("X-Conductor-Timestamp", timestamp.to_string())
                .header("X-Conductor-Delivery-Attempt", attempt.to_string());

            if let Some(secret) = secret {
                request = request.header(
                    "X-Conductor-Signature",
                    sign(secret, timestamp, &body_str),
                );
            }

            match request.body(body_str.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());
                    if status.is_success() {
                        return NotificationResult {
                            success: true,
                            target_type: "webhook",
                            target: url.to_string(),
                            event: event.as_str(),
                            duration_ms: start.elapsed().as_millis() as u64,
                            error: None,
                            status_code: last_status,
                            attempts: Some(attempt),
                        };
                    }
                    last_error = Some(format!("HTTP {}", status.as_u16()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }
        }

        NotificationResult {
            success: false,
            target_type: "webhook",
            target: url.to_string(),
            event: event.as_str(),
            duration_ms: start.elapsed().as_millis() as u64,
            error: last_error,
            status_code: last_status,
            attempts: Some(max_attempts),
        }
    }

    async fn dispatch_email(
        &self,
        event: NotificationEventKind,
        to: &str,
        subject: Option<&str>,
        from: Option<&str>,
        body: &Value,
    ) -> NotificationResult {
        let start = Instant::now();
        let ensemble_name = body
            .get("data")
            .and_then(|d| d.get("ensemble"))
            .and_then(|e| e.as_str())
            .unwrap_or_default();
        let timestamp = body.get("timestamp").and_then(|v| v.as_str()).unwrap_or_default();

        let subject = interpolate_subject(
            subject.unwrap_or("Conductor: ${event} for ${ensemble.name}"),
            event.as_str(),
            ensemble_name,
            timestamp,
        );

        let header_color = match event {
            NotificationEventKind::ExecutionCompleted => "#16a34a",
            NotificationEventKind::ExecutionFailed | NotificationEventKind::ExecutionTimeout => "#dc2626",
            _ => "#2563eb",
        };

        let plaintext = format!(
            "event: {}\ntimestamp: {}\ndata: {}",
            event.as_str(),
            timestamp,
            body.get("data").cloned().unwrap_or(Value::Null)
        );
        let html = format!(
            "<div><h2 style=\"color:{header_color}\">{}</h2><p>{}</p><pre>{}</pre></div>",
            event.as_str(),
            timestamp,
            body.get("data").cloned().unwrap_or(Value::Null)
        );

        let payload = serde_json::json!({
            "personalizations": [{"to": [{"email": to}]}],
            "from": {"email": from.unwrap_or("notifications@conductor.dev"), "name": "Conductor Notifications"},
            "subject": subject,
            "content": [
                {"type": "text/plain", "value": plaintext},
                {"type": "text/html", "value": html},
            ],
        });

        match self
            .client
            .post("https://api.mailchannels.net/tx/v1/send")
            .json(&payload)
            .timeout(self.default_timeout)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                NotificationResult {
                    success: status.is_success(),
                    target_type: "email",
                    target: to.to_string(),
                    event: event.as_str(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: if status.is_success() {
                        None
                    } else {
                        Some(format!("HTTP {}", status.as_u16()))
                    },
                    status_code: Some(status.as_u16()),
                    attempts: Some(1),
                }
            }
            Err(e) => NotificationResult {
                success: false,
                target_type: "email",
                target: to.to_string(),
                event: event.as_str(),
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
                status_code: None,
                attempts: Some(1),
            },
        }
    }
}

fn sign(secret: &str, timestamp: u64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_secs()
}

fn merge_ensemble_name(ensemble_name: &str, data: Value) -> Value {
    let mut obj = data.as_object().cloned().unwrap_or_default();
    obj.insert("ensemble".to_string(), Value::String(ensemble_name.to_string()));
    Value::Object(obj)
}

fn interpolate_subject(template: &str, event: &str, ensemble_name: &str, timestamp: &str) -> String {
    template
        .replace("${event}", event)
        .replace("${ensemble.name}", ensemble_name)
        .replace("${timestamp}", timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches_reference_scheme() {
        let signature = sign("shh", 1_700_000_000, r#"{"a":1}"#);
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
    }

    #[test]
    fn test_subject_interpolation_substitutes_all_tokens() {
        let subject = interpolate_subject(
            "${event} on ${ensemble.name} at ${timestamp}",
            "execution.completed",
            "onboard-customer",
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(
            subject,
            "execution.completed on onboard-customer at 2026-01-01T00:00:00Z"
        );
    }

    #[tokio::test]
    async fn test_dispatch_skips_unsubscribed_targets() {
        let manager = NotificationManager::default();
        let targets = vec![Notification::Webhook {
            url: "https://example.invalid/hook".to_string(),
            events: vec![NotificationEventKind::ExecutionFailed],
            secret: None,
            retries: Some(1),
            timeout_ms: Some(50),
        }];
        let results = manager
            .dispatch(
                NotificationEventKind::ExecutionStarted,
                "onboard-customer",
                Value::Null,
                &targets,
            )
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_webhook_posts_signed_request_to_mock_server() {
        use wiremock::matchers::{header_exists, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists("X-Conductor-Signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let manager = NotificationManager::default();
        let targets = vec![Notification::Webhook {
            url: format!("{}/hook", server.uri()),
            events: vec![NotificationEventKind::ExecutionCompleted],
            secret: Some("shh".to_string()),
            retries: Some(1),
            timeout_ms: Some(1_000),
        }];

        let results = manager
            .dispatch(
                NotificationEventKind::ExecutionCompleted,
                "onboard-customer",
                Value::Null,
                &targets,
            )
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].status_code, Some(200));
    }

    #[tokio::test]
    async fn test_dispatch_webhook_retries_configured_number_of_times() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        // A zero-second schedule keeps this test fast; only the count matters here.
        let manager = NotificationManager::new(Duration::from_millis(200), 3, vec![0, 0, 0]);
        let targets = vec![Notification::Webhook {
            url: server.uri(),
            events: vec![NotificationEventKind::ExecutionFailed],
            secret: None,
            retries: None,
            timeout_ms: None,
        }];

        let results = manager
            .dispatch(
                NotificationEventKind::ExecutionFailed,
                "onboard-customer",
                Value::Null,
                &targets,
            )
            .await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].attempts, Some(3));
    }
}
