//! Notification Manager port.
//!
//! Defines the fan-out contract for lifecycle events. The default
//! implementation (webhook via reqwest+HMAC signing, email via a
//! MailChannels-style payload) lives in
//! `conductor-infrastructure::notifications`.

use async_trait::async_trait;
use conductor_domain::{Notification, NotificationEventKind};
use serde_json::Value;

/// The outcome of one target dispatch for one event, per spec §4.9.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NotificationResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub target_type: &'static str,
    pub target: String,
    pub event: &'static str,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// Port for dispatching lifecycle event notifications.
///
/// Per §4.9/§5, dispatch never propagates individual target failures
/// back into the run — failures are collected in the returned results.
#[async_trait]
pub trait NotificationSenderPort: Send + Sync {
    async fn dispatch(
        &self,
        event: NotificationEventKind,
        ensemble_name: &str,
        data: Value,
        targets: &[Notification],
    ) -> Vec<NotificationResult>;
}
