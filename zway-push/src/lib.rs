//! Mobile push notifications (`spec.md` §2/§6, component C8). Modeled as
//! the opaque `PushNotifier` collaborator the spec names, with an FCM
//! HTTP implementation as the only concrete backend.

use async_trait::async_trait;
use serde_json::json;
use zway_proto::logging::{self, Logger};

/// `send(token, kind, n) -> bool`, exactly the interface `spec.md` §2
/// describes. Best-effort: the caller never retries or blocks on this.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn send(&self, token: &str, kind: u32, num_elements: u32) -> bool;
}

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Posts to FCM's legacy HTTP endpoint with a server-held bearer key
/// (`spec.md` §6).
pub struct FcmNotifier {
    client: reqwest::Client,
    key: String,
    log: Logger,
}

impl FcmNotifier {
    pub fn new(key: String, log: &Logger) -> FcmNotifier {
        FcmNotifier {
            client: reqwest::Client::new(),
            key,
            log: log.new(logging::o!("component" => "fcm-notifier")),
        }
    }
}

#[async_trait]
impl PushNotifier for FcmNotifier {
    async fn send(&self, token: &str, kind: u32, num_elements: u32) -> bool {
        let body = json!({
            "to": token,
            "priority": "normal",
            "data": {
                "type": kind,
                "numElements": num_elements,
            },
        });

        let result = self
            .client
            .post(FCM_ENDPOINT)
            .bearer_auth(&self.key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                logging::warn!(self.log, "fcm push rejected"; "status" => response.status().as_u16());
                false
            }
            Err(err) => {
                logging::warn!(self.log, "fcm push failed"; "error" => err.to_string());
                false
            }
        }
    }
}

/// Used when no FCM key is configured: push delivery is best-effort, so a
/// server with none configured simply drops notifications rather than
/// refusing to start.
pub struct NoopNotifier;

#[async_trait]
impl PushNotifier for NoopNotifier {
    async fn send(&self, _token: &str, _kind: u32, _num_elements: u32) -> bool {
        false
    }
}

/// Test double that records calls instead of making network requests.
#[cfg(any(test, feature = "test-support"))]
pub struct RecordingNotifier {
    pub sent: parking_lot::Mutex<Vec<(String, u32, u32)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingNotifier {
    pub fn new() -> RecordingNotifier {
        RecordingNotifier {
            sent: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl PushNotifier for RecordingNotifier {
    async fn send(&self, token: &str, kind: u32, num_elements: u32) -> bool {
        self.sent.lock().push((token.to_string(), kind, num_elements));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_notifier_captures_calls() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.send("token-1", 1000, 2).await);
        assert_eq!(notifier.sent.lock()[0], ("token-1".to_string(), 1000, 2));
    }
}
