// FCM HTTP v1 Push Channel

use async_trait::async_trait;
use herald_core::error::{AppError, Result};
use herald_core::port::{PushChannel, PushMessage, PushReceipt, SendError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

/// Android delivery priority requested for every message
const ANDROID_PRIORITY: &str = "high";

#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub project_id: String,
    /// OAuth2 bearer token for the messaging scope
    pub access_token: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_FCM_ENDPOINT.to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

pub struct FcmPushChannel {
    client: reqwest::Client,
    send_url: String,
    access_token: String,
}

impl FcmPushChannel {
    pub fn new(config: &FcmConfig) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(AppError::Config("push.project_id must be set".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            send_url: send_url(&config.endpoint, &config.project_id),
            access_token: config.access_token.clone(),
        })
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }
}

fn send_url(endpoint: &str, project_id: &str) -> String {
    format!(
        "{}/v1/projects/{}/messages:send",
        endpoint.trim_end_matches('/'),
        project_id
    )
}

/// v1 `messages:send` request body
fn build_body(message: &PushMessage) -> Value {
    json!({
        "message": {
            "token": message.token,
            "data": message.data,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "android": {
                "priority": ANDROID_PRIORITY,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                    "color": message.display.color,
                    "click_action": message.display.click_action,
                    "icon": message.display.icon,
                    "sound": message.display.sound,
                },
            },
        }
    })
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Non-2xx response -> SendError (404 means the registration token is gone)
fn map_error_status(status: u16, body: &str) -> SendError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(256).collect());

    match status {
        404 => SendError::InvalidRecipient(message),
        _ => SendError::Provider { status, message },
    }
}

#[async_trait]
impl PushChannel for FcmPushChannel {
    async fn send(&self, message: &PushMessage) -> std::result::Result<PushReceipt, SendError> {
        if message.token.trim().is_empty() {
            return Err(SendError::InvalidRecipient(
                "empty registration token".to_string(),
            ));
        }

        debug!(
            priority = %message.priority,
            data_keys = message.data.len(),
            "Sending FCM message"
        );

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&build_body(message))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(map_error_status(status.as_u16(), &text));
        }

        let parsed: SendResponse = serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(error = %e, "FCM accepted the message but returned an unreadable body");
            SendResponse::default()
        });

        Ok(PushReceipt {
            message_id: parsed.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::domain::{DisplayAttributes, Payload};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn message(token: &str) -> PushMessage {
        PushMessage {
            token: token.to_string(),
            title: "Signed in".to_string(),
            body: "New session".to_string(),
            data: Payload::from([("type".to_string(), "system".to_string())]),
            display: DisplayAttributes::from_event("#ff0000", ""),
            priority: "high".to_string(),
        }
    }

    fn config(endpoint: &str) -> FcmConfig {
        FcmConfig {
            endpoint: endpoint.to_string(),
            project_id: "demo-project".to_string(),
            access_token: "secret-token".to_string(),
            request_timeout_ms: 2_000,
        }
    }

    /// Serve a single HTTP response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_send_url() {
        assert_eq!(
            send_url("https://fcm.googleapis.com/", "demo"),
            "https://fcm.googleapis.com/v1/projects/demo/messages:send"
        );
    }

    #[test]
    fn test_body_shape() {
        let body = build_body(&message("device-1"));
        let msg = &body["message"];
        assert_eq!(msg["token"], "device-1");
        assert_eq!(msg["data"]["type"], "system");
        assert_eq!(msg["notification"]["title"], "Signed in");
        assert_eq!(msg["android"]["priority"], "high");
        assert_eq!(msg["android"]["notification"]["color"], "#ff0000");
        assert_eq!(msg["android"]["notification"]["click_action"], "OPEN_APP");
        assert_eq!(msg["android"]["notification"]["icon"], "default");
        assert_eq!(msg["android"]["notification"]["sound"], "default");
    }

    #[test]
    fn test_error_mapping() {
        let unregistered = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#;
        assert_eq!(
            map_error_status(404, unregistered),
            SendError::InvalidRecipient("Requested entity was not found.".to_string())
        );
        assert_eq!(
            map_error_status(503, "upstream unavailable"),
            SendError::Provider {
                status: 503,
                message: "upstream unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_requires_project() {
        let mut cfg = config(DEFAULT_FCM_ENDPOINT);
        cfg.project_id = " ".to_string();
        assert!(matches!(FcmPushChannel::new(&cfg), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_token_rejected_locally() {
        let channel = FcmPushChannel::new(&config("http://127.0.0.1:1")).unwrap();
        let err = channel.send(&message("  ")).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_send_success_returns_message_name() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"name":"projects/demo-project/messages/0:1234"}"#,
        )
        .await;
        let channel = FcmPushChannel::new(&config(&endpoint)).unwrap();

        let receipt = channel.send(&message("device-1")).await.unwrap();
        assert_eq!(receipt.message_id, "projects/demo-project/messages/0:1234");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/projects/demo-project/messages:send"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-token"));
        assert!(request.contains(r#""token":"device-1""#));
    }

    #[tokio::test]
    async fn test_send_provider_error() {
        let (endpoint, server) = serve_once(
            "500 Internal Server Error",
            r#"{"error":{"code":500,"message":"internal","status":"INTERNAL"}}"#,
        )
        .await;
        let channel = FcmPushChannel::new(&config(&endpoint)).unwrap();

        let err = channel.send(&message("device-1")).await.unwrap_err();
        assert_eq!(
            err,
            SendError::Provider {
                status: 500,
                message: "internal".to_string()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = FcmPushChannel::new(&config(&format!("http://{}", addr))).unwrap();
        let err = channel.send(&message("device-1")).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
    }
}
