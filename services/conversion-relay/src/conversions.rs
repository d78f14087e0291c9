use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GraphApiConfig;
use crate::payload::ServerEvent;

#[derive(Debug, thiserror::Error)]
pub enum ConversionsError {
    #[error("conversions api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

impl ConversionsError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Rejected { status, .. } => Some(*status),
        }
    }
}

/// Body of one `POST /<pixel>/events` call.
#[derive(Debug, Clone, Serialize)]
pub struct EventRequest {
    #[serde(skip)]
    pub pixel_id: String,
    pub access_token: String,
    pub data: Vec<ServerEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

impl EventRequest {
    pub fn new(access_token: &str, pixel_id: &str, event: ServerEvent) -> Self {
        Self {
            pixel_id: pixel_id.to_string(),
            access_token: access_token.to_string(),
            data: vec![event],
            test_event_code: None,
        }
    }

    pub fn with_test_event_code(mut self, code: Option<&str>) -> Self {
        self.test_event_code = code.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventResponse {
    #[serde(default)]
    pub events_received: u32,
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

#[async_trait]
pub trait ConversionsApi: Send + Sync {
    async fn send(&self, request: &EventRequest) -> Result<EventResponse, ConversionsError>;
}

#[derive(Clone)]
pub struct GraphApiClient {
    client: Client,
    config: GraphApiConfig,
}

#[derive(Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    message: String,
}

impl GraphApiClient {
    pub fn new(config: GraphApiConfig) -> Result<Self, ConversionsError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn events_url(&self, pixel_id: &str) -> String {
        format!(
            "{}/{}/{}/events",
            self.config.base_url.trim_end_matches('/'),
            self.config.version,
            pixel_id
        )
    }
}

#[async_trait]
impl ConversionsApi for GraphApiClient {
    async fn send(&self, request: &EventRequest) -> Result<EventResponse, ConversionsError> {
        let response = self
            .client
            .post(self.events_url(&request.pixel_id))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GraphErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("conversions api returned {status}"));
            return Err(ConversionsError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{CustomData, UserData};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn event() -> ServerEvent {
        ServerEvent {
            event_name: "Lead".to_string(),
            event_time: 1_700_000_000,
            event_id: Some("1-abc".to_string()),
            event_source_url: "https://syzygyastro.netlify.app".to_string(),
            action_source: "website",
            user_data: UserData::default(),
            custom_data: CustomData::default(),
        }
    }

    /// Serves one canned HTTP reply and hands back the request it received.
    async fn graph_stub(
        status_line: &str,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let reply = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let read = socket.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..read]);
                let text = String::from_utf8_lossy(&received);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        (base_url, handle)
    }

    fn client_for(base_url: String) -> GraphApiClient {
        GraphApiClient::new(GraphApiConfig {
            base_url,
            version: "v18.0".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn graph_error_message_is_surfaced() {
        let (base_url, server) = graph_stub(
            "400 Bad Request",
            r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#,
        )
        .await;
        let err = client_for(base_url)
            .send(&EventRequest::new("bad-token", "815934864526504", event()))
            .await
            .unwrap_err();

        match err {
            ConversionsError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid OAuth access token.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let received = server.await.unwrap();
        assert!(received.starts_with("POST /v18.0/815934864526504/events "));
        assert!(received.contains(r#""access_token":"bad-token""#));
    }

    #[tokio::test]
    async fn unparseable_error_body_falls_back_to_status() {
        let (base_url, server) = graph_stub("400 Bad Request", "<html>bad gateway</html>").await;
        let err = client_for(base_url)
            .send(&EventRequest::new("token", "1", event()))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "conversions api returned 400 Bad Request");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn success_reply_is_parsed() {
        let (base_url, server) = graph_stub(
            "200 OK",
            r#"{"events_received":1,"messages":[],"fbtrace_id":"AbC123"}"#,
        )
        .await;
        let reply = client_for(base_url)
            .send(&EventRequest::new("token", "1", event()))
            .await
            .unwrap();

        assert_eq!(reply.events_received, 1);
        assert!(reply.messages.is_empty());
        assert_eq!(reply.fbtrace_id.as_deref(), Some("AbC123"));
        server.await.unwrap();
    }

    #[test]
    fn request_body_matches_graph_schema() {
        let request =
            EventRequest::new("token", "815934864526504", event()).with_test_event_code(Some("TEST1"));
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["access_token"], "token");
        assert_eq!(body["test_event_code"], "TEST1");
        assert_eq!(body["data"][0]["event_id"], "1-abc");
        assert_eq!(body["data"][0]["action_source"], "website");
        assert!(body.get("pixel_id").is_none());
    }

    #[test]
    fn production_request_omits_test_code() {
        let request = EventRequest::new("token", "1", event()).with_test_event_code(None);
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("test_event_code").is_none());
    }

    #[test]
    fn events_url_joins_version_and_pixel() {
        let client = GraphApiClient::new(GraphApiConfig {
            base_url: "https://graph.facebook.com/".to_string(),
            version: "v18.0".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            client.events_url("42"),
            "https://graph.facebook.com/v18.0/42/events"
        );
    }
}
