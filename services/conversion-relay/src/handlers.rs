use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::conversions::EventRequest;
use crate::error::RelayError;
use crate::models::{TrackConversionRequest, TrackConversionResponse};
use crate::payload::{build_server_event, RequestContext};
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.config.access_token.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn track_conversion(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    match relay_conversion(&state, &method, &headers, &body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn relay_conversion(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<TrackConversionResponse, RelayError> {
    if *method != Method::POST {
        return Err(RelayError::MethodNotAllowed);
    }

    let config = &state.config;
    let access_token = config
        .access_token
        .as_deref()
        .ok_or(RelayError::MissingAccessToken)?;

    let request: TrackConversionRequest = serde_json::from_slice(body)?;
    let event_name = request
        .event_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(RelayError::MissingEventName)?
        .to_string();

    let user = &request.user_data;
    tracing::debug!(
        event_name = %event_name,
        has_email = request.email.is_some(),
        has_first_name = user.first_name.is_some(),
        has_last_name = user.last_name.is_some(),
        has_phone = user.phone.is_some(),
        has_city = user.city.is_some(),
        has_country = user.country.is_some(),
        has_date_of_birth = user.date_of_birth.is_some(),
        "user data present in conversion"
    );

    let event = build_server_event(
        &event_name,
        &request,
        request_context(headers),
        &config.default_source_url,
    );
    let event_request = EventRequest::new(access_token, &config.pixel_id, event)
        .with_test_event_code(config.test_event_code.as_deref());

    let reply = state.conversions.send(&event_request).await?;
    tracing::info!(
        event_name = %event_name,
        event_id = request.event_id.as_deref().unwrap_or("-"),
        events_received = reply.events_received,
        messages = reply.messages.len(),
        fbtrace_id = reply.fbtrace_id.as_deref().unwrap_or("-"),
        test_mode = config.test_event_code.is_some(),
        "conversion relayed"
    );

    Ok(TrackConversionResponse {
        success: true,
        message: "Event tracked successfully",
        event_name,
        event_id: request.event_id,
    })
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    // x-forwarded-for is a proxy chain; the left-most entry is the browser.
    let client_ip = header("x-forwarded-for")
        .and_then(|chain| chain.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("client-ip"));

    RequestContext {
        client_ip,
        user_agent: header("user-agent"),
        referer: header("referer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_router;
    use crate::config::{GraphApiConfig, RelayConfig, DEFAULT_PIXEL_ID, DEFAULT_RELAY_PATH};
    use crate::conversions::{ConversionsApi, ConversionsError, EventResponse};
    use crate::hashing::hash_pii;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, Router};
    use http_body_util::BodyExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<EventRequest>>,
        fail_with: Option<String>,
    }

    impl RecordingApi {
        fn failing(message: &str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }

        fn sent(&self) -> Vec<EventRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversionsApi for RecordingApi {
        async fn send(&self, request: &EventRequest) -> Result<EventResponse, ConversionsError> {
            self.sent.lock().unwrap().push(request.clone());
            match &self.fail_with {
                Some(message) => Err(ConversionsError::Rejected {
                    status: 400,
                    message: message.clone(),
                }),
                None => Ok(EventResponse {
                    events_received: 1,
                    ..EventResponse::default()
                }),
            }
        }
    }

    fn config(access_token: Option<&str>) -> RelayConfig {
        RelayConfig {
            access_token: access_token.map(str::to_string),
            pixel_id: DEFAULT_PIXEL_ID.to_string(),
            test_event_code: None,
            default_source_url: "https://syzygyastro.netlify.app".to_string(),
            relay_path: DEFAULT_RELAY_PATH.to_string(),
            graph: GraphApiConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                version: "v18.0".to_string(),
                timeout: Duration::from_secs(1),
            },
        }
    }

    fn router(access_token: Option<&str>, api: Arc<RecordingApi>) -> Router {
        build_router(AppState::new(config(access_token), api))
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(DEFAULT_RELAY_PATH)
            .header("content-type", "application/json")
            .header("origin", "http://localhost:5173")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "Mozilla/5.0")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn relays_lead_with_hashed_identifiers() {
        let api = Arc::new(RecordingApi::default());
        let response = router(Some("token"), api.clone())
            .oneshot(post(
                r#"{"eventName":"Lead","eventId":"123-abc","email":"a@b.com","userData":{"firstName":"Jo"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["eventName"], "Lead");
        assert_eq!(body["eventId"], "123-abc");

        let sent = api.sent();
        assert_eq!(sent.len(), 1);
        let event = &sent[0].data[0];
        assert_eq!(event.event_id.as_deref(), Some("123-abc"));
        assert_eq!(event.user_data.em, hash_pii(Some("a@b.com")));
        assert_eq!(event.user_data.first_name, hash_pii(Some("Jo")));
        assert_eq!(event.user_data.client_ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(event.user_data.client_user_agent.as_deref(), Some("Mozilla/5.0"));

        let outbound = serde_json::to_string(&sent[0]).unwrap();
        assert!(!outbound.contains("a@b.com"));
        assert!(!outbound.contains("\"Jo\""));
    }

    #[tokio::test]
    async fn missing_token_is_configuration_error() {
        let api = Arc::new(RecordingApi::default());
        let response = router(None, api.clone())
            .oneshot(post(r#"{"eventName":"Lead","eventId":"123-abc","email":"A@B.com "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["code"], "config_error");
        assert_eq!(body["error"], "Server configuration error");
        assert!(api.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_event_name_rejected_before_upstream() {
        let api = Arc::new(RecordingApi::default());
        let response = router(Some("token"), api.clone())
            .oneshot(post(r#"{"eventId":"123-abc","email":"a@b.com"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "eventName is required");
        assert!(api.sent().is_empty());
    }

    #[tokio::test]
    async fn event_name_is_trimmed_and_blank_rejected() {
        let api = Arc::new(RecordingApi::default());
        let response = router(Some("token"), api.clone())
            .oneshot(post(r#"{"eventName":"  Schedule ","eventId":"5-e"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["eventName"], "Schedule");
        assert_eq!(api.sent()[0].data[0].event_name, "Schedule");

        let response = router(Some("token"), api.clone())
            .oneshot(post(r#"{"eventName":"   ","eventId":"6-f"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.sent().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_rejected() {
        let api = Arc::new(RecordingApi::default());
        let response = router(Some("token"), api.clone())
            .oneshot(post("{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "invalid_body");
        assert!(api.sent().is_empty());
    }

    #[tokio::test]
    async fn non_post_methods_rejected() {
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let api = Arc::new(RecordingApi::default());
            let request = Request::builder()
                .method(method)
                .uri(DEFAULT_RELAY_PATH)
                .body(Body::from(r#"{"eventName":"Lead"}"#))
                .unwrap();
            let response = router(Some("token"), api.clone())
                .oneshot(request)
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(json_body(response).await["error"], "Method Not Allowed");
            assert!(api.sent().is_empty());
        }
    }

    #[tokio::test]
    async fn upstream_failure_reported_once() {
        let api = Arc::new(RecordingApi::failing("Invalid OAuth access token."));
        let response = router(Some("token"), api.clone())
            .oneshot(post(r#"{"eventName":"Purchase","eventId":"9-x"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("access-control-allow-origin"));
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid OAuth access token.");
        assert_eq!(api.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_event_code_forwarded() {
        let api = Arc::new(RecordingApi::default());
        let mut config = config(Some("token"));
        config.test_event_code = Some("TEST123".to_string());
        let response = build_router(AppState::new(config, api.clone()))
            .oneshot(post(r#"{"eventName":"PageView","eventId":"1-a"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api.sent()[0].test_event_code.as_deref(), Some("TEST123"));
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let api = Arc::new(RecordingApi::default());
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(DEFAULT_RELAY_PATH)
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = router(Some("token"), api.clone())
            .oneshot(request)
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert!(api.sent().is_empty());
    }

    #[test]
    fn client_ip_falls_back_to_client_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("client-ip", "198.51.100.4".parse().unwrap());
        headers.insert("referer", "https://syzygyastro.netlify.app/#services".parse().unwrap());
        let context = request_context(&headers);
        assert_eq!(context.client_ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(
            context.referer.as_deref(),
            Some("https://syzygyastro.netlify.app/#services")
        );
        assert!(context.user_agent.is_none());
    }
}
