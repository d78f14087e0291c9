use std::time::Duration;

use syzygy_common::{env_opt, env_or};

pub const DEFAULT_PIXEL_ID: &str = "815934864526504";
pub const DEFAULT_SOURCE_URL: &str = "https://syzygyastro.netlify.app";
pub const DEFAULT_RELAY_PATH: &str = "/.netlify/functions/track-conversion";

#[derive(Clone)]
pub struct RelayConfig {
    /// Conversions API access token. Kept optional so a missing token fails
    /// each request with a configuration error instead of refusing to boot.
    pub access_token: Option<String>,
    pub pixel_id: String,
    pub test_event_code: Option<String>,
    pub default_source_url: String,
    pub relay_path: String,
    pub graph: GraphApiConfig,
}

#[derive(Clone)]
pub struct GraphApiConfig {
    pub base_url: String,
    pub version: String,
    pub timeout: Duration,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let relay_path = env_opt("RELAY_PATH").unwrap_or_else(|| DEFAULT_RELAY_PATH.to_string());
        let relay_path = if relay_path.starts_with('/') {
            relay_path
        } else {
            format!("/{relay_path}")
        };

        Self {
            access_token: env_opt("FB_CONVERSIONS_API_TOKEN"),
            pixel_id: env_opt("FB_PIXEL_ID").unwrap_or_else(|| DEFAULT_PIXEL_ID.to_string()),
            test_event_code: env_opt("FB_TEST_EVENT_CODE"),
            default_source_url: env_opt("DEFAULT_SOURCE_URL")
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            relay_path,
            graph: GraphApiConfig {
                base_url: env_opt("GRAPH_API_BASE")
                    .unwrap_or_else(|| "https://graph.facebook.com".to_string()),
                version: env_opt("GRAPH_API_VERSION").unwrap_or_else(|| "v18.0".to_string()),
                timeout: Duration::from_secs(env_or("GRAPH_API_TIMEOUT_SECS", 10u64)),
            },
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    // Hand-written so the access token never reaches a log line.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("access_token_configured", &self.access_token.is_some())
            .field("pixel_id", &self.pixel_id)
            .field("test_mode", &self.test_event_code.is_some())
            .field("default_source_url", &self.default_source_url)
            .field("relay_path", &self.relay_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let config = RelayConfig {
            access_token: Some("EAAB-secret".to_string()),
            pixel_id: DEFAULT_PIXEL_ID.to_string(),
            test_event_code: None,
            default_source_url: DEFAULT_SOURCE_URL.to_string(),
            relay_path: DEFAULT_RELAY_PATH.to_string(),
            graph: GraphApiConfig {
                base_url: "http://localhost".to_string(),
                version: "v18.0".to_string(),
                timeout: Duration::from_secs(1),
            },
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("EAAB-secret"));
        assert!(rendered.contains("access_token_configured: true"));
    }
}
