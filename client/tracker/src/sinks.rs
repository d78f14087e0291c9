use serde_json::{Map, Value};

use crate::event::CustomData;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink call failed: {0}")]
    Failed(String),
}

/// In-page advertising pixel (`fbq('track', ...)`).
pub trait PixelSink: Send + Sync {
    fn track(&self, event_name: &str, custom_data: &CustomData, event_id: &str)
        -> Result<(), SinkError>;
}

/// Generic analytics tag (`gtag('event', ...)`).
pub trait AnalyticsSink: Send + Sync {
    fn event(&self, action: &str, params: &Map<String, Value>) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsEvent {
    pub action: String,
    pub params: Map<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}
