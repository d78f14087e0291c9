use std::sync::Arc;

use crate::config::RelayConfig;
use crate::conversions::ConversionsApi;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub conversions: Arc<dyn ConversionsApi>,
}

impl AppState {
    pub fn new(config: RelayConfig, conversions: Arc<dyn ConversionsApi>) -> Self {
        Self {
            config: Arc::new(config),
            conversions,
        }
    }
}
