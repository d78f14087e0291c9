use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cookies::{AttributionCookies, CookieJar, CookieReader};
use crate::event::{generate_event_id, ConversionEvent, CustomData, UserData};
use crate::relay::RelayTransport;
use crate::sinks::{AnalyticsEvent, AnalyticsSink, PixelSink};

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Everything a caller can attach to one conversion.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub email: Option<String>,
    pub user_data: UserData,
    pub custom_data: CustomData,
    pub analytics: Option<AnalyticsEvent>,
    /// Reuse a known id instead of generating one, for deduplication checks.
    pub event_id: Option<String>,
}

/// Relay reply, or a locally synthesised failure when the relay was unreachable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Dual-channel conversion tracker: in-page pixel plus server relay, both
/// carrying the same event id. Tracking never fails the caller.
pub struct Tracker {
    cookies: Arc<dyn CookieReader>,
    pixel: Option<Arc<dyn PixelSink>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    relay: Arc<dyn RelayTransport>,
    page_url: String,
}

impl Tracker {
    pub fn new(relay: Arc<dyn RelayTransport>, page_url: impl Into<String>) -> Self {
        Self {
            cookies: Arc::new(CookieJar::default()),
            pixel: None,
            analytics: None,
            relay,
            page_url: page_url.into(),
        }
    }

    pub fn with_cookies(mut self, cookies: Arc<dyn CookieReader>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_pixel(mut self, pixel: Arc<dyn PixelSink>) -> Self {
        self.pixel = Some(pixel);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub async fn track_conversion(&self, event_name: &str, data: EventData) -> TrackOutcome {
        let event_id = data.event_id.clone().unwrap_or_else(generate_event_id);
        let cookies = AttributionCookies::read(self.cookies.as_ref());

        self.fire_pixel(event_name, &data.custom_data, &event_id);
        if let Some(analytics) = &data.analytics {
            self.fire_analytics(analytics);
        }

        let event = ConversionEvent {
            event_name: event_name.to_string(),
            event_id,
            email: data.email,
            fbp: cookies.fbp,
            fbc: cookies.fbc,
            source_url: self.page_url.clone(),
            user_data: data.user_data,
            custom_data: data.custom_data,
        };
        self.send_to_relay(&event).await
    }

    fn fire_pixel(&self, event_name: &str, custom_data: &CustomData, event_id: &str) {
        let Some(pixel) = &self.pixel else {
            tracing::warn!(event_name, "pixel not loaded; client-side event skipped");
            return;
        };
        match pixel.track(event_name, custom_data, event_id) {
            Ok(()) => tracing::debug!(event_name, event_id, "pixel fired"),
            Err(err) => tracing::warn!(event_name, error = %err, "pixel call failed"),
        }
    }

    fn fire_analytics(&self, event: &AnalyticsEvent) {
        let Some(analytics) = &self.analytics else {
            tracing::warn!(
                action = %event.action,
                params = ?event.params,
                "analytics not loaded; event not sent"
            );
            return;
        };
        match analytics.event(&event.action, &event.params) {
            Ok(()) => tracing::debug!(action = %event.action, "analytics event fired"),
            Err(err) => tracing::warn!(action = %event.action, error = %err, "analytics call failed"),
        }
    }

    async fn send_to_relay(&self, event: &ConversionEvent) -> TrackOutcome {
        let reply = match self.relay.send(event).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(event_name = %event.event_name, error = %err, "server-side tracking failed");
                return TrackOutcome::failed(err.to_string());
            }
        };

        let outcome = match serde_json::from_value::<TrackOutcome>(reply) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable relay reply");
                return TrackOutcome::failed(format!("unreadable relay reply: {err}"));
            }
        };

        if outcome.success {
            tracing::info!(
                event_name = %event.event_name,
                event_id = %event.event_id,
                "server-side conversion tracked"
            );
        } else {
            tracing::warn!(
                event_name = %event.event_name,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "server-side tracking warning"
            );
        }
        outcome
    }

    pub async fn track_lead(
        &self,
        email: Option<&str>,
        custom_data: CustomData,
        user_data: UserData,
    ) -> TrackOutcome {
        let analytics = AnalyticsEvent::new("generate_lead")
            .param("event_category", "engagement")
            .param("event_label", "consultation_inquiry");
        self.track_conversion(
            "Lead",
            EventData {
                email: email.map(str::to_string),
                user_data,
                custom_data,
                analytics: Some(analytics),
                event_id: None,
            },
        )
        .await
    }

    pub async fn track_submit_application(
        &self,
        email: Option<&str>,
        custom_data: CustomData,
        user_data: UserData,
    ) -> TrackOutcome {
        let analytics = AnalyticsEvent::new("submit_application")
            .param("event_category", "engagement")
            .param("event_label", "booking_form_submission")
            .param("value", custom_data.value.unwrap_or(0.0))
            .param(
                "currency",
                custom_data.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            )
            .param(
                "service_name",
                custom_data.content_name.as_deref().unwrap_or("Unknown Service"),
            )
            .param(
                "content_category",
                custom_data
                    .content_category
                    .as_deref()
                    .unwrap_or("Consultation"),
            );
        self.track_conversion(
            "SubmitApplication",
            EventData {
                email: email.map(str::to_string),
                user_data,
                custom_data,
                analytics: Some(analytics),
                event_id: None,
            },
        )
        .await
    }

    pub async fn track_initiate_checkout(&self, custom_data: CustomData) -> TrackOutcome {
        let analytics = AnalyticsEvent::new("begin_checkout").param("event_category", "ecommerce");
        self.track_conversion(
            "InitiateCheckout",
            EventData {
                custom_data,
                analytics: Some(analytics),
                ..EventData::default()
            },
        )
        .await
    }

    pub async fn track_schedule(
        &self,
        custom_data: CustomData,
        user_data: UserData,
        email: Option<&str>,
    ) -> TrackOutcome {
        let analytics = AnalyticsEvent::new("schedule_appointment")
            .param("event_category", "engagement")
            .param("event_label", "appointment_scheduled");
        self.track_conversion(
            "Schedule",
            EventData {
                email: email.map(str::to_string),
                user_data,
                custom_data,
                analytics: Some(analytics),
                event_id: None,
            },
        )
        .await
    }

    pub async fn track_purchase(
        &self,
        value: f64,
        currency: Option<&str>,
        custom_data: CustomData,
        user_data: UserData,
        email: Option<&str>,
    ) -> TrackOutcome {
        let currency = currency.unwrap_or(DEFAULT_CURRENCY).to_string();
        let analytics = AnalyticsEvent::new("purchase")
            .param("event_category", "ecommerce")
            .param("value", value)
            .param("currency", currency.as_str());
        let custom_data = CustomData {
            value: Some(value),
            currency: Some(currency),
            ..custom_data
        };
        self.track_conversion(
            "Purchase",
            EventData {
                email: email.map(str::to_string),
                user_data,
                custom_data,
                analytics: Some(analytics),
                event_id: None,
            },
        )
        .await
    }

    pub async fn track_page_view(&self) -> TrackOutcome {
        self.track_conversion("PageView", EventData::default()).await
    }
}
