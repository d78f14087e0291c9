//! Conversions reported by the embedded scheduling widget over `postMessage`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;

use crate::event::{CustomData, UserData};
use crate::tracker::{TrackOutcome, Tracker};

pub const DEFAULT_WIDGET_ORIGIN: &str = "https://app.acuityscheduling.com";

/// Messages the widget may post. Anything with an unknown `type` lands in
/// `Unrecognized` and is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum WidgetMessage {
    #[serde(rename = "appointment.scheduled")]
    AppointmentScheduled(ScheduledAppointment),
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduledAppointment {
    pub invitee: Option<Invitee>,
    /// Booked service, e.g. "Natal Chart Reading".
    pub service: Option<String>,
    /// Unreadable payment data only suppresses the Purchase.
    #[serde(deserialize_with = "lenient_payment")]
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Invitee {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Payment {
    /// Accepts `75`, `75.0` and `"75.00"`.
    #[serde(deserialize_with = "number_or_string")]
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

impl Payment {
    fn chargeable_amount(&self) -> Option<f64> {
        self.amount.filter(|amount| amount.is_finite() && *amount > 0.0)
    }
}

fn lenient_payment<'de, D>(deserializer: D) -> Result<Option<Payment>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match serde_json::from_value(value) {
        Ok(payment) => Some(payment),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unreadable widget payment");
            None
        }
    }))
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

impl WidgetMessage {
    /// `None` for anything that is not JSON with a readable `type`.
    pub fn parse(data: &str) -> Option<Self> {
        match serde_json::from_str(data) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::debug!(error = %err, "ignoring widget message");
                None
            }
        }
    }
}

impl Invitee {
    fn user_data(&self) -> UserData {
        let (split_first, split_last) = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => match name.split_once(char::is_whitespace) {
                Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
                None => (Some(name.to_string()), None),
            },
            _ => (None, None),
        };
        UserData {
            first_name: self.first_name.clone().or(split_first),
            last_name: self.last_name.clone().or(split_last),
            phone: self.phone.clone(),
            ..UserData::default()
        }
    }
}

pub struct WidgetListener {
    allowed_origin: String,
    tracker: Arc<Tracker>,
}

impl WidgetListener {
    pub fn new(allowed_origin: &str, tracker: Arc<Tracker>) -> Self {
        Self {
            allowed_origin: allowed_origin.trim_end_matches('/').to_string(),
            tracker,
        }
    }

    pub fn accepts_origin(&self, origin: &str) -> bool {
        origin.trim_end_matches('/') == self.allowed_origin
    }

    /// Handles one `message` event. Returns the outcome of every conversion
    /// it produced, which is empty for untrusted or unrecognised messages.
    pub async fn handle_message(&self, origin: &str, data: &str) -> Vec<TrackOutcome> {
        if !self.accepts_origin(origin) {
            return Vec::new();
        }
        match WidgetMessage::parse(data) {
            Some(WidgetMessage::AppointmentScheduled(appointment)) => {
                self.appointment_scheduled(appointment).await
            }
            Some(WidgetMessage::Unrecognized) | None => Vec::new(),
        }
    }

    async fn appointment_scheduled(&self, appointment: ScheduledAppointment) -> Vec<TrackOutcome> {
        let invitee = appointment.invitee.unwrap_or_default();
        let email = invitee.email.as_deref();
        let user_data = invitee.user_data();
        let custom_data = CustomData {
            content_name: appointment.service.clone(),
            content_category: Some("Consultation".to_string()),
            ..CustomData::default()
        };

        tracing::info!(service = ?appointment.service, "appointment scheduled in widget");
        let mut outcomes = vec![
            self.tracker
                .track_schedule(custom_data.clone(), user_data.clone(), email)
                .await,
        ];

        let payment = appointment.payment.unwrap_or_default();
        if let Some(amount) = payment.chargeable_amount() {
            outcomes.push(
                self.tracker
                    .track_purchase(
                        amount,
                        payment.currency.as_deref(),
                        custom_data,
                        user_data,
                        email,
                    )
                    .await,
            );
        }
        outcomes
    }
}
