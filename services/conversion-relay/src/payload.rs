use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::hashing::hash_pii;
use crate::models::{CustomDataInput, TrackConversionRequest};

/// One entry of the Conversions API `data` array.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event_name: String,
    pub event_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub event_source_url: String,
    pub action_source: &'static str,
    pub user_data: UserData,
    pub custom_data: CustomData,
}

/// Matching keys. Identifying fields hold SHA-256 digests only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub em: Option<String>,
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "ln", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(rename = "ph", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "ct", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "st", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "zp", skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "db", skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
}

/// Request metadata the relay knows and the browser does not.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

pub fn build_server_event(
    event_name: &str,
    request: &TrackConversionRequest,
    context: RequestContext,
    default_source_url: &str,
) -> ServerEvent {
    let input = &request.user_data;
    let user_data = UserData {
        em: hash_pii(request.email.as_deref()),
        first_name: hash_pii(input.first_name.as_deref()),
        last_name: hash_pii(input.last_name.as_deref()),
        phone: hash_pii(input.phone.as_deref()),
        city: hash_pii(input.city.as_deref()),
        state: hash_pii(input.state.as_deref()),
        zip: hash_pii(input.zip.as_deref()),
        country: hash_pii(input.country.as_deref()),
        date_of_birth: hash_pii(input.date_of_birth.as_deref()),
        client_ip_address: context.client_ip,
        client_user_agent: context.user_agent,
        fbp: non_blank(request.fbp.as_deref()),
        fbc: non_blank(request.fbc.as_deref()),
    };

    let event_source_url = non_blank(request.source_url.as_deref())
        .or_else(|| non_blank(context.referer.as_deref()))
        .unwrap_or_else(|| default_source_url.to_string());

    ServerEvent {
        event_name: event_name.to_string(),
        event_time: unix_now(),
        event_id: non_blank(request.event_id.as_deref()),
        event_source_url,
        action_source: "website",
        user_data,
        custom_data: custom_data(&request.custom_data),
    }
}

fn custom_data(input: &CustomDataInput) -> CustomData {
    CustomData {
        // A zero value carries no information for optimisation; leave it out.
        value: input.value.filter(|value| *value != 0.0),
        currency: non_blank(input.currency.as_deref()),
        content_name: non_blank(input.content_name.as_deref()),
        content_category: non_blank(input.content_category.as_deref()),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
