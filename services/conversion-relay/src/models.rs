use serde::{Deserialize, Serialize};

/// Body posted by the browser tracker.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackConversionRequest {
    pub event_name: Option<String>,
    pub event_id: Option<String>,
    pub email: Option<String>,
    pub fbp: Option<String>,
    pub fbc: Option<String>,
    pub source_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub user_data: UserDataInput,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_data: CustomDataInput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDataInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    /// `YYYYMMDD`.
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomDataInput {
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub content_name: Option<String>,
    pub content_category: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConversionResponse {
    pub success: bool,
    pub message: &'static str,
    pub event_name: String,
    pub event_id: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: &'static str,
    pub error: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
