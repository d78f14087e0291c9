use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::relay::DEFAULT_RELAY_PATH;
use crate::widget::DEFAULT_WIDGET_ORIGIN;

const DEFAULT_SITE_URL: &str = "http://localhost:8888";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub relay_url: String,
    pub page_url: String,
    /// `document.cookie` style string used as the cookie store.
    pub cookies: String,
    pub widget_origin: String,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
struct FileConfig {
    relay_url: Option<String>,
    page_url: Option<String>,
    cookies: Option<String>,
    widget_origin: Option<String>,
}

pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var("TRACKER_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("tracker.toml"))
}

/// Loads the TOML file (if present) and overlays the environment; env wins.
pub fn load_config(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let file_config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str::<FileConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        FileConfig::default()
    };

    let page_url = env::var("PAGE_URL")
        .ok()
        .or(file_config.page_url)
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let relay_url = env::var("RELAY_URL")
        .ok()
        .or(file_config.relay_url)
        .unwrap_or_else(|| relay_url_for(&page_url));
    let cookies = env::var("TRACKER_COOKIES")
        .ok()
        .or(file_config.cookies)
        .unwrap_or_default();
    let widget_origin = env::var("WIDGET_ORIGIN")
        .ok()
        .or(file_config.widget_origin)
        .unwrap_or_else(|| DEFAULT_WIDGET_ORIGIN.to_string());

    Ok(TrackerConfig {
        relay_url,
        page_url,
        cookies,
        widget_origin,
    })
}

/// The relay is served from the site's own origin.
fn relay_url_for(page_url: &str) -> String {
    let origin_end = page_url
        .find("://")
        .map(|scheme_end| {
            let host_start = scheme_end + 3;
            page_url[host_start..]
                .find('/')
                .map_or(page_url.len(), |slash| host_start + slash)
        })
        .unwrap_or(page_url.len());
    format!("{}{}", &page_url[..origin_end], DEFAULT_RELAY_PATH)
}
