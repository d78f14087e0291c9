use std::collections::HashMap;

pub const BROWSER_ID_COOKIE: &str = "_fbp";
pub const CLICK_ID_COOKIE: &str = "_fbc";

/// Read access to the page's cookie store.
pub trait CookieReader: Send + Sync {
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Cookies parsed from a `document.cookie` style string (`a=1; b=2`).
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    values: HashMap<String, String>,
}

impl CookieJar {
    pub fn parse(raw: &str) -> Self {
        let values = raw
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { values }
    }
}

impl CookieReader for CookieJar {
    fn cookie(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributionCookies {
    pub fbp: Option<String>,
    pub fbc: Option<String>,
}

impl AttributionCookies {
    pub fn read(reader: &dyn CookieReader) -> Self {
        Self {
            fbp: reader.cookie(BROWSER_ID_COOKIE),
            fbc: reader.cookie(CLICK_ID_COOKIE),
        }
    }
}
