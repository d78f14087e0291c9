//! Client side of the conversion pipeline: fires each business event through
//! the in-page pixel and the server relay with a shared event id.

pub mod config;
pub mod cookies;
pub mod event;
pub mod relay;
pub mod sinks;
pub mod tracker;
pub mod widget;

pub use cookies::{AttributionCookies, CookieJar, CookieReader};
pub use event::{generate_event_id, ConversionEvent, CustomData, UserData};
pub use relay::{HttpRelay, RelayTransport, TransportError};
pub use sinks::{AnalyticsEvent, AnalyticsSink, PixelSink, SinkError};
pub use tracker::{EventData, TrackOutcome, Tracker};
pub use widget::{WidgetListener, WidgetMessage};
