use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use conversion_tracker::config::{load_config, resolve_config_path};
use conversion_tracker::{
    CookieJar, CustomData, EventData, HttpRelay, TrackOutcome, Tracker, UserData, WidgetListener,
};

/// Sends conversion events to the relay the same way the site does.
#[derive(Parser)]
#[command(name = "send-conversion", version)]
struct Cli {
    /// TOML config; defaults to $TRACKER_CONFIG or ./tracker.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track one event.
    Event {
        #[arg(long, default_value = "Lead")]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        value: Option<f64>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        service: Option<String>,
        /// Reuse an existing id to check platform-side deduplication.
        #[arg(long)]
        event_id: Option<String>,
    },
    /// Replay a scheduling widget postMessage payload.
    Widget {
        /// Origin the message claims to come from.
        #[arg(long)]
        origin: Option<String>,
        /// Raw message data, usually JSON.
        data: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&resolve_config_path(cli.config.as_deref())) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    let relay = Arc::new(HttpRelay::new(config.relay_url.clone()));
    tracing::info!(relay_url = %relay.url(), page_url = %config.page_url, "tracker configured");

    let tracker = Arc::new(
        Tracker::new(relay, config.page_url.clone())
            .with_cookies(Arc::new(CookieJar::parse(&config.cookies))),
    );

    let outcomes = match cli.command {
        Command::Event {
            name,
            email,
            first_name,
            last_name,
            value,
            currency,
            service,
            event_id,
        } => {
            let data = EventData {
                email,
                user_data: UserData {
                    first_name,
                    last_name,
                    ..UserData::default()
                },
                custom_data: CustomData {
                    value,
                    currency,
                    content_name: service,
                    ..CustomData::default()
                },
                analytics: None,
                event_id,
            };
            vec![tracker.track_conversion(&name, data).await]
        }
        Command::Widget { origin, data } => {
            let listener = WidgetListener::new(&config.widget_origin, tracker);
            let origin = origin.unwrap_or_else(|| config.widget_origin.clone());
            listener.handle_message(&origin, &data).await
        }
    };

    print_outcomes(&outcomes);
    if outcomes.iter().all(|outcome| outcome.success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_outcomes(outcomes: &[TrackOutcome]) {
    match serde_json::to_string_pretty(outcomes) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => tracing::error!(error = %err, "render outcomes failed"),
    }
}
