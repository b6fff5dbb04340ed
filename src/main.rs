mod buffer;
mod config;
mod forwarder;

#[cfg(test)]
mod testing;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, warn};

use crate::forwarder::{Event, MetricForwarder};

/// Exceptional init failure — log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("INFLUX_RELAY_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid INFLUX_RELAY_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = config::Config::from_env().unwrap_or_else(|e| fatal("config error", &e));
    let forwarder = MetricForwarder::new(&config)
        .unwrap_or_else(|e| fatal("failed to initialize forwarder", &e));

    // One JSON event per stdin line; EOF is the shutdown signal.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(&line) {
                    Ok(event) => forwarder.receive(event).await,
                    Err(e) => warn!(error = %e, "skipping malformed event"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        }
    }

    forwarder.close().await;
}
