use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::buffer::{BatchBuffer, BatchSink, BufferConfig};
use crate::config::{Config, ConfigError};

/// One inbound pipeline event. Only `message` is consumed; unknown fields
/// are ignored. An event without a `message` passes through as an empty
/// string so one malformed event cannot disturb the batch.
#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Error)]
enum WriteError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("destination rejected write: {status}")]
    Rejected {
        status: reqwest::StatusCode,
        response_body: String,
    },
}

/// Buffers event payloads and bulk-writes each batch to the destination's
/// `/write` endpoint as a newline-joined `text/plain` body.
pub struct MetricForwarder {
    buffer: BatchBuffer<InfluxSink>,
}

impl MetricForwarder {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let sink = InfluxSink {
            client: Client::new(),
            endpoint: write_endpoint(config)?,
        };
        let buffer = BatchBuffer::new(
            BufferConfig {
                max_items: config.flush_size,
                max_interval: config.idle_flush_time,
            },
            sink,
        )?;
        Ok(Self { buffer })
    }

    /// Hand one event's payload to the buffer. Never fails: destination
    /// problems are contained in the flush path.
    pub async fn receive(&self, event: Event) {
        self.buffer.add(event.message).await;
    }

    /// Drain buffered items and stop the idle timer.
    pub async fn close(self) {
        self.buffer.close().await;
    }
}

/// Build `{url}/write?db={db}&u={user}&p={password}&time_precision={precision}`.
fn write_endpoint(config: &Config) -> Result<Url, ConfigError> {
    let mut endpoint = config.url.clone();
    endpoint
        .path_segments_mut()
        .map_err(|_| ConfigError::UrlCannotBeBase(config.url.to_string()))?
        .pop_if_empty()
        .push("write");
    endpoint
        .query_pairs_mut()
        .append_pair("db", &config.db)
        .append_pair("u", &config.user)
        .append_pair("p", &config.password)
        .append_pair("time_precision", config.time_precision.as_str());
    Ok(endpoint)
}

/// The single reused connection to the destination. Rejected writes are
/// logged with full context and dropped; the client (and its pooled
/// connection) is kept for the next flush.
struct InfluxSink {
    client: Client,
    endpoint: Url,
}

impl InfluxSink {
    async fn post(&self, body: String) -> Result<(), WriteError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "text/plain")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        // Read the body even when unused so the connection is freed for reuse.
        let response_body = response.text().await?;

        if status.is_success() {
            Ok(())
        } else {
            Err(WriteError::Rejected {
                status,
                response_body,
            })
        }
    }
}

impl BatchSink for InfluxSink {
    fn flush(&self, batch: Vec<String>) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let body = batch.join("\n");
            debug!(body = %body, "posting batch");
            match self.post(body.clone()).await {
                Ok(()) => {}
                Err(WriteError::Rejected {
                    status,
                    response_body,
                }) => {
                    error!(
                        %status,
                        response_body = %response_body,
                        request_body = %body,
                        "destination rejected write"
                    );
                }
                Err(WriteError::Transport(e)) => {
                    error!(error = %e, request_body = %body, "failed to reach destination");
                }
            }
        }
    }
}
