//! # Logging Module
//!
//! ## Purpose
//! Initializes tracing for the whole process and feeds every log event into
//! a broadcast queue so the API's log streaming endpoint can replay lines to
//! connected clients.
//!
//! ## Input/Output Specification
//! - **Input**: Tracing events from all components, logging configuration
//! - **Output**: Formatted stdout logs plus a broadcast feed of log lines
//!
//! ## Key Features
//! - Env-filter controlled log level (RUST_LOG overrides the config level)
//! - Lossy broadcast: slow stream consumers drop lines instead of blocking

use crate::config::LoggingConfig;
use crate::errors::Result;
use std::fmt;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Handle to the queued log lines consumed by the streaming endpoint
#[derive(Clone)]
pub struct LogFeed {
    sender: broadcast::Sender<String>,
}

impl LogFeed {
    /// Create a feed with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe a new stream consumer
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Push one formatted line into the feed
    pub fn publish(&self, line: String) {
        // No receivers connected is the normal idle state
        let _ = self.sender.send(line);
    }
}

/// Tracing layer that forwards formatted events into the feed
struct FeedLayer {
    feed: LogFeed,
}

impl<S: tracing::Subscriber> Layer<S> for FeedLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let line = format!(
            "{} {:>5} {}: {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            meta.level(),
            meta.target(),
            visitor.message
        );
        self.feed.publish(line);
    }
}

/// Captures the `message` field of an event
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// Initialize tracing with the stdout layer and the streaming feed.
///
/// Returns the feed handle for the API server. Must be called once per
/// process, before any component logs.
pub fn init(config: &LoggingConfig) -> Result<LogFeed> {
    let feed = LogFeed::new(config.stream_buffer);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(FeedLayer { feed: feed.clone() })
        .init();

    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_delivers_published_lines() {
        let feed = LogFeed::new(8);
        let mut rx = feed.subscribe();
        feed.publish("hello".to_string());
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let feed = LogFeed::new(8);
        feed.publish("dropped".to_string());
    }
}
