//! realtime-tail entry point.
//!
//! Subscribes to every topic given on the command line and logs each
//! event until Ctrl-C.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use realtime_mux::{RealtimeClient, RealtimeConfig, RealtimeMessage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("REALTIME_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let topics: Vec<String> = std::env::args().skip(1).collect();
    if topics.is_empty() {
        anyhow::bail!("usage: realtime-tail <topic> [<topic>...]");
    }

    // Load configuration
    let config = RealtimeConfig::from_env().context("loading configuration")?;
    tracing::info!(base_url = %config.base_url, topics = topics.len(), "starting realtime-tail");

    let client = RealtimeClient::with_http(config)?;

    let mut subscriptions = Vec::with_capacity(topics.len());
    for topic in &topics {
        let subscription = client
            .subscribe(topic, log_event, None)
            .await
            .with_context(|| format!("subscribing to {topic}"))?;
        subscriptions.push(subscription);
    }
    tracing::info!(
        connection_id = %client.status().connection_id,
        "subscribed, waiting for events"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    for subscription in subscriptions {
        subscription.unsubscribe().await?;
    }
    Ok(())
}

fn log_event(message: &RealtimeMessage) {
    tracing::info!(topic = %message.topic, data = %message.data, "event");
}
