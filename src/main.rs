use anyhow::Context;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portico::server::{run_with, Config};

fn split_addrs(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::var("PORTICO_ADDR").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
    let signing_key = std::env::var("SESSION_KEY")
        .context("SESSION_KEY must be set to the token signing key")?;
    if signing_key.is_empty() {
        anyhow::bail!("SESSION_KEY must not be empty");
    }
    let session_ttl = match std::env::var("SESSION_TTL_SECS") {
        Ok(v) => Duration::from_secs(
            v.parse().context("SESSION_TTL_SECS must be a whole number of seconds")?,
        ),
        Err(_) => Duration::from_secs(3600),
    };
    let redis_addr = std::env::var("REDIS_ADDR").ok().filter(|v| !v.is_empty());
    let message_addrs = split_addrs(&std::env::var("MESSAGES_SVC_ADDRS").unwrap_or_default());
    let summary_addrs = split_addrs(&std::env::var("SUMMARY_SVC_ADDRS").unwrap_or_default());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        ttl_secs = session_ttl.as_secs(),
        messaging_backends = message_addrs.len(),
        summary_backends = summary_addrs.len(),
        "starting portico gateway"
    );

    run_with(Config { addr, signing_key, session_ttl, redis_addr, message_addrs, summary_addrs })
        .await
}
