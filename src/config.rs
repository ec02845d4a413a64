use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::backfill::DEFAULT_CHUNK_SIZE;
use crate::bus::AckPolicy;
use crate::decimals::DEFAULT_TOKEN_DECIMALS;

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub database_url: String,
    pub http_port: u16,
    pub backfill_chunk_size: u64,
    pub ack_policy: AckPolicy,
    pub redelivery_delay: Duration,
    pub consumers_per_subscription: usize,
    pub live_feed_enabled: bool,
    pub head_poll_interval: Duration,
    pub token_decimals: u8,
    pub resolve_token_decimals: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Comma-separated list, falling back to a single endpoint
        let json_rpc_urls: Vec<String> = lookup("JSON_RPC_URLS")
            .or_else(|| lookup("JSON_RPC_URL"))
            .context("JSON_RPC_URLS or JSON_RPC_URL must be set in .env")?
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        if json_rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("JSON_RPC_URLS contains no endpoints"));
        }

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:./indexer.db".to_string());

        let backfill_chunk_size: u64 =
            parse_or(&lookup, "BACKFILL_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if backfill_chunk_size == 0 {
            return Err(anyhow::anyhow!("BACKFILL_CHUNK_SIZE must be at least 1"));
        }

        Ok(Config {
            json_rpc_urls,
            database_url,
            http_port: parse_or(&lookup, "HTTP_PORT", 7020)?,
            backfill_chunk_size,
            ack_policy: parse_or(&lookup, "ACK_POLICY", AckPolicy::default())?,
            redelivery_delay: Duration::from_millis(parse_or(
                &lookup,
                "REDELIVERY_DELAY_MS",
                1000,
            )?),
            consumers_per_subscription: parse_or(&lookup, "CONSUMERS_PER_SUBSCRIPTION", 1)?,
            live_feed_enabled: parse_or(&lookup, "LIVE_FEED_ENABLED", false)?,
            head_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "HEAD_POLL_INTERVAL_SECS",
                12,
            )?),
            token_decimals: parse_or(&lookup, "TOKEN_DECIMALS", DEFAULT_TOKEN_DECIMALS)?,
            resolve_token_decimals: parse_or(&lookup, "RESOLVE_TOKEN_DECIMALS", false)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}
