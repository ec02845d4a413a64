use alloy::providers::{Provider, RootProvider};
use alloy::rpc::json_rpc::RpcRecv;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use alloy_primitives::{Address, Bytes};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

use crate::chain::{Block, ChainProvider, Log, Trace, TraceResult};
use crate::codec::{hex_to_u64, to_hex_quantity};
use crate::events::decimalsCall;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // block traces can be slow

/// JSON-RPC client rotating over several endpoints.
///
/// A failing or timed-out endpoint is rotated away from before the retry.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<RootProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url: Url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            providers.push(RootProvider::new_http(parsed_url));
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    fn get_provider(&self) -> &RootProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, method: &str, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {} calling {}: {}, rotating provider",
            current_url, method, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self, method: &str) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "{} timed out after {} seconds on {}, rotating provider",
            method,
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "{} timed out after {} seconds",
            method,
            REQUEST_TIMEOUT.as_secs()
        )
    }

    /// Raw JSON-RPC call with timeout, rotation and retries.
    async fn request<R: RpcRecv>(&self, method: &'static str, params: Vec<Value>) -> Result<R> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let params = params.clone();
            async move {
                let provider = client.get_provider();
                match timeout(
                    REQUEST_TIMEOUT,
                    provider.raw_request::<_, R>(method.into(), params),
                )
                .await
                {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(method, &error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout(method)),
                }
            }
        })
        .await
    }

    /// `decimals()` of an ERC-20 token at the latest block.
    pub async fn call_decimals(&self, token: Address) -> Result<u8> {
        let calldata = Bytes::from(decimalsCall {}.abi_encode());
        let output: Bytes = self
            .request(
                "eth_call",
                vec![json!({ "to": token, "data": calldata }), json!("latest")],
            )
            .await?;

        let decimals = decimalsCall::abi_decode_returns(&output)
            .with_context(|| format!("Failed to decode decimals() of {token:?}"))?;
        Ok(decimals)
    }
}

#[async_trait]
impl ChainProvider for RpcClient {
    async fn get_block(&self, number: u64) -> Result<Block> {
        let block: Option<Block> = self
            .request(
                "eth_getBlockByNumber",
                vec![json!(to_hex_quantity(number)), json!(true)],
            )
            .await?;

        block.ok_or_else(|| anyhow::anyhow!("Block {} not found", number))
    }

    async fn get_traces(&self, number: u64) -> Result<Vec<Trace>> {
        let traces: Option<Vec<TraceResult>> = self
            .request(
                "debug_traceBlockByNumber",
                vec![
                    json!(to_hex_quantity(number)),
                    json!({ "tracer": "callTracer", "tracerConfig": { "onlyTopCall": false } }),
                ],
            )
            .await?;

        Ok(traces
            .unwrap_or_default()
            .into_iter()
            .map(|trace| trace.result)
            .collect())
    }

    async fn get_logs(&self, number: u64) -> Result<Vec<Log>> {
        let block = to_hex_quantity(number);
        self.request(
            "eth_getLogs",
            vec![json!({ "fromBlock": block, "toBlock": block })],
        )
        .await
    }

    async fn get_latest_block(&self) -> Result<u64> {
        let head: String = self.request("eth_blockNumber", vec![]).await?;
        hex_to_u64(&head).with_context(|| format!("Invalid eth_blockNumber result {head:?}"))
    }
}
