use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::rpc::RpcClient;

pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Decimal places used to scale a token's raw transfer amount.
#[async_trait]
pub trait DecimalsResolver: Send + Sync {
    async fn decimals(&self, token: Address) -> Result<u8>;
}

/// Every token is assumed to use the same scale.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecimals(pub u8);

impl Default for FixedDecimals {
    fn default() -> Self {
        FixedDecimals(DEFAULT_TOKEN_DECIMALS)
    }
}

#[async_trait]
impl DecimalsResolver for FixedDecimals {
    async fn decimals(&self, _token: Address) -> Result<u8> {
        Ok(self.0)
    }
}

/// Where a token's own `decimals()` answer comes from.
#[async_trait]
pub trait TokenDecimalsSource: Send + Sync {
    async fn call_decimals(&self, token: Address) -> Result<u8>;
}

#[async_trait]
impl TokenDecimalsSource for RpcClient {
    async fn call_decimals(&self, token: Address) -> Result<u8> {
        RpcClient::call_decimals(self, token).await
    }
}

/// Reads `decimals()` on-chain once per token and caches it.
///
/// Tokens that do not answer (or are not ERC-20 at all) get the fallback,
/// which is cached as well so they are not queried for every log.
pub struct CachedRpcDecimals {
    source: Arc<dyn TokenDecimalsSource>,
    fallback: u8,
    cache: RwLock<HashMap<Address, u8>>,
}

impl CachedRpcDecimals {
    pub fn new(source: Arc<dyn TokenDecimalsSource>, fallback: u8) -> Self {
        Self {
            source,
            fallback,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DecimalsResolver for CachedRpcDecimals {
    async fn decimals(&self, token: Address) -> Result<u8> {
        if let Some(decimals) = self.cache.read().await.get(&token) {
            return Ok(*decimals);
        }

        let decimals = match self.source.call_decimals(token).await {
            Ok(decimals) => {
                info!("Token {:?} uses {} decimals", token, decimals);
                decimals
            }
            Err(e) => {
                warn!(
                    "Failed to fetch decimals for {:?}: {}, using {}",
                    token, e, self.fallback
                );
                self.fallback
            }
        };

        self.cache.write().await.insert(token, decimals);
        Ok(decimals)
    }
}
