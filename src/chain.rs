//! Chain data as the JSON-RPC node returns it, plus the provider seam.
//!
//! Quantities are kept as the node's hex strings; `codec` turns them into
//! numbers during extraction.

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

fn zero_quantity() -> String {
    "0x0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    #[serde(default = "zero_quantity")]
    pub gas: String,
    #[serde(default = "zero_quantity")]
    pub gas_price: String,
}

/// A block fetched with full transaction objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn transaction(&self, hash: &B256) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| &tx.hash == hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallKind {
    Call,
    CallCode,
    Create,
    Create2,
    DelegateCall,
    StaticCall,
    SelfDestruct,
    #[serde(other)]
    Other,
}

/// One frame of a `callTracer` call tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(rename = "type")]
    pub kind: CallKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "zero_quantity")]
    pub gas: String,
    #[serde(default = "zero_quantity")]
    pub gas_used: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<Trace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-transaction envelope of `debug_traceBlockByNumber`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    #[serde(default)]
    pub tx_hash: Option<B256>,
    pub result: Trace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: String,
    pub transaction_hash: B256,
    pub log_index: String,
}

/// Read access to chain data, addressed by block number only.
///
/// `get_traces` returns one root frame per transaction, in transaction order.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn get_block(&self, number: u64) -> Result<Block>;

    async fn get_traces(&self, number: u64) -> Result<Vec<Trace>>;

    async fn get_logs(&self, number: u64) -> Result<Vec<Log>>;

    async fn get_latest_block(&self) -> Result<u64>;
}
