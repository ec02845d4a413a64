//! In-memory chain and bus doubles for unit tests.

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::bus::{Message, MessageBus};
use crate::chain::{Block, CallKind, ChainProvider, Log, Trace, Transaction};
use crate::events::TRANSFER_SIGNATURE;

/// Deterministic hash of the `index`-th transaction of `block`.
pub fn tx_hash(block: u64, index: usize) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&block.to_be_bytes());
    bytes[8..16].copy_from_slice(&(index as u64).to_be_bytes());
    bytes[31] = 0x01;
    B256::from(bytes)
}

pub fn call(kind: CallKind, value: &str, calls: Vec<Trace>) -> Trace {
    Trace {
        from: Address::repeat_byte(0x11),
        to: Some(Address::repeat_byte(0x22)),
        kind,
        value: Some(value.to_string()),
        gas: "0x13498".to_string(),
        gas_used: "0x5208".to_string(),
        calls,
        error: None,
    }
}

/// ERC-20 transfer of token `0xee..ee` from `0x11..11` to `0x22..22`.
pub fn token_log(tx: B256, log_index: &str, data: &str) -> Log {
    Log {
        address: Address::repeat_byte(0xee),
        topics: vec![
            TRANSFER_SIGNATURE,
            Address::repeat_byte(0x11).into_word(),
            Address::repeat_byte(0x22).into_word(),
        ],
        data: data.to_string(),
        transaction_hash: tx,
        log_index: log_index.to_string(),
    }
}

/// A log that is not a transfer, so blocks are never log-less by accident.
fn noise_log(tx: B256) -> Log {
    Log {
        address: Address::repeat_byte(0xdd),
        topics: vec![B256::repeat_byte(0x8c)],
        data: "0x01".to_string(),
        transaction_hash: tx,
        log_index: "0xff".to_string(),
    }
}

struct FakeBlock {
    block: Block,
    traces: Vec<Trace>,
    logs: Vec<Log>,
}

#[derive(Default)]
pub struct FakeChain {
    blocks: HashMap<u64, FakeBlock>,
    latest: Mutex<u64>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// One transaction per root trace, hashed with [`tx_hash`]. A non-transfer
    /// log is appended so the block never comes back log-less.
    pub fn with_block(self, number: u64, traces: Vec<Trace>, mut logs: Vec<Log>) -> Self {
        logs.push(noise_log(tx_hash(number, 0)));
        self.insert_block(number, traces, logs)
    }

    /// Like [`FakeChain::with_block`], but `eth_getLogs` answers with nothing.
    pub fn with_block_without_logs(self, number: u64, traces: Vec<Trace>) -> Self {
        self.insert_block(number, traces, Vec::new())
    }

    fn insert_block(mut self, number: u64, traces: Vec<Trace>, logs: Vec<Log>) -> Self {
        let transactions = (0..traces.len())
            .map(|index| Transaction {
                hash: tx_hash(number, index),
                gas: "0x186a0".to_string(),
                gas_price: "0x3b9aca00".to_string(),
            })
            .collect();

        self.blocks.insert(
            number,
            FakeBlock {
                block: Block {
                    number: format!("{number:#x}"),
                    timestamp: "0x6046b648".to_string(),
                    transactions,
                },
                traces,
                logs,
            },
        );
        self
    }

    pub fn set_latest(&self, number: u64) {
        *self.latest.lock().unwrap() = number;
    }

    fn fake_block(&self, number: u64) -> Result<&FakeBlock> {
        self.blocks
            .get(&number)
            .ok_or_else(|| anyhow::anyhow!("Block {} not found", number))
    }
}

#[async_trait]
impl ChainProvider for FakeChain {
    async fn get_block(&self, number: u64) -> Result<Block> {
        Ok(self.fake_block(number)?.block.clone())
    }

    async fn get_traces(&self, number: u64) -> Result<Vec<Trace>> {
        Ok(self.fake_block(number)?.traces.clone())
    }

    async fn get_logs(&self, number: u64) -> Result<Vec<Log>> {
        Ok(self.fake_block(number)?.logs.clone())
    }

    async fn get_latest_block(&self) -> Result<u64> {
        Ok(*self.latest.lock().unwrap())
    }
}

/// Captures published messages instead of delivering them.
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<Message>>,
}

impl RecordingBus {
    pub fn published(&self) -> Vec<Message> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: String, sequence_id: Option<u64>) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push(Message::new(topic, payload, sequence_id));
        Ok(())
    }
}
