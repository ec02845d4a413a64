use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::chain::{Block, ChainProvider, Log, Trace};
use crate::codec::{CodecError, hex_to_decimal, hex_to_u64};
use crate::decimals::DecimalsResolver;
use crate::error::ExtractError;
use crate::events::{is_token_transfer, transfer_parties};
use crate::repository::{AssetTransfer, TransferCategory};
use crate::trace::classify;

const NATIVE_DECIMALS: u8 = 18;
const GWEI_DECIMALS: u8 = 9;

/// Turns blocks into asset transfers: native moves from call traces and
/// ERC-20 transfers from event logs.
pub struct TransferExtractor {
    provider: Arc<dyn ChainProvider>,
    decimals: Arc<dyn DecimalsResolver>,
}

impl TransferExtractor {
    pub fn new(provider: Arc<dyn ChainProvider>, decimals: Arc<dyn DecimalsResolver>) -> Self {
        Self { provider, decimals }
    }

    /// All transfers of one block. Native and token transfers are
    /// concatenated in no particular relative order.
    ///
    /// An empty trace or log list is a provider failure, not an empty block.
    pub async fn extract_block(&self, number: u64) -> Result<Vec<AssetTransfer>, ExtractError> {
        let (block, traces, logs) = tokio::try_join!(
            self.fetch_block(number),
            self.fetch_traces(number),
            self.fetch_logs(number),
        )?;

        let (mut transfers, tokens) = tokio::try_join!(
            async { native_transfers(number, &block, &traces) },
            self.token_transfers(number, &block, &logs),
        )?;

        debug!(
            "Block {}: {} native and {} token transfers",
            number,
            transfers.len(),
            tokens.len()
        );
        transfers.extend(tokens);
        Ok(transfers)
    }

    /// Transfers of every block in the inclusive range, extracted concurrently.
    ///
    /// The first failing block fails the whole range. An empty range
    /// (`from > to`) yields nothing.
    pub async fn extract_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<AssetTransfer>, ExtractError> {
        if from > to {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let per_block = try_join_all((from..=to).map(|number| self.extract_block(number))).await?;
        let transfers: Vec<AssetTransfer> = per_block.into_iter().flatten().collect();

        info!(
            "Extracted {} transfers for blocks {} to {} in {:?}",
            transfers.len(),
            from,
            to,
            start.elapsed()
        );
        Ok(transfers)
    }

    async fn fetch_block(&self, number: u64) -> Result<Block, ExtractError> {
        Ok(self.provider.get_block(number).await?)
    }

    async fn fetch_traces(&self, number: u64) -> Result<Vec<Trace>, ExtractError> {
        let traces = self.provider.get_traces(number).await?;
        if traces.is_empty() {
            return Err(ExtractError::provider_failure(number, "no block traces returned"));
        }
        Ok(traces)
    }

    async fn fetch_logs(&self, number: u64) -> Result<Vec<Log>, ExtractError> {
        let logs = self.provider.get_logs(number).await?;
        if logs.is_empty() {
            return Err(ExtractError::provider_failure(number, "no block logs returned"));
        }
        Ok(logs)
    }

    async fn token_transfers(
        &self,
        number: u64,
        block: &Block,
        logs: &[Log],
    ) -> Result<Vec<AssetTransfer>, ExtractError> {
        let timestamp = timestamp_millis(block)?;
        let mut transfers = Vec::new();

        for log in logs {
            if !is_token_transfer(log) {
                continue;
            }
            let Some(tx) = block.transaction(&log.transaction_hash) else {
                debug!(
                    "Skipping log of unknown transaction {:#x} in block {}",
                    log.transaction_hash, number
                );
                continue;
            };
            let Some((from, to)) = transfer_parties(log) else {
                debug!("Skipping transfer log without indexed parties in block {}", number);
                continue;
            };

            let decimals = self.decimals.decimals(log.address).await?;
            let log_index = hex_to_u64(&log.log_index)?;

            transfers.push(AssetTransfer {
                category: TransferCategory::Token,
                token_address: Some(log.address),
                from,
                to: Some(to),
                value: hex_to_decimal(&log.data, decimals)?,
                hash: log.transaction_hash,
                block_num: number,
                unique_id: format!("{:#x}:log:{}", log.transaction_hash, log_index),
                gas: hex_to_u64(&tx.gas)?,
                gas_price: hex_to_decimal(&tx.gas_price, GWEI_DECIMALS)?,
                gas_used: None,
                timestamp,
            });
        }

        Ok(transfers)
    }
}

fn timestamp_millis(block: &Block) -> Result<u64, ExtractError> {
    hex_to_u64(&block.timestamp)?
        .checked_mul(1000)
        .ok_or_else(|| CodecError::Overflow(block.timestamp.clone()).into())
}

/// Roots are matched to the block's transactions by position.
fn native_transfers(
    number: u64,
    block: &Block,
    traces: &[Trace],
) -> Result<Vec<AssetTransfer>, ExtractError> {
    if traces.len() != block.transactions.len() {
        return Err(ExtractError::provider_failure(
            number,
            format!(
                "{} traces for {} transactions",
                traces.len(),
                block.transactions.len()
            ),
        ));
    }

    let timestamp = timestamp_millis(block)?;
    let mut transfers = Vec::new();

    for (root, tx) in traces.iter().zip(&block.transactions) {
        let gas_price = hex_to_decimal(&tx.gas_price, GWEI_DECIMALS)?;

        for classified in classify(root, &tx.hash)? {
            let trace = classified.trace;
            transfers.push(AssetTransfer {
                category: classified.category,
                token_address: None,
                from: trace.from,
                to: trace.to,
                value: hex_to_decimal(trace.value.as_deref().unwrap_or("0x0"), NATIVE_DECIMALS)?,
                hash: tx.hash,
                block_num: number,
                unique_id: classified.unique_id,
                gas: hex_to_u64(&trace.gas)?,
                gas_price,
                gas_used: Some(hex_to_u64(&trace.gas_used)?),
                timestamp,
            });
        }
    }

    Ok(transfers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CallKind;
    use crate::decimals::FixedDecimals;
    use crate::testing::{FakeChain, call, token_log, tx_hash};
    use alloy_primitives::Address;

    fn extractor(chain: FakeChain) -> TransferExtractor {
        TransferExtractor::new(Arc::new(chain), Arc::new(FixedDecimals::default()))
    }

    #[tokio::test]
    async fn valued_root_is_external_and_zero_child_is_skipped() {
        let chain = FakeChain::new().with_block(
            7,
            vec![call(CallKind::Call, "0x1", vec![call(CallKind::Call, "0x0", vec![])])],
            vec![],
        );

        let transfers = extractor(chain).extract_block(7).await.unwrap();
        assert_eq!(transfers.len(), 1);
        let transfer = &transfers[0];
        assert_eq!(transfer.category, TransferCategory::External);
        assert_eq!(transfer.unique_id, format!("{:#x}:external", tx_hash(7, 0)));
        assert_eq!(transfer.value, 1e-18);
        assert_eq!(transfer.gas, 0x13498);
        assert_eq!(transfer.gas_used, Some(0x5208));
        assert_eq!(transfer.gas_price, 1.0);
        assert_eq!(transfer.timestamp, 1_615_246_920_000);
        assert_eq!(transfer.block_num, 7);
    }

    #[tokio::test]
    async fn nested_internal_calls_carry_their_path() {
        let chain = FakeChain::new().with_block(
            3,
            vec![call(
                CallKind::Call,
                "0x0",
                vec![call(
                    CallKind::Call,
                    "0x0",
                    vec![
                        call(CallKind::Call, "0x0", vec![]),
                        call(CallKind::Create, "0x38d7ea4c68000", vec![]),
                    ],
                )],
            )],
            vec![],
        );

        let transfers = extractor(chain).extract_block(3).await.unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].category, TransferCategory::Internal);
        assert_eq!(transfers[0].unique_id, format!("{:#x}:internal:0-1", tx_hash(3, 0)));
        assert_eq!(transfers[0].value, 0.001);
    }

    #[tokio::test]
    async fn transfer_log_becomes_token_transfer() {
        let tx = tx_hash(9, 0);
        let chain = FakeChain::new().with_block(
            9,
            vec![call(CallKind::Call, "0x0", vec![])],
            vec![token_log(tx, "0x1a", "0xde0b6b3a7640000")],
        );

        let transfers = extractor(chain).extract_block(9).await.unwrap();
        assert_eq!(transfers.len(), 1);
        let transfer = &transfers[0];
        assert_eq!(transfer.category, TransferCategory::Token);
        assert_eq!(transfer.unique_id, format!("{tx:#x}:log:26"));
        assert_eq!(transfer.value, 1.0);
        assert_eq!(transfer.token_address, Some(Address::repeat_byte(0xee)));
        assert_eq!(transfer.from, Address::repeat_byte(0x11));
        assert_eq!(transfer.to, Some(Address::repeat_byte(0x22)));
        assert_eq!(transfer.gas, 0x186a0);
        assert_eq!(transfer.gas_used, None);
    }

    #[tokio::test]
    async fn empty_payload_yields_no_token_transfer() {
        let tx = tx_hash(9, 0);
        let with_value = FakeChain::new().with_block(
            9,
            vec![call(CallKind::Call, "0x0", vec![])],
            vec![token_log(tx, "0x0", "0x1")],
        );
        let without_value = FakeChain::new().with_block(
            9,
            vec![call(CallKind::Call, "0x0", vec![])],
            vec![token_log(tx, "0x0", "0x")],
        );

        assert_eq!(extractor(with_value).extract_block(9).await.unwrap().len(), 1);
        assert!(extractor(without_value).extract_block(9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn log_of_foreign_transaction_is_skipped() {
        let chain = FakeChain::new().with_block(
            4,
            vec![call(CallKind::Call, "0x0", vec![])],
            vec![token_log(tx_hash(99, 5), "0x0", "0x1")],
        );

        assert!(extractor(chain).extract_block(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_value_uses_resolved_decimals() {
        let tx = tx_hash(2, 0);
        let chain = FakeChain::new().with_block(
            2,
            vec![call(CallKind::Call, "0x0", vec![])],
            vec![token_log(tx, "0x0", "0xf4240")],
        );

        let extractor = TransferExtractor::new(Arc::new(chain), Arc::new(FixedDecimals(6)));
        let transfers = extractor.extract_block(2).await.unwrap();
        assert_eq!(transfers[0].value, 1.0);
    }

    #[tokio::test]
    async fn empty_traces_are_a_provider_failure() {
        let chain = FakeChain::new().with_block(5, vec![], vec![]);

        let err = extractor(chain).extract_block(5).await.unwrap_err();
        assert!(matches!(err, ExtractError::ProviderFailure { block: 5, .. }));
    }

    #[tokio::test]
    async fn empty_logs_are_a_provider_failure() {
        let chain =
            FakeChain::new().with_block_without_logs(6, vec![call(CallKind::Call, "0x1", vec![])]);

        let err = extractor(chain).extract_block(6).await.unwrap_err();
        let ExtractError::ProviderFailure { block, reason } = err else {
            panic!("expected a provider failure");
        };
        assert_eq!(block, 6);
        assert_eq!(reason, "no block logs returned");
    }

    #[test]
    fn timestamp_beyond_millisecond_range_is_an_overflow() {
        let block = Block {
            number: "0x1".to_string(),
            timestamp: "0xffffffffffffffff".to_string(),
            transactions: vec![],
        };

        assert!(matches!(
            timestamp_millis(&block),
            Err(ExtractError::Codec(CodecError::Overflow(_)))
        ));
    }

    #[tokio::test]
    async fn missing_block_surfaces_the_provider_error() {
        let err = extractor(FakeChain::new()).extract_block(1).await.unwrap_err();
        assert!(matches!(err, ExtractError::Provider(_)));
    }

    #[tokio::test]
    async fn range_concatenates_every_block() {
        let mut chain = FakeChain::new();
        for number in 10..=12 {
            chain = chain.with_block(number, vec![call(CallKind::Call, "0x5", vec![])], vec![]);
        }

        let extractor = extractor(chain);
        let mut blocks: Vec<u64> = extractor
            .extract_range(10, 12)
            .await
            .unwrap()
            .into_iter()
            .map(|transfer| transfer.block_num)
            .collect();
        blocks.sort();
        assert_eq!(blocks, vec![10, 11, 12]);

        assert!(extractor.extract_range(13, 12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failed_block_fails_the_range() {
        let chain = FakeChain::new()
            .with_block(1, vec![call(CallKind::Call, "0x5", vec![])], vec![])
            .with_block(2, vec![], vec![]);

        assert!(extractor(chain).extract_range(1, 2).await.is_err());
    }
}
