use crate::query::formatters::{
    OutputFormat, format_cursor, format_progress, format_stats, format_transfers,
};
use crate::repository::{
    DataType, ProgressRepository, TransferCategory, TransferFilter, TransferRepository,
};
use alloy_primitives::B256;
use anyhow::Result;
use std::str::FromStr;

#[derive(Default)]
pub struct TransferQuery {
    pub block: Option<u64>,
    pub block_range: Option<(u64, u64)>,
    pub tx: Option<String>,
    pub category: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl TransferQuery {
    fn to_filter(&self) -> Result<TransferFilter> {
        let transaction_hash = self
            .tx
            .as_ref()
            .map(|hash| {
                B256::from_str(hash)
                    .map_err(|_| anyhow::anyhow!("Invalid transaction hash: {}", hash))
            })
            .transpose()?;

        let category = self
            .category
            .as_deref()
            .map(TransferCategory::from_str)
            .transpose()?;

        // Handle block or block_range
        let block_range = if let Some(block_num) = self.block {
            Some((block_num, block_num))
        } else {
            self.block_range
        };

        if block_range.is_none() && transaction_hash.is_none() && category.is_none() {
            return Err(anyhow::anyhow!(
                "Please specify at least one filter: --block, --block-range, --tx, or --category"
            ));
        }

        Ok(TransferFilter {
            block_range,
            transaction_hash,
            category,
        })
    }
}

pub fn cmd_transfers(
    transfer_repo: &TransferRepository,
    query: TransferQuery,
    format: &OutputFormat,
) -> Result<()> {
    let filter = query.to_filter()?;
    let transfers = transfer_repo.query_transfers(&filter, query.limit, query.offset)?;

    let output = format_transfers(&transfers, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_progress(
    progress_repo: &ProgressRepository,
    data_type: DataType,
    format: &OutputFormat,
) -> Result<()> {
    let progress = progress_repo.get_progress(data_type)?;
    let output = format_progress(progress.as_ref(), format);
    println!("{output}");

    Ok(())
}

pub fn cmd_cursor(progress_repo: &ProgressRepository, format: &OutputFormat) -> Result<()> {
    let last_synced_block = progress_repo.get_last_synced_block()?;
    let output = format_cursor(last_synced_block, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_stats(repo: &TransferRepository, format: &OutputFormat) -> Result<()> {
    let stats = repo.get_statistics()?;
    let output = format_stats(&stats, format);
    println!("{output}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_wins_over_range() {
        let query = TransferQuery {
            block: Some(7),
            block_range: Some((1, 100)),
            ..Default::default()
        };
        assert_eq!(query.to_filter().unwrap().block_range, Some((7, 7)));
    }

    #[test]
    fn at_least_one_filter_is_required() {
        assert!(TransferQuery::default().to_filter().is_err());
    }

    #[test]
    fn rejects_malformed_filters() {
        let bad_hash = TransferQuery {
            tx: Some("0x12".to_string()),
            ..Default::default()
        };
        assert!(bad_hash.to_filter().is_err());

        let bad_category = TransferQuery {
            category: Some("nft".to_string()),
            ..Default::default()
        };
        assert!(bad_category.to_filter().is_err());
    }
}
