use super::models::{AssetTransfer, TransferCategory};
use alloy_primitives::B256;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, ToSql, params, params_from_iter};

/// Asset transfer documents keyed by unique id.
pub struct TransferRepository<'a> {
    conn: &'a rusqlite::Connection,
}

#[derive(Debug, Default, Clone)]
pub struct TransferFilter {
    pub block_range: Option<(u64, u64)>,
    pub transaction_hash: Option<B256>,
    pub category: Option<TransferCategory>,
}

impl<'a> TransferRepository<'a> {
    const INSERT_TRANSFER: &'static str = "INSERT OR IGNORE INTO asset_transfers (
            unique_id, category, transaction_hash, block_number,
            token_address, from_address, to_address, timestamp, document
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

    const SELECT_DOCUMENT: &'static str = "SELECT document FROM asset_transfers";

    const SELECT_BY_UNIQUE_ID: &'static str =
        "SELECT document FROM asset_transfers WHERE unique_id = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<AssetTransfer>> {
        let transfer = self
            .conn
            .query_row(Self::SELECT_BY_UNIQUE_ID, params![unique_id], Self::row_to_transfer)
            .optional()?;
        Ok(transfer)
    }

    /// Returns `false` when a document with the same unique id already exists;
    /// the stored document is left untouched.
    pub fn insert(&self, transfer: &AssetTransfer) -> Result<bool> {
        let document = serde_json::to_string(transfer)?;
        let inserted = self.conn.execute(
            Self::INSERT_TRANSFER,
            params![
                transfer.unique_id,
                transfer.category.as_str(),
                format!("{:#x}", transfer.hash),
                transfer.block_num,
                transfer.token_address.map(|address| format!("{address:#x}")),
                format!("{:#x}", transfer.from),
                transfer.to.map(|address| format!("{address:#x}")),
                transfer.timestamp,
                document,
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn query_transfers(
        &self,
        filter: &TransferFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AssetTransfer>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some((start, end)) = filter.block_range {
            conditions.push("block_number >= ?");
            params.push(Box::new(start));
            conditions.push("block_number <= ?");
            params.push(Box::new(end));
        }

        if let Some(hash) = filter.transaction_hash {
            conditions.push("transaction_hash = ?");
            params.push(Box::new(format!("{hash:#x}")));
        }

        if let Some(category) = filter.category {
            conditions.push("category = ?");
            params.push(Box::new(category.as_str()));
        }

        let mut query = Self::SELECT_DOCUMENT.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY block_number, unique_id LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let transfers = stmt
            .query_map(params_from_iter(params), Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(transfers)
    }

    pub fn get_statistics(&self) -> Result<TransferStats> {
        let (total_transfers, earliest_block, latest_block): (usize, Option<u64>, Option<u64>) =
            self.conn.query_row(
                "SELECT COUNT(*), MIN(block_number), MAX(block_number) FROM asset_transfers",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM asset_transfers GROUP BY category ORDER BY category",
        )?;
        let by_category = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransferStats {
            total_transfers,
            by_category,
            earliest_block,
            latest_block,
        })
    }

    fn row_to_transfer(row: &Row) -> rusqlite::Result<AssetTransfer> {
        let document = row.get::<_, String>(0)?;
        serde_json::from_str(&document).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }
}

#[derive(Debug)]
pub struct TransferStats {
    pub total_transfers: usize,
    pub by_category: Vec<(String, usize)>,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}
