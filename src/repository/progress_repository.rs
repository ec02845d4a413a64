use super::models::{DataType, HistoricDataProgress};
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

const LAST_SYNCED_BLOCK: &str = "last-synced-block";

/// Backfill progress records and the live-feed cursor.
pub struct ProgressRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> ProgressRepository<'a> {
    const UPSERT_PROGRESS: &'static str = "INSERT OR REPLACE INTO historic_data_progress
         (data_type, start_block, end_block, last_fetched_block)
         VALUES (?1, ?2, ?3, ?4)";

    const GET_PROGRESS: &'static str = "SELECT start_block, end_block, last_fetched_block
         FROM historic_data_progress WHERE data_type = ?1";

    const DELETE_PROGRESS: &'static str = "DELETE FROM historic_data_progress WHERE data_type = ?1";

    const GET_STATE: &'static str = "SELECT value FROM sync_state WHERE key = ?1";

    const SET_STATE: &'static str =
        "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)";

    const ADVANCE_STATE: &'static str = "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_progress(&self, data_type: DataType) -> Result<Option<HistoricDataProgress>> {
        let progress = self
            .conn
            .query_row(Self::GET_PROGRESS, params![data_type.as_str()], |row| {
                Ok(HistoricDataProgress {
                    start_block: row.get(0)?,
                    end_block: row.get(1)?,
                    last_fetched_block: row.get(2)?,
                    data_type,
                })
            })
            .optional()?;
        Ok(progress)
    }

    pub fn set_progress(&self, progress: &HistoricDataProgress) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_PROGRESS,
            params![
                progress.data_type.as_str(),
                progress.start_block,
                progress.end_block,
                progress.last_fetched_block
            ],
        )?;
        Ok(())
    }

    /// Returns whether a record was removed.
    pub fn clear_progress(&self, data_type: DataType) -> Result<bool> {
        let removed = self
            .conn
            .execute(Self::DELETE_PROGRESS, params![data_type.as_str()])?;
        Ok(removed > 0)
    }

    pub fn get_last_synced_block(&self) -> Result<Option<u64>> {
        let block: Option<u64> = self
            .conn
            .query_row(Self::GET_STATE, params![LAST_SYNCED_BLOCK], |row| row.get(0))
            .optional()?;
        Ok(block)
    }

    pub fn set_last_synced_block(&self, block_number: u64) -> Result<()> {
        self.conn
            .execute(Self::SET_STATE, params![LAST_SYNCED_BLOCK, block_number])?;
        Ok(())
    }

    /// Moves the cursor to `block_number` unless it is already past it.
    pub fn advance_last_synced_block(&self, block_number: u64) -> Result<()> {
        self.conn
            .execute(Self::ADVANCE_STATE, params![LAST_SYNCED_BLOCK, block_number])?;
        Ok(())
    }
}
