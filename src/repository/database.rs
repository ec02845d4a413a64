use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared SQLite handle. Cloning shares the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        create_tables(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection mutex poisoned"))
    }

    /// Run blocking database work off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Database connection mutex poisoned"))?;
            f(&conn)
        })
        .await?
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    // Transfer documents, keyed by their deterministic unique id
    conn.execute(
        "CREATE TABLE IF NOT EXISTS asset_transfers (
            unique_id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            transaction_hash TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            token_address TEXT,
            from_address TEXT NOT NULL,
            to_address TEXT,
            timestamp INTEGER NOT NULL,
            document TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS historic_data_progress (
            data_type TEXT PRIMARY KEY,
            start_block INTEGER NOT NULL,
            end_block INTEGER NOT NULL,
            last_fetched_block INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_asset_transfers_block_number
         ON asset_transfers(block_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_asset_transfers_transaction_hash
         ON asset_transfers(transaction_hash)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_a_file_keeps_existing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.db");
        let url = format!("sqlite:{}", path.display());

        {
            let db = Database::new(&url).unwrap();
            db.connection()
                .unwrap()
                .execute("INSERT INTO sync_state (key, value) VALUES ('k', 1)", [])
                .unwrap();
        }

        let db = Database::new(&url).unwrap();
        let value: u64 = db
            .connection()
            .unwrap()
            .query_row("SELECT value FROM sync_state WHERE key = 'k'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn run_executes_on_the_shared_connection() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .run(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM asset_transfers", [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
