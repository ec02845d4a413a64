use anyhow::{Context, Result};
use eth_transfer_indexer::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    dotenv::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set in .env")?;

    println!("Running migrations on database: {database_url}");

    let _db = Database::new(&database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
