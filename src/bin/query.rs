use anyhow::Result;
use clap::{Parser, Subcommand};
use eth_transfer_indexer::query::commands::{
    TransferQuery, cmd_cursor, cmd_progress, cmd_stats, cmd_transfers,
};
use eth_transfer_indexer::query::formatters::OutputFormat;
use eth_transfer_indexer::repository::{
    DataType, Database, ProgressRepository, TransferRepository,
};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query indexed asset transfer data", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Transfers {
        #[arg(long)]
        block: Option<u64>,

        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        block_range: Option<Vec<u64>>,

        /// Transaction hash
        #[arg(long)]
        tx: Option<String>,

        /// external, internal or token
        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Backfill job progress
    Progress {
        #[arg(long = "type", default_value = "AssetTransfer")]
        data_type: DataType,
    },
    /// Live-feed cursor
    Cursor,
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    dotenv::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./indexer.db".to_string());

    let db = Database::new(&database_url)?;
    let conn = db.connection()?;
    let transfer_repo = TransferRepository::new(&conn);
    let progress_repo = ProgressRepository::new(&conn);

    match cli.command {
        Commands::Transfers {
            block,
            block_range,
            tx,
            category,
            limit,
            offset,
        } => {
            let range = block_range.and_then(|v| match v.as_slice() {
                [start, end] => Some((*start, *end)),
                _ => None,
            });
            let query = TransferQuery {
                block,
                block_range: range,
                tx,
                category,
                limit,
                offset,
            };
            cmd_transfers(&transfer_repo, query, &format)?;
        }
        Commands::Progress { data_type } => {
            cmd_progress(&progress_repo, data_type, &format)?;
        }
        Commands::Cursor => {
            cmd_cursor(&progress_repo, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&transfer_repo, &format)?;
        }
    }

    Ok(())
}
