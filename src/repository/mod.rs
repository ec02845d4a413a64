pub mod database;
pub mod models;
pub mod progress_repository;
pub mod store;
pub mod transfer_repository;

pub use database::Database;
pub use models::{AssetTransfer, DataType, HistoricDataProgress, TransferCategory};
pub use progress_repository::ProgressRepository;
pub use store::{CursorStore, ProgressStore, TransferStore};
pub use transfer_repository::{TransferFilter, TransferRepository, TransferStats};
