pub mod backfill;
pub mod bus;
pub mod chain;
pub mod codec;
pub mod config;
pub mod decimals;
pub mod error;
pub mod events;
pub mod extractor;
pub mod http;
pub mod live;
pub mod persistence;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod subscriptions;
pub mod trace;

#[cfg(test)]
mod testing;
