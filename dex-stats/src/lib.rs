//! # DexStats
//! Trading statistics for a perpetuals and spot DEX, computed from several upstream
//! HTTP JSON APIs.
//!
//! * **Single-flight caching**: every upstream retrieval goes through a keyed
//!   [`Deduplicator`](cache::Deduplicator). Concurrent requests for the same key share
//!   one network call, and successful results are reused for a configurable TTL.
//! * **Balance aggregation**: spot holdings are valued in USD from primary mark prices,
//!   with a secondary price source filling the gaps, then summed with the futures
//!   wallet balance.
//! * **Market statistics**: open positions folded into per market summaries.
//!
//! ## Example
//! ```rust,no_run
//! use dex_stats::{config::UpstreamConfig, service::StatsService};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = StatsService::from_config(UpstreamConfig::from_env()?)?;
//!
//! let balance = service.fetch_total_balance("1234").await?;
//! println!("total: {}", balance.total_balance);
//! # Ok(())
//! # }
//! ```

pub mod balance;
pub mod cache;
pub mod config;

/// All [`Error`](std::error::Error)s generated while fetching upstream data.
pub mod error;

/// Cached statistics operations.
pub mod service;

pub mod stats;
pub mod symbol;

/// Upstream API contracts, wire types and the HTTP implementation.
pub mod upstream;

pub use balance::{DetailedBalance, TokenBalance, TotalBalance};
pub use cache::Deduplicator;
pub use config::{ConfigError, UpstreamConfig};
pub use error::FetchError;
pub use service::StatsService;
pub use stats::MarketSummary;
