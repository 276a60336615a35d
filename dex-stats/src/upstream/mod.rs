use crate::error::FetchError;
use async_trait::async_trait;
use tracing::warn;

/// Reqwest implementation of [`Upstream`].
pub mod http;

/// Upstream JSON wire types.
pub mod message;

pub use http::HttpUpstream;
pub use message::{
    AccountDetails, FallbackMarkPrice, FuturesBalance, MarkPrice, Page, PnlOverview, Position,
    Side, SpotAccount, SpotToken, SymbolInfo, Symbols,
};

/// Contracts of the remote services the statistics are computed from.
///
/// Every method performs exactly one upstream request, apart from
/// [`Upstream::all_positions`] which follows pagination.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch one page of open positions, starting at `cursor` (first page if `None`).
    async fn positions_page(&self, cursor: Option<&str>) -> Result<Page<Vec<Position>>, FetchError>;

    /// Fetch market metadata keyed by symbol id.
    async fn symbols(&self) -> Result<Symbols, FetchError>;

    /// Fetch a user's futures account: open positions and wallet balances.
    async fn account_details(&self, user_id: &str) -> Result<AccountDetails, FetchError>;

    /// Fetch a user's spot token balances.
    async fn spot_balance(&self, user_id: &str) -> Result<SpotAccount, FetchError>;

    /// Fetch mark prices from the primary market data source.
    async fn mark_prices(&self) -> Result<Vec<MarkPrice>, FetchError>;

    /// Fetch mark prices from the fallback market data source.
    async fn fallback_mark_prices(&self) -> Result<Vec<FallbackMarkPrice>, FetchError>;

    /// Fetch a user's PnL overview from the internal PnL service.
    async fn pnl_overview(&self, user_id: &str) -> Result<PnlOverview, FetchError>;

    /// Fetch every open position, following `next_cursor` until it is absent.
    ///
    /// Items are returned in page order. An upstream that hands back the cursor it was
    /// just given ends pagination rather than looping forever.
    async fn all_positions(&self) -> Result<Vec<Position>, FetchError> {
        let mut positions = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.positions_page(cursor.as_deref()).await?;
            positions.extend(page.items);

            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!(cursor = %next, "positions cursor did not advance, stopping pagination");
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(positions)
    }
}
