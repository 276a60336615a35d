use crate::{
    balance::{DetailedBalance, TotalBalance, detailed_balance},
    cache::{Deduplicator, keys},
    config::UpstreamConfig,
    error::FetchError,
    stats::{MarketSummary, summarize_positions},
    upstream::{
        AccountDetails, FallbackMarkPrice, HttpUpstream, MarkPrice, PnlOverview, Position,
        SpotAccount, Symbols, Upstream,
    },
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Trading statistics over an [`Upstream`], with every retrieval routed through one
/// shared [`Deduplicator`].
///
/// Repeated or concurrent requests for the same upstream data within the cache TTL
/// reuse a single network call. Cached values are `Arc`s, so hits are cheap.
#[derive(Debug)]
pub struct StatsService<U> {
    upstream: Arc<U>,
    cache: Deduplicator,
}

impl<U> Clone for StatsService<U> {
    fn clone(&self) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
            cache: self.cache.clone(),
        }
    }
}

impl StatsService<HttpUpstream> {
    /// Construct a service over the HTTP upstreams in `config`, caching for
    /// `config.cache_ttl`.
    pub fn from_config(config: UpstreamConfig) -> Result<Self, FetchError> {
        let cache_ttl = config.cache_ttl;
        Ok(Self::new(HttpUpstream::new(config)?, cache_ttl))
    }
}

impl<U> StatsService<U>
where
    U: Upstream + 'static,
{
    /// Construct a service with a fresh cache whose entries live for `cache_ttl`.
    pub fn new(upstream: U, cache_ttl: Duration) -> Self {
        Self::from_parts(Arc::new(upstream), Deduplicator::new(cache_ttl))
    }

    /// Construct a service from an existing upstream handle and cache.
    pub fn from_parts(upstream: Arc<U>, cache: Deduplicator) -> Self {
        Self { upstream, cache }
    }

    pub fn cache(&self) -> &Deduplicator {
        &self.cache
    }

    /// Total USD balance of `user_id` across the spot and futures books.
    ///
    /// Account details, spot balances and primary mark prices must all succeed. The
    /// fallback mark price source degrades to no prices on failure.
    pub async fn fetch_total_balance(&self, user_id: &str) -> Result<TotalBalance, FetchError> {
        self.fetch_detailed_balance(user_id)
            .await
            .map(|balance| balance.totals)
    }

    /// [`Self::fetch_total_balance`] with the per-token breakdown.
    pub async fn fetch_detailed_balance(
        &self,
        user_id: &str,
    ) -> Result<DetailedBalance, FetchError> {
        let (details, spot, primary, fallback) = tokio::try_join!(
            self.account_details(user_id),
            self.spot_balance(user_id),
            self.mark_prices(),
            self.fallback_mark_prices_or_empty(),
        )?;

        let balance = detailed_balance(&details, &spot, &primary, &fallback)?;

        debug!(
            user_id,
            spot_balance = %balance.totals.spot_balance,
            futures_balance = %balance.totals.futures_balance,
            total_balance = %balance.totals.total_balance,
            unpriced = balance.unpriced.len(),
            "aggregated balance"
        );

        Ok(balance)
    }

    /// Every open position on the exchange, across all pages.
    pub async fn fetch_all_positions(&self) -> Result<Arc<Vec<Position>>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        self.cache
            .deduplicate(keys::ALL_POSITIONS, move || async move {
                upstream.all_positions().await.map(Arc::new)
            })
            .await
    }

    /// Market metadata keyed by symbol id.
    pub async fn fetch_symbols(&self) -> Result<Arc<Symbols>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        self.cache
            .deduplicate(keys::SYMBOLS, move || async move {
                upstream.symbols().await.map(Arc::new)
            })
            .await
    }

    /// PnL overview of `user_id` from the internal PnL service.
    pub async fn fetch_pnl_overview(&self, user_id: &str) -> Result<Arc<PnlOverview>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        let user_id_owned = user_id.to_string();
        self.cache
            .deduplicate(&keys::pnl_overview(user_id), move || async move {
                upstream.pnl_overview(&user_id_owned).await.map(Arc::new)
            })
            .await
    }

    /// Open position statistics per market, largest notional first.
    pub async fn fetch_market_summary(&self) -> Result<Vec<MarketSummary>, FetchError> {
        let (positions, symbols) = tokio::try_join!(self.fetch_all_positions(), self.fetch_symbols())?;
        Ok(summarize_positions(&positions, &symbols))
    }

    async fn account_details(&self, user_id: &str) -> Result<Arc<AccountDetails>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        let user_id_owned = user_id.to_string();
        self.cache
            .deduplicate(&keys::account_details(user_id), move || async move {
                upstream.account_details(&user_id_owned).await.map(Arc::new)
            })
            .await
    }

    async fn spot_balance(&self, user_id: &str) -> Result<Arc<SpotAccount>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        let user_id_owned = user_id.to_string();
        self.cache
            .deduplicate(&keys::spot_balance(user_id), move || async move {
                upstream.spot_balance(&user_id_owned).await.map(Arc::new)
            })
            .await
    }

    async fn mark_prices(&self) -> Result<Arc<Vec<MarkPrice>>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        self.cache
            .deduplicate(keys::MARK_PRICES, move || async move {
                upstream.mark_prices().await.map(Arc::new)
            })
            .await
    }

    /// Never fails: an unavailable fallback source yields no prices.
    async fn fallback_mark_prices_or_empty(
        &self,
    ) -> Result<Arc<Vec<FallbackMarkPrice>>, FetchError> {
        let upstream = Arc::clone(&self.upstream);
        let prices = self
            .cache
            .deduplicate(keys::FALLBACK_MARK_PRICES, move || async move {
                upstream.fallback_mark_prices().await.map(Arc::new)
            })
            .await;

        match prices {
            Ok(prices) => Ok(prices),
            Err(error) => {
                warn!(%error, "fallback mark prices unavailable, continuing without them");
                Ok(Arc::default())
            }
        }
    }
}
