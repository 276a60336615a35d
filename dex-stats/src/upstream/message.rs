//! Wire types for the upstream JSON APIs.
//!
//! Numeric fields accept JSON numbers as well as decimal strings, since the upstream
//! APIs are not consistent about which they send.

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use derive_more::Display;
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Standard `{code, message, data, next_cursor?}` response envelope.
///
/// A non-zero `code` signals an application level failure even when the HTTP status
/// is `200 OK`.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(alias = "msg")]
    pub message: Option<String>,
    pub data: Option<T>,
    pub timestamp: Option<i64>,
    #[serde(alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Check the envelope `code` and extract `data`.
    pub fn into_data(self, url: &str) -> Result<T, FetchError> {
        self.into_page(url).map(|page| page.items)
    }

    /// Check the envelope `code` and extract `data` alongside the pagination cursor.
    ///
    /// An empty `next_cursor` is treated as absent.
    pub fn into_page(self, url: &str) -> Result<Page<T>, FetchError> {
        if self.code != 0 {
            return Err(FetchError::api(self.code, self.message));
        }

        let items = self.data.ok_or_else(|| FetchError::MissingData {
            url: url.to_string(),
        })?;

        Ok(Page {
            items,
            next_cursor: self.next_cursor.filter(|cursor| !cursor.is_empty()),
        })
    }
}

/// One page of a cursor paginated endpoint.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Page<T> {
    pub items: T,
    pub next_cursor: Option<String>,
}

/// Direction of an open perpetual position.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Deserialize, Serialize,
)]
pub enum Side {
    #[serde(alias = "LONG", alias = "long", alias = "BUY", alias = "buy")]
    Long,
    #[serde(alias = "SHORT", alias = "short", alias = "SELL", alias = "sell")]
    Short,
}

/// Open perpetual position.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(alias = "s")]
    pub symbol: SmolStr,
    #[serde(default, alias = "userId", alias = "address")]
    pub account: Option<String>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(alias = "qty", alias = "positionSize")]
    pub size: Decimal,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default, alias = "unrealisedPnl", alias = "upnl")]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(default)]
    pub leverage: Option<Decimal>,
}

impl Position {
    /// Explicit side if reported, otherwise derived from the sign of `size`.
    pub fn side(&self) -> Side {
        self.side.unwrap_or(if self.size.is_sign_negative() {
            Side::Short
        } else {
            Side::Long
        })
    }
}

/// Market metadata from the symbols endpoint.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    #[serde(alias = "symbol")]
    pub name: SmolStr,
    #[serde(default, alias = "baseAsset")]
    pub base_coin: Option<SmolStr>,
    #[serde(default, alias = "quoteAsset")]
    pub quote_coin: Option<SmolStr>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub max_leverage: Option<Decimal>,
}

/// Symbols endpoint `data`, keyed by symbol id.
pub type Symbols = FnvHashMap<SmolStr, SymbolInfo>;

/// Futures account details.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct AccountDetails {
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub balances: Vec<FuturesBalance>,
}

/// Futures wallet balance entry.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesBalance {
    #[serde(default, alias = "asset")]
    pub coin: Option<SmolStr>,
    #[serde(alias = "balance")]
    pub wallet_balance: Decimal,
}

/// Spot account balances.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotAccount {
    #[serde(default)]
    pub spot_balance: Vec<SpotToken>,
    #[serde(default)]
    pub total_usdt_amount: Option<Decimal>,
}

/// Raw spot token holding.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct SpotToken {
    pub coin: SmolStr,
    pub balance: Decimal,
}

/// Primary mark price quote `{s, p, t}`.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct MarkPrice {
    #[serde(rename = "s")]
    pub symbol: SmolStr,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "t", default)]
    pub time_ms: Option<i64>,
}

impl MarkPrice {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time_ms.and_then(DateTime::from_timestamp_millis)
    }
}

/// Fallback mark price quote `{symbol, markPrice}`.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackMarkPrice {
    pub symbol: SmolStr,
    pub mark_price: Decimal,
}

/// Internal PnL overview service envelope `{data, error?}`.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct PnlResponse {
    pub data: Option<PnlOverview>,
    pub error: Option<String>,
}

impl PnlResponse {
    pub fn into_data(self, url: &str) -> Result<PnlOverview, FetchError> {
        if let Some(message) = self.error {
            return Err(FetchError::Service { message });
        }

        self.data.ok_or_else(|| FetchError::MissingData {
            url: url.to_string(),
        })
    }
}

/// PnL overview for one account. Fields the service adds later are kept in `extra`.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlOverview {
    #[serde(default)]
    pub total_pnl: Option<Decimal>,
    #[serde(default)]
    pub realized_pnl: Option<Decimal>,
    #[serde(default)]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub trade_count: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
