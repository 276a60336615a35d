//! USD valuation of spot and futures balances.
//!
//! Pure functions over already fetched upstream data; see
//! [`StatsService`](crate::service::StatsService) for the cached retrieval side.

use crate::{
    error::FetchError,
    symbol::{normalize_token, strip_quote},
    upstream::{AccountDetails, FallbackMarkPrice, MarkPrice, SpotAccount},
};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{debug, warn};

/// Normalised token symbol -> USD price.
pub type PriceMap = FnvHashMap<SmolStr, Decimal>;

/// Build the primary lookup, keyed by base asset (`BTC-USD` -> `BTC`).
pub fn primary_price_map(quotes: &[MarkPrice]) -> PriceMap {
    quotes
        .iter()
        .map(|quote| (SmolStr::new(strip_quote(&quote.symbol)), quote.price))
        .collect()
}

/// Build the fallback lookup, keyed by base asset like the primary one.
pub fn fallback_price_map(quotes: &[FallbackMarkPrice]) -> PriceMap {
    quotes
        .iter()
        .map(|quote| (SmolStr::new(strip_quote(&quote.symbol)), quote.mark_price))
        .collect()
}

/// Resolves a token price from the primary source first, then the fallback.
#[derive(Debug, Clone, Copy)]
pub struct PriceLookup<'a> {
    primary: &'a PriceMap,
    fallback: &'a PriceMap,
}

impl<'a> PriceLookup<'a> {
    pub fn new(primary: &'a PriceMap, fallback: &'a PriceMap) -> Self {
        Self { primary, fallback }
    }

    pub fn price(&self, token: &str) -> Option<Decimal> {
        self.primary
            .get(token)
            .or_else(|| self.fallback.get(token))
            .copied()
    }
}

/// A priced spot holding.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Normalised symbol used for pricing
    pub token: SmolStr,
    /// Raw symbol as reported by the spot API
    pub coin: SmolStr,
    pub balance: Decimal,
    pub usd_value: Decimal,
}

/// USD denominated balance across the spot and futures books.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalBalance {
    pub spot_balance: Decimal,
    pub futures_balance: Decimal,
    pub total_balance: Decimal,
}

impl TotalBalance {
    /// `None` if the sum overflows.
    pub fn new(spot_balance: Decimal, futures_balance: Decimal) -> Option<Self> {
        Some(Self {
            spot_balance,
            futures_balance,
            total_balance: spot_balance.checked_add(futures_balance)?,
        })
    }
}

/// [`TotalBalance`] plus the per-token breakdown behind the spot figure.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedBalance {
    /// Priced non-zero holdings, in upstream order
    pub tokens: Vec<TokenBalance>,
    /// Raw symbols of non-zero holdings that could not be valued
    pub unpriced: Vec<SmolStr>,
    #[serde(flatten)]
    pub totals: TotalBalance,
}

/// Outcome of valuing every spot holding.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SpotValuation {
    pub tokens: Vec<TokenBalance>,
    pub unpriced: Vec<SmolStr>,
    /// Sum of `tokens[..].usd_value`
    pub total: Decimal,
}

/// Value every non-zero spot holding that has a price.
///
/// Holdings are not valued at zero when they cannot be priced, they are left out of the
/// sum and reported in [`SpotValuation::unpriced`]. This covers holdings with no quote in
/// either source and holdings whose value would overflow [`Decimal`].
pub fn value_spot_tokens(spot: &SpotAccount, prices: PriceLookup<'_>) -> SpotValuation {
    let mut valuation = SpotValuation {
        tokens: Vec::with_capacity(spot.spot_balance.len()),
        ..Default::default()
    };

    for holding in spot.spot_balance.iter().filter(|holding| !holding.balance.is_zero()) {
        let token = normalize_token(&holding.coin);

        let Some(price) = prices.price(&token) else {
            debug!(coin = %holding.coin, %token, "no price for token, excluded from spot balance");
            valuation.unpriced.push(holding.coin.clone());
            continue;
        };

        let valued = holding.balance.checked_mul(price).and_then(|usd_value| {
            valuation
                .total
                .checked_add(usd_value)
                .map(|total| (usd_value, total))
        });

        match valued {
            Some((usd_value, total)) => {
                valuation.total = total;
                valuation.tokens.push(TokenBalance {
                    usd_value,
                    token,
                    coin: holding.coin.clone(),
                    balance: holding.balance,
                });
            }
            None => {
                warn!(
                    coin = %holding.coin,
                    balance = %holding.balance,
                    %price,
                    "token value overflows, excluded from spot balance"
                );
                valuation.unpriced.push(holding.coin.clone());
            }
        }
    }

    valuation
}

/// Futures wallet balance: the first entry of the balances list, zero if there is none.
pub fn futures_wallet_balance(details: &AccountDetails) -> Decimal {
    details
        .balances
        .first()
        .map(|balance| balance.wallet_balance)
        .unwrap_or(Decimal::ZERO)
}

/// Combine one aggregation cycle's upstream data into a [`DetailedBalance`].
///
/// Fails with [`FetchError::Overflow`] only if the spot and futures totals cannot be
/// added.
pub fn detailed_balance(
    details: &AccountDetails,
    spot: &SpotAccount,
    primary: &[MarkPrice],
    fallback: &[FallbackMarkPrice],
) -> Result<DetailedBalance, FetchError> {
    let primary = primary_price_map(primary);
    let fallback = fallback_price_map(fallback);

    let SpotValuation {
        tokens,
        unpriced,
        total,
    } = value_spot_tokens(spot, PriceLookup::new(&primary, &fallback));

    let futures_balance = futures_wallet_balance(details);
    let totals = TotalBalance::new(total, futures_balance).ok_or_else(|| FetchError::Overflow {
        context: format!("total balance ({total} spot + {futures_balance} futures)"),
    })?;

    Ok(DetailedBalance {
        tokens,
        unpriced,
        totals,
    })
}
