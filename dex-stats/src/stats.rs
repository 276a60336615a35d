//! Per market position statistics for display.

use crate::upstream::{Position, Side, SymbolInfo, Symbols};
use fnv::FnvHashMap;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use tracing::warn;

/// Aggregated open positions for one market.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub symbol: SmolStr,
    /// `BASE/QUOTE` from the symbols table, if the market is listed there
    pub display_name: Option<SmolStr>,
    pub long_size: Decimal,
    pub short_size: Decimal,
    /// Sum of absolute position sizes
    pub open_interest: Decimal,
    /// Open interest valued at mark price (entry price when no mark is reported)
    pub notional: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: usize,
}

impl MarketSummary {
    fn new(symbol: SmolStr, info: Option<&SymbolInfo>) -> Self {
        Self {
            display_name: info.map(display_name),
            symbol,
            ..Default::default()
        }
    }

    /// Fold `position` into the summary. Returns `None`, leaving the summary untouched,
    /// if any running figure would overflow.
    fn add(&mut self, position: &Position) -> Option<()> {
        let size = position.size.abs();

        let price = position
            .mark_price
            .or(position.entry_price)
            .unwrap_or(Decimal::ZERO);

        let (long_size, short_size) = match position.side() {
            Side::Long => (self.long_size.checked_add(size)?, self.short_size),
            Side::Short => (self.long_size, self.short_size.checked_add(size)?),
        };
        let open_interest = self.open_interest.checked_add(size)?;
        let notional = self.notional.checked_add(size.checked_mul(price)?)?;
        let unrealized_pnl = self
            .unrealized_pnl
            .checked_add(position.unrealized_pnl.unwrap_or(Decimal::ZERO))?;

        self.long_size = long_size;
        self.short_size = short_size;
        self.open_interest = open_interest;
        self.notional = notional;
        self.unrealized_pnl = unrealized_pnl;
        self.positions += 1;
        Some(())
    }
}

fn display_name(info: &SymbolInfo) -> SmolStr {
    match (&info.base_coin, &info.quote_coin) {
        (Some(base), Some(quote)) => format_smolstr!("{base}/{quote}"),
        _ => info.name.clone(),
    }
}

/// Fold open positions into one [`MarketSummary`] per symbol, largest notional first.
///
/// Positions are matched to the symbols table by symbol id or by market name. A position
/// whose figures would overflow is skipped.
pub fn summarize_positions(positions: &[Position], symbols: &Symbols) -> Vec<MarketSummary> {
    let listed: FnvHashMap<&str, &SymbolInfo> = symbols
        .iter()
        .flat_map(|(id, info)| [(id.as_str(), info), (info.name.as_str(), info)])
        .collect();

    let mut markets: FnvHashMap<SmolStr, MarketSummary> = FnvHashMap::default();
    for position in positions {
        let added = markets
            .entry(position.symbol.clone())
            .or_insert_with(|| {
                MarketSummary::new(
                    position.symbol.clone(),
                    listed.get(position.symbol.as_str()).copied(),
                )
            })
            .add(position);

        if added.is_none() {
            warn!(
                symbol = %position.symbol,
                size = %position.size,
                "position figures overflow, excluded from market summary"
            );
        }
    }

    markets
        .into_values()
        .sorted_by(|a, b| {
            b.notional
                .cmp(&a.notional)
                .then_with(|| a.symbol.cmp(&b.symbol))
        })
        .collect()
}
