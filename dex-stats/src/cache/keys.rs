//! Cache key names shared by every [`StatsService`](crate::service::StatsService) retrieval.

pub const MARK_PRICES: &str = "markPrices";
pub const FALLBACK_MARK_PRICES: &str = "fallbackMarkPrices";
pub const SYMBOLS: &str = "symbols";
pub const ALL_POSITIONS: &str = "allPositions";

pub fn account_details(user_id: &str) -> String {
    format!("accountDetails_{user_id}")
}

pub fn spot_balance(user_id: &str) -> String {
    format!("spotBalance_{user_id}")
}

pub fn pnl_overview(user_id: &str) -> String {
    format!("pnlOverview_{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_scoped_keys() {
        assert_eq!(account_details("42"), "accountDetails_42");
        assert_eq!(spot_balance("42"), "spotBalance_42");
        assert_eq!(pnl_overview("0xabc"), "pnlOverview_0xabc");
    }
}
