//! Token symbol normalisation.
//!
//! Spot balances report raw coin names (`vBTC`, `WSOSO`, `MAG7.ssi`) while mark price
//! feeds quote markets (`BTC-USD`). Both are reduced to one canonical token symbol so a
//! balance can be matched with its price.

use smol_str::SmolStr;

/// Separator between base and quote asset in market symbols.
const QUOTE_SEPARATOR: char = '-';

/// Prefix marking a variant (wrapped / vault) representation of a token.
const VARIANT_PREFIX: char = 'v';

/// Normalise a raw spot coin name into its canonical token symbol.
///
/// Strips a single leading `v`, then maps known aliases:
/// `SOSO` / `WSOSO` -> `SOSO`, `MAG7.ssi` -> `MAG7`, `USDC` -> `USDC`.
/// Anything else is returned unchanged after stripping.
pub fn normalize_token(coin: &str) -> SmolStr {
    let stripped = coin.strip_prefix(VARIANT_PREFIX).unwrap_or(coin);

    match stripped {
        "SOSO" | "WSOSO" => SmolStr::new_static("SOSO"),
        "MAG7.ssi" => SmolStr::new_static("MAG7"),
        "USDC" => SmolStr::new_static("USDC"),
        other => SmolStr::new(other),
    }
}

/// Strip the quote currency from a market symbol, eg/ `BTC-USD` -> `BTC`.
///
/// Symbols without a separator are returned unchanged.
pub fn strip_quote(symbol: &str) -> &str {
    symbol
        .split_once(QUOTE_SEPARATOR)
        .map_or(symbol, |(base, _quote)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_token() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: variant prefix stripped
                input: "vETH",
                expected: "ETH",
            },
            TestCase {
                // TC1: wrapped alias
                input: "WSOSO",
                expected: "SOSO",
            },
            TestCase {
                // TC2: canonical alias is identity
                input: "SOSO",
                expected: "SOSO",
            },
            TestCase {
                // TC3: index token suffix dropped
                input: "MAG7.ssi",
                expected: "MAG7",
            },
            TestCase {
                // TC4: prefix stripped before aliasing
                input: "vMAG7.ssi",
                expected: "MAG7",
            },
            TestCase {
                // TC5: USDC maps to itself
                input: "USDC",
                expected: "USDC",
            },
            TestCase {
                // TC6: unknown symbol unchanged
                input: "BTC",
                expected: "BTC",
            },
            TestCase {
                // TC7: only a single leading prefix is stripped
                input: "vvBTC",
                expected: "vBTC",
            },
            TestCase {
                // TC8: prefix is case sensitive
                input: "VET",
                expected: "VET",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = normalize_token(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_strip_quote() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: quote suffix removed
                input: "BTC-USD",
                expected: "BTC",
            },
            TestCase {
                // TC1: only the first separator splits
                input: "MAG7-USD-PERP",
                expected: "MAG7",
            },
            TestCase {
                // TC2: no separator
                input: "ETH",
                expected: "ETH",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = strip_quote(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
