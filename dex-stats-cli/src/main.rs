use clap::{Parser, Subcommand};
use dex_stats::{config::UpstreamConfig, service::StatsService};
use serde::Serialize;
use std::error::Error;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dex-stats-cli")]
#[command(about = "Query trading statistics from the DEX upstream APIs")]
#[command(
    after_help = "Upstreams are read from DEX_PERPS_URL, DEX_SPOT_URL, DEX_FALLBACK_URL and DEX_PNL_URL."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// One query to run against the upstreams.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Total USD balance across the spot and futures books
    Balance {
        #[arg(value_parser = parse_user_id)]
        user_id: String,
    },
    /// Total USD balance with the per-token breakdown
    Detailed {
        #[arg(value_parser = parse_user_id)]
        user_id: String,
    },
    /// PnL overview from the internal PnL service
    Pnl {
        #[arg(value_parser = parse_user_id)]
        user_id: String,
    },
    /// Every open position on the exchange
    Positions,
    /// Market metadata keyed by symbol id
    Symbols,
    /// Open position statistics per market, largest notional first
    Markets,
}

fn parse_user_id(raw: &str) -> Result<String, String> {
    let user_id = raw.trim();
    if user_id.is_empty() {
        Err("user id must not be blank".to_string())
    } else {
        Ok(user_id.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let Cli { command } = Cli::parse();

    let config = UpstreamConfig::from_env()?;
    info!(
        perps_url = %config.perps_url,
        spot_url = %config.spot_url,
        cache_ttl = ?config.cache_ttl,
        ?command,
        "running query"
    );

    let service = StatsService::from_config(config)?;

    match command {
        Command::Balance { user_id } => print_json(&service.fetch_total_balance(&user_id).await?),
        Command::Detailed { user_id } => {
            print_json(&service.fetch_detailed_balance(&user_id).await?)
        }
        Command::Pnl { user_id } => print_json(&*service.fetch_pnl_overview(&user_id).await?),
        Command::Positions => print_json(&*service.fetch_all_positions().await?),
        Command::Symbols => print_json(&*service.fetch_symbols().await?),
        Command::Markets => print_json(&service.fetch_market_summary().await?),
    }
}

fn print_json<T>(value: &T) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
{
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        struct TestCase {
            args: &'static [&'static str],
            expected: Option<Command>,
        }

        let tests = vec![
            TestCase {
                // TC0: user scoped command
                args: &["balance", "1234"],
                expected: Some(Command::Balance {
                    user_id: "1234".to_string(),
                }),
            },
            TestCase {
                // TC1: surrounding whitespace trimmed
                args: &["pnl", " 0xabc "],
                expected: Some(Command::Pnl {
                    user_id: "0xabc".to_string(),
                }),
            },
            TestCase {
                // TC2: global command
                args: &["markets"],
                expected: Some(Command::Markets),
            },
            TestCase {
                // TC3: global command rejects trailing args
                args: &["symbols", "extra"],
                expected: None,
            },
            TestCase {
                // TC4: missing user id
                args: &["pnl"],
                expected: None,
            },
            TestCase {
                // TC5: blank user id
                args: &["detailed", " "],
                expected: None,
            },
            TestCase {
                // TC6: unknown command
                args: &["orders"],
                expected: None,
            },
            TestCase {
                // TC7: no command
                args: &[],
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let args = std::iter::once("dex-stats-cli").chain(test.args.iter().copied());
            let actual = Cli::try_parse_from(args).ok().map(|cli| cli.command);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
