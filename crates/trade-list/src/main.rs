mod machine;
mod queries;
mod types;
use crate::machine::{Output, TradeList};
use crate::types::Trade;
use crate::queries::{
    DEFAULT_APP, DEFAULT_ORDER_BY, DEFAULT_STATUS, DEFAULT_TIMESTAMP, OPERATION_NAME, QUERY_HASH,
    QUERY_VERSION, TradeFilter, TradeListQuery,
};
use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use rollql::{
    Client, ClientConfig, Cursor, DEFAULT_USER_AGENT, GRAPHQL_API_URL, PersistedQuery,
    QueryError, Transport,
};
use std::error::Error;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::time::{Duration, Instant};

/// Page through the trade listings on csgoroll.com and print the items in each
/// trade
#[derive(Clone, Debug, Eq, Parser, PartialEq)]
struct Arguments {
    /// Start listing after the given pagination cursor
    #[arg(long, value_name = "CURSOR")]
    after: Option<String>,

    /// Value of the `steamAppName` variable
    #[arg(long, default_value = DEFAULT_APP, value_name = "NAME")]
    app: String,

    /// GraphQL endpoint to query
    #[arg(long, default_value = GRAPHQL_API_URL, value_name = "URL")]
    endpoint: String,

    /// Logging level
    #[arg(
        short,
        long,
        default_value = "INFO",
        value_name = "OFF|ERROR|WARN|INFO|DEBUG|TRACE"
    )]
    log_level: LevelFilter,

    /// Name of the persisted operation to run
    #[arg(long, default_value = OPERATION_NAME, value_name = "NAME")]
    operation_name: String,

    /// Sort order for the listing
    #[arg(long, default_value = DEFAULT_ORDER_BY, value_name = "KEY")]
    order_by: String,

    /// Number of trades to request per page of results
    #[arg(short = 'P', long, default_value = "50")]
    page_size: NonZeroUsize,

    /// SHA-256 hash identifying the persisted query
    #[arg(long, default_value = QUERY_HASH, value_name = "HASH")]
    query_hash: String,

    /// Also show each item's price and its markup relative to the market
    #[arg(long)]
    show_prices: bool,

    /// Only list trades with the given status
    #[arg(long, default_value = DEFAULT_STATUS)]
    status: String,

    /// Value of the `t` variable expected by the persisted query
    #[arg(short = 't', long, default_value = DEFAULT_TIMESTAMP)]
    timestamp: String,

    /// Give up on a request that takes longer than the given duration
    /// (e.g., "30s")
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    timeout: Option<Duration>,

    /// Send the given bearer token in an `Authorization` header
    #[arg(long, env = "CSGOROLL_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Value of the `User-Agent` header
    #[arg(long, default_value = DEFAULT_USER_AGENT, value_name = "STRING")]
    user_agent: String,
}

impl Arguments {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            token: self.token.clone(),
            timeout: self.timeout,
        }
    }

    fn query(&self) -> TradeListQuery {
        TradeListQuery {
            operation_name: self.operation_name.clone(),
            persisted_query: PersistedQuery {
                version: QUERY_VERSION,
                sha256_hash: self.query_hash.clone(),
            },
            filter: TradeFilter {
                page_size: self.page_size,
                order_by: self.order_by.clone(),
                status: self.status.clone(),
                app: self.app.clone(),
                timestamp: self.timestamp.clone(),
            },
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Arguments::parse();
    // Log records and trade lines share stdout so that progress messages
    // appear between the pages they separate.
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .target(env_logger::Target::Stdout)
        .init();
    let client = Client::new(args.client_config())?;
    let machine = TradeList::new(args.query(), args.after.clone().map(Cursor::from));

    let start = Instant::now();
    for r in client.run(machine) {
        match r {
            Ok(Output::Trade(trade)) => write_trade(io::stdout(), &trade, args.show_prices)?,
            Ok(Output::NextPage) => log::info!("Fetching next page …"),
            Ok(Output::Report(report)) => {
                log::info!("{report} in {:?}", start.elapsed());
            }
            Err(e) => {
                report_failure(io::stdout(), &e)?;
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Write one trade's lines and flush them, so that nothing is held back
/// behind a later log record
fn write_trade<W: Write>(mut out: W, trade: &Trade, show_prices: bool) -> anyhow::Result<()> {
    let r = if show_prices {
        write!(out, "{trade:#}")
    } else {
        write!(out, "{trade}")
    };
    r.context("failed to write to stdout")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

/// Log why fetching stopped; for a malformed response, also dump the
/// offending document to stdout
fn report_failure<W: Write>(mut out: W, e: &QueryError) -> anyhow::Result<()> {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    log::error!("{:?} failure: {msg}", e.kind());
    if let Some(doc) = e.document() {
        let dump = serde_json::to_string_pretty(doc).context("failed to render response")?;
        writeln!(out, "{dump}").context("failed to write to stdout")?;
    }
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn validate_cli() {
        Arguments::command().debug_assert();
    }

    #[test]
    fn default_arguments() {
        let args = Arguments::try_parse_from(["trade-list"]).unwrap();
        assert_eq!(args.query(), TradeListQuery::default());
        assert_eq!(args.after, None);
        assert!(!args.show_prices);
        let config = args.client_config();
        assert_eq!(config.endpoint, GRAPHQL_API_URL);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn override_arguments() {
        let args = Arguments::try_parse_from([
            "trade-list",
            "--after",
            "C7",
            "-P",
            "10",
            "--order-by",
            "NEWEST",
            "-t",
            "1700000000000",
            "--timeout",
            "30s",
            "--show-prices",
        ])
        .unwrap();
        assert_eq!(args.after.as_deref(), Some("C7"));
        assert!(args.show_prices);
        let query = args.query();
        assert_eq!(query.filter.page_size.get(), 10);
        assert_eq!(query.filter.order_by, "NEWEST");
        assert_eq!(query.filter.timestamp, "1700000000000");
        assert_eq!(query.filter.status, DEFAULT_STATUS);
        assert_eq!(args.client_config().timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_page_size() {
        assert!(Arguments::try_parse_from(["trade-list", "--page-size", "0"]).is_err());
    }

    #[test]
    fn write_trade_lines() {
        let trade = Trade {
            id: String::from("T1"),
            items: vec![types::TradeItem {
                market_name: Some(String::from("AWP | Asiimov")),
                value: serde_json::Number::from_f64(88.25),
                markup_percent: None,
            }],
        };
        let mut out = Vec::new();
        write_trade(&mut out, &trade, false).unwrap();
        write_trade(&mut out, &trade, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Trade ID: T1\n - AWP | Asiimov\nTrade ID: T1\n - AWP | Asiimov\n   Price: 88.25\n\n"
        );
    }

    #[test]
    fn dump_document_on_shape_failure() {
        let e = QueryError::Shape {
            error: rollql::Node::root(&serde_json::json!({}))
                .get("data")
                .unwrap_err(),
            document: Box::new(serde_json::json!({"oops": [1]})),
        };
        let mut out = Vec::new();
        report_failure(&mut out, &e).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n  \"oops\": [\n    1\n  ]\n}\n"
        );
    }

    #[test]
    fn no_dump_on_status_failure() {
        let e = QueryError::Status {
            status: 502,
            body: String::from("Bad Gateway"),
        };
        let mut out = Vec::new();
        report_failure(&mut out, &e).unwrap();
        assert!(out.is_empty());
    }
}
