use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

#[derive(Parser, Debug)]
#[command(name = "tmtop")]
#[command(version = tmtop_common::consts::VERSION)]
#[command(
    about = "Observe the prevotes and precommits of a Tendermint validator set in real time."
)]
struct Cli {
    #[arg(
        long = "rpc-host",
        long_help = "Tendermint RPC endpoint of the node to observe",
        value_name = "URL",
        value_hint = clap::ValueHint::Url,
        default_value = "http://localhost:26657",
        env = "TMTOP_RPC_HOST"
    )]
    rpc_host: Url,

    #[arg(
        long = "lcd-host",
        long_help = r"Cosmos SDK REST (LCD) endpoint of the chain.

Required for the pending upgrade plan. Also the source of validator monikers unless '--provider-rpc-host' is set.",
        value_name = "URL",
        value_hint = clap::ValueHint::Url,
        env = "TMTOP_LCD_HOST"
    )]
    lcd_host: Option<Url>,

    #[arg(
        long = "provider-rpc-host",
        long_help = r"Cosmos SDK REST (LCD) endpoint of the provider chain.

Set this when observing a consumer chain. The staking metadata lives on the provider, so validator monikers are queried here instead of '--lcd-host'.",
        value_name = "URL",
        value_hint = clap::ValueHint::Url,
        env = "TMTOP_PROVIDER_RPC_HOST"
    )]
    provider_rpc_host: Option<Url>,

    #[arg(
        long = "refresh-rate",
        long_help = "Consensus state poll interval in seconds (can use fractions)",
        value_name = "SECONDS",
        default_value = "1",
        value_parser = parse_fractional_seconds,
        env = "TMTOP_REFRESH_RATE"
    )]
    refresh_rate: Duration,

    #[arg(
        long = "query-validators",
        long_help = "Query the staking module for validator metadata. Requires '--lcd-host' or '--provider-rpc-host'.",
        action = clap::ArgAction::Set,
        default_value = "true",
        env = "TMTOP_QUERY_VALIDATORS",
        value_name = "BOOL"
    )]
    query_validators: bool,

    #[arg(
        long = "validators-refresh-rate",
        long_help = "Validator metadata poll interval in seconds",
        value_name = "SECONDS",
        default_value = "60",
        value_parser = parse_fractional_seconds,
        env = "TMTOP_VALIDATORS_REFRESH_RATE"
    )]
    validators_refresh_rate: Duration,

    #[arg(
        long = "chain-info-refresh-rate",
        long_help = "Node status poll interval in seconds",
        value_name = "SECONDS",
        default_value = "300",
        value_parser = parse_fractional_seconds,
        env = "TMTOP_CHAIN_INFO_REFRESH_RATE"
    )]
    chain_info_refresh_rate: Duration,

    #[arg(
        long = "upgrade-refresh-rate",
        long_help = "Upgrade plan poll interval in seconds",
        value_name = "SECONDS",
        default_value = "1800",
        value_parser = parse_fractional_seconds,
        env = "TMTOP_UPGRADE_REFRESH_RATE"
    )]
    upgrade_refresh_rate: Duration,

    #[arg(
        long = "block-time-refresh-rate",
        long_help = "Average block time poll interval in seconds",
        value_name = "SECONDS",
        default_value = "30",
        value_parser = parse_fractional_seconds,
        env = "TMTOP_BLOCK_TIME_REFRESH_RATE"
    )]
    block_time_refresh_rate: Duration,

    #[arg(
        long = "request-timeout",
        long_help = "Timeout of a single HTTP request in seconds (can use fractions)",
        value_name = "SECONDS",
        default_value = "5",
        value_parser = parse_fractional_seconds,
        env = "TMTOP_REQUEST_TIMEOUT_SECONDS"
    )]
    request_timeout: Duration,

    #[arg(
        long = "monitor-address",
        long_help = "The address at which tmtop will serve health checks, metrics and the latest state",
        value_name = "IP:PORT",
        env = "TMTOP_MONITOR_ADDRESS"
    )]
    monitor_address: Option<SocketAddr>,

    #[arg(
        long = "color",
        long_help = "This flag controls when to use colors in the output.",
        default_value = "auto",
        env = "TMTOP_COLOR",
        value_name = "WHEN"
    )]
    color: Color,

    #[arg(
        long = "log-output-json",
        long_help = "Write logs as JSON objects, one per line.",
        action = clap::ArgAction::Set,
        default_value = "false",
        env = "TMTOP_LOG_OUTPUT_JSON",
        value_name = "BOOL"
    )]
    log_output_json: bool,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Auto,
    Never,
    Always,
}

impl Color {
    /// Returns true if color should be enabled, either because the setting is
    /// [Color::Always], or because it is [Color::Auto] and `stream` is a
    /// terminal.
    pub fn is_color_enabled(&self, stream: impl std::io::IsTerminal) -> bool {
        self.resolve(stream.is_terminal())
    }

    fn resolve(&self, is_terminal: bool) -> bool {
        match self {
            Color::Auto => is_terminal,
            Color::Never => false,
            Color::Always => true,
        }
    }
}

fn parse_fractional_seconds(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s
        .parse()
        .map_err(|_| "Expected a number (f64)".to_string())?;
    let duration = Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("Expected a positive number of seconds".to_string());
    }
    Ok(duration)
}

/// Poll intervals of the refresh cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intervals {
    pub consensus: Duration,
    pub chain_validators: Duration,
    pub chain_info: Duration,
    pub upgrade: Duration,
    pub block_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub rpc_host: Url,
    /// `None` disables the staking and upgrade queries.
    pub lcd_host: Option<Url>,
    /// Staking metadata source of a consumer chain, preferred over `lcd_host`.
    pub provider_rpc_host: Option<Url>,
    pub query_validators: bool,
    pub intervals: Intervals,
    pub request_timeout: Duration,
    pub monitor_address: Option<SocketAddr>,
    pub color: Color,
    pub log_output_json: bool,
}

impl Config {
    pub fn parse() -> Self {
        Cli::parse().into()
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::try_parse_from(args).map(Into::into)
    }

    /// REST endpoint the chain validators cycle queries, `None` when the
    /// cycle is off.
    pub fn chain_validators_host(&self) -> Option<&Url> {
        if !self.query_validators {
            return None;
        }
        self.provider_rpc_host.as_ref().or(self.lcd_host.as_ref())
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            rpc_host: cli.rpc_host,
            lcd_host: cli.lcd_host,
            provider_rpc_host: cli.provider_rpc_host,
            query_validators: cli.query_validators,
            intervals: Intervals {
                consensus: cli.refresh_rate,
                chain_validators: cli.validators_refresh_rate,
                chain_info: cli.chain_info_refresh_rate,
                upgrade: cli.upgrade_refresh_rate,
                block_time: cli.block_time_refresh_rate,
            },
            request_timeout: cli.request_timeout,
            monitor_address: cli.monitor_address,
            color: cli.color,
            log_output_json: cli.log_output_json,
        }
    }
}
