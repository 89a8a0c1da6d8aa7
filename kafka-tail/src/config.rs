use std::num::NonZeroUsize;
use std::time::Duration;

use clap::Parser;
use envconfig::Envconfig;

use crate::dispatch::DispatchMode;
use crate::error::ConfigError;
use crate::format::FormatOptions;
use crate::record::OffsetPolicy;

pub const DEFAULT_BROKER_PORT: u16 = 9092;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Print the records of a Kafka topic as they arrive", long_about = None)]
pub struct Cli {
    /// Topic to consume
    pub topic: String,

    /// Broker address as host[:port]; repeat the flag or separate entries with commas
    #[arg(
        long = "broker",
        visible_alias = "brokers",
        env = "KAFKA_HOSTS",
        value_delimiter = ',',
        default_value = "127.0.0.1:9092"
    )]
    pub brokers: Vec<String>,

    /// Start from the oldest retained record instead of only new ones
    #[arg(long)]
    pub from_beginning: bool,

    /// Client identifier presented to the brokers
    #[arg(long, env = "KAFKA_GROUP", default_value = "kafka-tail")]
    pub group: String,

    /// Partition to read
    #[arg(long, default_value_t = 0)]
    pub partition: i32,

    /// Print JSON payloads exactly as received
    #[arg(long, visible_alias = "disable-json-pretty")]
    pub no_pretty_json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Render records on a pool of workers fed in round-robin order
    #[arg(short, long)]
    pub concurrent: bool,

    /// Size of the worker pool; implies --concurrent [default: available parallelism]
    #[arg(short, long)]
    pub workers: Option<NonZeroUsize>,

    /// Debug logging with source locations, and list topics at startup
    #[arg(short, long)]
    pub verbose: bool,
}

/// librdkafka settings that rarely change between invocations.
#[derive(Envconfig, Clone, Debug)]
pub struct KafkaClientConfig {
    #[envconfig(from = "KAFKA_TLS", default = "false")]
    pub kafka_tls: bool,

    #[envconfig(from = "KAFKA_VERIFY_SSL_CERTIFICATE", default = "false")]
    pub verify_ssl_certificate: bool,

    #[envconfig(from = "KAFKA_SESSION_TIMEOUT_MS", default = "6000")]
    pub session_timeout_ms: u32,

    #[envconfig(from = "KAFKA_METADATA_TIMEOUT_MS", default = "10000")]
    pub metadata_timeout_ms: u64,
}

impl KafkaClientConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

impl Default for KafkaClientConfig {
    fn default() -> Self {
        Self {
            kafka_tls: false,
            verify_ssl_certificate: false,
            session_timeout_ms: 6000,
            metadata_timeout_ms: 10000,
        }
    }
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub topic: String,
    pub brokers: Vec<String>,
    pub group: String,
    pub partition: i32,
    pub offset_policy: OffsetPolicy,
    pub format: FormatOptions,
    pub dispatch: DispatchMode,
    pub verbose: bool,
    pub client: KafkaClientConfig,
}

impl Config {
    /// Combine the command line with client settings read from the environment.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let client = KafkaClientConfig::init_from_env()?;
        Self::from_cli(cli, client)
    }

    pub fn from_cli(cli: Cli, client: KafkaClientConfig) -> Result<Self, ConfigError> {
        let brokers = cli
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .map(normalize_broker)
            .collect::<Result<Vec<_>, _>>()?;
        if brokers.is_empty() {
            return Err(ConfigError::NoBrokers);
        }

        let dispatch = match (cli.concurrent, cli.workers) {
            (_, Some(workers)) => DispatchMode::RoundRobin { workers },
            (true, None) => DispatchMode::RoundRobin {
                workers: default_workers(),
            },
            (false, None) => DispatchMode::Inline,
        };

        Ok(Self {
            topic: cli.topic,
            brokers,
            group: cli.group,
            partition: cli.partition,
            offset_policy: OffsetPolicy::from_beginning(cli.from_beginning),
            format: FormatOptions {
                pretty_json: !cli.no_pretty_json,
                color: !cli.no_color,
            },
            dispatch,
            verbose: cli.verbose,
            client,
        })
    }

    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

/// Worker count used when `--concurrent` is given without `--workers`.
pub fn default_workers() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to determine available parallelism, falling back to 1");
        NonZeroUsize::MIN
    })
}

/// Turn `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 address into `host:port`.
pub fn normalize_broker(raw: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidBroker(raw.to_string());
    let addr = raw.trim();
    if addr.is_empty() || addr.contains(char::is_whitespace) {
        return Err(invalid());
    }

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        return match tail {
            "" => Ok(format!("[{host}]:{DEFAULT_BROKER_PORT}")),
            _ => {
                let port = tail.strip_prefix(':').ok_or_else(invalid)?;
                parse_port(port).ok_or_else(invalid)?;
                Ok(addr.to_string())
            }
        };
    }

    match addr.split_once(':') {
        None => Ok(format!("{addr}:{DEFAULT_BROKER_PORT}")),
        // More than one colon and no brackets: a bare IPv6 address.
        Some((_, rest)) if rest.contains(':') => Ok(format!("[{addr}]:{DEFAULT_BROKER_PORT}")),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(invalid());
            }
            parse_port(port).ok_or_else(invalid)?;
            Ok(addr.to_string())
        }
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|p| *p != 0)
}
