use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use rangeid::{PoolConfig, RangeLayout, RetryPolicy};

/// Scheme of the in-process coordinator, the only backend built in.
pub const MEMORY_SCHEME: &str = "memory://";

/// How the delay between coordination attempts evolves.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// Same delay between every attempt.
    Fixed,
    /// Delay doubles after each failure, up to `--connect-max-delay-ms`.
    Exponential,
}

/// Runtime configuration for the `rangeid-server` binary.
///
/// These settings describe the shared ID space, how each worker reaches the
/// coordination service and how the HTTP service runs. All values are parsed
/// from CLI arguments or environment variables.
///
/// Every instance of a cluster must agree on `max_limit`, `range_size` and
/// `pool_path`; the pool is created by whichever instance comes first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangeid-server",
    version,
    about = "An HTTP service issuing cluster-wide unique IDs from coordinated ranges"
)]
pub struct CliArgs {
    /// Upper bound (exclusive) of the ID space.
    ///
    /// Environment variable: `MAX_LIMIT`
    #[arg(long, env = "MAX_LIMIT", default_value_t = rangeid::DEFAULT_MAX_LIMIT)]
    pub max_limit: u64,

    /// Number of IDs in every range. Must divide `max_limit`.
    ///
    /// Environment variable: `RANGE_SIZE`
    #[arg(long, env = "RANGE_SIZE", default_value_t = rangeid::DEFAULT_RANGE_SIZE)]
    pub range_size: u64,

    /// Coordination path of the shared pool; app nodes live beneath it.
    ///
    /// Environment variable: `POOL_PATH`
    #[arg(long, env = "POOL_PATH", default_value_t = String::from(rangeid::DEFAULT_POOL_PATH))]
    pub pool_path: String,

    /// Coordination service endpoint.
    ///
    /// Environment variable: `COORDINATOR_ENDPOINT`
    #[arg(long = "coordinator", env = "COORDINATOR_ENDPOINT", default_value_t = String::from(rangeid::MEMORY_ENDPOINT))]
    pub coordinator_endpoint: String,

    /// Attempts made at each coordination round trip (including opening the
    /// session) while the service is unreachable.
    ///
    /// Environment variable: `CONNECT_RETRIES`
    #[arg(long, env = "CONNECT_RETRIES", default_value_t = rangeid::DEFAULT_CONNECT_ATTEMPTS)]
    pub connect_retries: u32,

    /// Base delay between attempts, in milliseconds.
    ///
    /// Environment variable: `CONNECT_RETRY_DELAY_MS`
    #[arg(long, env = "CONNECT_RETRY_DELAY_MS", default_value_t = 1_000)]
    pub connect_retry_delay_ms: u64,

    /// Backoff between attempts.
    ///
    /// Environment variable: `CONNECT_BACKOFF`
    #[arg(long, env = "CONNECT_BACKOFF", value_enum, default_value_t = BackoffKind::Fixed)]
    pub connect_backoff: BackoffKind,

    /// Longest wait between attempts under exponential backoff, in
    /// milliseconds.
    ///
    /// Environment variable: `CONNECT_MAX_DELAY_MS`
    #[arg(long, env = "CONNECT_MAX_DELAY_MS", default_value_t = 30_000)]
    pub connect_max_delay_ms: u64,

    /// Attempts at dequeuing a range before a lost race becomes an error.
    ///
    /// Environment variable: `CONFLICT_RETRIES`
    #[arg(long, env = "CONFLICT_RETRIES", default_value_t = rangeid::DEFAULT_CONFLICT_RETRIES)]
    pub conflict_retries: u32,

    /// Number of worker tasks. Each one is a separate instance with its own
    /// session and range.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 1)]
    pub num_workers: usize,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Seconds to wait for in-flight requests when shutting down.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
    pub coordinator_endpoint: String,
    pub num_workers: usize,
    pub server_addr: String,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let layout = RangeLayout::new(args.max_limit, args.range_size)?;

        if !args.coordinator_endpoint.starts_with(MEMORY_SCHEME) {
            bail!(
                "COORDINATOR_ENDPOINT `{}` is not supported (expected `{MEMORY_SCHEME}...`)",
                args.coordinator_endpoint
            );
        }

        if args.connect_retries == 0 {
            bail!("CONNECT_RETRIES must be greater than 0");
        }

        if args.conflict_retries == 0 {
            bail!("CONFLICT_RETRIES must be greater than 0");
        }

        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        // Every worker holds a range from the moment it starts.
        if args.num_workers as u64 > layout.range_count() {
            bail!(
                "NUM_WORKERS ({}) exceeds the number of ranges (max = {})",
                args.num_workers,
                layout.range_count()
            );
        }

        let delay = Duration::from_millis(args.connect_retry_delay_ms);
        let retry = match args.connect_backoff {
            BackoffKind::Fixed => RetryPolicy::fixed(args.connect_retries, delay),
            BackoffKind::Exponential => RetryPolicy::exponential(
                args.connect_retries,
                delay,
                Duration::from_millis(args.connect_max_delay_ms),
            ),
        };

        Ok(Self {
            pool: PoolConfig::new(args.pool_path, layout)
                .with_conflict_retries(args.conflict_retries),
            retry,
            coordinator_endpoint: args.coordinator_endpoint,
            num_workers: args.num_workers,
            server_addr: args.server_addr,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
