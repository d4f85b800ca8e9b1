use anyhow::bail;
use bulker::AccumulatorOptions;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `bulker-loadgen` binary.
///
/// The first group of settings configures the accumulator under test, the
/// second shapes the load, and the last one the simulated bulk store. All
/// values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bulker-loadgen",
    version,
    about = "Drive a bulker accumulator with concurrent single-item submitters"
)]
pub struct CliArgs {
    /// Number of submissions that close a batch.
    ///
    /// Environment variable: `MAX_BATCH_SIZE`
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 100)]
    pub max_batch_size: usize,

    /// Milliseconds a batch stays open after its first submission.
    ///
    /// Environment variable: `WINDOW_MS`
    #[arg(long, env = "WINDOW_MS", default_value_t = 50)]
    pub window_ms: u64,

    /// Fail the whole batch on error instead of retrying items one by one.
    ///
    /// Environment variable: `NO_FALLBACK`
    #[arg(long, env = "NO_FALLBACK", default_value_t = false)]
    pub no_fallback: bool,

    /// Number of concurrent submitters. Each keeps one request in flight.
    ///
    /// Environment variable: `NUM_CLIENTS`
    #[arg(long, env = "NUM_CLIENTS", default_value_t = 64)]
    pub num_clients: usize,

    /// Number of requests each submitter sends before it stops.
    ///
    /// Environment variable: `REQUESTS_PER_CLIENT`
    #[arg(long, env = "REQUESTS_PER_CLIENT", default_value_t = 1000)]
    pub requests_per_client: u64,

    /// Every SKU divisible by this value is rejected by the store, which
    /// fails any batch containing it. `0` disables invalid SKUs.
    ///
    /// Environment variable: `INVALID_EVERY`
    #[arg(long, env = "INVALID_EVERY", default_value_t = 0)]
    pub invalid_every: u64,

    /// Milliseconds a submitter waits for a result before giving up. `0`
    /// waits indefinitely.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 0)]
    pub request_timeout_ms: u64,

    /// Fixed cost of one bulk call against the store, in milliseconds.
    ///
    /// Environment variable: `CALL_LATENCY_MS`
    #[arg(long, env = "CALL_LATENCY_MS", default_value_t = 5)]
    pub call_latency_ms: u64,

    /// Additional cost per item of a bulk call, in microseconds.
    ///
    /// Environment variable: `ITEM_LATENCY_US`
    #[arg(long, env = "ITEM_LATENCY_US", default_value_t = 10)]
    pub item_latency_us: u64,
}

/// Settings of the simulated bulk store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub invalid_every: Option<u64>,
    pub call_latency: Duration,
    pub item_latency: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub accumulator: AccumulatorOptions,
    pub store: StoreConfig,
    pub num_clients: usize,
    pub requests_per_client: u64,
    pub request_timeout: Option<Duration>,
}

impl LoadConfig {
    /// Total number of requests the run submits if it is not interrupted.
    pub fn total_requests(&self) -> u64 {
        self.num_clients as u64 * self.requests_per_client
    }
}

impl TryFrom<CliArgs> for LoadConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_clients == 0 {
            bail!("NUM_CLIENTS must be greater than 0");
        }

        if args.requests_per_client == 0 {
            bail!("REQUESTS_PER_CLIENT must be greater than 0");
        }

        if (args.num_clients as u64)
            .checked_mul(args.requests_per_client)
            .is_none()
        {
            bail!("NUM_CLIENTS * REQUESTS_PER_CLIENT overflows the SKU space");
        }

        let accumulator = AccumulatorOptions::new()
            .with_max_batch_size(args.max_batch_size)
            .with_window(Duration::from_millis(args.window_ms))
            .with_fallback_to_single_on_error(!args.no_fallback);
        accumulator.validate()?;

        Ok(Self {
            accumulator,
            store: StoreConfig {
                invalid_every: (args.invalid_every > 0).then_some(args.invalid_every),
                call_latency: Duration::from_millis(args.call_latency_ms),
                item_latency: Duration::from_micros(args.item_latency_us),
            },
            num_clients: args.num_clients,
            requests_per_client: args.requests_per_client,
            request_timeout: (args.request_timeout_ms > 0)
                .then(|| Duration::from_millis(args.request_timeout_ms)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<LoadConfig> {
        let argv = std::iter::once("bulker-loadgen").chain(args.iter().copied());
        let args = CliArgs::try_parse_from(argv)?;
        LoadConfig::try_from(args)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.accumulator, AccumulatorOptions::default());
        assert_eq!(config.num_clients, 64);
        assert_eq!(config.total_requests(), 64_000);
        assert_eq!(config.store.invalid_every, None);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn flags_map_onto_options() {
        let config = parse(&[
            "--max-batch-size",
            "8",
            "--window-ms",
            "2",
            "--no-fallback",
            "--invalid-every",
            "10",
            "--request-timeout-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(config.accumulator.max_batch_size, 8);
        assert_eq!(config.accumulator.window, Duration::from_millis(2));
        assert!(!config.accumulator.fallback_to_single_on_error);
        assert_eq!(config.store.invalid_every, Some(10));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--num-clients", "0"]).is_err());
        assert!(parse(&["--requests-per-client", "0"]).is_err());
        assert!(parse(&["--max-batch-size", "0"]).is_err());
        assert!(parse(&["--window-ms", "0"]).is_err());
    }
}
