use crate::config::LoadConfig;
use crate::store::StoreError;
use crate::telemetry::{
    increment_request_errors, increment_requests, increment_requests_cancelled,
    record_request_latency,
};
use bulker::{Accumulate, CancellationToken, Error};
use core::time::Duration;
use tokio::time::Instant;

/// How a single submission ended, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Failed,
    Cancelled,
    TimedOut,
    Shutdown,
}

/// Aggregated outcome counts of a load run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadReport {
    pub ok: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub shutdown: u64,
    pub elapsed: Duration,
}

impl LoadReport {
    /// Number of submissions that reached a terminal state.
    pub fn total(&self) -> u64 {
        self.ok + self.failed + self.cancelled + self.timed_out + self.shutdown
    }

    /// Settled submissions per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.total() as f64 / secs
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Ok => self.ok += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::Shutdown => self.shutdown += 1,
        }
    }

    fn merge(&mut self, other: &LoadReport) {
        self.ok += other.ok;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.timed_out += other.timed_out;
        self.shutdown += other.shutdown;
    }
}

/// Runs `config.num_clients` submitters against `accumulator` until each has
/// sent `config.requests_per_client` requests or `stop` fires.
///
/// Every client keeps exactly one request in flight, so the accumulator sees
/// at most `num_clients` concurrent submissions. SKUs are unique across the
/// run and start at 1.
pub async fn run_load<A>(accumulator: A, config: &LoadConfig, stop: CancellationToken) -> LoadReport
where
    A: Accumulate<u64, Output = u64, Error = StoreError> + Clone + Send + Sync + 'static,
{
    let started = Instant::now();
    let num_clients = config.num_clients as u64;

    let clients = (0..num_clients).map(|client| {
        let accumulator = accumulator.clone();
        let stop = stop.clone();
        let requests = config.requests_per_client;
        let timeout = config.request_timeout;
        tokio::spawn(async move {
            let mut report = LoadReport::default();
            for i in 0..requests {
                if stop.is_cancelled() {
                    break;
                }
                let sku = i * num_clients + client + 1;
                report.record(submit_one(&accumulator, sku, timeout, &stop).await);
            }
            report
        })
    });

    let mut report = LoadReport::default();
    for result in futures::future::join_all(clients).await {
        match result {
            Ok(client_report) => report.merge(&client_report),
            Err(e) => tracing::warn!("Load client task failed: {e}"),
        }
    }
    report.elapsed = started.elapsed();
    report
}

async fn submit_one<A>(
    accumulator: &A,
    sku: u64,
    timeout: Option<Duration>,
    stop: &CancellationToken,
) -> Outcome
where
    A: Accumulate<u64, Output = u64, Error = StoreError>,
{
    let started = Instant::now();
    increment_requests();
    let submission = accumulator.execute(sku, Some(stop.clone()));

    let result = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, submission).await {
            Ok(result) => result,
            Err(_) => {
                increment_requests_cancelled();
                return Outcome::TimedOut;
            }
        },
        None => submission.await,
    };
    record_request_latency(started.elapsed().as_secs_f64() * 1_000.0);

    match result {
        Ok(_version) => Outcome::Ok,
        Err(Error::Cancelled) => {
            increment_requests_cancelled();
            Outcome::Cancelled
        }
        Err(Error::Shutdown) => {
            increment_requests_cancelled();
            Outcome::Shutdown
        }
        Err(e) => {
            increment_request_errors();
            tracing::trace!(sku, "Request failed: {e}");
            Outcome::Failed
        }
    }
}
