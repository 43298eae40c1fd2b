//! Load patterns and the top-level benchmark run.
//!
//! Every pattern captures its start instant right before issuing work and
//! stops the clock when the last result is observed. A pattern with zero
//! requests issues nothing and reports [`BenchmarkResult::empty`].

use crate::bench::{
    config::{BenchConfig, MAX_REQUESTS, Transport},
    report::{BenchmarkResult, Pattern},
    session::ObjectSession,
    transport::{self, FetchOutcome, HttpFetcher, ObjectFetcher, UnaryFetcher},
};
use core::future::Future;
use objwire_core::{
    Error, Result,
    proto::{ObjectIdentifier, object_accessor_client::ObjectAccessorClient},
};
use std::time::{Duration, Instant};
use tokio::{sync::mpsc, task::JoinSet, time::timeout};
use tonic::transport::Channel;

/// Issues `requests` fetches one after another.
///
/// Only the size of the last response is kept.
pub async fn run_serial<F: ObjectFetcher>(
    fetcher: &F,
    transport: Transport,
    requests: usize,
) -> Result<BenchmarkResult> {
    if requests == 0 {
        return Ok(BenchmarkResult::empty(Pattern::Serial, transport));
    }

    let start = Instant::now();
    let mut last = None;
    for _ in 0..requests {
        last = Some(fetcher.fetch().await?.size);
    }
    let elapsed = start.elapsed();

    Ok(BenchmarkResult::new(
        Pattern::Serial,
        transport,
        requests,
        last,
        elapsed,
    ))
}

/// Issues `requests` fetches concurrently, one task each, sharing `fetcher`.
///
/// Results are collected through a channel with room for every task, so no
/// producer ever waits on the consumer. The run completes once exactly
/// `requests` results arrived. The first failure aborts the remaining tasks
/// and fails the run.
pub async fn run_fan_out<F: ObjectFetcher>(
    fetcher: &F,
    transport: Transport,
    requests: usize,
) -> Result<BenchmarkResult> {
    if requests == 0 {
        return Ok(BenchmarkResult::empty(Pattern::FanOut, transport));
    }
    if requests > MAX_REQUESTS {
        return Err(Error::InvalidConfig {
            reason: format!("fan-out is limited to {MAX_REQUESTS} requests, got {requests}"),
        });
    }

    let (result_tx, mut result_rx) = mpsc::channel::<Result<FetchOutcome>>(requests);
    let mut tasks = JoinSet::new();

    let start = Instant::now();
    for _ in 0..requests {
        let fetcher = fetcher.clone();
        let result_tx = result_tx.clone();
        tasks.spawn(async move {
            let _ = result_tx.send(fetcher.fetch().await).await;
        });
    }
    drop(result_tx);

    let mut received = 0;
    let mut last = None;
    while let Some(result) = result_rx.recv().await {
        match result {
            Ok(outcome) => {
                received += 1;
                last = Some(outcome.size);
                if received == requests {
                    break;
                }
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }
    let elapsed = start.elapsed();

    if received != requests {
        // Every sender is gone without delivering: a task panicked.
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| Error::transport(format!("fetch task failed: {e}")))?;
        }
        return Err(Error::ProtocolViolation {
            expected: requests as u64,
            observed: received as u64,
        });
    }

    Ok(BenchmarkResult::new(
        Pattern::FanOut,
        transport,
        requests,
        last,
        elapsed,
    ))
}

/// Responses counted by the pipeline receiver.
#[derive(Debug, Default)]
struct Tally {
    count: usize,
    last: Option<usize>,
    /// When the `expected`-th response arrived.
    completed_at: Option<Instant>,
}

impl Tally {
    fn record(&mut self, size: usize, expected: usize) {
        self.count += 1;
        self.last = Some(size);
        if self.count == expected {
            self.completed_at = Some(Instant::now());
        }
    }
}

/// Picks the error to report when both halves of a pipeline finished.
///
/// A transport failure seen by the sender closes the session for the
/// receiver, which then only observes `SessionClosed`; the sender's
/// `StreamAborted` is the cause and wins. Otherwise a receive-side failure
/// explains a send-side one and is reported first.
fn settle(drained: Result<Tally>, sent: Result<()>) -> Result<Tally> {
    match (drained, sent) {
        (_, Err(e @ Error::StreamAborted { .. })) => Err(e),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        (Ok(tally), Ok(())) => Ok(tally),
    }
}

/// Pipelines `requests` identifiers through one streaming session.
///
/// A receiver task drains responses while this task sends every identifier
/// and then closes the send side. The run completes when the receiver saw
/// exactly `requests` responses followed by end-of-stream.
///
/// The clock starts once the session is open and stops at the last expected
/// response, not at end-of-stream.
pub async fn run_pipeline(
    mut client: ObjectAccessorClient<Channel>,
    requests: usize,
    buffer: usize,
    verify: bool,
) -> Result<BenchmarkResult> {
    if requests == 0 {
        return Ok(BenchmarkResult::empty(Pattern::Pipeline, Transport::Stream));
    }

    let (mut sender, mut receiver) = ObjectSession::open(&mut client, buffer).await?;

    let start = Instant::now();
    let mut reader = JoinSet::new();
    reader.spawn(async move {
        let mut tally = Tally::default();
        while let Some(response) = receiver.receive().await? {
            tally.record(transport::outcome(response, verify)?.size, requests);
        }
        Ok::<_, Error>(tally)
    });

    let mut sent = Ok(());
    for _ in 0..requests {
        sent = sender.send(ObjectIdentifier::benchmark()).await;
        if sent.is_err() {
            break;
        }
    }
    if sent.is_ok() {
        sent = sender.close_send();
    }

    let drained = match reader.join_next().await {
        Some(joined) => {
            joined.map_err(|e| Error::transport(format!("receiver task failed: {e}")))?
        }
        None => Err(Error::SessionClosed),
    };

    let tally = settle(drained, sent)?;
    if tally.count != requests {
        return Err(Error::ProtocolViolation {
            expected: requests as u64,
            observed: tally.count as u64,
        });
    }
    let elapsed = tally
        .completed_at
        .map_or_else(|| start.elapsed(), |at| at.duration_since(start));

    Ok(BenchmarkResult::new(
        Pattern::Pipeline,
        Transport::Stream,
        requests,
        tally.last,
        elapsed,
    ))
}

/// Bounds `fut` by `deadline`, if any.
pub async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| Error::DeadlineExceeded {
                secs: limit.as_secs(),
            })?,
        None => fut.await,
    }
}

/// Runs every pattern selected by `config`, in order: HTTP, unary gRPC, then
/// streaming gRPC. Each pattern opens its own connection.
///
/// Results are logged as they complete. The first failing pattern stops the
/// run.
pub async fn run(config: &BenchConfig) -> Result<Vec<BenchmarkResult>> {
    let mut results = Vec::new();
    let mut record = |result: BenchmarkResult| {
        tracing::info!("{result}");
        results.push(result);
    };

    if config.protocol.includes(Transport::Http) {
        if config.mode.serial() {
            let fetcher = HttpFetcher::new(&config.http_url, config.verify)?;
            record(
                with_deadline(
                    config.deadline,
                    run_serial(&fetcher, Transport::Http, config.requests),
                )
                .await?,
            );
        }
        if config.mode.parallel() {
            let fetcher = HttpFetcher::new(&config.http_url, config.verify)?;
            record(
                with_deadline(
                    config.deadline,
                    run_fan_out(&fetcher, Transport::Http, config.requests),
                )
                .await?,
            );
        }
    }

    if config.protocol.includes(Transport::Unary) {
        if config.mode.serial() {
            let fetcher = UnaryFetcher::new(transport::connect(&config.grpc).await?, config.verify);
            record(
                with_deadline(
                    config.deadline,
                    run_serial(&fetcher, Transport::Unary, config.requests),
                )
                .await?,
            );
        }
        if config.mode.parallel() {
            let fetcher = UnaryFetcher::new(transport::connect(&config.grpc).await?, config.verify);
            record(
                with_deadline(
                    config.deadline,
                    run_fan_out(&fetcher, Transport::Unary, config.requests),
                )
                .await?,
            );
        }
    }

    if config.protocol.includes(Transport::Stream) {
        let client = transport::connect(&config.grpc).await?;
        record(
            with_deadline(
                config.deadline,
                run_pipeline(
                    client,
                    config.requests,
                    config.stream_buffer_size,
                    config.verify,
                ),
            )
            .await?,
        );
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    /// Answers with a fixed size after a per-call delay; fails on the call
    /// numbered `fail_at`, if set.
    #[derive(Clone)]
    struct MockFetcher {
        calls: Arc<AtomicUsize>,
        fail_at: Option<usize>,
        delays_ms: Arc<Vec<u64>>,
    }

    impl MockFetcher {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_at: None,
                delays_ms: Arc::new(delays_ms),
            }
        }

        fn failing_at(mut self, call: usize) -> Self {
            self.fail_at = Some(call);
            self
        }
    }

    impl ObjectFetcher for MockFetcher {
        async fn fetch(&self) -> Result<FetchOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays_ms.get(call).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.fail_at == Some(call) {
                return Err(Error::transport("connection reset"));
            }
            Ok(FetchOutcome {
                size: 10,
                fingerprint: "781e5e245d69b566979b86e28d23f2c7".to_string(),
                mtime: "Thu, 01 Jan 1970 00:00:00 GMT".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn fan_out_completes_after_exactly_n_results() -> Result<()> {
        // Completion order differs from spawn order.
        let fetcher = MockFetcher::new(vec![50, 10, 40, 0, 20]);
        let result = run_fan_out(&fetcher, Transport::Http, 5).await?;

        assert_eq!(result.requests, 5);
        assert_eq!(result.bytes_observed, Some(10));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.label, "parallel http");
        Ok(())
    }

    #[tokio::test]
    async fn fan_out_fails_on_first_error() {
        let fetcher = MockFetcher::new(vec![200, 200, 0, 200]).failing_at(2);
        let start = Instant::now();
        let result = run_fan_out(&fetcher, Transport::Unary, 4).await;

        assert!(matches!(result, Err(Error::Transport { .. })));
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn serial_keeps_last_size_and_stops_on_error() -> Result<()> {
        let fetcher = MockFetcher::new(vec![]);
        let result = run_serial(&fetcher, Transport::Http, 3).await?;
        assert_eq!(result.bytes_observed, Some(10));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

        let fetcher = MockFetcher::new(vec![]).failing_at(1);
        let result = run_serial(&fetcher, Transport::Http, 5).await;
        assert!(matches!(result, Err(Error::Transport { .. })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn zero_requests_report_the_sentinel() -> Result<()> {
        let fetcher = MockFetcher::new(vec![]);

        let serial = run_serial(&fetcher, Transport::Http, 0).await?;
        let fan_out = run_fan_out(&fetcher, Transport::Http, 0).await?;
        for result in [serial, fan_out] {
            assert_eq!(result.bytes_observed, None);
            assert_eq!(result.elapsed, Duration::ZERO);
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn fan_out_rejects_more_requests_than_the_collector_can_hold() {
        let fetcher = MockFetcher::new(vec![]);
        let result = run_fan_out(&fetcher, Transport::Http, MAX_REQUESTS + 1).await;

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sender_abort_cause_wins_over_receiver_closed() {
        let result = settle(
            Err(Error::SessionClosed),
            Err(Error::stream_aborted("request stream closed by transport")),
        );
        assert!(matches!(result, Err(Error::StreamAborted { .. })));
    }

    #[test]
    fn receiver_failure_explains_sender_closed() {
        let result = settle(
            Err(Error::ContentUnavailable {
                reason: "missing".to_string(),
            }),
            Err(Error::SessionClosed),
        );
        assert!(matches!(result, Err(Error::ContentUnavailable { .. })));

        let result = settle(Ok(Tally::default()), Err(Error::SessionClosed));
        assert!(matches!(result, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn pipeline_clock_stops_at_the_last_expected_response() {
        let mut tally = Tally::default();
        tally.record(10, 2);
        assert!(tally.completed_at.is_none());

        tally.record(10, 2);
        let completed_at = tally.completed_at;
        assert!(completed_at.is_some());

        // Anything observed afterwards does not move the stop instant.
        tokio::time::sleep(Duration::from_millis(5)).await;
        tally.record(10, 2);
        assert_eq!(tally.completed_at, completed_at);
        assert_eq!(tally.count, 3);
    }

    #[tokio::test]
    async fn deadline_bounds_a_stalled_pattern() {
        let fetcher = MockFetcher::new(vec![5_000]);
        let result = with_deadline(
            Some(Duration::from_millis(50)),
            run_serial(&fetcher, Transport::Http, 1),
        )
        .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
    }
}
