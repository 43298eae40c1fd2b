use crate::bench::config::Transport;
use core::fmt;
use std::time::Duration;

/// How requests are issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// One request after another.
    Serial,
    /// All requests at once, each on its own task.
    FanOut,
    /// All requests pipelined through one streaming session.
    Pipeline,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Serial => write!(f, "serial"),
            Pattern::FanOut => write!(f, "parallel"),
            Pattern::Pipeline => write!(f, "streaming"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkResult {
    pub label: String,
    pub pattern: Pattern,
    pub transport: Transport,
    pub requests: usize,
    /// Size of the last observed response. `None` when no request was made.
    pub bytes_observed: Option<usize>,
    pub elapsed: Duration,
}

impl BenchmarkResult {
    pub fn new(
        pattern: Pattern,
        transport: Transport,
        requests: usize,
        bytes_observed: Option<usize>,
        elapsed: Duration,
    ) -> Self {
        Self {
            label: format!("{pattern} {transport}"),
            pattern,
            transport,
            requests,
            bytes_observed,
            elapsed,
        }
    }

    /// Result of a pattern that issued no requests.
    pub fn empty(pattern: Pattern, transport: Transport) -> Self {
        Self::new(pattern, transport, 0, None, Duration::ZERO)
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.requests as f64 / secs
    }

    pub fn report(&self) {
        println!(
            "{:<25} | {:>10} | {:>12} | {:>10.2} | {:>15.2}",
            self.label,
            self.requests,
            self.bytes_observed
                .map_or_else(|| "-".to_string(), |size| size.to_string()),
            self.elapsed.as_secs_f64() * 1000.0,
            self.throughput()
        );
    }
}

/// Matches the per-pattern log line: `Through serial http: size = 10 ;duration = 1.2ms`.
impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Through {}: size = ", self.label)?;
        match self.bytes_observed {
            Some(size) => write!(f, "{size}")?,
            None => write!(f, "-")?,
        }
        write!(f, " ;duration = {:?}", self.elapsed)
    }
}

pub fn print_summary(results: &[BenchmarkResult]) {
    println!("\n=== Benchmark Summary ===");
    println!(
        "{:<25} | {:>10} | {:>12} | {:>10} | {:>15}",
        "Method", "Requests", "Size (B)", "Time (ms)", "Throughput (/s)"
    );
    println!("{}", "-".repeat(84));
    for r in results {
        r.report();
    }
}
