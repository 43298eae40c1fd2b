//! # `objwire-bench`
//!
//! Measures how long it takes to fetch the object served by `objwire-server`
//! `--loop` times over plain HTTP, unary gRPC and streaming gRPC, serially and
//! in parallel.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin objwire-bench --release -- --loop 1000 --mode both --protocol all
//! ```

use clap::Parser;
use objwire_bench::bench::{
    config::{BenchConfig, CliArgs},
    harness::run,
    report::print_summary,
    telemetry::init_tracing,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = BenchConfig::try_from(args)?;

    init_tracing()?;

    let results = run(&config).await?;
    print_summary(&results);

    Ok(())
}
