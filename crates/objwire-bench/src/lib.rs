#![doc = include_str!("../README.md")]
pub mod bench;

pub use bench::{
    config::BenchConfig,
    harness::run,
    report::{BenchmarkResult, Pattern},
    session::{ObjectSession, ReceiveStatus, SessionReceiver, SessionSender},
};
