use anyhow::bail;
use clap::Parser;
use objwire_core::types::DEFAULT_MAX_MESSAGE_BYTES;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Runtime configuration for the `objwire-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is honoured), with defaults matching a local benchmark setup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "objwire-server",
    version,
    about = "Serves one immutable object over HTTP, unary gRPC and streaming gRPC"
)]
pub struct CliArgs {
    /// File holding the binary content to serve.
    ///
    /// Environment variable: `DATA_FILE`
    #[arg(long, env = "DATA_FILE", default_value = "testdata/content_data")]
    pub data_file: PathBuf,

    /// Address of the plain HTTP fetch endpoint.
    ///
    /// Environment variable: `HTTP_ADDR`
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:10001")]
    pub http_addr: SocketAddr,

    /// Address of the gRPC endpoint (unary and streaming calls).
    ///
    /// Environment variable: `GRPC_ADDR`
    #[arg(long, env = "GRPC_ADDR", default_value = "0.0.0.0:10002")]
    pub grpc_addr: SocketAddr,

    /// Serve the gRPC endpoint over TLS using `cert_file` and `key_file`.
    ///
    /// Environment variable: `TLS`
    #[arg(long, env = "TLS", default_value_t = false)]
    pub tls: bool,

    /// PEM certificate chain used when `--tls` is set.
    ///
    /// Environment variable: `CERT_FILE`
    #[arg(long, env = "CERT_FILE", default_value = "testdata/server1.pem")]
    pub cert_file: PathBuf,

    /// PEM private key used when `--tls` is set.
    ///
    /// Environment variable: `KEY_FILE`
    #[arg(long, env = "KEY_FILE", default_value = "testdata/server1.key")]
    pub key_file: PathBuf,

    /// Log the remote address of every request. Slows down response time.
    ///
    /// Environment variable: `VERBOSE`
    #[arg(short, long, env = "VERBOSE", default_value_t = false)]
    pub verbose: bool,

    /// Defer loading the content until the first request.
    ///
    /// A failed load is reported to the caller as unavailable content instead
    /// of aborting startup, and is attempted again on the next request.
    ///
    /// Environment variable: `LAZY_LOAD`
    #[arg(long, env = "LAZY_LOAD", default_value_t = false)]
    pub lazy_load: bool,

    /// Capacity of the outbound response buffer of each streaming session.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,

    /// Upper bound for encoded and decoded gRPC messages, in bytes.
    ///
    /// Environment variable: `MAX_MESSAGE_BYTES`
    #[arg(long, env = "MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Seconds to wait for both endpoints to stop after a shutdown signal.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

/// Key and certificate paths for the TLS-enabled gRPC endpoint.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_file: PathBuf,
    pub http_addr: SocketAddr,
    pub grpc_addr: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub verbose: bool,
    pub lazy_load: bool,
    pub stream_buffer_size: usize,
    pub max_message_bytes: usize,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Plain-text configuration serving `data_file` on the given addresses.
    pub fn new(data_file: impl Into<PathBuf>, http_addr: SocketAddr, grpc_addr: SocketAddr) -> Self {
        Self {
            data_file: data_file.into(),
            http_addr,
            grpc_addr,
            tls: None,
            verbose: false,
            lazy_load: false,
            stream_buffer_size: 16,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.max_message_bytes == 0 {
            bail!("MAX_MESSAGE_BYTES must be greater than 0");
        }

        if args.http_addr == args.grpc_addr && args.http_addr.port() != 0 {
            bail!(
                "HTTP_ADDR and GRPC_ADDR must differ (both are {})",
                args.http_addr
            );
        }

        let tls = args.tls.then(|| TlsPaths {
            cert_file: args.cert_file,
            key_file: args.key_file,
        });

        Ok(Self {
            data_file: args.data_file,
            http_addr: args.http_addr,
            grpc_addr: args.grpc_addr,
            tls,
            verbose: args.verbose,
            lazy_load: args.lazy_load,
            stream_buffer_size: args.stream_buffer_size,
            max_message_bytes: args.max_message_bytes,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
