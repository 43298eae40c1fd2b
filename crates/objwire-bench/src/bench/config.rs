use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::fmt;
use objwire_core::types::{DEFAULT_MAX_MESSAGE_BYTES, HTTP_OBJECT_PATH};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tokio::sync::Semaphore;
use tonic::codec::CompressionEncoding;

/// Largest `--loop` accepted; the fan-out collector needs one slot per request.
pub const MAX_REQUESTS: usize = Semaphore::MAX_PERMITS;

/// Runtime configuration for the `objwire-bench` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "objwire-bench",
    version,
    about = "Measures object delivery over HTTP, unary gRPC and streaming gRPC"
)]
pub struct CliArgs {
    /// Requests issued by every pattern.
    ///
    /// Environment variable: `LOOP`
    #[arg(long = "loop", env = "LOOP", default_value_t = 100)]
    pub requests: usize,

    /// Host running `objwire-server`.
    ///
    /// Environment variable: `HOST`
    #[arg(long, env = "HOST", default_value = "localhost")]
    pub host: String,

    /// Port of the plain HTTP endpoint.
    ///
    /// Environment variable: `HTTP_PORT`
    #[arg(long, env = "HTTP_PORT", default_value_t = 10001)]
    pub http_port: u16,

    /// Port of the gRPC endpoint.
    ///
    /// Environment variable: `GRPC_PORT`
    #[arg(long, env = "GRPC_PORT", default_value_t = 10002)]
    pub grpc_port: u16,

    /// Request patterns for the HTTP and unary transports. The streaming
    /// transport always runs a single pipelined session.
    ///
    /// Environment variable: `MODE`
    #[arg(long, env = "MODE", value_enum, default_value_t = Mode::Both)]
    pub mode: Mode,

    /// Transports to measure.
    ///
    /// Environment variable: `PROTOCOL`
    #[arg(long, env = "PROTOCOL", value_enum, default_value_t = Protocol::All)]
    pub protocol: Protocol,

    /// gRPC message compression, requested in both directions.
    ///
    /// Environment variable: `COMPRESSION`
    #[arg(long, env = "COMPRESSION", value_enum, default_value_t = Compression::None)]
    pub compression: Compression,

    /// Connect to the gRPC endpoint over TLS.
    ///
    /// Environment variable: `TLS`
    #[arg(long, env = "TLS", default_value_t = false)]
    pub tls: bool,

    /// PEM CA certificate trusted for the gRPC endpoint. Required with `--tls`.
    ///
    /// Environment variable: `CA_FILE`
    #[arg(long, env = "CA_FILE")]
    pub ca_file: Option<PathBuf>,

    /// Server name expected in the gRPC certificate. Defaults to `--host`.
    ///
    /// Environment variable: `DOMAIN`
    #[arg(long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// Recompute the fingerprint of every body and compare it to the one the
    /// server sent.
    ///
    /// Environment variable: `VERIFY`
    #[arg(long, env = "VERIFY", default_value_t = false)]
    pub verify: bool,

    /// Upper bound in seconds for each pattern. Unbounded when unset.
    ///
    /// Environment variable: `DEADLINE_SECS`
    #[arg(long, env = "DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,

    /// Capacity of the outbound identifier buffer of the streaming session.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,

    /// Upper bound for encoded and decoded gRPC messages, in bytes.
    ///
    /// Environment variable: `MAX_MESSAGE_BYTES`
    #[arg(long, env = "MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Serial,
    Parallel,
    Both,
}

impl Mode {
    pub fn serial(self) -> bool {
        matches!(self, Self::Serial | Self::Both)
    }

    pub fn parallel(self) -> bool {
        matches!(self, Self::Parallel | Self::Both)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Unary,
    Stream,
    All,
}

impl Protocol {
    pub fn includes(self, transport: Transport) -> bool {
        match self {
            Self::All => true,
            Self::Http => transport == Transport::Http,
            Self::Unary => transport == Transport::Unary,
            Self::Stream => transport == Transport::Stream,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
    Gzip,
    Deflate,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Zstd => write!(f, "zstd"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Deflate => write!(f, "deflate"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Zstd => Some(CompressionEncoding::Zstd),
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Deflate => Some(CompressionEncoding::Deflate),
        }
    }
}

/// A concrete way of fetching the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Http,
    Unary,
    Stream,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => write!(f, "http"),
            Transport::Unary => write!(f, "unary grpc"),
            Transport::Stream => write!(f, "grpc"),
        }
    }
}

/// CA and server name used to authenticate the gRPC endpoint.
#[derive(Debug, Clone)]
pub struct ClientTls {
    pub ca_file: PathBuf,
    pub domain: String,
}

/// Everything needed to open a gRPC channel.
#[derive(Debug, Clone)]
pub struct GrpcTarget {
    pub host: String,
    pub port: u16,
    pub tls: Option<ClientTls>,
    pub compression: Compression,
    pub max_message_bytes: usize,
}

impl GrpcTarget {
    pub fn uri(&self) -> String {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub requests: usize,
    pub http_url: String,
    pub grpc: GrpcTarget,
    pub mode: Mode,
    pub protocol: Protocol,
    pub verify: bool,
    pub deadline: Option<Duration>,
    pub stream_buffer_size: usize,
}

impl BenchConfig {
    /// Plain-text configuration targeting already bound local addresses, with
    /// every transport and pattern enabled.
    pub fn local(http_addr: SocketAddr, grpc_addr: SocketAddr, requests: usize) -> Self {
        Self {
            requests,
            http_url: http_url(&http_addr.ip().to_string(), http_addr.port()),
            grpc: GrpcTarget {
                host: grpc_addr.ip().to_string(),
                port: grpc_addr.port(),
                tls: None,
                compression: Compression::None,
                max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            },
            mode: Mode::Both,
            protocol: Protocol::All,
            verify: true,
            deadline: None,
            stream_buffer_size: 16,
        }
    }
}

fn http_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}{HTTP_OBJECT_PATH}")
}

impl TryFrom<CliArgs> for BenchConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.requests > MAX_REQUESTS {
            bail!("LOOP must be at most {MAX_REQUESTS}");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.max_message_bytes == 0 {
            bail!("MAX_MESSAGE_BYTES must be greater than 0");
        }

        if args.deadline_secs == Some(0) {
            bail!("DEADLINE_SECS must be greater than 0 when set");
        }

        let tls = match (args.tls, args.ca_file) {
            (false, _) => None,
            (true, None) => bail!("CA_FILE is required when TLS is enabled"),
            (true, Some(ca_file)) => Some(ClientTls {
                ca_file,
                domain: args.domain.unwrap_or_else(|| args.host.clone()),
            }),
        };

        Ok(Self {
            requests: args.requests,
            http_url: http_url(&args.host, args.http_port),
            grpc: GrpcTarget {
                host: args.host,
                port: args.grpc_port,
                tls,
                compression: args.compression,
                max_message_bytes: args.max_message_bytes,
            },
            mode: args.mode,
            protocol: args.protocol,
            verify: args.verify,
            deadline: args.deadline_secs.map(Duration::from_secs),
            stream_buffer_size: args.stream_buffer_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<BenchConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("objwire-bench").chain(args.iter().copied()))?;
        BenchConfig::try_from(args)
    }

    #[test]
    fn defaults_target_local_server() -> anyhow::Result<()> {
        let config = parse(&[])?;
        assert_eq!(config.requests, 100);
        assert_eq!(config.http_url, "http://localhost:10001/http");
        assert_eq!(config.grpc.uri(), "http://localhost:10002");
        assert_eq!(config.mode, Mode::Both);
        assert_eq!(config.protocol, Protocol::All);
        assert!(config.deadline.is_none());
        assert!(!config.verify);
        Ok(())
    }

    #[test]
    fn tls_requires_ca_and_defaults_domain_to_host() -> anyhow::Result<()> {
        assert!(parse(&["--tls"]).is_err());

        let config = parse(&["--tls", "--ca-file", "ca.pem", "--host", "example.com"])?;
        assert_eq!(config.grpc.uri(), "https://example.com:10002");
        let tls = config.grpc.tls.as_ref().map(|tls| tls.domain.as_str());
        assert_eq!(tls, Some("example.com"));
        Ok(())
    }

    #[test]
    fn rejects_zero_sizes_and_deadline() {
        assert!(parse(&["--stream-buffer-size", "0"]).is_err());
        assert!(parse(&["--max-message-bytes", "0"]).is_err());
        assert!(parse(&["--deadline-secs", "0"]).is_err());
    }

    #[test]
    fn rejects_loop_beyond_collector_capacity() -> anyhow::Result<()> {
        let too_many = (MAX_REQUESTS + 1).to_string();
        assert!(parse(&["--loop", &too_many]).is_err());

        let at_limit = MAX_REQUESTS.to_string();
        assert_eq!(parse(&["--loop", &at_limit])?.requests, MAX_REQUESTS);
        Ok(())
    }

    #[test]
    fn protocol_selection() {
        assert!(Protocol::All.includes(Transport::Stream));
        assert!(Protocol::Http.includes(Transport::Http));
        assert!(!Protocol::Http.includes(Transport::Unary));
        assert!(Mode::Both.serial() && Mode::Both.parallel());
        assert!(!Mode::Serial.parallel());
    }
}
