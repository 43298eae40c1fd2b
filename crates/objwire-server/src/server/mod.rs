//! Server-side components of the `objwire` object delivery service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`content`] - Eager or lazy access to the served snapshot.
//! - [`http`] - Plain HTTP fetch endpoint (axum).
//! - [`service`] - gRPC `ObjectAccessor` service (unary + streaming).
//! - [`streaming`] - Per-call streaming session driver.
//! - [`telemetry`] - Logging and optional OpenTelemetry export.
//!
//! [`ObjectServer`] wires them together: both listeners share one
//! [`ContentSource`] and one cancellation token, so a single shutdown stops
//! both endpoints.

pub mod config;
pub mod content;
pub mod http;
pub mod service;
pub mod streaming;
pub mod telemetry;

use anyhow::{Context, bail};
use config::{ServerConfig, TlsPaths};
use content::ContentSource;
use core::future::{Future, IntoFuture};
use objwire_core::proto::{FILE_DESCRIPTOR_SET, object_accessor_server::ObjectAccessorServer};
use service::handler::ObjectService;
use std::{net::SocketAddr, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{
    codec::CompressionEncoding,
    transport::{Identity, Server, ServerTlsConfig},
};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// A running server: both endpoints bound and serving in background tasks.
pub struct ObjectServer {
    http_addr: SocketAddr,
    grpc_addr: SocketAddr,
    cancel: CancellationToken,
    health_reporter: HealthReporter,
    http_task: JoinHandle<std::io::Result<()>>,
    grpc_task: JoinHandle<Result<(), tonic::transport::Error>>,
    shutdown_timeout: Duration,
}

impl ObjectServer {
    /// Loads the content (unless lazy), binds both listeners and starts
    /// serving.
    ///
    /// # Errors
    ///
    /// Fails if the content cannot be read in eager mode, if either address
    /// cannot be bound, or if the TLS material is unreadable or invalid.
    pub async fn spawn(config: ServerConfig) -> anyhow::Result<Self> {
        let source = if config.lazy_load {
            ContentSource::lazy(&config.data_file)
        } else {
            let source = ContentSource::eager(&config.data_file).await?;
            let snapshot = source.snapshot().await?;
            tracing::info!(
                path = %config.data_file.display(),
                bytes = snapshot.len(),
                fingerprint = snapshot.fingerprint(),
                mtime = snapshot.mtime(),
                "Content loaded"
            );
            source
        };

        let http_listener = TcpListener::bind(config.http_addr)
            .await
            .with_context(|| format!("failed to bind HTTP endpoint on {}", config.http_addr))?;
        let grpc_listener = TcpListener::bind(config.grpc_addr)
            .await
            .with_context(|| format!("failed to bind gRPC endpoint on {}", config.grpc_addr))?;
        let http_addr = http_listener.local_addr()?;
        let grpc_addr = grpc_listener.local_addr()?;

        // All fallible setup finishes before the first task is spawned.
        let reflection = Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;

        let mut builder = Server::builder();
        if let Some(paths) = &config.tls {
            builder = builder.tls_config(load_tls(paths).await?)?;
        }

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<ObjectAccessorServer<ObjectService>>()
            .await;

        let app = http::router(source.clone(), config.verbose);
        let service = ObjectService::new(source, config.stream_buffer_size, config.verbose);

        let router = builder
            .accept_http1(true)
            .http2_adaptive_window(Some(true))
            .layer(
                ServiceBuilder::new()
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    )
                    .layer(GrpcWebLayer::new()),
            )
            .add_service(health_service)
            .add_service(reflection)
            .add_service(build_object_service(service, config.max_message_bytes));

        let cancel = CancellationToken::new();

        let http_task = tokio::spawn(
            axum::serve(
                http_listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future(),
        );

        let grpc_task = tokio::spawn(router.serve_with_incoming_shutdown(
            TcpListenerStream::new(grpc_listener),
            cancel.clone().cancelled_owned(),
        ));

        log_startup_info(http_addr, grpc_addr, &config);

        Ok(Self {
            http_addr,
            grpc_addr,
            cancel,
            health_reporter,
            http_task,
            grpc_task,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn grpc_addr(&self) -> SocketAddr {
        self.grpc_addr
    }

    /// Serves until `signal` resolves, then shuts down gracefully.
    ///
    /// If either endpoint stops on its own first, the other one is stopped
    /// too and the failure is returned.
    pub async fn run_until<F>(mut self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let early_exit = tokio::select! {
            () = signal => None,
            res = &mut self.http_task => Some(("HTTP", joined(res))),
            res = &mut self.grpc_task => Some(("gRPC", joined(res))),
        };

        match early_exit {
            None => self.shutdown().await,
            Some((endpoint, res)) => {
                self.cancel.cancel();
                self.http_task.abort();
                self.grpc_task.abort();
                res.with_context(|| format!("{endpoint} endpoint failed"))?;
                bail!("{endpoint} endpoint stopped unexpectedly")
            }
        }
    }

    /// Stops both endpoints.
    ///
    /// - Marks the gRPC service `NOT_SERVING` in the health service.
    /// - Cancels the shared token so both listeners stop accepting.
    /// - Waits up to `shutdown_timeout` for in-flight requests, then aborts.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.health_reporter
            .set_not_serving::<ObjectAccessorServer<ObjectService>>()
            .await;
        self.cancel.cancel();

        let drained = timeout(self.shutdown_timeout, async {
            let (http, grpc) = tokio::join!(&mut self.http_task, &mut self.grpc_task);
            (joined(http), joined(grpc))
        })
        .await;

        match drained {
            Ok((http, grpc)) => {
                http.context("HTTP endpoint failed during shutdown")?;
                grpc.context("gRPC endpoint failed during shutdown")?;
                tracing::info!("Service shut down successfully");
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful shutdown timed out after {:?}, aborting in-flight requests",
                    self.shutdown_timeout
                );
                self.http_task.abort();
                self.grpc_task.abort();
            }
        }

        Ok(())
    }
}

fn joined<E>(res: Result<Result<(), E>, tokio::task::JoinError>) -> anyhow::Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    Ok(res??)
}

fn build_object_service(
    service: ObjectService,
    max_message_bytes: usize,
) -> ObjectAccessorServer<ObjectService> {
    ObjectAccessorServer::new(service)
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn load_tls(paths: &TlsPaths) -> anyhow::Result<ServerTlsConfig> {
    let cert = tokio::fs::read(&paths.cert_file)
        .await
        .with_context(|| format!("failed to read {}", paths.cert_file.display()))?;
    let key = tokio::fs::read(&paths.key_file)
        .await
        .with_context(|| format!("failed to read {}", paths.key_file.display()))?;
    Ok(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))
}

fn log_startup_info(http_addr: SocketAddr, grpc_addr: SocketAddr, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Serving HTTP on {} and gRPC on {} with full config: {:#?}",
            http_addr,
            grpc_addr,
            config
        );
    } else {
        tracing::info!(
            "Serving HTTP on {} and gRPC on {} (tls = {})",
            http_addr,
            grpc_addr,
            config.tls.is_some()
        );
    }
}
