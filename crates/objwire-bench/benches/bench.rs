use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use objwire_bench::bench::{
    config::{BenchConfig, Compression, Transport},
    harness::{run_fan_out, run_pipeline, run_serial},
    transport::{HttpFetcher, UnaryFetcher, connect},
};
use objwire_server::{ObjectServer, ServerConfig};
use std::{net::SocketAddr, time::Instant};
use tokio::runtime::Builder;

#[derive(Clone, Copy, Debug)]
struct DeliveryBenchParams {
    content_bytes: usize,
    requests: usize,
    compression: Compression,
}

fn delivery_bench(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    let content_cases = [1024, 1024 * 1024];
    let request_cases = [1, 100];
    let compression_cases = [Compression::None, Compression::Zstd];

    // Generate cartesian product of all param combinations
    let mut cases = Vec::new();
    for &content_bytes in &content_cases {
        for &requests in &request_cases {
            for &compression in &compression_cases {
                cases.push(DeliveryBenchParams {
                    content_bytes,
                    requests,
                    compression,
                });
            }
        }
    }

    for &content_bytes in &content_cases {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("content_data");
        std::fs::write(&path, vec![0xA5u8; content_bytes]).expect("write content");

        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = rt
            .block_on(ObjectServer::spawn(ServerConfig::new(&path, any, any)))
            .expect("Failed to start objwire-server");

        for params in cases.iter().filter(|p| p.content_bytes == content_bytes) {
            let mut config = BenchConfig::local(server.http_addr(), server.grpc_addr(), params.requests);
            config.verify = false;
            config.grpc.compression = params.compression;

            let mut group = c.benchmark_group("objwire/delivery");
            group.throughput(Throughput::Bytes(
                (params.content_bytes * params.requests) as u64,
            ));

            let id = |name: &str| {
                format!(
                    "{name}/bytes/{}/reqs/{}/comp/{}",
                    params.content_bytes, params.requests, params.compression
                )
            };

            // Compression only applies to gRPC, so HTTP runs once per size.
            if params.compression == Compression::None {
                group.bench_function(id("http/serial"), |b| {
                    b.to_async(&rt).iter_custom(|iters| {
                        let config = config.clone();
                        async move {
                            let fetcher = HttpFetcher::new(&config.http_url, false).unwrap();
                            let start = Instant::now();
                            for _ in 0..iters {
                                run_serial(&fetcher, Transport::Http, config.requests)
                                    .await
                                    .expect("serial http");
                            }
                            start.elapsed()
                        }
                    });
                });

                group.bench_function(id("http/parallel"), |b| {
                    b.to_async(&rt).iter_custom(|iters| {
                        let config = config.clone();
                        async move {
                            let fetcher = HttpFetcher::new(&config.http_url, false).unwrap();
                            let start = Instant::now();
                            for _ in 0..iters {
                                run_fan_out(&fetcher, Transport::Http, config.requests)
                                    .await
                                    .expect("parallel http");
                            }
                            start.elapsed()
                        }
                    });
                });
            }

            group.bench_function(id("unary/serial"), |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let config = config.clone();
                    async move {
                        let client = connect(&config.grpc).await.expect("Failed to connect");
                        let fetcher = UnaryFetcher::new(client, false);
                        let start = Instant::now();
                        for _ in 0..iters {
                            run_serial(&fetcher, Transport::Unary, config.requests)
                                .await
                                .expect("serial unary");
                        }
                        start.elapsed()
                    }
                });
            });

            group.bench_function(id("unary/parallel"), |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let config = config.clone();
                    async move {
                        let client = connect(&config.grpc).await.expect("Failed to connect");
                        let fetcher = UnaryFetcher::new(client, false);
                        let start = Instant::now();
                        for _ in 0..iters {
                            run_fan_out(&fetcher, Transport::Unary, config.requests)
                                .await
                                .expect("parallel unary");
                        }
                        start.elapsed()
                    }
                });
            });

            group.bench_function(id("stream/pipeline"), |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let config = config.clone();
                    async move {
                        let client = connect(&config.grpc).await.expect("Failed to connect");
                        let start = Instant::now();
                        for _ in 0..iters {
                            run_pipeline(
                                client.clone(),
                                config.requests,
                                config.stream_buffer_size,
                                false,
                            )
                            .await
                            .expect("streaming pipeline");
                        }
                        start.elapsed()
                    }
                });
            });

            group.finish();
        }

        if let Err(e) = rt.block_on(server.shutdown()) {
            eprintln!("failed to shut down server: {e:#}");
        }
    }
}

criterion_group!(delivery_benches, delivery_bench);
criterion_main!(delivery_benches);
