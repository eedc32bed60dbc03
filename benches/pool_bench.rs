//! Benchmarks for the admission-control hot paths.
//!
//! Benchmarks cover:
//! - BoundedPool acquire/release without contention
//! - BoundedPool under contention from several threads
//! - Request handling in `respond` and the in-memory codec
//! - A full loopback exchange against a running dispatcher

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::io::Cursor;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use tunnel_admission::config::WorkerPolicy;
use tunnel_admission::core::protocol::{exchange, write_code};
use tunnel_admission::core::{respond, serve_connection, BoundedPool, ConnectionDispatcher};

// ============================================================================
// BoundedPool Benchmarks
// ============================================================================

fn bench_pool_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_acquire_release");

    for units in [1_i32, 10, 50] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(units), &units, |b, &units| {
            let pool = BoundedPool::new("bench", 50);
            b.iter(|| {
                black_box(pool.acquire(units).unwrap());
                black_box(pool.release(units).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_pool_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_contended");
    const ROUNDS: u64 = 1_000;

    for threads in [2_u64, 4, 8] {
        group.throughput(Throughput::Elements(threads * ROUNDS));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                // Four units for eight threads: acquirers regularly park.
                let pool = Arc::new(BoundedPool::new("bench", 4));
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for _ in 0..ROUNDS {
                                pool.acquire(1).unwrap();
                                pool.release(1).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
                black_box(pool.peek());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Request Handling Benchmarks
// ============================================================================

fn bench_respond(c: &mut Criterion) {
    let mut group = c.benchmark_group("respond");
    let pool = BoundedPool::new("bench", 50);

    group.bench_function("query", |b| b.iter(|| black_box(respond(&pool, black_box(0)))));
    group.bench_function("acquire_release", |b| {
        b.iter(|| {
            black_box(respond(&pool, black_box(7)));
            black_box(respond(&pool, black_box(-7)));
        });
    });
    group.bench_function("refused", |b| b.iter(|| black_box(respond(&pool, black_box(51)))));
    group.finish();
}

fn bench_serve_in_memory(c: &mut Criterion) {
    let pool = BoundedPool::new("bench", 50);
    let mut request = Vec::new();
    write_code(&mut request, 0).unwrap();

    c.bench_function("serve_connection_in_memory", |b| {
        b.iter(|| {
            let mut stream = Cursor::new(request.clone());
            black_box(serve_connection(&mut stream, &pool).unwrap());
        });
    });
}

// ============================================================================
// Loopback Benchmarks
// ============================================================================

fn bench_loopback_exchange(c: &mut Criterion) {
    let pool = Arc::new(BoundedPool::new("bench", 50));
    let server = ConnectionDispatcher::bind("127.0.0.1:0", pool, WorkerPolicy::ThreadPerConnection)
        .unwrap()
        .spawn()
        .unwrap();
    let addr = server.local_addr();

    c.bench_function("loopback_query", |b| {
        b.iter(|| {
            let mut stream = TcpStream::connect(addr).unwrap();
            black_box(exchange(&mut stream, 0).unwrap());
        });
    });

    server.shutdown_and_join().unwrap();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(pool_benches, bench_pool_acquire_release, bench_pool_contended);

criterion_group!(request_benches, bench_respond, bench_serve_in_memory);

criterion_group!(network_benches, bench_loopback_exchange);

criterion_main!(pool_benches, request_benches, network_benches);
