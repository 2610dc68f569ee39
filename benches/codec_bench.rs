//! Wire codec benchmarks.
//!
//! Both codecs sit on every session's handshake path; these keep their
//! cost visible.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use ghostwire::protocol::injector::Handshake;
use ghostwire::protocol::socks::{Address, Command, ReplyCode, Reply, Request};

fn bench_injector_encode(c: &mut Criterion) {
    let handshake = Handshake::new("correct-horse-battery-staple", "www.example.com", 443);

    c.bench_function("injector_encode", |b| {
        b.iter(|| black_box(handshake.encode().unwrap()))
    });
}

fn bench_injector_decode(c: &mut Criterion) {
    let bytes = Handshake::new("correct-horse-battery-staple", "www.example.com", 443)
        .encode()
        .unwrap();

    let mut group = c.benchmark_group("injector_decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("typical_frame", |b| {
        b.iter(|| black_box(Handshake::decode(&bytes).unwrap()))
    });

    group.finish();
}

fn bench_socks_request_decode(c: &mut Criterion) {
    let bytes = Request {
        version: 0x05,
        command: Command::Connect,
        address: Address::Domain("www.example.com".to_string()),
        port: 443,
    }
    .encode();

    c.bench_function("socks_request_decode", |b| {
        b.iter(|| black_box(Request::decode(&bytes).unwrap()))
    });
}

fn bench_socks_reply_encode(c: &mut Criterion) {
    let reply = Reply::new(
        ReplyCode::Succeeded,
        Address::Ipv4("93.184.216.34".parse().unwrap()),
        80,
    );

    c.bench_function("socks_reply_encode", |b| {
        b.iter(|| black_box(reply.encode()))
    });
}

criterion_group!(
    benches,
    bench_injector_encode,
    bench_injector_decode,
    bench_socks_request_decode,
    bench_socks_reply_encode
);
criterion_main!(benches);
