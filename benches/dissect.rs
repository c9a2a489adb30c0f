//! Benchmark: dissect QUIC-style packets with the shipped grammars. Covers the
//! newest-grammar hit (long header), the fallback path to an older grammar and a
//! packet every grammar rejects.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use protodissect::{dissect, GrammarSet, Options, StreamContext};
use std::path::PathBuf;

const INITIAL: [u8; 15] = [
    0xff, 0xff, 0x00, 0x00, 0x0b, 0x40, 0x11, 0x22, 0x33, 0x44, 0x03, 0x01, 0x07, 0x00, 0x00,
];
const OLD_SHORT: [u8; 11] = [0x1f, 1, 2, 3, 4, 5, 6, 7, 8, 0x2a, 0x07];
const GARBAGE: [u8; 6] = [0x30, 0x11, 0x22, 0x33, 0x44, 0x02];

fn padded_initial(padding: usize) -> Vec<u8> {
    let mut pkt = INITIAL[..10].to_vec();
    // Payload Length as a 2-byte varint, then packet number and frames.
    let payload = 1 + padding;
    pkt.push(0x40 | (payload >> 8) as u8);
    pkt.push(payload as u8);
    pkt.push(0x01);
    pkt.push(0x07);
    pkt.extend(std::iter::repeat(0u8).take(padding));
    pkt
}

fn bench_dissect(c: &mut Criterion) {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("grammars");
    let grammars = GrammarSet::load_dir(&dir).expect("load grammars");
    let options = Options::default();

    c.bench_function("dissect_initial", |b| {
        b.iter(|| {
            let mut ctx = StreamContext::new();
            black_box(dissect(black_box(&INITIAL), &grammars, options, &mut ctx).is_ok())
        })
    });

    c.bench_function("dissect_fallback_old_grammar", |b| {
        b.iter(|| {
            let mut ctx = StreamContext::new();
            black_box(dissect(black_box(&OLD_SHORT), &grammars, options, &mut ctx).is_ok())
        })
    });

    c.bench_function("dissect_rejected", |b| {
        b.iter(|| {
            let mut ctx = StreamContext::new();
            black_box(dissect(black_box(&GARBAGE), &grammars, options, &mut ctx).is_err())
        })
    });

    let big = padded_initial(1200);
    c.bench_function("dissect_initial_1200_padding", |b| {
        b.iter(|| {
            let mut ctx = StreamContext::new();
            black_box(dissect(black_box(&big), &grammars, options, &mut ctx).is_ok())
        })
    });
}

criterion_group!(benches, bench_dissect);
criterion_main!(benches);
