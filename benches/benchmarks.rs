use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fmsearch_rust::index::fm::{BiFmIndex, BuildOpts};
use fmsearch_rust::index::sa;
use fmsearch_rust::scheme::{expand, generator};
use fmsearch_rust::search::{search_query, SearchOpts};

fn make_reference(len: usize) -> Vec<u8> {
    // 排名编码（1:A 2:C 3:G 4:T）的确定性随机序列
    let mut seq = Vec::with_capacity(len);
    let mut x: u32 = 42;
    for _ in 0..len {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        seq.push(1 + ((x >> 16) % 4) as u8);
    }
    seq
}

fn build_index(len: usize) -> BiFmIndex {
    let refs = vec![make_reference(len)];
    BiFmIndex::build(&refs, BuildOpts::default()).unwrap()
}

fn bench_build_sa(c: &mut Criterion) {
    let mut text = make_reference(10_000);
    text.push(0);

    c.bench_function("build_sa_10k", |b| {
        b.iter(|| {
            black_box(sa::build_sa(black_box(&text)));
        })
    });
}

fn bench_backward_search(c: &mut Criterion) {
    let reference = make_reference(10_000);
    let index = build_index(10_000);
    let pattern = reference[100..120].to_vec();

    c.bench_function("backward_search_20bp", |b| {
        b.iter(|| {
            black_box(index.backward_search(black_box(&pattern)));
        })
    });
}

fn bench_scheme_search_k2(c: &mut Criterion) {
    let reference = make_reference(10_000);
    let index = build_index(10_000);
    let query = reference[500..600].to_vec();
    let entry = generator::get("h2-k2").unwrap();
    let scheme = (entry.generate)(0, 2, 4, index.size()).unwrap();
    let parts = expand::uniform_parts(scheme[0].parts(), query.len()).unwrap();

    c.bench_function("scheme_search_100bp_k2", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            search_query(
                black_box(&index),
                black_box(&query),
                &scheme,
                &parts,
                SearchOpts::default(),
                &mut |cur, _| hits += cur.len,
            );
            black_box(hits);
        })
    });
}

fn bench_locate(c: &mut Criterion) {
    let index = build_index(10_000);

    c.bench_function("locate_full_sweep_1k", |b| {
        b.iter(|| {
            let mut acc = 0usize;
            for row in 0..1000 {
                let (entry, offset) = index.locate(black_box(row));
                acc += entry.pos as usize + offset;
            }
            black_box(acc);
        })
    });
}

criterion_group!(
    benches,
    bench_build_sa,
    bench_backward_search,
    bench_scheme_search_k2,
    bench_locate
);
criterion_main!(benches);
