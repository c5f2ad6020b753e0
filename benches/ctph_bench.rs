use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use episode_identifier::core::ctph;

fn sample_subtitle_text(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("{i}\n00:00:{i:02},000 --> 00:00:{:02},500\nSample dialogue line number {i}.\n\n", i + 1))
        .collect()
}

fn bench_hash(c: &mut Criterion) {
    let short = sample_subtitle_text(20);
    let long = sample_subtitle_text(800);

    c.bench_function("ctph_hash_short_subtitle", |b| {
        b.iter(|| ctph::hash(black_box(short.as_bytes())))
    });

    c.bench_function("ctph_hash_full_episode_subtitle", |b| {
        b.iter(|| ctph::hash(black_box(long.as_bytes())))
    });
}

fn bench_compare(c: &mut Criterion) {
    let base = sample_subtitle_text(800);
    let edited = base.replacen("dialogue", "conversation", 1);
    let h1 = ctph::hash(base.as_bytes());
    let h2 = ctph::hash(edited.as_bytes());

    c.bench_function("ctph_compare_near_duplicate", |b| {
        b.iter(|| ctph::compare(black_box(&h1), black_box(&h2)).unwrap())
    });
}

fn bench_catalogue_scan_scale(c: &mut Criterion) {
    let query = sample_subtitle_text(800);
    let query_hash = ctph::hash(query.as_bytes());
    let candidates: Vec<String> = (0..300)
        .map(|i| {
            let mut text = sample_subtitle_text(800);
            text.push_str(&format!("episode marker {i}"));
            ctph::hash(text.as_bytes())
        })
        .collect();

    c.bench_function("ctph_compare_against_300_candidates", |b| {
        b.iter(|| {
            let mut best = 0u32;
            for candidate in &candidates {
                best = best.max(ctph::compare(black_box(&query_hash), black_box(candidate)).unwrap());
            }
            black_box(best)
        })
    });
}

criterion_group!(benches, bench_hash, bench_compare, bench_catalogue_scan_scale);
criterion_main!(benches);
