use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ir_core::{
    DiskIndex, DiskIndexConfig, IndexBackend, PrecomputedStatistics, QueryEngine, TextCleaner,
    VectorRankingModel,
};

const DOCS: u64 = 2_000;
const TERMS_PER_DOC: u64 = 40;

fn synthetic_postings() -> Vec<(String, u64, u32)> {
    let mut out = Vec::with_capacity((DOCS * TERMS_PER_DOC) as usize);
    for doc in 0..DOCS {
        for k in 0..TERMS_PER_DOC {
            let term = (doc * 7 + k * 13) % 5_000;
            out.push((format!("t{term}"), doc, (k % 4 + 1) as u32));
        }
    }
    out
}

fn bench_build(c: &mut Criterion) {
    let postings = synthetic_postings();
    c.bench_function("disk_build_finalize_spill_10k", |b| {
        b.iter_batched(
            || tempfile::tempdir().unwrap(),
            |dir| {
                let config = DiskIndexConfig::new(dir.path()).with_buffer_capacity(10_000);
                let mut idx = DiskIndex::new(config).unwrap();
                for (term, doc, freq) in &postings {
                    idx.index(term, *doc, *freq).unwrap();
                }
                idx.finalize().unwrap();
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_vector_query(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = DiskIndex::new(DiskIndexConfig::new(dir.path())).unwrap();
    for (term, doc, freq) in synthetic_postings() {
        idx.index(&term, doc, freq).unwrap();
    }
    idx.finalize().unwrap();
    let stats = PrecomputedStatistics::build(&idx).unwrap();
    let model = VectorRankingModel::new(&stats);
    let engine = QueryEngine::new(&idx, TextCleaner::default());
    c.bench_function("vector_query_three_terms", |b| b.iter(|| engine.answer("t12 t400 t4999", &model).unwrap()));
}

criterion_group!(benches, bench_build, bench_vector_query);
criterion_main!(benches);
