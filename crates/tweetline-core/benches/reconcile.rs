use rustc_hash::FxHashSet;
use serde_json::json;
use tweetline_core::{Batch, RecordKind, ledger};

fn synthetic_batch(n: usize, offset: usize) -> Batch {
    let items: Vec<_> = (offset..offset + n)
        .map(|i| json!({"id": (1_460_000_000_000_000_000u64 + i as u64).to_string(), "text": "t"}))
        .collect();
    Batch::from_json(RecordKind::Tweets, &json!(items)).unwrap()
}

fn synthetic_ledger(n: usize) -> FxHashSet<String> {
    synthetic_batch(n, 0).ids().collect()
}

/// Half of each batch is already in the ledger
#[divan::bench(args = [1_000, 10_000, 100_000])]
fn reconcile_half_known(bencher: divan::Bencher, n: usize) {
    let existing = synthetic_ledger(n);
    let batch = synthetic_batch(n, n / 2);
    bencher.bench(|| ledger::reconcile(&existing, &batch));
}

#[divan::bench(args = [1_000, 10_000])]
fn drop_duplicates(bencher: divan::Bencher, n: usize) {
    let mut batch = synthetic_batch(n, 0);
    batch.append(synthetic_batch(n, 0)).unwrap();
    bencher
        .with_inputs(|| batch.clone())
        .bench_local_values(|mut b| b.drop_duplicates("id"));
}

fn main() {
    divan::main();
}
