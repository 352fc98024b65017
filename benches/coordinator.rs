use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use txn_coordinator::prelude::*;
use txn_coordinator::testing::{RecordingResourceManager, Trace};

fn coordinator() -> TransactionCoordinator {
    TransactionCoordinator::new(
        Arc::new(RecordingResourceManager::new(Trace::new())),
        CoordinatorConfig::default(),
    )
}

fn required_commit_roundtrip(c: &mut Criterion) {
    let coord = coordinator();
    c.bench_function("required_commit_roundtrip", |b| {
        b.iter(|| {
            let mut flow = Flow::new();
            let status = coord.get_transaction(&mut flow, None).unwrap();
            coord.commit(&mut flow, status).unwrap();
            black_box(());
        })
    });
}

fn nested_savepoint_roundtrip(c: &mut Criterion) {
    let coord = coordinator();
    let nested_def = Definition::builder().propagation(Propagation::Nested).build();
    c.bench_function("nested_savepoint_roundtrip", |b| {
        b.iter(|| {
            let mut flow = Flow::new();
            let outer = coord.get_transaction(&mut flow, None).unwrap();
            let inner = coord.get_transaction(&mut flow, Some(&nested_def)).unwrap();
            coord.commit(&mut flow, inner).unwrap();
            coord.commit(&mut flow, outer).unwrap();
            black_box(());
        })
    });
}

criterion_group!(benches, required_commit_roundtrip, nested_savepoint_roundtrip);
criterion_main!(benches);
