use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use toolroom_core::{DocumentKind, UserId};
use toolroom_events::RecordingNotifier;
use toolroom_infra::{
    Engine, EngineConfig, InMemoryNumberAllocator, NumberAllocator, SystemClock,
};
use toolroom_inventory::{InventoryKey, StockLevels, StockReference};

fn engine() -> Engine<toolroom_infra::InMemoryStore> {
    Engine::in_memory(
        EngineConfig::default(),
        Arc::new(SystemClock),
        Arc::new(RecordingNotifier::new()),
    )
}

fn bench_stock_movements(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_movements");

    for items in [1usize, 100, 1_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, &items| {
            let engine = engine();
            let ids: Vec<_> = (0..items)
                .map(|i| {
                    engine
                        .inventory
                        .register_item(
                            InventoryKey::new(format!("PN-{i}"), "TL-1", None::<&str>).unwrap(),
                            "Bench item",
                            StockLevels::new(0, None).unwrap(),
                        )
                        .unwrap()
                        .id_typed()
                })
                .collect();
            let user = UserId::new();
            let mut n = 0usize;

            b.iter(|| {
                let id = ids[n % ids.len()];
                n += 1;
                black_box(
                    engine
                        .inventory
                        .add_stock(id, 1, StockReference::manual(user))
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let engine = engine();
    let id = engine
        .inventory
        .register_item(
            InventoryKey::new("PN-R", "TL-1", None::<&str>).unwrap(),
            "Bench item",
            StockLevels::new(0, None).unwrap(),
        )
        .unwrap()
        .id_typed();
    for _ in 0..1_000 {
        engine
            .inventory
            .add_stock(id, 2, StockReference::manual(UserId::new()))
            .unwrap();
    }

    c.bench_function("reconcile_1000_rows", |b| {
        b.iter(|| black_box(engine.inventory.reconcile(id).unwrap()));
    });
}

fn bench_numbering(c: &mut Criterion) {
    c.bench_function("allocate_document_number", |b| {
        b.iter_batched(
            InMemoryNumberAllocator::new,
            |numbers| {
                for _ in 0..100 {
                    black_box(numbers.allocate(DocumentKind::PurchaseRequisition, 2024).unwrap());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_stock_movements, bench_reconcile, bench_numbering);
criterion_main!(benches);
