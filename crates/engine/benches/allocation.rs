use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Days, NaiveDate};
use fulfil_core::{ProductId, StockLotId};
use fulfil_engine::{allocate, plan_allocation};
use fulfil_infra::{FulfillmentStore, InMemoryStore, InventoryLedger, StoreError};
use fulfil_inventory::{StockItem, StockLot};

fn lots(product_id: ProductId, count: usize) -> Vec<StockLot> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..count)
        .map(|i| {
            // Reverse receipt order so planning has to sort.
            let on = base + Days::new((count - i) as u64);
            StockLot::receive(StockLotId::new(), StockItem::Product(product_id), on, 10).unwrap()
        })
        .collect()
}

/// Planning only: filter, FIFO sort and slice, no ledger writes.
fn bench_plan_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_allocation");
    let product_id = ProductId::new();

    for count in [10usize, 100, 1_000] {
        let lots = lots(product_id, count);
        let demand = (count as i64) * 10 / 2;
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &lots, |b, lots| {
            b.iter(|| black_box(plan_allocation(black_box(lots), demand)));
        });
    }

    group.finish();
}

/// Full allocation in a store transaction, including per-lot CAS reserves.
fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    let product_id = ProductId::new();

    for count in [10usize, 100] {
        let store = InMemoryStore::new();
        store
            .transaction(|tx| {
                for lot in lots(product_id, count) {
                    tx.receive_lot(lot)?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();
        let demand = (count as i64) * 10 / 2;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            // Always rolled back; every iteration sees the same ledger.
            b.iter(|| {
                let result = store.transaction(|tx| {
                    let outcome = allocate(tx, product_id, demand)?;
                    black_box(outcome);
                    Err::<(), _>(fulfil_engine::FulfillmentError::Conflict("rollback".to_string()))
                });
                black_box(result.is_err())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan_allocation, bench_allocate);
criterion_main!(benches);
