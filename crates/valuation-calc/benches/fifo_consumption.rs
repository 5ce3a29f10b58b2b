use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use rust_decimal::Decimal;
use uuid::Uuid;
use valuation_calc::{AggregateCalculator, FifoCalculator, InventoryLedger};
use valuation_core::{Batch, MovementKind, OrderContext, SaleLineRequest, VariantBook};

fn book_with_batches(count: u64) -> VariantBook {
    let mut book = VariantBook::new("SKU-BENCH".to_string());
    for seq in 1..=count {
        let batch = Batch::new("SKU-BENCH".to_string(), 10, Decimal::from(seq % 17 + 5), seq)
            .expect("valid batch");
        book.push_batch(batch).expect("unique batch");
    }
    book
}

fn bench_fifo_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_consume");

    for count in [10u64, 100, 1_000] {
        // 扣掉一半批次
        let quantity = (count * 10 / 2) as i64;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || book_with_batches(count),
                |mut book| {
                    let kind = MovementKind::Sale {
                        invoice_ref: "INV-BENCH".to_string(),
                        line_id: Uuid::new_v4(),
                    };
                    black_box(FifoCalculator::consume(&mut book, quantity, kind).expect("stock"))
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_recompute(c: &mut Criterion) {
    let book = book_with_batches(1_000);
    c.bench_function("aggregate_recompute_1000", |b| {
        b.iter(|| AggregateCalculator::recompute(black_box(&book)).expect("consistent"))
    });
}

fn bench_ledger_sale(c: &mut Criterion) {
    c.bench_function("ledger_record_sale_100_batches", |b| {
        b.iter_batched(
            || {
                let ledger = InventoryLedger::default();
                let context = OrderContext::new("PO-BENCH".to_string(), Decimal::ONE, 1_000);
                for seq in 0..100 {
                    ledger
                        .record_purchase_batch("SKU-BENCH", 10, Decimal::from(seq % 7 + 3), &context)
                        .expect("purchase");
                }
                ledger
            },
            |ledger| {
                black_box(
                    ledger
                        .record_sale(
                            "INV-BENCH",
                            &[SaleLineRequest::new("SKU-BENCH".to_string(), 500)],
                        )
                        .expect("sale"),
                )
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_fifo_consume, bench_recompute, bench_ledger_sale);
criterion_main!(benches);
