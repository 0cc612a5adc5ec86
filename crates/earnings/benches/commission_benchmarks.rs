use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use referly_core::AccountId;
use referly_earnings::{BasisPoints, CommissionSchedule};

fn bench_credit_split(c: &mut Criterion) {
    let schedule = CommissionSchedule::new(
        BasisPoints::new(1000).unwrap(),
        BasisPoints::new(500).unwrap(),
    );

    c.bench_function("credits_for_full_chain", |b| {
        b.iter_batched(
            || (AccountId::new(), AccountId::new()),
            |(t1, t2)| schedule.credits_for(5000, "gbp", Some(t1), Some(t2)),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("credits_for_no_chain", |b| {
        b.iter(|| schedule.credits_for(5000, "gbp", None, None))
    });
}

criterion_group!(benches, bench_credit_split);
criterion_main!(benches);
