//! Benchmarks for reconciliation against the in-memory service

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use attendance_bridge::remote::{MemoryService, WorkforceService};
use attendance_bridge::store::MemoryStore;
use attendance_bridge::sync::{partition, EmployeeSyncer, IdentityIndex, RunContext};
use attendance_bridge::{Department, EmployeeRow, Oid, SyncConfig};

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for size in [1_000usize, 10_000] {
        let mut index = IdentityIndex::new();
        index.reload((0..size / 2).map(|i| Department {
            oid: Oid::new(format!("d-{}", i)),
            integration_id: format!("Department {}", i),
            name: format!("Department {}", i),
        }));
        let staged: Vec<Department> = (0..size)
            .map(|i| Department::named(format!("Department {}", i)))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &staged, |b, staged| {
            b.iter(|| {
                let split = partition(&index, staged.iter().cloned().map(|d| (d, ())));
                black_box(split.len())
            })
        });
    }

    group.finish();
}

fn bench_employee_sync(c: &mut Criterion) {
    let mut store = MemoryStore::new();
    store.employees = (1..=5_000)
        .map(|id| EmployeeRow {
            source_id: id,
            first_name: Some(format!("First {}", id)),
            middle_name: None,
            last_name: Some(format!("Last {}", id)),
            title: None,
            department: None,
            photo: None,
        })
        .collect();

    let mut group = c.benchmark_group("employee_sync");
    group.throughput(Throughput::Elements(store.employees.len() as u64));
    group.sample_size(10);

    group.bench_function("first_run_5000", |b| {
        b.iter(|| {
            let remote = MemoryService::new();
            let session = remote.logon("bench", "bench").unwrap();
            let mut ctx = RunContext::new(session, SyncConfig::default(), chrono::Utc::now());
            EmployeeSyncer::new(&remote).sync(&store, &mut ctx).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_partition, bench_employee_sync);
criterion_main!(benches);
