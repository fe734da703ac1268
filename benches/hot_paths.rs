use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slurm_exporter::nodes::parse_nodes_metrics;
use slurm_exporter::scheduler::parse_scheduler_metrics;

const STATES: &[&str] = &[
    "idle", "allocated", "mixed", "down*", "drained", "completing", "reserved", "planned",
];

/// A large partition: many feature sets, states and duplicate rows.
fn sinfo_report() -> Vec<u8> {
    let mut out = String::new();
    for i in 0..2_000usize {
        let state = STATES[i % STATES.len()];
        let features = match i % 4 {
            0 => "(null)".to_string(),
            1 => format!("gpu,ib,rack{}", i % 16),
            2 => format!("rack{},ib,gpu", i % 16),
            _ => format!("bigmem,rack{}", i % 16),
        };
        out.push_str(&format!("{}|{}|{}\n", i % 32 + 1, state, features));
    }
    out.into_bytes()
}

/// A busy controller: hundreds of RPC types and users.
fn sdiag_report() -> Vec<u8> {
    let mut out = String::from(
        "Server thread count:  3\n\
         Agent queue size:     0\n\
         DBD Agent queue size: 0\n\
         \n\
         Main schedule statistics (microseconds):\n\
         \tLast cycle:   97209\n\
         \tMean cycle:   73593\n\
         \tCycles per minute: 1\n\
         \n\
         Backfilling stats\n\
         \tTotal backfilled jobs (since last slurm start): 111\n\
         \tTotal backfilled jobs (since last stats cycle start): 2\n\
         \tTotal backfilled heterogeneous job components: 0\n\
         \tLast cycle: 1942890\n\
         \tMean cycle: 1693212\n\
         \tDepth Mean: 2\n\
         \n\
         Remote Procedure Call statistics by message type\n",
    );
    for i in 0..200 {
        out.push_str(&format!(
            "\tREQUEST_TYPE_{i:<26} ( {:4}) count:{:<8} ave_time:{:<6} total_time:{}\n",
            2000 + i,
            i * 97,
            i * 3,
            i * 97 * i * 3
        ));
    }
    out.push_str("\nRemote Procedure Call statistics by user\n");
    for i in 0..500 {
        out.push_str(&format!(
            "\tuser{i:<12} ( {:8}) count:{:<8} ave_time:{:<6} total_time:{}\n",
            10_000 + i,
            i * 13,
            i,
            i * 13 * i
        ));
    }
    out.into_bytes()
}

fn bench_nodes(c: &mut Criterion) {
    let report = sinfo_report();

    c.bench_function("nodes/parse_large_partition", |b| {
        b.iter(|| {
            let metrics = parse_nodes_metrics(black_box(&report));
            black_box(metrics.signatures().count())
        })
    });
}

fn bench_scheduler(c: &mut Criterion) {
    let report = sdiag_report();

    c.bench_function("scheduler/parse_busy_controller", |b| {
        b.iter(|| {
            let snapshot = parse_scheduler_metrics(black_box(&report));
            black_box(snapshot.rpc.by_user.len())
        })
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_nodes(c);
    bench_scheduler(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
