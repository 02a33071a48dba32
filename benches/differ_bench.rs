use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ecrf::differ::{plan_children, Identified};
use ecrf::identity::{classify, NodeIdentity};
use ecrf::normalize::machine_name;
use uuid::Uuid;

struct Node(NodeIdentity);

impl Identified for Node {
    fn node_identity(&self) -> NodeIdentity {
        self.0
    }
}

/// `n` persisted siblings; the payload keeps every other one, adds `n / 4`
/// new nodes and repeats the first kept id at the end.
fn sibling_lists(n: usize) -> (Vec<Node>, Vec<Uuid>) {
    let persisted: Vec<Uuid> = (0..n as u128).map(|i| Uuid::from_u128(i + 1)).collect();
    let mut incoming: Vec<Node> = persisted
        .iter()
        .step_by(2)
        .map(|id| Node(NodeIdentity::existing(*id)))
        .collect();
    incoming.extend((0..n / 4).map(|_| Node(NodeIdentity::new_node())));
    if let Some(first) = persisted.first() {
        incoming.push(Node(NodeIdentity::existing(*first)));
    }
    (incoming, persisted)
}

fn bench_plan_children(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_children");
    for n in [10usize, 100, 1_000, 10_000] {
        let (incoming, persisted) = sibling_lists(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| plan_children(black_box(&incoming), black_box(&persisted)));
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let canonical = Uuid::from_u128(0x6f1c_2a7e_9b3d_4c15_a0e2_11d4_5f6a_7b8c).to_string();
    c.bench_function("classify(canonical)", |b| {
        b.iter(|| classify(black_box(&canonical)));
    });
    c.bench_function("classify(new-173812)", |b| {
        b.iter(|| classify(black_box("new-173812")));
    });
}

fn bench_machine_name(c: &mut Criterion) {
    let label = "  Systolic   blood pressure at\tscreening visit  ";
    c.bench_function("machine_name(label)", |b| {
        b.iter(|| machine_name(black_box(label)));
    });
}

criterion_group!(benches, bench_plan_children, bench_classify, bench_machine_name);
criterion_main!(benches);
