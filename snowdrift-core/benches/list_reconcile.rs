//! Benchmark: keyed list reconciliation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use snowdrift_core::dom::Node;
use snowdrift_core::template::{each, element, interp};
use snowdrift_core::{flush, Component};

fn rows(ids: impl Iterator<Item = usize>) -> Value {
    Value::Array(ids.map(|id| json!({ "id": id, "label": format!("row {id}") })).collect())
}

fn mounted(len: usize) -> Component {
    let table = Component::from_value(
        element("tbody").child(
            each("rows", "row")
                .key("row.id")
                .child(element("tr").on("click", |_| Ok(())).child(interp("row.label"))),
        ),
        json!({ "rows": rows(0..len) }),
    );
    table.append_to(&Node::element("table"));
    let _ = flush();
    table
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse");
    for len in [10usize, 100, 1000] {
        let table = mounted(len);
        let forward = rows(0..len);
        let backward = rows((0..len).rev());
        let mut flipped = false;

        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                flipped = !flipped;
                let next = if flipped { &backward } else { &forward };
                table.set(json!({ "rows": next.clone() })).unwrap();
                black_box(flush()).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_append(c: &mut Criterion) {
    c.bench_function("append one to 1000", |b| {
        let table = mounted(1000);
        let list = table.state().as_record().and_then(|r| r.collection("rows")).unwrap();
        let mut next = 1000;
        b.iter(|| {
            list.add(json!({ "id": next, "label": "new" })).unwrap();
            next += 1;
            black_box(flush()).unwrap();
        })
    });
}

fn bench_item_update(c: &mut Criterion) {
    c.bench_function("update one of 1000", |b| {
        let table = mounted(1000);
        let list = table.state().as_record().and_then(|r| r.collection("rows")).unwrap();
        let target = list.items()[500].id();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            list.update(target, json!({ "label": n })).unwrap();
            black_box(flush()).unwrap();
        })
    });
}

criterion_group!(benches, bench_reverse, bench_append, bench_item_update);
criterion_main!(benches);
