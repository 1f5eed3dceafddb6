use confly::hypercube::Hypercube;
use confly::microdata::Metadata;
use confly::ptable::PTable;
use confly::rng::{Mt19937, NoiseParams};
use confly::schema::{ColumnSpec, Schema};
use confly::tuple;
use confly::value::{ColumnType, Value};
use criterion::{criterion_group, criterion_main, Criterion};

fn schema(width: usize) -> Schema {
    Schema::new(
        (0..width)
            .map(|i| ColumnSpec {
                name: format!("c{i}"),
                ty: ColumnType::Long,
                cube: i % 2 == 0,
            })
            .collect(),
    )
}

fn marginal_expansion(c: &mut Criterion) {
    let schema = schema(6);
    let mask = schema.aggregation_mask();

    c.bench_function("hypercube update (6 columns)", |b| {
        b.iter(|| {
            let mut cube = Hypercube::new(0, mask);
            for v in 0..200i64 {
                let categories: Vec<Value> = (0..6).map(|i| Value::Long(v + i as i64)).collect();
                cube.update(&schema, &categories, 0.5);
            }
            cube
        });
    });
}

fn finalise_and_emit(c: &mut Criterion) {
    let schema = schema(4);
    let mask = schema.aggregation_mask();
    let ptable = PTable::new();
    let noise = NoiseParams {
        dpf_mu: 0.0,
        dpf_b: 2.0,
        dpg_eps: 0.5,
    };

    // `meta` must cover exactly the coordinates the loop below builds,
    // or `finalise_and_emit` walks an empty Cartesian product and the
    // benchmark measures nothing.
    let mut meta = Metadata::new(schema.category_count());
    for v in 0..50i64 {
        let categories: Vec<Value> = (0..4).map(|i| Value::Long(v + i as i64)).collect();
        meta.accumulate(&tuple::apply_mask(&schema, mask, &categories));
    }
    meta.accumulate(&tuple::total_code_tuple(&schema));

    c.bench_function("hypercube finalise_and_emit (4 columns)", |b| {
        b.iter(|| {
            let mut cube = Hypercube::new(0, mask);
            for v in 0..50i64 {
                let categories: Vec<Value> = (0..4).map(|i| Value::Long(v + i as i64)).collect();
                cube.update(&schema, &categories, 0.5);
            }
            let mut rng = Mt19937::new(42);
            let mut out = Vec::new();
            cube.finalise_and_emit(&schema, &meta, &ptable, &noise, &mut rng, ';', &mut out, None)
                .unwrap();
            out
        });
    });
}

criterion_group!(benches, marginal_expansion, finalise_and_emit);
criterion_main!(benches);
