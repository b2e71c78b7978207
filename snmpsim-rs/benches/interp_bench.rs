use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use snmpsim::script::{parse_program, Interpreter};
use snmpsim::store::ValueStore;

fn loop_script(iterations: u32) -> String {
    format!(
        "var
    count:  1.1.0 counter
    total:  1.2.0 integer
    flags:  1.3.0 bitset [3 = 'odd']
    engine: 1.4.0 bytes {{ state: 0 1, temp: 1 2 }}
    label:  1.5.0 string
    i:      integer
endvar
run
    loop times {iterations}
        i = i + 1
        count = count + 1
        total = (total + i * 3) / 2
        if i / 2 * 2 = i
            flags = []
        else
            flags = ['odd']
        endif
        engine:temp = engine:temp + 1
        label = \"step \" + strInt(i)
    endloop
endrun
"
    )
}

fn bench_interp(c: &mut Criterion) {
    let small = loop_script(100);
    let large = loop_script(10_000);

    let mut g = c.benchmark_group("interp");

    g.bench_function("parse", |b| b.iter(|| parse_program(black_box(&large)).unwrap()));

    for (name, src) in [("run_100", &small), ("run_10000", &large)] {
        let program = parse_program(src).unwrap();
        g.bench_function(name, |b| {
            b.iter(|| {
                let (store, inbox) = ValueStore::load(&program.types);
                Interpreter::new(&program, Arc::new(store), inbox, Vec::new())
                    .run()
                    .unwrap()
            })
        });
    }

    g.finish();
}

criterion_group!(benches, bench_interp);
criterion_main!(benches);
