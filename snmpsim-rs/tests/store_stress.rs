//! Concurrent access to one composite variable: readers must never observe
//! a block that mixes two writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use snmpsim::script::parse_program;
use snmpsim::store::ValueStore;
use snmpsim::value::Value;

const OID: &str = ".1.3.6.1.4.1.5.1";

fn store() -> Arc<ValueStore> {
    let src = "var\n \
        block: .1.3.6.1.4.1.5.1 bytes { a: 0 4, b: 4 4, c: 8 8 } readwrite\n\
        endvar\nrun\nendrun\n";
    let program = parse_program(src).unwrap();
    let (store, _inbox) = ValueStore::load(&program.types);
    Arc::new(store)
}

fn uniform(block: &[u8]) -> bool {
    block.iter().all(|&b| b == block[0])
}

#[test]
fn whole_block_sets_are_atomic() {
    let store = store();
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..4u8)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2_000u32 {
                    let byte = w.wrapping_mul(61).wrapping_add(i as u8);
                    store.set(OID, Value::Composite(vec![byte; 16])).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !done.load(Ordering::Relaxed) {
                    match store.get(OID) {
                        Some(Value::Composite(block)) => {
                            assert_eq!(block.len(), 16);
                            assert!(uniform(&block), "torn read: {block:?}");
                            seen += 1;
                        }
                        other => panic!("unexpected {other:?}"),
                    }
                }
                seen
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().unwrap();
    }
}

/// Field writes from the script side interleave with whole-block sets
/// without losing either.
#[test]
fn field_writes_and_block_sets_interleave() {
    let store = store();
    let layout = store.types().get("block").unwrap().layout.clone().unwrap();
    let a = layout.field("a").unwrap().clone();
    let c = layout.field("c").unwrap().clone();

    let setter = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..1_000 {
                store.set(OID, Value::Composite(vec![0; 16])).unwrap();
            }
        })
    };
    let field_writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 1..=1_000u64 {
                store.write_field("block", &a, i).unwrap();
                let got = store.read_field("block", &a).unwrap();
                // Either our write or a reset that landed after it.
                assert!(got == i || got == 0, "field a read back {got}");
            }
        })
    };
    setter.join().unwrap();
    field_writer.join().unwrap();

    store.write_field("block", &c, u64::MAX).unwrap();
    assert_eq!(store.read_field("block", &c).unwrap(), u64::MAX);
    match store.read("block") {
        Some(Value::Composite(block)) => assert!(block[8..].iter().all(|&b| b == 0xff)),
        other => panic!("unexpected {other:?}"),
    }
}
