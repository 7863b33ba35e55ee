#![no_main]

// Harness: arbitrary copy/assign/release/detach/query sequences over a few
// objects must leave every acquire matched by exactly one release.

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use capref_core::testing::{Ledger, ObjectBuilder, Primary, Secondary};
use capref_core::Handle;

#[derive(Arbitrary, Debug, Clone)]
enum Op {
    Spawn { secondary: bool },
    Clone(u8),
    Assign(u8, u8),
    Release(u8),
    Drop(u8),
    DetachAttach(u8),
    Query(u8),
    DropSecondary(u8),
}

fn slot<T>(pool: &[T], index: u8) -> Option<usize> {
    (!pool.is_empty()).then(|| index as usize % pool.len())
}

fuzz_target!(|ops: Vec<Op>| {
    let ledger = Ledger::new();
    let mut primaries: Vec<Handle<Primary>> = Vec::new();
    let mut secondaries: Vec<Handle<Secondary>> = Vec::new();

    for op in ops.into_iter().take(256) {
        match op {
            Op::Spawn { secondary } => {
                let builder = ObjectBuilder::new("fuzz");
                let builder = if secondary { builder } else { builder.without_secondary() };
                primaries.push(builder.spawn_handle(&ledger));
            }
            Op::Clone(i) => {
                if let Some(i) = slot(&primaries, i) {
                    let copy = primaries[i].clone();
                    primaries.push(copy);
                }
            }
            Op::Assign(t, s) => {
                if let (Some(t), Some(s)) = (slot(&primaries, t), slot(&primaries, s)) {
                    let source = primaries[s].clone();
                    primaries[t].assign(&source);
                }
            }
            Op::Release(i) => {
                if let Some(i) = slot(&primaries, i) {
                    primaries[i].release();
                }
            }
            Op::Drop(i) => {
                if let Some(i) = slot(&primaries, i) {
                    primaries.swap_remove(i);
                }
            }
            Op::DetachAttach(i) => {
                if let Some(i) = slot(&primaries, i) {
                    let raw = primaries[i].detach();
                    unsafe { primaries[i].attach(raw) };
                }
            }
            Op::Query(i) => {
                if let Some(i) = slot(&primaries, i) {
                    if !primaries[i].is_empty() {
                        if let Ok(secondary) = primaries[i].query::<Secondary>() {
                            secondaries.push(secondary);
                        }
                    }
                }
            }
            Op::DropSecondary(i) => {
                if let Some(i) = slot(&secondaries, i) {
                    secondaries.swap_remove(i);
                }
            }
        }
    }

    drop(primaries);
    drop(secondaries);
    assert!(ledger.is_balanced(), "acquires {} releases {}", ledger.acquires(), ledger.releases());
});
