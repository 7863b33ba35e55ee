#![no_main]

// Harness: equality between handles over arbitrary objects and views agrees
// with the object each handle was opened on.

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use capref_core::testing::{Ledger, ObjectBuilder, Primary, Secondary};
use capref_core::Handle;

#[derive(Arbitrary, Debug, Clone, Copy)]
struct Pick {
    object: u8,
    secondary: bool,
}

fuzz_target!(|input: (u8, Vec<Pick>)| {
    let (objects, picks) = input;
    let objects = (objects % 4) as usize + 1;
    let ledger = Ledger::new();
    let roots: Vec<Handle<Primary>> = (0..objects).map(|_| ObjectBuilder::new("fuzz").spawn_handle(&ledger)).collect();

    let opened: Vec<(usize, Option<Handle<Secondary>>, Handle<Primary>)> = picks
        .iter()
        .take(16)
        .map(|p| {
            let object = p.object as usize % objects;
            let secondary = p.secondary.then(|| roots[object].query::<Secondary>().unwrap());
            (object, secondary, roots[object].clone())
        })
        .collect();

    for (a_obj, a_sec, a_pri) in &opened {
        for (b_obj, b_sec, b_pri) in &opened {
            let expected = a_obj == b_obj;
            assert_eq!(a_pri == b_pri, expected);
            if let Some(b_sec) = b_sec {
                assert_eq!(a_pri == b_sec, expected);
            }
            if let (Some(a_sec), Some(b_sec)) = (a_sec, b_sec) {
                assert_eq!(a_sec == b_sec, expected);
            }
        }
    }

    drop(opened);
    drop(roots);
    assert!(ledger.is_balanced());
});
