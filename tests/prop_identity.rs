use proptest::prelude::*;
use capref_core::testing::{Ledger, ObjectBuilder, Primary, Secondary};
use capref_core::{same_object, Handle};

/// A handle over one of several objects, through either capability.
#[derive(Debug, Clone, Copy)]
struct Pick {
    object: usize,
    secondary: bool,
}

fn arb_pick(objects: usize) -> impl Strategy<Value = Pick> {
    (0..objects, any::<bool>()).prop_map(|(object, secondary)| Pick { object, secondary })
}

enum View {
    Primary(Handle<Primary>),
    Secondary(Handle<Secondary>),
}

fn open(roots: &[Handle<Primary>], pick: Pick) -> View {
    let root = &roots[pick.object];
    if pick.secondary {
        View::Secondary(root.query().unwrap())
    } else {
        View::Primary(root.clone())
    }
}

fn equal(a: &View, b: &View) -> bool {
    match (a, b) {
        (View::Primary(a), View::Primary(b)) => a == b,
        (View::Primary(a), View::Secondary(b)) => a == b,
        (View::Secondary(a), View::Primary(b)) => a == b,
        (View::Secondary(a), View::Secondary(b)) => a == b,
    }
}

proptest! {
    /// Handles compare equal exactly when they come from the same object,
    /// regardless of the capability each one exposes.
    #[test]
    fn prop_equality_iff_same_origin(
        objects in 1usize..5,
        picks in prop::collection::vec(arb_pick(5), 2..12),
    ) {
        let ledger = Ledger::new();
        let roots: Vec<Handle<Primary>> = (0..objects)
            .map(|i| ObjectBuilder::new(format!("object-{i}")).spawn_handle(&ledger))
            .collect();
        let picks: Vec<Pick> = picks
            .into_iter()
            .map(|p| Pick { object: p.object % objects, ..p })
            .collect();
        let views: Vec<View> = picks.iter().map(|&p| open(&roots, p)).collect();

        for (i, a) in views.iter().enumerate() {
            for (j, b) in views.iter().enumerate() {
                prop_assert_eq!(equal(a, b), picks[i].object == picks[j].object);
            }
        }

        drop(views);
        for root in &roots {
            prop_assert_eq!(root.ref_count(), 1);
        }
        drop(roots);
        prop_assert!(ledger.is_balanced());
    }

    /// The predicate never confirms equality for objects that refuse identity.
    #[test]
    fn prop_refused_identity_never_equal(copies in 1usize..6) {
        let ledger = Ledger::new();
        let opaque = ObjectBuilder::new("opaque").without_identity().spawn_handle(&ledger);
        let clones: Vec<_> = (0..copies).map(|_| opaque.clone()).collect();

        for copy in &clones {
            prop_assert!(!same_object(opaque.get(), copy.get()));
        }
        prop_assert_eq!(opaque.ref_count() as usize, copies + 1);
    }
}
