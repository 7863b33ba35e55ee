#![cfg(test)]

use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::CapabilityError;
use crate::handle::{Factory, FnFactory, Handle};
use crate::object::{Capability, RawRef, ReferencedObject};
use crate::testing::{self, Ledger, Missing, ObjectBuilder, Primary, Secondary, TrackedFactory, MISSING_ID, SECONDARY_ID};
use crate::types::CapabilityId;

// --- Test Utilities ---

fn spawn(ledger: &Arc<Ledger>, name: &str) -> Handle<Primary> {
    ObjectBuilder::new(name).spawn_handle(ledger)
}

fn count(handle: &Handle<Primary>) -> u32 {
    handle.ref_count()
}

// --- Construction & drop ---

#[test]
fn empty_handle_owns_nothing() {
    let handle: Handle<Primary> = Handle::default();
    assert!(handle.is_empty());
    assert!(handle.get().is_none());
    assert!(handle.as_raw().is_none());
    assert!(handle.identity().is_none());
}

#[test]
fn drop_releases_exactly_once() {
    let ledger = Ledger::new();
    {
        let handle = spawn(&ledger, "scoped");
        assert_eq!(count(&handle), 1);
        assert_eq!(ledger.live_objects(), 1);
    }
    assert_eq!(ledger.live_objects(), 0);
    assert!(ledger.is_balanced());
}

#[test]
fn clone_takes_its_own_increment() {
    let ledger = Ledger::new();
    let first = spawn(&ledger, "shared");
    let second = first.clone();

    assert_eq!(count(&first), 2);
    assert_eq!(first.as_raw(), second.as_raw());
    drop(first);
    assert_eq!(count(&second), 1);
    drop(second);
    assert!(ledger.is_balanced());
}

#[test]
fn cloning_an_empty_handle_stays_empty() {
    let empty: Handle<Primary> = Handle::empty();
    assert!(empty.clone().is_empty());
}

#[test]
fn from_ref_acquires_a_borrowed_view() {
    let ledger = Ledger::new();
    let owner = spawn(&ledger, "borrowed");
    let borrowed = Handle::from_ref(&*owner);

    assert_eq!(count(&owner), 2);
    assert!(borrowed == owner);
    drop(owner);
    assert_eq!(borrowed.name(), "borrowed");
    drop(borrowed);
    assert!(ledger.is_balanced());
}

// --- Explicit release ---

#[test]
fn release_reports_remaining_count_and_empties() {
    let ledger = Ledger::new();
    let mut first = spawn(&ledger, "released");
    let mut second = first.clone();

    assert_eq!(second.release(), 1);
    assert!(second.is_empty());
    assert_eq!(second.release(), 0);
    assert_eq!(first.release(), 0);
    assert_eq!(ledger.destroyed(), 1);
    assert!(ledger.is_balanced());
}

#[test]
fn last_release_through_each_view_destroys_the_object() {
    let ledger = Ledger::new();
    let mut primary = spawn(&ledger, "last");
    let mut secondary: Handle<Secondary> = primary.query().unwrap();

    assert_eq!(primary.release(), 1);
    assert_eq!(ledger.destroyed(), 0);
    assert_eq!(secondary.release(), 0);
    assert_eq!(ledger.destroyed(), 1);
    assert!(ledger.is_balanced());
}

#[test]
fn dropping_the_last_handle_destroys_the_object() {
    let ledger = Ledger::new();
    let (first, second) = ObjectBuilder::new("aliased").spawn_aliased(&ledger);

    drop(first);
    assert_eq!(ledger.destroyed(), 0);
    drop(second);
    assert_eq!(ledger.destroyed(), 1);
    assert!(ledger.is_balanced());
}

#[test]
fn identity_token_outlives_every_handle() {
    let ledger = Ledger::new();
    let handle = spawn(&ledger, "outlived");
    let id = handle.identity().unwrap();

    drop(handle);
    assert_eq!(ledger.live_objects(), 1);
    drop(id);
    assert_eq!(ledger.live_objects(), 0);
    assert!(ledger.is_balanced());
}

// --- Raw capability query ---

#[test]
fn raw_query_result_is_owned_by_the_caller() {
    let ledger = Ledger::new();
    let handle = spawn(&ledger, "raw-query");

    let raw = unsafe { handle.query_capability(SECONDARY_ID) }.expect("object exposes Secondary");
    assert_eq!(count(&handle), 2);
    let adopted: Handle<Secondary> = unsafe { Handle::from_raw(Secondary::from_raw(raw)) };
    assert!(adopted == handle);
    drop(adopted);
    assert_eq!(count(&handle), 1);
    drop(handle);
    assert!(ledger.is_balanced());
}

#[test]
fn raw_query_for_unknown_capability_takes_no_reference() {
    let ledger = Ledger::new();
    let handle = spawn(&ledger, "raw-miss");

    assert!(unsafe { handle.query_capability(MISSING_ID) }.is_none());
    assert_eq!(count(&handle), 1);
}

// --- Attach / detach ---

#[test]
fn attach_then_detach_round_trips_without_counting() {
    let ledger = Ledger::new();
    let raw = ObjectBuilder::new("raw").spawn(&ledger);
    let acquires = ledger.acquires();

    let mut handle: Handle<Primary> = Handle::empty();
    unsafe { handle.attach(Some(raw)) };
    assert_eq!(handle.detach(), Some(raw));
    assert!(handle.is_empty());
    assert_eq!(ledger.acquires(), acquires);
    assert_eq!(ledger.releases(), 0);

    // Give the increment back to a handle so the object is torn down.
    drop(unsafe { Handle::from_raw(raw) });
    assert!(ledger.is_balanced());
}

#[test]
fn attach_releases_previous_reference() {
    let ledger = Ledger::new();
    let mut handle = spawn(&ledger, "old");
    let replacement = ObjectBuilder::new("new").spawn(&ledger);

    unsafe { handle.attach(Some(replacement)) };
    assert_eq!(ledger.destroyed(), 1);
    assert_eq!(handle.name(), "new");
    assert_eq!(count(&handle), 1);
}

#[test]
fn into_raw_skips_the_release() {
    let ledger = Ledger::new();
    let handle = spawn(&ledger, "leaving");
    let raw = handle.into_raw().expect("handle was not empty");

    assert_eq!(ledger.releases(), 0);
    let back = unsafe { Handle::from_raw(raw) };
    assert_eq!(count(&back), 1);
}

#[test]
fn out_param_accepts_a_produced_reference() {
    let ledger = Ledger::new();
    let mut handle = spawn(&ledger, "previous");

    let slot = unsafe { handle.out_param() };
    assert!(slot.is_none());
    assert_eq!(ledger.destroyed(), 1);
    *slot = Some(ObjectBuilder::new("produced").spawn(&ledger));

    assert_eq!(handle.name(), "produced");
    drop(handle);
    assert!(ledger.is_balanced());
}

// --- Assignment ---

#[test]
fn assign_replaces_and_rebalances() {
    let ledger = Ledger::new();
    let mut target = spawn(&ledger, "target");
    let source = spawn(&ledger, "source");

    target.assign(&source);
    assert_eq!(ledger.destroyed(), 1);
    assert_eq!(count(&source), 2);
    assert!(target == source);
    drop(target);
    drop(source);
    assert!(ledger.is_balanced());
}

#[test]
fn assign_from_alias_of_same_object_is_a_no_op() {
    let ledger = Ledger::new();
    let mut first = spawn(&ledger, "self");
    let alias = first.clone();
    let (acquires, releases) = (ledger.acquires(), ledger.releases());

    first.assign(&alias);
    first.clone_from(&alias);

    // Identity queries are balanced; the handles' own increments are untouched.
    assert_eq!(ledger.acquires() - acquires, ledger.releases() - releases);
    assert_eq!(count(&first), 2);
}

#[test]
fn assign_across_distinct_views_of_one_object_keeps_each_pointer() {
    let ledger = Ledger::new();
    let (mut primary, alias) = ObjectBuilder::new("two-faced").spawn_aliased(&ledger);
    let before = primary.as_raw();

    assert_ne!(primary.as_raw(), alias.as_raw());
    primary.assign(&alias);

    assert_eq!(primary.as_raw(), before);
    assert_eq!(count(&primary), 2);
    assert!(primary == alias);
}

#[test]
fn assign_empty_source_releases_target() {
    let ledger = Ledger::new();
    let mut target = spawn(&ledger, "cleared");
    target.assign(&Handle::empty());

    assert!(target.is_empty());
    assert!(ledger.is_balanced());
}

#[test]
fn assign_between_empty_handles_does_nothing() {
    let mut target: Handle<Primary> = Handle::empty();
    target.assign(&Handle::empty());
    assert!(target.is_empty());
}

// --- Member access ---

#[test]
#[should_panic(expected = "dereferenced an empty Handle")]
fn deref_of_empty_handle_panics() {
    let handle: Handle<Primary> = Handle::empty();
    let _ = handle.name();
}

#[test]
#[should_panic(expected = "dereferenced an empty Handle")]
fn query_through_empty_handle_panics() {
    let handle: Handle<Primary> = Handle::empty();
    let _ = handle.query::<Secondary>();
}

// --- Capability queries ---

#[test]
fn query_returns_a_counted_handle_of_the_new_capability() {
    let ledger = Ledger::new();
    let primary = spawn(&ledger, "queried");
    let secondary = primary.query::<Secondary>().unwrap();

    assert_eq!(count(&primary), 2);
    assert_eq!(secondary.describe(), "queried (2 refs)");
    assert!(primary == secondary);
    assert_ne!(primary.as_raw().map(NonNull::cast::<()>), secondary.as_raw().map(NonNull::cast::<()>));
}

#[test]
fn unsupported_query_leaves_count_unchanged() {
    let ledger = Ledger::new();
    let primary = ObjectBuilder::new("narrow").without_secondary().spawn_handle(&ledger);

    let err = primary.query::<Secondary>().unwrap_err();
    assert_eq!(err, CapabilityError::NotSupported { requested: SECONDARY_ID });
    assert_eq!(count(&primary), 1);

    let err = primary.query::<Missing>().unwrap_err();
    assert_eq!(err, CapabilityError::not_supported(MISSING_ID));
    assert_eq!(count(&primary), 1);
}

#[test]
fn query_from_any_view() {
    let ledger = Ledger::new();
    let primary = spawn(&ledger, "origin");
    let secondary = primary.query::<Secondary>().unwrap();

    let back = Handle::<Primary>::query_from(&*secondary).unwrap();
    assert_eq!(back.as_raw(), primary.as_raw());
    assert_eq!(count(&primary), 3);
}

// --- Equality ---

#[test]
fn handles_over_distinct_objects_differ() {
    let ledger = Ledger::new();
    let a = spawn(&ledger, "a");
    let b = spawn(&ledger, "b");
    let b_secondary = b.query::<Secondary>().unwrap();

    assert!(a != b);
    assert!(a != b_secondary);
    assert!(b == b_secondary);
    assert!(!a.is_same_as(Some(&*b)));
    assert!(a.is_same_as(Some(&*a)));
}

#[test]
fn empty_handles_compare_equal_and_differ_from_full_ones() {
    let ledger = Ledger::new();
    let full = spawn(&ledger, "full");
    let empty: Handle<Primary> = Handle::empty();
    let other_empty: Handle<Secondary> = Handle::empty();

    assert!(empty == other_empty);
    assert!(full != empty);
    assert!(!full.is_same_as(None::<&Primary>));
}

#[test]
fn objects_refusing_identity_are_never_equal() {
    let ledger = Ledger::new();
    let handle = ObjectBuilder::new("opaque").without_identity().spawn_handle(&ledger);
    let copy = handle.clone();

    assert!(handle != copy);
}

// --- Factories ---

#[test]
fn create_adopts_the_factory_increment() {
    let ledger = Ledger::new();
    let factory = ObjectBuilder::new("made").factory(&ledger);

    let handle = Handle::<Secondary>::create(&factory).unwrap();
    assert_eq!(handle.ref_count(), 1);
    drop(handle);
    assert!(ledger.is_balanced());
}

#[test]
fn create_reports_unsupported_capability_without_leaking() {
    let ledger = Ledger::new();
    let factory = ObjectBuilder::new("narrow").without_secondary().factory(&ledger);

    let err = Handle::<Secondary>::create(&factory).unwrap_err();
    assert_eq!(err, CapabilityError::not_supported(SECONDARY_ID));
    assert_eq!(ledger.created(), 1);
    assert!(ledger.is_balanced());
}

#[test]
fn create_surfaces_factory_failure() {
    let ledger = Ledger::new();
    let factory = ObjectBuilder::new("broken").failing("out of filters").factory(&ledger);

    let err = Handle::<Primary>::create(&factory).unwrap_err();
    assert_eq!(err, CapabilityError::CreationFailed("out of filters".to_string()));
    assert_eq!(ledger.created(), 0);
}

#[test]
fn closure_and_trait_object_factories() {
    let ledger = Ledger::new();
    let inner: TrackedFactory = ObjectBuilder::new("wrapped").factory(&ledger);
    let wrapped = FnFactory(move |id: CapabilityId| -> Result<RawRef, CapabilityError> { inner.create_instance(id) });
    let dynamic: &dyn Factory = &wrapped;

    let handle = Handle::<Primary>::create(dynamic).unwrap();
    assert_eq!(handle.name(), "wrapped");
    let by_ref = Handle::<Primary>::create(&dynamic).unwrap();
    assert!(handle != by_ref);
}

// --- Debug ---

#[test]
fn debug_names_the_capability() {
    let handle: Handle<Primary> = Handle::empty();
    let text = format!("{:?}", handle);
    assert!(text.contains("Handle"));
    assert!(text.contains(&testing::PRIMARY_ID.to_string()));
    assert!(text.contains("None"));
}
