//! Instrumented referenced objects for tests, benches and fuzzing.
//!
//! A `TrackedObject` lives on the heap with an atomic count and exposes up to
//! three views at distinct addresses: two `Primary` views (the second one is an
//! alias, to exercise identity across different pointers of the same type) and a
//! `Secondary` view. Every acquire, release, query and destruction is recorded in
//! a shared [`Ledger`] so tests can assert the bookkeeping balances.

use std::convert::Infallible;
use std::ptr::{addr_of_mut, NonNull};
use std::sync::atomic::{fence, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::CapabilityError;
use crate::handle::{Factory, Handle};
use crate::object::{Capability, RawRef, ReferencedObject, ReleaseFn};
use crate::types::{CapabilityId, RefCount};

pub const PRIMARY_ID: CapabilityId = CapabilityId::from_u128(0x2f8b_41c0_77d3_4a8e_9c51_0d6e_a1b2_c3d4);
pub const SECONDARY_ID: CapabilityId = CapabilityId::from_u128(0x5a3e_9d12_0b6f_4c77_8e20_f1a4_b5c6_d7e8);
/// Never implemented by tracked objects.
pub const MISSING_ID: CapabilityId = CapabilityId::from_u128(0x9c07_e6a5_3f18_4b2d_a0c9_1e2f_3a4b_5c6d);

/// Counters shared by every object spawned against it.
#[derive(Debug, Default)]
pub struct Ledger {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    queries: AtomicUsize,
}

impl Ledger {
    pub fn new() -> Arc<Ledger> {
        Arc::new(Ledger::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn live_objects(&self) -> usize {
        self.created() - self.destroyed()
    }

    /// Every acquire was released and every object destroyed.
    pub fn is_balanced(&self) -> bool {
        self.acquires() == self.releases() && self.created() == self.destroyed()
    }
}

/// The heap object behind every tracked view. It is also the identity view.
pub struct TrackedObject {
    origin: NonNull<TrackedObject>,
    count: AtomicU32,
    name: String,
    ledger: Arc<Ledger>,
    exposes_secondary: bool,
    exposes_identity: bool,
    primary: Primary,
    alias: Primary,
    secondary: Secondary,
}

// SAFETY: the count is atomic and nothing else is mutated after construction.
unsafe impl Send for TrackedObject {}
// SAFETY: as above.
unsafe impl Sync for TrackedObject {}

impl TrackedObject {
    fn allocate(builder: &ObjectBuilder, ledger: &Arc<Ledger>) -> NonNull<TrackedObject> {
        let raw = Box::into_raw(Box::new(TrackedObject {
            origin: NonNull::dangling(),
            count: AtomicU32::new(0),
            name: builder.name.clone(),
            ledger: Arc::clone(ledger),
            exposes_secondary: builder.secondary,
            exposes_identity: builder.identity,
            primary: Primary { object: NonNull::dangling() },
            alias: Primary { object: NonNull::dangling() },
            secondary: Secondary { object: NonNull::dangling() },
        }));
        ledger.created.fetch_add(1, Ordering::SeqCst);
        // SAFETY: `raw` comes from `Box::into_raw` and is not shared yet.
        unsafe {
            let origin = NonNull::new_unchecked(raw);
            (*raw).origin = origin;
            (*raw).primary.object = origin;
            (*raw).alias.object = origin;
            (*raw).secondary.object = origin;
            origin
        }
    }

    /// # Safety
    /// `object` must be live.
    unsafe fn acquire_object(object: NonNull<TrackedObject>) {
        // SAFETY: caller guarantees liveness.
        let this = unsafe { object.as_ref() };
        this.count.fetch_add(1, Ordering::Relaxed);
        this.ledger.acquires.fetch_add(1, Ordering::SeqCst);
    }

    /// # Safety
    /// The caller must own one increment of `object`.
    unsafe fn release_object(object: NonNull<TrackedObject>) -> RefCount {
        // SAFETY: the caller's increment keeps the object alive until the
        // decrement below.
        let this = unsafe { object.as_ref() };
        this.ledger.releases.fetch_add(1, Ordering::SeqCst);
        let previous = this.count.fetch_sub(1, Ordering::Release);
        assert!(previous > 0, "tracked object `{}` released past zero", this.name);
        if previous != 1 {
            return previous - 1;
        }
        fence(Ordering::Acquire);
        this.ledger.destroyed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(name = %this.name, "destroying tracked object");
        // SAFETY: the count reached zero, so no other reference remains, and
        // `object` is the pointer `Box::into_raw` produced.
        drop(unsafe { Box::from_raw(object.as_ptr()) });
        0
    }

    /// # Safety
    /// `object` must be live.
    unsafe fn query_object(object: NonNull<TrackedObject>, id: CapabilityId) -> Option<RawRef> {
        // SAFETY: caller guarantees liveness.
        let this = unsafe { object.as_ref() };
        this.ledger.queries.fetch_add(1, Ordering::SeqCst);
        let ptr = object.as_ptr();
        // SAFETY: field projections of a live allocation are non-null.
        let raw: RawRef = unsafe {
            if id.is_identity() && this.exposes_identity {
                object
            } else if id == Primary::ID {
                Primary::into_raw_ref(NonNull::new_unchecked(addr_of_mut!((*ptr).primary)))
            } else if id == Secondary::ID && this.exposes_secondary {
                Secondary::into_raw_ref(NonNull::new_unchecked(addr_of_mut!((*ptr).secondary)))
            } else {
                return None;
            }
        };
        // SAFETY: still live; the increment travels with `raw`.
        unsafe { Self::acquire_object(object) };
        Some(raw)
    }

    fn ref_count(&self) -> RefCount {
        self.count.load(Ordering::Acquire)
    }

    /// # Safety
    /// `view` must address a live `TrackedObject` whose increment the caller owns.
    unsafe fn release_identity(view: NonNull<()>) -> RefCount {
        // SAFETY: forwarded caller contract.
        unsafe { Self::release_object(view.cast()) }
    }
}

// SAFETY: every entry point goes through the shared, atomic count, release only
// touches the object through its `Box` pointer, and the identity answer is always
// the object's own address.
unsafe impl ReferencedObject for TrackedObject {
    unsafe fn acquire(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { Self::acquire_object(self.origin) }
    }

    fn release_fn(&self) -> ReleaseFn {
        Self::release_identity
    }

    unsafe fn query_capability(&self, id: CapabilityId) -> Option<RawRef> {
        // SAFETY: `&self` proves liveness.
        unsafe { Self::query_object(self.origin, id) }
    }
}

/// The view every tracked object implements.
pub struct Primary {
    object: NonNull<TrackedObject>,
}

// SAFETY: forwards to the atomic object.
unsafe impl Send for Primary {}
// SAFETY: as above.
unsafe impl Sync for Primary {}

impl Primary {
    /// # Safety
    /// `view` must address a live `Primary` whose increment the caller owns.
    unsafe fn release_view(view: NonNull<()>) -> RefCount {
        // SAFETY: the object pointer is read through the raw view and copied
        // out before the decrement, so nothing borrows the view while the
        // object may free itself.
        unsafe { TrackedObject::release_object((*view.cast::<Primary>().as_ptr()).object) }
    }

    pub fn name(&self) -> &str {
        // SAFETY: a live view implies a live object.
        unsafe { &self.object.as_ref().name }
    }

    /// Current count of the underlying object.
    pub fn ref_count(&self) -> RefCount {
        // SAFETY: a live view implies a live object.
        unsafe { self.object.as_ref().ref_count() }
    }
}

// SAFETY: forwards to `TrackedObject`.
unsafe impl ReferencedObject for Primary {
    unsafe fn acquire(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { TrackedObject::acquire_object(self.object) }
    }

    fn release_fn(&self) -> ReleaseFn {
        Self::release_view
    }

    unsafe fn query_capability(&self, id: CapabilityId) -> Option<RawRef> {
        // SAFETY: `&self` proves liveness.
        unsafe { TrackedObject::query_object(self.object, id) }
    }
}

// SAFETY: queries for PRIMARY_ID return the address of a `Primary` field.
unsafe impl Capability for Primary {
    const ID: CapabilityId = PRIMARY_ID;
}

/// Optional view; objects built `without_secondary` refuse it.
pub struct Secondary {
    object: NonNull<TrackedObject>,
}

// SAFETY: forwards to the atomic object.
unsafe impl Send for Secondary {}
// SAFETY: as above.
unsafe impl Sync for Secondary {}

impl Secondary {
    /// # Safety
    /// `view` must address a live `Secondary` whose increment the caller owns.
    unsafe fn release_view(view: NonNull<()>) -> RefCount {
        // SAFETY: as for `Primary::release_view`.
        unsafe { TrackedObject::release_object((*view.cast::<Secondary>().as_ptr()).object) }
    }

    pub fn describe(&self) -> String {
        // SAFETY: a live view implies a live object.
        let object = unsafe { self.object.as_ref() };
        format!("{} ({} refs)", object.name, object.ref_count())
    }

    pub fn ref_count(&self) -> RefCount {
        // SAFETY: a live view implies a live object.
        unsafe { self.object.as_ref().ref_count() }
    }
}

// SAFETY: forwards to `TrackedObject`.
unsafe impl ReferencedObject for Secondary {
    unsafe fn acquire(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { TrackedObject::acquire_object(self.object) }
    }

    fn release_fn(&self) -> ReleaseFn {
        Self::release_view
    }

    unsafe fn query_capability(&self, id: CapabilityId) -> Option<RawRef> {
        // SAFETY: `&self` proves liveness.
        unsafe { TrackedObject::query_object(self.object, id) }
    }
}

// SAFETY: queries for SECONDARY_ID return the address of a `Secondary` field.
unsafe impl Capability for Secondary {
    const ID: CapabilityId = SECONDARY_ID;
}

/// A capability no tracked object implements. It cannot be constructed.
pub struct Missing {
    never: Infallible,
}

// SAFETY: uninhabited.
unsafe impl ReferencedObject for Missing {
    unsafe fn acquire(&self) {
        match self.never {}
    }

    fn release_fn(&self) -> ReleaseFn {
        match self.never {}
    }

    unsafe fn query_capability(&self, _id: CapabilityId) -> Option<RawRef> {
        match self.never {}
    }
}

// SAFETY: no object ever answers MISSING_ID.
unsafe impl Capability for Missing {
    const ID: CapabilityId = MISSING_ID;
}

/// Describes the tracked object to spawn.
#[derive(Debug, Clone)]
pub struct ObjectBuilder {
    name: String,
    secondary: bool,
    identity: bool,
    fail_creation: Option<String>,
}

impl ObjectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectBuilder { name: name.into(), secondary: true, identity: true, fail_creation: None }
    }

    /// The object refuses `Secondary` queries.
    pub fn without_secondary(mut self) -> Self {
        self.secondary = false;
        self
    }

    /// The object refuses identity queries.
    pub fn without_identity(mut self) -> Self {
        self.identity = false;
        self
    }

    /// Factories built from this blueprint fail with `CreationFailed(reason)`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_creation = Some(reason.into());
        self
    }

    /// Spawns an object and returns its primary view carrying the single
    /// increment the object starts with.
    pub fn spawn(&self, ledger: &Arc<Ledger>) -> NonNull<Primary> {
        let object = TrackedObject::allocate(self, ledger);
        // SAFETY: freshly allocated; the increment goes to the caller with the view.
        unsafe {
            TrackedObject::acquire_object(object);
            NonNull::new_unchecked(addr_of_mut!((*object.as_ptr()).primary))
        }
    }

    pub fn spawn_handle(&self, ledger: &Arc<Ledger>) -> Handle<Primary> {
        // SAFETY: `spawn` transfers one increment with the view.
        unsafe { Handle::from_raw(self.spawn(ledger)) }
    }

    /// Spawns an object and returns handles over its two distinct `Primary`
    /// views (count 2).
    pub fn spawn_aliased(&self, ledger: &Arc<Ledger>) -> (Handle<Primary>, Handle<Primary>) {
        let object = TrackedObject::allocate(self, ledger);
        // SAFETY: freshly allocated; each handle adopts one increment.
        unsafe {
            TrackedObject::acquire_object(object);
            TrackedObject::acquire_object(object);
            let ptr = object.as_ptr();
            (
                Handle::from_raw(NonNull::new_unchecked(addr_of_mut!((*ptr).primary))),
                Handle::from_raw(NonNull::new_unchecked(addr_of_mut!((*ptr).alias))),
            )
        }
    }

    pub fn factory(&self, ledger: &Arc<Ledger>) -> TrackedFactory {
        TrackedFactory { blueprint: self.clone(), ledger: Arc::clone(ledger) }
    }
}

/// Factory spawning tracked objects from a blueprint.
#[derive(Debug, Clone)]
pub struct TrackedFactory {
    blueprint: ObjectBuilder,
    ledger: Arc<Ledger>,
}

impl Factory for TrackedFactory {
    fn create_instance(&self, id: CapabilityId) -> Result<RawRef, CapabilityError> {
        if let Some(reason) = &self.blueprint.fail_creation {
            return Err(CapabilityError::CreationFailed(reason.clone()));
        }
        let object = TrackedObject::allocate(&self.blueprint, &self.ledger);
        // SAFETY: the creation increment keeps the object alive across the query
        // and is released afterwards, destroying the object if the query failed.
        unsafe {
            TrackedObject::acquire_object(object);
            let answer = TrackedObject::query_object(object, id);
            TrackedObject::release_object(object);
            answer.ok_or(CapabilityError::not_supported(id))
        }
    }
}

/// Installs a fmt subscriber writing through the test harness. Safe to call
/// from every test; only the first call wins.
#[cfg(feature = "test-utils")]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
