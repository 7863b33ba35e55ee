//! The contract every referenced object honors, and the typed capability views
//! handles are generic over.

use std::ptr::NonNull;

use crate::types::{CapabilityId, RefCount};

/// A counted reference to some capability view of an object, with its concrete
/// view type erased. This is what `query_capability` and factories hand out.
pub type RawRef = NonNull<dyn ReferencedObject>;

/// Drops one reference from the view at the given address. Receives the view's
/// address rather than `&self`: the object may free itself before returning, so
/// no reference to it can be live across the call.
pub type ReleaseFn = unsafe fn(view: NonNull<()>) -> RefCount;

/// An object with its own reference count that can be asked for alternate
/// capability views of itself.
///
/// Lifetime control goes through [`crate::Handle`]. Every operation that moves
/// the count is `unsafe`, so calling code reaching the object through a handle's
/// `Deref` cannot unbalance the handle's bookkeeping from safe code.
///
/// # Safety
///
/// Implementors must guarantee that:
/// * `acquire` increments and the function returned by `release_fn` decrements
///   one shared count, and the object (including every view handed out) stays
///   valid while the count is above zero;
/// * the `ReleaseFn` accepts the address of this view, touches the object only
///   through pointers (never through a reference held across deallocation), and
///   destroys the object when the count reaches zero;
/// * every `Some` returned by `query_capability` carries one increment that the
///   receiver owns;
/// * a query for [`CapabilityId::IDENTITY`] through any view of the object
///   yields a reference with the same data address;
/// * the count is updated atomically if the view type is `Sync`.
pub unsafe trait ReferencedObject {
    /// Adds one reference.
    ///
    /// # Safety
    ///
    /// Each call must later be matched by exactly one release.
    unsafe fn acquire(&self);

    /// The release entry point for this view. Reading it does not touch the
    /// count; use [`release`] to drop a reference.
    fn release_fn(&self) -> ReleaseFn;

    /// Asks for another view of this object. `None` means the capability is not
    /// implemented.
    ///
    /// # Safety
    ///
    /// A returned reference carries one increment the caller must hand to an
    /// owner (a [`crate::Handle`], an [`crate::Identity`]) or release.
    unsafe fn query_capability(&self, id: CapabilityId) -> Option<RawRef>;
}

/// Drops the increment carried by `raw`. Returns the count the object reported.
///
/// # Safety
///
/// The caller must own the increment and must not use `raw` afterwards.
pub unsafe fn release(raw: RawRef) -> RefCount {
    // SAFETY: the caller's increment keeps the view alive; the borrow ends
    // before the entry point runs.
    let release_fn = unsafe { raw.as_ref() }.release_fn();
    // SAFETY: forwarded caller contract.
    unsafe { release_fn(raw.cast()) }
}

/// A typed capability view that handles can hold.
///
/// # Safety
///
/// A `Some(raw)` returned by any object's `query_capability(Self::ID)` must have
/// its data address pointing at a live `Self`.
pub unsafe trait Capability: ReferencedObject + Sized + 'static {
    const ID: CapabilityId;

    /// Recovers the typed view from a reference produced for `Self::ID`.
    ///
    /// # Safety
    ///
    /// `raw` must come from a query (or factory) for `Self::ID`.
    #[inline]
    unsafe fn from_raw(raw: RawRef) -> NonNull<Self> {
        raw.cast::<Self>()
    }

    /// Erases the view type. Implementors use this to answer queries.
    #[inline]
    fn into_raw_ref(view: NonNull<Self>) -> RawRef {
        view
    }
}

/// Data address of a raw reference, with the vtable dropped. Two references to
/// the same view compare equal through this regardless of how they were erased.
#[inline]
pub(crate) fn address_of(raw: RawRef) -> *const () {
    raw.as_ptr() as *const ()
}
