//!
//! The owning handle: pairs every acquire with exactly one release through its
//! construction, clone, assignment and drop.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::error::CapabilityError;
use crate::handle::factory::Factory;
use crate::identity::{same_object, Identity, SharedIdentity};
use crate::object::{self, Capability, ReferencedObject};
use crate::types::RefCount;

/// Owning, clonable reference to the `C` view of a reference-counted object.
///
/// A non-empty handle owns one increment of the object's count. Cloning takes a
/// fresh increment, dropping gives it back. The handle is the only place calling
/// code manipulates the count; the object's own `acquire`, release entry point
/// and raw `query_capability` are `unsafe` and not needed through [`Deref`].
pub struct Handle<C: Capability> {
    raw: Option<NonNull<C>>,
    _owns: PhantomData<C>,
}

// SAFETY: a `Send + Sync` view promises atomic counting (see `ReferencedObject`),
// so increments owned by handles on different threads do not race.
unsafe impl<C: Capability + Send + Sync> Send for Handle<C> {}
// SAFETY: as above; shared access only clones (acquire) or reads through `&C`.
unsafe impl<C: Capability + Send + Sync> Sync for Handle<C> {}

impl<C: Capability> Handle<C> {
    /// A handle holding nothing.
    pub const fn empty() -> Self {
        Handle { raw: None, _owns: PhantomData }
    }

    /// Takes ownership of an increment the caller already holds (a factory or
    /// query result). No acquire is performed.
    ///
    /// # Safety
    ///
    /// `raw` must point at a live `C` and carry one increment owned by the caller,
    /// which is transferred to the handle.
    pub unsafe fn from_raw(raw: NonNull<C>) -> Self {
        Handle { raw: Some(raw), _owns: PhantomData }
    }

    /// Acquires a borrowed view and owns the new increment.
    pub fn from_ref(view: &C) -> Self {
        // SAFETY: `view` is live for this call; the increment is owned by the
        // returned handle and released when it is dropped.
        unsafe {
            view.acquire();
            Self::from_raw(NonNull::from(view))
        }
    }

    /// Asks `object` for its `C` view.
    pub fn query_from<T: ReferencedObject + ?Sized>(object: &T) -> Result<Self, CapabilityError> {
        // SAFETY: any returned increment is adopted by the handle below.
        match unsafe { object.query_capability(C::ID) } {
            // SAFETY: the reference answers a query for `C::ID` and carries the
            // increment the query performed.
            Some(raw) => Ok(unsafe { Self::from_raw(C::from_raw(raw)) }),
            None => {
                tracing::debug!(capability = %C::ID, "capability not supported by object");
                Err(CapabilityError::not_supported(C::ID))
            }
        }
    }

    /// Builds a new object through `factory` and takes its `C` view.
    pub fn create<F: Factory + ?Sized>(factory: &F) -> Result<Self, CapabilityError> {
        let raw = factory.create_instance(C::ID)?;
        // SAFETY: factories return a counted reference for the requested id.
        Ok(unsafe { Self::from_raw(C::from_raw(raw)) })
    }

    /// Queries the held object for capability `Q`. On success the returned handle
    /// owns its own increment; on failure nothing changes.
    ///
    /// # Panics
    ///
    /// Panics if the handle is empty.
    pub fn query<Q: Capability>(&self) -> Result<Handle<Q>, CapabilityError> {
        Handle::<Q>::query_from(self.view())
    }

    /// Canonical identity of the held object, or `None` when empty or refused.
    pub fn identity(&self) -> Option<Identity> {
        self.get().and_then(Identity::of)
    }

    /// Like [`identity`](Self::identity), as a token that may cross threads.
    pub fn shared_identity(&self) -> Option<SharedIdentity>
    where
        C: Send + Sync,
    {
        self.get().and_then(SharedIdentity::of)
    }

    /// Makes `self` refer to what `source` refers to.
    ///
    /// Identity is compared before either side is touched: if both already denote
    /// the same object, through whatever view, nothing happens. Otherwise the
    /// current reference is released and the source's reference acquired.
    pub fn assign(&mut self, source: &Handle<C>) {
        if self.is_same_as(source.get()) {
            return;
        }
        self.release();
        if let Some(view) = source.get() {
            // SAFETY: `source` keeps the object alive; the new increment is ours.
            unsafe { view.acquire() };
        }
        self.raw = source.raw;
    }

    /// Releases the current reference, if any, and adopts `raw` without
    /// acquiring it.
    ///
    /// # Safety
    ///
    /// Same as [`Handle::from_raw`] when `raw` is `Some`.
    pub unsafe fn attach(&mut self, raw: Option<NonNull<C>>) {
        self.release();
        tracing::trace!(capability = %C::ID, ?raw, "attached reference");
        self.raw = raw;
    }

    /// Hands the reference (and its increment) to the caller, leaving the handle
    /// empty. Nothing is released.
    pub fn detach(&mut self) -> Option<NonNull<C>> {
        let raw = self.raw.take();
        tracing::trace!(capability = %C::ID, ?raw, "detached reference");
        raw
    }

    /// By-value [`detach`](Self::detach).
    pub fn into_raw(self) -> Option<NonNull<C>> {
        let mut this = ManuallyDrop::new(self);
        this.raw.take()
    }

    /// Releases the held reference now and leaves the handle empty. Returns the
    /// count the object reported, 0 for an empty handle. The count is diagnostic.
    pub fn release(&mut self) -> RefCount {
        let Some(raw) = self.raw.take() else {
            return 0;
        };
        // SAFETY: the handle owned this increment and has forgotten the pointer.
        let remaining = unsafe { object::release(C::into_raw_ref(raw)) };
        if remaining == 0 {
            tracing::trace!(capability = %C::ID, "released final reference");
        }
        remaining
    }

    /// Releases the current reference and exposes the empty slot so a producer
    /// can write a counted reference into it.
    ///
    /// # Safety
    ///
    /// Anything written into the slot must satisfy [`Handle::from_raw`].
    pub unsafe fn out_param(&mut self) -> &mut Option<NonNull<C>> {
        self.release();
        &mut self.raw
    }

    /// Raw pointer to the held view, without touching the count.
    #[inline]
    pub fn as_raw(&self) -> Option<NonNull<C>> {
        self.raw
    }

    /// The held view, or `None` when empty.
    #[inline]
    pub fn get(&self) -> Option<&C> {
        // SAFETY: a held pointer carries an increment, so the view is live for as
        // long as `self` is borrowed.
        self.raw.map(|raw| unsafe { &*raw.as_ptr() })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Whether the handle denotes the same object as `other`.
    pub fn is_same_as<T: ReferencedObject + ?Sized>(&self, other: Option<&T>) -> bool {
        same_object(self.get(), other)
    }

    fn view(&self) -> &C {
        match self.get() {
            Some(view) => view,
            None => panic!("dereferenced an empty Handle<{}>", std::any::type_name::<C>()),
        }
    }
}

impl<C: Capability> Default for Handle<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C: Capability> Clone for Handle<C> {
    fn clone(&self) -> Self {
        match self.get() {
            Some(view) => Self::from_ref(view),
            None => Self::empty(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<C: Capability> Drop for Handle<C> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<C: Capability> Deref for Handle<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.view()
    }
}

impl<C: Capability, Q: Capability> PartialEq<Handle<Q>> for Handle<C> {
    fn eq(&self, other: &Handle<Q>) -> bool {
        self.is_same_as(other.get())
    }
}

impl<C: Capability> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("capability", &C::ID)
            .field("raw", &self.raw)
            .finish()
    }
}
