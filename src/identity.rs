//!
//! Object identity. Views of one object may live at different addresses, so
//! "same object" is decided by normalizing both sides to the identity capability
//! and comparing those addresses.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::object::{self, address_of, RawRef, ReferencedObject};
use crate::types::CapabilityId;

/// A counted reference to an object's identity view. Equal and hashed by the
/// identity address, so it can key maps by underlying object. Releases its
/// reference when dropped.
pub struct Identity {
    raw: RawRef,
}

impl Identity {
    /// Queries `object` for its identity. `None` if the object refuses the query.
    pub fn of<T: ReferencedObject + ?Sized>(object: &T) -> Option<Identity> {
        // SAFETY: the returned increment is owned by the token.
        unsafe { object.query_capability(CapabilityId::IDENTITY) }.map(|raw| Identity { raw })
    }

    /// The canonical address of the object.
    #[inline]
    pub fn addr(&self) -> *const () {
        address_of(self.raw)
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        // SAFETY: `self.raw` holds an increment, so the object is alive; the new
        // increment is owned by the returned token.
        unsafe { self.raw.as_ref().acquire() };
        Identity { raw: self.raw }
    }
}

impl Drop for Identity {
    fn drop(&mut self) {
        // SAFETY: the token owns exactly one increment and never uses `raw` again.
        unsafe { object::release(self.raw) };
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.addr()).finish()
    }
}

/// An [`Identity`] taken from a `Send + Sync` view, so it can key maps shared
/// between threads. Such views promise atomic counting, which covers every view
/// of the same object, the identity view included.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SharedIdentity(Identity);

// SAFETY: only built from `Send + Sync` views, whose object counts atomically;
// the token itself only acquires, releases and compares addresses.
unsafe impl Send for SharedIdentity {}
// SAFETY: as above.
unsafe impl Sync for SharedIdentity {}

impl SharedIdentity {
    pub fn of<T: ReferencedObject + Send + Sync + ?Sized>(object: &T) -> Option<SharedIdentity> {
        Identity::of(object).map(SharedIdentity)
    }

    #[inline]
    pub fn addr(&self) -> *const () {
        self.0.addr()
    }
}

impl From<SharedIdentity> for Identity {
    fn from(shared: SharedIdentity) -> Self {
        shared.0
    }
}

/// Tests whether two possibly-empty references denote the same object.
///
/// Both empty is equal, one empty is not. Otherwise both sides are queried for
/// their identity and the addresses compared. A refused identity query makes
/// the result `false`; equality is only ever reported on positive confirmation.
pub fn same_object<A, B>(a: Option<&A>, b: Option<&B>) -> bool
where
    A: ReferencedObject + ?Sized,
    B: ReferencedObject + ?Sized,
{
    match (a, b) {
        (None, None) => true,
        (Some(_), None) | (None, Some(_)) => false,
        (Some(a), Some(b)) => {
            let Some(left) = Identity::of(a) else {
                tracing::warn!("identity query refused on left operand; treating objects as distinct");
                return false;
            };
            let Some(right) = Identity::of(b) else {
                tracing::warn!("identity query refused on right operand; treating objects as distinct");
                return false;
            };
            left == right
        }
    }
}
