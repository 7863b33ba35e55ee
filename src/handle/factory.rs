//! Object factories.
//!
//! A `Factory` is the component responsible for bringing a new referenced object
//! into existence and handing back one counted reference to the view the caller
//! asked for. Keeping it behind a trait lets handles be created without knowing
//! any concrete object type, which is the point of the whole crate.

use crate::error::CapabilityError;
use crate::object::RawRef;
use crate::types::CapabilityId;

/// Trait implemented by anything that can construct referenced objects.
///
/// On success the returned reference answers to `id` and carries one increment
/// owned by the caller (typically adopted by [`crate::Handle::create`]). A
/// factory must not leave a half-built object alive when it fails.
pub trait Factory {
    fn create_instance(&self, id: CapabilityId) -> Result<RawRef, CapabilityError>;
}

impl<F: Factory + ?Sized> Factory for &F {
    fn create_instance(&self, id: CapabilityId) -> Result<RawRef, CapabilityError> {
        (**self).create_instance(id)
    }
}

/// Factory adapter over a closure. Handy for wiring an object constructor into
/// code that takes `&dyn Factory`.
pub struct FnFactory<F>(pub F);

impl<F> Factory for FnFactory<F>
where
    F: Fn(CapabilityId) -> Result<RawRef, CapabilityError>,
{
    fn create_instance(&self, id: CapabilityId) -> Result<RawRef, CapabilityError> {
        (self.0)(id)
    }
}
