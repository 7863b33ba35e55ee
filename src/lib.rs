#![deny(clippy::all)]
#![deny(deprecated)]
#![deny(unsafe_op_in_unsafe_fn)]

//!
//! Capref-Core is an owning handle for reference-counted, capability-queryable objects.
//!
//! Objects implement [`ReferencedObject`]: a shared acquire/release count plus a
//! runtime query for alternate capability views of themselves. [`Handle`] keeps
//! the count balanced through clone, assignment and drop, turns capability
//! queries into `Result`s, and compares handles by object identity rather than
//! by the address of whichever view they hold.

// Module for shared types (CapabilityId, RefCount).
pub mod types;

// Module for the object contract (ReferencedObject, Capability, RawRef).
pub mod object;

// Module for identity normalization and the same-object predicate.
pub mod identity;

// Module for error types.
pub mod error;

// Module for the handle itself and object factories.
pub mod handle;

// Instrumented objects used by the tests, benches and fuzz targets.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::CapabilityError;
pub use handle::{Factory, FnFactory, Handle};
pub use identity::{same_object, Identity, SharedIdentity};
pub use object::{Capability, RawRef, ReferencedObject, ReleaseFn};
pub use types::{CapabilityId, RefCount};
