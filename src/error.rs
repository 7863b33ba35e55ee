//!
//! Defines error types for capability queries and object creation.

use crate::types::CapabilityId;

/// Recoverable failures surfaced by handle operations. Lifetime bookkeeping
/// violations (dereferencing an empty handle and the like) are not represented
/// here; they are programming errors and panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// The object does not implement the requested capability.
    #[error("Capability {requested} is not supported by the object")]
    NotSupported {
        /// The capability that was asked for.
        requested: CapabilityId,
    },
    /// A factory could not produce a new object.
    #[error("Object creation failed: {0}")]
    CreationFailed(String),
}

impl CapabilityError {
    /// Shorthand for [`CapabilityError::NotSupported`].
    pub fn not_supported(requested: CapabilityId) -> Self {
        CapabilityError::NotSupported { requested }
    }
}
