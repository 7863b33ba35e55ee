//! Shared types used across the handle, identity and object modules.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Identifier naming a capability (an interface an object may or may not implement).
/// Objects are asked for capabilities by id at runtime; the id is the only thing
/// the lifetime protocol knows about a capability.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(pub Uuid);

impl CapabilityId {
    /// The identity capability. Every referenced object answers a query for it
    /// with its canonical identity reference, whichever view the query went through.
    pub const IDENTITY: CapabilityId = CapabilityId(Uuid::nil());

    /// Builds an id from its 128-bit value. Usable in `const` position, which is
    /// how `Capability::ID` constants are declared.
    #[inline]
    pub const fn from_u128(value: u128) -> Self {
        CapabilityId(Uuid::from_u128(value))
    }

    /// Returns the 128-bit value of the id.
    #[inline]
    pub const fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CapabilityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(CapabilityId)
    }
}

impl From<Uuid> for CapabilityId {
    fn from(value: Uuid) -> Self {
        CapabilityId(value)
    }
}

/// Reference count reported back by `release`. Informational only: callers must
/// never make lifetime decisions from it.
pub type RefCount = u32;
