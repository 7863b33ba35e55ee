pub mod core;
pub mod factory;

#[cfg(test)]
mod tests;

// Re-export the primary types so `crate::handle::*` paths stay short.
pub use self::core::Handle;
pub use self::factory::{Factory, FnFactory};
