//! Shared tracing setup for the status page binaries.

mod tracing;

pub use self::tracing::{Verbosity, init, init_with_verbosity};

