//! The coordination-service boundary.
//!
//! [`Coordinator`] is the only capability the allocator needs: existence
//! checks, versioned reads, versioned conditional writes and persistent or
//! ephemeral-sequential creation. [`MemoryStore`] is an in-process backend
//! implementing it, and [`RetryPolicy`] governs how sessions are opened.

mod interface;
mod memory;
mod retry;

pub use interface::*;
pub use memory::*;
pub use retry::*;
