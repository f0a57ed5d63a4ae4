use rangeid::{BasicIdDispenser, MemorySession, MemoryStore};

/// Coordination backend the workers connect through.
///
/// All workers of the process share one store, and with it one pool.
pub type Backend = MemoryStore;

/// Dispenser owned by each worker task.
///
/// Each one is a separate instance with its own session and app node.
pub type Dispenser = BasicIdDispenser<MemorySession>;
