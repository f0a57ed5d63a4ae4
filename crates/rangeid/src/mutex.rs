#[cfg(not(feature = "parking-lot"))]
pub use std::sync::Mutex;

#[cfg(feature = "parking-lot")]
pub use parking_lot::Mutex;

/// Locks `$mutex`, propagating poisoning as [`crate::Error::LockPoisoned`]
/// unless `parking-lot` (which never poisons) is enabled.
macro_rules! lock {
    ($mutex:expr) => {{
        #[cfg(feature = "parking-lot")]
        {
            $mutex.lock()
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            $mutex.lock()?
        }
    }};
}

pub(crate) use lock;
