use crate::error::Result;

/// Version counter of a node, bumped on every successful write.
///
/// A freshly created node has version `0`.
pub type Version = u32;

/// How a node is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// The node outlives the creating session.
    Persistent,
    /// The node is removed when the creating session ends, and the service
    /// appends a monotonically increasing, zero-padded counter to its name.
    EphemeralSequential,
}

impl CreateMode {
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, Self::EphemeralSequential)
    }

    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::EphemeralSequential)
    }
}

/// The capability a coordination service must offer to the range allocator.
///
/// Implementations are expected to be linearizable: a successful
/// [`Coordinator::write`] is immediately visible to every later
/// [`Coordinator::read`] from any session.
///
/// Paths are absolute, `/`-separated, without a trailing slash.
pub trait Coordinator {
    /// Returns `true` if a node exists at `path`.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Creates a node and returns its actual path.
    ///
    /// For [`CreateMode::EphemeralSequential`] the returned path carries the
    /// generated suffix.
    ///
    /// # Errors
    ///
    /// - [`Error::NodeExists`] if a node already lives at `path`.
    /// - [`Error::NoNode`] if the parent of `path` does not exist.
    ///
    /// [`Error::NodeExists`]: crate::Error::NodeExists
    /// [`Error::NoNode`]: crate::Error::NoNode
    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String>;

    /// Reads a node's data together with its current version.
    fn read(&self, path: &str) -> Result<(Vec<u8>, Version)>;

    /// Replaces a node's data if its version still equals `expected`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] if another writer got there first.
    ///
    /// [`Error::Conflict`]: crate::Error::Conflict
    fn write(&self, path: &str, data: &[u8], expected: Version) -> Result<Version>;

    /// Ends the session, dropping every ephemeral node it created.
    ///
    /// Backends whose sessions end on drop may rely on the default.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: Coordinator + ?Sized> Coordinator for &C {
    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        (**self).create(path, data, mode)
    }

    fn read(&self, path: &str) -> Result<(Vec<u8>, Version)> {
        (**self).read(path)
    }

    fn write(&self, path: &str, data: &[u8], expected: Version) -> Result<Version> {
        (**self).write(path, data, expected)
    }
}

/// Something able to open a session with a coordination service.
pub trait Connector {
    type Session: Coordinator;

    /// Human-readable address of the service, used in errors and logs.
    fn endpoint(&self) -> &str;

    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] when the service cannot be reached. Callers
    /// usually wrap this in a [`RetryPolicy`].
    ///
    /// [`Error::Connection`]: crate::Error::Connection
    /// [`RetryPolicy`]: crate::RetryPolicy
    fn connect(&self) -> Result<Self::Session>;
}
