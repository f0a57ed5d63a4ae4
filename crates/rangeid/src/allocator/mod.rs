mod pool;

pub use pool::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    codec::NodeRecord,
    coordination::{Connector, Coordinator, CreateMode, RetryPolicy, Version},
    error::{Error, Result},
    range::IdRange,
};

/// Name prefix of the per-instance app nodes living under the pool path.
pub const APP_NODE_PREFIX: &str = "app_";

/// The app node this instance owns, and the range it currently holds.
#[derive(Clone, Debug, PartialEq, Eq)]
struct AppNode {
    path: String,
    range: IdRange,
}

/// Per-instance range bookkeeping.
///
/// The allocator owns the coordination session (through its [`RangePool`])
/// and the app node created in that session. Its lifecycle is:
///
/// ```text
/// Unregistered --register/claim--> RangeHeld --rotate--> RangeHeld ...
/// ```
///
/// There is no unregister: the app node is ephemeral and disappears with the
/// session, either through [`RangeAllocator::close`] or because the process
/// died. Whatever was left of its range is never issued by anyone.
pub struct RangeAllocator<C: Coordinator> {
    pool: RangePool<C>,
    node: Option<AppNode>,
}

impl<C: Coordinator> RangeAllocator<C> {
    /// Wraps a pool whose session has not registered an app node yet.
    pub const fn new(pool: RangePool<C>) -> Self {
        Self { pool, node: None }
    }

    /// The startup sequence of an instance: open a session, make sure the
    /// pool exists, then claim a range and register.
    ///
    /// `retry` covers the connection and is kept for every later round trip
    /// of this allocator, overriding the policy in `config`.
    ///
    /// Every step must succeed. An instance that could not register never
    /// comes up half-initialized.
    pub fn bootstrap<K>(connector: &K, retry: RetryPolicy, config: PoolConfig) -> Result<Self>
    where
        K: Connector<Session = C>,
    {
        let session = retry.connect(connector)?;
        let pool = RangePool::new(session, config.with_retry(retry));
        pool.ensure_exists()?;

        let mut allocator = Self::new(pool);
        allocator.claim()?;
        Ok(allocator)
    }

    pub const fn pool(&self) -> &RangePool<C> {
        &self.pool
    }

    /// Policy applied to transient failures of each coordination step.
    pub const fn retry(&self) -> RetryPolicy {
        self.pool.config().retry()
    }

    pub const fn is_registered(&self) -> bool {
        self.node.is_some()
    }

    /// Path of this instance's app node, once registered.
    pub fn node_path(&self) -> Option<&str> {
        self.node.as_ref().map(|node| node.path.as_str())
    }

    /// The range this instance currently draws from.
    pub fn current_range(&self) -> Option<IdRange> {
        self.node.as_ref().map(|node| node.range)
    }

    /// Creates this instance's ephemeral-sequential app node holding
    /// `(range.start, range.end)` and returns its path.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRegistered`] if this allocator already owns a node.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(%range)))]
    pub fn register(&mut self, range: IdRange) -> Result<&str> {
        if let Some(node) = &self.node {
            return Err(Error::AlreadyRegistered {
                path: node.path.clone(),
            });
        }

        let prefix = format!("{}/{APP_NODE_PREFIX}", self.pool.path());
        let record = NodeRecord::new(range.start(), range.end());
        let data = record.to_be_bytes();
        let path = self.retry().run(|_| {
            self.pool
                .client()
                .create(&prefix, &data, CreateMode::EphemeralSequential)
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!(node = %path, "registered app node");

        let node = self.node.insert(AppNode { path, range });
        Ok(node.path.as_str())
    }

    /// Acquires a range from the pool and registers with it.
    pub fn claim(&mut self) -> Result<IdRange> {
        if let Some(node) = &self.node {
            return Err(Error::AlreadyRegistered {
                path: node.path.clone(),
            });
        }
        let range = self.pool.acquire_range()?;
        self.register(range)?;
        Ok(range)
    }

    /// Replaces the exhausted range with a fresh one from the pool and
    /// persists `(new.start, new.end)` in the app node.
    ///
    /// If the pool write succeeds but the node write fails, the new range is
    /// lost to everyone, which is the same outcome as a crash.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn rotate(&mut self) -> Result<IdRange> {
        if self.node.is_none() {
            return Err(Error::NotRegistered);
        }

        let retry = self.retry();
        let (_, version) = retry.run(|_| self.read_record())?;
        let range = self.pool.acquire_range()?;
        let record = NodeRecord::new(range.start(), range.end());
        retry.run(|_| self.write_record(record, version))?;

        if let Some(node) = self.node.as_mut() {
            #[cfg(feature = "tracing")]
            tracing::info!(node = %node.path, %range, "rotated to new range");
            node.range = range;
        }
        Ok(range)
    }

    /// Reads `(cursor, range_end)` and its version from the app node.
    ///
    /// A single attempt; callers decide whether to go through [`Self::retry`].
    pub fn read_record(&self) -> Result<(NodeRecord, Version)> {
        let node = self.node.as_ref().ok_or(Error::NotRegistered)?;
        let (data, version) = self.pool.client().read(&node.path)?;
        let record = NodeRecord::from_be_bytes(&node.path, &data)?;
        Ok((record, version))
    }

    /// Persists `record` if the app node is still at `expected`.
    pub fn write_record(&self, record: NodeRecord, expected: Version) -> Result<Version> {
        let node = self.node.as_ref().ok_or(Error::NotRegistered)?;
        self.pool
            .client()
            .write(&node.path, &record.to_be_bytes(), expected)
    }

    /// Ends the session. The app node and the rest of its range are gone for
    /// good.
    pub fn close(&mut self) -> Result<()> {
        #[cfg(feature = "tracing")]
        {
            if let Some(node) = &self.node {
                tracing::info!(node = %node.path, "closing session");
            }
        }
        self.node = None;
        self.pool.client_mut().close()
    }
}
