#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    codec::{decode_pool, encode_pool},
    coordination::{Coordinator, CreateMode, RetryPolicy},
    error::{Error, Result},
    range::{IdRange, RangeLayout},
};

/// Well-known location of the shared pool.
pub const DEFAULT_POOL_PATH: &str = "/range";

/// How many times a dequeue is attempted before a lost race becomes fatal.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 16;

/// Where the pool lives, how it is cut, and how hard to push through
/// transient coordinator failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    path: String,
    layout: RangeLayout,
    max_conflict_retries: u32,
    retry: RetryPolicy,
}

impl PoolConfig {
    pub fn new(path: impl Into<String>, layout: RangeLayout) -> Self {
        Self {
            path: path.into(),
            layout,
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
            retry: RetryPolicy::never(),
        }
    }

    /// Overrides the number of dequeue attempts (at least one).
    #[must_use]
    pub fn with_conflict_retries(mut self, attempts: u32) -> Self {
        self.max_conflict_retries = attempts.max(1);
        self
    }

    /// Retry policy applied to every coordination round trip made on behalf
    /// of this pool and the allocators built on it. Defaults to a single
    /// attempt.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub const fn layout(&self) -> &RangeLayout {
        &self.layout
    }

    pub const fn max_conflict_retries(&self) -> u32 {
        self.max_conflict_retries
    }

    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_PATH, RangeLayout::default())
    }
}

/// The globally shared pool of unclaimed ranges.
///
/// The pool is a single node whose data is the ascending list of remaining
/// range starts. Ranges are only ever removed from the front, and only through
/// a conditional write against the version that was read, so two instances
/// can never dequeue the same range.
pub struct RangePool<C: Coordinator> {
    client: C,
    config: PoolConfig,
}

impl<C: Coordinator> RangePool<C> {
    pub const fn new(client: C, config: PoolConfig) -> Self {
        Self { client, config }
    }

    pub const fn client(&self) -> &C {
        &self.client
    }

    pub const fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn path(&self) -> &str {
        self.config.path()
    }

    /// Creates the pool holding every range of the layout, unless it exists.
    ///
    /// Returns `true` if this call created it. When several instances race,
    /// exactly one create succeeds; the others observe
    /// [`Error::NodeExists`] and leave the winner's pool untouched.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(path = self.path())))]
    pub fn ensure_exists(&self) -> Result<bool> {
        self.config.retry().run(|_attempt| self.try_create())
    }

    fn try_create(&self) -> Result<bool> {
        let path = self.path();
        if self.client.exists(path)? {
            return Ok(false);
        }

        let starts: Vec<u64> = self.config.layout().starts().collect();
        let data = encode_pool(path, &starts)?;
        match self.client.create(path, &data, CreateMode::Persistent) {
            Ok(_) => {
                #[cfg(feature = "tracing")]
                tracing::info!(ranges = starts.len(), "created range pool");
                Ok(true)
            }
            Err(Error::NodeExists { .. }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("range pool created concurrently by another instance");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Dequeues the first unclaimed range.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] if no ranges are left.
    /// - [`Error::Conflict`] if every attempt lost the race to another
    ///   instance.
    /// - [`Error::Serialization`] if the pool data is corrupt.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(path = self.path())))]
    pub fn acquire_range(&self) -> Result<IdRange> {
        let max_attempts = self.config.max_conflict_retries();
        let retry = self.config.retry();

        let mut attempt = 1;
        loop {
            match retry.run(|_| self.try_dequeue()) {
                Err(Error::Conflict { .. }) if attempt < max_attempts => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, "lost pool race, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One versioned read of the pool followed by the conditional write of
    /// its tail.
    fn try_dequeue(&self) -> Result<IdRange> {
        let path = self.path();
        let layout = self.config.layout();

        let (data, version) = self.client.read(path)?;
        let starts = decode_pool(path, &data, layout)?;
        let Some((&first, rest)) = starts.split_first() else {
            return Err(Error::PoolExhausted {
                path: path.to_owned(),
            });
        };

        let remaining = encode_pool(path, rest)?;
        self.client.write(path, &remaining, version)?;

        let range = layout.range_at(first);
        #[cfg(feature = "tracing")]
        tracing::info!(%range, remaining = rest.len(), "picked range");
        Ok(range)
    }

    /// Every range still unclaimed, in dequeue order.
    pub fn remaining(&self) -> Result<Vec<IdRange>> {
        let path = self.path();
        let layout = self.config.layout();
        let (data, _) = self.config.retry().run(|_| self.client.read(path))?;
        Ok(decode_pool(path, &data, layout)?
            .into_iter()
            .map(|start| layout.range_at(start))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySession, MemoryStore, Version};
    use core::{cell::Cell, time::Duration};
    use std::thread;

    /// Brings `store` back after `after`, from another thread.
    fn restore_after(store: &MemoryStore, after: Duration) -> thread::JoinHandle<()> {
        let store = store.clone();
        thread::spawn(move || {
            thread::sleep(after);
            store.set_available(true).unwrap();
        })
    }

    fn pool(store: &MemoryStore) -> RangePool<MemorySession> {
        RangePool::new(store.open_session().unwrap(), PoolConfig::default())
    }

    #[test]
    fn first_instance_creates_full_pool() {
        let store = MemoryStore::new();
        let a = pool(&store);
        let b = pool(&store);

        assert!(a.ensure_exists().unwrap());
        assert!(!b.ensure_exists().unwrap());

        let remaining = b.remaining().unwrap();
        assert_eq!(remaining.len(), 10);
        assert_eq!(remaining[0], IdRange::new(0, 100));
        assert_eq!(remaining[9], IdRange::new(900, 1_000));
    }

    #[test]
    fn ranges_come_out_in_order() {
        let store = MemoryStore::new();
        let a = pool(&store);
        a.ensure_exists().unwrap();

        assert_eq!(a.acquire_range().unwrap(), IdRange::new(0, 100));
        assert_eq!(a.acquire_range().unwrap(), IdRange::new(100, 200));
        assert_eq!(a.remaining().unwrap().len(), 8);
    }

    #[test]
    fn empty_pool_is_exhausted() {
        let store = MemoryStore::new();
        let config = PoolConfig::new("/small", RangeLayout::new(200, 100).unwrap());
        let a = RangePool::new(store.open_session().unwrap(), config);
        a.ensure_exists().unwrap();
        a.acquire_range().unwrap();
        a.acquire_range().unwrap();

        assert_eq!(
            a.acquire_range(),
            Err(Error::PoolExhausted {
                path: "/small".into()
            })
        );
        assert_eq!(a.remaining().unwrap(), vec![]);
    }

    #[test]
    fn missing_pool_is_reported() {
        let store = MemoryStore::new();
        assert!(matches!(
            pool(&store).acquire_range(),
            Err(Error::NoNode { .. })
        ));
    }

    #[test]
    fn corrupt_pool_is_a_serialization_error() {
        let store = MemoryStore::new();
        let session = store.open_session().unwrap();
        session
            .create("/range", b"not a list", CreateMode::Persistent)
            .unwrap();
        let a = RangePool::new(session, PoolConfig::default());
        assert!(!a.ensure_exists().unwrap());
        assert!(matches!(
            a.acquire_range(),
            Err(Error::Serialization { .. })
        ));
    }

    /// A client that lets a rival dequeue between our read and our write a
    /// fixed number of times.
    struct Interfering {
        inner: MemorySession,
        rival: MemorySession,
        interference_left: Cell<u32>,
    }

    impl Coordinator for Interfering {
        fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path)
        }

        fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
            self.inner.create(path, data, mode)
        }

        fn read(&self, path: &str) -> Result<(Vec<u8>, Version)> {
            let read = self.inner.read(path)?;
            if self.interference_left.get() > 0 {
                self.interference_left.set(self.interference_left.get() - 1);
                let rival = RangePool::new(&self.rival, PoolConfig::default());
                rival.acquire_range()?;
            }
            Ok(read)
        }

        fn write(&self, path: &str, data: &[u8], expected: Version) -> Result<Version> {
            self.inner.write(path, data, expected)
        }
    }

    fn interfering(store: &MemoryStore, times: u32) -> Interfering {
        Interfering {
            inner: store.open_session().unwrap(),
            rival: store.open_session().unwrap(),
            interference_left: Cell::new(times),
        }
    }

    #[test]
    fn lost_race_is_retried_with_fresh_read() {
        let store = MemoryStore::new();
        pool(&store).ensure_exists().unwrap();

        let client = interfering(&store, 2);
        let a = RangePool::new(client, PoolConfig::default());

        // The rival took [0,100) and [100,200) while we were racing.
        assert_eq!(a.acquire_range().unwrap(), IdRange::new(200, 300));
        assert_eq!(a.remaining().unwrap().len(), 7);
    }

    #[test]
    fn conflict_becomes_fatal_after_bounded_attempts() {
        let store = MemoryStore::new();
        pool(&store).ensure_exists().unwrap();

        let client = interfering(&store, 3);
        let a = RangePool::new(client, PoolConfig::default().with_conflict_retries(3));

        assert!(matches!(a.acquire_range(), Err(Error::Conflict { .. })));
        // Only the rival's three ranges are gone; the failed attempts took nothing.
        assert_eq!(a.remaining().unwrap()[0], IdRange::new(300, 400));
    }

    #[test]
    fn outage_during_dequeue_is_retried() {
        let store = MemoryStore::new();
        let config = PoolConfig::default()
            .with_retry(RetryPolicy::fixed(5, Duration::from_millis(100)));
        let a = RangePool::new(store.open_session().unwrap(), config);
        a.ensure_exists().unwrap();

        store.set_available(false).unwrap();
        let restore = restore_after(&store, Duration::from_millis(50));

        assert_eq!(a.acquire_range().unwrap(), IdRange::new(0, 100));
        assert_eq!(a.remaining().unwrap().len(), 9);
        restore.join().unwrap();
    }

    #[test]
    fn outage_during_pool_creation_is_retried() {
        let store = MemoryStore::new();
        let config = PoolConfig::default()
            .with_retry(RetryPolicy::fixed(5, Duration::from_millis(100)));
        let a = RangePool::new(store.open_session().unwrap(), config);

        store.set_available(false).unwrap();
        let restore = restore_after(&store, Duration::from_millis(50));

        assert!(a.ensure_exists().unwrap());
        restore.join().unwrap();
        assert_eq!(a.remaining().unwrap().len(), 10);
    }

    #[test]
    fn outage_longer_than_retry_window_is_reported() {
        let store = MemoryStore::new();
        let config =
            PoolConfig::default().with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)));
        let a = RangePool::new(store.open_session().unwrap(), config);
        a.ensure_exists().unwrap();

        store.set_available(false).unwrap();
        assert!(matches!(a.acquire_range(), Err(Error::Connection { .. })));

        store.set_available(true).unwrap();
        assert_eq!(a.remaining().unwrap().len(), 10);
    }
}
