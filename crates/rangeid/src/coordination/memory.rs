use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    coordination::{Connector, Coordinator, CreateMode, Version},
    error::{Error, Result},
    mutex::{Mutex, lock},
};

/// Endpoint reported by a [`MemoryStore`] built with [`MemoryStore::new`].
pub const MEMORY_ENDPOINT: &str = "memory://local";

/// Identifier of a session opened against a [`MemoryStore`].
pub type SessionId = u64;

/// An in-process, linearizable coordination service.
///
/// Every operation runs under a single lock, so the store behaves like a
/// one-node ZooKeeper ensemble: versioned nodes, per-parent sequential
/// naming and session-scoped ephemeral nodes.
///
/// Cloning is cheap and every clone sees the same keyspace, which lets tests
/// hand one store to many simulated instances on many threads.
///
/// Faults can be injected with [`MemoryStore::set_available`] (the service
/// becomes unreachable) and [`MemoryStore::expire_session`] (a session times
/// out as if its owner had crashed).
#[derive(Clone)]
pub struct MemoryStore {
    endpoint: Arc<str>,
    state: Arc<Mutex<StoreState>>,
}

struct StoreState {
    nodes: BTreeMap<String, Node>,
    sequences: HashMap<String, u64>,
    live_sessions: HashSet<SessionId>,
    next_session: SessionId,
    available: bool,
}

struct Node {
    data: Vec<u8>,
    version: Version,
    owner: Option<SessionId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_endpoint(MEMORY_ENDPOINT)
    }

    /// Creates an empty store reporting `endpoint` in errors and logs.
    pub fn with_endpoint(endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Arc::new(Mutex::new(StoreState {
                nodes: BTreeMap::new(),
                sequences: HashMap::new(),
                live_sessions: HashSet::new(),
                next_session: 0,
                available: true,
            })),
        }
    }

    /// Simulates the service going down (`false`) or coming back (`true`).
    ///
    /// While unavailable, [`Connector::connect`] and every session operation
    /// fail with [`Error::Connection`]. Sessions survive the outage.
    pub fn set_available(&self, available: bool) -> Result<()> {
        lock!(self.state).available = available;
        Ok(())
    }

    /// Ends `session` as a session timeout would, deleting its ephemeral
    /// nodes. Returns `false` if the session was not live.
    pub fn expire_session(&self, session: SessionId) -> Result<bool> {
        let mut state = lock!(self.state);
        Ok(state.end_session(session))
    }

    /// Number of sessions currently live.
    pub fn live_sessions(&self) -> Result<usize> {
        Ok(lock!(self.state).live_sessions.len())
    }

    /// Full paths of the direct children of `path`, in name order.
    pub fn children(&self, path: &str) -> Result<Vec<String>> {
        let state = lock!(self.state);
        Ok(state
            .nodes
            .keys()
            .filter(|p| parent_of(p) == Some(path))
            .cloned()
            .collect())
    }

    /// Opens a new session.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint)))]
    pub fn open_session(&self) -> Result<MemorySession> {
        let mut state = lock!(self.state);
        if !state.available {
            return Err(self.unreachable());
        }
        let id = state.next_session;
        state.next_session += 1;
        state.live_sessions.insert(id);

        #[cfg(feature = "tracing")]
        tracing::debug!(session = id, "session opened");

        Ok(MemorySession {
            id,
            store: self.clone(),
            closed: false,
        })
    }

    fn unreachable(&self) -> Error {
        Error::Connection {
            endpoint: self.endpoint.to_string(),
            reason: "service unavailable".to_owned(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Connector for MemoryStore {
    type Session = MemorySession;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connect(&self) -> Result<MemorySession> {
        self.open_session()
    }
}

impl StoreState {
    fn end_session(&mut self, session: SessionId) -> bool {
        if !self.live_sessions.remove(&session) {
            return false;
        }
        self.nodes.retain(|_, node| node.owner != Some(session));

        #[cfg(feature = "tracing")]
        tracing::debug!(session, "session ended, ephemeral nodes removed");

        true
    }

    fn has_node(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }
}

/// Parent path of `path`, or `None` for the root and malformed paths.
fn parent_of(path: &str) -> Option<&str> {
    if path == "/" || !path.starts_with('/') {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

fn is_valid_path(path: &str) -> bool {
    path.starts_with('/') && (path == "/" || !path.ends_with('/')) && !path.contains("//")
}

/// A live session with a [`MemoryStore`].
///
/// Dropping the session ends it, which is how a crashed instance looks to the
/// store: its ephemeral nodes disappear.
pub struct MemorySession {
    id: SessionId,
    store: MemoryStore,
    closed: bool,
}

impl MemorySession {
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// The store this session talks to.
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Runs `f` against the shared state after checking reachability and
    /// session liveness.
    fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> Result<R>) -> Result<R> {
        let mut state = lock!(self.store.state);
        if !state.available {
            return Err(self.store.unreachable());
        }
        if self.closed || !state.live_sessions.contains(&self.id) {
            return Err(Error::SessionExpired { session: self.id });
        }
        f(&mut state)
    }
}

impl core::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("endpoint", &self.store.endpoint)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Coordinator for MemorySession {
    fn exists(&self, path: &str) -> Result<bool> {
        self.with_state(|state| Ok(state.has_node(path)))
    }

    fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        let session = self.id;
        self.with_state(|state| {
            let parent = match parent_of(path) {
                Some(parent) if is_valid_path(path) && state.has_node(parent) => parent,
                _ => {
                    return Err(Error::NoNode {
                        path: path.to_owned(),
                    });
                }
            };

            let full_path = if mode.is_sequential() {
                let counter = state.sequences.entry(parent.to_owned()).or_insert(0);
                let full = format!("{path}{counter:010}");
                *counter += 1;
                full
            } else {
                path.to_owned()
            };

            if state.has_node(&full_path) {
                return Err(Error::NodeExists { path: full_path });
            }

            state.nodes.insert(
                full_path.clone(),
                Node {
                    data: data.to_vec(),
                    version: 0,
                    owner: mode.is_ephemeral().then_some(session),
                },
            );
            Ok(full_path)
        })
    }

    fn read(&self, path: &str) -> Result<(Vec<u8>, Version)> {
        self.with_state(|state| {
            state
                .nodes
                .get(path)
                .map(|node| (node.data.clone(), node.version))
                .ok_or_else(|| Error::NoNode {
                    path: path.to_owned(),
                })
        })
    }

    fn write(&self, path: &str, data: &[u8], expected: Version) -> Result<Version> {
        self.with_state(|state| {
            let node = state.nodes.get_mut(path).ok_or_else(|| Error::NoNode {
                path: path.to_owned(),
            })?;
            if node.version != expected {
                return Err(Error::Conflict {
                    path: path.to_owned(),
                    expected,
                    actual: node.version,
                });
            }
            node.data = data.to_vec();
            node.version = node.version.wrapping_add(1);
            Ok(node.version)
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut state = lock!(self.store.state);
        state.end_session(self.id);
        self.closed = true;
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Err(_e) = self.close() {
            #[cfg(feature = "tracing")]
            tracing::warn!(session = self.id, "failed to end session on drop: {_e}");
        }
    }
}
