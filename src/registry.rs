//! Connection registry
//!
//! Fixed-capacity slot table of live sessions behind a single mutex. Slot
//! indices are stable handles for the lifetime of a session. The lock is only
//! held for table mutation and enumeration: callers receive cloned socket
//! handles and perform all blocking I/O after the lock is released.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::roster::Roster;
use crate::session::{Session, SessionSocket};
use crate::types::{Nickname, SessionId, SessionIdGenerator};

/// Default number of concurrent sessions
pub const MAX_CLIENTS: usize = 100;

/// Copy of a session's public state, taken under the lock
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub nickname: Option<String>,
    pub socket: Arc<SessionSocket>,
}

/// Worker handle taken out of the registry for shutdown
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: SessionId,
    pub handle: JoinHandle<()>,
    pub socket: Arc<SessionSocket>,
}

struct Slots {
    slots: Vec<Option<Session>>,
    count: usize,
}

/// The server's table of active sessions
pub struct Registry {
    inner: Mutex<Slots>,
    ids: SessionIdGenerator,
}

impl Registry {
    /// Create a registry with [`MAX_CLIENTS`] slots
    pub fn new() -> Self {
        Self::with_capacity(MAX_CLIENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: (0..capacity).map(|_| None).collect(),
                count: 0,
            }),
            ids: SessionIdGenerator::new(),
        }
    }

    // A worker that panicked mid-operation leaves the table consistent (every
    // mutation is a single assignment), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.lock().count
    }

    /// Number of named sessions
    pub fn named_count(&self) -> usize {
        self.lock().slots.iter().flatten().filter(|s| s.is_named()).count()
    }

    /// Register a socket in the first free slot
    ///
    /// Never blocks on capacity: a full table is an immediate error.
    pub fn add(&self, socket: Arc<SessionSocket>) -> Result<SessionId, RegistryError> {
        let peer: Option<SocketAddr> = socket.peer_addr();
        let mut inner = self.lock();
        let capacity = inner.slots.len();

        let Some(slot) = inner.slots.iter().position(Option::is_none) else {
            warn!("Maximum number of clients reached ({})", capacity);
            return Err(RegistryError::CapacityExceeded { capacity });
        };

        let id = self.ids.next_id();
        inner.slots[slot] = Some(Session::new(id, socket));
        inner.count += 1;
        info!("Added session {} ({:?}) to slot {}", id, peer, slot);
        debug!("Total sessions: {}", inner.count);
        Ok(id)
    }

    /// Store the worker thread of a freshly added session
    ///
    /// Hands the thread back if the session is already gone.
    pub fn attach_worker(
        &self,
        id: SessionId,
        worker: JoinHandle<()>,
    ) -> Result<(), JoinHandle<()>> {
        let mut inner = self.lock();
        match find_mut(&mut inner, id) {
            Some(session) => {
                session.worker = Some(worker);
                Ok(())
            }
            None => Err(worker),
        }
    }

    /// Clear a session's slot and return it
    ///
    /// The caller closes the socket and decides on notifications from
    /// [`Session::is_named`].
    pub fn remove(&self, id: SessionId) -> Result<Session, RegistryError> {
        let mut inner = self.lock();
        let slot = inner
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.id == id))
            .ok_or(RegistryError::NotFound(id))?;

        let session = inner.slots[slot].take().ok_or(RegistryError::NotFound(id))?;
        inner.count -= 1;
        info!("Removed session {}: {}", id, session.display_name());
        Ok(session)
    }

    pub fn find(&self, id: SessionId) -> Result<SessionInfo, RegistryError> {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .flatten()
            .find(|s| s.id == id)
            .map(|s| SessionInfo {
                id: s.id,
                nickname: s.nickname.as_ref().map(|n| n.as_str().to_string()),
                socket: Arc::clone(&s.socket),
            })
            .ok_or(RegistryError::NotFound(id))
    }

    pub fn is_nickname_taken(&self, name: &str) -> bool {
        self.lock()
            .slots
            .iter()
            .flatten()
            .any(|s| s.nickname.as_ref().is_some_and(|n| n.as_str() == name))
    }

    /// Atomically check uniqueness and assign a nickname
    pub fn claim_nickname(&self, id: SessionId, name: &Nickname) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let taken = inner
            .slots
            .iter()
            .flatten()
            .any(|s| s.id != id && s.nickname.as_ref() == Some(name));
        if taken {
            return Err(RegistryError::NicknameTaken(name.to_string()));
        }

        let session = find_mut(&mut inner, id).ok_or(RegistryError::NotFound(id))?;
        session.nickname = Some(name.clone());
        Ok(())
    }

    /// Named sessions other than `exclude`
    pub fn other_named_count(&self, exclude: SessionId) -> usize {
        self.lock()
            .slots
            .iter()
            .flatten()
            .filter(|s| s.is_named() && s.id != exclude)
            .count()
    }

    /// Sockets of every named session, optionally skipping one session
    pub fn snapshot_named_sockets(&self, exclude: Option<SessionId>) -> Vec<Arc<SessionSocket>> {
        self.collect_named(|s| Some(s.id) != exclude)
    }

    /// Sockets of every named session whose nickname differs from `name`
    pub fn snapshot_named_sockets_except(&self, name: &str) -> Vec<Arc<SessionSocket>> {
        self.collect_named(|s| s.nickname.as_ref().is_some_and(|n| n.as_str() != name))
    }

    fn collect_named<F>(&self, keep: F) -> Vec<Arc<SessionSocket>>
    where
        F: Fn(&Session) -> bool,
    {
        self.lock()
            .slots
            .iter()
            .flatten()
            .filter(|s| s.is_named() && keep(s))
            .map(|s| Arc::clone(&s.socket))
            .collect()
    }

    /// Roster of named sessions in slot order
    pub fn build_roster(&self) -> Roster {
        self.lock()
            .slots
            .iter()
            .flatten()
            .filter_map(|s| s.nickname.as_ref())
            .map(|n| n.as_str().to_string())
            .collect()
    }

    /// Take every attached worker handle, leaving the sessions in place
    pub fn drain_workers(&self) -> Vec<WorkerHandle> {
        let mut inner = self.lock();
        inner
            .slots
            .iter_mut()
            .flatten()
            .filter_map(|s| {
                s.worker.take().map(|handle| WorkerHandle {
                    id: s.id,
                    handle,
                    socket: Arc::clone(&s.socket),
                })
            })
            .collect()
    }

    /// Close every remaining session and empty the table
    ///
    /// Returns the number of sessions closed.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Session> = {
            let mut inner = self.lock();
            inner.count = 0;
            inner.slots.iter_mut().filter_map(Option::take).collect()
        };
        let closed = sessions.len();
        for session in sessions {
            session.close();
        }
        closed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_mut(inner: &mut Slots, id: SessionId) -> Option<&mut Session> {
    inner.slots.iter_mut().flatten().find(|s| s.id == id)
}
