//! Session bookkeeping for connected clients.
//!
//! The registry is the only place session ids are allocated. Id 0 is reserved on the
//! wire for "this is you" and is never handed out.

use log::info;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One connected client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u32,
    /// Where replies are sent
    pub addr: SocketAddr,
    /// Last time a well-formed message arrived from this client
    pub last_seen: Instant,
}

impl Session {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// True when nothing has been heard for longer than `timeout` as of `now`.
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Maps client addresses to session ids and tracks their liveness.
pub struct SessionRegistry {
    /// Ordered by id so fan-out visits sessions in join order
    sessions: BTreeMap<u32, Session>,
    by_addr: HashMap<SocketAddr, u32>,
    next_session_id: u32,
    max_clients: usize,
}

impl SessionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            by_addr: HashMap::new(),
            next_session_id: 1,
            max_clients,
        }
    }

    /// Returns the session for `addr`, registering a new one on first contact.
    ///
    /// Returns `None` when the address is unknown and the server is full.
    pub fn resolve_or_register(&mut self, addr: SocketAddr) -> Option<u32> {
        if let Some(&id) = self.by_addr.get(&addr) {
            return Some(id);
        }
        if self.sessions.len() >= self.max_clients {
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} registered from {}", id, addr);
        self.sessions.insert(id, Session::new(id, addr));
        self.by_addr.insert(addr, id);
        Some(id)
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.by_addr.get(&addr).copied()
    }

    pub fn touch(&mut self, session_id: u32) {
        self.touch_at(session_id, Instant::now());
    }

    pub fn touch_at(&mut self, session_id: u32, now: Instant) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.last_seen = now;
        }
    }

    /// Removes a session. Evicting an id that is already gone returns false.
    pub fn evict(&mut self, session_id: u32) -> bool {
        match self.sessions.remove(&session_id) {
            Some(session) => {
                self.by_addr.remove(&session.addr);
                info!("Session {} ({}) evicted", session_id, session.addr);
                true
            }
            None => false,
        }
    }

    /// Evicts every session silent for longer than `timeout` and returns their ids.
    pub fn sweep(&mut self, timeout: Duration) -> Vec<u32> {
        self.sweep_at(Instant::now(), timeout)
    }

    pub fn sweep_at(&mut self, now: Instant, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .sessions
            .values()
            .filter(|session| session.is_timed_out(now, timeout))
            .map(|session| session.id)
            .collect();

        for &session_id in &timed_out {
            self.evict(session_id);
        }
        timed_out
    }

    /// Every registered session as `(id, address)`, in id order.
    pub fn addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.sessions
            .values()
            .map(|session| (session.id, session.addr))
            .collect()
    }

    pub fn addr_of(&self, session_id: u32) -> Option<SocketAddr> {
        self.sessions.get(&session_id).map(|session| session.addr)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
