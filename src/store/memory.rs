//! In-process document store.
//!
//! Backs the `memory` backend and the test suites. Sessions can be severed
//! with [`MemoryConnector::drop_sessions`] or slowed with
//! [`MemoryConnector::stall_pings`] to exercise reconnect paths.

use super::{Filter, ParcelCollection, SortSpec, StoreConnector, StoreSession};
use crate::connection::config::StoreSettings;
use crate::core::{StoreError, StoreResult};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

/// Documents grouped by `database.collection`.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in one collection.
    pub async fn count(&self, database: &str, name: &str) -> usize {
        let collections = self.collections.read().await;
        collections
            .get(&collection_key(database, name))
            .map_or(0, Vec::len)
    }

    /// Insert without going through a session, keeping any `_id` supplied.
    pub async fn seed(&self, database: &str, name: &str, document: Document) -> Bson {
        let mut document = document;
        let id = ensure_id(&mut document);
        let mut collections = self.collections.write().await;
        collections
            .entry(collection_key(database, name))
            .or_default()
            .push(document);
        id
    }
}

fn collection_key(database: &str, name: &str) -> String {
    format!("{database}.{name}")
}

fn ensure_id(document: &mut Document) -> Bson {
    if let Some(id) = document.get("_id") {
        return id.clone();
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = Document::new();
    with_id.insert("_id", id.clone());
    for (key, value) in std::mem::take(document) {
        with_id.insert(key, value);
    }
    *document = with_id;
    id
}

/// Hands out sessions over a shared [`MemoryStore`].
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    sessions: Mutex<Vec<Arc<MemorySession>>>,
    attempts: AtomicU64,
    connects: AtomicU64,
    refuse: AtomicBool,
    connect_delay: Duration,
    ping_delay_ms: Arc<AtomicU64>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            sessions: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            refuse: AtomicBool::new(false),
            connect_delay: Duration::ZERO,
            ping_delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make every connect take at least `delay`.
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Number of connect calls that produced a session.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of connect calls, refused ones included.
    pub fn connect_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sessions handed out and not yet severed.
    pub fn open_sessions(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .iter()
            .filter(|session| session.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Make every ping, on existing and future sessions, take at least `delay`.
    /// `Duration::ZERO` restores immediate pings.
    pub fn stall_pings(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.ping_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// While set, connect attempts fail with a connectivity error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Sever every session handed out so far and forget them.
    pub fn drop_sessions(&self) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for session in sessions.drain(..) {
            session.alive.store(false, Ordering::SeqCst);
        }
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, _settings: &StoreSettings) -> StoreResult<Arc<dyn StoreSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if self.refuse.load(Ordering::SeqCst) {
            return Err(StoreError::connectivity("memory store refused the connection"));
        }

        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(MemorySession {
            id,
            alive: Arc::new(AtomicBool::new(true)),
            ping_delay_ms: Arc::clone(&self.ping_delay_ms),
            store: Arc::clone(&self.store),
        });

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|open| open.alive.load(Ordering::SeqCst));
        sessions.push(Arc::clone(&session));
        drop(sessions);

        Ok(session)
    }
}

pub struct MemorySession {
    id: u64,
    alive: Arc<AtomicBool>,
    ping_delay_ms: Arc<AtomicU64>,
    store: Arc<MemoryStore>,
}

fn ensure_alive(id: u64, alive: &AtomicBool) -> StoreResult<()> {
    if alive.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(StoreError::connectivity(format!(
            "memory session {id} is closed"
        )))
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn ping(&self) -> StoreResult<()> {
        let delay = self.ping_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        ensure_alive(self.id, &self.alive)
    }

    fn collection(&self, database: &str, name: &str) -> Arc<dyn ParcelCollection> {
        Arc::new(MemoryCollection {
            session_id: self.id,
            alive: Arc::clone(&self.alive),
            store: Arc::clone(&self.store),
            key: collection_key(database, name),
        })
    }
}

/// Collection view bound to the session that created it; closes with it.
pub struct MemoryCollection {
    session_id: u64,
    alive: Arc<AtomicBool>,
    store: Arc<MemoryStore>,
    key: String,
}

impl MemoryCollection {
    fn ensure_open(&self) -> StoreResult<()> {
        ensure_alive(self.session_id, &self.alive)
    }
}

#[async_trait]
impl ParcelCollection for MemoryCollection {
    async fn find(&self, filter: &Filter, sort: &SortSpec) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let matcher = filter.matcher();
        let collections = self.store.collections.read().await;
        let mut found: Vec<Document> = collections
            .get(&self.key)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| matcher.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !sort.is_empty() {
            found.sort_by(|left, right| sort.compare(left, right));
        }
        Ok(found)
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        self.ensure_open()?;
        let matcher = filter.matcher();
        let collections = self.store.collections.read().await;
        Ok(collections.get(&self.key).and_then(|documents| {
            documents
                .iter()
                .find(|document| matcher.matches(document))
                .cloned()
        }))
    }

    async fn insert_one(&self, document: Document) -> StoreResult<Bson> {
        self.ensure_open()?;
        let mut document = document;
        let id = ensure_id(&mut document);

        let mut collections = self.store.collections.write().await;
        let documents = collections.entry(self.key.clone()).or_default();
        if documents
            .iter()
            .any(|existing| existing.get("_id") == Some(&id))
        {
            return Err(StoreError::operation(format!(
                "duplicate key error: _id {id}"
            )));
        }
        documents.push(document);
        Ok(id)
    }

    async fn delete_one(&self, filter: &Filter) -> StoreResult<u64> {
        self.ensure_open()?;
        let matcher = filter.matcher();
        let mut collections = self.store.collections.write().await;
        let Some(documents) = collections.get_mut(&self.key) else {
            return Ok(0);
        };

        match documents.iter().position(|document| matcher.matches(document)) {
            Some(index) => {
                documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
