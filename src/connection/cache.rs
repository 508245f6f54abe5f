use super::config::StoreSettings;
use crate::core::{StoreError, StoreResult, with_timeout};
use crate::store::{ParcelCollection, StoreConnector, StoreSession, TimedCollection};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Process-wide handle on the document store.
///
/// Holds at most one live session together with its parcel collection.
/// The session is opened lazily on first use, probed before every reuse and
/// reopened when the probe fails, which suits hosts that freeze and thaw the
/// process between request bursts.
///
/// Opening is single-flight: the slot lock is held for the whole connect, so
/// callers arriving on a cold cache queue behind one connect and share its
/// outcome, session or error. Probes run outside the lock on a cloned handle.
pub struct ConnectionCache {
    connector: Arc<dyn StoreConnector>,
    settings: Result<Arc<StoreSettings>, StoreError>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    connects: AtomicU64,
    /// Connect attempts that have finished, successful or not. Read without
    /// the slot lock so a caller can tell whether an attempt settled while it
    /// was queued.
    settled: AtomicU64,
}

#[derive(Default)]
struct Slot {
    cached: Option<CachedConnection>,
    /// Error of the most recent attempt, cleared by a successful one
    last_failure: Option<StoreError>,
}

/// A cached session and the collection derived from it
#[derive(Clone)]
struct CachedConnection {
    generation: u64,
    session: Arc<dyn StoreSession>,
    parcels: Arc<dyn ParcelCollection>,
}

impl CachedConnection {
    fn lease(&self) -> ConnectionLease {
        ConnectionLease {
            generation: self.generation,
            session: Arc::clone(&self.session),
            parcels: Arc::clone(&self.parcels),
        }
    }
}

/// What a request gets from [`ConnectionCache::acquire`].
///
/// Valid for the current request only; never store it.
#[derive(Clone)]
pub struct ConnectionLease {
    generation: u64,
    session: Arc<dyn StoreSession>,
    parcels: Arc<dyn ParcelCollection>,
}

impl ConnectionLease {
    /// Identifies the session; changes every time the cache reconnects.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Parcel collection with per-call timeouts applied.
    pub fn parcels(&self) -> &Arc<dyn ParcelCollection> {
        &self.parcels
    }

    /// True when both leases share one underlying session.
    pub fn same_session(&self, other: &ConnectionLease) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful connects since the cache was built
    pub connects: u64,
    /// Finished connect attempts since the cache was built, failed ones included
    pub attempts: u64,
    /// Generation of the cached session, if any
    pub current_generation: Option<u64>,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.current_generation {
            Some(generation) => write!(
                f,
                "Connection cache: {}/{} connects, live generation {}",
                self.connects, self.attempts, generation
            ),
            None => write!(
                f,
                "Connection cache: {}/{} connects, empty",
                self.connects, self.attempts
            ),
        }
    }
}

impl ConnectionCache {
    /// Create an empty cache
    ///
    /// `None` settings mean credentials are not configured; every acquire then
    /// fails with a configuration error and never attempts a connect.
    pub fn new(connector: Arc<dyn StoreConnector>, settings: Option<StoreSettings>) -> Self {
        let settings = match settings {
            None => Err(StoreError::configuration(
                "store credentials are not configured (DB_USER, DB_PASS)",
            )),
            Some(settings) => match settings.validate() {
                Ok(()) => Ok(Arc::new(settings)),
                Err(message) => Err(StoreError::configuration(message)),
            },
        };

        if let Err(err) = &settings {
            warn!(error = %err, "store connection cache created without usable settings");
        }

        Self {
            connector,
            settings,
            slot: Mutex::new(Slot::default()),
            generation: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            settled: AtomicU64::new(0),
        }
    }

    /// Whether credentials were supplied and valid
    pub fn has_credentials(&self) -> bool {
        self.settings.is_ok()
    }

    pub fn settings(&self) -> StoreResult<&Arc<StoreSettings>> {
        self.settings.as_ref().map_err(Clone::clone)
    }

    /// Get a live connection, reusing the cached one when it answers a ping
    pub async fn acquire(&self) -> StoreResult<ConnectionLease> {
        let settings = self.settings()?;

        let observed = self.settled.load(Ordering::SeqCst);
        let cached = self.slot.lock().await.cached.clone();

        if let Some(cached) = cached {
            match with_timeout("ping", settings.probe_timeout, cached.session.ping()).await {
                Ok(()) => {
                    debug!(generation = cached.generation, "reusing cached store connection");
                    return Ok(cached.lease());
                }
                Err(err) => {
                    warn!(
                        generation = cached.generation,
                        error = %err,
                        "cached store connection failed liveness probe, reconnecting"
                    );
                    self.invalidate(cached.generation).await;
                }
            }
        }

        self.connect(settings, observed).await
    }

    /// Open a session unless another caller already tried while this one waited
    ///
    /// `observed` is the settled attempt count seen before queueing on the
    /// lock. If it moved, the attempt this caller queued behind decides the
    /// outcome.
    async fn connect(
        &self,
        settings: &Arc<StoreSettings>,
        observed: u64,
    ) -> StoreResult<ConnectionLease> {
        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.cached.as_ref() {
            return Ok(existing.lease());
        }
        let settled = self.settled.load(Ordering::SeqCst);
        if settled != observed {
            if let Some(err) = slot.last_failure.clone() {
                debug!(
                    attempt = settled,
                    error = %err,
                    "sharing failure of the connect attempt queued behind"
                );
                return Err(err);
            }
        }

        let attempt = settled + 1;

        let session = match with_timeout(
            "connect",
            settings.connect_timeout,
            self.connector.connect(settings),
        )
        .await
        {
            Ok(session) => session,
            Err(err) => {
                error!(
                    attempt,
                    url = %settings.redacted_url(),
                    error = %err,
                    "failed to connect to document store"
                );
                slot.last_failure = Some(err.clone());
                self.settled.store(attempt, Ordering::SeqCst);
                return Err(err);
            }
        };

        let parcels: Arc<dyn ParcelCollection> = Arc::new(TimedCollection::new(
            session.collection(&settings.database, &settings.collection),
            settings.operation_timeout,
        ));

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.connects.fetch_add(1, Ordering::SeqCst);

        let cached = CachedConnection {
            generation,
            session,
            parcels,
        };
        let lease = cached.lease();
        slot.cached = Some(cached);
        slot.last_failure = None;
        self.settled.store(attempt, Ordering::SeqCst);

        info!(
            generation,
            attempt,
            url = %settings.redacted_url(),
            database = %settings.database,
            collection = %settings.collection,
            "connected to document store"
        );

        Ok(lease)
    }

    /// Drop the cached session if it is still the given generation
    ///
    /// A stale generation means someone else already replaced it.
    async fn invalidate(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.cached.as_ref().map(|cached| cached.generation) == Some(generation) {
            slot.cached = None;
            debug!(generation, "store connection invalidated");
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let slot = self.slot.lock().await;
        CacheStats {
            connects: self.connects.load(Ordering::SeqCst),
            attempts: self.settled.load(Ordering::SeqCst),
            current_generation: slot.cached.as_ref().map(|cached| cached.generation),
        }
    }
}
