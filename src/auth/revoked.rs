//! Revoked token identifiers, each evicted automatically once its token expires.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

/// The set of revoked token ids.
///
/// Every [`revoke`](RevokedTokens::revoke) spawns one task on the runtime given to
/// [`start`](RevokedTokens::start) that sleeps until the token's expiry and then drops
/// the id again. Revoking an id that is already revoked counts twice: it stays revoked
/// until both removals have fired.
///
/// Clones share the same set.
#[derive(Clone)]
pub struct RevokedTokens {
    inner: Arc<Inner>,
}

struct Inner {
    entries: DashMap<Uuid, usize>,
    handle: Handle,
    shutdown: watch::Sender<bool>,
}

impl Inner {
    fn release(&self, id: Uuid) {
        if let Entry::Occupied(mut entry) = self.entries.entry(id) {
            if *entry.get() > 1 {
                *entry.get_mut() -= 1;
            } else {
                entry.remove();
                debug!("Token {} expired and left the revocation list", id);
            }
        }
    }
}

impl RevokedTokens {
    pub fn start(handle: Handle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                handle,
                shutdown,
            }),
        }
    }

    /// Marks `id` revoked until `expires_at`. An instant in the past schedules the
    /// removal immediately.
    pub fn revoke(&self, id: Uuid, expires_at: DateTime<Utc>) {
        *self.inner.entries.entry(id).or_insert(0) += 1;

        if self.is_stopped() {
            warn!("Token {} revoked after shutdown, it will not be released", id);
            return;
        }

        let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!("Token {} revoked for {:?}", id, delay);

        let inner = self.inner.clone();
        let shutdown = self.inner.shutdown.subscribe();
        self.inner.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = stopped(shutdown) => {}
                _ = tokio::time::sleep(delay) => inner.release(id),
            }
        });
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.entries.contains_key(id)
    }

    /// Number of distinct revoked ids.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Iterates the currently revoked ids, in no particular order.
    ///
    /// The iterator holds shard read locks while alive; do not revoke through the
    /// same thread until it is dropped.
    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.inner.entries.iter().map(|entry| *entry.key())
    }

    /// The currently revoked ids, in no particular order.
    pub fn snapshot(&self) -> Vec<Uuid> {
        self.iter().collect()
    }

    /// Cancels every pending removal. Ids revoked so far, and any revoked later,
    /// stay revoked for the rest of the process.
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        debug!("Revocation scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.shutdown.borrow()
    }
}

/// Resolves once the scheduler is stopped.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
