// ============================================================================
// Resource Lock Manager
// Ordered, scoped acquisition of per-resource mutual exclusion
// ============================================================================

use crate::error::{ExchangeError, ExchangeResult};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Something an operation must hold exclusively.
///
/// The derived ordering is the global lock order: the base currency sorts
/// before every instrument, instruments sort by ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResourceId {
    Currency,
    Instrument(String),
}

impl ResourceId {
    pub fn instrument(ticker: impl Into<String>) -> Self {
        ResourceId::Instrument(ticker.into())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Currency => write!(f, "<currency>"),
            ResourceId::Instrument(ticker) => write!(f, "{}", ticker),
        }
    }
}

type Handle = Arc<Mutex<()>>;
type HeldLock = (ResourceId, ArcMutexGuard<RawMutex, ()>);

/// Locks held by one operation. Released in reverse acquisition order when
/// dropped, on every exit path.
pub struct ResourceGuard {
    held: SmallVec<[HeldLock; 2]>,
}

impl ResourceGuard {
    pub fn covers(&self, resource: &ResourceId) -> bool {
        self.held.iter().any(|(id, _)| id == resource)
    }

    /// Fail with `InvariantViolation` unless `resource` is held.
    pub fn ensure_covers(&self, resource: &ResourceId) -> ExchangeResult<()> {
        if self.covers(resource) {
            Ok(())
        } else {
            Err(ExchangeError::invariant(format!(
                "resource {} touched without holding its lock",
                resource
            )))
        }
    }

    /// Held resources in acquisition order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceId> + '_ {
        self.held.iter().map(|(id, _)| id)
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        while let Some((resource, guard)) = self.held.pop() {
            drop(guard);
            tracing::trace!(%resource, "released");
        }
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resources()).finish()
    }
}

/// Owns one mutex per resource, created on first use.
#[derive(Default)]
pub struct LockManager {
    locks: RwLock<HashMap<ResourceId, Handle>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every resource is held.
    pub fn acquire<I>(&self, resources: I) -> ResourceGuard
    where
        I: IntoIterator<Item = ResourceId>,
    {
        let mut held = SmallVec::new();
        for resource in Self::ordered(resources) {
            let guard = self.handle(&resource).lock_arc();
            tracing::trace!(%resource, "acquired");
            held.push((resource, guard));
        }
        ResourceGuard { held }
    }

    /// Like [`LockManager::acquire`] but gives up after `timeout`. On timeout
    /// any lock already taken is released before returning.
    pub fn acquire_timeout<I>(&self, resources: I, timeout: Duration) -> ExchangeResult<ResourceGuard>
    where
        I: IntoIterator<Item = ResourceId>,
    {
        let deadline = Instant::now() + timeout;
        let mut guard = ResourceGuard {
            held: SmallVec::new(),
        };

        for resource in Self::ordered(resources) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match Mutex::try_lock_arc_for(&self.handle(&resource), remaining) {
                Some(lock) => guard.held.push((resource, lock)),
                None => {
                    tracing::warn!(%resource, ?timeout, "lock wait timed out");
                    return Err(ExchangeError::LockTimeout);
                },
            }
        }

        Ok(guard)
    }

    /// `acquire` or `acquire_timeout` depending on `timeout`.
    pub fn acquire_within<I>(
        &self,
        resources: I,
        timeout: Option<Duration>,
    ) -> ExchangeResult<ResourceGuard>
    where
        I: IntoIterator<Item = ResourceId>,
    {
        match timeout {
            Some(timeout) => self.acquire_timeout(resources, timeout),
            None => Ok(self.acquire(resources)),
        }
    }

    /// Drop the handle of a resource that no longer exists. Holders and
    /// waiters keep their own reference and are unaffected.
    pub fn forget(&self, resource: &ResourceId) {
        self.locks.write().remove(resource);
    }

    /// Number of resources that currently have a lock handle
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.read().is_empty()
    }

    fn handle(&self, resource: &ResourceId) -> Handle {
        if let Some(handle) = self.locks.read().get(resource) {
            return Arc::clone(handle);
        }
        Arc::clone(
            self.locks
                .write()
                .entry(resource.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn ordered<I>(resources: I) -> SmallVec<[ResourceId; 2]>
    where
        I: IntoIterator<Item = ResourceId>,
    {
        let mut ordered: SmallVec<[ResourceId; 2]> = resources.into_iter().collect();
        ordered.sort();
        ordered.dedup();
        ordered
    }
}
