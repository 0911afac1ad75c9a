//! Resizable concurrency slot pool.
//!
//! A slot is an owned semaphore permit stored inside the session that holds
//! it, so dropping the session state (or the permit) is what frees capacity.
//! Shrinking never evicts a holder: permits that cannot be withdrawn yet are
//! recorded as debt and retired as holders release them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{AppError, Result};

#[derive(Debug)]
struct PoolState {
    semaphore: Arc<Semaphore>,
    limit: AtomicUsize,
    /// Permits still owed after a shrink.
    debt: Mutex<usize>,
}

/// Counting pool sized to the configured concurrency limit.
#[derive(Debug, Clone)]
pub struct SlotPool {
    state: Arc<PoolState>,
}

/// One held slot. Released on drop.
#[derive(Debug)]
pub struct SlotPermit {
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolState>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let mut debt = self
            .pool
            .debt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *debt > 0 {
            *debt -= 1;
            permit.forget();
        }
    }
}

impl SlotPool {
    /// Pool with `limit` slots.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            state: Arc::new(PoolState {
                semaphore: Arc::new(Semaphore::new(limit)),
                limit: AtomicUsize::new(limit),
                debt: Mutex::new(0),
            }),
        }
    }

    /// Take a slot.
    ///
    /// Fails immediately when the pool is saturated; otherwise waits at most
    /// `wait` for the permit to be handed over.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Capacity` when no slot is free and
    /// `AppError::Timeout` when the wait elapses.
    pub async fn acquire(&self, wait: Duration) -> Result<SlotPermit> {
        let semaphore = Arc::clone(&self.state.semaphore);
        match Arc::clone(&semaphore).try_acquire_owned() {
            Ok(permit) => return Ok(self.wrap(permit)),
            Err(tokio::sync::TryAcquireError::NoPermits) => {}
            Err(tokio::sync::TryAcquireError::Closed) => {
                return Err(AppError::Capacity("slot pool closed".into()));
            }
        }

        if semaphore.available_permits() == 0 {
            return Err(AppError::Capacity(format!(
                "all {} session slots are in use",
                self.limit()
            )));
        }

        match tokio::time::timeout(wait, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(self.wrap(permit)),
            Ok(Err(_closed)) => Err(AppError::Capacity("slot pool closed".into())),
            Err(_elapsed) => Err(AppError::Timeout(format!(
                "no session slot within {wait:?}"
            ))),
        }
    }

    fn wrap(&self, permit: OwnedSemaphorePermit) -> SlotPermit {
        SlotPermit {
            permit: Some(permit),
            pool: Arc::clone(&self.state),
        }
    }

    /// Change the limit. Existing holders keep their slots.
    pub fn resize(&self, limit: usize) {
        let mut debt = self
            .state
            .debt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = self.state.limit.swap(limit, Ordering::SeqCst);

        if limit > current {
            let mut grow = limit - current;
            let repaid = grow.min(*debt);
            *debt -= repaid;
            grow -= repaid;
            if grow > 0 {
                self.state.semaphore.add_permits(grow);
            }
        } else if limit < current {
            let shrink = current - limit;
            let withdrawn = self.state.semaphore.forget_permits(shrink);
            *debt += shrink - withdrawn;
        }
    }

    /// Configured limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.state.limit.load(Ordering::SeqCst)
    }

    /// Slots a new session could take right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.semaphore.available_permits()
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        let debt = *self
            .state
            .debt
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (self.limit() + debt).saturating_sub(self.available())
    }
}
