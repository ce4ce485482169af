//! Bounded pool of interchangeable engines.
//!
//! The pool owns a fixed number of slots. Idle engines sit in a stack whose
//! size always matches the semaphore's available permits, so `acquire` only
//! ever pops after it was granted a permit. A guard returning an unhealthy
//! engine retires it and a background task starts a replacement for the
//! same slot.

use crate::config::{EngineConfig, LimitProfile};
use crate::engine::{AnalysisEngine, EngineError, EngineFactory};
use crate::evaluation::Evaluation;
use crate::sequence::Position;
use futures_util::future::{join_all, try_join_all};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Slot {
    id: usize,
    engine: Box<dyn AnalysisEngine>,
}

struct PoolInner {
    factory: Arc<dyn EngineFactory>,
    capacity: usize,
    idle: Mutex<Vec<Slot>>,
    permits: Semaphore,
    /// Slots that have an engine or are still trying to get one.
    live: AtomicUsize,
    checked_out: AtomicUsize,
    returned: Notify,
    shutdown: CancellationToken,
    /// Set once shutdown has drained the idle stack; engines handed back
    /// after that are stopped instead of parked.
    stopped: AtomicBool,
    grace: Duration,
    respawn_attempts: u32,
    respawn_backoff: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PoolInner {
    fn make_idle(&self, slot: Slot) {
        let mut idle = lock(&self.idle);
        if self.stopped.load(Ordering::SeqCst) {
            drop(idle);
            self.stop_late(slot);
            return;
        }
        idle.push(slot);
        if !self.shutdown.is_cancelled() {
            self.permits.add_permits(1);
        }
    }

    fn stop_late(&self, slot: Slot) {
        debug!(slot = slot.id, "engine returned after shutdown, stopping it");
        let Slot { engine, .. } = slot;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(engine.shutdown(self.grace));
            }
            // Dropping the handle kills the process.
            Err(_) => drop(engine),
        }
    }

    fn drain_idle(&self) -> Vec<Slot> {
        let mut idle = lock(&self.idle);
        self.stopped.store(true, Ordering::SeqCst);
        std::mem::take(&mut *idle)
    }

    fn lose_slot(&self, id: usize) {
        let remaining = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        error!(slot = id, remaining, "engine slot lost");
        if remaining == 0 {
            error!("no engines left, closing pool");
            self.permits.close();
        }
    }

    async fn wait_for_returns(&self) {
        loop {
            let notified = self.returned.notified();
            if self.checked_out.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A fixed-size set of engines shared by every analysis task.
///
/// Cloning is cheap; clones share the same engines.
#[derive(Clone)]
pub struct EnginePool {
    inner: Arc<PoolInner>,
}

impl EnginePool {
    /// Starts `size` engines through `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] if `size` is zero or any engine
    /// fails to start. Engines that did start are stopped again.
    pub async fn new(
        factory: Arc<dyn EngineFactory>,
        size: usize,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(EngineError::Unavailable(
                "engine pool needs at least one engine".to_string(),
            ));
        }

        let shutdown = CancellationToken::new();
        let spawns = (0..size).map(|id| {
            let factory = Arc::clone(&factory);
            let token = shutdown.clone();
            async move {
                factory
                    .spawn(id, token)
                    .await
                    .map(|engine| Slot { id, engine })
            }
        });
        let slots = match try_join_all(spawns).await {
            Ok(slots) => slots,
            Err(e) => {
                shutdown.cancel();
                return Err(match e {
                    EngineError::Unavailable(_) => e,
                    other => EngineError::Unavailable(other.to_string()),
                });
            }
        };

        info!(size, "engine pool started");
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                capacity: size,
                idle: Mutex::new(slots),
                permits: Semaphore::new(size),
                live: AtomicUsize::new(size),
                checked_out: AtomicUsize::new(0),
                returned: Notify::new(),
                shutdown,
                stopped: AtomicBool::new(false),
                grace: config.grace_period(),
                respawn_attempts: config.respawn_attempts,
                respawn_backoff: config.respawn_backoff(),
            }),
        })
    }

    /// Waits for an idle engine and checks it out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PoolClosed`] once the pool was shut down or
    /// lost every slot.
    pub async fn acquire(&self) -> Result<PooledEngine, EngineError> {
        let permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        permit.forget();

        let slot = lock(&self.inner.idle).pop().ok_or(EngineError::PoolClosed)?;
        self.inner.checked_out.fetch_add(1, Ordering::SeqCst);
        debug!(slot = slot.id, "engine acquired");
        Ok(PooledEngine {
            slot: Some(slot),
            pool: Arc::clone(&self.inner),
            interrupted: false,
        })
    }

    /// Configured number of engines.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots not permanently lost.
    pub fn live_engines(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Engines currently waiting to be acquired.
    pub fn idle_engines(&self) -> usize {
        lock(&self.inner.idle).len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    /// Token cancelled when the pool shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Stops every engine.
    ///
    /// In-flight calls are interrupted, new acquisitions fail, idle engines
    /// get `quit` and the grace period, and checked-out engines are waited
    /// for (again bounded by the grace period) before they are stopped too.
    /// Engines handed back later, or respawned while shutdown ran, are
    /// stopped as soon as they arrive.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() && inner.permits.is_closed() {
            return;
        }
        info!("shutting down engine pool");
        inner.shutdown.cancel();
        inner.permits.close();

        if tokio::time::timeout(inner.grace, inner.wait_for_returns())
            .await
            .is_err()
        {
            warn!(
                checked_out = inner.checked_out.load(Ordering::SeqCst),
                "engines still checked out after grace period"
            );
        }

        let slots = inner.drain_idle();
        join_all(slots.into_iter().map(|slot| slot.engine.shutdown(inner.grace))).await;
        info!("engine pool stopped");
    }
}

/// Exclusive use of one pooled engine. Dropping the guard gives the engine
/// back.
pub struct PooledEngine {
    slot: Option<Slot>,
    pool: Arc<PoolInner>,
    interrupted: bool,
}

impl PooledEngine {
    /// Slot the engine belongs to.
    pub fn slot(&self) -> usize {
        self.slot.as_ref().map_or(usize::MAX, |slot| slot.id)
    }

    pub fn name(&self) -> &str {
        self.slot.as_ref().map_or("", |slot| slot.engine.name())
    }

    pub async fn evaluate(
        &mut self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        let slot = self.slot.as_mut().ok_or(EngineError::PoolClosed)?;
        // Stays set if this future is dropped mid-search.
        self.interrupted = true;
        let result = slot.engine.evaluate(position, limit).await;
        self.interrupted = false;
        result
    }
}

impl Drop for PooledEngine {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let pool = &self.pool;

        if pool.shutdown.is_cancelled() || (slot.engine.is_healthy() && !self.interrupted) {
            pool.make_idle(slot);
        } else {
            retire(Arc::clone(pool), slot);
        }

        pool.checked_out.fetch_sub(1, Ordering::SeqCst);
        pool.returned.notify_waiters();
    }
}

fn retire(pool: Arc<PoolInner>, slot: Slot) {
    warn!(slot = slot.id, "retiring unhealthy engine");
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(respawn(pool, slot));
        }
        Err(_) => {
            let id = slot.id;
            drop(slot);
            pool.lose_slot(id);
        }
    }
}

async fn respawn(pool: Arc<PoolInner>, slot: Slot) {
    let Slot { id, engine } = slot;
    engine.shutdown(Duration::ZERO).await;

    for attempt in 1..=pool.respawn_attempts {
        if pool.shutdown.is_cancelled() {
            debug!(slot = id, "pool shutting down, not respawning");
            pool.live.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        match pool.factory.spawn(id, pool.shutdown.clone()).await {
            Ok(engine) => {
                // make_idle stops it if shutdown drained the pool meanwhile.
                info!(slot = id, attempt, "engine respawned");
                pool.make_idle(Slot { id, engine });
                return;
            }
            Err(e) => {
                warn!(slot = id, attempt, error = %e, "engine respawn failed");
                if attempt < pool.respawn_attempts {
                    tokio::time::sleep(pool.respawn_backoff * attempt).await;
                }
            }
        }
    }

    pool.lose_slot(id);
}
