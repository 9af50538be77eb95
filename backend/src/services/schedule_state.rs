//! Owner of the current schedule
//!
//! Readers get an `Arc` snapshot; writers swap in a whole new schedule, so a
//! reader never observes a half-updated plan. Slot transitions are applied to
//! whatever schedule is current at commit time, which keeps a regeneration
//! that lands mid-scan from being overwritten by a stale copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared::{Schedule, Slot, SlotId, TransitionError};

use crate::error::{AppError, AppResult};
use crate::services::schedule_store::ScheduleStore;

pub struct ScheduleState {
    current: RwLock<Option<Arc<Schedule>>>,
    dirty: AtomicBool,
    store: Arc<dyn ScheduleStore>,
    save_lock: tokio::sync::Mutex<()>,
    save_timeout: Duration,
}

impl ScheduleState {
    pub fn new(store: Arc<dyn ScheduleStore>, save_timeout: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            dirty: AtomicBool::new(false),
            store,
            save_lock: tokio::sync::Mutex::new(()),
            save_timeout,
        }
    }

    pub fn current(&self) -> Option<Arc<Schedule>> {
        self.current.read().clone()
    }

    /// Current schedule or `NotFound`
    pub fn require(&self) -> AppResult<Arc<Schedule>> {
        self.current()
            .ok_or_else(|| AppError::NotFound("schedule".to_string()))
    }

    /// Swap in a whole schedule; it is persisted on the next `persist`
    pub fn replace(&self, schedule: Schedule) -> Arc<Schedule> {
        let schedule = Arc::new(schedule);
        *self.current.write() = Some(Arc::clone(&schedule));
        self.dirty.store(true, Ordering::SeqCst);
        schedule
    }

    /// Read the saved schedule into memory without marking it dirty
    pub async fn restore(&self) -> AppResult<Option<Arc<Schedule>>> {
        let loaded = self.store.load().await?.map(Arc::new);
        if let Some(schedule) = &loaded {
            *self.current.write() = Some(Arc::clone(schedule));
        }
        Ok(loaded)
    }

    /// Apply a transition to one slot of the current schedule.
    ///
    /// The slot is looked up, transformed and written back under a single
    /// write lock, so two concurrent transitions of the same slot serialize
    /// and the second sees the result of the first.
    pub fn update_slot<F>(&self, id: &SlotId, transition: F) -> AppResult<Slot>
    where
        F: FnOnce(&Slot) -> Result<Slot, TransitionError>,
    {
        let mut guard = self.current.write();
        let current = guard
            .as_ref()
            .ok_or_else(|| AppError::NotFound("schedule".to_string()))?;
        let slot = current
            .slot(id)
            .ok_or_else(|| AppError::NotFound(format!("slot {}", id)))?;

        let updated = transition(slot)?;
        let mut next = Schedule::clone(current);
        if next.slots.replace(updated.clone()).is_err() {
            return Err(AppError::Internal(format!("slot {} changed identity", id)));
        }
        *guard = Some(Arc::new(next));
        drop(guard);

        self.dirty.store(true, Ordering::SeqCst);
        Ok(updated)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Save the current schedule. On failure the schedule stays dirty and
    /// the in-memory copy remains authoritative.
    pub async fn persist(&self) -> AppResult<()> {
        let _guard = self.save_lock.lock().await;
        self.dirty.store(false, Ordering::SeqCst);

        let Some(schedule) = self.current() else {
            return Ok(());
        };

        let result = match tokio::time::timeout(self.save_timeout, self.store.save(&schedule)).await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout("schedule save".to_string())),
        };

        if let Err(e) = &result {
            self.dirty.store(true, Ordering::SeqCst);
            tracing::warn!(code = e.code(), "schedule not persisted, will retry: {e}");
        }
        result
    }

    /// Persist only if something changed since the last successful save
    pub async fn persist_if_dirty(&self) -> AppResult<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.persist().await.map(|_| true)
    }
}
