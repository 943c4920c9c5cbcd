//! Background maintenance loop for the state store.
//!
//! The loop runs a caller-supplied tick on a fixed interval (0.5 s by
//! default) on its own thread. Stopping is cooperative: the stop flag is
//! checked once per iteration and between 100 ms sleep slices, and
//! [`StateStore::stop_maintenance`] waits at most the given timeout. A loop
//! that outlives the timeout keeps its slot, so no second loop starts until
//! it has exited.
//!
//! The thread holds only a `Weak` reference, so dropping the last
//! `Arc<StateStore>` also ends the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, VitalsError};

use super::store::StateStore;

pub const MAINTENANCE_THREAD_NAME: &str = "state-store-maintenance";
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);
const SLEEP_SLICE: Duration = Duration::from_millis(100);

struct MaintenanceHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
    exited: Receiver<()>,
}

#[derive(Default)]
pub(crate) struct MaintenanceSlot {
    handle: Mutex<Option<MaintenanceHandle>>,
}

impl MaintenanceSlot {
    fn lock(&self) -> MutexGuard<'_, Option<MaintenanceHandle>> {
        self.handle.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for MaintenanceSlot {
    fn drop(&mut self) {
        if let Ok(slot) = self.handle.get_mut() {
            if let Some(handle) = slot.as_ref() {
                handle.stop.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl StateStore {
    /// Spawns the maintenance thread. Returns `Ok(false)` if one is already running.
    pub fn start_maintenance<F>(self: &Arc<Self>, interval: Duration, mut tick: F) -> Result<bool>
    where
        F: FnMut(&StateStore) + Send + 'static,
    {
        let mut slot = self.maintenance.lock();
        if let Some(existing) = slot.as_ref() {
            if !existing.join.is_finished() {
                return Ok(false);
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let store = Arc::downgrade(self);
        let (exited_tx, exited_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(MAINTENANCE_THREAD_NAME.into())
            .spawn(move || {
                // Dropped on exit, which the stopper observes as a disconnect.
                let _exited = exited_tx;
                tracing::debug!(
                    interval_ms = interval.as_millis() as u64,
                    "Maintenance loop started"
                );
                while !stop_flag.load(Ordering::Relaxed) {
                    let Some(store) = store.upgrade() else {
                        break;
                    };
                    if catch_unwind(AssertUnwindSafe(|| tick(&store))).is_err() {
                        tracing::warn!("Maintenance tick panicked; continuing");
                    }
                    drop(store);

                    let mut remaining = interval;
                    while remaining > Duration::ZERO && !stop_flag.load(Ordering::Relaxed) {
                        let slice = remaining.min(SLEEP_SLICE);
                        thread::sleep(slice);
                        remaining = remaining.saturating_sub(slice);
                    }
                }
                tracing::debug!("Maintenance loop exited");
            })
            .map_err(|source| VitalsError::ThreadSpawn {
                name: MAINTENANCE_THREAD_NAME.to_string(),
                source,
            })?;

        *slot = Some(MaintenanceHandle {
            stop,
            join,
            exited: exited_rx,
        });
        Ok(true)
    }

    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance
            .handle
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.join.is_finished()))
            .unwrap_or(false)
    }

    /// Signals the loop to stop and waits up to `timeout` for it to exit.
    ///
    /// Returns true when the thread was joined (or nothing was running).
    pub fn stop_maintenance(&self, timeout: Duration) -> bool {
        let mut slot = self.maintenance.lock();
        let Some(handle) = slot.take() else {
            return true;
        };
        handle.stop.store(true, Ordering::Relaxed);

        match handle.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join.join().is_err() {
                    tracing::warn!("Maintenance thread ended with a panic");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Maintenance thread did not stop in time"
                );
                *slot = Some(handle);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn maintenance_runs_ticks_until_stopped() {
        let store = Arc::new(StateStore::new());
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let started = store
            .start_maintenance(Duration::from_millis(10), move |store| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                store.set("system:ticks", json!(n));
            })
            .unwrap();
        assert!(started);
        assert!(store.is_maintenance_running());

        thread::sleep(Duration::from_millis(100));
        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));
        assert!(!store.is_maintenance_running());

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert!(store.get("system:ticks").is_some());
    }

    #[test]
    fn second_start_is_ignored_while_running() {
        let store = Arc::new(StateStore::new());
        assert!(store
            .start_maintenance(Duration::from_millis(10), |_| {})
            .unwrap());
        assert!(!store
            .start_maintenance(Duration::from_millis(10), |_| {})
            .unwrap());
        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));

        // Restart after a clean stop.
        assert!(store
            .start_maintenance(Duration::from_millis(10), |_| {})
            .unwrap());
        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let store = StateStore::new();
        assert!(store.stop_maintenance(Duration::from_millis(10)));
    }

    #[test]
    fn stop_times_out_on_a_slow_tick() {
        let store = Arc::new(StateStore::new());
        store
            .start_maintenance(Duration::from_millis(1), |_| {
                thread::sleep(Duration::from_millis(300));
            })
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(!store.stop_maintenance(Duration::from_millis(10)));
    }

    #[test]
    fn restart_refused_until_timed_out_loop_exits() {
        let store = Arc::new(StateStore::new());
        store
            .start_maintenance(Duration::from_millis(1), |_| {
                thread::sleep(Duration::from_millis(200));
            })
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!store.stop_maintenance(Duration::from_millis(10)));

        assert!(!store
            .start_maintenance(Duration::from_millis(10), |_| {})
            .unwrap());
        assert!(store.is_maintenance_running());

        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));
        assert!(store
            .start_maintenance(Duration::from_millis(10), |_| {})
            .unwrap());
        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));
    }

    #[test]
    fn long_interval_stops_promptly() {
        let store = Arc::new(StateStore::new());
        store
            .start_maintenance(Duration::from_secs(30), |_| {})
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));
        assert!(!store.is_maintenance_running());
    }

    #[test]
    fn panicking_tick_keeps_loop_alive() {
        let store = Arc::new(StateStore::new());
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        store
            .start_maintenance(Duration::from_millis(5), move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first tick fails");
                }
            })
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        assert!(store.stop_maintenance(DEFAULT_STOP_TIMEOUT));
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
