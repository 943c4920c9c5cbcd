//! Background refresh loop for the dashboard.
//!
//! Runs [`Dashboard::refresh`] on a fixed cadence (3 s by default) and sends
//! each frame over a channel. The sleep is sliced so stop and manual-refresh
//! requests are noticed within 100 ms.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, VitalsError};

use super::{Dashboard, DashboardFrame};

pub const DASHBOARD_THREAD_NAME: &str = "dashboard-poller";

const SLEEP_SLICE: Duration = Duration::from_millis(100);

pub struct DashboardPoller {
    dashboard: Dashboard,
    interval: Duration,
    stop: Arc<AtomicBool>,
    refresh_requested: Arc<AtomicBool>,
}

pub struct DashboardPollerHandle {
    join: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    refresh_requested: Arc<AtomicBool>,
}

/// Cloneable way to ask a running poller for an early, manual refresh.
#[derive(Clone)]
pub struct RefreshTrigger(Arc<AtomicBool>);

impl RefreshTrigger {
    pub fn fire(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl DashboardPoller {
    pub fn new(dashboard: Dashboard, interval: Duration) -> Self {
        Self {
            dashboard,
            interval,
            stop: Arc::new(AtomicBool::new(false)),
            refresh_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the loop. Frames go to `frames`; the loop ends when the receiver is dropped.
    pub fn start(self, frames: Sender<DashboardFrame>) -> Result<DashboardPollerHandle> {
        let stop = Arc::clone(&self.stop);
        let refresh_requested = Arc::clone(&self.refresh_requested);
        let join = thread::Builder::new()
            .name(DASHBOARD_THREAD_NAME.into())
            .spawn(move || self.run(frames))
            .map_err(|source| VitalsError::ThreadSpawn {
                name: DASHBOARD_THREAD_NAME.to_string(),
                source,
            })?;
        Ok(DashboardPollerHandle {
            join: Some(join),
            stop,
            refresh_requested,
        })
    }

    fn run(mut self, frames: Sender<DashboardFrame>) {
        let mut forced = false;
        while !self.stop.load(Ordering::Relaxed) {
            let dashboard = &mut self.dashboard;
            let frame = catch_unwind(AssertUnwindSafe(|| {
                if forced {
                    dashboard.force_refresh()
                } else {
                    dashboard.refresh()
                }
            }));
            match frame {
                Ok(frame) => {
                    if frames.send(frame).is_err() {
                        tracing::debug!("Frame receiver dropped; stopping dashboard poller");
                        break;
                    }
                }
                Err(_) => tracing::warn!("Dashboard refresh panicked; keeping poller alive"),
            }

            forced = self.sleep_until_next_cycle();
        }
        tracing::debug!("Dashboard poller exited");
    }

    /// Returns true when woken early by a manual refresh request.
    fn sleep_until_next_cycle(&self) -> bool {
        let mut remaining = self.interval;
        while remaining > Duration::ZERO && !self.stop.load(Ordering::Relaxed) {
            if self.refresh_requested.swap(false, Ordering::Relaxed) {
                return true;
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        false
    }
}

impl DashboardPollerHandle {
    /// Asks the loop to run a manual refresh without waiting for the interval.
    pub fn request_refresh(&self) {
        self.refresh_trigger().fire();
    }

    pub fn refresh_trigger(&self) -> RefreshTrigger {
        RefreshTrigger(Arc::clone(&self.refresh_requested))
    }

    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Signals stop and waits for the thread to exit.
    pub fn stop(&mut self) {
        self.signal_stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("Dashboard poller thread ended with a panic");
            }
        }
    }
}

impl Drop for DashboardPollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
