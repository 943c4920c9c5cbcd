//! `dashboard`: print dashboard frames on the refresh cadence.
//!
//! Two threads run alongside the printing loop: the dashboard poller
//! (refresh interval, 3 s by default) and the store maintenance loop
//! (0.5 s), which wakes the poller early when another writer staged updates.

use std::sync::mpsc;
use std::sync::Arc;

use vitals_core::state::DEFAULT_STOP_TIMEOUT;
use vitals_core::{Dashboard, DashboardPoller, StateStore, SystemClock, VitalsConfig};

use crate::AppContext;

pub fn run(ctx: &AppContext, characters: Vec<String>, once: bool) -> Result<(), String> {
    let mut config: VitalsConfig = ctx.config.clone();
    if !characters.is_empty() {
        config.characters = characters;
    }

    let clock = Arc::new(SystemClock);
    let store = Arc::new(StateStore::with_options(config.history_limit, clock.clone()));
    let mut dashboard =
        Dashboard::from_config(&config, ctx.storage.data_roots(), Arc::clone(&store), clock);

    if once {
        print!("{}", dashboard.refresh());
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let mut poller = DashboardPoller::new(dashboard, config.refresh_interval())
        .start(tx)
        .map_err(|e| e.to_string())?;

    let trigger = poller.refresh_trigger();
    store
        .start_maintenance(config.maintenance_interval(), move |store| {
            if store.has_new_updates() {
                tracing::debug!("Pending updates outside a refresh cycle; waking dashboard");
                trigger.fire();
            }
        })
        .map_err(|e| e.to_string())?;

    for frame in rx {
        // Clear screen, home cursor.
        print!("\x1B[2J\x1B[H{}", frame);
    }

    poller.stop();
    store.stop_maintenance(DEFAULT_STOP_TIMEOUT);
    Ok(())
}
