//! # vitals-core
//!
//! Core library for the Vitals HUD: reads the character telemetry a game
//! addon writes to disk and distributes it to dashboards and command agents.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Long-lived loops run on dedicated threads.
//! - **Graceful degradation**: Missing or malformed files keep the last good
//!   record and surface an error string, never a failure.
//! - **Explicit context**: One [`StateStore`] per process, constructed by the
//!   caller and shared as `Arc<StateStore>`.
//! - **Injectable time**: Freshness rules read a [`Clock`], so tests never sleep.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vitals_core::{HealthReader, StateStore, StoragePaths};
//!
//! let storage = StoragePaths::from_home()?;
//! let store = Arc::new(StateStore::new());
//! let mut reader = HealthReader::new("Wondolio", storage.data_roots().to_vec(), store);
//! let summary = reader.status_summary();
//! ```

// Public modules
pub mod agent;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod patterns;
pub mod reader;
pub mod repair;
pub mod state;
pub mod storage;
pub mod types;

// Re-export commonly used items at crate root
pub use agent::{
    AgentDirectory, CommandAgent, CommandDisposition, CommandLogEntry, CommandOutcome,
    RoutedOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use dashboard::{
    BarTone, Dashboard, DashboardFrame, DashboardPoller, DashboardPollerHandle, DashboardRow,
    RefreshTrigger, RowStatus,
};
pub use error::{Result, VitalsError};
pub use reader::{HealthReader, Location, LocationKind, QueuedCommand, ReaderPhase};
pub use repair::{
    lenient_parse, repair, repair_with_steps, LenientParse, RepairOutcome, RepairStep,
};
pub use state::{StateStore, SubscriptionId};
pub use storage::*;
pub use types::*;
