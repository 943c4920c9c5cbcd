//! Reactive State Distribution
//!
//! A key/value store with change detection, subscriber notification, a
//! bounded change history, and a drain-once pending-update buffer.
//!
//! ```text
//! Health Reader ──set()──▶ StateStore ──callbacks──▶ subscribers
//!                              │
//!                              └──pending buffer──▶ drain_pending_updates() ◀── Dashboard poll
//! ```
//!
//! The store never calls into a presentation layer. It only flips the
//! "has new updates" flag and runs registered callbacks; whoever renders
//! decides when to redraw.
//!
//! # Key Namespace
//!
//! - `character:<name>`: full raw record for a character
//! - `<name>:hp` / `<name>:mp` / `<name>:tp`: individual vitals
//! - `<name>:status`: `{is_running, timestamp}`
//! - `system:last_manual_refresh`: epoch seconds of the last manual refresh
//!
//! # Module Structure
//!
//! - [`store`]: the store itself
//! - [`maintenance`]: optional background loop with cooperative stop

mod maintenance;
mod store;

pub use maintenance::{DEFAULT_STOP_TIMEOUT, MAINTENANCE_THREAD_NAME};
pub use store::{
    character_field_key, character_key, is_namespaced, ChangeHistoryEntry, PendingUpdate,
    StateEntry, StateStore, Subscriber, SubscriberResult, SubscriptionId, CHARACTER_KEY_PREFIX,
    KEY_SEPARATOR, MANUAL_REFRESH_KEY,
};
