//! Process-wide reactive key/value store.
//!
//! One `StateStore` is constructed per process and shared as `Arc<StateStore>`
//! between the background pollers and the foreground request thread.
//!
//! # Write Path
//!
//! [`StateStore::set`] is a no-op when the new value equals the current one
//! (by value, via `serde_json::Value` equality). Otherwise, in order:
//!
//! 1. Replace the value and append a [`ChangeHistoryEntry`] (ring of `history_limit`)
//! 2. Notify subscribers of the key, in subscription order
//! 3. For namespaced keys (containing `:`), stage a [`PendingUpdate`] and raise
//!    the "has new updates" flag
//!
//! Subscribers run outside every lock, so a callback may read or write the
//! store. A callback that errors or panics is logged and skipped.
//!
//! # Locks
//!
//! - `inner`: value map and history ring
//! - `subscribers`: callback lists
//! - `pending`: pending-update buffer and flag, shared with [`StateStore::drain_pending_updates`]

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::{json, Value};

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_HISTORY_LIMIT;

use super::maintenance::MaintenanceSlot;

/// Separator marking character-scoped (namespaced) keys.
pub const KEY_SEPARATOR: char = ':';
pub const CHARACTER_KEY_PREFIX: &str = "character:";
pub const MANUAL_REFRESH_KEY: &str = "system:last_manual_refresh";

const TRACKED_VITALS: [&str; 3] = ["hp", "mp", "tp"];

/// Return value of a subscriber callback. Errors are logged, never propagated.
pub type SubscriberResult = std::result::Result<(), String>;

/// Callback invoked with `(key, old_value, new_value)`.
pub type Subscriber = Arc<dyn Fn(&str, Option<&Value>, &Value) -> SubscriberResult + Send + Sync>;

/// Handle returned by [`StateStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateEntry {
    pub value: Value,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeHistoryEntry {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingUpdate {
    pub value: Value,
    pub timestamp: f64,
}

/// `character:<name>`
pub fn character_key(name: &str) -> String {
    format!("{}{}", CHARACTER_KEY_PREFIX, name)
}

/// `<name>:<field>`, e.g. `Wondolio:hp` or `Wondolio:status`.
pub fn character_field_key(name: &str, field: &str) -> String {
    format!("{}{}{}", name, KEY_SEPARATOR, field)
}

pub fn is_namespaced(key: &str) -> bool {
    key.contains(KEY_SEPARATOR)
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, StateEntry>,
    history: VecDeque<ChangeHistoryEntry>,
}

#[derive(Default)]
struct PendingBuffer {
    updates: HashMap<String, PendingUpdate>,
    has_new_updates: bool,
}

pub struct StateStore {
    inner: Mutex<StoreInner>,
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, Subscriber)>>>,
    pending: Mutex<PendingBuffer>,
    next_subscription: AtomicU64,
    history_limit: usize,
    clock: Arc<dyn Clock>,
    pub(super) maintenance: MaintenanceSlot,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_options(DEFAULT_HISTORY_LIMIT, Arc::new(SystemClock))
    }

    pub fn with_options(history_limit: usize, clock: Arc<dyn Clock>) -> Self {
        StateStore {
            inner: Mutex::new(StoreInner::default()),
            subscribers: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingBuffer::default()),
            next_subscription: AtomicU64::new(1),
            history_limit: history_limit.max(1),
            clock,
            maintenance: MaintenanceSlot::default(),
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.inner)
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    pub fn entry(&self, key: &str) -> Option<StateEntry> {
        lock(&self.inner).entries.get(key).cloned()
    }

    /// Copy of every key and value.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        lock(&self.inner)
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Copy of the change history, oldest first.
    pub fn history(&self) -> Vec<ChangeHistoryEntry> {
        lock(&self.inner).history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.inner).history.len()
    }

    /// Names of characters with a `character:<name>` record, sorted.
    pub fn character_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner)
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(CHARACTER_KEY_PREFIX))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores `value` under `key`. Returns false when the value was unchanged.
    pub fn set(&self, key: &str, value: Value) -> bool {
        let now = self.clock.now();

        let old_value = {
            let mut inner = lock(&self.inner);
            let old_value = inner.entries.get(key).map(|entry| entry.value.clone());
            if old_value.as_ref() == Some(&value) {
                return false;
            }
            inner.entries.insert(
                key.to_string(),
                StateEntry {
                    value: value.clone(),
                    timestamp: now,
                },
            );
            inner.history.push_back(ChangeHistoryEntry {
                key: key.to_string(),
                old_value: old_value.clone(),
                new_value: value.clone(),
                timestamp: now,
            });
            while inner.history.len() > self.history_limit {
                inner.history.pop_front();
            }

            // Staged while `inner` is held so the buffer never lags the map.
            // Lock order: inner, then pending.
            if is_namespaced(key) {
                let mut pending = lock(&self.pending);
                pending.updates.insert(
                    key.to_string(),
                    PendingUpdate {
                        value: value.clone(),
                        timestamp: now,
                    },
                );
                pending.has_new_updates = true;
                tracing::debug!(
                    key = %key,
                    pending = pending.updates.len(),
                    "State updated; pending update staged"
                );
            }
            old_value
        };

        self.notify_subscribers(key, old_value.as_ref(), &value);
        true
    }

    /// Writes the full record under `character:<name>` plus `<name>:hp|mp|tp`
    /// for each vital present in `data.vitals`.
    pub fn update_character_data(&self, name: &str, data: &Value) {
        self.set(&character_key(name), data.clone());

        if let Some(vitals) = data.get("vitals").and_then(Value::as_object) {
            for vital in TRACKED_VITALS {
                if let Some(value) = vitals.get(vital) {
                    self.set(&character_field_key(name, vital), value.clone());
                }
            }
        }
    }

    /// Writes `<name>:status` as `{is_running, timestamp}`.
    pub fn publish_status(&self, name: &str, is_running: bool, timestamp: Option<f64>) -> bool {
        self.set(
            &character_field_key(name, "status"),
            json!({
                "is_running": is_running,
                "timestamp": timestamp,
            }),
        )
    }

    /// Records a manual refresh request so pollers see a pending update.
    pub fn force_refresh(&self) {
        tracing::info!("Manual refresh requested");
        let now = self.clock.now();
        self.set(MANUAL_REFRESH_KEY, json!(now));
    }

    /// Atomically takes the pending updates and the "has new updates" flag.
    ///
    /// Consume-once: a second call without intervening writes returns an
    /// empty map and `false`.
    pub fn drain_pending_updates(&self) -> (HashMap<String, PendingUpdate>, bool) {
        let mut pending = lock(&self.pending);
        let updates = std::mem::take(&mut pending.updates);
        let had_updates = std::mem::replace(&mut pending.has_new_updates, false);
        tracing::debug!(
            had_updates,
            count = updates.len(),
            "Pending updates drained"
        );
        (updates, had_updates)
    }

    pub fn has_new_updates(&self) -> bool {
        lock(&self.pending).has_new_updates
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&str, Option<&Value>, &Value) -> SubscriberResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers)
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns false when it was not registered for `key`.
    pub fn unsubscribe(&self, key: &str, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let Some(list) = subscribers.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(key);
        }
        removed
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        lock(&self.subscribers).get(key).map_or(0, Vec::len)
    }

    fn notify_subscribers(&self, key: &str, old_value: Option<&Value>, new_value: &Value) {
        let callbacks: Vec<Subscriber> = match lock(&self.subscribers).get(key) {
            Some(list) => list.iter().map(|(_, callback)| Arc::clone(callback)).collect(),
            None => return,
        };

        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(key, old_value, new_value))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(key = %key, error = %err, "Error in subscriber callback");
                }
                Err(_) => {
                    tracing::error!(key = %key, "Subscriber callback panicked");
                }
            }
        }
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counting_subscriber(
        store: &StateStore,
        key: &str,
    ) -> (SubscriptionId, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = store.subscribe(key, move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (id, count)
    }

    #[test]
    fn get_missing_key_returns_default() {
        let store = StateStore::new();
        assert!(store.get("nope").is_none());
        assert_eq!(store.get_or("nope", json!(7)), json!(7));
    }

    #[test]
    fn identical_write_is_a_no_op() {
        let store = StateStore::new();
        let (_, count) = counting_subscriber(&store, "Wondolio:hp");

        assert!(store.set("Wondolio:hp", json!(100)));
        assert!(!store.set("Wondolio:hp", json!(100)));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn deep_equal_objects_do_not_notify() {
        let store = StateStore::new();
        let (_, count) = counting_subscriber(&store, "character:Wondolio");

        store.set("character:Wondolio", json!({"vitals": {"hp": 1, "mp": 2}}));
        store.set("character:Wondolio", json!({"vitals": {"mp": 2, "hp": 1}}));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribers_receive_old_and_new_values_in_order() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            store.subscribe("Wondolio:tp", move |key, old, new| {
                seen.lock().unwrap().push(format!("{tag} {key} {old:?} {new}"));
                Ok(())
            });
        }

        store.set("Wondolio:tp", json!(1500));
        store.set("Wondolio:tp", json!(1501));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                "first Wondolio:tp None 1500",
                "second Wondolio:tp None 1500",
                "first Wondolio:tp Some(Number(1500)) 1501",
                "second Wondolio:tp Some(Number(1500)) 1501",
            ]
        );
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let store = StateStore::new();
        store.subscribe("Wondolio:hp", |_, _, _| Err("boom".to_string()));
        store.subscribe("Wondolio:hp", |_, _, _| panic!("subscriber bug"));
        let (_, count) = counting_subscriber(&store, "Wondolio:hp");

        assert!(store.set("Wondolio:hp", json!(42)));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("Wondolio:hp"), Some(json!(42)));
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn subscriber_can_read_the_store() {
        let store = Arc::new(StateStore::new());
        let observed = Arc::new(Mutex::new(None));
        {
            let store_ref = Arc::clone(&store);
            let observed = Arc::clone(&observed);
            store.subscribe("Wondolio:mp", move |key, _, _| {
                *observed.lock().unwrap() = store_ref.get(key);
                Ok(())
            });
        }

        store.set("Wondolio:mp", json!(300));
        assert_eq!(*observed.lock().unwrap(), Some(json!(300)));
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = StateStore::new();
        let (id, count) = counting_subscriber(&store, "Wondolio:hp");

        store.set("Wondolio:hp", json!(1));
        assert!(store.unsubscribe("Wondolio:hp", id));
        assert!(!store.unsubscribe("Wondolio:hp", id));
        store.set("Wondolio:hp", json!(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriber_count("Wondolio:hp"), 0);
    }

    #[test]
    fn history_is_bounded() {
        let store = StateStore::new();
        for i in 0..1000 {
            store.set("Wondolio:tp", json!(i));
        }
        let history = store.history();
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history.first().unwrap().new_value, json!(900));
        assert_eq!(history.last().unwrap().new_value, json!(999));
        assert_eq!(history.last().unwrap().old_value, Some(json!(998)));
    }

    #[test]
    fn drain_is_consume_once() {
        let store = StateStore::new();
        store.set("Wondolio:hp", json!(10));
        store.set("Wondolio:hp", json!(11));

        let (updates, had_updates) = store.drain_pending_updates();
        assert!(had_updates);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates["Wondolio:hp"].value, json!(11));

        let (updates, had_updates) = store.drain_pending_updates();
        assert!(updates.is_empty());
        assert!(!had_updates);
    }

    #[test]
    fn flat_keys_are_not_staged() {
        let store = StateStore::new();
        store.set("theme", json!("dark"));
        assert!(!store.has_new_updates());
        let (updates, had_updates) = store.drain_pending_updates();
        assert!(updates.is_empty());
        assert!(!had_updates);
    }

    #[test]
    fn update_character_data_fans_out_vitals() {
        let store = StateStore::new();
        let record = json!({"vitals": {"hp": 900, "mp": 120, "hp_max": 1000}});
        store.update_character_data("Wondolio", &record);

        assert_eq!(store.get("character:Wondolio"), Some(record));
        assert_eq!(store.get("Wondolio:hp"), Some(json!(900)));
        assert_eq!(store.get("Wondolio:mp"), Some(json!(120)));
        assert!(store.get("Wondolio:tp").is_none());
        assert!(store.get("Wondolio:hp_max").is_none());
        assert_eq!(store.character_names(), vec!["Wondolio".to_string()]);
    }

    #[test]
    fn force_refresh_records_clock_time() {
        let clock = Arc::new(ManualClock::new(1234.0));
        let store = StateStore::with_options(10, clock);
        store.force_refresh();

        assert_eq!(store.get(MANUAL_REFRESH_KEY), Some(json!(1234.0)));
        let (updates, had_updates) = store.drain_pending_updates();
        assert!(had_updates);
        assert!(updates.contains_key(MANUAL_REFRESH_KEY));
    }

    #[test]
    fn concurrent_writers_keep_history_consistent() {
        let store = Arc::new(StateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200 {
                        store.set(&format!("char{worker}:tp"), json!(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.history_len(), DEFAULT_HISTORY_LIMIT);
        for worker in 0..8 {
            assert_eq!(store.get(&format!("char{worker}:tp")), Some(json!(199)));
        }
        let (updates, had_updates) = store.drain_pending_updates();
        assert!(had_updates);
        assert_eq!(updates.len(), 8);
    }

    #[test]
    fn pending_buffer_matches_map_under_contention() {
        let store = Arc::new(StateStore::new());
        for round in 0..20 {
            let handles: Vec<_> = (0..4)
                .map(|worker| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..50 {
                            store.set("Wondolio:hp", json!(round * 1000 + worker * 100 + i));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let (updates, _) = store.drain_pending_updates();
            assert_eq!(
                updates.get("Wondolio:hp").map(|update| &update.value),
                store.get("Wondolio:hp").as_ref(),
                "round {round}"
            );
        }
    }
}
