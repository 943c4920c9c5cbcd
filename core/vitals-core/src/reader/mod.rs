//! Health Data Reader
//!
//! Owns one character's data file: finds it, reads it, decides whether the
//! sample is fresh, and republishes it into the [`StateStore`].
//!
//! ```text
//! Unlocated ──locate──▶ Located ──read──▶ Fresh ◀──▶ Stale
//!     ▲                                     │
//!     └──────── file disappeared ───────────┘
//! ```
//!
//! Reads never fail. Every problem (missing file, bad JSON, unknown
//! character) is kept as `last_error` while the last good record stays in
//! place.
//!
//! # Freshness
//!
//! A sample is accepted when its timestamp strictly increased or its TP
//! changed. The staleness clock is anchored at the accepted timestamp, or at
//! the read time when only TP moved. The reader is running while the anchor is
//! no older than the stale window (10 s by default).

mod locate;

pub use locate::{
    data_file_name, list_json_files, locate_data_file, resolve_character_key, Location,
    LocationKind,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_STALE_AFTER_SECS;
use crate::error::{Result, VitalsError};
use crate::repair::lenient_parse;
use crate::state::StateStore;
use crate::types::{
    lenient_f64, relative_age, Availability, CharacterSample, CharacterStatusRecord,
};

pub const QUEUED_STATUS: &str = "command_queued";

/// Receipt for a command handed to the outbound placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedCommand {
    pub status: String,
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderPhase {
    Unlocated,
    Located,
    Fresh,
    Stale,
}

/// Why the last read produced nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadFailure {
    Missing,
    Unreadable,
    Malformed,
    CharacterMissing,
    EmptyRecord,
}

pub struct HealthReader {
    character: String,
    roots: Vec<PathBuf>,
    location: Location,
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    stale_after: f64,
    phase: ReaderPhase,
    last_record: Option<Value>,
    last_sample: Option<CharacterSample>,
    last_timestamp: Option<f64>,
    freshness_anchor: Option<f64>,
    /// The last record's timestamp was stamped by the reader, not the file.
    synthesized_timestamp: bool,
    is_running: bool,
    last_error: Option<String>,
    last_failure: Option<ReadFailure>,
}

impl HealthReader {
    pub fn new(character: &str, roots: Vec<PathBuf>, store: Arc<StateStore>) -> Self {
        Self::with_clock(character, roots, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        character: &str,
        roots: Vec<PathBuf>,
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let location = locate_data_file(character, &roots);
        let mut reader = HealthReader {
            character: character.to_string(),
            roots,
            location: Location {
                path: PathBuf::new(),
                kind: LocationKind::Default,
                character_key: None,
            },
            store,
            clock,
            stale_after: DEFAULT_STALE_AFTER_SECS,
            phase: ReaderPhase::Unlocated,
            last_record: None,
            last_sample: None,
            last_timestamp: None,
            freshness_anchor: None,
            synthesized_timestamp: false,
            is_running: false,
            last_error: None,
            last_failure: None,
        };
        reader.adopt_location(location);
        reader
    }

    /// Overrides the freshness window (seconds).
    pub fn with_stale_after(mut self, seconds: f64) -> Self {
        self.stale_after = seconds.max(0.0);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Character name, in the on-disk casing once a file confirmed it.
    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn data_file(&self) -> &Path {
        &self.location.path
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn phase(&self) -> ReaderPhase {
        self.phase
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The raw record of the last successful parse, timestamp included.
    pub fn last_record(&self) -> Option<&Value> {
        self.last_record.as_ref()
    }

    pub fn last_sample(&self) -> Option<&CharacterSample> {
        self.last_sample.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.is_running && self.anchor_is_fresh(self.clock.now())
    }

    /// Seconds since the last accepted timestamp, if any.
    pub fn time_since_last_update(&self) -> Option<f64> {
        self.last_timestamp
            .map(|timestamp| (self.clock.now() - timestamp).max(0.0))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reads the data file and returns the last good record.
    ///
    /// The returned record is unchanged when the file is missing, empty,
    /// malformed, or lacks the character.
    pub fn read(&mut self) -> Option<&Value> {
        if !self.location.path.is_file() {
            let relocated = locate_data_file(&self.character, &self.roots);
            self.adopt_location(relocated);
        }

        match self.load_record() {
            Ok(Some(record)) => {
                self.last_error = None;
                self.last_failure = None;
                self.apply_record(record);
            }
            Ok(None) => {
                tracing::debug!(
                    character = %self.character,
                    "Data file empty; keeping last record"
                );
                self.refresh_running_flag();
            }
            Err((failure, err)) => {
                tracing::warn!(
                    character = %self.character,
                    error = %err,
                    "Health data read failed"
                );
                if failure == ReadFailure::Missing {
                    self.phase = ReaderPhase::Unlocated;
                }
                self.last_error = Some(err.to_string());
                self.last_failure = Some(failure);
                self.refresh_running_flag();
            }
        }

        self.last_record.as_ref()
    }

    /// Reads and extracts this character's record. `Ok(None)` means the file was empty.
    fn load_record(&mut self) -> std::result::Result<Option<Value>, (ReadFailure, VitalsError)> {
        let path = self.location.path.clone();
        if !path.is_file() {
            return Err((
                ReadFailure::Missing,
                VitalsError::LocationNotFound {
                    character: self.character.clone(),
                },
            ));
        }

        let bytes = fs_err::read(&path).map_err(|source| {
            (
                ReadFailure::Unreadable,
                VitalsError::Io {
                    context: format!("reading {}", path.display()),
                    source,
                },
            )
        })?;
        let text = String::from_utf8_lossy(&bytes);
        if text.trim().is_empty() {
            return Ok(None);
        }

        let parsed = lenient_parse(&text).map_err(|err| (ReadFailure::Malformed, err))?;
        if parsed.was_repaired() {
            tracing::info!(
                character = %self.character,
                path = %path.display(),
                "Parsed health data after repair"
            );
        }
        let mut document = parsed.value;

        let key = resolve_character_key(&document, &self.character).ok_or_else(|| {
            (
                ReadFailure::CharacterMissing,
                VitalsError::CharacterNotFound {
                    character: self.character.clone(),
                },
            )
        })?;
        if key != self.character {
            tracing::info!(from = %self.character, to = %key, "Adopting on-disk character casing");
            self.character = key.clone();
        }

        let record = document
            .as_object_mut()
            .and_then(|object| object.remove(&key))
            .filter(|record| record.as_object().is_some_and(|object| !object.is_empty()))
            .ok_or_else(|| {
                (
                    ReadFailure::EmptyRecord,
                    VitalsError::EmptyRecord {
                        character: self.character.clone(),
                    },
                )
            })?;

        Ok(Some(record))
    }

    fn apply_record(&mut self, mut record: Value) {
        let now = self.clock.now();

        let timestamp = match record.get("timestamp").and_then(lenient_f64) {
            Some(timestamp) => {
                self.synthesized_timestamp = false;
                timestamp
            }
            None => {
                // Unchanged payload keeps the stamp from its first read.
                let timestamp = self.repeated_synthesized_timestamp(&record).unwrap_or(now);
                if let Some(object) = record.as_object_mut() {
                    object.insert("timestamp".to_string(), json!(timestamp));
                }
                self.synthesized_timestamp = true;
                timestamp
            }
        };

        let new_tp = CharacterSample::raw_tp(&record);
        let old_tp = self.last_record.as_ref().and_then(CharacterSample::raw_tp);
        let tp_changed = matches!((old_tp, new_tp), (Some(old), Some(new)) if old != new);

        match self.last_timestamp {
            None => self.accept(timestamp, timestamp),
            Some(previous) if timestamp > previous => self.accept(timestamp, timestamp),
            Some(previous) if tp_changed => {
                tracing::debug!(
                    character = %self.character,
                    previous,
                    timestamp,
                    "TP changed without a newer timestamp; accepting"
                );
                self.accept(timestamp, now);
            }
            Some(_) => {}
        }

        self.last_sample = Some(CharacterSample::from_value(&record));
        self.last_record = Some(record);
        self.is_running = self.anchor_is_fresh(now);
        self.phase = if self.is_running {
            ReaderPhase::Fresh
        } else {
            ReaderPhase::Stale
        };

        if let Some(record) = &self.last_record {
            self.store.update_character_data(&self.character, record);
        }
        self.store
            .publish_status(&self.character, self.is_running, self.last_timestamp);
    }

    /// Timestamp stamped on the previous read, when `record` matches it otherwise.
    fn repeated_synthesized_timestamp(&self, record: &Value) -> Option<f64> {
        if !self.synthesized_timestamp {
            return None;
        }
        let last = self.last_record.as_ref()?;
        if without_timestamp(last) == without_timestamp(record) {
            last.get("timestamp").and_then(lenient_f64)
        } else {
            None
        }
    }

    fn accept(&mut self, timestamp: f64, anchor: f64) {
        self.last_timestamp = Some(timestamp);
        self.freshness_anchor = Some(anchor);
    }

    fn anchor_is_fresh(&self, now: f64) -> bool {
        self.freshness_anchor
            .is_some_and(|anchor| now - anchor <= self.stale_after)
    }

    fn refresh_running_flag(&mut self) {
        let running = self.last_record.is_some() && self.anchor_is_fresh(self.clock.now());
        if running != self.is_running {
            self.is_running = running;
            if self.last_record.is_some() {
                self.phase = if running {
                    ReaderPhase::Fresh
                } else {
                    ReaderPhase::Stale
                };
                self.store
                    .publish_status(&self.character, running, self.last_timestamp);
            }
        }
    }

    fn adopt_location(&mut self, location: Location) {
        if let Some(key) = &location.character_key {
            if *key != self.character {
                tracing::info!(
                    from = %self.character,
                    to = %key,
                    "Adopting on-disk character casing"
                );
                self.character = key.clone();
            }
        }
        if location.is_found() && self.phase == ReaderPhase::Unlocated {
            self.phase = ReaderPhase::Located;
        }
        self.location = location;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Summaries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Full status record for display. Reads first if nothing was read yet.
    pub fn status_summary(&mut self) -> CharacterStatusRecord {
        if self.last_record.is_none() {
            self.read();
        }

        let Some(sample) = &self.last_sample else {
            let availability = match self.last_failure {
                Some(ReadFailure::CharacterMissing) => Availability::CharacterNotFound,
                _ => Availability::NoData,
            };
            return CharacterStatusRecord::degraded(
                &self.character,
                availability,
                self.last_error.clone(),
            );
        };

        let last_update = self
            .time_since_last_update()
            .map(relative_age)
            .unwrap_or_else(|| "Never updated".to_string());

        CharacterStatusRecord::from_sample(
            &self.character,
            sample,
            self.is_running(),
            last_update,
            self.last_error.clone(),
        )
    }

    /// Reads, then summarizes. What pollers call once per cycle.
    pub fn refresh(&mut self) -> CharacterStatusRecord {
        self.read();
        self.status_summary()
    }

    /// Outbound command placeholder: logs and reports the command as queued.
    pub fn send_command(&self, command: &str) -> Result<QueuedCommand> {
        let command = command.trim();
        if command.is_empty() {
            return Err(VitalsError::EmptyCommand);
        }
        tracing::info!(character = %self.character, command = %command, "Queued command");
        Ok(QueuedCommand {
            status: QUEUED_STATUS.to_string(),
            command: command.to_string(),
        })
    }
}

fn without_timestamp(record: &Value) -> Value {
    let mut record = record.clone();
    if let Some(object) = record.as_object_mut() {
        object.remove("timestamp");
    }
    record
}
