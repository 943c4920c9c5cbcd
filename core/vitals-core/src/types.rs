//! Core types shared across all Vitals HUD clients.
//!
//! Two layers live here:
//!
//! - **Samples** ([`CharacterSample`] and its parts): the per-character object
//!   the addon writes. The addon's schema drifts between versions (numbers as
//!   strings, floats for integers, missing sections), so samples are built with
//!   [`CharacterSample::from_value`], which never fails and defaults anything
//!   it cannot read.
//! - **Status records** ([`CharacterStatusRecord`]): the derived, read-only
//!   snapshot handed to dashboards and agents.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nominal TP ceiling used for gauges. TP itself is not clamped.
pub const TP_GAUGE_MAX: i64 = 3000;

// ═══════════════════════════════════════════════════════════════════════════════
// Sample Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub hp: i64,
    pub hp_max: i64,
    pub mp: i64,
    pub mp_max: i64,
    pub tp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: Option<String>,
    pub main_job: Option<String>,
    pub main_job_level: Option<i64>,
    pub sub_job: Option<String>,
    pub sub_job_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub name: String,
}

impl Default for ZoneInfo {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub status: i64,
    pub target_name: Option<String>,
    pub buffs: Vec<String>,
}

/// One character's entry from the addon's data file, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSample {
    pub vitals: Vitals,
    pub player: PlayerInfo,
    pub zone: ZoneInfo,
    pub position: Position,
    pub state: CharacterState,
    /// Epoch seconds reported by the addon. `None` when the file omitted it.
    pub timestamp: Option<f64>,
}

impl CharacterSample {
    /// Builds a sample from the raw JSON object, tolerating any shape.
    pub fn from_value(raw: &Value) -> Self {
        let empty = Map::new();
        let root = raw.as_object().unwrap_or(&empty);

        let vitals = section(root, "vitals", &empty);
        let player = section(root, "player", &empty);
        let zone = section(root, "zone", &empty);
        let position = section(root, "position", &empty);
        let state = section(root, "state", &empty);

        CharacterSample {
            vitals: Vitals {
                hp: int_field(vitals, "hp"),
                hp_max: int_field(vitals, "hp_max"),
                mp: int_field(vitals, "mp"),
                mp_max: int_field(vitals, "mp_max"),
                tp: int_field(vitals, "tp"),
            },
            player: PlayerInfo {
                name: text_field(player, "name"),
                main_job: text_field(player, "main_job"),
                main_job_level: player.get("main_job_level").and_then(lenient_i64),
                sub_job: text_field(player, "sub_job"),
                sub_job_level: player.get("sub_job_level").and_then(lenient_i64),
            },
            zone: ZoneInfo {
                name: text_field(zone, "name").unwrap_or_else(|| "Unknown".to_string()),
            },
            position: Position {
                x: float_field(position, "x"),
                y: float_field(position, "y"),
                z: float_field(position, "z"),
            },
            state: CharacterState {
                status: int_field(state, "status"),
                target_name: text_field(state, "target_name"),
                buffs: state
                    .get("buffs")
                    .and_then(Value::as_array)
                    .map(|buffs| buffs.iter().filter_map(lenient_text).collect())
                    .unwrap_or_default(),
            },
            timestamp: root.get("timestamp").and_then(lenient_f64),
        }
    }

    /// TP as read from the raw record, if the record carried one.
    pub fn raw_tp(raw: &Value) -> Option<i64> {
        raw.get("vitals")
            .and_then(|vitals| vitals.get("tp"))
            .and_then(lenient_i64)
    }
}

fn section<'a>(
    root: &'a Map<String, Value>,
    name: &str,
    empty: &'a Map<String, Value>,
) -> &'a Map<String, Value> {
    root.get(name).and_then(Value::as_object).unwrap_or(empty)
}

fn int_field(map: &Map<String, Value>, key: &str) -> i64 {
    map.get(key).and_then(lenient_i64).unwrap_or(0)
}

fn float_field(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(lenient_f64).unwrap_or(0.0)
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(lenient_text)
}

/// Reads integers written as ints, floats, or numeric strings.
pub fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// Reads floats written as numbers or numeric strings.
pub fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether a status record carries real data or is a degraded placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    NoData,
    CharacterNotFound,
}

impl Availability {
    pub fn label(&self) -> &'static str {
        match self {
            Availability::Available => "Available",
            Availability::NoData => "No data available",
            Availability::CharacterNotFound => "Character not found",
        }
    }
}

/// Derived, read-only snapshot for one character. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterStatusRecord {
    pub character: String,
    pub availability: Availability,
    pub vitals: Vitals,
    pub player: PlayerInfo,
    pub zone: ZoneInfo,
    pub position: Position,
    pub state: CharacterState,
    /// Sample timestamp (epoch seconds) as reported or synthesized.
    pub timestamp: Option<f64>,
    pub hp_percent: u32,
    pub mp_percent: u32,
    pub status_label: String,
    /// Human-relative age of the last accepted sample, e.g. "4 seconds ago".
    pub last_update: String,
    pub is_running: bool,
    pub error: Option<String>,
}

impl CharacterStatusRecord {
    pub fn from_sample(
        character: &str,
        sample: &CharacterSample,
        is_running: bool,
        last_update: String,
        error: Option<String>,
    ) -> Self {
        CharacterStatusRecord {
            character: character.to_string(),
            availability: Availability::Available,
            vitals: sample.vitals.clone(),
            player: sample.player.clone(),
            zone: sample.zone.clone(),
            position: sample.position,
            state: sample.state.clone(),
            timestamp: sample.timestamp,
            hp_percent: percent(sample.vitals.hp, sample.vitals.hp_max),
            mp_percent: percent(sample.vitals.mp, sample.vitals.mp_max),
            status_label: status_label(sample.state.status),
            last_update,
            is_running,
            error,
        }
    }

    /// Placeholder for a character with nothing to show.
    pub fn degraded(character: &str, availability: Availability, error: Option<String>) -> Self {
        CharacterStatusRecord {
            character: character.to_string(),
            availability,
            vitals: Vitals::default(),
            player: PlayerInfo {
                name: None,
                main_job: None,
                main_job_level: None,
                sub_job: None,
                sub_job_level: None,
            },
            zone: ZoneInfo::default(),
            position: Position::default(),
            state: CharacterState::default(),
            timestamp: None,
            hp_percent: 0,
            mp_percent: 0,
            status_label: availability.label().to_string(),
            last_update: "Never".to_string(),
            is_running: false,
            error,
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// Display name: the in-game name when the addon reported one.
    pub fn display_name(&self) -> &str {
        self.player.name.as_deref().unwrap_or(&self.character)
    }

    /// `WAR75/NIN37`, with `??` for unknown parts.
    pub fn jobs_label(&self) -> String {
        let part = |value: &Option<String>| value.clone().unwrap_or_else(|| "??".to_string());
        let level = |value: Option<i64>| value.map_or_else(|| "??".to_string(), |l| l.to_string());
        format!(
            "{}{}/{}{}",
            part(&self.player.main_job),
            level(self.player.main_job_level),
            part(&self.player.sub_job),
            level(self.player.sub_job_level)
        )
    }

    pub fn hp_label(&self) -> String {
        format!(
            "{}/{} ({}%)",
            self.vitals.hp, self.vitals.hp_max, self.hp_percent
        )
    }

    pub fn mp_label(&self) -> String {
        format!(
            "{}/{} ({}%)",
            self.vitals.mp, self.vitals.mp_max, self.mp_percent
        )
    }

    pub fn position_label(&self) -> String {
        format!(
            "X:{:.2}, Y:{:.2}, Z:{:.2}",
            self.position.x, self.position.y, self.position.z
        )
    }

    pub fn target_label(&self) -> &str {
        self.state.target_name.as_deref().unwrap_or("None")
    }

    /// Sample time as `YYYY-MM-DD HH:MM:SS` local time, or "Unknown".
    pub fn timestamp_label(&self) -> String {
        self.timestamp
            .and_then(epoch_to_local)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// TP as a share of [`TP_GAUGE_MAX`], capped at 100.
    pub fn tp_percent(&self) -> u32 {
        tp_percent(self.vitals.tp)
    }
}

/// Rounded percentage, 0 when `max` is not positive.
pub fn percent(value: i64, max: i64) -> u32 {
    if max <= 0 {
        return 0;
    }
    let pct = (value as f64 / max as f64 * 100.0).round();
    pct.max(0.0) as u32
}

pub fn tp_percent(tp: i64) -> u32 {
    (tp.max(0) / 30).min(100) as u32
}

pub fn status_label(code: i64) -> String {
    match code {
        0 => "Idle".to_string(),
        1 => "Engaged".to_string(),
        2 => "Dead".to_string(),
        3 => "Engaged (Dead)".to_string(),
        other => format!("Unknown ({})", other),
    }
}

/// Human-relative age, e.g. "12 seconds ago" or "3 hours ago".
pub fn relative_age(seconds: f64) -> String {
    let secs = seconds.max(0.0);
    if secs < 60.0 {
        format!("{} seconds ago", secs as u64)
    } else if secs < 3600.0 {
        format!("{} minutes ago", (secs / 60.0) as u64)
    } else if secs < 86400.0 {
        format!("{} hours ago", (secs / 3600.0) as u64)
    } else {
        format!("{} days ago", (secs / 86400.0) as u64)
    }
}

pub fn epoch_to_local(epoch: f64) -> Option<DateTime<Local>> {
    if !epoch.is_finite() {
        return None;
    }
    let secs = epoch.floor() as i64;
    let nanos = ((epoch - epoch.floor()) * 1e9) as u32;
    Local.timestamp_opt(secs, nanos).single()
}
