//! Dashboard presentation adapter.
//!
//! Pulls from the readers and the [`StateStore`] once per cycle and produces
//! a [`DashboardFrame`]: plain data that any renderer (terminal, GUI, JSON)
//! can draw. The adapter owns the decision to redraw; the store only raises
//! its pending-update flag.
//!
//! Each cycle:
//!
//! 1. refresh every reader (failures become degraded rows)
//! 2. drain pending updates and merge them into the display cache
//! 3. build rows, preferring vitals from the store's `character:<name>` entry

mod poller;

pub use poller::{DashboardPoller, DashboardPollerHandle, RefreshTrigger, DASHBOARD_THREAD_NAME};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::clock::Clock;
use crate::config::VitalsConfig;
use crate::reader::HealthReader;
use crate::state::{character_key, StateStore};
use crate::types::{percent, CharacterSample, CharacterStatusRecord};

const BAR_WIDTH: usize = 20;

pub const NO_CHARACTERS_NOTICE: &str =
    "No characters configured. Add names to `characters` in config.toml.";
pub const ERRORS_NOTICE: &str =
    "Some characters have errors. Check the Error column for details.";

// ═══════════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    Online,
    Stale,
    Offline,
}

impl RowStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RowStatus::Online => "Online",
            RowStatus::Stale => "Stale data",
            RowStatus::Offline => "Offline",
        }
    }
}

/// Bar colors. HP runs red to green, MP light blue to navy, TP is gold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarTone {
    Red,
    Orange,
    Yellow,
    Green,
    LightBlue,
    Teal,
    Blue,
    Navy,
    Gold,
    DarkGold,
}

impl BarTone {
    pub fn hex(&self) -> &'static str {
        match self {
            BarTone::Red => "#FF4136",
            BarTone::Orange => "#FF851B",
            BarTone::Yellow => "#FFDC00",
            BarTone::Green => "#2ECC40",
            BarTone::LightBlue => "#7FDBFF",
            BarTone::Teal => "#39CCCC",
            BarTone::Blue => "#0074D9",
            BarTone::Navy => "#001f3f",
            BarTone::Gold => "#FFD700",
            BarTone::DarkGold => "#DAA520",
        }
    }

    pub fn for_hp(pct: u32) -> Self {
        match pct {
            0..=24 => BarTone::Red,
            25..=49 => BarTone::Orange,
            50..=74 => BarTone::Yellow,
            _ => BarTone::Green,
        }
    }

    pub fn for_mp(pct: u32) -> Self {
        match pct {
            0..=24 => BarTone::LightBlue,
            25..=49 => BarTone::Teal,
            50..=74 => BarTone::Blue,
            _ => BarTone::Navy,
        }
    }

    pub fn for_tp(pct: u32) -> Self {
        if pct >= 100 {
            BarTone::Gold
        } else {
            BarTone::DarkGold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub percent: u32,
    pub tone: BarTone,
}

impl Bar {
    fn hp(percent: u32) -> Self {
        Bar {
            percent,
            tone: BarTone::for_hp(percent),
        }
    }

    fn mp(percent: u32) -> Self {
        Bar {
            percent,
            tone: BarTone::for_mp(percent),
        }
    }

    fn tp(percent: u32) -> Self {
        Bar {
            percent,
            tone: BarTone::for_tp(percent),
        }
    }

    fn render(&self) -> String {
        let filled = (self.percent.min(100) as usize * BAR_WIDTH).div_ceil(100);
        format!(
            "[{}{}] {:>3}%",
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            self.percent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    pub name: String,
    pub status: RowStatus,
    pub hp: String,
    pub mp: String,
    pub tp: String,
    pub zone: String,
    pub last_update: String,
    pub error: Option<String>,
    pub hp_bar: Bar,
    pub mp_bar: Bar,
    pub tp_bar: Bar,
    pub record: CharacterStatusRecord,
}

impl DashboardRow {
    pub fn from_record(record: CharacterStatusRecord) -> Self {
        if !record.is_available() {
            return DashboardRow {
                name: record.character.clone(),
                status: RowStatus::Offline,
                hp: "N/A".to_string(),
                mp: "N/A".to_string(),
                tp: "N/A".to_string(),
                zone: "Unknown".to_string(),
                last_update: "Never".to_string(),
                error: record.error.clone(),
                hp_bar: Bar::hp(0),
                mp_bar: Bar::mp(0),
                tp_bar: Bar::tp(0),
                record,
            };
        }

        DashboardRow {
            name: record.display_name().to_string(),
            status: if record.is_running {
                RowStatus::Online
            } else {
                RowStatus::Stale
            },
            hp: record.hp_label(),
            mp: record.mp_label(),
            tp: record.vitals.tp.to_string(),
            zone: record.zone.name.clone(),
            last_update: record.last_update.clone(),
            error: record.error.clone(),
            hp_bar: Bar::hp(record.hp_percent),
            mp_bar: Bar::mp(record.mp_percent),
            tp_bar: Bar::tp(record.tp_percent()),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardFrame {
    pub rows: Vec<DashboardRow>,
    pub notice: Option<String>,
    pub has_errors: bool,
    /// Pending updates merged this cycle.
    pub updates_applied: usize,
    /// Cycles that found pending updates.
    pub update_count: u64,
    pub generated_at: f64,
}

impl fmt::Display for DashboardFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vitals HUD  (updates: {})", self.update_count)?;
        if let Some(notice) = &self.notice {
            writeln!(f, "{}", notice)?;
        }
        for row in &self.rows {
            writeln!(
                f,
                "{:<16} {:<10} HP {:<20} MP {:<20} TP {:<6} {:<24} {}",
                row.name,
                row.status.label(),
                row.hp,
                row.mp,
                row.tp,
                row.zone,
                row.last_update
            )?;
            if row.record.is_available() {
                writeln!(f, "  HP {}", row.hp_bar.render())?;
                writeln!(f, "  MP {}", row.mp_bar.render())?;
                writeln!(f, "  TP {}", row.tp_bar.render())?;
            }
            if let Some(error) = &row.error {
                writeln!(f, "  Error: {}", error)?;
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dashboard
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Dashboard {
    readers: Vec<HealthReader>,
    store: Arc<StateStore>,
    display_cache: HashMap<String, Value>,
    update_count: u64,
}

impl Dashboard {
    pub fn new(store: Arc<StateStore>, readers: Vec<HealthReader>) -> Self {
        Dashboard {
            readers,
            store,
            display_cache: HashMap::new(),
            update_count: 0,
        }
    }

    /// One reader per tracked character, all sharing `store` and `clock`.
    pub fn from_config(
        config: &VitalsConfig,
        data_roots: &[std::path::PathBuf],
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let readers = config
            .tracked_characters()
            .iter()
            .map(|name| {
                HealthReader::with_clock(
                    name,
                    data_roots.to_vec(),
                    Arc::clone(&store),
                    Arc::clone(&clock),
                )
                .with_stale_after(config.stale_after_secs)
            })
            .collect();
        Self::new(store, readers)
    }

    pub fn characters(&self) -> Vec<&str> {
        self.readers.iter().map(HealthReader::character).collect()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn display_cache(&self) -> &HashMap<String, Value> {
        &self.display_cache
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Runs one poll cycle.
    pub fn refresh(&mut self) -> DashboardFrame {
        let records: Vec<CharacterStatusRecord> =
            self.readers.iter_mut().map(HealthReader::refresh).collect();

        let (updates, had_updates) = self.store.drain_pending_updates();
        let updates_applied = updates.len();
        if had_updates {
            self.update_count += 1;
            for (key, update) in updates {
                self.display_cache.insert(key, update.value);
            }
            tracing::debug!(
                applied = updates_applied,
                update_count = self.update_count,
                "Merged pending updates into display cache"
            );
        }

        let rows: Vec<DashboardRow> = records
            .into_iter()
            .map(|record| DashboardRow::from_record(self.with_store_vitals(record)))
            .collect();

        let has_errors = rows.iter().any(|row| row.error.is_some());
        let notice = if rows.is_empty() {
            Some(NO_CHARACTERS_NOTICE.to_string())
        } else if has_errors {
            Some(ERRORS_NOTICE.to_string())
        } else {
            None
        };

        DashboardFrame {
            rows,
            notice,
            has_errors,
            updates_applied,
            update_count: self.update_count,
            generated_at: self.store.now(),
        }
    }

    /// Records a manual refresh in the store, then runs a cycle.
    pub fn force_refresh(&mut self) -> DashboardFrame {
        self.store.force_refresh();
        self.refresh()
    }

    /// Overlays vitals from the store's full record, which may be newer than
    /// the reader's summary when another writer shares the store.
    fn with_store_vitals(&self, mut record: CharacterStatusRecord) -> CharacterStatusRecord {
        if !record.is_available() {
            return record;
        }
        let Some(stored) = self.store.get(&character_key(&record.character)) else {
            return record;
        };
        if stored.get("vitals").and_then(Value::as_object).is_none() {
            return record;
        }
        let vitals = CharacterSample::from_value(&stored).vitals;
        record.hp_percent = percent(vitals.hp, vitals.hp_max);
        record.mp_percent = percent(vitals.mp, vitals.mp_max);
        record.vitals = vitals;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const T0: f64 = 1_700_000_000.0;

    fn dashboard_for(dir: &std::path::Path, names: &[&str], clock: Arc<ManualClock>) -> Dashboard {
        let config = VitalsConfig {
            characters: names.iter().map(|n| n.to_string()).collect(),
            ..VitalsConfig::default()
        };
        let store = Arc::new(StateStore::with_options(100, clock.clone()));
        Dashboard::from_config(&config, &[PathBuf::from(dir)], store, clock)
    }

    #[test]
    fn zero_characters_renders_notice() {
        let temp = tempdir().unwrap();
        let mut dashboard = dashboard_for(temp.path(), &[], Arc::new(ManualClock::new(T0)));
        let frame = dashboard.refresh();
        assert!(frame.rows.is_empty());
        assert_eq!(frame.notice.as_deref(), Some(NO_CHARACTERS_NOTICE));
        assert!(frame.to_string().contains("No characters configured"));
    }

    #[test]
    fn rows_cover_online_stale_and_offline() {
        let temp = tempdir().unwrap();
        fs_err::write(
            temp.path().join("party.json"),
            json!({
                "Alpha": {"vitals": {"hp": 900, "hp_max": 1000, "mp": 10, "mp_max": 100, "tp": 3000},
                          "zone": {"name": "Bastok Markets"}, "timestamp": T0},
                "Beta": {"vitals": {"hp": 100, "hp_max": 1000}, "timestamp": T0 - 60.0},
            })
            .to_string(),
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new(T0 + 1.0));
        let mut dashboard = dashboard_for(temp.path(), &["Alpha", "Beta", "Gamma"], clock);

        let frame = dashboard.refresh();
        let statuses: Vec<_> = frame.rows.iter().map(|row| row.status).collect();
        assert_eq!(
            statuses,
            vec![RowStatus::Online, RowStatus::Stale, RowStatus::Offline]
        );

        let alpha = &frame.rows[0];
        assert_eq!(alpha.hp, "900/1000 (90%)");
        assert_eq!(alpha.zone, "Bastok Markets");
        assert_eq!(alpha.hp_bar.tone, BarTone::Green);
        assert_eq!(alpha.mp_bar.tone, BarTone::LightBlue);
        assert_eq!(alpha.tp_bar.tone, BarTone::Gold);

        let beta = &frame.rows[1];
        assert_eq!(beta.hp_bar.tone, BarTone::Red);

        let gamma = &frame.rows[2];
        assert_eq!(gamma.hp, "N/A");
        assert!(gamma.error.is_some());
        assert!(frame.has_errors);
        assert_eq!(frame.notice.as_deref(), Some(ERRORS_NOTICE));
    }

    #[test]
    fn pending_updates_are_merged_once() {
        let temp = tempdir().unwrap();
        fs_err::write(
            temp.path().join("Alpha_data.json"),
            json!({"Alpha": {"vitals": {"hp": 5, "hp_max": 10}, "timestamp": T0}}).to_string(),
        )
        .unwrap();
        let mut dashboard =
            dashboard_for(temp.path(), &["Alpha"], Arc::new(ManualClock::new(T0)));

        let first = dashboard.refresh();
        assert!(first.updates_applied > 0);
        assert_eq!(first.update_count, 1);
        assert_eq!(dashboard.display_cache().get("Alpha:hp"), Some(&json!(5)));

        let second = dashboard.refresh();
        assert_eq!(second.updates_applied, 0);
        assert_eq!(second.update_count, 1);

        let forced = dashboard.force_refresh();
        assert_eq!(forced.update_count, 2);
        assert!(dashboard
            .display_cache()
            .contains_key(crate::state::MANUAL_REFRESH_KEY));
    }

    #[test]
    fn store_vitals_override_reader_summary() {
        let temp = tempdir().unwrap();
        fs_err::write(
            temp.path().join("Alpha_data.json"),
            json!({"Alpha": {"vitals": {"hp": 5, "hp_max": 10}, "timestamp": T0}}).to_string(),
        )
        .unwrap();
        let mut dashboard =
            dashboard_for(temp.path(), &["Alpha"], Arc::new(ManualClock::new(T0)));
        dashboard.refresh();

        // Another writer updates the store directly; the file is unchanged.
        dashboard.store().set(
            &character_key("Alpha"),
            json!({"vitals": {"hp": 8, "hp_max": 10}}),
        );
        let summary = CharacterStatusRecord::from_sample(
            "Alpha",
            &CharacterSample::from_value(&json!({"vitals": {"hp": 5, "hp_max": 10}})),
            true,
            "0 seconds ago".to_string(),
            None,
        );
        let row = DashboardRow::from_record(dashboard.with_store_vitals(summary));
        assert_eq!(row.hp, "8/10 (80%)");
        assert_eq!(row.hp_bar.tone, BarTone::Green);
    }

    #[test]
    fn bar_tones_follow_thresholds() {
        assert_eq!(BarTone::for_hp(24), BarTone::Red);
        assert_eq!(BarTone::for_hp(25), BarTone::Orange);
        assert_eq!(BarTone::for_hp(74), BarTone::Yellow);
        assert_eq!(BarTone::for_mp(50), BarTone::Blue);
        assert_eq!(BarTone::for_mp(99), BarTone::Navy);
        assert_eq!(BarTone::for_tp(99), BarTone::DarkGold);
        assert_eq!(BarTone::Navy.hex(), "#001f3f");
    }

    #[test]
    fn bar_renders_fixed_width() {
        let bar = Bar::hp(50);
        assert_eq!(bar.render(), format!("[{}{}]  50%", "#".repeat(10), "-".repeat(10)));
    }
}
