//! Debug utility for checking what the reader sees for each character.
//!
//! Usage: `vitals-check [NAME...]`. Without names, the configured characters are used.

use std::sync::Arc;

use vitals_core::config::{load_config, resolve_config_path, VitalsConfig};
use vitals_core::reader::HealthReader;
use vitals_core::state::StateStore;
use vitals_core::storage::StoragePaths;

fn main() {
    let storage = match StoragePaths::from_home() {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("vitals-check: {}", err);
            std::process::exit(1);
        }
    };
    let config_path = resolve_config_path(None, &storage);
    let config = load_config(&config_path).unwrap_or_else(|err| {
        eprintln!("vitals-check: {} (using defaults)", err);
        VitalsConfig::default()
    });
    let storage = config.apply_to(storage);

    println!("═══════════════════════════════════════════════════════════");
    println!("  Vitals HUD Check - Data File Harness");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    println!("Config file: {}", config_path.display());
    println!("── Data Roots ────────────────────────────────────────────");
    for root in storage.data_roots() {
        let marker = if root.is_dir() { "✓" } else { "✗" };
        println!("  {} {}", marker, root.display());
    }
    println!();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let characters = if args.is_empty() {
        config.tracked_characters()
    } else {
        args
    };
    if characters.is_empty() {
        println!("No characters given and none configured.");
        return;
    }

    let store = Arc::new(StateStore::new());
    println!("── Characters ────────────────────────────────────────────");
    for name in &characters {
        let mut reader = HealthReader::new(name, storage.data_roots().to_vec(), Arc::clone(&store))
            .with_stale_after(config.stale_after_secs);
        let summary = reader.refresh();
        let status = if !summary.is_available() {
            "⚫ NO DATA"
        } else if summary.is_running {
            "🟢 ONLINE"
        } else {
            "🟡 STALE"
        };

        println!("  {} {}", status, reader.character());
        println!("     file:    {} ({:?})", reader.data_file().display(), reader.location().kind);
        println!("     phase:   {:?}", reader.phase());
        if summary.is_available() {
            println!("     jobs:    {}", summary.jobs_label());
            println!("     hp:      {}", summary.hp_label());
            println!("     mp:      {}", summary.mp_label());
            println!("     tp:      {}", summary.vitals.tp);
            println!("     zone:    {}", summary.zone.name);
            println!("     pos:     {}", summary.position_label());
            println!("     target:  {}", summary.target_label());
            println!("     state:   {}", summary.status_label);
            println!("     sampled: {} ({})", summary.timestamp_label(), summary.last_update);
        }
        if let Some(error) = reader.last_error() {
            println!("     error:   {}", error);
        }
        println!();
    }
}
