//! `command` and `instruct`: run the command façade once and print its JSON outcome.

use std::sync::Arc;

use serde::Serialize;
use vitals_core::{AgentDirectory, StateStore, SystemClock};

use crate::AppContext;

fn directory(ctx: &AppContext) -> AgentDirectory {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(StateStore::with_options(ctx.config.history_limit, clock.clone()));
    AgentDirectory::from_config(&ctx.config, ctx.storage.data_roots().to_vec(), store, clock)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

pub fn run_command(ctx: &AppContext, character: &str, words: &[String]) -> Result<(), String> {
    let text = words.join(" ");
    let outcome = directory(ctx)
        .dispatch(character, &text)
        .map_err(String::from)?;
    print_json(&outcome)
}

pub fn run_instruction(ctx: &AppContext, words: &[String]) -> Result<(), String> {
    let text = words.join(" ");
    let routed = directory(ctx)
        .route_instruction(&text)
        .map_err(String::from)?;
    print_json(&routed)
}
