//! Command agent façade.
//!
//! One [`CommandAgent`] per character wraps that character's
//! [`HealthReader`]. Free-text commands are classified by pattern:
//!
//! | Text                                      | Outcome                      |
//! |-------------------------------------------|------------------------------|
//! | mentions status / health / check / vitals | status summary from reader   |
//! | starts with the command prefix (`/`)      | queued via the outbound stub |
//! | anything else                             | logged as simulated          |
//!
//! Nothing here talks to the game. The [`AgentDirectory`] creates agents
//! lazily and routes "... for <Name>" instructions.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::{VitalsConfig, DEFAULT_COMMAND_PREFIX, DEFAULT_STALE_AFTER_SECS};
use crate::error::{Result, VitalsError};
use crate::patterns::{RE_INSTRUCTION_TARGET, RE_STATUS_INTENT};
use crate::reader::{HealthReader, QueuedCommand};
use crate::state::StateStore;
use crate::types::{epoch_to_local, CharacterStatusRecord};

pub const COMMAND_LOG_LIMIT: usize = 100;

const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandDisposition {
    Status,
    Queued,
    Simulated,
}

/// One line of an agent's command log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLogEntry {
    pub timestamp: String,
    pub agent: String,
    pub character: String,
    pub command: String,
    pub status: CommandDisposition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    Status {
        message: String,
        data: Box<CharacterStatusRecord>,
    },
    Queued(QueuedCommand),
    Simulated {
        message: String,
        entry: CommandLogEntry,
    },
}

impl CommandOutcome {
    pub fn disposition(&self) -> CommandDisposition {
        match self {
            CommandOutcome::Status { .. } => CommandDisposition::Status,
            CommandOutcome::Queued(_) => CommandDisposition::Queued,
            CommandOutcome::Simulated { .. } => CommandDisposition::Simulated,
        }
    }
}

/// What [`AgentDirectory::route_instruction`] resolved and ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedOutcome {
    pub character: String,
    pub outcome: CommandOutcome,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CommandAgent
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CommandAgent {
    name: String,
    reader: HealthReader,
    clock: Arc<dyn Clock>,
    command_prefix: String,
    capabilities: Vec<String>,
    log: VecDeque<CommandLogEntry>,
}

impl CommandAgent {
    pub fn new(reader: HealthReader, clock: Arc<dyn Clock>, command_prefix: &str) -> Self {
        let prefix = if command_prefix.is_empty() {
            DEFAULT_COMMAND_PREFIX
        } else {
            command_prefix
        };
        CommandAgent {
            name: format!("Agent-{}", reader.character()),
            reader,
            clock,
            command_prefix: prefix.to_string(),
            capabilities: vec!["basic".to_string()],
            log: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn character(&self) -> &str {
        self.reader.character()
    }

    pub fn reader(&self) -> &HealthReader {
        &self.reader
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns false if the agent already had it.
    pub fn add_capability(&mut self, capability: &str) -> bool {
        if self.capabilities.iter().any(|c| c == capability) {
            return false;
        }
        self.capabilities.push(capability.to_string());
        true
    }

    /// Most recent last.
    pub fn command_log(&self) -> impl Iterator<Item = &CommandLogEntry> {
        self.log.iter()
    }

    pub fn status(&mut self) -> CharacterStatusRecord {
        self.reader.refresh()
    }

    pub fn execute(&mut self, text: &str) -> Result<CommandOutcome> {
        let command = text.trim();
        if command.is_empty() {
            return Err(VitalsError::EmptyCommand);
        }

        let outcome = if RE_STATUS_INTENT.is_match(command) {
            let summary = self.status();
            CommandOutcome::Status {
                message: format!("Health status for {}", self.character()),
                data: Box::new(summary),
            }
        } else if command.starts_with(&self.command_prefix) {
            CommandOutcome::Queued(self.reader.send_command(command)?)
        } else {
            let entry = self.log_entry(command, CommandDisposition::Simulated);
            tracing::info!(
                agent = %entry.agent,
                character = %entry.character,
                command = %entry.command,
                "Simulated command"
            );
            CommandOutcome::Simulated {
                message: format!("Simulated command '{}' for {}", command, self.character()),
                entry,
            }
        };

        let entry = match &outcome {
            CommandOutcome::Simulated { entry, .. } => entry.clone(),
            other => self.log_entry(command, other.disposition()),
        };
        self.record(entry);
        Ok(outcome)
    }

    fn log_entry(&self, command: &str, status: CommandDisposition) -> CommandLogEntry {
        let timestamp = epoch_to_local(self.clock.now())
            .map(|dt| dt.format(LOG_TIME_FORMAT).to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        CommandLogEntry {
            timestamp,
            agent: self.name.clone(),
            character: self.character().to_string(),
            command: command.to_string(),
            status,
        }
    }

    fn record(&mut self, entry: CommandLogEntry) {
        self.log.push_back(entry);
        while self.log.len() > COMMAND_LOG_LIMIT {
            self.log.pop_front();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AgentDirectory
// ═══════════════════════════════════════════════════════════════════════════════

/// Lazily created agents, keyed by lowercased character name.
pub struct AgentDirectory {
    agents: HashMap<String, CommandAgent>,
    data_roots: Vec<PathBuf>,
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    command_prefix: String,
    stale_after: f64,
}

impl AgentDirectory {
    pub fn new(data_roots: Vec<PathBuf>, store: Arc<StateStore>, clock: Arc<dyn Clock>) -> Self {
        AgentDirectory {
            agents: HashMap::new(),
            data_roots,
            store,
            clock,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            stale_after: DEFAULT_STALE_AFTER_SECS,
        }
    }

    pub fn from_config(
        config: &VitalsConfig,
        data_roots: Vec<PathBuf>,
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut directory = Self::new(data_roots, store, clock);
        directory.command_prefix = config.command_prefix.clone();
        directory.stale_after = config.stale_after_secs;
        directory
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Character names with a live agent, sorted.
    pub fn characters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .agents
            .values()
            .map(|agent| agent.character().to_string())
            .collect();
        names.sort();
        names
    }

    /// The agent for `character`, created on first use.
    pub fn agent(&mut self, character: &str) -> &mut CommandAgent {
        let key = character.trim().to_lowercase();
        let Self {
            agents,
            data_roots,
            store,
            clock,
            command_prefix,
            stale_after,
        } = self;
        agents.entry(key).or_insert_with(|| {
            tracing::info!(character = %character, "Creating command agent");
            let reader = HealthReader::with_clock(
                character.trim(),
                data_roots.clone(),
                Arc::clone(store),
                Arc::clone(clock),
            )
            .with_stale_after(*stale_after);
            CommandAgent::new(reader, Arc::clone(clock), command_prefix)
        })
    }

    pub fn dispatch(&mut self, character: &str, text: &str) -> Result<CommandOutcome> {
        self.agent(character).execute(text)
    }

    /// Runs an instruction naming its target as "for <Name>".
    pub fn route_instruction(&mut self, text: &str) -> Result<RoutedOutcome> {
        let character = RE_INSTRUCTION_TARGET
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(VitalsError::NoCharacterInInstruction)?;

        let outcome = self.dispatch(&character, text)?;
        Ok(RoutedOutcome {
            character: self.agent(&character).character().to_string(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::Availability;
    use serde_json::json;
    use tempfile::tempdir;

    const T0: f64 = 1_700_000_000.0;

    fn directory(dir: &std::path::Path) -> AgentDirectory {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(StateStore::with_options(100, clock.clone()));
        AgentDirectory::new(vec![dir.to_path_buf()], store, clock)
    }

    fn write_party(dir: &std::path::Path) {
        fs_err::write(
            dir.join("Wondolio_data.json"),
            json!({"Wondolio": {"vitals": {"hp": 750, "hp_max": 1000}, "timestamp": T0}})
                .to_string(),
        )
        .unwrap();
    }

    #[test]
    fn status_words_return_summary() {
        let temp = tempdir().unwrap();
        write_party(temp.path());
        let mut agents = directory(temp.path());

        for text in ["status", "Check HP please", "VITALS", "how is my health"] {
            let outcome = agents.dispatch("Wondolio", text).unwrap();
            let CommandOutcome::Status { data, message } = outcome else {
                panic!("expected status for {text:?}");
            };
            assert_eq!(message, "Health status for Wondolio");
            assert_eq!(data.availability, Availability::Available);
            assert_eq!(data.hp_percent, 75);
        }
    }

    #[test]
    fn prefixed_text_is_queued() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        let outcome = agents.dispatch("Wondolio", "/ma \"Cure\" <me>").unwrap();
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"kind": "queued", "status": "command_queued", "command": "/ma \"Cure\" <me>"})
        );
    }

    #[test]
    fn status_intent_wins_over_prefix() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        let outcome = agents.dispatch("Wondolio", "/checkparam").unwrap();
        assert_eq!(outcome.disposition(), CommandDisposition::Status);
    }

    #[test]
    fn other_text_is_simulated_and_logged() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        let outcome = agents.dispatch("Wondolio", "follow Sintaroh").unwrap();

        let CommandOutcome::Simulated { message, entry } = outcome else {
            panic!("expected simulated outcome");
        };
        assert_eq!(message, "Simulated command 'follow Sintaroh' for Wondolio");
        assert_eq!(entry.agent, "Agent-Wondolio");
        assert_eq!(entry.character, "Wondolio");
        assert_eq!(entry.status, CommandDisposition::Simulated);
        assert_eq!(entry.timestamp.len(), "2023-11-14 22:13:20".len());

        let agent = agents.agent("wondolio");
        assert_eq!(agent.command_log().count(), 1);
    }

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        assert!(matches!(
            agents.dispatch("Wondolio", "  "),
            Err(VitalsError::EmptyCommand)
        ));
    }

    #[test]
    fn command_log_is_bounded() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        for i in 0..(COMMAND_LOG_LIMIT + 5) {
            agents.dispatch("Wondolio", &format!("wave {i}")).unwrap();
        }
        let agent = agents.agent("Wondolio");
        let log: Vec<_> = agent.command_log().collect();
        assert_eq!(log.len(), COMMAND_LOG_LIMIT);
        assert_eq!(log[0].command, "wave 5");
    }

    #[test]
    fn agents_are_created_once_per_character() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        agents.dispatch("Wondolio", "wave").unwrap();
        agents.dispatch("WONDOLIO", "wave").unwrap();
        agents.dispatch("Sintaroh", "wave").unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents.characters(), vec!["Sintaroh", "Wondolio"]);
        assert_eq!(agents.agent("wondolio").command_log().count(), 2);
    }

    #[test]
    fn instruction_routes_to_named_character() {
        let temp = tempdir().unwrap();
        write_party(temp.path());
        let mut agents = directory(temp.path());

        let routed = agents.route_instruction("check vitals FOR Wondolio").unwrap();
        assert_eq!(routed.character, "Wondolio");
        assert_eq!(routed.outcome.disposition(), CommandDisposition::Status);
    }

    #[test]
    fn instruction_without_character_is_an_error() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        let err = agents.route_instruction("check vitals").unwrap_err();
        assert_eq!(err.to_string(), "No character specified in instruction");
        assert!(agents.is_empty());
    }

    #[test]
    fn capabilities_start_basic() {
        let temp = tempdir().unwrap();
        let mut agents = directory(temp.path());
        let agent = agents.agent("Wondolio");
        assert_eq!(agent.capabilities(), ["basic".to_string()]);
        assert!(agent.add_capability("healing"));
        assert!(!agent.add_capability("healing"));
    }
}
