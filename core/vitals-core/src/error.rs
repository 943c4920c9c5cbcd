//! Error types for vitals-core operations.
//!
//! The ingestion path never hands these to callers directly: the reader
//! converts them into a retained error string plus the last known record.
//! They surface unchanged from configuration, the command façade, and the
//! maintenance thread lifecycle.

use std::path::PathBuf;

/// All errors that can occur in vitals-core operations.
#[derive(Debug, thiserror::Error)]
pub enum VitalsError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Ingestion Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Health data file not found for {character}")]
    LocationNotFound { character: String },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Character '{character}' not found in data file")]
    CharacterNotFound { character: String },

    #[error("No data found for {character}")]
    EmptyRecord { character: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command text is empty")]
    EmptyCommand,

    #[error("No character specified in instruction")]
    NoCharacterInInstruction,

    // ─────────────────────────────────────────────────────────────────────
    // Thread Lifecycle Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using VitalsError.
pub type Result<T> = std::result::Result<T, VitalsError>;

impl From<VitalsError> for String {
    fn from(err: VitalsError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_not_found_message_names_character() {
        let err = VitalsError::CharacterNotFound {
            character: "Wondolio".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Character 'Wondolio' not found in data file"
        );
    }

    #[test]
    fn json_error_keeps_context() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = VitalsError::Json {
            context: "reading sample".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("JSON parsing error: reading sample"));
        let message: String = err.into();
        assert!(message.contains("reading sample"));
    }
}
