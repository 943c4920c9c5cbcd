//! Best-effort repair of near-JSON text written by the telemetry addon.
//!
//! The addon occasionally emits Lua-flavoured tables: unquoted keys,
//! single-quoted strings, bare word values, trailing commas. [`repair`]
//! rewrites those shapes with four regex passes, in this order:
//!
//! 1. Quote bare object keys
//! 2. Convert single-quoted strings to double-quoted
//! 3. Quote bare identifier values (`true`, `false` and `null` are left alone)
//! 4. Strip trailing commas before `]` / `}`
//!
//! The output is not guaranteed to be valid JSON. [`lenient_parse`] is the
//! bounded decode step: strict parse first, then exactly one repair attempt,
//! and a failure after repair is final for that read.

use std::borrow::Cow;

use regex::Captures;
use serde_json::Value;

use crate::error::{Result, VitalsError};
use crate::patterns::{RE_BARE_KEY, RE_BARE_VALUE, RE_SINGLE_QUOTED, RE_TRAILING_COMMA};

const LOG_PREVIEW_CHARS: usize = 200;

/// Individual rewrite applied by [`repair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStep {
    QuotedKeys,
    ConvertedSingleQuotes,
    QuotedBareValues,
    StrippedTrailingCommas,
}

/// Result of running the repair passes over a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub text: String,
    pub steps: Vec<RepairStep>,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// A successfully decoded document and whether repair was needed to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct LenientParse {
    pub value: Value,
    pub repaired_steps: Vec<RepairStep>,
}

impl LenientParse {
    pub fn was_repaired(&self) -> bool {
        !self.repaired_steps.is_empty()
    }
}

/// Applies the repair passes and returns the rewritten text.
///
/// Never fails: input that no pass matches comes back unchanged.
pub fn repair(text: &str) -> String {
    repair_with_steps(text).text
}

/// Same as [`repair`] but also reports which passes changed the text.
pub fn repair_with_steps(text: &str) -> RepairOutcome {
    let mut steps = Vec::new();

    let quoted_keys = RE_BARE_KEY.replace_all(text, r#"$1 "$2":"#);
    track(&mut steps, text, &quoted_keys, RepairStep::QuotedKeys);

    let double_quoted = RE_SINGLE_QUOTED.replace_all(&quoted_keys, |caps: &Captures| {
        format!("\"{}\"", caps[1].replace("\\'", "'").replace('"', "\\\""))
    });
    track(
        &mut steps,
        &quoted_keys,
        &double_quoted,
        RepairStep::ConvertedSingleQuotes,
    );

    let quoted_values = RE_BARE_VALUE.replace_all(&double_quoted, |caps: &Captures| {
        let word = &caps[1];
        match word {
            "true" | "false" | "null" => format!(": {}{}", word, &caps[2]),
            _ => format!(": \"{}\"{}", word, &caps[2]),
        }
    });
    track(
        &mut steps,
        &double_quoted,
        &quoted_values,
        RepairStep::QuotedBareValues,
    );

    let without_trailing = RE_TRAILING_COMMA.replace_all(&quoted_values, "$1");
    track(
        &mut steps,
        &quoted_values,
        &without_trailing,
        RepairStep::StrippedTrailingCommas,
    );

    let repaired = without_trailing.into_owned();
    if !steps.is_empty() {
        tracing::info!(steps = ?steps, "JSON repair applied");
        tracing::debug!(
            original = %preview(text),
            fixed = %preview(&repaired),
            "JSON repair diff"
        );
    }

    RepairOutcome {
        text: repaired,
        steps,
    }
}

/// Strict parse, then one repair-and-retry.
///
/// The returned error is from the post-repair attempt when repair changed
/// anything, otherwise from the original parse.
pub fn lenient_parse(text: &str) -> Result<LenientParse> {
    let original_err = match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            return Ok(LenientParse {
                value,
                repaired_steps: Vec::new(),
            })
        }
        Err(err) => err,
    };

    let outcome = repair_with_steps(text);
    if !outcome.changed() {
        return Err(VitalsError::Json {
            context: "content is not valid JSON".to_string(),
            source: original_err,
        });
    }

    serde_json::from_str::<Value>(&outcome.text)
        .map(|value| LenientParse {
            value,
            repaired_steps: outcome.steps,
        })
        .map_err(|source| VitalsError::Json {
            context: "content is not valid JSON after repair".to_string(),
            source,
        })
}

fn track(steps: &mut Vec<RepairStep>, before: &str, after: &Cow<'_, str>, step: RepairStep) {
    if let Cow::Owned(owned) = after {
        if owned != before {
            steps.push(step);
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}
