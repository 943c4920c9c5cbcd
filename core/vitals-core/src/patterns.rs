//! Compiled regex patterns for lenient JSON repair and command parsing.
//!
//! These patterns are compiled once on first use and reused throughout
//! the application. Update these when the addon's output quirks or the
//! command conventions change.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// JSON Repair Regexes
// ═══════════════════════════════════════════════════════════════════════════════

/// `{key: ...` or `, key: ...` with an unquoted identifier key.
pub static RE_BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,])\s*([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap());

/// A single-quoted string segment, honoring backslash escapes.
pub static RE_SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'((?:[^'\\\n]|\\.)*)'").unwrap());

/// `: word,` or `: word}` where the value is a bare identifier.
pub static RE_BARE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*([A-Za-z_][A-Za-z0-9_]*)\s*([,}])").unwrap());

/// A comma directly before a closing bracket or brace.
pub static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([\]}])").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Command Regexes
// ═══════════════════════════════════════════════════════════════════════════════

/// Free-text commands that ask for the character's status.
pub static RE_STATUS_INTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)status|health|check|vitals").unwrap());

/// `... for <Name> ...` in a routed instruction.
pub static RE_INSTRUCTION_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfor\s+(\w+)").unwrap());
