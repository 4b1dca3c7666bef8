//! Recovers bare SQL from a model completion that may be wrapped in a
//! markdown code fence.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

const FENCE: &str = "```";

/// Opening fence: backticks, an optional info tag, then the rest of the text.
static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A```([A-Za-z0-9_+-]*)[ \t]*(.*)\z").expect("valid fence regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("completion contained no SQL")]
    Empty,
    #[error("completion is fenced as '{0}', not SQL")]
    UnrecognizedFence(String),
    #[error("completion contains nested code fences")]
    NestedFence,
}

/// The fence variants a completion may open with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fence {
    Bare,
    Sql,
}

impl Fence {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "" => Some(Fence::Bare),
            "sql" | "sqlite" | "duckdb" | "postgresql" | "postgres" | "pgsql" | "mysql" => {
                Some(Fence::Sql)
            }
            _ => None,
        }
    }
}

/// Strips a leading recognized fence and its closing fence.
///
/// Text that does not start with a fence is returned trimmed and otherwise
/// unchanged, so applying this twice gives the same result as applying it once.
pub fn sanitize_completion(raw: &str) -> Result<String, SanitizeError> {
    let text = raw.trim();

    if !text.starts_with(FENCE) {
        if text.is_empty() {
            return Err(SanitizeError::Empty);
        }
        return Ok(text.to_string());
    }

    let captures = OPENING_FENCE.captures(text).ok_or(SanitizeError::Empty)?;
    let tag = captures.get(1).map_or("", |m| m.as_str());
    let fence = Fence::from_tag(tag).ok_or_else(|| SanitizeError::UnrecognizedFence(tag.to_string()))?;
    let body = captures.get(2).map_or("", |m| m.as_str()).trim();

    let body = body.strip_suffix(FENCE).unwrap_or(body).trim();

    if body.starts_with(FENCE) {
        return Err(SanitizeError::NestedFence);
    }
    if body.is_empty() {
        return Err(SanitizeError::Empty);
    }

    debug!(?fence, "Stripped code fence from completion");
    Ok(body.to_string())
}
