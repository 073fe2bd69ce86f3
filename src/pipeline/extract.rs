//! Extraction: recover the `{"Matriz": [...]}` object from a model completion.
//!
//! Models are asked for a single JSON object, but what comes back is free
//! text: sometimes pure JSON, sometimes JSON inside a ```` ```json ```` fence
//! with a friendly paragraph around it, sometimes JSON dropped into prose
//! without any fence at all.
//!
//! ## Strategy chain
//!
//! Three strategies run in decreasing order of confidence. The first one
//! that matches wins and the others never run; a match that later fails to
//! parse is an error, not a cue to try the next strategy.
//!
//! 1. **Fenced block** — a ```` ```json ```` fence wrapping one `{...}` object
//! 2. **Whole response** — the entire completion is valid JSON
//! 3. **Matriz pattern** — a literal `{"Matriz": [ ... ]}` anywhere in the text
//!
//! Each strategy is a pure `&str → Option<&str>` function listed in
//! [`STRATEGIES`], so each can be tested on its own and the dispatcher
//! stays a single loop.
//!
//! ## Validation
//!
//! Whatever matched must parse as JSON, be an object, carry `Matriz`, and
//! `Matriz` must be an array. Nothing is coerced.

use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Required top-level key of the expected model response.
pub const MATRIZ_KEY: &str = "Matriz";

/// Which strategy located the JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FencedBlock,
    WholeResponse,
    MatrizPattern,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrategyKind::FencedBlock => "fenced json block",
            StrategyKind::WholeResponse => "whole response is JSON",
            StrategyKind::MatrizPattern => "Matriz pattern search",
        };
        f.write_str(label)
    }
}

/// One entry of the strategy chain.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub locate: fn(&str) -> Option<&str>,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy").field("kind", &self.kind).finish()
    }
}

/// The strategy chain, in the order it is tried.
pub const STRATEGIES: [Strategy; 3] = [
    Strategy {
        kind: StrategyKind::FencedBlock,
        locate: find_fenced_block,
    },
    Strategy {
        kind: StrategyKind::WholeResponse,
        locate: find_whole_response,
    },
    Strategy {
        kind: StrategyKind::MatrizPattern,
        locate: find_matriz_pattern,
    },
];

/// A candidate located by one of the strategies, not yet parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonMatch<'a> {
    pub strategy: StrategyKind,
    pub text: &'a str,
}

/// A validated model response: an object whose `Matriz` is an array.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    strategy: StrategyKind,
    root: Map<String, Value>,
}

impl ExtractedDocument {
    /// Strategy that located the JSON.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// The `Matriz` elements in model order.
    pub fn matriz(&self) -> &[Value] {
        self.root
            .get(MATRIZ_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn element_count(&self) -> usize {
        self.matriz().len()
    }

    /// The whole parsed object, including any keys besides `Matriz`.
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Run the strategy chain and return the first candidate found.
pub fn locate(raw: &str) -> Option<JsonMatch<'_>> {
    STRATEGIES.iter().find_map(|s| {
        (s.locate)(raw).map(|text| JsonMatch {
            strategy: s.kind,
            text,
        })
    })
}

/// Locate, parse and validate the JSON object in a model completion.
pub fn extract(raw: &str) -> Result<ExtractedDocument, ExtractionError> {
    let found = locate(raw).ok_or(ExtractionError::NoJsonFound)?;
    let value: Value =
        serde_json::from_str(found.text).map_err(|e| ExtractionError::MalformedJson {
            detail: e.to_string(),
        })?;
    let root = validate(value)?;
    Ok(ExtractedDocument {
        strategy: found.strategy,
        root,
    })
}

/// Check the `Matriz` contract on an already parsed value.
pub fn validate(value: Value) -> Result<Map<String, Value>, ExtractionError> {
    let root = match value {
        Value::Object(map) => map,
        _ => return Err(ExtractionError::MissingMatrizKey),
    };
    match root.get(MATRIZ_KEY) {
        None => Err(ExtractionError::MissingMatrizKey),
        Some(Value::Array(_)) => Ok(root),
        Some(_) => Err(ExtractionError::MatrizNotArray),
    }
}

// ── Strategy 1: fenced ```json block ─────────────────────────────────────────

static RE_FENCED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

/// The object inside the first ```` ```json ```` fence, up to the closing fence.
pub fn find_fenced_block(raw: &str) -> Option<&str> {
    RE_FENCED_OBJECT
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ── Strategy 2: the whole response is JSON ───────────────────────────────────

/// The completion itself, when all of it parses as JSON.
///
/// Surrounding whitespace is fine; trailing prose is not. A bare `null`
/// does not count as a match.
pub fn find_whole_response(raw: &str) -> Option<&str> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) | Err(_) => None,
        Ok(_) => Some(raw),
    }
}

// ── Strategy 3: {"Matriz": [...]} anywhere ───────────────────────────────────

static RE_MATRIZ_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\{\s*"Matriz"\s*:\s*\[.*?\]\s*\}"#).unwrap());

/// The first `{"Matriz": [ ... ]}` literal in the text (non-greedy).
pub fn find_matriz_pattern(raw: &str) -> Option<&str> {
    RE_MATRIZ_OBJECT.find(raw).map(|m| m.as_str())
}

// ── Tests ────────────────────────────────────────────────────────────────────
