//! Rule sets and language-model responses.
//!
//! Rule extraction is delegated to a collaborator behind [`RuleExtractor`].
//! Whatever it talks to, the raw answer usually needs cleaning before it is
//! JSON: smart quotes, markdown fences, trailing commas and chatter after
//! the closing brace are all common.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::{Error, Result};
use super::ast::Rule;

static FENCE_REGEX: OnceLock<Regex> = OnceLock::new();
static TRAILING_COMMA_REGEX: OnceLock<Regex> = OnceLock::new();

const FENCE_PATTERN: &str = r"```[A-Za-z]*";
const TRAILING_COMMA_PATTERN: &str = r",\s*([}\]])";

/// Turn a model answer into something `serde_json` can read.
///
/// Normalizes curly quotes, drops code fences and trailing commas, then
/// keeps the text from the first `{` up to its matching `}`. Text with no
/// object in it is returned trimmed.
pub fn clean_model_response(raw: &str) -> String {
    let fence = FENCE_REGEX.get_or_init(|| Regex::new(FENCE_PATTERN).expect("fence pattern"));
    let trailing = TRAILING_COMMA_REGEX
        .get_or_init(|| Regex::new(TRAILING_COMMA_PATTERN).expect("trailing comma pattern"));

    let text = raw
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let text = fence.replace_all(&text, "");
    let text = trailing.replace_all(&text, "$1");

    let Some(start) = text.find('{') else {
        return text.trim().to_owned();
    };
    let body = &text[start..];
    match matching_brace(body) {
        Some(end) => body[..=end].to_owned(),
        None => body.trim_end().to_owned(),
    }
}

/// Byte offset of the `}` closing the object that opens at offset 0.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// RuleSet
// ============================================================================

/// The rules a single extraction produced, in the order they were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Accepts `{"rules": [...]}`, a single rule document, or a flat
    /// `{"persona": {...}}` object.
    pub fn parse(doc: &Json) -> Result<Self> {
        if let Some(rules) = doc.get("rules") {
            let list = rules
                .as_array()
                .ok_or_else(|| Error::rule_format("`rules` must be a list", doc))?;
            if list.is_empty() {
                return Err(Error::rule_format("`rules` is empty", doc));
            }
            let rules = list.iter().map(Rule::from_json).collect::<Result<Vec<_>>>()?;
            return Ok(Self { rules });
        }
        if doc.get("conditions").is_some() {
            return Ok(Self { rules: vec![Rule::from_json(doc)?] });
        }
        if doc.get("persona").is_some() {
            return Ok(Self { rules: vec![Rule::from_persona(doc)?] });
        }
        Err(Error::rule_format("expected `rules`, `conditions` or `persona`", doc))
    }

    /// Clean and parse a raw model answer.
    pub fn from_model_response(raw: &str) -> Result<Self> {
        let cleaned = clean_model_response(raw);
        debug!(raw_len = raw.len(), cleaned_len = cleaned.len(), "cleaned model response");

        let doc: Json = serde_json::from_str(&cleaned).map_err(|e| {
            warn!(error = %e, "model response is not valid JSON");
            Error::Extraction { message: e.to_string(), raw: raw.to_owned() }
        })?;
        Self::parse(&doc).map_err(|e| Error::Extraction { message: e.to_string(), raw: raw.to_owned() })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Look a rule up by its name.
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name.as_deref() == Some(name))
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Turns a natural-language audience description into rules.
#[async_trait]
pub trait RuleExtractor: Send + Sync {
    async fn extract(&self, prompt: &str) -> Result<RuleSet>;
}
