//! Verdict protocol parser.
//!
//! A solving attempt replies with free text that must contain, in order, a
//! literal `SOLVED:true` or `SOLVED:false` marker and a `JSON:` marker
//! followed by an object with at least `tool` (handler name or the literal
//! `none`) and `answer` fields. The grammar is small and lives entirely
//! here; the controller only ever sees the typed result.

use crate::types::HandlerName;
use serde::Deserialize;

/// A fully parsed verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub solved: bool,
    /// Handler credited with the answer; `None` when the payload said
    /// `"none"` or the attempt failed.
    pub handler: Option<HandlerName>,
    pub answer: String,
}

/// Result of parsing verdict text. `Unparsed` is not an error: the
/// controller treats it as solved=false / handler=none and moves on to the
/// next batch, keeping the raw text for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum VerdictParse {
    Parsed(Verdict),
    Unparsed,
}

#[derive(Deserialize)]
struct VerdictPayload {
    tool: String,
    #[serde(default)]
    answer: String,
}

/// Parse free-form verdict text against the protocol.
///
/// The JSON segment is the substring between the first `{` and the last
/// `}` after the `JSON:` marker. Any missing marker or decode failure
/// yields `Unparsed` rather than an error; malformed verdicts must never
/// crash a resolution.
pub fn parse_verdict(text: &str) -> VerdictParse {
    let solved = if text.contains("SOLVED:true") {
        true
    } else if text.contains("SOLVED:false") {
        false
    } else {
        return VerdictParse::Unparsed;
    };

    let Some(json_at) = text.find("JSON:") else {
        return VerdictParse::Unparsed;
    };
    let tail = &text[json_at + "JSON:".len()..];

    let Some(open) = tail.find('{') else {
        return VerdictParse::Unparsed;
    };
    let Some(close) = tail.rfind('}') else {
        return VerdictParse::Unparsed;
    };
    if close < open {
        return VerdictParse::Unparsed;
    }

    let payload: VerdictPayload = match serde_json::from_str(&tail[open..=close]) {
        Ok(p) => p,
        Err(_) => return VerdictParse::Unparsed,
    };

    let handler = match payload.tool.as_str() {
        "none" | "" => None,
        name => Some(HandlerName::new(name)),
    };

    VerdictParse::Parsed(Verdict {
        solved,
        handler,
        answer: payload.answer,
    })
}
