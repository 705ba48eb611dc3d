//! Lenient parsing of recall judge replies.

use serde::Deserialize;
use std::env;

use crate::error::{AutointerpError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct JudgeVerdict {
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(default)]
    pub reason: String,
}

/// Parse a judge reply, tolerating code fences, raw newlines inside strings, unclosed
/// braces and JSON5 syntax.
pub(crate) fn parse_verdict(raw: &str) -> Result<JudgeVerdict> {
    let payload = extract_json_payload(raw);
    if let Ok(verdict) = serde_json::from_str::<JudgeVerdict>(&payload) {
        return Ok(verdict);
    }

    let sanitized = sanitize_json_strings(&payload);
    if sanitized != payload {
        if let Ok(verdict) = serde_json::from_str::<JudgeVerdict>(&sanitized) {
            return Ok(verdict);
        }
    }

    let value: serde_json::Value = json5::from_str(&sanitized).map_err(|err| {
        debug_log_payload(raw);
        AutointerpError::MalformedResponse {
            detail: err.to_string(),
        }
    })?;
    serde_json::from_value(value).map_err(|err| {
        debug_log_payload(raw);
        AutointerpError::MalformedResponse {
            detail: err.to_string(),
        }
    })
}

fn sanitize_json_strings(payload: &str) -> String {
    let mut result = String::with_capacity(payload.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in payload.chars() {
        if !in_string {
            result.push(ch);
            in_string = ch == '"';
            continue;
        }
        if escape {
            result.push(ch);
            escape = false;
            continue;
        }
        match ch {
            '\\' => {
                result.push(ch);
                escape = true;
            }
            '"' => {
                result.push(ch);
                in_string = false;
            }
            '\n' => result.push_str("\\n"),
            '\r' => {}
            _ => result.push(ch),
        }
    }

    if in_string {
        result.push('"');
    }
    let open = result.matches('{').count();
    let close = result.matches('}').count();
    for _ in close..open {
        result.push('}');
    }
    result
}

fn extract_json_payload(raw: &str) -> String {
    let trimmed = raw.trim();
    strip_code_fence(trimmed).unwrap_or_else(|| trimmed.to_string())
}

fn strip_code_fence(input: &str) -> Option<String> {
    let rest = input.trim().strip_prefix("```")?;
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let rest = rest
        .strip_prefix("json")
        .unwrap_or(rest)
        .trim_start_matches(|c: char| c.is_ascii_whitespace());
    let end = rest.rfind("```").unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

fn debug_log_payload(payload: &str) {
    if debug_enabled() {
        tracing::warn!(payload, "raw judge payload");
    }
}

fn debug_enabled() -> bool {
    matches!(env::var("AUTOINTERP_DEBUG"), Ok(val) if !val.is_empty() && val != "0")
}
