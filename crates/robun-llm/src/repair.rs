//! JSON repair for model output. Raw strings from LLMs are routinely not
//! RFC-compliant: fenced in markdown, trailing commas, single quotes.
//! Tool arguments parse *lenient first, strict second, empty object last*;
//! consolidation output parses strict first with a lenient retry.

use serde_json::Value;

/// Parse LLM-emitted tool arguments. Never fails: falls back to `{}`.
pub fn parse_tool_arguments(raw: &str) -> Value {
    if let Some(value) = loose_parse(raw) {
        return value;
    }
    if let Ok(value) = serde_json::from_str(raw) {
        return value;
    }
    Value::Object(serde_json::Map::new())
}

/// Best-effort repair parse: strips fences, trims to the outermost braces,
/// removes trailing commas, and retries with single quotes promoted to
/// double quotes. Returns `None` when nothing parseable remains.
pub fn loose_parse(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }

    // Trim to the outermost object/array in case the model wrapped the
    // JSON in prose.
    let trimmed = outermost_json(cleaned).unwrap_or(cleaned);
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let no_trailing = remove_trailing_commas(trimmed);
    if let Ok(value) = serde_json::from_str(&no_trailing) {
        return Some(value);
    }

    // Last resort: single-quoted JSON (only when no double quotes exist,
    // so we don't corrupt legitimate apostrophes inside strings).
    if !no_trailing.contains('"') && no_trailing.contains('\'') {
        let requoted = no_trailing.replace('\'', "\"");
        if let Ok(value) = serde_json::from_str(&requoted) {
            return Some(value);
        }
    }

    None
}

/// Strip a markdown code fence (``` or ```json) wrapping the payload.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let after_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed,
    };
    match after_open.rfind("```") {
        Some(idx) => after_open[..idx].trim(),
        None => after_open.trim(),
    }
}

fn outermost_json(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let open = s.as_bytes()[start];
    let close = if open == b'{' { '}' } else { ']' };
    let end = s.rfind(close)?;
    if end > start {
        Some(&s[start..=end])
    } else {
        None
    }
}

/// Remove commas immediately preceding a closing brace/bracket, outside of
/// string literals.
fn remove_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '}' | ']' => {
                loop {
                    let trimmed_len = out.trim_end_matches(char::is_whitespace).len();
                    if out[..trimmed_len].ends_with(',') {
                        out.truncate(trimmed_len - 1);
                    } else {
                        out.truncate(trimmed_len);
                        break;
                    }
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
