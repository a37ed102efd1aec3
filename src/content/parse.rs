use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON object in response")]
    NoObject,
    #[error("invalid JSON object: {0}")]
    Invalid(String),
}

/// Reads a typed object out of free-form model output. The whole text is
/// tried first (fences removed), then the first balanced `{...}` span.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let cleaned = strip_markdown_fence(text);
    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return Ok(value);
    }
    let candidate = first_balanced_object(&cleaned).ok_or(ParseError::NoObject)?;
    serde_json::from_str(candidate).map_err(|err| ParseError::Invalid(err.to_string()))
}

fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

// Braces inside string literals do not count toward depth.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
