/*!
 * Numbered-line request/response protocol.
 *
 * Every batch is sent to the backend as a numbered list, one `[n] text` block per
 * subtitle line, where `n` is the 1-based position inside the batch. The backend
 * is expected to answer in the same format; the parser below recovers as many
 * `position -> translation` pairs as it can from whatever came back.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

// Positions are ASCII digits only; `\d` would also accept other Unicode digit
// scripts that `usize::from_str` rejects.

/// `[12]` at the start of a primary-format block
static BRACKETED_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([0-9]+)\]").expect("bracketed number regex is valid")
});

/// `12.`, `12:`, `[12] ` ... header of a fallback-format block
static LOOSE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[?([0-9]+)\]?[:.\s]+").expect("loose header regex is valid")
});

/// A newline followed by a loose header; terminates a fallback-format block
static LOOSE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n\[?[0-9]+\]?[:.\s]+").expect("loose boundary regex is valid")
});

/// Ordered texts of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Subtitle texts in batch order
    pub texts: Vec<String>,
}

impl BatchRequest {
    /// Create a request from ordered texts
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }

    /// Number of lines in the batch
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Render the numbered payload: `"[1] first\n\n[2] second\n\n"`
    pub fn payload(&self) -> String {
        build_numbered_payload(&self.texts)
    }
}

/// Render texts as a numbered list using 1-based batch positions
pub fn build_numbered_payload<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[{}] {}\n\n", i + 1, text.as_ref()))
        .collect()
}

/// Outcome of parsing one backend response
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Translations keyed by 1-based batch position
    pub translations: HashMap<usize, String>,

    /// Number tokens that could not be read as a position
    pub malformed_tokens: Vec<String>,
}

impl ParsedResponse {
    /// Number of positions that received a translation
    pub fn len(&self) -> usize {
        self.translations.len()
    }

    /// Whether nothing usable was found
    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }
}

/// Parse a numbered response, trying the bracketed format first and the loose one second
pub fn parse_numbered_response(response: &str) -> ParsedResponse {
    let mut pairs = split_bracketed(response);
    if pairs.is_empty() {
        pairs = split_loose(response);
    }

    let mut parsed = ParsedResponse::default();
    for (token, text) in pairs {
        match token.parse::<usize>() {
            Ok(position) => {
                parsed.translations.insert(position, text.trim().to_string());
            }
            Err(_) => parsed.malformed_tokens.push(token.to_string()),
        }
    }
    parsed
}

/// `[n]text` blocks; each block runs until the next newline that is followed by `[`
fn split_bracketed(response: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut pos = 0;

    while let Some(caps) = BRACKETED_NUMBER.captures_at(response, pos) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let body_start = whole.end();
        let body_end = response[body_start..]
            .find("\n[")
            .map(|offset| body_start + offset)
            .unwrap_or(response.len());

        pairs.push((number.as_str(), &response[body_start..body_end]));
        pos = body_end;
    }

    pairs
}

/// `n.` / `n:` / `[n]` blocks; each block runs until the next line starting with such a header
fn split_loose(response: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut pos = 0;

    while let Some(caps) = LOOSE_HEADER.captures_at(response, pos) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let body_start = whole.end();
        let body_end = LOOSE_BOUNDARY
            .find_at(response, body_start)
            .map(|m| m.start())
            .unwrap_or(response.len());

        pairs.push((number.as_str(), &response[body_start..body_end]));
        pos = body_end;
    }

    pairs
}
