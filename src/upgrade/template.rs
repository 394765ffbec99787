//! Rewriting of legacy alert messages into label templates.
//!
//! Legacy messages interpolate labels with `${name}`. Unified alerting renders messages
//! with Go-style templates, so `${instance} is down` becomes
//! `{{$labels.instance}} is down` behind a preamble that merges alert and query labels.

use thiserror::Error;
use tracing::debug;

/// Prepended once to templates that look up at least one label.
pub const MERGE_LABELS_PREAMBLE: &str = "{{- $labels := mergeLabelValues $labels $values -}}\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unexpected '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },
    #[error("unexpected whitespace at position {position}")]
    UnexpectedWhitespace { position: usize },
    #[error("empty variable at position {position}")]
    EmptyVariable { position: usize },
    #[error("unterminated variable starting at position {position}")]
    Unterminated { position: usize },
}

/// Splits a template into tokens. Malformed variables degrade to literal text.
pub fn tokenize(template: &str) -> Vec<Token> {
    let (tokens, errors) = tokenize_with_errors(template);
    for err in errors {
        debug!(error = %err, "keeping malformed template variable as literal text");
    }
    tokens
}

/// Like [`tokenize`], also returning the errors of every variable that fell back to text.
pub fn tokenize_with_errors(template: &str) -> (Vec<Token>, Vec<TokenizeError>) {
    let chars: Vec<char> = template.chars().collect();
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if starts_variable(&chars, pos) {
            match scan_variable(&chars, pos) {
                Ok((name, next)) => {
                    tokens.push(Token::Variable(name));
                    pos = next;
                }
                Err((err, stop)) => {
                    errors.push(err);
                    push_literal(&mut tokens, chars[pos..stop].iter().collect());
                    pos = stop;
                }
            }
            continue;
        }

        let end = chars[pos + 1..]
            .iter()
            .position(|&c| c == '$')
            .map_or(chars.len(), |offset| pos + 1 + offset);
        push_literal(&mut tokens, chars[pos..end].iter().collect());
        pos = end;
    }

    (tokens, errors)
}

fn starts_variable(chars: &[char], pos: usize) -> bool {
    chars.get(pos) == Some(&'$') && chars.get(pos + 1) == Some(&'{')
}

/// Scans `${name}` starting at `start`. On failure returns where literal text should stop.
fn scan_variable(chars: &[char], start: usize) -> Result<(String, usize), (TokenizeError, usize)> {
    let mut pos = start + 2;
    loop {
        let Some(&c) = chars.get(pos) else {
            return Err((TokenizeError::Unterminated { position: start }, chars.len()));
        };
        match c {
            '}' => {
                if pos == start + 2 {
                    return Err((TokenizeError::EmptyVariable { position: start }, pos + 1));
                }
                return Ok((chars[start + 2..pos].iter().collect(), pos + 1));
            }
            '$' | '{' => {
                return Err((TokenizeError::UnexpectedChar { found: c, position: pos }, pos));
            }
            c if c.is_whitespace() && c != ' ' => {
                return Err((TokenizeError::UnexpectedWhitespace { position: pos }, pos));
            }
            _ => pos += 1,
        }
    }
}

fn push_literal(tokens: &mut Vec<Token>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Token::Literal(prev)) = tokens.last_mut() {
        prev.push_str(&text);
    } else {
        tokens.push(Token::Literal(text));
    }
}

/// Renders tokens in the new template syntax.
pub fn tokens_to_template(tokens: &[Token]) -> String {
    let mut out = String::new();
    if tokens.iter().any(|t| matches!(t, Token::Variable(_))) {
        out.push_str(MERGE_LABELS_PREAMBLE);
    }
    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(&escape_literal(text)),
            Token::Variable(name) if !is_field_name(name) => {
                out.push_str(&format!("{{{{index $labels {}}}}}", quote(name)));
            }
            Token::Variable(name) => out.push_str(&format!("{{{{$labels.{}}}}}", name)),
        }
    }
    out
}

/// Whether `name` can follow `$labels.` as a template field access.
fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Migrates one legacy message.
pub fn migrate_template(template: &str) -> String {
    tokens_to_template(&tokenize(template))
}

/// Literal text that would otherwise open an action is wrapped so it renders verbatim.
fn escape_literal(text: &str) -> String {
    if !text.contains("{{") && !text.ends_with('{') {
        return text.to_string();
    }
    if text.contains('`') {
        format!("{{{{{}}}}}", quote(text))
    } else {
        format!("{{{{`{}`}}}}", text)
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
