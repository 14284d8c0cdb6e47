//! Identifier extraction.
//!
//! Finds the free variables a formula refers to without compiling it, so a
//! formula that fails to parse still yields its references. Keywords and
//! sentinel tokens are blanked to `0` first, then the lenient token stream is
//! ordered breadth-first by parenthesis level. A member chain such as
//! `a.b.c` contributes only its root `a`, and a called function name is never
//! reported as a reference.

use std::borrow::Cow;
use std::sync::OnceLock;

use calcgraph_core::{RESERVED_TOKENS, RESERVED_WORDS};
use indexmap::IndexSet;
use regex::Regex;

use crate::lexer::{tokenize_lenient, TokenKind};

static RESERVED_PATTERN: OnceLock<Regex> = OnceLock::new();

fn reserved_pattern() -> &'static Regex {
    RESERVED_PATTERN.get_or_init(|| {
        let words = RESERVED_WORDS.join("|");
        let tokens: Vec<String> = RESERVED_TOKENS
            .iter()
            .map(|token| regex::escape(token.trim_start_matches('#')))
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{words})\b|#(?:{})", tokens.join("|")))
            .expect("valid reserved-token pattern")
    })
}

/// Replaces every keyword and sentinel token in `formula` with `0`.
pub fn strip_reserved(formula: &str) -> Cow<'_, str> {
    reserved_pattern().replace_all(formula, "0")
}

/// Returns the distinct identifiers `formula` references, in discovery order.
///
/// Top-level references come before those nested inside parentheses or call
/// arguments. Never fails: unreadable input is skipped.
pub fn extract_identifiers(formula: &str) -> IndexSet<String> {
    let stripped = strip_reserved(formula);
    let tokens = tokenize_lenient(&stripped);

    // Breadth-first over the parenthesis nesting is the same as a stable
    // sort of the references by nesting level.
    let mut leveled: Vec<(usize, &str)> = Vec::new();
    let mut level = 0usize;
    let mut prev: Option<&TokenKind> = None;
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).map(|t| &t.kind);
        match &token.kind {
            TokenKind::LParen => level += 1,
            // A stray `)` at the top level is ignored.
            TokenKind::RParen => level = level.saturating_sub(1),
            TokenKind::Ident(_) if prev == Some(&TokenKind::Dot) => {}
            TokenKind::Ident(_) if next == Some(&TokenKind::LParen) => {}
            TokenKind::Ident(name) => leveled.push((level, name.as_str())),
            _ => {}
        }
        prev = Some(&token.kind);
    }
    leveled.sort_by_key(|(level, _)| *level);
    leveled.into_iter().map(|(_, name)| name.to_string()).collect()
}

/// Replaces every reference to `id` in `formula` with `replacement`.
///
/// Only whole identifiers in reference position are rewritten: member fields
/// (`x.id`), function names (`id(...)`), string contents and the letters of a
/// sentinel token (`#REF!`) are left alone.
pub fn replace_reference(formula: &str, id: &str, replacement: &str) -> String {
    let tokens = tokenize_lenient(formula);
    let reserved: Vec<std::ops::Range<usize>> = reserved_pattern()
        .find_iter(formula)
        .map(|m| m.range())
        .collect();
    let mut out = String::with_capacity(formula.len());
    let mut copied = 0;
    for (i, token) in tokens.iter().enumerate() {
        let TokenKind::Ident(name) = &token.kind else {
            continue;
        };
        let after_dot = i > 0 && tokens[i - 1].kind == TokenKind::Dot;
        let is_call = tokens.get(i + 1).map(|t| &t.kind) == Some(&TokenKind::LParen);
        let in_reserved = reserved.iter().any(|span| span.contains(&token.offset));
        if name != id || after_dot || is_call || in_reserved {
            continue;
        }
        out.push_str(&formula[copied..token.offset]);
        out.push_str(replacement);
        copied = token.offset + name.len();
    }
    out.push_str(&formula[copied..]);
    out
}
