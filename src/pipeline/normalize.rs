//! Text normalisation: deterministic cleanup of source text.
//!
//! Source files arrive with Windows line endings, zero-width characters
//! pasted from the web, and runs of whitespace that mean nothing to a card.
//! These rules are applied by the input adapters before blocks are built and
//! by the caption extractor before counting characters, so both see the same
//! text.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule only ever sees `\n`.
//! Invisible characters are removed before whitespace is collapsed, otherwise
//! a zero-width space between two spaces would survive as a double space.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a multi-line source file: CRLF → LF, invisible characters removed,
/// trailing whitespace trimmed per line, runs of blank lines collapsed to one.
pub fn clean_source(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    collapse_blank_lines(&s)
}

/// Collapse all whitespace (including newlines) to single spaces and trim.
/// Used for inline text: paragraphs, headings, caption excerpts.
pub fn collapse_whitespace(input: &str) -> String {
    let s = remove_invisible_chars(input);
    RE_WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank lines ─────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
