//! Best-effort cleanup of LaTeX-style markup before keyword matching.
//!
//! Résumés pasted from a LaTeX source hide words behind control sequences
//! (`\textbf{Rust}`), comments and math delimiters. This is not a parser: each
//! pass is a `&str -> String` regex rewrite that only touches markup syntax and
//! leaves the surrounding words intact.

use std::sync::LazyLock;

use regex::Regex;

/// Returns the text with markup noise removed, or the input unchanged when it
/// does not look like markup at all.
pub fn strip_markup(text: &str) -> String {
    if !looks_like_markup(text) {
        return text.to_string();
    }

    let mut result = strip_comments(text);
    result = strip_math_delimiters(&result);
    result = unescape_specials(&result);
    result = strip_control_words(&result);
    result = strip_braces(&result);
    collapse_spaces(&result)
}

/// Markup is assumed when a backslash is directly followed by a letter.
fn looks_like_markup(text: &str) -> bool {
    static CONTROL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\[a-zA-Z]").expect("valid regex"));
    CONTROL_RE.is_match(text)
}

/// Drops `% ...` to end of line, but keeps escaped `\%`.
fn strip_comments(text: &str) -> String {
    static COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)(^|[^\\])%.*$").expect("valid regex"));
    COMMENT_RE.replace_all(text, "$1").into_owned()
}

/// Removes `$`, `\(`, `\)` delimiters; the math content itself stays.
fn strip_math_delimiters(text: &str) -> String {
    static PAREN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\[()]").expect("valid regex"));
    static DOLLAR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(^|[^\\])\$+").expect("valid regex"));

    let without_parens = PAREN_RE.replace_all(text, " ");
    DOLLAR_RE.replace_all(&without_parens, "$1 ").into_owned()
}

/// `\&` → `&`, `\%` → `%`, `\_` → `_`, `\#` → `#`, `\$` → `$`.
fn unescape_specials(text: &str) -> String {
    static ESCAPED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\([&%$#_{}])").expect("valid regex"));
    ESCAPED_RE.replace_all(text, "$1").into_owned()
}

/// Removes `\command`, `\command*` and forced line breaks `\\`.
fn strip_control_words(text: &str) -> String {
    static CONTROL_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\\\|\\[a-zA-Z@]+\*?").expect("valid regex"));
    CONTROL_WORD_RE.replace_all(text, " ").into_owned()
}

fn strip_braces(text: &str) -> String {
    text.replace(['{', '}'], "").replace('~', " ")
}

/// Collapses runs of spaces and tabs, leaving line structure alone.
fn collapse_spaces(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
    SPACES_RE.replace_all(text, " ").into_owned()
}
