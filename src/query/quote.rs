//! Quoting of strings and identifiers for canonical query text

use super::scanner::{is_ident_char, is_ident_first_char};
use super::token::{lookup, Token};

fn escape(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Quote a string literal with single quotes
pub fn quote_string(s: &str) -> String {
    format!("'{}'", escape(s, '\''))
}

/// Quote a dotted identifier, quoting only the segments that need it.
///
/// Empty segments in the middle are left bare so that `db..cpu` keeps its
/// default retention policy slot.
pub fn quote_ident(segments: &[&str]) -> String {
    let last = segments.len().saturating_sub(1);
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let need_quote = ident_needs_quotes(segment)
            || (i < last && !segment.is_empty())
            || ((i == 0 || i == last) && segment.is_empty());

        if need_quote {
            out.push('"');
        }
        out.push_str(&escape(segment, '"'));
        if need_quote {
            out.push('"');
        }
        if i < last {
            out.push('.');
        }
    }
    out
}

/// Whether an identifier must be quoted to scan back as the same identifier
pub fn ident_needs_quotes(ident: &str) -> bool {
    if lookup(ident) != Token::Ident {
        return true;
    }
    for (i, ch) in ident.chars().enumerate() {
        if i == 0 && !is_ident_first_char(ch) {
            return true;
        } else if i > 0 && !is_ident_char(ch) {
            return true;
        }
    }
    false
}
