//! Query Scanner
//!
//! Converts raw query text into a stream of `(Token, Pos, literal)` triples.
//!
//! The scanner is context free except for regex literals: `/` is a division
//! operator unless the parser explicitly asks for a regex with
//! [`BufScanner::scan_regex`].

use std::fmt;

use super::token::{lookup, Token};

/// Zero-based position of a token in the query text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub char: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, char {}", self.line + 1, self.char + 1)
    }
}

/// A scanned token with its position and literal text
pub type Scanned = (Token, Pos, String);

/// Character-level scanner over query text
pub struct Scanner {
    chars: Vec<char>,
    positions: Vec<Pos>,
    idx: usize,
}

impl Scanner {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut positions = Vec::with_capacity(chars.len() + 1);
        let mut pos = Pos::default();
        for &ch in &chars {
            positions.push(pos);
            pos = if ch == '\n' {
                Pos {
                    line: pos.line + 1,
                    char: 0,
                }
            } else {
                Pos {
                    line: pos.line,
                    char: pos.char + 1,
                }
            };
        }
        positions.push(pos);

        Self {
            chars,
            positions,
            idx: 0,
        }
    }

    /// Read the next character. Reading past the end keeps counting so that
    /// every read can be matched by an unread.
    fn read(&mut self) -> Option<char> {
        let ch = self.chars.get(self.idx).copied();
        self.idx += 1;
        ch
    }

    fn unread(&mut self) {
        self.idx = self.idx.saturating_sub(1);
    }

    fn pos_at(&self, idx: usize) -> Pos {
        self.positions[idx.min(self.chars.len())]
    }

    /// Position of the next unread character
    fn next_pos(&self) -> Pos {
        self.pos_at(self.idx)
    }

    /// Position of the most recently read character
    fn curr_pos(&self) -> Pos {
        self.pos_at(self.idx.saturating_sub(1))
    }

    /// Peek at the next character without consuming it
    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    /// Scan the next token
    pub fn scan(&mut self) -> Scanned {
        let pos = self.next_pos();
        let ch = match self.read() {
            Some(ch) => ch,
            None => return (Token::Eof, pos, String::new()),
        };

        if is_whitespace(ch) {
            self.unread();
            return self.scan_whitespace();
        } else if is_letter(ch) || ch == '_' {
            self.unread();
            return self.scan_ident(true);
        } else if is_digit(ch) {
            self.unread();
            return self.scan_number();
        }

        match ch {
            '"' => {
                self.unread();
                self.scan_ident(true)
            }
            '\'' => {
                self.unread();
                self.scan_string()
            }
            '.' => {
                if self.peek().map_or(false, is_digit) {
                    self.unread();
                    return self.scan_number();
                }
                (Token::Dot, pos, String::new())
            }
            '$' => {
                let (tok, _, lit) = self.scan_ident(false);
                if tok != Token::Ident {
                    return (tok, pos, format!("${}", lit));
                }
                (Token::BoundParam, pos, format!("${}", lit))
            }
            '+' => (Token::Add, pos, String::new()),
            '-' => {
                if self.read() == Some('-') {
                    self.skip_until_newline();
                    return (Token::Comment, pos, String::new());
                }
                self.unread();
                (Token::Sub, pos, String::new())
            }
            '*' => (Token::Mul, pos, String::new()),
            '/' => {
                if self.read() == Some('*') {
                    if !self.skip_until_end_comment() {
                        return (Token::Illegal, pos, String::new());
                    }
                    return (Token::Comment, pos, String::new());
                }
                self.unread();
                (Token::Div, pos, String::new())
            }
            '%' => (Token::Mod, pos, String::new()),
            '&' => (Token::BitwiseAnd, pos, String::new()),
            '|' => (Token::BitwiseOr, pos, String::new()),
            '^' => (Token::BitwiseXor, pos, String::new()),
            '=' => {
                if self.read() == Some('~') {
                    return (Token::EqRegex, pos, String::new());
                }
                self.unread();
                (Token::Eq, pos, String::new())
            }
            '!' => match self.read() {
                Some('=') => (Token::Neq, pos, String::new()),
                Some('~') => (Token::NeqRegex, pos, String::new()),
                _ => {
                    self.unread();
                    (Token::Illegal, pos, ch.to_string())
                }
            },
            '>' => {
                if self.read() == Some('=') {
                    return (Token::Gte, pos, String::new());
                }
                self.unread();
                (Token::Gt, pos, String::new())
            }
            '<' => match self.read() {
                Some('=') => (Token::Lte, pos, String::new()),
                Some('>') => (Token::Neq, pos, String::new()),
                _ => {
                    self.unread();
                    (Token::Lt, pos, String::new())
                }
            },
            '(' => (Token::LParen, pos, String::new()),
            ')' => (Token::RParen, pos, String::new()),
            ',' => (Token::Comma, pos, String::new()),
            ';' => (Token::Semicolon, pos, String::new()),
            ':' => {
                if self.read() == Some(':') {
                    return (Token::DoubleColon, pos, String::new());
                }
                self.unread();
                (Token::Colon, pos, String::new())
            }
            _ => (Token::Illegal, pos, ch.to_string()),
        }
    }

    /// Scan a `/.../` regex literal. `\/` is unescaped, other escapes pass through.
    pub fn scan_regex(&mut self) -> Scanned {
        let pos = self.next_pos();

        if self.read() != Some('/') {
            return (Token::BadRegex, pos, String::new());
        }

        let mut buf = String::new();
        loop {
            match self.read() {
                None => return (Token::BadRegex, pos, String::new()),
                Some('/') => return (Token::Regex, pos, buf),
                Some('\\') => match self.read() {
                    None => return (Token::BadRegex, pos, String::new()),
                    Some('/') => buf.push('/'),
                    Some(_) => {
                        self.unread();
                        buf.push('\\');
                    }
                },
                Some(ch) => buf.push(ch),
            }
        }
    }

    fn scan_whitespace(&mut self) -> Scanned {
        let pos = self.next_pos();
        let mut buf = String::new();
        while let Some(ch) = self.read() {
            if !is_whitespace(ch) {
                self.unread();
                break;
            }
            buf.push(ch);
        }
        if self.idx > self.chars.len() {
            self.unread();
        }
        (Token::Ws, pos, buf)
    }

    fn skip_until_newline(&mut self) {
        while let Some(ch) = self.read() {
            if ch == '\n' {
                return;
            }
        }
        self.unread();
    }

    fn skip_until_end_comment(&mut self) -> bool {
        loop {
            match self.read() {
                None => return false,
                Some('*') => match self.read() {
                    Some('/') => return true,
                    None => return false,
                    Some(_) => self.unread(),
                },
                Some(_) => {}
            }
        }
    }

    fn scan_ident(&mut self, lookup_keyword: bool) -> Scanned {
        let pos = self.next_pos();
        let mut buf = String::new();

        loop {
            match self.read() {
                None => {
                    self.unread();
                    break;
                }
                Some('"') => {
                    self.unread();
                    let (tok, str_pos, lit) = self.scan_string();
                    if tok == Token::BadString || tok == Token::BadEscape {
                        return (tok, str_pos, lit);
                    }
                    return (Token::Ident, pos, lit);
                }
                Some(ch) if is_ident_char(ch) => buf.push(ch),
                Some(_) => {
                    self.unread();
                    break;
                }
            }
        }

        if lookup_keyword {
            let tok = lookup(&buf);
            if tok != Token::Ident {
                return (tok, pos, String::new());
            }
        }
        (Token::Ident, pos, buf)
    }

    /// Scan a quoted string. The next character must be the opening quote,
    /// which is also the closing delimiter.
    fn scan_string(&mut self) -> Scanned {
        let pos = self.next_pos();
        let ending = self.read();
        let mut buf = String::new();

        loop {
            match self.read() {
                ch if ch == ending => return (Token::String, pos, buf),
                None => {
                    self.unread();
                    return (Token::BadString, pos, buf);
                }
                Some('\n') => return (Token::BadString, pos, buf),
                Some('\\') => match self.read() {
                    Some('n') => buf.push('\n'),
                    Some('\\') => buf.push('\\'),
                    Some('"') => buf.push('"'),
                    Some('\'') => buf.push('\''),
                    other => {
                        let lit = match other {
                            Some(ch) => format!("\\{}", ch),
                            None => {
                                self.unread();
                                "\\".to_string()
                            }
                        };
                        return (Token::BadEscape, self.curr_pos(), lit);
                    }
                },
                Some(ch) => buf.push(ch),
            }
        }
    }

    fn scan_number(&mut self) -> Scanned {
        let pos = self.next_pos();
        let mut buf = String::new();

        buf.push_str(&self.scan_digits());

        let mut is_decimal = false;
        if self.read() == Some('.') {
            is_decimal = true;
            match self.read() {
                Some(ch) if is_digit(ch) => {
                    buf.push('.');
                    buf.push(ch);
                    buf.push_str(&self.scan_digits());
                }
                _ => self.unread(),
            }
        } else {
            self.unread();
        }

        if is_decimal {
            return (Token::Number, pos, buf);
        }

        match self.read() {
            Some(ch) if is_letter(ch) || ch == 'µ' => {
                buf.push(ch);
                loop {
                    match self.read() {
                        Some(ch) if is_letter(ch) || ch == 'µ' || is_digit(ch) => buf.push(ch),
                        _ => {
                            self.unread();
                            break;
                        }
                    }
                }
                (Token::DurationVal, pos, buf)
            }
            _ => {
                self.unread();
                (Token::Integer, pos, buf)
            }
        }
    }

    fn scan_digits(&mut self) -> String {
        let mut buf = String::new();
        loop {
            match self.read() {
                Some(ch) if is_digit(ch) => buf.push(ch),
                _ => {
                    self.unread();
                    return buf;
                }
            }
        }
    }
}

/// Scanner with a small ring buffer of already-scanned tokens so the parser
/// can push tokens back.
pub struct BufScanner {
    scanner: Scanner,
    buf: [Scanned; 3],
    i: usize,
    n: usize,
}

impl BufScanner {
    pub fn new(input: &str) -> Self {
        let empty = || (Token::Illegal, Pos::default(), String::new());
        Self {
            scanner: Scanner::new(input),
            buf: [empty(), empty(), empty()],
            i: 0,
            n: 0,
        }
    }

    /// Next token, taken from the pushback buffer first
    pub fn scan(&mut self) -> Scanned {
        if self.n > 0 {
            self.n -= 1;
            return self.curr();
        }
        self.i = (self.i + 1) % self.buf.len();
        self.buf[self.i] = self.scanner.scan();
        self.curr()
    }

    /// Next token scanned as a regex literal
    pub fn scan_regex(&mut self) -> Scanned {
        if self.n > 0 {
            self.n -= 1;
            return self.curr();
        }
        self.i = (self.i + 1) % self.buf.len();
        self.buf[self.i] = self.scanner.scan_regex();
        self.curr()
    }

    /// Push the previously scanned token back
    pub fn unscan(&mut self) {
        self.n = (self.n + 1).min(self.buf.len());
    }

    /// Peek at the next raw character, bypassing the token buffer
    pub fn peek_char(&self) -> Option<char> {
        self.scanner.peek()
    }

    fn curr(&self) -> Scanned {
        let len = self.buf.len();
        self.buf[(self.i + len - self.n) % len].clone()
    }
}

pub(crate) fn is_whitespace(ch: char) -> bool {
    ch == ' ' || ch == '\t' || ch == '\n'
}

pub(crate) fn is_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic()
}

pub(crate) fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

pub(crate) fn is_ident_char(ch: char) -> bool {
    is_letter(ch) || is_digit(ch) || ch == '_'
}

pub(crate) fn is_ident_first_char(ch: char) -> bool {
    is_letter(ch) || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_one(input: &str) -> (Token, String) {
        let (tok, _, lit) = Scanner::new(input).scan();
        (tok, lit)
    }

    #[test]
    fn test_scan_identifiers() {
        assert_eq!(scan_one("cpu"), (Token::Ident, "cpu".to_string()));
        assert_eq!(scan_one("_x1 "), (Token::Ident, "_x1".to_string()));
        assert_eq!(scan_one("\"my cpu\""), (Token::Ident, "my cpu".to_string()));
        assert_eq!(scan_one("\"a\\\"b\""), (Token::Ident, "a\"b".to_string()));
        assert_eq!(scan_one("\"select\""), (Token::Ident, "select".to_string()));
    }

    #[test]
    fn test_scan_keywords_have_empty_literal() {
        assert_eq!(scan_one("SELECT"), (Token::Select, String::new()));
        assert_eq!(scan_one("from"), (Token::From, String::new()));
        assert_eq!(scan_one("true"), (Token::True, String::new()));
    }

    #[test]
    fn test_scan_numbers() {
        assert_eq!(scan_one("100"), (Token::Integer, "100".to_string()));
        assert_eq!(scan_one("100.5"), (Token::Number, "100.5".to_string()));
        assert_eq!(scan_one(".5"), (Token::Number, ".5".to_string()));
        assert_eq!(scan_one("10s"), (Token::DurationVal, "10s".to_string()));
        assert_eq!(scan_one("1h30m"), (Token::DurationVal, "1h30m".to_string()));
        assert_eq!(scan_one("5µs"), (Token::DurationVal, "5µs".to_string()));
        assert_eq!(scan_one("."), (Token::Dot, String::new()));
    }

    #[test]
    fn test_scan_strings() {
        assert_eq!(scan_one("'foo'"), (Token::String, "foo".to_string()));
        assert_eq!(scan_one("'it\\'s'"), (Token::String, "it's".to_string()));
        assert_eq!(scan_one("'a\\nb'"), (Token::String, "a\nb".to_string()));
        assert_eq!(scan_one("'unterminated"), (Token::BadString, "unterminated".to_string()));
        assert_eq!(scan_one("'bad\\q'"), (Token::BadEscape, "\\q".to_string()));
    }

    #[test]
    fn test_scan_operators() {
        let cases = [
            ("+", Token::Add),
            ("-", Token::Sub),
            ("*", Token::Mul),
            ("/", Token::Div),
            ("%", Token::Mod),
            ("&", Token::BitwiseAnd),
            ("|", Token::BitwiseOr),
            ("^", Token::BitwiseXor),
            ("=", Token::Eq),
            ("=~", Token::EqRegex),
            ("!=", Token::Neq),
            ("!~", Token::NeqRegex),
            ("<>", Token::Neq),
            ("<", Token::Lt),
            ("<=", Token::Lte),
            (">", Token::Gt),
            (">=", Token::Gte),
            ("::", Token::DoubleColon),
            (":", Token::Colon),
            (";", Token::Semicolon),
        ];
        for (input, expected) in cases {
            assert_eq!(scan_one(input).0, expected, "input {:?}", input);
        }
        assert_eq!(scan_one("!").0, Token::Illegal);
        assert_eq!(scan_one("#").0, Token::Illegal);
    }

    #[test]
    fn test_scan_comments() {
        let mut s = Scanner::new("-- comment\nSELECT");
        assert_eq!(s.scan().0, Token::Comment);
        assert_eq!(s.scan().0, Token::Select);

        let mut s = Scanner::new("/* block */x");
        assert_eq!(s.scan().0, Token::Comment);
        assert_eq!(s.scan().0, Token::Ident);

        assert_eq!(scan_one("/* never closed").0, Token::Illegal);
    }

    #[test]
    fn test_scan_bound_parameter() {
        assert_eq!(scan_one("$host"), (Token::BoundParam, "$host".to_string()));
        assert_eq!(scan_one("$\"my host\""), (Token::BoundParam, "$my host".to_string()));
        assert_eq!(scan_one("$ "), (Token::BoundParam, "$".to_string()));
    }

    #[test]
    fn test_scan_positions() {
        let mut s = Scanner::new("SELECT\n  value");
        let (_, pos, _) = s.scan();
        assert_eq!(pos, Pos { line: 0, char: 0 });
        let (tok, _, _) = s.scan();
        assert_eq!(tok, Token::Ws);
        let (_, pos, lit) = s.scan();
        assert_eq!(lit, "value");
        assert_eq!(pos, Pos { line: 1, char: 2 });
        let (tok, _, _) = s.scan();
        assert_eq!(tok, Token::Eof);
    }

    #[test]
    fn test_scan_regex() {
        let mut s = Scanner::new("/^cpu\\/[0-9]+$/");
        assert_eq!(s.scan_regex(), (Token::Regex, Pos::default(), "^cpu/[0-9]+$".to_string()));

        let mut s = Scanner::new("/\\d+/");
        assert_eq!(s.scan_regex().2, "\\d+");

        let mut s = Scanner::new("/unterminated");
        assert_eq!(s.scan_regex().0, Token::BadRegex);
    }

    #[test]
    fn test_buf_scanner_unscan_twice() {
        let mut s = BufScanner::new("a b");
        assert_eq!(s.scan().2, "a");
        assert_eq!(s.scan().0, Token::Ws);
        s.unscan();
        s.unscan();
        assert_eq!(s.scan().2, "a");
        assert_eq!(s.scan().0, Token::Ws);
        assert_eq!(s.scan().2, "b");
        assert_eq!(s.scan().0, Token::Eof);
    }
}
