//! Lexical tokens
//!
//! Every terminal symbol of the language: literal classes, operators,
//! punctuation and keywords. Operator precedence lives here so the expression
//! parser can climb it without a grammar rule per level.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    // Special tokens
    Illegal,
    Eof,
    Ws,
    Comment,

    // Literals
    Ident,
    BoundParam,
    Number,
    Integer,
    DurationVal,
    String,
    BadString,
    BadEscape,
    True,
    False,
    Regex,
    BadRegex,

    // Operators
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    And,
    Or,
    Eq,
    Neq,
    EqRegex,
    NeqRegex,
    Lt,
    Lte,
    Gt,
    Gte,

    // Punctuation
    LParen,
    RParen,
    Comma,
    Colon,
    DoubleColon,
    Semicolon,
    Dot,

    // Keywords
    All,
    Alter,
    Analyze,
    Any,
    As,
    Asc,
    Begin,
    By,
    Cardinality,
    Create,
    Continuous,
    Database,
    Databases,
    Default,
    Delete,
    Desc,
    Destinations,
    Diagnostics,
    Distinct,
    Drop,
    Duration,
    End,
    Every,
    Exact,
    Explain,
    Field,
    For,
    From,
    Future,
    Grant,
    Grants,
    Group,
    Groups,
    In,
    Inf,
    Insert,
    Into,
    Key,
    Keys,
    Kill,
    Limit,
    Measurement,
    Measurements,
    Name,
    Offset,
    On,
    Order,
    Password,
    Past,
    Policy,
    Policies,
    Privileges,
    Queries,
    Query,
    Read,
    Replication,
    Resample,
    Retention,
    Revoke,
    Select,
    Series,
    Set,
    Show,
    Shard,
    Shards,
    Slimit,
    Soffset,
    Stats,
    Subscription,
    Subscriptions,
    Tag,
    To,
    User,
    Users,
    Values,
    Verbose,
    Where,
    With,
    Write,
}

const KEYWORDS: &[Token] = &[
    Token::All,
    Token::Alter,
    Token::Analyze,
    Token::Any,
    Token::As,
    Token::Asc,
    Token::Begin,
    Token::By,
    Token::Cardinality,
    Token::Create,
    Token::Continuous,
    Token::Database,
    Token::Databases,
    Token::Default,
    Token::Delete,
    Token::Desc,
    Token::Destinations,
    Token::Diagnostics,
    Token::Distinct,
    Token::Drop,
    Token::Duration,
    Token::End,
    Token::Every,
    Token::Exact,
    Token::Explain,
    Token::Field,
    Token::For,
    Token::From,
    Token::Future,
    Token::Grant,
    Token::Grants,
    Token::Group,
    Token::Groups,
    Token::In,
    Token::Inf,
    Token::Insert,
    Token::Into,
    Token::Key,
    Token::Keys,
    Token::Kill,
    Token::Limit,
    Token::Measurement,
    Token::Measurements,
    Token::Name,
    Token::Offset,
    Token::On,
    Token::Order,
    Token::Password,
    Token::Past,
    Token::Policy,
    Token::Policies,
    Token::Privileges,
    Token::Queries,
    Token::Query,
    Token::Read,
    Token::Replication,
    Token::Resample,
    Token::Retention,
    Token::Revoke,
    Token::Select,
    Token::Series,
    Token::Set,
    Token::Show,
    Token::Shard,
    Token::Shards,
    Token::Slimit,
    Token::Soffset,
    Token::Stats,
    Token::Subscription,
    Token::Subscriptions,
    Token::Tag,
    Token::To,
    Token::User,
    Token::Users,
    Token::Values,
    Token::Verbose,
    Token::Where,
    Token::With,
    Token::Write,
];

impl Token {
    /// Binary operator precedence. Higher binds tighter; zero for non-operators.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq
            | Self::Neq
            | Self::EqRegex
            | Self::NeqRegex
            | Self::Lt
            | Self::Lte
            | Self::Gt
            | Self::Gte => 3,
            Self::Add | Self::Sub | Self::BitwiseOr | Self::BitwiseXor => 4,
            Self::Mul | Self::Div | Self::Mod | Self::BitwiseAnd => 5,
            _ => 0,
        }
    }

    /// Whether the token is a binary operator
    pub fn is_operator(self) -> bool {
        self >= Self::Add && self <= Self::Gte
    }

    /// Whether the token is `=~` or `!~`
    pub fn is_regex_op(self) -> bool {
        matches!(self, Self::EqRegex | Self::NeqRegex)
    }

    /// Whether the token is a keyword
    pub fn is_keyword(self) -> bool {
        self >= Self::All
    }

    /// Upper-case text of the token
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Illegal => "ILLEGAL",
            Self::Eof => "EOF",
            Self::Ws => "WS",
            Self::Comment => "COMMENT",
            Self::Ident => "IDENT",
            Self::BoundParam => "BOUNDPARAM",
            Self::Number => "NUMBER",
            Self::Integer => "INTEGER",
            Self::DurationVal => "DURATIONVAL",
            Self::String => "STRING",
            Self::BadString => "BADSTRING",
            Self::BadEscape => "BADESCAPE",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Regex => "REGEX",
            Self::BadRegex => "BADREGEX",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::EqRegex => "=~",
            Self::NeqRegex => "!~",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::DoubleColon => "::",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::All => "ALL",
            Self::Alter => "ALTER",
            Self::Analyze => "ANALYZE",
            Self::Any => "ANY",
            Self::As => "AS",
            Self::Asc => "ASC",
            Self::Begin => "BEGIN",
            Self::By => "BY",
            Self::Cardinality => "CARDINALITY",
            Self::Create => "CREATE",
            Self::Continuous => "CONTINUOUS",
            Self::Database => "DATABASE",
            Self::Databases => "DATABASES",
            Self::Default => "DEFAULT",
            Self::Delete => "DELETE",
            Self::Desc => "DESC",
            Self::Destinations => "DESTINATIONS",
            Self::Diagnostics => "DIAGNOSTICS",
            Self::Distinct => "DISTINCT",
            Self::Drop => "DROP",
            Self::Duration => "DURATION",
            Self::End => "END",
            Self::Every => "EVERY",
            Self::Exact => "EXACT",
            Self::Explain => "EXPLAIN",
            Self::Field => "FIELD",
            Self::For => "FOR",
            Self::From => "FROM",
            Self::Future => "FUTURE",
            Self::Grant => "GRANT",
            Self::Grants => "GRANTS",
            Self::Group => "GROUP",
            Self::Groups => "GROUPS",
            Self::In => "IN",
            Self::Inf => "INF",
            Self::Insert => "INSERT",
            Self::Into => "INTO",
            Self::Key => "KEY",
            Self::Keys => "KEYS",
            Self::Kill => "KILL",
            Self::Limit => "LIMIT",
            Self::Measurement => "MEASUREMENT",
            Self::Measurements => "MEASUREMENTS",
            Self::Name => "NAME",
            Self::Offset => "OFFSET",
            Self::On => "ON",
            Self::Order => "ORDER",
            Self::Password => "PASSWORD",
            Self::Past => "PAST",
            Self::Policy => "POLICY",
            Self::Policies => "POLICIES",
            Self::Privileges => "PRIVILEGES",
            Self::Queries => "QUERIES",
            Self::Query => "QUERY",
            Self::Read => "READ",
            Self::Replication => "REPLICATION",
            Self::Resample => "RESAMPLE",
            Self::Retention => "RETENTION",
            Self::Revoke => "REVOKE",
            Self::Select => "SELECT",
            Self::Series => "SERIES",
            Self::Set => "SET",
            Self::Show => "SHOW",
            Self::Shard => "SHARD",
            Self::Shards => "SHARDS",
            Self::Slimit => "SLIMIT",
            Self::Soffset => "SOFFSET",
            Self::Stats => "STATS",
            Self::Subscription => "SUBSCRIPTION",
            Self::Subscriptions => "SUBSCRIPTIONS",
            Self::Tag => "TAG",
            Self::To => "TO",
            Self::User => "USER",
            Self::Users => "USERS",
            Self::Values => "VALUES",
            Self::Verbose => "VERBOSE",
            Self::Where => "WHERE",
            Self::With => "WITH",
            Self::Write => "WRITE",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword operators; they sit in the operator range but scan like keywords.
const KEYWORD_OPERATORS: &[Token] = &[Token::And, Token::Or];

fn keyword_table() -> &'static HashMap<String, Token> {
    static TABLE: OnceLock<HashMap<String, Token>> = OnceLock::new();
    TABLE.get_or_init(|| {
        KEYWORDS
            .iter()
            .chain(KEYWORD_OPERATORS)
            .chain(&[Token::True, Token::False])
            .map(|&tok| (tok.as_str().to_lowercase(), tok))
            .collect()
    })
}

/// Map an identifier to its keyword token, or `Token::Ident`.
///
/// Matching is case-insensitive; `and`/`or` map to their operators and
/// `true`/`false` to their boolean tokens.
pub fn lookup(ident: &str) -> Token {
    keyword_table()
        .get(&ident.to_lowercase())
        .copied()
        .unwrap_or(Token::Ident)
}

/// Render a token for an error message, preferring its literal text.
pub fn tokstr(tok: Token, lit: &str) -> String {
    if lit.is_empty() {
        tok.to_string()
    } else {
        lit.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("select"), Token::Select);
        assert_eq!(lookup("SeLeCt"), Token::Select);
        assert_eq!(lookup("TRUE"), Token::True);
        assert_eq!(lookup("false"), Token::False);
        assert_eq!(lookup("cpu"), Token::Ident);
    }

    #[test]
    fn test_lookup_keyword_operators() {
        assert_eq!(lookup("AND"), Token::And);
        assert_eq!(lookup("and"), Token::And);
        assert_eq!(lookup("Or"), Token::Or);
        assert_eq!(lookup("android"), Token::Ident);
        for tok in KEYWORD_OPERATORS {
            assert!(tok.is_operator());
            assert!(!tok.is_keyword());
        }
    }

    #[test]
    fn test_precedence_order() {
        assert!(Token::Mul.precedence() > Token::Add.precedence());
        assert!(Token::Add.precedence() > Token::Eq.precedence());
        assert!(Token::Eq.precedence() > Token::And.precedence());
        assert!(Token::And.precedence() > Token::Or.precedence());
        assert_eq!(Token::LParen.precedence(), 0);
    }

    #[test]
    fn test_is_operator() {
        assert!(Token::Add.is_operator());
        assert!(Token::Gte.is_operator());
        assert!(Token::Or.is_operator());
        assert!(!Token::LParen.is_operator());
        assert!(!Token::Select.is_operator());
        assert!(!Token::Ident.is_operator());
    }

    #[test]
    fn test_keywords_are_keywords() {
        for tok in KEYWORDS {
            assert!(tok.is_keyword(), "{} should be a keyword", tok);
        }
        assert!(!Token::Dot.is_keyword());
    }

    #[test]
    fn test_tokstr_prefers_literal() {
        assert_eq!(tokstr(Token::Ident, "cpu"), "cpu");
        assert_eq!(tokstr(Token::Select, ""), "SELECT");
        assert_eq!(tokstr(Token::Eof, ""), "EOF");
    }
}
