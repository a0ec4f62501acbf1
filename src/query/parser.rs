//! Query Parser
//!
//! Recursive descent over the token stream of a [`BufScanner`]. Statements are
//! dispatched by their leading keywords through [`language`]; expressions are
//! parsed by precedence climbing.
//!
//! # Examples
//!
//! ```text
//! SELECT mean(v) FROM cpu WHERE host = 'a' AND time > now() - 1h GROUP BY time(10m)
//! SHOW TAG VALUES ON db FROM cpu WITH KEY = host
//! CREATE RETENTION POLICY rp ON db DURATION 1w REPLICATION 1 DEFAULT
//! ```
//!
//! `$name` placeholders are replaced by bound parameters before the parser
//! looks at them, so a bound value is indistinguishable from a literal typed
//! inline.

use std::collections::HashSet;

use chrono_tz::Tz;
use serde_json::{Map, Value};
use tracing::debug;

use super::ast::*;
use super::data_type::DataType;
use super::duration::{format_duration, parse_duration};
use super::error::ParseError;
use super::expr::{BinaryExpr, Call, Dimension, Expr, Field, RegexLiteral, VarRef, WildcardType};
use super::params::{bind_params, Params};
use super::parse_tree::language;
use super::quote::quote_ident;
use super::scanner::{is_whitespace, BufScanner, Pos, Scanned};
use super::select::{FillOption, FillValue, SelectStatement, SortField, Target};
use super::source::{Measurement, Source};
use super::token::{tokstr, Token};
use super::walk::{walk_fn, Node};

/// Parse a semicolon separated list of statements
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    Parser::new(input).parse_query()
}

/// Parse a single statement, optionally followed by a semicolon
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    let mut parser = Parser::new(input);
    let stmt = parser.parse_statement()?;
    if parser.scan_ignore_whitespace().0 == Token::Semicolon {
        parser.parse_eof("EOF")?;
    } else {
        parser.unscan();
        parser.parse_eof(";")?;
    }
    Ok(stmt)
}

/// Parse a single expression
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_expr()?;
    parser.parse_eof("EOF")?;
    Ok(expr)
}

/// Whether a SELECT must, may or may not carry an INTO clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetRequirement {
    Required,
    NotRequired,
    Subquery,
}

/// InfluxQL parser
pub struct Parser {
    s: BufScanner,
    params: Params,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self {
            s: BufScanner::new(input),
            params: Params::new(),
        }
    }

    /// Use already bound parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Bind parameters from a JSON object
    pub fn set_params(&mut self, params: &Map<String, Value>) {
        self.params = bind_params(params);
    }

    pub fn parse_query(&mut self) -> Result<Query, ParseError> {
        let mut statements = Vec::new();
        let mut semi = true;

        loop {
            let (tok, pos, lit) = self.scan_ignore_whitespace();
            match tok {
                Token::Eof => {
                    debug!(statements = statements.len(), "parsed query");
                    return Ok(Query { statements });
                }
                Token::Semicolon => semi = true,
                _ => {
                    if !semi {
                        return Err(ParseError::new(tokstr(tok, &lit), &[";"], pos));
                    }
                    self.unscan();
                    statements.push(self.parse_statement()?);
                    semi = false;
                }
            }
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let stmt = language().parse(self)?;
        debug!(statement = %stmt, "parsed statement");
        Ok(stmt)
    }

    /// Parse an expression by precedence climbing. Each new operator is
    /// spliced into the right spine of the tree below every operator that
    /// binds more loosely.
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut root = self.parse_unary_expr()?;

        loop {
            let (op, _, _) = self.scan_ignore_whitespace();
            if !op.is_operator() {
                self.unscan();
                return Ok(root);
            }

            let rhs = if op.is_regex_op() {
                match self.parse_regex()? {
                    Some(re) => Expr::Regex(re),
                    None => {
                        let (tok, pos, lit) = self.scan_ignore_whitespace();
                        return Err(ParseError::new(tokstr(tok, &lit), &["regex"], pos));
                    }
                }
            } else {
                self.parse_unary_expr()?
            };

            root = splice(root, op, rhs);
        }
    }

    // Scanning

    pub(crate) fn scan(&mut self) -> Scanned {
        let scanned = self.s.scan();
        self.bind(scanned)
    }

    fn scan_regex(&mut self) -> Scanned {
        let scanned = self.s.scan_regex();
        self.bind(scanned)
    }

    /// Substitute a bound parameter for a `$name` token. Unknown names and
    /// values that failed to bind stay as-is and are reported on use.
    fn bind(&self, scanned: Scanned) -> Scanned {
        let (tok, pos, lit) = scanned;
        if tok == Token::BoundParam {
            let value = lit
                .strip_prefix('$')
                .filter(|name| !name.is_empty())
                .and_then(|name| self.params.get(name));
            if let Some(v) = value.filter(|v| !v.is_error()) {
                return (v.token(), pos, v.literal());
            }
        }
        (tok, pos, lit)
    }

    pub(crate) fn scan_ignore_whitespace(&mut self) -> Scanned {
        loop {
            let scanned = self.scan();
            if !matches!(scanned.0, Token::Ws | Token::Comment) {
                return scanned;
            }
        }
    }

    pub(crate) fn unscan(&mut self) {
        self.s.unscan();
    }

    /// Fail unless the input is exhausted
    fn parse_eof(&mut self, expected: &str) -> Result<(), ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Eof {
            return Err(ParseError::new(tokstr(tok, &lit), &[expected], pos));
        }
        Ok(())
    }

    fn consume_whitespace(&mut self) {
        let (tok, _, _) = self.scan();
        if tok != Token::Ws {
            self.unscan();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.s.peek_char()
    }

    /// Consume exactly `toks`, skipping whitespace between them
    pub(crate) fn parse_tokens(&mut self, toks: &[Token]) -> Result<(), ParseError> {
        for &expected in toks {
            let (tok, pos, lit) = self.scan_ignore_whitespace();
            if tok != expected {
                return Err(ParseError::new(tokstr(tok, &lit), &[expected.as_str()], pos));
            }
        }
        Ok(())
    }

    // Primitives

    pub(crate) fn parse_ident(&mut self) -> Result<String, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Ident {
            return Err(ParseError::new(tokstr(tok, &lit), &["identifier"], pos));
        }
        Ok(lit)
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut idents = vec![self.parse_ident()?];
        loop {
            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok != Token::Comma {
                self.unscan();
                return Ok(idents);
            }
            idents.push(self.parse_ident()?);
        }
    }

    /// `db.rp.name` style identifiers. An empty segment (`db..name`) yields
    /// an empty string.
    fn parse_segmented_idents(&mut self) -> Result<Vec<String>, ParseError> {
        let (_, pos, _) = self.scan_ignore_whitespace();
        self.unscan();

        let mut idents = vec![self.parse_ident()?];
        loop {
            let (tok, _, _) = self.scan();
            if tok != Token::Dot {
                self.unscan();
                break;
            }

            match self.peek_char() {
                Some('/') | Some(':') => break,
                Some('.') => {
                    idents.push(String::new());
                    continue;
                }
                _ => {}
            }
            idents.push(self.parse_ident()?);
        }

        if idents.len() > 3 {
            let segments: Vec<&str> = idents.iter().map(String::as_str).collect();
            return Err(ParseError::message(
                format!("too many segments in {}", quote_ident(&segments)),
                pos,
            ));
        }
        Ok(idents)
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if let Some(e) = bad_string(tok, pos, &lit) {
            return Err(e);
        }
        if tok != Token::String {
            return Err(ParseError::new(tokstr(tok, &lit), &["string"], pos));
        }
        Ok(lit)
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut strs = vec![self.parse_string()?];
        loop {
            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok != Token::Comma {
                self.unscan();
                return Ok(strs);
            }
            strs.push(self.parse_string()?);
        }
    }

    /// An integer in `min..=max`
    fn parse_int(&mut self, min: i64, max: i64) -> Result<i64, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Integer {
            return Err(ParseError::new(tokstr(tok, &lit), &["integer"], pos));
        }
        let n: i64 = lit
            .parse()
            .map_err(|_| ParseError::message("unable to parse integer", pos))?;
        if n < min || n > max {
            return Err(ParseError::message(
                format!("invalid value {}: must be {} <= n <= {}", n, min, max),
                pos,
            ));
        }
        Ok(n)
    }

    fn parse_uint64(&mut self) -> Result<u64, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Integer {
            return Err(ParseError::new(tokstr(tok, &lit), &["integer"], pos));
        }
        lit.parse()
            .map_err(|_| ParseError::message("unable to parse integer", pos))
    }

    /// A duration literal, or `INF` for zero
    fn parse_duration_value(&mut self) -> Result<i64, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        match tok {
            Token::DurationVal => {
                parse_duration(&lit).map_err(|e| ParseError::message(e.to_string(), pos))
            }
            Token::Inf => Ok(0),
            _ => Err(ParseError::new(tokstr(tok, &lit), &["duration"], pos)),
        }
    }

    /// `tok <integer>` if `tok` is next, zero otherwise
    fn parse_optional_token_and_int(&mut self, expected: Token) -> Result<usize, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != expected {
            self.unscan();
            return Ok(0);
        }

        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Integer {
            return Err(ParseError::new(tokstr(tok, &lit), &["integer"], pos));
        }
        let n: i64 = lit
            .parse()
            .map_err(|_| ParseError::message("unable to parse integer", pos))?;
        if n < 0 {
            return Err(ParseError::message(format!("{} must be >= 0", expected), pos));
        }
        Ok(n as usize)
    }

    /// `ON <db>` if present, empty otherwise
    fn parse_optional_on(&mut self) -> Result<String, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::On {
            self.unscan();
            return Ok(String::new());
        }
        self.parse_ident()
    }

    fn parse_optional_sources(&mut self) -> Result<Vec<Source>, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::From {
            self.unscan();
            return Ok(Vec::new());
        }
        self.parse_sources(false)
    }

    fn parse_condition(&mut self) -> Result<Option<Expr>, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::Where {
            self.unscan();
            return Ok(None);
        }
        self.parse_expr().map(Some)
    }

    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::As {
            self.unscan();
            return Ok(None);
        }
        self.parse_ident().map(Some)
    }

    // Expressions

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok == Token::LParen {
            let expr = self.parse_expr()?;
            let (tok, pos, lit) = self.scan_ignore_whitespace();
            if tok != Token::RParen {
                return Err(ParseError::new(tokstr(tok, &lit), &[")"], pos));
            }
            return Ok(Expr::paren(expr));
        }
        self.unscan();

        let (tok, pos, lit) = self.scan_ignore_whitespace();
        match tok {
            Token::Ident => {
                let (next, _, _) = self.scan();
                if next == Token::LParen {
                    return self.parse_call(&lit).map(Expr::Call);
                }
                self.unscan();
                self.unscan();
                self.parse_var_ref().map(Expr::VarRef)
            }
            Token::Distinct => {
                let (next, pos, lit) = self.scan();
                match next {
                    Token::LParen => self.parse_call("distinct").map(Expr::Call),
                    Token::Ws => {
                        let (tok, pos, lit) = self.scan_ignore_whitespace();
                        if tok != Token::Ident {
                            return Err(ParseError::new(tokstr(tok, &lit), &["identifier"], pos));
                        }
                        Ok(Expr::Distinct(lit))
                    }
                    _ => Err(ParseError::new(tokstr(next, &lit), &["(", "identifier"], pos)),
                }
            }
            Token::String => Ok(Expr::String(lit)),
            Token::BadString | Token::BadEscape => Err(bad_string(tok, pos, &lit)
                .unwrap_or_else(|| ParseError::new(tokstr(tok, &lit), &["string"], pos))),
            Token::Number => lit
                .parse()
                .map(Expr::Number)
                .map_err(|_| ParseError::message("unable to parse number", pos)),
            Token::Integer => match lit.parse::<i64>() {
                Ok(v) => Ok(Expr::Integer(v)),
                Err(_) => lit
                    .parse::<u64>()
                    .map(Expr::Unsigned)
                    .map_err(|_| ParseError::message("unable to parse integer", pos)),
            },
            Token::True | Token::False => Ok(Expr::Boolean(tok == Token::True)),
            Token::DurationVal => parse_duration(&lit)
                .map(Expr::Duration)
                .map_err(|e| ParseError::message(e.to_string(), pos)),
            Token::Mul => self.parse_wildcard().map(Expr::Wildcard),
            Token::Regex => RegexLiteral::new(&lit)
                .map(Expr::Regex)
                .map_err(|e| ParseError::message(e.to_string(), pos)),
            Token::BoundParam => {
                let name = lit.strip_prefix('$').unwrap_or(&lit);
                if name.is_empty() {
                    return Err(ParseError::message("empty bound parameter", pos));
                }
                match self.params.get(name) {
                    Some(v) => Err(ParseError::message(v.literal(), pos)),
                    None => Err(ParseError::message(format!("missing parameter: {}", name), pos)),
                }
            }
            Token::Add | Token::Sub => self.parse_signed(tok == Token::Sub),
            _ => Err(ParseError::new(
                tokstr(tok, &lit),
                &["identifier", "string", "number", "bool"],
                pos,
            )),
        }
    }

    /// The operand of a unary `+` or `-`. Literals are folded, anything
    /// else becomes a multiplication by `1` or `-1`.
    fn parse_signed(&mut self, negate: bool) -> Result<Expr, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if !matches!(
            tok,
            Token::Number | Token::Integer | Token::DurationVal | Token::LParen | Token::Ident
        ) {
            return Err(ParseError::new(
                tokstr(tok, &lit),
                &["identifier", "number", "duration", "("],
                pos,
            ));
        }
        self.unscan();

        let sign: i64 = if negate { -1 } else { 1 };
        let expr = self.parse_unary_expr()?;
        Ok(match expr {
            Expr::Number(v) => Expr::Number(v * sign as f64),
            Expr::Integer(v) => Expr::Integer(v.wrapping_mul(sign)),
            Expr::Duration(v) => Expr::Duration(v.wrapping_mul(sign)),
            Expr::Unsigned(v) if negate => {
                if v == i64::MIN.unsigned_abs() {
                    Expr::Integer(i64::MIN)
                } else {
                    return Err(ParseError::message(
                        format!("constant -{} underflows int64", v),
                        pos,
                    ));
                }
            }
            e @ (Expr::VarRef(_) | Expr::Call(_) | Expr::Paren(_)) => {
                Expr::binary(Token::Mul, Expr::Integer(sign), e)
            }
            other => other,
        })
    }

    fn parse_wildcard(&mut self) -> Result<WildcardType, ParseError> {
        let (tok, _, _) = self.scan();
        if tok != Token::DoubleColon {
            self.unscan();
            return Ok(WildcardType::All);
        }
        let (tok, pos, lit) = self.scan();
        match tok {
            Token::Field => Ok(WildcardType::Field),
            Token::Tag => Ok(WildcardType::Tag),
            _ => Err(ParseError::new(tokstr(tok, &lit), &["field", "tag"], pos)),
        }
    }

    /// Arguments of a call whose name and `(` are already consumed
    fn parse_call(&mut self, name: &str) -> Result<Call, ParseError> {
        let name = name.to_lowercase();
        let mut args = Vec::new();

        match self.parse_regex()? {
            Some(re) => args.push(Expr::Regex(re)),
            None => {
                let (tok, _, _) = self.scan();
                if tok == Token::RParen {
                    return Ok(Call { name, args });
                }
                self.unscan();
                args.push(self.parse_expr()?);
            }
        }

        loop {
            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok != Token::Comma {
                self.unscan();
                break;
            }
            match self.parse_regex()? {
                Some(re) => args.push(Expr::Regex(re)),
                None => args.push(self.parse_expr()?),
            }
        }

        let (tok, pos, lit) = self.scan();
        if tok != Token::RParen {
            return Err(ParseError::new(tokstr(tok, &lit), &[")"], pos));
        }
        Ok(Call { name, args })
    }

    fn parse_var_ref(&mut self) -> Result<VarRef, ParseError> {
        let segments = self.parse_segmented_idents()?;
        let mut data_type = DataType::Unknown;

        let (tok, _, _) = self.scan();
        if tok == Token::DoubleColon {
            let (tok, pos, lit) = self.scan();
            data_type = match tok {
                Token::Ident => match lit.to_lowercase().as_str() {
                    "float" => DataType::Float,
                    "integer" => DataType::Integer,
                    "unsigned" => DataType::Unsigned,
                    "string" => DataType::String,
                    "boolean" => DataType::Boolean,
                    _ => {
                        return Err(ParseError::new(
                            tokstr(tok, &lit),
                            &["float", "integer", "unsigned", "string", "boolean", "field", "tag"],
                            pos,
                        ))
                    }
                },
                Token::Field => DataType::AnyField,
                Token::Tag => DataType::Tag,
                _ => {
                    return Err(ParseError::new(
                        tokstr(tok, &lit),
                        &["float", "integer", "string", "boolean", "field", "tag"],
                        pos,
                    ))
                }
            };
        } else {
            self.unscan();
        }

        Ok(VarRef {
            val: segments.join("."),
            data_type,
        })
    }

    /// A regex literal if one is next, `None` otherwise
    fn parse_regex(&mut self) -> Result<Option<RegexLiteral>, ParseError> {
        if self.peek_char().map_or(false, is_whitespace) {
            self.consume_whitespace();
        }

        match self.peek_char() {
            Some('$') => {
                let (tok, _, _) = self.scan();
                self.unscan();
                if tok != Token::Regex {
                    return Ok(None);
                }
            }
            Some('/') => {}
            _ => return Ok(None),
        }

        let (tok, pos, lit) = self.scan_regex();
        match tok {
            Token::Regex => RegexLiteral::new(&lit)
                .map(Some)
                .map_err(|e| ParseError::message(e.to_string(), pos)),
            Token::BadEscape => Err(ParseError::message(format!("bad escape: {}", lit), pos)),
            Token::BadRegex => Err(ParseError::message(format!("bad regex: {}", lit), pos)),
            _ => Err(ParseError::new(tokstr(tok, &lit), &["regex"], pos)),
        }
    }

    // SELECT

    pub(crate) fn parse_select_statement(
        &mut self,
        requirement: TargetRequirement,
    ) -> Result<SelectStatement, ParseError> {
        let fields = self.parse_fields()?;
        let target = self.parse_target(requirement)?;

        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::From {
            return Err(ParseError::new(tokstr(tok, &lit), &["FROM"], pos));
        }
        let sources = self.parse_sources(true)?;

        let condition = self.parse_condition()?;
        let dimensions = self.parse_dimensions()?;
        let fill = self.parse_fill()?;
        let sort_fields = self.parse_order_by()?;
        let limit = self.parse_optional_token_and_int(Token::Limit)?;
        let offset = self.parse_optional_token_and_int(Token::Offset)?;
        let slimit = self.parse_optional_token_and_int(Token::Slimit)?;
        let soffset = self.parse_optional_token_and_int(Token::Soffset)?;
        let location = self.parse_location()?;

        let mut is_raw_query = true;
        for field in &fields {
            walk_fn(Node::Expr(&field.expr), |n| {
                if let Node::Expr(Expr::Call(_)) = n {
                    is_raw_query = false;
                }
            });
        }

        Ok(SelectStatement {
            fields,
            target,
            dimensions,
            sources,
            condition,
            sort_fields,
            limit,
            offset,
            slimit,
            soffset,
            is_raw_query,
            fill,
            location,
            ..SelectStatement::default()
        })
    }

    fn parse_fields(&mut self) -> Result<Vec<Field>, ParseError> {
        let mut fields = Vec::new();
        loop {
            fields.push(self.parse_field()?);

            let (tok, _, _) = self.scan();
            if tok != Token::Comma {
                self.unscan();
                return Ok(fields);
            }
        }
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        let expr = match self.parse_regex()? {
            Some(re) => Expr::Regex(re),
            None => {
                let (_, pos, _) = self.scan_ignore_whitespace();
                self.unscan();
                let expr = self.parse_expr()?;
                if let Some(op) = condition_operator(&expr) {
                    return Err(ParseError::plain(format!(
                        "invalid operator {} in SELECT clause at {}; operator is intended for WHERE clause",
                        op, pos
                    )));
                }
                expr
            }
        };

        let alias = self.parse_alias()?;
        self.consume_whitespace();
        Ok(Field { expr, alias })
    }

    fn parse_target(&mut self, requirement: TargetRequirement) -> Result<Option<Target>, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Into {
            if requirement == TargetRequirement::Required {
                return Err(ParseError::new(tokstr(tok, &lit), &["INTO"], pos));
            }
            self.unscan();
            return Ok(None);
        }

        let mut idents = self.parse_segmented_idents()?;
        if idents.len() < 3 && self.peek_char() == Some(':') {
            self.parse_tokens(&[Token::Colon, Token::Measurement])?;
            idents.push(String::new());
        }

        let mut measurement = Measurement {
            is_target: true,
            ..Measurement::default()
        };
        let mut idents = idents.into_iter().rev();
        measurement.name = idents.next().unwrap_or_default();
        measurement.retention_policy = idents.next().unwrap_or_default();
        measurement.database = idents.next().unwrap_or_default();
        Ok(Some(Target { measurement }))
    }

    fn parse_sources(&mut self, subqueries: bool) -> Result<Vec<Source>, ParseError> {
        let mut sources = Vec::new();
        loop {
            sources.push(self.parse_source(subqueries)?);

            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok != Token::Comma {
                self.unscan();
                return Ok(sources);
            }
        }
    }

    fn parse_source(&mut self, subqueries: bool) -> Result<Source, ParseError> {
        if let Some(re) = self.parse_regex()? {
            return Ok(Source::Measurement(Measurement::regex(re)));
        }

        if subqueries {
            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok == Token::LParen {
                self.parse_tokens(&[Token::Select])?;
                let stmt = self.parse_select_statement(TargetRequirement::Subquery)?;
                self.parse_tokens(&[Token::RParen])?;
                return Ok(Source::SubQuery(Box::new(stmt)));
            }
            self.unscan();
        }

        let idents = self.parse_segmented_idents()?;
        let mut m = Measurement::default();

        if let [db, rp, name] = idents.as_slice() {
            m.database = db.clone();
            m.retention_policy = rp.clone();
            m.name = name.clone();
            return Ok(Source::Measurement(m));
        }

        // `db.rp./regex/` or `rp./regex/`
        match self.parse_regex()? {
            Some(re) => {
                match idents.as_slice() {
                    [rp] => m.retention_policy = rp.clone(),
                    [db, rp] => {
                        m.database = db.clone();
                        m.retention_policy = rp.clone();
                    }
                    _ => {}
                }
                m.regex = Some(re);
            }
            None => {
                let mut idents = idents.into_iter().rev();
                m.name = idents.next().unwrap_or_default();
                m.retention_policy = idents.next().unwrap_or_default();
            }
        }
        Ok(Source::Measurement(m))
    }

    fn parse_dimensions(&mut self) -> Result<Vec<Dimension>, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::Group {
            self.unscan();
            return Ok(Vec::new());
        }
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::By {
            return Err(ParseError::new(tokstr(tok, &lit), &["BY"], pos));
        }

        let mut dimensions = Vec::new();
        loop {
            dimensions.push(self.parse_dimension()?);

            let (tok, _, _) = self.scan();
            if tok != Token::Comma {
                self.unscan();
                return Ok(dimensions);
            }
        }
    }

    fn parse_dimension(&mut self) -> Result<Dimension, ParseError> {
        let expr = match self.parse_regex()? {
            Some(re) => Expr::Regex(re),
            None => self.parse_expr()?,
        };
        self.consume_whitespace();
        Ok(Dimension { expr })
    }

    fn parse_fill(&mut self) -> Result<FillOption, ParseError> {
        let (tok, _, lit) = self.scan_ignore_whitespace();
        self.unscan();
        if tok != Token::Ident || !lit.eq_ignore_ascii_case("fill") {
            return Ok(FillOption::Null);
        }

        let Expr::Call(fill) = self.parse_expr()? else {
            return Err(ParseError::plain("fill must be a function call"));
        };
        let [arg] = fill.args.as_slice() else {
            return Err(ParseError::plain(
                "fill requires an argument, e.g.: 0, null, none, previous, linear",
            ));
        };

        match arg.to_string().as_str() {
            "null" => Ok(FillOption::Null),
            "none" => Ok(FillOption::NoFill),
            "previous" => Ok(FillOption::Previous),
            "linear" => Ok(FillOption::Linear),
            _ => match arg {
                Expr::Integer(v) => Ok(FillOption::Number(FillValue::Integer(*v))),
                Expr::Number(v) => Ok(FillOption::Number(FillValue::Float(*v))),
                _ => Err(ParseError::plain("expected number argument in fill()")),
            },
        }
    }

    fn parse_location(&mut self) -> Result<Option<Tz>, ParseError> {
        let (tok, _, lit) = self.scan_ignore_whitespace();
        self.unscan();
        if tok != Token::Ident || !lit.eq_ignore_ascii_case("tz") {
            return Ok(None);
        }

        let Expr::Call(tz) = self.parse_expr()? else {
            return Err(ParseError::plain("tz must be a function call"));
        };
        let [arg] = tz.args.as_slice() else {
            return Err(ParseError::plain("tz requires exactly one argument"));
        };
        let Expr::String(name) = arg else {
            return Err(ParseError::plain("expected string argument in tz()"));
        };

        name.parse::<Tz>()
            .map(Some)
            .map_err(|_| ParseError::plain(format!("unable to find time zone {}", name)))
    }

    fn parse_order_by(&mut self) -> Result<Vec<SortField>, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::Order {
            self.unscan();
            return Ok(Vec::new());
        }
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::By {
            return Err(ParseError::new(tokstr(tok, &lit), &["BY"], pos));
        }
        self.parse_sort_fields()
    }

    /// Only `time` can be sorted on, in either direction
    fn parse_sort_fields(&mut self) -> Result<Vec<SortField>, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        let mut fields = match tok {
            Token::Asc | Token::Desc => vec![SortField {
                name: String::new(),
                ascending: tok == Token::Asc,
            }],
            Token::Ident => {
                self.unscan();
                let field = self.parse_sort_field()?;
                if lit != "time" {
                    return Err(ParseError::plain("only ORDER BY time supported at this time"));
                }
                vec![field]
            }
            _ => {
                return Err(ParseError::new(
                    tokstr(tok, &lit),
                    &["identifier", "ASC", "DESC"],
                    pos,
                ))
            }
        };

        loop {
            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok != Token::Comma {
                self.unscan();
                break;
            }
            fields.push(self.parse_sort_field()?);
        }

        if fields.len() > 1 {
            return Err(ParseError::plain("only ORDER BY time supported at this time"));
        }
        Ok(fields)
    }

    fn parse_sort_field(&mut self) -> Result<SortField, ParseError> {
        let name = self.parse_ident()?;
        let (tok, _, _) = self.scan_ignore_whitespace();
        let ascending = match tok {
            Token::Asc => true,
            Token::Desc => false,
            _ => {
                self.unscan();
                true
            }
        };
        Ok(SortField { name, ascending })
    }

    // Series and measurements

    pub(crate) fn parse_delete_statement(&mut self) -> Result<Statement, ParseError> {
        let (sources, condition) = self.parse_series_filter()?;
        Ok(Statement::DeleteSeries(DeleteSeriesStatement { sources, condition }))
    }

    pub(crate) fn parse_drop_series_statement(&mut self) -> Result<Statement, ParseError> {
        let (sources, condition) = self.parse_series_filter()?;
        Ok(Statement::DropSeries(DropSeriesStatement { sources, condition }))
    }

    /// `[FROM sources] [WHERE condition]`, at least one of them
    fn parse_series_filter(&mut self) -> Result<(Vec<Source>, Option<Expr>), ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        let mut sources = Vec::new();
        if tok == Token::From {
            sources = self.parse_sources(false)?;
            for source in &sources {
                if let Source::Measurement(m) = source {
                    if !m.database.is_empty() {
                        return Err(ParseError::plain("database not supported"));
                    }
                    if !m.retention_policy.is_empty() {
                        return Err(ParseError::plain("retention policy not supported"));
                    }
                }
            }
        } else {
            self.unscan();
        }

        let condition = self.parse_condition()?;
        if sources.is_empty() && condition.is_none() {
            return Err(ParseError::new(tokstr(tok, &lit), &["FROM", "WHERE"], pos));
        }
        Ok((sources, condition))
    }

    pub(crate) fn parse_drop_shard_statement(&mut self) -> Result<Statement, ParseError> {
        let id = self.parse_uint64()?;
        Ok(Statement::DropShard(DropShardStatement { id }))
    }

    pub(crate) fn parse_show_series_statement(&mut self) -> Result<Statement, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        let exact = tok == Token::Exact;
        if !exact {
            self.unscan();
        }
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok == Token::Cardinality {
            let c = self.parse_cardinality(exact)?;
            return Ok(Statement::ShowSeriesCardinality(ShowSeriesCardinalityStatement(c)));
        }
        self.unscan();

        let database = self.parse_optional_on()?;
        let sources = self.parse_optional_sources()?;
        let condition = self.parse_condition()?;
        let sort_fields = self.parse_order_by()?;
        let limit = self.parse_optional_token_and_int(Token::Limit)?;
        let offset = self.parse_optional_token_and_int(Token::Offset)?;
        Ok(Statement::ShowSeries(ShowSeriesStatement {
            database,
            sources,
            condition,
            sort_fields,
            limit,
            offset,
        }))
    }

    /// The clauses shared by every `... CARDINALITY` statement
    fn parse_cardinality(&mut self, exact: bool) -> Result<Cardinality, ParseError> {
        let mut c = self.parse_cardinality_head(exact)?;
        self.parse_cardinality_tail(&mut c)?;
        Ok(c)
    }

    fn parse_cardinality_head(&mut self, exact: bool) -> Result<Cardinality, ParseError> {
        Ok(Cardinality {
            exact,
            database: self.parse_optional_on()?,
            sources: self.parse_optional_sources()?,
            ..Cardinality::default()
        })
    }

    fn parse_cardinality_tail(&mut self, c: &mut Cardinality) -> Result<(), ParseError> {
        c.condition = self.parse_condition()?;
        c.dimensions = self.parse_dimensions()?;
        c.limit = self.parse_optional_token_and_int(Token::Limit)?;
        c.offset = self.parse_optional_token_and_int(Token::Offset)?;
        Ok(())
    }

    pub(crate) fn parse_show_measurement_cardinality_statement(
        &mut self,
        exact: bool,
    ) -> Result<Statement, ParseError> {
        if exact {
            self.parse_tokens(&[Token::Cardinality])?;
        }
        let c = self.parse_cardinality(exact)?;
        Ok(Statement::ShowMeasurementCardinality(ShowMeasurementCardinalityStatement(c)))
    }

    /// `[EXACT] CARDINALITY`, with the keyword after `KEY` already consumed
    fn parse_exact_cardinality(&mut self) -> Result<bool, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        match tok {
            Token::Exact => {
                self.parse_tokens(&[Token::Cardinality])?;
                Ok(true)
            }
            Token::Cardinality => Ok(false),
            _ => Err(ParseError::new(tokstr(tok, &lit), &["EXACT", "CARDINALITY"], pos)),
        }
    }

    pub(crate) fn parse_show_tag_key_cardinality_statement(&mut self) -> Result<Statement, ParseError> {
        let exact = self.parse_exact_cardinality()?;
        let c = self.parse_cardinality(exact)?;
        Ok(Statement::ShowTagKeyCardinality(ShowTagKeyCardinalityStatement(c)))
    }

    pub(crate) fn parse_show_field_key_cardinality_statement(
        &mut self,
    ) -> Result<Statement, ParseError> {
        let exact = self.parse_exact_cardinality()?;
        let c = self.parse_cardinality(exact)?;
        Ok(Statement::ShowFieldKeyCardinality(ShowFieldKeyCardinalityStatement(c)))
    }

    pub(crate) fn parse_show_measurements_statement(&mut self) -> Result<Statement, ParseError> {
        let mut stmt = ShowMeasurementsStatement::default();

        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok == Token::On {
            let (tok, pos, lit) = self.scan_ignore_whitespace();
            match tok {
                Token::Ident => stmt.database = lit,
                Token::Mul => stmt.wildcard_database = true,
                _ => {
                    return Err(ParseError::new(tokstr(tok, &lit), &["identifier or *"], pos));
                }
            }

            let (tok, _, _) = self.scan_ignore_whitespace();
            if tok == Token::Dot {
                let (tok, pos, lit) = self.scan_ignore_whitespace();
                match tok {
                    Token::Ident => stmt.retention_policy = lit,
                    Token::Mul => stmt.wildcard_retention_policy = true,
                    _ => {
                        return Err(ParseError::new(tokstr(tok, &lit), &["identifier or *"], pos));
                    }
                }
            } else {
                self.unscan();
            }
        } else {
            self.unscan();
        }

        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok == Token::With {
            self.parse_tokens(&[Token::Measurement])?;
            let (tok, pos, lit) = self.scan_ignore_whitespace();
            if !matches!(tok, Token::Eq | Token::EqRegex) {
                return Err(ParseError::new(tokstr(tok, &lit), &["=", "=~"], pos));
            }
            stmt.source = Some(self.parse_source(false)?);
        } else {
            self.unscan();
        }

        stmt.condition = self.parse_condition()?;
        stmt.sort_fields = self.parse_order_by()?;
        stmt.limit = self.parse_optional_token_and_int(Token::Limit)?;
        stmt.offset = self.parse_optional_token_and_int(Token::Offset)?;
        Ok(Statement::ShowMeasurements(stmt))
    }

    /// `WITH KEY` followed by `IN (list)`, `= key`, `!= key`, `=~ /re/` or
    /// `!~ /re/`
    fn parse_tag_key_expr(&mut self) -> Result<(Token, Expr), ParseError> {
        self.parse_tokens(&[Token::With, Token::Key])?;

        let (op, pos, lit) = self.scan_ignore_whitespace();
        match op {
            Token::In => {
                self.parse_tokens(&[Token::LParen])?;
                let keys = self.parse_ident_list()?;
                self.parse_tokens(&[Token::RParen])?;
                Ok((op, Expr::List(keys)))
            }
            Token::Eq | Token::Neq => Ok((op, Expr::String(self.parse_ident()?))),
            Token::EqRegex | Token::NeqRegex => match self.parse_regex()? {
                Some(re) => Ok((op, Expr::Regex(re))),
                None => {
                    let (tok, pos, lit) = self.scan_ignore_whitespace();
                    Err(ParseError::new(tokstr(tok, &lit), &["regex"], pos))
                }
            },
            _ => Err(ParseError::new(tokstr(op, &lit), &["IN", "=", "=~"], pos)),
        }
    }

    pub(crate) fn parse_show_tag_keys_statement(&mut self) -> Result<Statement, ParseError> {
        let mut stmt = ShowTagKeysStatement {
            database: self.parse_optional_on()?,
            sources: self.parse_optional_sources()?,
            ..ShowTagKeysStatement::default()
        };

        let (tok, _, _) = self.scan_ignore_whitespace();
        self.unscan();
        if tok == Token::With {
            stmt.tag_key = Some(self.parse_tag_key_expr()?);
        }

        stmt.condition = self.parse_condition()?;
        stmt.sort_fields = self.parse_order_by()?;
        stmt.limit = self.parse_optional_token_and_int(Token::Limit)?;
        stmt.offset = self.parse_optional_token_and_int(Token::Offset)?;
        stmt.slimit = self.parse_optional_token_and_int(Token::Slimit)?;
        stmt.soffset = self.parse_optional_token_and_int(Token::Soffset)?;
        Ok(Statement::ShowTagKeys(stmt))
    }

    pub(crate) fn parse_show_tag_values_statement(&mut self) -> Result<Statement, ParseError> {
        let (tok, _, _) = self.scan_ignore_whitespace();
        match tok {
            Token::Exact => {
                self.parse_tokens(&[Token::Cardinality])?;
                return self.parse_show_tag_values_cardinality_statement(true);
            }
            Token::Cardinality => return self.parse_show_tag_values_cardinality_statement(false),
            _ => self.unscan(),
        }

        let database = self.parse_optional_on()?;
        let sources = self.parse_optional_sources()?;
        let (op, tag_key_expr) = self.parse_tag_key_expr()?;
        Ok(Statement::ShowTagValues(ShowTagValuesStatement {
            database,
            sources,
            op,
            tag_key_expr,
            condition: self.parse_condition()?,
            sort_fields: self.parse_order_by()?,
            limit: self.parse_optional_token_and_int(Token::Limit)?,
            offset: self.parse_optional_token_and_int(Token::Offset)?,
        }))
    }

    fn parse_show_tag_values_cardinality_statement(
        &mut self,
        exact: bool,
    ) -> Result<Statement, ParseError> {
        let mut cardinality = self.parse_cardinality_head(exact)?;
        let (op, tag_key_expr) = self.parse_tag_key_expr()?;
        self.parse_cardinality_tail(&mut cardinality)?;
        Ok(Statement::ShowTagValuesCardinality(ShowTagValuesCardinalityStatement {
            cardinality,
            op,
            tag_key_expr,
        }))
    }

    pub(crate) fn parse_show_field_keys_statement(&mut self) -> Result<Statement, ParseError> {
        Ok(Statement::ShowFieldKeys(ShowFieldKeysStatement {
            database: self.parse_optional_on()?,
            sources: self.parse_optional_sources()?,
            sort_fields: self.parse_order_by()?,
            limit: self.parse_optional_token_and_int(Token::Limit)?,
            offset: self.parse_optional_token_and_int(Token::Offset)?,
        }))
    }

    // Databases and retention policies

    pub(crate) fn parse_create_database_statement(&mut self) -> Result<Statement, ParseError> {
        let mut stmt = CreateDatabaseStatement {
            name: self.parse_ident()?,
            ..CreateDatabaseStatement::default()
        };

        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != Token::With {
            self.unscan();
            return Ok(Statement::CreateDatabase(stmt));
        }

        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if !matches!(
            tok,
            Token::Duration | Token::Name | Token::Replication | Token::Shard | Token::Future | Token::Past
        ) {
            return Err(ParseError::new(
                tokstr(tok, &lit),
                &["DURATION", "NAME", "REPLICATION", "SHARD", "FUTURE", "PAST"],
                pos,
            ));
        }
        self.unscan();
        stmt.retention_policy_create = true;

        if self.parse_optional_tokens(&[Token::Duration])? {
            stmt.retention_policy_duration = Some(self.parse_duration_value()?);
        }
        if self.parse_optional_tokens(&[Token::Replication])? {
            stmt.retention_policy_replication = Some(self.parse_int(1, i32::MAX as i64)?);
        }
        if self.parse_optional_tokens(&[Token::Shard])? {
            self.parse_tokens(&[Token::Duration])?;
            stmt.retention_policy_shard_group_duration = self.parse_duration_value()?;
        }
        if self.parse_optional_tokens(&[Token::Future])? {
            self.parse_tokens(&[Token::Limit])?;
            stmt.future_write_limit = Some(self.parse_duration_value()?);
        }
        if self.parse_optional_tokens(&[Token::Past])? {
            self.parse_tokens(&[Token::Limit])?;
            stmt.past_write_limit = Some(self.parse_duration_value()?);
        }
        if self.parse_optional_tokens(&[Token::Name])? {
            stmt.retention_policy_name = self.parse_ident()?;
        }

        Ok(Statement::CreateDatabase(stmt))
    }

    /// Consume `toks` if the first of them is next
    fn parse_optional_tokens(&mut self, toks: &[Token]) -> Result<bool, ParseError> {
        let Some((&first, rest)) = toks.split_first() else {
            return Ok(false);
        };
        let (tok, _, _) = self.scan_ignore_whitespace();
        if tok != first {
            self.unscan();
            return Ok(false);
        }
        self.parse_tokens(rest)?;
        Ok(true)
    }

    pub(crate) fn parse_create_retention_policy_statement(
        &mut self,
    ) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;

        self.parse_tokens(&[Token::Duration])?;
        let duration = self.parse_duration_value()?;
        self.parse_tokens(&[Token::Replication])?;
        let replication = self.parse_int(1, i32::MAX as i64)?;

        let mut stmt = CreateRetentionPolicyStatement {
            name,
            database,
            duration,
            replication,
            default: false,
            shard_group_duration: 0,
            future_write_limit: 0,
            past_write_limit: 0,
        };

        if self.parse_optional_tokens(&[Token::Shard])? {
            self.parse_tokens(&[Token::Duration])?;
            let (tok, pos, _) = self.scan_ignore_whitespace();
            if tok == Token::Inf {
                return Err(ParseError::message("invalid duration INF for shard duration", pos));
            }
            self.unscan();
            stmt.shard_group_duration = self.parse_duration_value()?;
        }
        stmt.default = self.parse_optional_tokens(&[Token::Default])?;
        if self.parse_optional_tokens(&[Token::Future, Token::Limit])? {
            stmt.future_write_limit = self.parse_duration_value()?;
        }
        if self.parse_optional_tokens(&[Token::Past, Token::Limit])? {
            stmt.past_write_limit = self.parse_duration_value()?;
        }

        Ok(Statement::CreateRetentionPolicy(stmt))
    }

    pub(crate) fn parse_alter_retention_policy_statement(
        &mut self,
    ) -> Result<Statement, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        let name = match tok {
            Token::Default => "default".to_string(),
            Token::Ident => lit,
            _ => return Err(ParseError::new(tokstr(tok, &lit), &["identifier"], pos)),
        };
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;

        let mut stmt = AlterRetentionPolicyStatement {
            name,
            database,
            duration: None,
            replication: None,
            default: false,
            shard_group_duration: None,
            future_write_limit: None,
            past_write_limit: None,
        };

        let mut found = HashSet::new();
        loop {
            let (tok, pos, lit) = self.scan_ignore_whitespace();
            if !found.insert(tok) {
                return Err(ParseError::message(format!("found duplicate {} option", tok), pos));
            }

            match tok {
                Token::Duration => stmt.duration = Some(self.parse_duration_value()?),
                Token::Replication => {
                    stmt.replication = Some(self.parse_int(1, i32::MAX as i64)?);
                }
                Token::Shard => {
                    self.parse_tokens(&[Token::Duration])?;
                    stmt.shard_group_duration = Some(self.parse_duration_value()?);
                }
                Token::Default => stmt.default = true,
                Token::Future => {
                    self.parse_tokens(&[Token::Limit])?;
                    stmt.future_write_limit = Some(self.parse_duration_value()?);
                }
                Token::Past => {
                    self.parse_tokens(&[Token::Limit])?;
                    stmt.past_write_limit = Some(self.parse_duration_value()?);
                }
                _ => {
                    if found.len() == 1 {
                        return Err(ParseError::new(
                            tokstr(tok, &lit),
                            &["DURATION", "REPLICATION", "SHARD", "DEFAULT", "FUTURE", "PAST"],
                            pos,
                        ));
                    }
                    self.unscan();
                    return Ok(Statement::AlterRetentionPolicy(stmt));
                }
            }
        }
    }

    pub(crate) fn parse_drop_retention_policy_statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;
        Ok(Statement::DropRetentionPolicy(DropRetentionPolicyStatement { name, database }))
    }

    pub(crate) fn parse_show_retention_policies_statement(
        &mut self,
    ) -> Result<Statement, ParseError> {
        let database = self.parse_optional_on()?;
        Ok(Statement::ShowRetentionPolicies(ShowRetentionPoliciesStatement { database }))
    }

    // Users and privileges

    pub(crate) fn parse_create_user_statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::With, Token::Password])?;
        let password = self.parse_string()?;
        let admin = self.parse_optional_tokens(&[Token::With])?;
        if admin {
            self.parse_tokens(&[Token::All, Token::Privileges])?;
        }
        Ok(Statement::CreateUser(CreateUserStatement {
            name,
            password,
            admin,
        }))
    }

    pub(crate) fn parse_set_password_user_statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::Eq])?;
        let password = self.parse_string()?;
        Ok(Statement::SetPasswordUser(SetPasswordUserStatement { name, password }))
    }

    fn parse_privilege(&mut self) -> Result<Privilege, ParseError> {
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        match tok {
            Token::Read => Ok(Privilege::Read),
            Token::Write => Ok(Privilege::Write),
            Token::All => {
                self.parse_optional_tokens(&[Token::Privileges])?;
                Ok(Privilege::All)
            }
            _ => Err(ParseError::new(
                tokstr(tok, &lit),
                &["READ", "WRITE", "ALL [PRIVILEGES]"],
                pos,
            )),
        }
    }

    /// Privilege, optional `ON db` and the keyword leading to the user.
    /// Returns `None` for the database when granting admin rights.
    fn parse_privilege_target(
        &mut self,
        user_keyword: Token,
    ) -> Result<(Privilege, Option<String>), ParseError> {
        let privilege = self.parse_privilege()?;

        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok == Token::On {
            let on = self.parse_ident()?;
            self.parse_tokens(&[user_keyword])?;
            return Ok((privilege, Some(on)));
        }
        if privilege == Privilege::All && tok == user_keyword {
            return Ok((privilege, None));
        }
        if privilege != Privilege::All {
            return Err(ParseError::new(tokstr(tok, &lit), &["ON"], pos));
        }
        Err(ParseError::new(
            tokstr(tok, &lit),
            &["ON", user_keyword.as_str()],
            pos,
        ))
    }

    pub(crate) fn parse_grant_statement(&mut self) -> Result<Statement, ParseError> {
        let (privilege, on) = self.parse_privilege_target(Token::To)?;
        let user = self.parse_ident()?;
        Ok(match on {
            Some(on) => Statement::Grant(GrantStatement { privilege, on, user }),
            None => Statement::GrantAdmin(GrantAdminStatement { user }),
        })
    }

    pub(crate) fn parse_revoke_statement(&mut self) -> Result<Statement, ParseError> {
        let (privilege, on) = self.parse_privilege_target(Token::From)?;
        let user = self.parse_ident()?;
        Ok(match on {
            Some(on) => Statement::Revoke(RevokeStatement { privilege, on, user }),
            None => Statement::RevokeAdmin(RevokeAdminStatement { user }),
        })
    }

    // Queries, subscriptions and diagnostics

    pub(crate) fn parse_kill_query_statement(&mut self) -> Result<Statement, ParseError> {
        let query_id = self.parse_uint64()?;
        let host = if self.parse_optional_tokens(&[Token::On])? {
            self.parse_ident()?
        } else {
            String::new()
        };
        Ok(Statement::KillQuery(KillQueryStatement { query_id, host }))
    }

    pub(crate) fn parse_explain_statement(&mut self) -> Result<Statement, ParseError> {
        let analyze = self.parse_optional_tokens(&[Token::Analyze])?;
        let verbose = self.parse_optional_tokens(&[Token::Verbose])?;

        let (tok, pos, lit) = self.scan_ignore_whitespace();
        if tok != Token::Select {
            return Err(ParseError::new(tokstr(tok, &lit), &["SELECT"], pos));
        }
        let statement = self.parse_select_statement(TargetRequirement::NotRequired)?;
        Ok(Statement::Explain(ExplainStatement {
            statement: Box::new(statement),
            analyze,
            verbose,
        }))
    }

    pub(crate) fn parse_create_subscription_statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;

        let (tok, pos, lit) = self.scan();
        if tok != Token::Dot {
            return Err(ParseError::new(tokstr(tok, &lit), &["."], pos));
        }
        let retention_policy = self.parse_ident()?;

        self.parse_tokens(&[Token::Destinations])?;
        let (tok, pos, lit) = self.scan_ignore_whitespace();
        let mode = match tok {
            Token::All | Token::Any => tok.as_str().to_string(),
            _ => return Err(ParseError::new(tokstr(tok, &lit), &["ALL", "ANY"], pos)),
        };
        let destinations = self.parse_string_list()?;

        Ok(Statement::CreateSubscription(CreateSubscriptionStatement {
            name,
            database,
            retention_policy,
            destinations,
            mode,
        }))
    }

    pub(crate) fn parse_drop_subscription_statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;

        let (tok, pos, lit) = self.scan();
        if tok != Token::Dot {
            return Err(ParseError::new(tokstr(tok, &lit), &["."], pos));
        }
        let retention_policy = self.parse_ident()?;

        Ok(Statement::DropSubscription(DropSubscriptionStatement {
            name,
            database,
            retention_policy,
        }))
    }

    /// Optional `FOR 'module'`
    fn parse_optional_module(&mut self) -> Result<String, ParseError> {
        if self.parse_optional_tokens(&[Token::For])? {
            self.parse_string()
        } else {
            Ok(String::new())
        }
    }

    pub(crate) fn parse_show_stats_statement(&mut self) -> Result<Statement, ParseError> {
        let module = self.parse_optional_module()?;
        Ok(Statement::ShowStats(ShowStatsStatement { module }))
    }

    pub(crate) fn parse_show_diagnostics_statement(&mut self) -> Result<Statement, ParseError> {
        let module = self.parse_optional_module()?;
        Ok(Statement::ShowDiagnostics(ShowDiagnosticsStatement { module }))
    }

    // Continuous queries

    pub(crate) fn parse_create_continuous_query_statement(
        &mut self,
    ) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;

        let (mut resample_every, mut resample_for) = (0, 0);
        if self.parse_optional_tokens(&[Token::Resample])? {
            let every = self.parse_optional_tokens(&[Token::Every])?;
            if every {
                resample_every = self.parse_duration_value()?;
            }
            let for_ = self.parse_optional_tokens(&[Token::For])?;
            if for_ {
                resample_for = self.parse_duration_value()?;
            }
            if !every && !for_ {
                let (tok, pos, lit) = self.scan_ignore_whitespace();
                return Err(ParseError::new(tokstr(tok, &lit), &["EVERY", "FOR"], pos));
            }
        }

        self.parse_tokens(&[Token::Begin, Token::Select])?;
        let source = self.parse_select_statement(TargetRequirement::Required)?;

        if !source.is_raw_query {
            let interval = source.group_by_interval();
            if !matches!(interval, Ok(d) if d != 0) {
                // Report against the last token of the query
                self.unscan();
                self.unscan();
                let (tok, pos, lit) = self.scan_ignore_whitespace();
                let mut expected = vec!["GROUP BY time(...)".to_string()];
                if let Err(e) = interval {
                    expected.push(e.to_string());
                }
                return Err(ParseError::with_expected(tokstr(tok, &lit), expected, pos));
            }
        }

        self.parse_tokens(&[Token::End])?;

        let stmt = CreateContinuousQueryStatement {
            name,
            database,
            source: Box::new(source),
            resample_every,
            resample_for,
        };
        stmt.validate()?;
        Ok(Statement::CreateContinuousQuery(stmt))
    }

    pub(crate) fn parse_drop_continuous_query_statement(&mut self) -> Result<Statement, ParseError> {
        let name = self.parse_ident()?;
        self.parse_tokens(&[Token::On])?;
        let database = self.parse_ident()?;
        Ok(Statement::DropContinuousQuery(DropContinuousQueryStatement { name, database }))
    }
}

impl CreateContinuousQueryStatement {
    /// The resample window must cover at least one GROUP BY interval, and at
    /// least one `EVERY` period when that is longer.
    pub fn validate(&self) -> Result<(), ParseError> {
        let mut interval = self
            .source
            .group_by_interval()
            .map_err(|e| ParseError::plain(e.to_string()))?;

        if self.resample_for != 0 {
            if self.resample_every > interval {
                interval = self.resample_every;
            }
            if interval > self.resample_for {
                return Err(ParseError::plain(format!(
                    "FOR duration must be >= GROUP BY time duration: must be a minimum of {}, got {}",
                    format_duration(interval),
                    format_duration(self.resample_for)
                )));
            }
        }
        Ok(())
    }
}

/// Dedicated errors for a string literal the scanner could not finish
fn bad_string(tok: Token, pos: Pos, lit: &str) -> Option<ParseError> {
    match tok {
        Token::BadString => Some(ParseError::message("found unterminated string", pos)),
        Token::BadEscape => Some(ParseError::message(format!("bad escape: {}", lit), pos)),
        _ => None,
    }
}

/// Attach `op rhs` below every operator on the right spine of `node` that
/// binds more loosely than `op`.
fn splice(node: Expr, op: Token, rhs: Expr) -> Expr {
    match node {
        Expr::Binary(b) if b.op.precedence() < op.precedence() => {
            let BinaryExpr { op: parent, lhs, rhs: right } = *b;
            Expr::binary(parent, lhs, splice(right, op, rhs))
        }
        other => Expr::binary(op, other, rhs),
    }
}

/// A comparison or logical operator used in a field. The last one found in
/// evaluation order is reported.
fn condition_operator(expr: &Expr) -> Option<Token> {
    match expr {
        Expr::Binary(b) => {
            if matches!(
                b.op,
                Token::Eq
                    | Token::Neq
                    | Token::EqRegex
                    | Token::NeqRegex
                    | Token::Lt
                    | Token::Lte
                    | Token::Gt
                    | Token::Gte
                    | Token::And
                    | Token::Or
            ) {
                return Some(b.op);
            }
            condition_operator(&b.rhs).or_else(|| condition_operator(&b.lhs))
        }
        Expr::Paren(inner) => condition_operator(inner),
        Expr::Call(call) => call.args.iter().rev().find_map(condition_operator),
        _ => None,
    }
}
