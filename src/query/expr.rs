//! Expression tree
//!
//! Every expression is one variant of [`Expr`]. Literals, variable
//! references, calls and operators share the enum so passes can match on the
//! whole tree at once.
//!
//! `Display` renders canonical query text: parsing the output yields the same
//! tree.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::data_type::DataType;
use super::duration::format_duration;
use super::quote::{quote_ident, quote_string};
use super::timestamp::format_rfc3339_nano;
use super::token::Token;
use super::walk::{walk, Node, Visitor};

/// An expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary(Box<BinaryExpr>),
    Paren(Box<Expr>),
    Call(Call),
    VarRef(VarRef),
    /// `DISTINCT name`
    Distinct(String),
    Wildcard(WildcardType),
    /// A `$name` placeholder kept in the tree
    BoundParameter(String),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Number(f64),
    String(String),
    /// Duration in nanoseconds
    Duration(i64),
    Time(DateTime<Utc>),
    Regex(RegexLiteral),
    /// List of tag keys, as in `WITH KEY IN (a, b)`
    List(Vec<String>),
    Nil,
}

/// `lhs op rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: Token,
    pub lhs: Expr,
    pub rhs: Expr,
}

/// A function call such as `mean(value)`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
}

/// A reference to a field or tag, optionally cast with `::type`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarRef {
    pub val: String,
    pub data_type: DataType,
}

/// Which keys a `*` expands to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardType {
    All,
    Field,
    Tag,
}

/// A compiled regular expression literal
#[derive(Debug, Clone)]
pub struct RegexLiteral(pub Regex);

impl RegexLiteral {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s)
    }
}

impl PartialEq for RegexLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for RegexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str().replace('/', "\\/"))
    }
}

impl Expr {
    pub fn binary(op: Token, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary(Box::new(BinaryExpr { op, lhs, rhs }))
    }

    pub fn paren(expr: Expr) -> Self {
        Self::Paren(Box::new(expr))
    }

    pub fn var_ref(val: impl Into<String>) -> Self {
        Self::VarRef(VarRef::new(val))
    }

    pub fn typed_ref(val: impl Into<String>, data_type: DataType) -> Self {
        Self::VarRef(VarRef {
            val: val.into(),
            data_type,
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(Call {
            name: name.into(),
            args,
        })
    }

    /// Whether the expression is a literal value
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Boolean(_)
                | Self::Integer(_)
                | Self::Unsigned(_)
                | Self::Number(_)
                | Self::String(_)
                | Self::Duration(_)
                | Self::Time(_)
                | Self::Regex(_)
                | Self::List(_)
                | Self::BoundParameter(_)
                | Self::Nil
        )
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::Boolean(false))
    }

    pub fn as_var_ref(&self) -> Option<&VarRef> {
        match self {
            Self::VarRef(r) => Some(r),
            _ => None,
        }
    }

    /// Strip any number of enclosing parentheses
    pub fn unparen(&self) -> &Expr {
        let mut expr = self;
        while let Self::Paren(inner) = expr {
            expr = inner;
        }
        expr
    }
}

impl VarRef {
    pub fn new(val: impl Into<String>) -> Self {
        Self {
            val: val.into(),
            data_type: DataType::Unknown,
        }
    }
}

impl Call {
    /// Innermost first argument, following nested calls
    pub fn innermost_arg(&self) -> Option<&Expr> {
        let mut arg = self.args.first()?;
        while let Expr::Call(inner) = arg {
            arg = inner.args.first()?;
        }
        Some(arg)
    }
}

/// Format a float so that it scans back as a float.
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let s = format!("{}", v);
    if s.contains('.') {
        s
    } else {
        format!("{}.0", s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(b) => write!(f, "{} {} {}", b.lhs, b.op, b.rhs),
            Self::Paren(e) => write!(f, "({})", e),
            Self::Call(c) => write!(f, "{}", c),
            Self::VarRef(r) => write!(f, "{}", r),
            Self::Distinct(val) => write!(f, "DISTINCT {}", val),
            Self::Wildcard(WildcardType::All) => f.write_str("*"),
            Self::Wildcard(WildcardType::Field) => f.write_str("*::field"),
            Self::Wildcard(WildcardType::Tag) => f.write_str("*::tag"),
            Self::BoundParameter(name) => write!(f, "${}", quote_ident(&[name])),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Number(v) => f.write_str(&format_number(*v)),
            Self::String(s) => f.write_str(&quote_string(s)),
            Self::Duration(d) => f.write_str(&format_duration(*d)),
            Self::Time(t) => write!(f, "'{}'", format_rfc3339_nano(t)),
            Self::Regex(r) => write!(f, "{}", r),
            Self::List(vals) => {
                let quoted: Vec<String> = vals.iter().map(|v| quote_ident(&[v])).collect();
                write!(f, "({})", quoted.join(", "))
            }
            Self::Nil => f.write_str("nil"),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote_ident(&[&self.val]))?;
        if self.data_type != DataType::Unknown {
            write!(f, "::{}", self.data_type)?;
        }
        Ok(())
    }
}

/// A projected expression in a SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Field {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output name: the alias, else the call or variable name
    pub fn name(&self) -> String {
        if let Some(alias) = self.alias.as_deref().filter(|a| !a.is_empty()) {
            return alias.to_string();
        }
        expr_field_name(&self.expr)
    }
}

fn expr_field_name(expr: &Expr) -> String {
    match expr {
        Expr::Call(c) => c.name.clone(),
        Expr::Binary(b) => binary_expr_name(b),
        Expr::Paren(inner) => expr_field_name(inner),
        Expr::VarRef(r) => r.val.clone(),
        _ => String::new(),
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alias.as_deref().filter(|a| !a.is_empty()) {
            Some(alias) => write!(f, "{} AS {}", self.expr, quote_ident(&[alias])),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// A GROUP BY expression
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub expr: Expr,
}

impl Dimension {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// Split dimensions into the `time()` interval and the tag names.
pub fn normalize_dimensions(dimensions: &[Dimension]) -> (i64, Vec<String>) {
    let mut interval = 0;
    let mut tags = Vec::new();
    for dim in dimensions {
        match &dim.expr {
            Expr::Call(call) => {
                if let Some(Expr::Duration(d)) = call.args.first() {
                    interval = *d;
                }
            }
            Expr::VarRef(r) => tags.push(r.val.clone()),
            _ => {}
        }
    }
    (interval, tags)
}

pub(crate) fn join_display<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

struct BinaryExprNames(Vec<String>);

impl Visitor for BinaryExprNames {
    fn visit(&mut self, node: Node<'_>) -> bool {
        match node {
            Node::Expr(Expr::VarRef(r)) => {
                self.0.push(r.val.clone());
                true
            }
            Node::Expr(Expr::Call(c)) => {
                self.0.push(c.name.clone());
                false
            }
            _ => true,
        }
    }
}

/// Name a binary expression by joining the variables and calls in it with `_`.
pub fn binary_expr_name(expr: &BinaryExpr) -> String {
    let mut names = BinaryExprNames(Vec::new());
    walk(&mut names, Node::Expr(&expr.lhs));
    walk(&mut names, Node::Expr(&expr.rhs));
    names.0.join("_")
}

/// Identifier names used by an expression, one level into calls
pub(crate) fn walk_names(expr: &Expr) -> Vec<String> {
    match expr {
        Expr::VarRef(r) => vec![r.val.clone()],
        Expr::Call(c) => c
            .args
            .iter()
            .filter_map(|a| a.as_var_ref().map(|r| r.val.clone()))
            .collect(),
        Expr::Binary(b) => {
            let mut names = walk_names(&b.lhs);
            names.extend(walk_names(&b.rhs));
            names
        }
        Expr::Paren(inner) => walk_names(inner),
        _ => Vec::new(),
    }
}

fn walk_refs(expr: &Expr, refs: &mut Vec<VarRef>) {
    match expr {
        Expr::VarRef(r) => refs.push(r.clone()),
        Expr::Call(c) => refs.extend(c.args.iter().filter_map(|a| a.as_var_ref().cloned())),
        Expr::Binary(b) => {
            walk_refs(&b.lhs, refs);
            walk_refs(&b.rhs, refs);
        }
        Expr::Paren(inner) => walk_refs(inner, refs),
        _ => {}
    }
}

/// Distinct non-`time` variable references in an expression, sorted by name then type.
pub fn expr_names(expr: &Expr) -> Vec<VarRef> {
    let mut refs = Vec::new();
    walk_refs(expr, &mut refs);
    refs.retain(|r| r.val != "time");
    refs.sort();
    refs.dedup();
    refs
}

/// Whether a condition compares `time` on its left-hand side anywhere in an AND/OR tree.
pub fn has_time_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Binary(b) => {
            if b.op == Token::And || b.op == Token::Or {
                return has_time_expr(&b.lhs) || has_time_expr(&b.rhs);
            }
            matches!(&b.lhs, Expr::VarRef(r) if r.val.eq_ignore_ascii_case("time"))
        }
        Expr::Paren(inner) => has_time_expr(inner),
        _ => false,
    }
}

struct ContainsVarRef(bool);

impl Visitor for ContainsVarRef {
    fn visit(&mut self, node: Node<'_>) -> bool {
        match node {
            Node::Expr(Expr::Call(_)) => false,
            Node::Expr(Expr::VarRef(_)) => {
                self.0 = true;
                true
            }
            _ => true,
        }
    }
}

/// Whether the expression references a variable outside of any call
pub fn contains_var_ref(expr: &Expr) -> bool {
    let mut v = ContainsVarRef(false);
    walk(&mut v, Node::Expr(expr));
    v.0
}

/// Whether the expression is a call to a selector function
pub fn is_selector(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Call(c) if matches!(
            c.name.as_str(),
            "first" | "last" | "min" | "max" | "percentile" | "sample" | "top" | "bottom"
        )
    )
}
