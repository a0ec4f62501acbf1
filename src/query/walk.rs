//! Tree traversal and rewriting
//!
//! [`walk`] visits nodes depth-first, parent before children. A [`Visitor`]
//! returns `false` from `visit` to skip the children of the current node.
//!
//! Rewriting consumes the tree and rebuilds it bottom-up:
//! - [`rewrite_func`] maps every expression, leaves first.
//! - [`rewrite_expr`] does the same but lets the callback delete nodes; a
//!   binary expression with one deleted side collapses to the other side.
//! - [`Rewriter`] hooks into statements, fields, dimensions and sources.

use super::ast::{Cardinality, Query, Statement};
use super::expr::{BinaryExpr, Call, Dimension, Expr, Field};
use super::select::{SelectStatement, SortField, Target};
use super::source::{Measurement, Source};

/// A borrowed node of any kind
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Query(&'a Query),
    Statement(&'a Statement),
    Select(&'a SelectStatement),
    Field(&'a Field),
    Dimension(&'a Dimension),
    Source(&'a Source),
    Measurement(&'a Measurement),
    Target(&'a Target),
    SortField(&'a SortField),
    Expr(&'a Expr),
}

/// Callback for [`walk`]
pub trait Visitor {
    /// Visit a node; return `false` to skip its children.
    fn visit(&mut self, node: Node<'_>) -> bool;
}

struct FnVisitor<F>(F);

impl<F: FnMut(Node<'_>)> Visitor for FnVisitor<F> {
    fn visit(&mut self, node: Node<'_>) -> bool {
        (self.0)(node);
        true
    }
}

/// Walk every node under `node` with a closure.
pub fn walk_fn<F: FnMut(Node<'_>)>(node: Node<'_>, f: F) {
    walk(&mut FnVisitor(f), node);
}

/// Depth-first traversal of `node` and its children
pub fn walk<V: Visitor + ?Sized>(v: &mut V, node: Node<'_>) {
    if !v.visit(node) {
        return;
    }

    match node {
        Node::Query(q) => {
            for stmt in &q.statements {
                walk(v, Node::Statement(stmt));
            }
        }
        Node::Statement(stmt) => walk_statement(v, stmt),
        Node::Select(s) => {
            for f in &s.fields {
                walk(v, Node::Field(f));
            }
            if let Some(target) = &s.target {
                walk(v, Node::Target(target));
            }
            for d in &s.dimensions {
                walk(v, Node::Dimension(d));
            }
            walk_sources(v, &s.sources);
            walk_condition(v, s.condition.as_ref());
            walk_sort_fields(v, &s.sort_fields);
        }
        Node::Field(f) => walk(v, Node::Expr(&f.expr)),
        Node::Dimension(d) => walk(v, Node::Expr(&d.expr)),
        Node::Source(Source::Measurement(m)) => walk(v, Node::Measurement(m)),
        Node::Source(Source::SubQuery(s)) => walk(v, Node::Select(s)),
        Node::Target(t) => walk(v, Node::Measurement(&t.measurement)),
        Node::Measurement(_) | Node::SortField(_) => {}
        Node::Expr(expr) => match expr {
            Expr::Binary(b) => {
                walk(v, Node::Expr(&b.lhs));
                walk(v, Node::Expr(&b.rhs));
            }
            Expr::Paren(inner) => walk(v, Node::Expr(inner)),
            Expr::Call(c) => {
                for arg in &c.args {
                    walk(v, Node::Expr(arg));
                }
            }
            _ => {}
        },
    }
}

fn walk_sources<V: Visitor + ?Sized>(v: &mut V, sources: &[Source]) {
    for src in sources {
        walk(v, Node::Source(src));
    }
}

fn walk_condition<V: Visitor + ?Sized>(v: &mut V, cond: Option<&Expr>) {
    if let Some(cond) = cond {
        walk(v, Node::Expr(cond));
    }
}

fn walk_sort_fields<V: Visitor + ?Sized>(v: &mut V, fields: &[SortField]) {
    for f in fields {
        walk(v, Node::SortField(f));
    }
}

fn walk_statement<V: Visitor + ?Sized>(v: &mut V, stmt: &Statement) {
    match stmt {
        Statement::Select(s) => walk(v, Node::Select(s)),
        Statement::Explain(s) => walk(v, Node::Select(&s.statement)),
        Statement::CreateContinuousQuery(s) => walk(v, Node::Select(&s.source)),
        Statement::DeleteSeries(s) => {
            walk_sources(v, &s.sources);
            walk_condition(v, s.condition.as_ref());
        }
        Statement::DropSeries(s) => {
            walk_sources(v, &s.sources);
            walk_condition(v, s.condition.as_ref());
        }
        Statement::ShowSeries(s) => {
            walk_sources(v, &s.sources);
            walk_condition(v, s.condition.as_ref());
            walk_sort_fields(v, &s.sort_fields);
        }
        Statement::ShowSeriesCardinality(s) => walk_cardinality(v, &s.0),
        Statement::ShowMeasurementCardinality(s) => walk_cardinality(v, &s.0),
        Statement::ShowFieldKeyCardinality(s) => walk_cardinality(v, &s.0),
        Statement::ShowTagKeyCardinality(s) => walk_cardinality(v, &s.0),
        Statement::ShowTagValuesCardinality(s) => walk_cardinality(v, &s.cardinality),
        Statement::ShowMeasurements(s) => {
            if let Some(src) = &s.source {
                walk(v, Node::Source(src));
            }
            walk_condition(v, s.condition.as_ref());
            walk_sort_fields(v, &s.sort_fields);
        }
        Statement::ShowFieldKeys(s) => {
            walk_sources(v, &s.sources);
            walk_sort_fields(v, &s.sort_fields);
        }
        Statement::ShowTagKeys(s) => {
            walk_sources(v, &s.sources);
            walk_condition(v, s.condition.as_ref());
            walk_sort_fields(v, &s.sort_fields);
        }
        Statement::ShowTagValues(s) => {
            walk_sources(v, &s.sources);
            walk_condition(v, s.condition.as_ref());
            walk_sort_fields(v, &s.sort_fields);
        }
        _ => {}
    }
}

fn walk_cardinality<V: Visitor + ?Sized>(v: &mut V, c: &Cardinality) {
    walk_sources(v, &c.sources);
    walk_condition(v, c.condition.as_ref());
}

/// Rebuild an expression tree bottom-up, applying `f` to every node after
/// its children have been rewritten.
pub fn rewrite_func<F: FnMut(Expr) -> Expr>(expr: Expr, f: &mut F) -> Expr {
    let expr = match expr {
        Expr::Binary(b) => {
            let BinaryExpr { op, lhs, rhs } = *b;
            let lhs = rewrite_func(lhs, f);
            let rhs = rewrite_func(rhs, f);
            Expr::binary(op, lhs, rhs)
        }
        Expr::Paren(inner) => Expr::paren(rewrite_func(*inner, f)),
        Expr::Call(Call { name, args }) => Expr::Call(Call {
            name,
            args: args.into_iter().map(|a| rewrite_func(a, f)).collect(),
        }),
        other => other,
    };
    f(expr)
}

/// Rebuild an expression tree bottom-up where `f` may delete nodes by
/// returning `None`.
///
/// A binary expression that loses one operand is replaced by the surviving
/// operand, and one that loses both is deleted. A parenthesized expression
/// whose contents are deleted is deleted too. Deleted call arguments become
/// `nil`.
pub fn rewrite_expr<F: FnMut(Expr) -> Option<Expr>>(expr: Expr, f: &mut F) -> Option<Expr> {
    let expr = match expr {
        Expr::Binary(b) => {
            let BinaryExpr { op, lhs, rhs } = *b;
            match (rewrite_expr(lhs, f), rewrite_expr(rhs, f)) {
                (Some(lhs), Some(rhs)) => Expr::binary(op, lhs, rhs),
                (Some(lhs), None) => lhs,
                (None, Some(rhs)) => rhs,
                (None, None) => return None,
            }
        }
        Expr::Paren(inner) => Expr::paren(rewrite_expr(*inner, f)?),
        Expr::Call(Call { name, args }) => Expr::Call(Call {
            name,
            args: args
                .into_iter()
                .map(|a| rewrite_expr(a, f).unwrap_or(Expr::Nil))
                .collect(),
        }),
        other => other,
    };
    f(expr)
}

/// Hooks for [`rewrite_statement`]. Each hook receives a node whose children
/// have already been rewritten. The defaults leave nodes unchanged.
pub trait Rewriter {
    fn rewrite_expr(&mut self, expr: Expr) -> Expr {
        expr
    }

    fn rewrite_field(&mut self, field: Field) -> Field {
        field
    }

    fn rewrite_dimension(&mut self, dimension: Dimension) -> Dimension {
        dimension
    }

    fn rewrite_source(&mut self, source: Source) -> Source {
        source
    }

    fn rewrite_select(&mut self, stmt: SelectStatement) -> SelectStatement {
        stmt
    }

    fn rewrite_statement(&mut self, stmt: Statement) -> Statement {
        stmt
    }
}

/// Rewrite every statement of a query.
pub fn rewrite_query<R: Rewriter + ?Sized>(r: &mut R, query: Query) -> Query {
    Query {
        statements: query
            .statements
            .into_iter()
            .map(|s| rewrite_statement(r, s))
            .collect(),
    }
}

/// Rewrite a statement. Only SELECT statements have children that are
/// rewritten; every statement is passed to [`Rewriter::rewrite_statement`].
pub fn rewrite_statement<R: Rewriter + ?Sized>(r: &mut R, stmt: Statement) -> Statement {
    let stmt = match stmt {
        Statement::Select(s) => Statement::Select(Box::new(rewrite_select(r, *s))),
        other => other,
    };
    r.rewrite_statement(stmt)
}

/// Rewrite a SELECT statement: fields, dimensions, sources and condition.
pub fn rewrite_select<R: Rewriter + ?Sized>(r: &mut R, mut stmt: SelectStatement) -> SelectStatement {
    stmt.fields = std::mem::take(&mut stmt.fields)
        .into_iter()
        .map(|f| {
            let f = Field {
                expr: rewrite_func(f.expr, &mut |e| r.rewrite_expr(e)),
                alias: f.alias,
            };
            r.rewrite_field(f)
        })
        .collect();

    stmt.dimensions = std::mem::take(&mut stmt.dimensions)
        .into_iter()
        .map(|d| {
            let d = Dimension::new(rewrite_func(d.expr, &mut |e| r.rewrite_expr(e)));
            r.rewrite_dimension(d)
        })
        .collect();

    stmt.sources = std::mem::take(&mut stmt.sources)
        .into_iter()
        .map(|src| {
            let src = match src {
                Source::SubQuery(inner) => Source::SubQuery(Box::new(rewrite_select(r, *inner))),
                other => other,
            };
            r.rewrite_source(src)
        })
        .collect();

    stmt.condition = stmt
        .condition
        .take()
        .map(|c| rewrite_func(c, &mut |e| r.rewrite_expr(e)));

    r.rewrite_select(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::{parse_expr, parse_statement};
    use crate::query::token::Token;

    #[test]
    fn test_walk_fn_visits_parent_first() {
        let expr = parse_expr("a + b * 2").unwrap();
        let mut seen = Vec::new();
        walk_fn(Node::Expr(&expr), |n| {
            if let Node::Expr(e) = n {
                seen.push(e.to_string());
            }
        });
        assert_eq!(seen, vec!["a + b * 2", "a", "b * 2", "b", "2"]);
    }

    #[test]
    fn test_walk_statement_reaches_subquery_condition() {
        let stmt = parse_statement("SELECT max(v) FROM (SELECT v FROM cpu WHERE host = 'a')").unwrap();
        let mut refs = Vec::new();
        walk_fn(Node::Statement(&stmt), |n| {
            if let Node::Expr(Expr::VarRef(r)) = n {
                refs.push(r.val.clone());
            }
        });
        assert_eq!(refs, vec!["v", "v", "host"]);
    }

    #[test]
    fn test_visitor_can_skip_children() {
        struct Calls(usize);
        impl Visitor for Calls {
            fn visit(&mut self, node: Node<'_>) -> bool {
                if let Node::Expr(Expr::Call(_)) = node {
                    self.0 += 1;
                    return false;
                }
                true
            }
        }

        let expr = parse_expr("max(min(v)) + count(v)").unwrap();
        let mut v = Calls(0);
        walk(&mut v, Node::Expr(&expr));
        assert_eq!(v.0, 2);
    }

    #[test]
    fn test_rewrite_func_replaces_leaves() {
        let expr = parse_expr("a + (b * a)").unwrap();
        let out = rewrite_func(expr, &mut |e| match e {
            Expr::VarRef(r) if r.val == "a" => Expr::Integer(1),
            other => other,
        });
        assert_eq!(out.to_string(), "1 + (b * 1)");
    }

    #[test]
    fn test_rewrite_expr_prunes_deleted_operands() {
        let expr = parse_expr("host = 'a' AND time > 10 AND region = 'west'").unwrap();
        let out = rewrite_expr(expr, &mut |e| match &e {
            Expr::Binary(b) if b.op == Token::Gt => None,
            _ => Some(e),
        });
        assert_eq!(out.unwrap().to_string(), "host = 'a' AND region = 'west'");

        let expr = parse_expr("(time > 10)").unwrap();
        let out = rewrite_expr(expr, &mut |e| match &e {
            Expr::Binary(_) => None,
            _ => Some(e),
        });
        assert!(out.is_none());
    }

    #[test]
    fn test_rewriter_hooks_reach_subqueries() {
        struct Upper;
        impl Rewriter for Upper {
            fn rewrite_expr(&mut self, expr: Expr) -> Expr {
                match expr {
                    Expr::VarRef(mut r) => {
                        r.val = r.val.to_uppercase();
                        Expr::VarRef(r)
                    }
                    other => other,
                }
            }
        }

        let stmt = parse_statement("SELECT a FROM (SELECT b FROM cpu) WHERE c = 1 GROUP BY d").unwrap();
        let out = rewrite_statement(&mut Upper, stmt);
        assert_eq!(
            out.to_string(),
            "SELECT A FROM (SELECT B FROM cpu) WHERE C = 1 GROUP BY D"
        );
    }
}
