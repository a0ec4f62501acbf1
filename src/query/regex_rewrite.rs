//! Rewriting anchored regex conditions into plain comparisons
//!
//! `host =~ /^(foo|bar)$/` only matches two values, so it becomes
//! `host = 'foo' OR host = 'bar'`, which an index can answer directly. A
//! regex is rewritten only when it is anchored at both ends and expands to
//! at most [`MAX_LITERALS`] strings. Case-insensitive regexes are left
//! alone.

use regex_syntax::ast::{self, Ast, Flag, FlagsItemKind, GroupKind};
use regex_syntax::hir::{Class, Hir, HirKind, Look};
use tracing::trace;

use super::expr::{BinaryExpr, Expr};
use super::select::SelectStatement;
use super::token::Token;
use super::walk::rewrite_func;

/// Upper bound on the number of strings a regex may expand to
pub const MAX_LITERALS: usize = 100;

impl SelectStatement {
    /// Replace `=~` and `!~` conditions whose regex matches a small, fixed
    /// set of strings with `=` and `!=` comparisons.
    pub fn rewrite_regex_conditions(&mut self) {
        let Some(cond) = self.condition.take() else {
            return;
        };
        let cond = rewrite_func(cond, &mut rewrite_regex_condition);
        self.condition = Some(match cond {
            Expr::Paren(inner) => *inner,
            other => other,
        });
    }
}

fn rewrite_regex_condition(expr: Expr) -> Expr {
    let b = match expr {
        Expr::Binary(b) if matches!(b.op, Token::EqRegex | Token::NeqRegex) => b,
        other => return other,
    };
    let vals = match &b.rhs {
        Expr::Regex(re) => match_exact_regex(re.as_str()),
        _ => None,
    };
    let Some(vals) = vals else {
        return Expr::Binary(b);
    };

    let BinaryExpr { op, lhs, rhs } = *b;
    trace!(condition = %Expr::binary(op, lhs.clone(), rhs), values = vals.len(), "rewriting regex condition");

    let (op, join) = if op == Token::EqRegex {
        (Token::Eq, Token::Or)
    } else {
        (Token::Neq, Token::And)
    };

    let mut vals = vals.into_iter();
    let first = match vals.next() {
        Some(v) => v,
        None => return Expr::binary(op, lhs, Expr::String(String::new())),
    };
    let mut out = Expr::binary(op, lhs.clone(), Expr::String(first));
    let mut many = false;
    for v in vals {
        many = true;
        out = Expr::binary(join, out, Expr::binary(op, lhs.clone(), Expr::String(v)));
    }
    if many {
        Expr::paren(out)
    } else {
        out
    }
}

/// Strings matched by `pattern` when it is anchored with `^...$` and its
/// body expands to a bounded set of literals. `^$` matches no literal at all
/// and yields an empty list.
pub fn match_exact_regex(pattern: &str) -> Option<Vec<String>> {
    if folds_case(pattern) {
        return None;
    }

    let hir = regex_syntax::Parser::new().parse(pattern).ok()?;
    let HirKind::Concat(subs) = hir.kind() else {
        return None;
    };
    if subs.len() < 2 {
        return None;
    }

    let starts = matches!(
        subs[0].kind(),
        HirKind::Look(Look::Start | Look::StartLF | Look::StartCRLF)
    );
    let ends = matches!(
        subs[subs.len() - 1].kind(),
        HirKind::Look(Look::End | Look::EndLF | Look::EndCRLF)
    );
    if !starts || !ends {
        return None;
    }

    let body = &subs[1..subs.len() - 1];
    if body.is_empty() {
        return Some(Vec::new());
    }
    expand_concat(body)
}

fn expand(hir: &Hir) -> Option<Vec<String>> {
    match hir.kind() {
        HirKind::Literal(lit) => Some(vec![String::from_utf8(lit.0.to_vec()).ok()?]),
        HirKind::Capture(cap) => expand(&cap.sub),
        HirKind::Concat(subs) => expand_concat(subs),
        HirKind::Class(Class::Unicode(cls)) => {
            let size: usize = cls
                .ranges()
                .iter()
                .map(|r| (r.end() as usize) - (r.start() as usize) + 1)
                .sum();
            if size > MAX_LITERALS {
                return None;
            }
            Some(
                cls.ranges()
                    .iter()
                    .flat_map(|r| r.start()..=r.end())
                    .map(String::from)
                    .collect(),
            )
        }
        HirKind::Class(Class::Bytes(cls)) => {
            let size: usize = cls
                .ranges()
                .iter()
                .map(|r| (r.end() as usize) - (r.start() as usize) + 1)
                .sum();
            if size > MAX_LITERALS {
                return None;
            }
            cls.ranges()
                .iter()
                .flat_map(|r| r.start()..=r.end())
                .map(|b| b.is_ascii().then(|| char::from(b).to_string()))
                .collect()
        }
        HirKind::Alternation(subs) => {
            let mut names = Vec::new();
            for sub in subs {
                names.extend(expand(sub)?);
            }
            (names.len() <= MAX_LITERALS).then_some(names)
        }
        HirKind::Repetition(rep) if rep.max == Some(rep.min) => {
            let vals = expand(&rep.sub)?;
            let mut names = vec![String::new()];
            for _ in 0..rep.min {
                names = cross(&names, &vals)?;
            }
            Some(names)
        }
        _ => None,
    }
}

fn expand_concat(subs: &[Hir]) -> Option<Vec<String>> {
    let mut names = vec![String::new()];
    for sub in subs {
        names = cross(&names, &expand(sub)?)?;
    }
    Some(names)
}

fn cross(names: &[String], vals: &[String]) -> Option<Vec<String>> {
    if names.len() * vals.len() > MAX_LITERALS {
        return None;
    }
    Some(
        names
            .iter()
            .flat_map(|n| vals.iter().map(move |v| format!("{}{}", n, v)))
            .collect(),
    )
}

/// Whether the pattern turns on case-insensitive matching anywhere. A
/// pattern that does not parse is treated as case-insensitive.
fn folds_case(pattern: &str) -> bool {
    match ast::parse::Parser::new().parse(pattern) {
        Ok(ast) => ast_folds_case(&ast),
        Err(_) => true,
    }
}

fn ast_folds_case(ast: &Ast) -> bool {
    match ast {
        Ast::Flags(set) => flags_fold_case(&set.flags),
        Ast::Group(group) => {
            if let GroupKind::NonCapturing(flags) = &group.kind {
                if flags_fold_case(flags) {
                    return true;
                }
            }
            ast_folds_case(&group.ast)
        }
        Ast::Repetition(rep) => ast_folds_case(&rep.ast),
        Ast::Alternation(alt) => alt.asts.iter().any(ast_folds_case),
        Ast::Concat(concat) => concat.asts.iter().any(ast_folds_case),
        _ => false,
    }
}

fn flags_fold_case(flags: &ast::Flags) -> bool {
    let mut negated = false;
    for item in &flags.items {
        match &item.kind {
            FlagsItemKind::Negation => negated = true,
            FlagsItemKind::Flag(Flag::CaseInsensitive) if !negated => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Statement;
    use crate::query::parser::parse_statement;

    fn rewrite(cond: &str) -> String {
        let q = format!("SELECT v FROM cpu WHERE {}", cond);
        let Statement::Select(mut stmt) = parse_statement(&q).unwrap() else {
            panic!("expected select");
        };
        stmt.rewrite_regex_conditions();
        stmt.condition.map(|c| c.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_alternation_becomes_or_chain() {
        assert_eq!(rewrite("host =~ /^(foo|bar)$/"), "host = 'foo' OR host = 'bar'");
        assert_eq!(rewrite("host !~ /^(foo|bar)$/"), "host != 'foo' AND host != 'bar'");
    }

    #[test]
    fn test_single_literal() {
        assert_eq!(rewrite("host =~ /^foo$/"), "host = 'foo'");
        assert_eq!(rewrite("host !~ /^foo$/"), "host != 'foo'");
        assert_eq!(rewrite("host =~ /^$/"), "host = ''");
        assert_eq!(rewrite("host =~ /^a{3}$/"), "host = 'aaa'");
    }

    #[test]
    fn test_classes_expand() {
        assert_eq!(
            rewrite("host =~ /^server[12]$/"),
            "host = 'server1' OR host = 'server2'"
        );
    }

    #[test]
    fn test_nested_condition_keeps_parens() {
        assert_eq!(
            rewrite("region = 'west' AND host =~ /^(a|b)$/"),
            "region = 'west' AND (host = 'a' OR host = 'b')"
        );
    }

    #[test]
    fn test_unrewritable_regexes_are_unchanged() {
        assert_eq!(rewrite("host =~ /^foo.*$/"), "host =~ /^foo.*$/");
        assert_eq!(rewrite("host =~ /foo/"), "host =~ /foo/");
        assert_eq!(rewrite("host =~ /^foo/"), "host =~ /^foo/");
        assert_eq!(rewrite("host =~ /^(?i)foo$/"), "host =~ /^(?i)foo$/");
        assert_eq!(rewrite("host =~ /^[a-z][a-z]$/"), "host =~ /^[a-z][a-z]$/");
    }

    #[test]
    fn test_match_exact_regex() {
        assert_eq!(match_exact_regex("^(a|b)c$"), Some(vec!["ac".to_string(), "bc".to_string()]));
        assert_eq!(match_exact_regex("^$"), Some(vec![]));
        assert_eq!(match_exact_regex("^(?i:x)$"), None);
        assert_eq!(match_exact_regex("^(?-i:x)$"), Some(vec!["x".to_string()]));
        assert_eq!(match_exact_regex("^\\d$"), None);
        assert_eq!(match_exact_regex("("), None);
    }
}
