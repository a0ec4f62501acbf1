//! Statement dispatch
//!
//! Statements are routed by their leading keywords through a trie instead of
//! one large match. Each edge is a token; a leaf holds the function that parses
//! the rest of the statement. The trie for the whole language is built once on
//! first use and is read-only afterwards.
//!
//! When the scanned token has no edge, the error lists every token registered
//! at that node in registration order, e.g. for `SHOW FOO`:
//!
//! ```text
//! found FOO, expected CONTINUOUS, DATABASES, DIAGNOSTICS, FIELD, ...
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::trace;

use super::ast::{
    DropDatabaseStatement, DropMeasurementStatement, DropUserStatement, ShowGrantsForUserStatement,
    Statement,
};
use super::error::ParseError;
use super::parser::{Parser, TargetRequirement};
use super::token::{tokstr, Token};

/// Parses the remainder of a statement once its keywords are consumed
pub type Handler = fn(&mut Parser) -> Result<Statement, ParseError>;

/// A node in the keyword trie
#[derive(Default)]
pub struct ParseTree {
    handlers: HashMap<Token, Handler>,
    tokens: HashMap<Token, ParseTree>,
    keys: Vec<String>,
}

impl ParseTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend through `toks`, creating nodes as needed.
    ///
    /// # Panics
    ///
    /// Panics if one of the tokens already has a handler at its level.
    pub fn group(&mut self, toks: &[Token]) -> &mut ParseTree {
        let mut node = self;
        for &tok in toks {
            if node.handlers.contains_key(&tok) {
                panic!("conflict for token {}", tok);
            }
            if !node.tokens.contains_key(&tok) {
                node.keys.push(tok.to_string());
            }
            node = node.tokens.entry(tok).or_default();
        }
        node
    }

    /// Register the handler for `tok` at this node.
    ///
    /// # Panics
    ///
    /// Panics if `tok` already has a handler or a subtree here.
    pub fn handle(&mut self, tok: Token, handler: Handler) {
        if self.handlers.contains_key(&tok) || self.tokens.contains_key(&tok) {
            panic!("conflict for token {}", tok);
        }
        self.handlers.insert(tok, handler);
        self.keys.push(tok.to_string());
    }

    /// Follow scanned keywords down the trie and run the handler found there
    pub fn parse(&self, p: &mut Parser) -> Result<Statement, ParseError> {
        let mut node = self;
        loop {
            let (tok, pos, lit) = p.scan_ignore_whitespace();
            if let Some(subtree) = node.tokens.get(&tok) {
                node = subtree;
                continue;
            }
            if let Some(handler) = node.handlers.get(&tok) {
                return handler(p);
            }
            return Err(ParseError::with_expected(tokstr(tok, &lit), node.keys.clone(), pos));
        }
    }

    /// Tokens accepted at this node, in registration order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// The trie for every statement of the language
pub fn language() -> &'static ParseTree {
    static LANGUAGE: OnceLock<ParseTree> = OnceLock::new();
    LANGUAGE.get_or_init(build_language)
}

fn build_language() -> ParseTree {
    trace!("building statement parse tree");
    let mut lang = ParseTree::new();

    lang.handle(Token::Select, |p| {
        let stmt = p.parse_select_statement(TargetRequirement::NotRequired)?;
        Ok(Statement::Select(Box::new(stmt)))
    });
    lang.handle(Token::Delete, |p| p.parse_delete_statement());

    let show = lang.group(&[Token::Show]);
    show.group(&[Token::Continuous])
        .handle(Token::Queries, |_| Ok(Statement::ShowContinuousQueries));
    show.handle(Token::Databases, |_| Ok(Statement::ShowDatabases));
    show.handle(Token::Diagnostics, |p| p.parse_show_diagnostics_statement());
    {
        let field = show.group(&[Token::Field]);
        field.handle(Token::Key, |p| p.parse_show_field_key_cardinality_statement());
        field.handle(Token::Keys, |p| p.parse_show_field_keys_statement());
    }
    show.group(&[Token::Grants]).handle(Token::For, |p| {
        Ok(Statement::ShowGrantsForUser(ShowGrantsForUserStatement {
            name: p.parse_ident()?,
        }))
    });
    show.group(&[Token::Measurement])
        .handle(Token::Exact, |p| p.parse_show_measurement_cardinality_statement(true));
    show.group(&[Token::Measurement])
        .handle(Token::Cardinality, |p| p.parse_show_measurement_cardinality_statement(false));
    show.handle(Token::Measurements, |p| p.parse_show_measurements_statement());
    show.handle(Token::Queries, |_| Ok(Statement::ShowQueries));
    show.group(&[Token::Retention])
        .handle(Token::Policies, |p| p.parse_show_retention_policies_statement());
    show.handle(Token::Series, |p| p.parse_show_series_statement());
    show.handle(Token::Shard, |p| {
        p.parse_tokens(&[Token::Groups])?;
        Ok(Statement::ShowShardGroups)
    });
    show.handle(Token::Shards, |_| Ok(Statement::ShowShards));
    show.handle(Token::Stats, |p| p.parse_show_stats_statement());
    show.handle(Token::Subscriptions, |_| Ok(Statement::ShowSubscriptions));
    {
        let tag = show.group(&[Token::Tag]);
        tag.handle(Token::Key, |p| p.parse_show_tag_key_cardinality_statement());
        tag.handle(Token::Keys, |p| p.parse_show_tag_keys_statement());
        tag.handle(Token::Values, |p| p.parse_show_tag_values_statement());
    }
    show.handle(Token::Users, |_| Ok(Statement::ShowUsers));

    let create = lang.group(&[Token::Create]);
    create
        .group(&[Token::Continuous])
        .handle(Token::Query, |p| p.parse_create_continuous_query_statement());
    create.handle(Token::Database, |p| p.parse_create_database_statement());
    create.handle(Token::User, |p| p.parse_create_user_statement());
    create
        .group(&[Token::Retention])
        .handle(Token::Policy, |p| p.parse_create_retention_policy_statement());
    create.handle(Token::Subscription, |p| p.parse_create_subscription_statement());

    let drop = lang.group(&[Token::Drop]);
    drop.group(&[Token::Continuous])
        .handle(Token::Query, |p| p.parse_drop_continuous_query_statement());
    drop.handle(Token::Database, |p| {
        Ok(Statement::DropDatabase(DropDatabaseStatement { name: p.parse_ident()? }))
    });
    drop.handle(Token::Measurement, |p| {
        Ok(Statement::DropMeasurement(DropMeasurementStatement { name: p.parse_ident()? }))
    });
    drop.group(&[Token::Retention])
        .handle(Token::Policy, |p| p.parse_drop_retention_policy_statement());
    drop.handle(Token::Series, |p| p.parse_drop_series_statement());
    drop.handle(Token::Shard, |p| p.parse_drop_shard_statement());
    drop.handle(Token::Subscription, |p| p.parse_drop_subscription_statement());
    drop.handle(Token::User, |p| {
        Ok(Statement::DropUser(DropUserStatement { name: p.parse_ident()? }))
    });

    lang.handle(Token::Explain, |p| p.parse_explain_statement());
    lang.handle(Token::Grant, |p| p.parse_grant_statement());
    lang.handle(Token::Revoke, |p| p.parse_revoke_statement());
    lang.group(&[Token::Alter, Token::Retention])
        .handle(Token::Policy, |p| p.parse_alter_retention_policy_statement());
    lang.group(&[Token::Set, Token::Password])
        .handle(Token::For, |p| p.parse_set_password_user_statement());
    lang.group(&[Token::Kill])
        .handle(Token::Query, |p| p.parse_kill_query_statement());

    lang
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_statement;

    #[test]
    fn test_top_level_keys_in_registration_order() {
        assert_eq!(
            language().keys(),
            [
                "SELECT", "DELETE", "SHOW", "CREATE", "DROP", "EXPLAIN", "GRANT", "REVOKE", "ALTER",
                "SET", "KILL"
            ]
        );
    }

    #[test]
    fn test_dead_end_lists_expected_tokens() {
        let err = parse_statement("SHOW FOO").unwrap_err();
        assert_eq!(
            err.to_string(),
            "found FOO, expected CONTINUOUS, DATABASES, DIAGNOSTICS, FIELD, GRANTS, MEASUREMENT, \
             MEASUREMENTS, QUERIES, RETENTION, SERIES, SHARD, SHARDS, STATS, SUBSCRIPTIONS, TAG, \
             USERS at line 1, char 6"
        );

        let err = parse_statement("DROP CONTINUOUS cq").unwrap_err();
        assert_eq!(err.to_string(), "found cq, expected QUERY at line 1, char 17");
    }

    #[test]
    fn test_group_reuses_existing_node() {
        let mut tree = ParseTree::new();
        tree.group(&[Token::Show]).handle(Token::Databases, |_| Ok(Statement::ShowDatabases));
        tree.group(&[Token::Show]).handle(Token::Users, |_| Ok(Statement::ShowUsers));
        assert_eq!(tree.keys(), ["SHOW"]);
    }

    #[test]
    #[should_panic(expected = "conflict for token SHOW")]
    fn test_conflicting_handler_panics() {
        let mut tree = ParseTree::new();
        tree.handle(Token::Show, |_| Ok(Statement::ShowDatabases));
        tree.group(&[Token::Show]);
    }

    #[test]
    #[should_panic(expected = "conflict for token USERS")]
    fn test_duplicate_handler_panics() {
        let mut tree = ParseTree::new();
        tree.handle(Token::Users, |_| Ok(Statement::ShowUsers));
        tree.handle(Token::Users, |_| Ok(Statement::ShowUsers));
    }
}
