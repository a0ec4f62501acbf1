//! Query Abstract Syntax Tree
//!
//! One [`Statement`] variant per statement kind. Every statement renders back
//! to canonical query text through `Display` and reports the privileges a
//! user needs to run it.
//!
//! # Example
//!
//! ```text
//! SHOW TAG VALUES ON db FROM cpu WITH KEY = host WHERE region = 'west'
//!
//! required_privileges  ->  [read on "db"]
//! default_database     ->  Some("db")
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::duration::format_duration;
use super::expr::{join_display, Dimension, Expr};
use super::quote::{quote_ident, quote_string};
use super::select::{SelectStatement, SortField};
use super::source::{sources_privileges, sources_string, Source};
use super::token::Token;

/// Access level on a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    None,
    Read,
    Write,
    All,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NO PRIVILEGES",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::All => "ALL PRIVILEGES",
        })
    }
}

/// A privilege a statement requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPrivilege {
    /// Whether cluster admin rights are required
    pub admin: bool,
    /// Database the privilege applies to; empty for none in particular
    pub name: String,
    pub privilege: Privilege,
}

impl ExecutionPrivilege {
    pub fn new(name: impl Into<String>, privilege: Privilege) -> Self {
        Self {
            admin: false,
            name: name.into(),
            privilege,
        }
    }

    /// Cluster admin rights
    pub fn admin() -> Self {
        Self {
            admin: true,
            name: String::new(),
            privilege: Privilege::All,
        }
    }
}

/// A sequence of statements separated by semicolons
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_display(&self.statements, ";\n"))
    }
}

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    AlterRetentionPolicy(AlterRetentionPolicyStatement),
    CreateContinuousQuery(CreateContinuousQueryStatement),
    CreateDatabase(CreateDatabaseStatement),
    CreateRetentionPolicy(CreateRetentionPolicyStatement),
    CreateSubscription(CreateSubscriptionStatement),
    CreateUser(CreateUserStatement),
    DeleteSeries(DeleteSeriesStatement),
    DropContinuousQuery(DropContinuousQueryStatement),
    DropDatabase(DropDatabaseStatement),
    DropMeasurement(DropMeasurementStatement),
    DropRetentionPolicy(DropRetentionPolicyStatement),
    DropSeries(DropSeriesStatement),
    DropShard(DropShardStatement),
    DropSubscription(DropSubscriptionStatement),
    DropUser(DropUserStatement),
    Explain(ExplainStatement),
    Grant(GrantStatement),
    GrantAdmin(GrantAdminStatement),
    KillQuery(KillQueryStatement),
    Revoke(RevokeStatement),
    RevokeAdmin(RevokeAdminStatement),
    Select(Box<SelectStatement>),
    SetPasswordUser(SetPasswordUserStatement),
    ShowContinuousQueries,
    ShowDatabases,
    ShowDiagnostics(ShowDiagnosticsStatement),
    ShowFieldKeyCardinality(ShowFieldKeyCardinalityStatement),
    ShowFieldKeys(ShowFieldKeysStatement),
    ShowGrantsForUser(ShowGrantsForUserStatement),
    ShowMeasurementCardinality(ShowMeasurementCardinalityStatement),
    ShowMeasurements(ShowMeasurementsStatement),
    ShowQueries,
    ShowRetentionPolicies(ShowRetentionPoliciesStatement),
    ShowSeries(ShowSeriesStatement),
    ShowSeriesCardinality(ShowSeriesCardinalityStatement),
    ShowShardGroups,
    ShowShards,
    ShowStats(ShowStatsStatement),
    ShowSubscriptions,
    ShowTagKeyCardinality(ShowTagKeyCardinalityStatement),
    ShowTagKeys(ShowTagKeysStatement),
    ShowTagValuesCardinality(ShowTagValuesCardinalityStatement),
    ShowTagValues(ShowTagValuesStatement),
    ShowUsers,
}

impl Statement {
    /// Privileges needed to execute the statement
    pub fn required_privileges(&self) -> Vec<ExecutionPrivilege> {
        use Statement::*;

        match self {
            Select(s) => s.required_privileges(),
            Explain(s) => s.statement.required_privileges(),
            CreateContinuousQuery(s) => {
                let mut privs = vec![ExecutionPrivilege::new(&s.database, Privilege::Read)];
                if let Some(target) = &s.source.target {
                    if !target.measurement.database.is_empty() {
                        privs.push(ExecutionPrivilege::new(
                            &target.measurement.database,
                            Privilege::Write,
                        ));
                    }
                }
                privs
            }
            DropContinuousQuery(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Write)],
            DropRetentionPolicy(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Write)],
            DeleteSeries(_) | DropSeries(_) => vec![ExecutionPrivilege::new("", Privilege::Write)],
            ShowContinuousQueries | ShowQueries => vec![ExecutionPrivilege::new("", Privilege::Read)],
            ShowDatabases => vec![ExecutionPrivilege::new("", Privilege::None)],
            ShowSeries(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Read)],
            ShowMeasurements(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Read)],
            ShowRetentionPolicies(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Read)],
            ShowTagKeys(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Read)],
            ShowTagValues(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Read)],
            ShowFieldKeys(s) => vec![ExecutionPrivilege::new(&s.database, Privilege::Read)],
            ShowSeriesCardinality(s) => s.0.privileges(),
            ShowMeasurementCardinality(s) => s.0.privileges(),
            ShowTagKeyCardinality(s) => sources_privileges(&s.0.sources),
            ShowFieldKeyCardinality(s) => sources_privileges(&s.0.sources),
            ShowTagValuesCardinality(s) => sources_privileges(&s.cardinality.sources),
            AlterRetentionPolicy(_)
            | CreateDatabase(_)
            | CreateRetentionPolicy(_)
            | CreateSubscription(_)
            | CreateUser(_)
            | DropDatabase(_)
            | DropMeasurement(_)
            | DropShard(_)
            | DropSubscription(_)
            | DropUser(_)
            | Grant(_)
            | GrantAdmin(_)
            | KillQuery(_)
            | Revoke(_)
            | RevokeAdmin(_)
            | SetPasswordUser(_)
            | ShowDiagnostics(_)
            | ShowGrantsForUser(_)
            | ShowShardGroups
            | ShowShards
            | ShowStats(_)
            | ShowSubscriptions
            | ShowUsers => vec![ExecutionPrivilege::admin()],
        }
    }

    /// Database the statement runs against when it names one
    pub fn default_database(&self) -> Option<&str> {
        use Statement::*;

        let db = match self {
            AlterRetentionPolicy(s) => &s.database,
            CreateContinuousQuery(s) => &s.database,
            CreateRetentionPolicy(s) => &s.database,
            CreateSubscription(s) => &s.database,
            DropContinuousQuery(s) => &s.database,
            DropRetentionPolicy(s) => &s.database,
            DropSubscription(s) => &s.database,
            Grant(s) => &s.on,
            Revoke(s) => &s.on,
            ShowFieldKeyCardinality(s) => &s.0.database,
            ShowFieldKeys(s) => &s.database,
            ShowMeasurementCardinality(s) => &s.0.database,
            ShowMeasurements(s) => &s.database,
            ShowRetentionPolicies(s) => &s.database,
            ShowSeries(s) => &s.database,
            ShowSeriesCardinality(s) => &s.0.database,
            ShowTagKeyCardinality(s) => &s.0.database,
            ShowTagKeys(s) => &s.database,
            ShowTagValuesCardinality(s) => &s.cardinality.database,
            ShowTagValues(s) => &s.database,
            _ => return None,
        };
        Some(db.as_str()).filter(|db| !db.is_empty())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Statement::*;

        match self {
            AlterRetentionPolicy(s) => s.fmt(f),
            CreateContinuousQuery(s) => s.fmt(f),
            CreateDatabase(s) => s.fmt(f),
            CreateRetentionPolicy(s) => s.fmt(f),
            CreateSubscription(s) => s.fmt(f),
            CreateUser(s) => s.fmt(f),
            DeleteSeries(s) => s.fmt(f),
            DropContinuousQuery(s) => s.fmt(f),
            DropDatabase(s) => write!(f, "DROP DATABASE {}", quote_ident(&[&s.name])),
            DropMeasurement(s) => write!(f, "DROP MEASUREMENT {}", quote_ident(&[&s.name])),
            DropRetentionPolicy(s) => write!(
                f,
                "DROP RETENTION POLICY {} ON {}",
                quote_ident(&[&s.name]),
                quote_ident(&[&s.database])
            ),
            DropSeries(s) => s.fmt(f),
            DropShard(s) => write!(f, "DROP SHARD {}", s.id),
            DropSubscription(s) => write!(
                f,
                "DROP SUBSCRIPTION {} ON {}.{}",
                quote_ident(&[&s.name]),
                quote_ident(&[&s.database]),
                quote_ident(&[&s.retention_policy])
            ),
            DropUser(s) => write!(f, "DROP USER {}", quote_ident(&[&s.name])),
            Explain(s) => s.fmt(f),
            Grant(s) => write!(
                f,
                "GRANT {} ON {} TO {}",
                s.privilege,
                quote_ident(&[&s.on]),
                quote_ident(&[&s.user])
            ),
            GrantAdmin(s) => write!(f, "GRANT ALL PRIVILEGES TO {}", quote_ident(&[&s.user])),
            KillQuery(s) => s.fmt(f),
            Revoke(s) => write!(
                f,
                "REVOKE {} ON {} FROM {}",
                s.privilege,
                quote_ident(&[&s.on]),
                quote_ident(&[&s.user])
            ),
            RevokeAdmin(s) => write!(f, "REVOKE ALL PRIVILEGES FROM {}", quote_ident(&[&s.user])),
            Select(s) => s.fmt(f),
            SetPasswordUser(s) => write!(f, "SET PASSWORD FOR {} = [REDACTED]", quote_ident(&[&s.name])),
            ShowContinuousQueries => f.write_str("SHOW CONTINUOUS QUERIES"),
            ShowDatabases => f.write_str("SHOW DATABASES"),
            ShowDiagnostics(s) => {
                f.write_str("SHOW DIAGNOSTICS")?;
                write_for_module(f, &s.module)
            }
            ShowFieldKeyCardinality(s) => s.0.write(f, "SHOW FIELD KEY"),
            ShowFieldKeys(s) => s.fmt(f),
            ShowGrantsForUser(s) => write!(f, "SHOW GRANTS FOR {}", quote_ident(&[&s.name])),
            ShowMeasurementCardinality(s) => s.0.write(f, "SHOW MEASUREMENT"),
            ShowMeasurements(s) => s.fmt(f),
            ShowQueries => f.write_str("SHOW QUERIES"),
            ShowRetentionPolicies(s) => {
                f.write_str("SHOW RETENTION POLICIES")?;
                write_on(f, &s.database)
            }
            ShowSeries(s) => s.fmt(f),
            ShowSeriesCardinality(s) => s.0.write(f, "SHOW SERIES"),
            ShowShardGroups => f.write_str("SHOW SHARD GROUPS"),
            ShowShards => f.write_str("SHOW SHARDS"),
            ShowStats(s) => {
                f.write_str("SHOW STATS")?;
                write_for_module(f, &s.module)
            }
            ShowSubscriptions => f.write_str("SHOW SUBSCRIPTIONS"),
            ShowTagKeyCardinality(s) => s.0.write(f, "SHOW TAG KEY"),
            ShowTagKeys(s) => s.fmt(f),
            ShowTagValuesCardinality(s) => s.fmt(f),
            ShowTagValues(s) => s.fmt(f),
            ShowUsers => f.write_str("SHOW USERS"),
        }
    }
}

fn write_on(f: &mut fmt::Formatter<'_>, database: &str) -> fmt::Result {
    if database.is_empty() {
        return Ok(());
    }
    write!(f, " ON {}", quote_ident(&[database]))
}

fn write_from(f: &mut fmt::Formatter<'_>, sources: &[Source]) -> fmt::Result {
    if sources.is_empty() {
        return Ok(());
    }
    write!(f, " FROM {}", sources_string(sources))
}

fn write_where(f: &mut fmt::Formatter<'_>, condition: Option<&Expr>) -> fmt::Result {
    match condition {
        Some(cond) => write!(f, " WHERE {}", cond),
        None => Ok(()),
    }
}

fn write_group_by(f: &mut fmt::Formatter<'_>, dimensions: &[Dimension]) -> fmt::Result {
    if dimensions.is_empty() {
        return Ok(());
    }
    write!(f, " GROUP BY {}", join_display(dimensions, ", "))
}

fn write_order_by(f: &mut fmt::Formatter<'_>, sort_fields: &[SortField]) -> fmt::Result {
    if sort_fields.is_empty() {
        return Ok(());
    }
    write!(f, " ORDER BY {}", join_display(sort_fields, ", "))
}

fn write_count(f: &mut fmt::Formatter<'_>, keyword: &str, n: usize) -> fmt::Result {
    if n == 0 {
        return Ok(());
    }
    write!(f, " {} {}", keyword, n)
}

fn write_for_module(f: &mut fmt::Formatter<'_>, module: &str) -> fmt::Result {
    if module.is_empty() {
        return Ok(());
    }
    write!(f, " FOR {}", quote_string(module))
}

fn write_tag_key(f: &mut fmt::Formatter<'_>, op: Token, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::String(key) => write!(f, " WITH KEY {} {}", op, quote_ident(&[key])),
        other => write!(f, " WITH KEY {} {}", op, other),
    }
}

/// `CREATE DATABASE name [WITH ...]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateDatabaseStatement {
    pub name: String,
    /// Set when a WITH clause defines the default retention policy
    pub retention_policy_create: bool,
    pub retention_policy_duration: Option<i64>,
    pub retention_policy_replication: Option<i64>,
    pub retention_policy_name: String,
    pub retention_policy_shard_group_duration: i64,
    pub future_write_limit: Option<i64>,
    pub past_write_limit: Option<i64>,
}

impl fmt::Display for CreateDatabaseStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE DATABASE {}", quote_ident(&[&self.name]))?;
        if !self.retention_policy_create {
            return Ok(());
        }
        f.write_str(" WITH")?;
        if let Some(d) = self.retention_policy_duration {
            write!(f, " DURATION {}", format_duration(d))?;
        }
        if let Some(n) = self.retention_policy_replication {
            write!(f, " REPLICATION {}", n)?;
        }
        if self.retention_policy_shard_group_duration > 0 {
            write!(
                f,
                " SHARD DURATION {}",
                format_duration(self.retention_policy_shard_group_duration)
            )?;
        }
        if let Some(d) = self.future_write_limit.filter(|d| *d > 0) {
            write!(f, " FUTURE LIMIT {}", format_duration(d))?;
        }
        if let Some(d) = self.past_write_limit.filter(|d| *d > 0) {
            write!(f, " PAST LIMIT {}", format_duration(d))?;
        }
        if !self.retention_policy_name.is_empty() {
            write!(f, " NAME {}", quote_ident(&[&self.retention_policy_name]))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropDatabaseStatement {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropRetentionPolicyStatement {
    pub name: String,
    pub database: String,
}

/// `CREATE USER name WITH PASSWORD 'pw' [WITH ALL PRIVILEGES]`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateUserStatement {
    pub name: String,
    pub password: String,
    pub admin: bool,
}

impl fmt::Display for CreateUserStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE USER {} WITH PASSWORD [REDACTED]", quote_ident(&[&self.name]))?;
        if self.admin {
            f.write_str(" WITH ALL PRIVILEGES")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropUserStatement {
    pub name: String,
}

/// `GRANT privilege ON db TO user`
#[derive(Debug, Clone, PartialEq)]
pub struct GrantStatement {
    pub privilege: Privilege,
    pub on: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrantAdminStatement {
    pub user: String,
}

/// `REVOKE privilege ON db FROM user`
#[derive(Debug, Clone, PartialEq)]
pub struct RevokeStatement {
    pub privilege: Privilege,
    pub on: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevokeAdminStatement {
    pub user: String,
}

/// `KILL QUERY id [ON host]`
#[derive(Debug, Clone, PartialEq)]
pub struct KillQueryStatement {
    pub query_id: u64,
    pub host: String,
}

impl fmt::Display for KillQueryStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KILL QUERY {}", self.query_id)?;
        write_on(f, &self.host)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetPasswordUserStatement {
    pub name: String,
    pub password: String,
}

/// `CREATE RETENTION POLICY`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateRetentionPolicyStatement {
    pub name: String,
    pub database: String,
    pub duration: i64,
    pub replication: i64,
    pub default: bool,
    pub shard_group_duration: i64,
    pub future_write_limit: i64,
    pub past_write_limit: i64,
}

impl fmt::Display for CreateRetentionPolicyStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE RETENTION POLICY {} ON {} DURATION {} REPLICATION {}",
            quote_ident(&[&self.name]),
            quote_ident(&[&self.database]),
            format_duration(self.duration),
            self.replication
        )?;
        if self.shard_group_duration > 0 {
            write!(f, " SHARD DURATION {}", format_duration(self.shard_group_duration))?;
        }
        if self.default {
            f.write_str(" DEFAULT")?;
        }
        if self.future_write_limit != 0 {
            write!(f, " FUTURE LIMIT {}", format_duration(self.future_write_limit))?;
        }
        if self.past_write_limit != 0 {
            write!(f, " PAST LIMIT {}", format_duration(self.past_write_limit))?;
        }
        Ok(())
    }
}

/// `ALTER RETENTION POLICY`; unset options are left unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlterRetentionPolicyStatement {
    pub name: String,
    pub database: String,
    pub duration: Option<i64>,
    pub replication: Option<i64>,
    pub default: bool,
    pub shard_group_duration: Option<i64>,
    pub future_write_limit: Option<i64>,
    pub past_write_limit: Option<i64>,
}

impl fmt::Display for AlterRetentionPolicyStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ALTER RETENTION POLICY {} ON {}",
            quote_ident(&[&self.name]),
            quote_ident(&[&self.database])
        )?;
        if let Some(d) = self.duration {
            write!(f, " DURATION {}", format_duration(d))?;
        }
        if let Some(n) = self.replication {
            write!(f, " REPLICATION {}", n)?;
        }
        if let Some(d) = self.shard_group_duration {
            write!(f, " SHARD DURATION {}", format_duration(d))?;
        }
        if self.default {
            f.write_str(" DEFAULT")?;
        }
        if let Some(d) = self.future_write_limit.filter(|d| *d != 0) {
            write!(f, " FUTURE LIMIT {}", format_duration(d))?;
        }
        if let Some(d) = self.past_write_limit.filter(|d| *d != 0) {
            write!(f, " PAST LIMIT {}", format_duration(d))?;
        }
        Ok(())
    }
}

/// `EXPLAIN [ANALYZE] [VERBOSE] SELECT ...`
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainStatement {
    pub statement: Box<SelectStatement>,
    pub analyze: bool,
    pub verbose: bool,
}

impl fmt::Display for ExplainStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EXPLAIN ")?;
        if self.analyze {
            f.write_str("ANALYZE ")?;
        }
        if self.verbose {
            f.write_str("VERBOSE ")?;
        }
        write!(f, "{}", self.statement)
    }
}

/// `DELETE [FROM sources] [WHERE cond]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSeriesStatement {
    pub sources: Vec<Source>,
    pub condition: Option<Expr>,
}

impl fmt::Display for DeleteSeriesStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DELETE")?;
        write_from(f, &self.sources)?;
        write_where(f, self.condition.as_ref())
    }
}

/// `DROP SERIES [FROM sources] [WHERE cond]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropSeriesStatement {
    pub sources: Vec<Source>,
    pub condition: Option<Expr>,
}

impl fmt::Display for DropSeriesStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DROP SERIES")?;
        write_from(f, &self.sources)?;
        write_where(f, self.condition.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropShardStatement {
    pub id: u64,
}

/// `SHOW SERIES`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowSeriesStatement {
    pub database: String,
    pub sources: Vec<Source>,
    pub condition: Option<Expr>,
    pub sort_fields: Vec<SortField>,
    pub limit: usize,
    pub offset: usize,
}

impl fmt::Display for ShowSeriesStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SHOW SERIES")?;
        write_on(f, &self.database)?;
        write_from(f, &self.sources)?;
        write_where(f, self.condition.as_ref())?;
        write_order_by(f, &self.sort_fields)?;
        write_count(f, "LIMIT", self.limit)?;
        write_count(f, "OFFSET", self.offset)
    }
}

/// Clauses shared by the `SHOW ... [EXACT] CARDINALITY` statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cardinality {
    /// Count exactly instead of estimating
    pub exact: bool,
    pub database: String,
    pub sources: Vec<Source>,
    pub condition: Option<Expr>,
    pub dimensions: Vec<Dimension>,
    pub limit: usize,
    pub offset: usize,
}

impl Cardinality {
    /// Estimates need read access to the database; exact counts read the sources.
    fn privileges(&self) -> Vec<ExecutionPrivilege> {
        if self.exact {
            sources_privileges(&self.sources)
        } else {
            vec![ExecutionPrivilege::new(&self.database, Privilege::Read)]
        }
    }

    fn write_head(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        f.write_str(prefix)?;
        if self.exact {
            f.write_str(" EXACT")?;
        }
        f.write_str(" CARDINALITY")?;
        write_on(f, &self.database)?;
        write_from(f, &self.sources)
    }

    fn write_tail(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_where(f, self.condition.as_ref())?;
        write_group_by(f, &self.dimensions)?;
        write_count(f, "LIMIT", self.limit)?;
        write_count(f, "OFFSET", self.offset)
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        self.write_head(f, prefix)?;
        self.write_tail(f)
    }
}

/// `SHOW SERIES [EXACT] CARDINALITY`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowSeriesCardinalityStatement(pub Cardinality);

/// `SHOW MEASUREMENT [EXACT] CARDINALITY`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowMeasurementCardinalityStatement(pub Cardinality);

/// `SHOW TAG KEY [EXACT] CARDINALITY`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowTagKeyCardinalityStatement(pub Cardinality);

/// `SHOW FIELD KEY [EXACT] CARDINALITY`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowFieldKeyCardinalityStatement(pub Cardinality);

/// `SHOW TAG VALUES [EXACT] CARDINALITY ... WITH KEY ...`
#[derive(Debug, Clone, PartialEq)]
pub struct ShowTagValuesCardinalityStatement {
    pub cardinality: Cardinality,
    pub op: Token,
    pub tag_key_expr: Expr,
}

impl fmt::Display for ShowTagValuesCardinalityStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cardinality.write_head(f, "SHOW TAG VALUES")?;
        write_tag_key(f, self.op, &self.tag_key_expr)?;
        self.cardinality.write_tail(f)
    }
}

/// `CREATE CONTINUOUS QUERY name ON db [RESAMPLE ...] BEGIN select END`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateContinuousQueryStatement {
    pub name: String,
    pub database: String,
    pub source: Box<SelectStatement>,
    pub resample_every: i64,
    pub resample_for: i64,
}

impl fmt::Display for CreateContinuousQueryStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE CONTINUOUS QUERY {} ON {} ",
            quote_ident(&[&self.name]),
            quote_ident(&[&self.database])
        )?;
        if self.resample_every > 0 || self.resample_for > 0 {
            f.write_str("RESAMPLE ")?;
            if self.resample_every > 0 {
                write!(f, "EVERY {} ", format_duration(self.resample_every))?;
            }
            if self.resample_for > 0 {
                write!(f, "FOR {} ", format_duration(self.resample_for))?;
            }
        }
        write!(f, "BEGIN {} END", self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropContinuousQueryStatement {
    pub name: String,
    pub database: String,
}

impl fmt::Display for DropContinuousQueryStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DROP CONTINUOUS QUERY {} ON {}",
            quote_ident(&[&self.name]),
            quote_ident(&[&self.database])
        )
    }
}

/// `SHOW MEASUREMENTS [ON db[.rp]] [WITH MEASUREMENT ...] ...`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowMeasurementsStatement {
    pub database: String,
    pub retention_policy: String,
    /// `ON *`
    pub wildcard_database: bool,
    /// `ON db.*`
    pub wildcard_retention_policy: bool,
    pub source: Option<Source>,
    pub condition: Option<Expr>,
    pub sort_fields: Vec<SortField>,
    pub limit: usize,
    pub offset: usize,
}

impl fmt::Display for ShowMeasurementsStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SHOW MEASUREMENTS")?;
        if !self.database.is_empty() || self.wildcard_database {
            f.write_str(" ON ")?;
            if self.wildcard_database {
                f.write_str("*")?;
            } else {
                f.write_str(&self.database)?;
            }
            if self.wildcard_retention_policy {
                f.write_str(".*")?;
            } else if !self.retention_policy.is_empty() {
                write!(f, ".{}", self.retention_policy)?;
            }
        }
        if let Some(src) = &self.source {
            let op = match src {
                Source::Measurement(m) if m.regex.is_some() => "=~",
                _ => "=",
            };
            write!(f, " WITH MEASUREMENT {} {}", op, src)?;
        }
        write_where(f, self.condition.as_ref())?;
        write_order_by(f, &self.sort_fields)?;
        write_count(f, "LIMIT", self.limit)?;
        write_count(f, "OFFSET", self.offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropMeasurementStatement {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowRetentionPoliciesStatement {
    pub database: String,
}

/// `SHOW STATS [FOR 'module']`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowStatsStatement {
    pub module: String,
}

/// `SHOW DIAGNOSTICS [FOR 'module']`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowDiagnosticsStatement {
    pub module: String,
}

/// `CREATE SUBSCRIPTION name ON db.rp DESTINATIONS ALL|ANY 'host', ...`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubscriptionStatement {
    pub name: String,
    pub database: String,
    pub retention_policy: String,
    pub destinations: Vec<String>,
    /// `ALL` or `ANY`
    pub mode: String,
}

impl fmt::Display for CreateSubscriptionStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destinations: Vec<String> = self.destinations.iter().map(|d| quote_string(d)).collect();
        write!(
            f,
            "CREATE SUBSCRIPTION {} ON {}.{} DESTINATIONS {} {}",
            quote_ident(&[&self.name]),
            quote_ident(&[&self.database]),
            quote_ident(&[&self.retention_policy]),
            self.mode,
            destinations.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropSubscriptionStatement {
    pub name: String,
    pub database: String,
    pub retention_policy: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowGrantsForUserStatement {
    pub name: String,
}

/// `SHOW TAG KEYS`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowTagKeysStatement {
    pub database: String,
    pub sources: Vec<Source>,
    /// Optional `WITH KEY op expr` filter
    pub tag_key: Option<(Token, Expr)>,
    pub condition: Option<Expr>,
    pub sort_fields: Vec<SortField>,
    pub limit: usize,
    pub offset: usize,
    pub slimit: usize,
    pub soffset: usize,
}

impl fmt::Display for ShowTagKeysStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SHOW TAG KEYS")?;
        write_on(f, &self.database)?;
        write_from(f, &self.sources)?;
        if let Some((op, expr)) = &self.tag_key {
            write_tag_key(f, *op, expr)?;
        }
        write_where(f, self.condition.as_ref())?;
        write_order_by(f, &self.sort_fields)?;
        write_count(f, "LIMIT", self.limit)?;
        write_count(f, "OFFSET", self.offset)?;
        write_count(f, "SLIMIT", self.slimit)?;
        write_count(f, "SOFFSET", self.soffset)
    }
}

/// `SHOW TAG VALUES ... WITH KEY op expr`
#[derive(Debug, Clone, PartialEq)]
pub struct ShowTagValuesStatement {
    pub database: String,
    pub sources: Vec<Source>,
    /// One of `IN`, `=`, `!=`, `=~`, `!~`
    pub op: Token,
    /// A string, list or regex literal
    pub tag_key_expr: Expr,
    pub condition: Option<Expr>,
    pub sort_fields: Vec<SortField>,
    pub limit: usize,
    pub offset: usize,
}

impl fmt::Display for ShowTagValuesStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SHOW TAG VALUES")?;
        write_on(f, &self.database)?;
        write_from(f, &self.sources)?;
        write_tag_key(f, self.op, &self.tag_key_expr)?;
        write_where(f, self.condition.as_ref())?;
        write_order_by(f, &self.sort_fields)?;
        write_count(f, "LIMIT", self.limit)?;
        write_count(f, "OFFSET", self.offset)
    }
}

/// `SHOW FIELD KEYS`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowFieldKeysStatement {
    pub database: String,
    pub sources: Vec<Source>,
    pub sort_fields: Vec<SortField>,
    pub limit: usize,
    pub offset: usize,
}

impl fmt::Display for ShowFieldKeysStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SHOW FIELD KEYS")?;
        write_on(f, &self.database)?;
        write_from(f, &self.sources)?;
        write_order_by(f, &self.sort_fields)?;
        write_count(f, "LIMIT", self.limit)?;
        write_count(f, "OFFSET", self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::{parse_query, parse_statement};

    fn round_trip(q: &str) -> String {
        parse_statement(q).unwrap().to_string()
    }

    #[test]
    fn test_statement_display_round_trips() {
        let queries = [
            "ALTER RETENTION POLICY rp ON db DURATION 1h REPLICATION 2 SHARD DURATION 10m DEFAULT",
            "CREATE CONTINUOUS QUERY cq ON db RESAMPLE EVERY 5m FOR 1h BEGIN SELECT mean(v) INTO db..cpu_1h FROM cpu GROUP BY time(1h) END",
            "CREATE DATABASE db WITH DURATION 1d REPLICATION 1 SHARD DURATION 1h NAME rp",
            "CREATE RETENTION POLICY rp ON db DURATION 1w REPLICATION 3 DEFAULT FUTURE LIMIT 1h PAST LIMIT 2h",
            "CREATE SUBSCRIPTION sub ON db.rp DESTINATIONS ANY 'udp://h1:9090', 'udp://h2:9090'",
            "DELETE FROM cpu WHERE time < '2021-01-01T00:00:00Z'",
            "DROP CONTINUOUS QUERY cq ON db",
            "DROP DATABASE db",
            "DROP MEASUREMENT cpu",
            "DROP RETENTION POLICY rp ON db",
            "DROP SERIES FROM cpu WHERE host = 'a'",
            "DROP SHARD 12",
            "DROP SUBSCRIPTION sub ON db.rp",
            "DROP USER bob",
            "EXPLAIN ANALYZE VERBOSE SELECT v FROM cpu",
            "GRANT READ ON db TO bob",
            "GRANT ALL PRIVILEGES TO bob",
            "KILL QUERY 42 ON \"host:8088\"",
            "REVOKE WRITE ON db FROM bob",
            "REVOKE ALL PRIVILEGES FROM bob",
            "SHOW CONTINUOUS QUERIES",
            "SHOW DATABASES",
            "SHOW DIAGNOSTICS FOR 'build'",
            "SHOW FIELD KEY EXACT CARDINALITY ON db FROM cpu",
            "SHOW FIELD KEYS ON db FROM cpu LIMIT 5 OFFSET 1",
            "SHOW GRANTS FOR bob",
            "SHOW MEASUREMENT CARDINALITY ON db GROUP BY host",
            "SHOW MEASUREMENTS ON db.rp WITH MEASUREMENT =~ /^c/ WHERE host = 'a' LIMIT 2",
            "SHOW MEASUREMENTS ON *.* WITH MEASUREMENT = cpu",
            "SHOW QUERIES",
            "SHOW RETENTION POLICIES ON db",
            "SHOW SERIES ON db FROM cpu WHERE host = 'a' ORDER BY time DESC LIMIT 10 OFFSET 5",
            "SHOW SERIES EXACT CARDINALITY FROM cpu WHERE host = 'a'",
            "SHOW SHARD GROUPS",
            "SHOW SHARDS",
            "SHOW STATS FOR 'shard'",
            "SHOW SUBSCRIPTIONS",
            "SHOW TAG KEY CARDINALITY FROM cpu",
            "SHOW TAG KEYS ON db FROM cpu WITH KEY IN (host, region) WHERE v > 1 SLIMIT 2 SOFFSET 1",
            "SHOW TAG VALUES EXACT CARDINALITY FROM cpu WITH KEY = host",
            "SHOW TAG VALUES ON db FROM cpu WITH KEY =~ /^h/ WHERE region = 'west' LIMIT 3",
            "SHOW USERS",
        ];
        for q in queries {
            assert_eq!(round_trip(q), q);
        }
    }

    #[test]
    fn test_passwords_are_redacted() {
        assert_eq!(
            round_trip("CREATE USER bob WITH PASSWORD 'secret' WITH ALL PRIVILEGES"),
            "CREATE USER bob WITH PASSWORD [REDACTED] WITH ALL PRIVILEGES"
        );
        assert_eq!(
            round_trip("SET PASSWORD FOR bob = 'secret'"),
            "SET PASSWORD FOR bob = [REDACTED]"
        );
    }

    #[test]
    fn test_query_display_joins_statements() {
        let q = parse_query("SHOW DATABASES; DROP USER bob").unwrap();
        assert_eq!(q.to_string(), "SHOW DATABASES;\nDROP USER bob");
    }

    #[test]
    fn test_required_privileges() {
        let privs = parse_statement("DROP DATABASE db").unwrap().required_privileges();
        assert_eq!(privs, vec![ExecutionPrivilege::admin()]);

        let privs = parse_statement("SHOW DATABASES").unwrap().required_privileges();
        assert_eq!(privs, vec![ExecutionPrivilege::new("", Privilege::None)]);

        let privs = parse_statement("SHOW TAG KEYS ON db").unwrap().required_privileges();
        assert_eq!(privs, vec![ExecutionPrivilege::new("db", Privilege::Read)]);

        let privs = parse_statement("DROP CONTINUOUS QUERY cq ON db").unwrap().required_privileges();
        assert_eq!(privs, vec![ExecutionPrivilege::new("db", Privilege::Write)]);

        let privs = parse_statement("SHOW SERIES EXACT CARDINALITY FROM db0..cpu")
            .unwrap()
            .required_privileges();
        assert_eq!(privs, vec![ExecutionPrivilege::new("db0", Privilege::Read)]);

        let privs = parse_statement("SHOW SERIES CARDINALITY ON db1 FROM db0..cpu")
            .unwrap()
            .required_privileges();
        assert_eq!(privs, vec![ExecutionPrivilege::new("db1", Privilege::Read)]);
    }

    #[test]
    fn test_continuous_query_privileges() {
        let stmt = parse_statement(
            "CREATE CONTINUOUS QUERY cq ON db BEGIN SELECT mean(v) INTO other..cpu FROM cpu GROUP BY time(1h) END",
        )
        .unwrap();
        assert_eq!(
            stmt.required_privileges(),
            vec![
                ExecutionPrivilege::new("db", Privilege::Read),
                ExecutionPrivilege::new("other", Privilege::Write),
            ]
        );
    }

    #[test]
    fn test_default_database() {
        let stmt = parse_statement("SHOW RETENTION POLICIES ON db").unwrap();
        assert_eq!(stmt.default_database(), Some("db"));

        let stmt = parse_statement("SHOW RETENTION POLICIES").unwrap();
        assert_eq!(stmt.default_database(), None);

        let stmt = parse_statement("CREATE DATABASE db").unwrap();
        assert_eq!(stmt.default_database(), None);
    }

    #[test]
    fn test_privilege_serializes_lowercase() {
        let json = serde_json::to_string(&ExecutionPrivilege::new("db", Privilege::Read)).unwrap();
        assert_eq!(json, r#"{"admin":false,"name":"db","privilege":"read"}"#);
    }
}
