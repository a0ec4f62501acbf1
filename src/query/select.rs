//! SELECT statements
//!
//! [`SelectStatement`] holds every clause of a query plus the flags later
//! passes set on it. Besides rendering, it carries the helpers that prepare a
//! statement for execution:
//!
//! ```text
//! rewrite_fields       expand * and /regex/ against a FieldMapper
//! rewrite_distinct     DISTINCT x  ->  distinct(x)
//! rewrite_time_fields  drop explicit `time` columns, keep their alias
//! set_time_range       AND a [start, end) window onto the condition
//! column_names         output column names with conflicts resolved
//! ```
//!
//! Regex condition rewriting lives in `regex_rewrite`, reduction in `reduce`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::ast::{ExecutionPrivilege, Privilege};
use super::data_type::DataType;
use super::error::{QueryError, QueryResult};
use super::expr::{join_display, walk_names, Call, Dimension, Expr, Field, VarRef, WildcardType};
use super::parser::parse_expr;
use super::reduce::reduce;
use super::source::{sources_privileges, sources_string, Measurement, Source};
use super::timestamp::{format_rfc3339_nano, unix_nanos};
use super::types::{eval_type, field_dimensions, FieldMapper};
use super::walk::{rewrite_func, walk_fn, Node};

/// Nanoseconds between 0001-01-01 and the Unix epoch
const ZERO_TIME_OFFSET: i128 = 62_135_596_800 * 1_000_000_000;

/// How empty GROUP BY time() windows are filled
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum FillOption {
    /// Emit null for empty windows
    #[default]
    Null,
    /// Drop empty windows
    NoFill,
    Number(FillValue),
    Previous,
    Linear,
}

/// A numeric fill value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for FillValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => f.write_str(&super::expr::format_number(*v)),
        }
    }
}

/// An ORDER BY entry
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    /// Empty for a bare `ORDER BY ASC`
    pub name: String,
    pub ascending: bool,
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            write!(f, "{} ", self.name)?;
        }
        f.write_str(if self.ascending { "ASC" } else { "DESC" })
    }
}

/// The destination of `SELECT ... INTO`
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub measurement: Measurement,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INTO {}", self.measurement)?;
        if self.measurement.name.is_empty() {
            f.write_str(":MEASUREMENT")?;
        }
        Ok(())
    }
}

/// A SELECT statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStatement {
    pub fields: Vec<Field>,
    pub target: Option<Target>,
    pub dimensions: Vec<Dimension>,
    pub sources: Vec<Source>,
    pub condition: Option<Expr>,
    pub sort_fields: Vec<SortField>,
    /// Maximum rows, unlimited when zero
    pub limit: usize,
    pub offset: usize,
    /// Maximum series, unlimited when zero
    pub slimit: usize,
    pub soffset: usize,
    /// True unless a field is an aggregate call
    pub is_raw_query: bool,
    pub fill: FillOption,
    pub location: Option<Tz>,
    /// Renames the implicit time column
    pub time_alias: String,
    /// Removes the time column from the output
    pub omit_time: bool,
    pub strip_name: bool,
    pub emit_name: String,
    pub dedupe: bool,
}

/// Variable and call names used by the fields, in field order
pub fn field_names(fields: &[Field]) -> Vec<String> {
    let mut names = Vec::new();
    for f in fields {
        match &f.expr {
            Expr::Call(c) => names.push(c.name.clone()),
            Expr::VarRef(r) => names.push(r.val.clone()),
            e @ (Expr::Binary(_) | Expr::Paren(_)) => names.extend(walk_names(e)),
            _ => {}
        }
    }
    names
}

/// Output name of each field
pub fn alias_names(fields: &[Field]) -> Vec<String> {
    fields.iter().map(Field::name).collect()
}

impl SelectStatement {
    /// Whether results are ordered oldest first
    pub fn time_ascending(&self) -> bool {
        self.sort_fields.first().map_or(true, |f| f.ascending)
    }

    /// Name of the implicit time column
    pub fn time_field_name(&self) -> &str {
        if self.time_alias.is_empty() {
            "time"
        } else {
            &self.time_alias
        }
    }

    pub fn has_wildcard(&self) -> bool {
        self.has_field_wildcard() || self.has_dimension_wildcard()
    }

    /// Whether any field contains `*` or a regex
    pub fn has_field_wildcard(&self) -> bool {
        let mut found = false;
        for f in &self.fields {
            walk_fn(Node::Field(f), |n| {
                if matches!(n, Node::Expr(Expr::Wildcard(_) | Expr::Regex(_))) {
                    found = true;
                }
            });
        }
        found
    }

    /// Whether GROUP BY has `*` or a regex
    pub fn has_dimension_wildcard(&self) -> bool {
        self.dimensions
            .iter()
            .any(|d| matches!(d.expr, Expr::Wildcard(_) | Expr::Regex(_)))
    }

    /// Read access to the sources plus write access to the INTO database
    pub fn required_privileges(&self) -> Vec<ExecutionPrivilege> {
        let mut privs = sources_privileges(&self.sources);
        if let Some(target) = &self.target {
            privs.push(ExecutionPrivilege::new(&target.measurement.database, Privilege::Write));
        }
        privs
    }

    /// The `time()` interval from GROUP BY, zero when absent
    pub fn group_by_interval(&self) -> QueryResult<i64> {
        for d in &self.dimensions {
            if let Expr::Call(call) = &d.expr {
                if call.name != "time" {
                    continue;
                }
                if call.args.is_empty() || call.args.len() > 2 {
                    return Err(QueryError::Dimension(
                        "time dimension expected 1 or 2 arguments".to_string(),
                    ));
                }
                return match call.args[0] {
                    Expr::Duration(d) => Ok(d),
                    _ => Err(QueryError::Dimension(
                        "time dimension must have duration argument".to_string(),
                    )),
                };
            }
        }
        Ok(0)
    }

    /// The `time()` offset from GROUP BY, reduced modulo the interval
    pub fn group_by_offset(&self) -> QueryResult<i64> {
        let interval = self.group_by_interval()?;

        for d in &self.dimensions {
            let Expr::Call(call) = &d.expr else {
                continue;
            };
            if call.name != "time" {
                continue;
            }
            let Some(offset) = call.args.get(1) else {
                return Ok(0);
            };
            return match offset {
                Expr::Duration(_) | Expr::Time(_) if interval == 0 => Ok(0),
                Expr::Duration(d) => Ok(d.wrapping_rem(interval)),
                Expr::Time(t) => {
                    let since_zero = unix_nanos(t) as i128 + ZERO_TIME_OFFSET;
                    Ok(since_zero.rem_euclid(interval as i128) as i64)
                }
                other => Err(QueryError::Dimension(format!(
                    "invalid time dimension offset: {}",
                    other
                ))),
            };
        }
        Ok(0)
    }

    /// Replace any time bounds in the condition with `[start, end)`.
    ///
    /// Existing time comparisons and calls are folded away; the remaining
    /// condition is kept and ANDed with the new bounds.
    pub fn set_time_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResult<()> {
        let mut cond = format!(
            "time >= '{}' AND time < '{}'",
            format_rfc3339_nano(&start),
            format_rfc3339_nano(&end)
        );
        if let Some(existing) = self.condition.take() {
            let stripped = rewrite_func(existing, &mut |e| match e {
                Expr::Binary(b) if b.lhs.to_string() == "time" => Expr::Boolean(true),
                Expr::Call(_) => Expr::Boolean(true),
                other => other,
            });
            cond = format!("{} AND {}", stripped, cond);
        }

        let expr = parse_expr(&cond)?;
        self.condition = Some(reduce(expr, None));
        Ok(())
    }

    /// Index and expression of the field named `name`. Also matches the
    /// tag arguments of `top()` and `bottom()`.
    pub fn field_expr_by_name(&self, name: &str) -> Option<(usize, &Expr)> {
        for (i, f) in self.fields.iter().enumerate() {
            if f.name() == name {
                return Some((i, &f.expr));
            }
            if let Expr::Call(call) = &f.expr {
                if (call.name == "top" || call.name == "bottom") && call.args.len() > 2 {
                    let tags = &call.args[1..call.args.len() - 1];
                    if let Some(arg) = tags.iter().find(|a| matches!(a, Expr::VarRef(r) if r.val == name)) {
                        return Some((i, arg));
                    }
                }
            }
        }
        None
    }

    /// Output column names. The time column comes first unless omitted,
    /// aliases are reserved before generated names, and generated names that
    /// collide get a `_N` suffix.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns: Vec<Field> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            columns.push(field.clone());
            if let Expr::Call(call) = &field.expr {
                if self.target.is_none() && (call.name == "top" || call.name == "bottom") {
                    for arg in call.args.iter().skip(1) {
                        if let Expr::VarRef(r) = arg {
                            columns.push(Field::new(Expr::VarRef(r.clone())));
                        }
                    }
                }
            }
        }

        let offset = usize::from(!self.omit_time);
        let mut names = vec![String::new(); columns.len() + offset];
        if !self.omit_time {
            names[0] = self.time_field_name().to_string();
        }

        let mut seen: HashMap<String, usize> = HashMap::new();
        for (i, col) in columns.iter().enumerate() {
            if let Some(alias) = col.alias.as_deref().filter(|a| !a.is_empty()) {
                names[i + offset] = alias.to_string();
                seen.insert(alias.to_string(), 1);
            }
        }

        for (i, col) in columns.iter().enumerate() {
            if !names[i + offset].is_empty() {
                continue;
            }
            let mut name = col.name();
            if let Some(&start) = seen.get(&name) {
                let mut count = start;
                loop {
                    let resolved = format!("{}_{}", name, count);
                    if !seen.contains_key(&resolved) {
                        seen.insert(name.clone(), count + 1);
                        name = resolved;
                        break;
                    }
                    count += 1;
                }
            }
            *seen.entry(name.clone()).or_insert(0) += 1;
            names[i + offset] = name;
        }
        names
    }

    /// Turn `DISTINCT x` into `distinct(x)`, at the top of a field or as a
    /// call argument. A top-level conversion makes the query an aggregate.
    pub fn rewrite_distinct(&mut self) {
        for field in &mut self.fields {
            if let Expr::Distinct(val) = &field.expr {
                field.expr = Expr::call("distinct", vec![Expr::var_ref(val.clone())]);
                self.is_raw_query = false;
            }
            let expr = std::mem::replace(&mut field.expr, Expr::Nil);
            field.expr = rewrite_func(expr, &mut |e| match e {
                Expr::Call(Call { name, args }) => Expr::Call(Call {
                    name,
                    args: args
                        .into_iter()
                        .map(|a| match a {
                            Expr::Distinct(val) => Expr::call("distinct", vec![Expr::var_ref(val)]),
                            other => other,
                        })
                        .collect(),
                }),
                other => other,
            });
        }
    }

    /// Remove fields that select `time` directly, keeping their alias as
    /// the time column name.
    pub fn rewrite_time_fields(&mut self) {
        let mut alias = None;
        self.fields.retain(|f| match &f.expr {
            Expr::VarRef(r) if r.val == "time" => {
                alias = Some(f.alias.clone().unwrap_or_default());
                false
            }
            _ => true,
        });
        if let Some(alias) = alias {
            self.time_alias = alias;
        }
    }

    /// Resolve variable types and expand wildcards and regexes in fields and
    /// dimensions. Subqueries are rewritten first. The receiver is unchanged.
    pub fn rewrite_fields(&self, mapper: &dyn FieldMapper) -> QueryResult<SelectStatement> {
        let mut other = self.clone();

        for src in &mut other.sources {
            if let Source::SubQuery(inner) = src {
                *inner = Box::new(inner.rewrite_fields(mapper)?);
            }
        }

        let sources = std::mem::take(&mut other.sources);
        let mut assign_type = |e: Expr| match e {
            Expr::VarRef(r) if matches!(r.data_type, DataType::Unknown | DataType::AnyField) => {
                let typ = eval_type(&Expr::VarRef(r.clone()), &sources, mapper);
                if typ == DataType::Tag && r.data_type == DataType::AnyField {
                    Expr::VarRef(r)
                } else {
                    Expr::VarRef(VarRef { val: r.val, data_type: typ })
                }
            }
            other => other,
        };
        other.fields = std::mem::take(&mut other.fields)
            .into_iter()
            .map(|f| Field {
                expr: rewrite_func(f.expr, &mut assign_type),
                alias: f.alias,
            })
            .collect();
        other.condition = other.condition.take().map(|c| rewrite_func(c, &mut assign_type));
        other.sources = sources;

        let has_field_wildcard = other.has_field_wildcard();
        let has_dimension_wildcard = other.has_dimension_wildcard();
        if !has_field_wildcard && !has_dimension_wildcard {
            return Ok(other);
        }

        let (field_set, mut dimension_set) = field_dimensions(&other.sources, mapper)?;

        if !has_dimension_wildcard {
            for d in &other.dimensions {
                if let Expr::VarRef(r) = &d.expr {
                    dimension_set.remove(&r.val);
                }
            }
        }

        let mut fields: Vec<VarRef> = Vec::new();
        if !field_set.is_empty() {
            fields.extend(field_set.into_iter().map(|(val, data_type)| VarRef { val, data_type }));
            if !has_dimension_wildcard {
                fields.extend(dimension_set.drain().map(|val| VarRef {
                    val,
                    data_type: DataType::Tag,
                }));
            }
            fields.sort();
        }
        let mut dimensions: Vec<String> = dimension_set.into_iter().collect();
        dimensions.sort();

        if has_field_wildcard {
            let mut rewritten = Vec::with_capacity(other.fields.len() + fields.len());
            for f in std::mem::take(&mut other.fields) {
                expand_field(f, &fields, &mut rewritten)?;
            }
            other.fields = rewritten;
        }

        if has_dimension_wildcard {
            let mut rewritten = Vec::with_capacity(other.dimensions.len() + dimensions.len());
            for d in std::mem::take(&mut other.dimensions) {
                match &d.expr {
                    Expr::Wildcard(_) => {
                        rewritten.extend(dimensions.iter().map(|name| Dimension::new(Expr::var_ref(name.clone()))));
                    }
                    Expr::Regex(re) => {
                        rewritten.extend(
                            dimensions
                                .iter()
                                .filter(|name| re.is_match(name))
                                .map(|name| Dimension::new(Expr::var_ref(name.clone()))),
                        );
                    }
                    _ => rewritten.push(d),
                }
            }
            other.dimensions = rewritten;
        }

        Ok(other)
    }
}

/// Expand one field against the sorted list of known keys.
fn expand_field(f: Field, keys: &[VarRef], out: &mut Vec<Field>) -> QueryResult<()> {
    match &f.expr {
        Expr::Wildcard(kind) => {
            for key in keys {
                let skip = match kind {
                    WildcardType::Field => key.data_type == DataType::Tag,
                    WildcardType::Tag => key.data_type != DataType::Tag,
                    WildcardType::All => false,
                };
                if !skip {
                    out.push(Field::new(Expr::VarRef(key.clone())));
                }
            }
        }
        Expr::Regex(re) => {
            out.extend(
                keys.iter()
                    .filter(|k| re.is_match(&k.val))
                    .map(|k| Field::new(Expr::VarRef(k.clone()))),
            );
        }
        Expr::Call(call) => {
            let Some((name, arg)) = innermost_call(call) else {
                out.push(f);
                return Ok(());
            };
            let re = match arg {
                Expr::Wildcard(WildcardType::Tag) => {
                    return Err(QueryError::Rewrite(format!(
                        "unable to use tag wildcard in {}()",
                        name
                    )));
                }
                Expr::Wildcard(_) => None,
                Expr::Regex(re) => Some(re.clone()),
                _ => {
                    out.push(f);
                    return Ok(());
                }
            };

            let supported = supported_wildcard_types(name);
            let field_name = f.name();
            for key in keys {
                if key.data_type == DataType::Tag || !supported.contains(&key.data_type) {
                    continue;
                }
                if let Some(re) = &re {
                    if !re.is_match(&key.val) {
                        continue;
                    }
                }
                out.push(Field {
                    expr: Expr::Call(replace_innermost_arg(call, Expr::VarRef(key.clone()))),
                    alias: Some(format!("{}_{}", field_name, key.val)),
                });
            }
        }
        Expr::Binary(_) => {
            let mut regex = false;
            let mut wildcard = false;
            walk_fn(Node::Expr(&f.expr), |n| match n {
                Node::Expr(Expr::Regex(_)) => regex = true,
                Node::Expr(Expr::Wildcard(_)) => wildcard = true,
                _ => {}
            });
            if wildcard {
                return Err(QueryError::Rewrite(format!(
                    "unsupported expression with wildcard: {}",
                    f.expr
                )));
            }
            if regex {
                return Err(QueryError::Rewrite(format!(
                    "unsupported expression with regex field: {}",
                    f.expr
                )));
            }
            out.push(f);
        }
        _ => out.push(f),
    }
    Ok(())
}

/// Name and first argument of the innermost nested call
fn innermost_call(call: &Call) -> Option<(&str, &Expr)> {
    let mut call = call;
    loop {
        match call.args.first()? {
            Expr::Call(inner) => call = inner,
            arg => return Some((&call.name, arg)),
        }
    }
}

fn replace_innermost_arg(call: &Call, arg: Expr) -> Call {
    let mut out = call.clone();
    match out.args.first_mut() {
        Some(Expr::Call(inner)) => *inner = replace_innermost_arg(inner, arg),
        Some(first) => *first = arg,
        None => {}
    }
    out
}

/// Field types a call accepts when its argument is a wildcard
fn supported_wildcard_types(name: &str) -> Vec<DataType> {
    let mut types = vec![DataType::Float, DataType::Integer, DataType::Unsigned];
    match name {
        "count" | "first" | "last" | "distinct" | "elapsed" | "mode" | "sample" => {
            types.push(DataType::String);
            types.push(DataType::Boolean);
        }
        "min" | "max" => types.push(DataType::Boolean),
        "holt_winters" | "holt_winters_with_fit" => types.retain(|t| *t != DataType::Unsigned),
        _ => {}
    }
    types
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {}", join_display(&self.fields, ", "))?;
        if let Some(target) = &self.target {
            write!(f, " {}", target)?;
        }
        if !self.sources.is_empty() {
            write!(f, " FROM {}", sources_string(&self.sources))?;
        }
        if let Some(cond) = &self.condition {
            write!(f, " WHERE {}", cond)?;
        }
        if !self.dimensions.is_empty() {
            write!(f, " GROUP BY {}", join_display(&self.dimensions, ", "))?;
        }
        match self.fill {
            FillOption::Null => {}
            FillOption::NoFill => f.write_str(" fill(none)")?,
            FillOption::Number(v) => write!(f, " fill({})", v)?,
            FillOption::Linear => f.write_str(" fill(linear)")?,
            FillOption::Previous => f.write_str(" fill(previous)")?,
        }
        if !self.sort_fields.is_empty() {
            write!(f, " ORDER BY {}", join_display(&self.sort_fields, ", "))?;
        }
        if self.limit > 0 {
            write!(f, " LIMIT {}", self.limit)?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        if self.slimit > 0 {
            write!(f, " SLIMIT {}", self.slimit)?;
        }
        if self.soffset > 0 {
            write!(f, " SOFFSET {}", self.soffset)?;
        }
        if let Some(tz) = &self.location {
            write!(f, " TZ('{}')", tz.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::query::ast::Statement;
    use crate::query::parser::parse_statement;
    use crate::query::types::TypeMapper;

    fn select(q: &str) -> SelectStatement {
        match parse_statement(q).unwrap() {
            Statement::Select(s) => *s,
            other => panic!("expected select, got {}", other),
        }
    }

    struct Schema;

    impl TypeMapper for Schema {
        fn map_type(&self, m: &Measurement, field: &str) -> DataType {
            self.fields(m).get(field).copied().unwrap_or_default()
        }
    }

    impl Schema {
        fn fields(&self, m: &Measurement) -> HashMap<String, DataType> {
            let mut fields = HashMap::new();
            match m.name.as_str() {
                "cpu" => {
                    fields.insert("value".to_string(), DataType::Float);
                    fields.insert("count".to_string(), DataType::Integer);
                    fields.insert("label".to_string(), DataType::String);
                    fields.insert("host".to_string(), DataType::Tag);
                    fields.insert("region".to_string(), DataType::Tag);
                }
                "mem" => {
                    fields.insert("value".to_string(), DataType::Integer);
                }
                _ => {}
            }
            fields
        }
    }

    impl FieldMapper for Schema {
        fn field_dimensions(
            &self,
            m: &Measurement,
        ) -> anyhow::Result<(HashMap<String, DataType>, HashSet<String>)> {
            let mut fields = self.fields(m);
            let mut dims = HashSet::new();
            fields.retain(|name, t| {
                if *t == DataType::Tag {
                    dims.insert(name.clone());
                    false
                } else {
                    true
                }
            });
            Ok((fields, dims))
        }
    }

    #[test]
    fn test_select_display_all_clauses() {
        let q = "SELECT mean(value) INTO db.rp.:MEASUREMENT FROM cpu WHERE host = 'a' \
                 GROUP BY time(1m), host fill(none) ORDER BY time DESC LIMIT 10 OFFSET 2 \
                 SLIMIT 3 SOFFSET 1 TZ('America/New_York')";
        let s = select(q);
        assert_eq!(
            s.to_string(),
            "SELECT mean(value) INTO db.rp.:MEASUREMENT FROM cpu WHERE host = 'a' \
             GROUP BY time(1m), host fill(none) ORDER BY time DESC LIMIT 10 OFFSET 2 \
             SLIMIT 3 SOFFSET 1 TZ('America/New_York')"
        );
    }

    #[test]
    fn test_fill_number_display() {
        assert_eq!(
            select("SELECT mean(v) FROM cpu GROUP BY time(1m) fill(1.5)").to_string(),
            "SELECT mean(v) FROM cpu GROUP BY time(1m) fill(1.5)"
        );
        assert_eq!(
            select("SELECT mean(v) FROM cpu GROUP BY time(1m) fill(7)").to_string(),
            "SELECT mean(v) FROM cpu GROUP BY time(1m) fill(7)"
        );
        assert_eq!(
            select("SELECT mean(v) FROM cpu GROUP BY time(1m) fill(null)").to_string(),
            "SELECT mean(v) FROM cpu GROUP BY time(1m)"
        );
    }

    #[test]
    fn test_column_names_resolves_conflicts() {
        let s = select("SELECT mean(v), mean(w) AS mean, mean(x), v FROM cpu");
        assert_eq!(s.column_names(), vec!["time", "mean_1", "mean", "mean_2", "v"]);

        let s = select("SELECT top(v, host, region, 2) FROM cpu");
        assert_eq!(s.column_names(), vec!["time", "top", "host", "region"]);

        let mut s = select("SELECT v FROM cpu");
        s.omit_time = true;
        assert_eq!(s.column_names(), vec!["v"]);
    }

    #[test]
    fn test_field_expr_by_name() {
        let s = select("SELECT max(v) AS hi, top(v, host, 3) FROM cpu");
        assert_eq!(s.field_expr_by_name("hi").map(|(i, _)| i), Some(0));
        let (i, expr) = s.field_expr_by_name("host").unwrap();
        assert_eq!(i, 1);
        assert_eq!(expr.to_string(), "host");
        assert!(s.field_expr_by_name("nothing").is_none());
    }

    #[test]
    fn test_group_by_interval_and_offset() {
        let s = select("SELECT mean(v) FROM cpu GROUP BY time(1h, 15m)");
        assert_eq!(s.group_by_interval().unwrap(), 3_600_000_000_000);
        assert_eq!(s.group_by_offset().unwrap(), 900_000_000_000);

        let s = select("SELECT mean(v) FROM cpu GROUP BY time(1h, 75m)");
        assert_eq!(s.group_by_offset().unwrap(), 900_000_000_000);

        let mut s = select("SELECT mean(v) FROM cpu GROUP BY time(1h)");
        let at = crate::query::timestamp::parse_time_string("2021-01-01 00:20:00", None).unwrap();
        s.dimensions[0] = Dimension::new(Expr::call(
            "time",
            vec![Expr::Duration(3_600_000_000_000), Expr::Time(at)],
        ));
        assert_eq!(s.group_by_offset().unwrap(), 1_200_000_000_000);

        let s = select("SELECT mean(v) FROM cpu GROUP BY host");
        assert_eq!(s.group_by_interval().unwrap(), 0);
    }

    #[test]
    fn test_group_by_interval_errors() {
        let s = select("SELECT mean(v) FROM cpu GROUP BY time(host)");
        assert_eq!(
            s.group_by_interval().unwrap_err().to_string(),
            "time dimension must have duration argument"
        );

        let s = select("SELECT mean(v) FROM cpu GROUP BY time()");
        assert_eq!(
            s.group_by_interval().unwrap_err().to_string(),
            "time dimension expected 1 or 2 arguments"
        );

        let s = select("SELECT mean(v) FROM cpu GROUP BY time(1m, host)");
        assert_eq!(
            s.group_by_offset().unwrap_err().to_string(),
            "invalid time dimension offset: host"
        );
    }

    #[test]
    fn test_set_time_range_replaces_existing_bounds() {
        let mut s = select("SELECT v FROM cpu WHERE host = 'a' AND time > now() - 1h");
        let start = crate::query::timestamp::time_from_nanos(0);
        let end = crate::query::timestamp::time_from_nanos(60_000_000_000);
        s.set_time_range(start, end).unwrap();
        assert_eq!(
            s.condition.unwrap().to_string(),
            "host = 'a' AND time >= '1970-01-01T00:00:00Z' AND time < '1970-01-01T00:01:00Z'"
        );
    }

    #[test]
    fn test_rewrite_distinct() {
        let mut s = select("SELECT DISTINCT host FROM cpu");
        s.rewrite_distinct();
        assert_eq!(s.to_string(), "SELECT distinct(host) FROM cpu");
        assert!(!s.is_raw_query);

        let mut s = select("SELECT count(DISTINCT host) FROM cpu");
        s.rewrite_distinct();
        assert_eq!(s.to_string(), "SELECT count(distinct(host)) FROM cpu");
    }

    #[test]
    fn test_rewrite_time_fields() {
        let mut s = select("SELECT time AS ts, v FROM cpu");
        s.rewrite_time_fields();
        assert_eq!(s.to_string(), "SELECT v FROM cpu");
        assert_eq!(s.time_field_name(), "ts");
    }

    #[test]
    fn test_rewrite_fields_types_var_refs() {
        let s = select("SELECT value, host FROM cpu WHERE label = 'x'");
        let out = s.rewrite_fields(&Schema).unwrap();
        assert_eq!(
            out.to_string(),
            "SELECT value::float, host::tag FROM cpu WHERE label::string = 'x'"
        );
    }

    #[test]
    fn test_rewrite_fields_expands_wildcards() {
        let out = select("SELECT * FROM cpu").rewrite_fields(&Schema).unwrap();
        assert_eq!(
            out.to_string(),
            "SELECT count::integer, host::tag, label::string, region::tag, value::float FROM cpu"
        );

        let out = select("SELECT *::field FROM cpu GROUP BY host").rewrite_fields(&Schema).unwrap();
        assert_eq!(
            out.to_string(),
            "SELECT count::integer, label::string, value::float FROM cpu GROUP BY host"
        );

        let out = select("SELECT /^v/ FROM cpu").rewrite_fields(&Schema).unwrap();
        assert_eq!(out.to_string(), "SELECT value::float FROM cpu");

        let out = select("SELECT mean(*) FROM cpu").rewrite_fields(&Schema).unwrap();
        assert_eq!(
            out.to_string(),
            "SELECT mean(count::integer) AS mean_count, mean(value::float) AS mean_value FROM cpu"
        );

        let out = select("SELECT v FROM cpu GROUP BY *").rewrite_fields(&Schema).unwrap();
        assert_eq!(out.to_string(), "SELECT v FROM cpu GROUP BY host, region");
    }

    #[test]
    fn test_rewrite_fields_errors() {
        let err = select("SELECT mean(*::tag) FROM cpu").rewrite_fields(&Schema).unwrap_err();
        assert_eq!(err.to_string(), "unable to use tag wildcard in mean()");

        let err = select("SELECT * + 1 FROM cpu").rewrite_fields(&Schema).unwrap_err();
        assert_eq!(err.to_string(), "unsupported expression with wildcard: * + 1");
    }

    #[test]
    fn test_required_privileges_include_target() {
        let s = select("SELECT v INTO other..cpu_copy FROM db0..cpu");
        let privs = s.required_privileges();
        assert_eq!(privs.len(), 2);
        assert_eq!(privs[0].name, "db0");
        assert_eq!(privs[0].privilege, Privilege::Read);
        assert_eq!(privs[1].name, "other");
        assert_eq!(privs[1].privilege, Privilege::Write);
    }

    #[test]
    fn test_field_and_alias_names() {
        let s = select("SELECT a + b AS sum, max(c), d FROM cpu");
        assert_eq!(field_names(&s.fields), vec!["a", "b", "max", "d"]);
        assert_eq!(alias_names(&s.fields), vec!["sum", "max", "d"]);
    }
}
