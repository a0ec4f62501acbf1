//! Type inference for expressions
//!
//! Variable types come from a [`TypeMapper`] consulted for every measurement
//! a statement reads from. When a name has different types in different
//! measurements the widest one wins (see [`DataType::less_than`]). Names read
//! from a subquery take the type of the subquery field that produces them, or
//! `tag` when the subquery groups by them.

use std::collections::{HashMap, HashSet};

use super::data_type::DataType;
use super::error::{QueryResult, TypeError};
use super::eval::{MapValuer, Value, ValuerEval};
use super::expr::{BinaryExpr, Call, Expr, VarRef};
use super::source::{Measurement, Source};

/// Maps fields of a measurement, and optionally function calls, to types
pub trait TypeMapper {
    /// Type of `field` in `measurement`, `Unknown` if it does not exist
    fn map_type(&self, measurement: &Measurement, field: &str) -> DataType;

    /// Result type of calling `name` with arguments of the given types.
    /// Mappers that know nothing about functions leave calls untyped.
    fn call_type(&self, _name: &str, _args: &[DataType]) -> anyhow::Result<DataType> {
        Ok(DataType::Unknown)
    }
}

/// A [`TypeMapper`] that can also list every field and tag of a measurement
pub trait FieldMapper: TypeMapper {
    /// Fields with their types, and tag keys
    fn field_dimensions(
        &self,
        measurement: &Measurement,
    ) -> anyhow::Result<(HashMap<String, DataType>, HashSet<String>)>;
}

/// Knows no types
#[derive(Debug, Clone, Copy, Default)]
pub struct NilTypeMapper;

impl TypeMapper for NilTypeMapper {
    fn map_type(&self, _measurement: &Measurement, _field: &str) -> DataType {
        DataType::Unknown
    }
}

/// Asks each mapper in turn and returns the first known type. It does not
/// look for the widest type across mappers.
#[derive(Default)]
pub struct MultiTypeMapper<'a>(pub Vec<&'a dyn TypeMapper>);

impl<'a> MultiTypeMapper<'a> {
    pub fn new(mappers: Vec<&'a dyn TypeMapper>) -> Self {
        Self(mappers)
    }
}

impl TypeMapper for MultiTypeMapper<'_> {
    fn map_type(&self, measurement: &Measurement, field: &str) -> DataType {
        self.0
            .iter()
            .map(|m| m.map_type(measurement, field))
            .find(|t| *t != DataType::Unknown)
            .unwrap_or_default()
    }

    fn call_type(&self, name: &str, args: &[DataType]) -> anyhow::Result<DataType> {
        for m in &self.0 {
            let typ = m.call_type(name, args)?;
            if typ != DataType::Unknown {
                return Ok(typ);
            }
        }
        Ok(DataType::Unknown)
    }
}

/// Evaluates the output type of expressions read from `sources`
pub struct TypeValuerEval<'a, M: TypeMapper + ?Sized> {
    pub mapper: &'a M,
    pub sources: &'a [Source],
}

impl<'a, M: TypeMapper + ?Sized> TypeValuerEval<'a, M> {
    pub fn new(mapper: &'a M, sources: &'a [Source]) -> Self {
        Self { mapper, sources }
    }

    /// Type of an already reduced expression
    pub fn eval_type(&self, expr: &Expr) -> QueryResult<DataType> {
        match expr {
            Expr::VarRef(r) => self.eval_var_ref_type(r),
            Expr::Call(c) => self.eval_call_type(c),
            Expr::Binary(b) => self.eval_binary_type(b),
            Expr::Paren(inner) => self.eval_type(inner),
            Expr::Number(_) => Ok(DataType::Float),
            Expr::Integer(_) => Ok(DataType::Integer),
            Expr::Unsigned(_) => Ok(DataType::Unsigned),
            Expr::String(_) => Ok(DataType::String),
            Expr::Boolean(_) => Ok(DataType::Boolean),
            _ => Ok(DataType::Unknown),
        }
    }

    fn eval_var_ref_type(&self, r: &VarRef) -> QueryResult<DataType> {
        if !matches!(r.data_type, DataType::Unknown | DataType::AnyField) {
            return Ok(r.data_type);
        }

        let mut typ = DataType::Unknown;
        for src in self.sources {
            match src {
                Source::Measurement(m) => {
                    let t = self.mapper.map_type(m, &r.val);
                    if typ.less_than(t) {
                        typ = t;
                    }
                }
                Source::SubQuery(stmt) => {
                    if let Some((_, e)) = stmt.field_expr_by_name(&r.val) {
                        let inner = TypeValuerEval::new(self.mapper, &stmt.sources);
                        let t = inner.eval_type(e)?;
                        if typ.less_than(t) {
                            typ = t;
                        }
                    }

                    if typ == DataType::Unknown {
                        let grouped = stmt
                            .dimensions
                            .iter()
                            .any(|d| matches!(&d.expr, Expr::VarRef(dim) if dim.val == r.val));
                        if grouped {
                            typ = DataType::Tag;
                        }
                    }
                }
            }
        }
        Ok(typ)
    }

    fn eval_call_type(&self, call: &Call) -> QueryResult<DataType> {
        let args = call
            .args
            .iter()
            .map(|a| self.eval_type(a))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(self.mapper.call_type(&call.name, &args)?)
    }

    fn eval_binary_type(&self, expr: &BinaryExpr) -> QueryResult<DataType> {
        let lhs = self.eval_type(&expr.lhs)?;
        let rhs = self.eval_type(&expr.rhs)?;

        // Mixing integers and unsigned integers needs a cast unless the
        // integer side is a literal.
        let mixed = match (lhs, rhs) {
            (DataType::Unsigned, DataType::Integer) => Some((&expr.lhs, &expr.rhs)),
            (DataType::Integer, DataType::Unsigned) => Some((&expr.rhs, &expr.lhs)),
            _ => None,
        };
        if let Some((unsigned_side, integer_side)) = mixed {
            if unsigned_side.is_literal() {
                return Err(type_error(
                    expr,
                    format!("cannot use {} with an integer and unsigned literal", expr.op),
                ));
            } else if !integer_side.is_literal() {
                return Err(type_error(
                    expr,
                    format!(
                        "cannot use {} between an integer and unsigned, an explicit cast is required",
                        expr.op
                    ),
                ));
            }
        }

        if lhs == DataType::Unknown {
            return Ok(rhs);
        } else if rhs == DataType::Unknown {
            return Ok(lhs);
        }

        // Evaluate the operator on zero values and read the type of the result.
        let mut values = MapValuer::new();
        values.insert("lhs", Value::zero(lhs)).insert("rhs", Value::zero(rhs));
        let probe = Expr::binary(expr.op, Expr::var_ref("lhs"), Expr::var_ref("rhs"));
        let typ = ValuerEval::new(&values).eval(&probe).data_type();
        if typ == DataType::Unknown {
            return Err(type_error(expr, format!("incompatible types: {} and {}", lhs, rhs)));
        }
        Ok(typ)
    }
}

fn type_error(expr: &BinaryExpr, message: String) -> super::error::QueryError {
    TypeError::new(Expr::Binary(Box::new(expr.clone())), message).into()
}

/// Type of `expr` read from `sources`; `Unknown` when it cannot be typed.
pub fn eval_type<M: TypeMapper + ?Sized>(expr: &Expr, sources: &[Source], mapper: &M) -> DataType {
    TypeValuerEval::new(mapper, sources)
        .eval_type(expr)
        .unwrap_or_default()
}

/// Every field, with its widest type, and every tag key across `sources`.
/// Subqueries contribute their output fields and the tags they group by.
pub fn field_dimensions<M: FieldMapper + ?Sized>(
    sources: &[Source],
    mapper: &M,
) -> QueryResult<(HashMap<String, DataType>, HashSet<String>)> {
    let mut fields: HashMap<String, DataType> = HashMap::new();
    let mut dimensions = HashSet::new();

    for src in sources {
        match src {
            Source::Measurement(m) => {
                let (f, d) = mapper.field_dimensions(m)?;
                for (k, typ) in f {
                    let entry = fields.entry(k).or_default();
                    if entry.less_than(typ) {
                        *entry = typ;
                    }
                }
                dimensions.extend(d);
            }
            Source::SubQuery(stmt) => {
                for f in &stmt.fields {
                    let typ = eval_type(&f.expr, &stmt.sources, mapper);
                    let entry = fields.entry(f.name()).or_default();
                    if entry.less_than(typ) {
                        *entry = typ;
                    }
                }
                for d in &stmt.dimensions {
                    if let Expr::VarRef(r) = &d.expr {
                        dimensions.insert(r.val.clone());
                    }
                }
            }
        }
    }
    Ok((fields, dimensions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Statement;
    use crate::query::error::QueryError;
    use crate::query::parser::{parse_expr, parse_statement};
    use crate::query::select::SelectStatement;

    struct Schema;

    impl TypeMapper for Schema {
        fn map_type(&self, m: &Measurement, field: &str) -> DataType {
            match (m.name.as_str(), field) {
                ("cpu", "value") => DataType::Float,
                ("cpu", "host") => DataType::Tag,
                ("mem", "value") => DataType::Integer,
                ("mem", "free") => DataType::Unsigned,
                ("mem", "used") => DataType::Integer,
                ("disk", "path") => DataType::String,
                _ => DataType::Unknown,
            }
        }

        fn call_type(&self, name: &str, args: &[DataType]) -> anyhow::Result<DataType> {
            match name {
                "count" => Ok(DataType::Integer),
                "mean" => Ok(DataType::Float),
                "max" | "min" => Ok(args.first().copied().unwrap_or_default()),
                "bogus" => anyhow::bail!("unsupported call: bogus"),
                _ => Ok(DataType::Unknown),
            }
        }
    }

    impl FieldMapper for Schema {
        fn field_dimensions(
            &self,
            m: &Measurement,
        ) -> anyhow::Result<(HashMap<String, DataType>, HashSet<String>)> {
            let mut fields = HashMap::new();
            let mut tags = HashSet::new();
            match m.name.as_str() {
                "cpu" => {
                    fields.insert("value".to_string(), DataType::Float);
                    tags.insert("host".to_string());
                }
                "mem" => {
                    fields.insert("value".to_string(), DataType::Integer);
                    fields.insert("free".to_string(), DataType::Unsigned);
                }
                _ => {}
            }
            Ok((fields, tags))
        }
    }

    fn select(q: &str) -> SelectStatement {
        match parse_statement(q).unwrap() {
            Statement::Select(s) => *s,
            other => panic!("expected select, got {}", other),
        }
    }

    fn type_of(expr: &str, from: &str) -> QueryResult<DataType> {
        let stmt = select(&format!("SELECT x FROM {}", from));
        TypeValuerEval::new(&Schema, &stmt.sources).eval_type(&parse_expr(expr).unwrap())
    }

    #[test]
    fn test_widest_type_across_measurements() {
        assert_eq!(type_of("value", "mem").unwrap(), DataType::Integer);
        assert_eq!(type_of("value", "cpu, mem").unwrap(), DataType::Float);
        assert_eq!(type_of("value", "mem, cpu").unwrap(), DataType::Float);
        assert_eq!(type_of("nope", "cpu").unwrap(), DataType::Unknown);
    }

    #[test]
    fn test_explicit_type_wins() {
        assert_eq!(type_of("value::integer", "cpu").unwrap(), DataType::Integer);
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(type_of("value + 1", "mem").unwrap(), DataType::Integer);
        assert_eq!(type_of("value + 1.5", "mem").unwrap(), DataType::Float);
        assert_eq!(type_of("value > 1", "mem").unwrap(), DataType::Boolean);
        assert_eq!(type_of("nope + 1.5", "mem").unwrap(), DataType::Float);
        assert_eq!(type_of("free + 1", "mem").unwrap(), DataType::Unsigned);
    }

    #[test]
    fn test_incompatible_types() {
        let err = type_of("path + 1", "disk").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error: path + 1: incompatible types: string and integer"
        );
    }

    #[test]
    fn test_integer_unsigned_mix_needs_cast() {
        let err = type_of("free + used", "mem").unwrap_err();
        assert!(matches!(err, QueryError::Type(_)));
        assert_eq!(
            err.to_string(),
            "type error: free + used: cannot use + between an integer and unsigned, an explicit cast is required"
        );

        let stmt = select("SELECT x FROM mem");
        let expr = Expr::binary(
            crate::query::token::Token::Add,
            Expr::Unsigned(1),
            Expr::var_ref("used"),
        );
        let err = TypeValuerEval::new(&Schema, &stmt.sources).eval_type(&expr).unwrap_err();
        assert!(err.to_string().ends_with("cannot use + with an integer and unsigned literal"));
    }

    #[test]
    fn test_call_types() {
        assert_eq!(type_of("count(value)", "cpu").unwrap(), DataType::Integer);
        assert_eq!(type_of("max(value)", "mem").unwrap(), DataType::Integer);
        assert!(matches!(type_of("bogus(value)", "cpu"), Err(QueryError::Mapper(_))));

        let stmt = select("SELECT x FROM cpu");
        assert_eq!(
            eval_type(&parse_expr("mean(value)").unwrap(), &stmt.sources, &NilTypeMapper),
            DataType::Unknown
        );
    }

    #[test]
    fn test_subquery_field_and_dimension_types() {
        let from = "(SELECT mean(value) AS avg, value AS raw FROM mem GROUP BY host)";
        assert_eq!(type_of("avg", from).unwrap(), DataType::Float);
        assert_eq!(type_of("raw", from).unwrap(), DataType::Integer);
        assert_eq!(type_of("host", from).unwrap(), DataType::Tag);
        assert_eq!(type_of("other", from).unwrap(), DataType::Unknown);
    }

    #[test]
    fn test_multi_type_mapper() {
        struct Fallback;
        impl TypeMapper for Fallback {
            fn map_type(&self, _m: &Measurement, field: &str) -> DataType {
                if field == "extra" {
                    DataType::Boolean
                } else {
                    DataType::String
                }
            }
        }

        let multi = MultiTypeMapper::new(vec![&Schema, &Fallback]);
        let cpu = Measurement::new("cpu");
        assert_eq!(multi.map_type(&cpu, "value"), DataType::Float);
        assert_eq!(multi.map_type(&cpu, "extra"), DataType::Boolean);
        assert_eq!(multi.call_type("count", &[]).unwrap(), DataType::Integer);
        assert_eq!(multi.call_type("other", &[]).unwrap(), DataType::Unknown);
        assert!(multi.call_type("bogus", &[]).is_err());
    }

    #[test]
    fn test_field_dimensions_merges_sources() {
        let stmt = select("SELECT * FROM cpu, mem, (SELECT count(value) AS n FROM cpu GROUP BY region)");
        let (fields, dims) = field_dimensions(&stmt.sources, &Schema).unwrap();
        assert_eq!(fields.get("value"), Some(&DataType::Float));
        assert_eq!(fields.get("free"), Some(&DataType::Unsigned));
        assert_eq!(fields.get("n"), Some(&DataType::Integer));
        let mut dims: Vec<_> = dims.into_iter().collect();
        dims.sort();
        assert_eq!(dims, vec!["host", "region"]);
    }
}
