//! Parameter binding: call arguments in, store requests out.

use ormrepo_proto::{FilterExpr, Value};

use super::descriptor::{
    Arg, CountPlan, Predicate, QueryDescriptor, SelectPlan, UpdateExpr, UpdatePlan,
};
use crate::error::{Error, Result};
use crate::storage::{BoundClause, BulkStatement, NativeQuery, Store, StoreQuery, UpdateValue};

/// Positional call arguments of a query method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(pub Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument.
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.0.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Args(values)
    }
}

/// Build [`Args`] from values convertible into [`Value`].
///
/// ```rust
/// use ormrepo_core::args;
/// let args = args!["memberA", 10];
/// assert_eq!(args.len(), 2);
/// ```
#[macro_export]
macro_rules! args {
    () => { $crate::query::Args::new() };
    ($($value:expr),+ $(,)?) => {
        $crate::query::Args(vec![$($crate::proto::Value::from($value)),+])
    };
}

/// Binds arguments against a descriptor and builds store requests.
///
/// Every check happens before the store is touched.
pub struct Binder<'a> {
    store: &'a dyn Store,
}

impl<'a> Binder<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Check the argument count and types and return the coerced values.
    pub fn check(&self, descriptor: &QueryDescriptor, args: &Args) -> Result<Vec<Value>> {
        if args.len() != descriptor.params.len() {
            return Err(Error::binding(format!(
                "'{}' takes {} argument(s), got {}",
                descriptor.signature,
                descriptor.params.len(),
                args.len()
            )));
        }
        descriptor
            .params
            .iter()
            .zip(args.as_slice())
            .map(|(slot, value)| {
                if slot.collection {
                    if !value.is_array() {
                        return Err(Error::binding(format!(
                            "'{}' of '{}' expects a collection, got {}",
                            slot.name,
                            descriptor.signature,
                            value.type_name()
                        )));
                    }
                    if let Some(scalar) = slot.scalar {
                        if let Some(bad) = value.elements().iter().find(|e| !scalar.accepts(e)) {
                            return Err(Error::binding(format!(
                                "'{}' of '{}' expects {} elements, got {}",
                                slot.name,
                                descriptor.signature,
                                scalar,
                                bad.type_name()
                            )));
                        }
                    }
                    return Ok(value.clone());
                }
                if value.is_array() {
                    return Err(Error::binding(format!(
                        "'{}' of '{}' expects a single value, got {}",
                        slot.name,
                        descriptor.signature,
                        value.type_name()
                    )));
                }
                match slot.scalar {
                    Some(scalar) if !scalar.accepts(value) => Err(Error::binding(format!(
                        "'{}' of '{}' expects {}, got {}",
                        slot.name,
                        descriptor.signature,
                        scalar,
                        value.type_name()
                    ))),
                    Some(scalar) => Ok(scalar.coerce(value.clone())),
                    None => Ok(value.clone()),
                }
            })
            .collect()
    }

    /// The content query of a select.
    pub fn select(
        &self,
        descriptor: &QueryDescriptor,
        plan: &SelectPlan,
        values: &[Value],
    ) -> Result<StoreQuery> {
        Ok(StoreQuery {
            entity: descriptor.entity.clone(),
            filter: self.filter(plan.predicate.as_ref(), values)?,
            joins: plan.joins.clone(),
            order: plan.order.clone(),
            fetch: plan.fetch.clone(),
            columns: plan.columns.clone(),
            pagination: None,
            distinct: plan.distinct,
        })
    }

    /// The count query of a select.
    pub fn count(
        &self,
        descriptor: &QueryDescriptor,
        plan: &CountPlan,
        values: &[Value],
    ) -> Result<StoreQuery> {
        Ok(StoreQuery {
            filter: self.filter(plan.predicate.as_ref(), values)?,
            joins: plan.joins.clone(),
            distinct: plan.distinct,
            ..StoreQuery::new(descriptor.entity.clone())
        })
    }

    /// A bulk update statement.
    pub fn bulk(
        &self,
        descriptor: &QueryDescriptor,
        plan: &UpdatePlan,
        values: &[Value],
    ) -> Result<BulkStatement> {
        let assignments = plan
            .assignments
            .iter()
            .map(|(field, expr)| Ok((field.clone(), update_value(expr, values)?)))
            .collect::<Result<_>>()?;
        Ok(BulkStatement {
            entity: descriptor.entity.clone(),
            assignments,
            filter: self.filter(plan.predicate.as_ref(), values)?,
        })
    }

    /// Native query text with every argument available both by position
    /// and by its declared name.
    pub fn native(
        &self,
        descriptor: &QueryDescriptor,
        sql: &str,
        values: &[Value],
    ) -> NativeQuery {
        let mut query = NativeQuery::new(sql);
        query.positional = values.to_vec();
        query.named = descriptor
            .params
            .iter()
            .zip(values)
            .map(|(slot, value)| (slot.name.clone(), value.clone()))
            .collect();
        query
    }

    fn filter(&self, predicate: Option<&Predicate>, values: &[Value]) -> Result<Option<FilterExpr>> {
        predicate.map(|p| self.predicate(p, values)).transpose()
    }

    fn predicate(&self, predicate: &Predicate, values: &[Value]) -> Result<FilterExpr> {
        Ok(match predicate {
            Predicate::Clause(clause) => {
                let mut bound = Vec::with_capacity(clause.args.len());
                for arg in &clause.args {
                    let value = arg_value(arg, values)?;
                    if clause.op.takes_collection() {
                        bound.extend(value.elements());
                    } else {
                        bound.push(value);
                    }
                }
                self.store
                    .translate(&BoundClause::new(clause.field.clone(), clause.op, bound))?
            }
            Predicate::And(items) => FilterExpr::and(
                items
                    .iter()
                    .map(|item| self.predicate(item, values))
                    .collect::<Result<_>>()?,
            ),
            Predicate::Or(items) => FilterExpr::or(
                items
                    .iter()
                    .map(|item| self.predicate(item, values))
                    .collect::<Result<_>>()?,
            ),
            Predicate::Not(inner) => FilterExpr::negate(self.predicate(inner, values)?),
        })
    }
}

fn arg_value(arg: &Arg, values: &[Value]) -> Result<Value> {
    match arg {
        Arg::Param(index) => values
            .get(*index)
            .cloned()
            .ok_or_else(|| Error::binding(format!("missing argument {}", index + 1))),
        Arg::Literal(value) => Ok(value.clone()),
    }
}

fn update_value(expr: &UpdateExpr, values: &[Value]) -> Result<UpdateValue> {
    Ok(match expr {
        UpdateExpr::Field(field) => UpdateValue::Field(field.clone()),
        UpdateExpr::Arg(arg) => UpdateValue::Value(arg_value(arg, values)?),
        UpdateExpr::Binary { left, op, right } => UpdateValue::Binary {
            left: Box::new(update_value(left, values)?),
            op: *op,
            right: Box::new(update_value(right, values)?),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model;
    use crate::query::descriptor::Plan;
    use crate::query::{DescriptorResolver, QueryMethod};
    use crate::storage::{SledStore, StorageConfig};
    use std::sync::Arc;

    fn store() -> SledStore {
        SledStore::open(StorageConfig::temporary(), Arc::new(model::catalog())).unwrap()
    }

    fn descriptor(method: QueryMethod) -> QueryDescriptor {
        let catalog = model::catalog();
        DescriptorResolver::new(&catalog)
            .resolve("Member", &method, None)
            .unwrap()
    }

    #[test]
    fn test_argument_count_mismatch() {
        let store = store();
        let d = descriptor(QueryMethod::derived("findByUsernameAndAge"));
        let err = Binder::new(&store).check(&d, &args!["memberA"]).unwrap_err();
        assert!(matches!(err, Error::Binding(_)));
    }

    #[test]
    fn test_argument_type_mismatch() {
        let store = store();
        let d = descriptor(QueryMethod::derived("findByAge"));
        let err = Binder::new(&store).check(&d, &args!["ten"]).unwrap_err();
        assert!(matches!(err, Error::Binding(ref m) if m.contains("int32")));
    }

    #[test]
    fn test_integer_arguments_are_coerced() {
        let store = store();
        let d = descriptor(QueryMethod::derived("findByAge"));
        let values = Binder::new(&store).check(&d, &args![10i64]).unwrap();
        assert_eq!(values, vec![Value::Int32(10)]);
    }

    #[test]
    fn test_collection_parameter() {
        let store = store();
        let d = descriptor(
            QueryMethod::query("findByUsernames", "select m from Member m where m.username in :names")
                .params(["names"]),
        );
        let binder = Binder::new(&store);
        assert!(matches!(binder.check(&d, &args!["memberA"]), Err(Error::Binding(_))));

        let names = vec!["memberA".to_string(), "memberB".to_string()];
        let values = binder.check(&d, &args![names]).unwrap();
        let query = binder.select(&d, d.select_plan().unwrap(), &values).unwrap();
        assert_eq!(
            query.filter,
            Some(FilterExpr::in_values(
                "username",
                vec![Value::from("memberA"), Value::from("memberB")]
            ))
        );
    }

    #[test]
    fn test_bulk_statement() {
        let store = store();
        let d = descriptor(
            QueryMethod::query(
                "bulkUpdate",
                "update Member m set m.age = m.age + 1 where m.age >= :age",
            )
            .params(["age"])
            .modifying(true),
        );
        let binder = Binder::new(&store);
        let values = binder.check(&d, &args![20]).unwrap();
        let Plan::Update(plan) = &d.plan else {
            panic!("expected update plan");
        };
        let statement = binder.bulk(&d, plan, &values).unwrap();
        assert_eq!(statement.filter, Some(FilterExpr::ge("age", 20)));
        assert!(matches!(
            &statement.assignments[0].1,
            UpdateValue::Binary { left, .. } if **left == UpdateValue::Field("age".into())
        ));
    }

    #[test]
    fn test_native_binds_by_position_and_name() {
        let store = store();
        let d = descriptor(
            QueryMethod::native("findByNativeQuery", "select * from member where username = ?")
                .params(["username"]),
        );
        let binder = Binder::new(&store);
        let values = binder.check(&d, &args!["m1"]).unwrap();
        let query = binder.native(&d, "select 1", &values);
        assert_eq!(query.positional, vec![Value::from("m1")]);
        assert_eq!(query.named, vec![("username".to_string(), Value::from("m1"))]);
    }
}
