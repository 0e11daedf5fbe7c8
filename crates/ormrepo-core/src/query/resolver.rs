//! Turns declared query methods into query descriptors.
//!
//! Resolution validates everything that can be checked without the store:
//! property paths, placeholders against declared parameters, projection
//! layouts and cycles, and that a separate count query filters exactly like
//! its content query.

use std::collections::HashSet;

use ormrepo_lang::{
    CompareOp, Condition, Expr, InList, JoinKind, Operand, ParameterKind, Path, SelectList,
    SelectStatement, Statement, UpdateStatement,
};
use ormrepo_proto::{OrderDirection, OrderSpec};
use tracing::debug;

use super::derivation::{derive, Subject};
use super::descriptor::{
    Arg, Clause, Column, CountPlan, NativePlan, Output, ParamSlot, Plan, Predicate,
    QueryDescriptor, ResultShape, SelectPlan, UpdateExpr, UpdatePlan,
};
use super::method::{ProjectionSource, QueryMethod, QuerySource, Returns};
use crate::catalog::{Catalog, ScalarType};
use crate::error::{Error, Result};
use crate::projection::{ProjectionDef, ProjectionField};
use crate::storage::{ClauseOp, JoinSpec};

/// Cache key of a declared method, with the per-call projection for
/// dynamically projected methods.
pub fn method_signature(entity: &str, method: &str, projection: Option<&str>) -> String {
    match projection {
        Some(projection) => format!("{}.{}<{}>", entity, method, projection),
        None => format!("{}.{}", entity, method),
    }
}

/// Cache key of an ad-hoc explicit query.
pub fn query_signature(text: &str) -> String {
    format!("#query:{}", text)
}

/// Resolves query methods against a catalog.
pub struct DescriptorResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> DescriptorResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve a declared method. `dynamic` names the projection of a
    /// dynamically projected method.
    pub fn resolve(
        &self,
        entity: &str,
        method: &QueryMethod,
        dynamic: Option<&str>,
    ) -> Result<QueryDescriptor> {
        self.catalog.entity(entity)?;
        let signature = method_signature(entity, &method.name, dynamic);
        let projection = match (&method.projection, dynamic) {
            (ProjectionSource::None, None) => None,
            (ProjectionSource::Fixed(name), None) => Some(name.clone()),
            (ProjectionSource::Dynamic, Some(name)) => Some(name.to_string()),
            (ProjectionSource::Dynamic, None) => {
                return Err(Error::binding(format!(
                    "'{}' needs a projection type per call",
                    signature
                )))
            }
            (_, Some(name)) => {
                return Err(Error::binding(format!(
                    "'{}' does not take a projection type, got '{}'",
                    signature, name
                )))
            }
        };

        let descriptor = match &method.source {
            QuerySource::Derived => {
                let named = format!("{}.{}", entity, method.name);
                match self.catalog.named_query(entity, &named) {
                    Some(text) => self.explicit(entity, method, text, signature, projection)?,
                    None => self.derived(entity, method, signature, projection)?,
                }
            }
            QuerySource::Explicit(text) => {
                self.explicit(entity, method, text, signature, projection)?
            }
            QuerySource::Named(name) => {
                let name = name
                    .clone()
                    .unwrap_or_else(|| format!("{}.{}", entity, method.name));
                let text = self.catalog.named_query(entity, &name).ok_or_else(|| {
                    Error::resolution(format!("no named query '{}' for '{}'", name, signature))
                })?;
                self.explicit(entity, method, text, signature, projection)?
            }
            QuerySource::Native(sql) => self.native(entity, method, sql, signature, projection)?,
        };
        debug!(signature = %descriptor.signature, shape = descriptor.shape.name(), "resolved query descriptor");
        Ok(descriptor)
    }

    /// Resolve an ad-hoc explicit query. The root entity is the query's
    /// `from` target.
    pub fn resolve_query(&self, text: &str, params: &[String]) -> Result<QueryDescriptor> {
        let statement = parse(text)?;
        let (entity, modifying) = match &statement {
            Statement::Select(select) => (select.from.name.clone(), None),
            Statement::Update(update) => (update.target.name.clone(), Some(false)),
        };
        let mut method = QueryMethod::query("query", text).params(params.iter().cloned());
        method.modifying = modifying;
        let mut descriptor = self.resolve(&entity, &method, None)?;
        descriptor.signature = query_signature(text);
        Ok(descriptor)
    }

    fn derived(
        &self,
        entity: &str,
        method: &QueryMethod,
        signature: String,
        projection: Option<String>,
    ) -> Result<QueryDescriptor> {
        if method.modifying.is_some() {
            return Err(Error::resolution(format!(
                "'{}' is modifying but has no update statement",
                signature
            )));
        }
        let derived = derive(self.catalog, entity, &method.name)?;
        if !method.params.is_empty() && method.params.len() != derived.arity {
            return Err(Error::binding(format!(
                "'{}' takes {} argument(s) but declares {} parameter(s)",
                signature,
                derived.arity,
                method.params.len()
            )));
        }

        let names: Vec<String> = if method.params.is_empty() {
            derived.arg_fields.clone()
        } else {
            method.params.clone()
        };
        let mut params: Vec<Option<ParamSlot>> = vec![None; derived.arity];
        if let Some(predicate) = &derived.predicate {
            for clause in predicate.clauses() {
                let scalar = self.catalog.resolve_path(entity, &clause.field)?.field.scalar;
                for arg in &clause.args {
                    if let Arg::Param(index) = arg {
                        params[*index] = Some(ParamSlot {
                            name: names[*index].clone(),
                            scalar: Some(scalar),
                            collection: clause.op.takes_collection(),
                        });
                    }
                }
            }
        }
        let params = params.into_iter().flatten().collect();

        let shape = match derived.subject {
            Subject::Find => returns_shape(method.returns),
            Subject::Count => ResultShape::Count,
            Subject::Exists => ResultShape::Exists,
            Subject::Delete => ResultShape::Delete,
        };

        let mut fetch = self.fetch(entity, &method.fetch)?;
        let count = match &method.count_query {
            Some(text) => {
                let count = self.count_plan(entity, text, &method.params, &signature)?;
                check_count_matches(&signature, &derived.predicate, &[], &count)?;
                count
            }
            None => CountPlan {
                predicate: derived.predicate.clone(),
                joins: Vec::new(),
                distinct: derived.distinct,
            },
        };
        let mut plan = SelectPlan {
            predicate: derived.predicate,
            joins: Vec::new(),
            order: derived.order,
            fetch: Vec::new(),
            output: Output::Entity,
            columns: None,
            limit: derived.limit,
            distinct: derived.distinct,
            count,
        };
        if let Some(name) = &projection {
            check_projectable(&signature, shape)?;
            plan.columns = self.entity_projection(entity, name, &mut fetch)?;
        }
        plan.fetch = fetch;

        Ok(QueryDescriptor {
            signature,
            entity: entity.to_string(),
            method: method.name.clone(),
            plan: Plan::Select(plan),
            shape,
            params,
            read_only: method.read_only,
            projection,
            accepts_sort: accepts_sort(method),
        })
    }

    fn explicit(
        &self,
        entity: &str,
        method: &QueryMethod,
        text: &str,
        signature: String,
        projection: Option<String>,
    ) -> Result<QueryDescriptor> {
        let mut params = ParamCollector::new(&method.params, &signature);
        let (plan, shape, projection) = match parse(text)? {
            Statement::Select(select) => {
                if method.modifying.is_some() {
                    return Err(Error::resolution(format!(
                        "'{}' is modifying but its query is a select",
                        signature
                    )));
                }
                self.check_root(entity, &select.from.name, &signature)?;
                let (plan, shape, projection) =
                    self.select(entity, method, &select, &mut params, &signature, projection)?;
                (Plan::Select(plan), shape, projection)
            }
            Statement::Update(update) => {
                let Some(clear) = method.modifying else {
                    return Err(Error::resolution(format!(
                        "'{}' runs an update statement but is not declared modifying",
                        signature
                    )));
                };
                if projection.is_some() {
                    return Err(Error::resolution(format!(
                        "'{}' is modifying and cannot be projected",
                        signature
                    )));
                }
                self.check_root(entity, &update.target.name, &signature)?;
                let plan = self.update(entity, &update, &mut params)?;
                (Plan::Update(plan), ResultShape::Modifying { clear }, None)
            }
        };

        let params = params.finish()?;
        Ok(QueryDescriptor {
            signature,
            entity: entity.to_string(),
            method: method.name.clone(),
            plan,
            shape,
            params,
            read_only: method.read_only,
            projection,
            accepts_sort: accepts_sort(method),
        })
    }

    fn select(
        &self,
        entity: &str,
        method: &QueryMethod,
        select: &SelectStatement,
        params: &mut ParamCollector<'_>,
        signature: &str,
        projection: Option<String>,
    ) -> Result<(SelectPlan, ResultShape, Option<String>)> {
        let scope = self.scope(entity, select)?;
        let mut fetch = self.fetch(entity, &method.fetch)?;
        for join in &select.joins {
            if join.fetch {
                let relation = scope.relation_path(&join.target)?;
                if !fetch.contains(&relation) {
                    fetch.push(relation);
                }
            }
        }

        let predicate = match &select.condition {
            Some(condition) => Some(self.condition(&scope, condition, params)?),
            None => None,
        };
        let order = select
            .order_by
            .iter()
            .map(|item| {
                Ok(OrderSpec {
                    field: scope.field_path(self.catalog, &item.path)?,
                    direction: if item.descending {
                        OrderDirection::Desc
                    } else {
                        OrderDirection::Asc
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut shape = returns_shape(method.returns);
        let mut projection = projection;
        let output = match &select.output {
            SelectList::Star => Output::Entity,
            SelectList::Count(_) => {
                shape = ResultShape::Count;
                Output::Count
            }
            SelectList::Items(items) => {
                if let [item] = items.as_slice() {
                    if item.path.segments.len() == 1 && scope.is_root(item.path.head()) {
                        Output::Entity
                    } else {
                        Output::Columns(vec![self.column(&scope, &item.path, &item.alias)?])
                    }
                } else {
                    Output::Columns(
                        items
                            .iter()
                            .map(|item| self.column(&scope, &item.path, &item.alias))
                            .collect::<Result<_>>()?,
                    )
                }
            }
            SelectList::Constructor { class, args } => {
                let name = class.rsplit('.').next().unwrap_or(class).to_string();
                if let Some(declared) = &projection {
                    if *declared != name {
                        return Err(Error::resolution(format!(
                            "'{}' constructs '{}' but is declared to return '{}'",
                            signature, name, declared
                        )));
                    }
                }
                let def = self.catalog.projection(&name)?;
                if def.fields.len() != args.len() {
                    return Err(Error::projection(format!(
                        "'{}' has {} field(s) but the query passes {} argument(s)",
                        name,
                        def.fields.len(),
                        args.len()
                    )));
                }
                let columns = def
                    .fields
                    .iter()
                    .zip(args)
                    .map(|(field, path)| {
                        Ok(Column {
                            path: scope.field_path(self.catalog, path)?,
                            name: field.name().to_string(),
                        })
                    })
                    .collect::<Result<_>>()?;
                projection = Some(name.clone());
                Output::Constructor {
                    projection: name,
                    columns,
                }
            }
        };

        let count = match &method.count_query {
            Some(text) => {
                let count = self.count_plan(entity, text, &method.params, signature)?;
                check_count_matches(signature, &predicate, &scope.joins, &count)?;
                count
            }
            None => CountPlan {
                predicate: predicate.clone(),
                joins: scope.joins.clone(),
                distinct: select.distinct,
            },
        };

        let mut columns = None;
        if let Some(name) = &projection {
            check_projectable(signature, shape)?;
            match &output {
                Output::Entity => columns = self.entity_projection(entity, name, &mut fetch)?,
                Output::Columns(selected) => self.column_projection(name, selected)?,
                Output::Constructor { .. } => self.catalog.projections().check_acyclic(name)?,
                Output::Count => {}
            }
        }

        let plan = SelectPlan {
            predicate,
            joins: scope.joins,
            order,
            fetch,
            output,
            columns,
            limit: None,
            distinct: select.distinct,
            count,
        };
        Ok((plan, shape, projection))
    }

    fn update(
        &self,
        entity: &str,
        update: &UpdateStatement,
        params: &mut ParamCollector<'_>,
    ) -> Result<UpdatePlan> {
        let scope = Scope {
            entity: entity.to_string(),
            alias: update.target.alias.clone(),
            join_aliases: Vec::new(),
            joins: Vec::new(),
        };
        let identity = &self.catalog.entity(entity)?.identity;
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for assignment in &update.assignments {
            let field = self.root_field(&scope, &assignment.target)?;
            if &field == identity {
                return Err(Error::resolution(format!(
                    "bulk updates cannot assign the identity '{}.{}'",
                    entity, field
                )));
            }
            let scalar = self.catalog.resolve_path(entity, &field)?.field.scalar;
            let value = self.update_expr(&scope, &assignment.value, scalar, params)?;
            assignments.push((field, value));
        }
        let predicate = match &update.condition {
            Some(condition) => Some(self.condition(&scope, condition, params)?),
            None => None,
        };
        Ok(UpdatePlan {
            assignments,
            predicate,
        })
    }

    fn update_expr(
        &self,
        scope: &Scope,
        expr: &Expr,
        scalar: ScalarType,
        params: &mut ParamCollector<'_>,
    ) -> Result<UpdateExpr> {
        Ok(match expr {
            Expr::Operand(Operand::Path(path)) => UpdateExpr::Field(self.root_field(scope, path)?),
            Expr::Operand(operand) => {
                UpdateExpr::Arg(self.operand_arg(operand, Some(scalar), false, params)?)
            }
            Expr::Binary { left, op, right } => UpdateExpr::Binary {
                left: Box::new(self.update_expr(scope, left, scalar, params)?),
                op: *op,
                right: Box::new(self.update_expr(scope, right, scalar, params)?),
            },
        })
    }

    fn native(
        &self,
        entity: &str,
        method: &QueryMethod,
        sql: &str,
        signature: String,
        projection: Option<String>,
    ) -> Result<QueryDescriptor> {
        if method.modifying.is_some() {
            return Err(Error::resolution(format!(
                "'{}' is modifying; native statements are read-only",
                signature
            )));
        }
        let shape = returns_shape(method.returns);
        if let Some(name) = &projection {
            check_projectable(&signature, shape)?;
            self.catalog.projections().check_acyclic(name)?;
        }
        let params = method
            .params
            .iter()
            .map(|name| ParamSlot {
                name: name.clone(),
                scalar: None,
                collection: false,
            })
            .collect();
        Ok(QueryDescriptor {
            signature,
            entity: entity.to_string(),
            method: method.name.clone(),
            plan: Plan::Native(NativePlan {
                sql: sql.to_string(),
                count_sql: method.count_query.clone(),
            }),
            shape,
            params,
            read_only: method.read_only,
            projection,
            accepts_sort: accepts_sort(method),
        })
    }

    fn check_root(&self, entity: &str, target: &str, signature: &str) -> Result<()> {
        self.catalog.entity(target)?;
        if target != entity {
            return Err(Error::resolution(format!(
                "'{}' queries '{}' from the '{}' repository",
                signature, target, entity
            )));
        }
        Ok(())
    }

    fn scope(&self, entity: &str, select: &SelectStatement) -> Result<Scope> {
        let mut scope = Scope {
            entity: entity.to_string(),
            alias: select.from.alias.clone(),
            join_aliases: Vec::new(),
            joins: Vec::new(),
        };
        for join in &select.joins {
            if join.on.is_some() {
                return Err(Error::resolution(
                    "join conditions are only supported in native queries".to_string(),
                ));
            }
            let relation = scope.relation_path(&join.target)?;
            self.catalog.resolve_relation_path(entity, &relation)?;
            if let Some(alias) = &join.alias {
                scope.join_aliases.push((alias.clone(), relation.clone()));
            }
            let required = join.kind == JoinKind::Inner;
            match scope.joins.iter_mut().find(|j| j.relation == relation) {
                Some(existing) => existing.required |= required,
                None => scope.joins.push(JoinSpec { relation, required }),
            }
        }
        Ok(scope)
    }

    fn column(&self, scope: &Scope, path: &Path, alias: &Option<String>) -> Result<Column> {
        Ok(Column {
            path: scope.field_path(self.catalog, path)?,
            name: alias.clone().unwrap_or_else(|| path.last().to_string()),
        })
    }

    fn root_field(&self, scope: &Scope, path: &Path) -> Result<String> {
        let field = scope.field_path(self.catalog, path)?;
        if field.contains('.') {
            return Err(Error::resolution(format!(
                "bulk updates can only read and assign root fields, got '{}'",
                field
            )));
        }
        Ok(field)
    }

    fn condition(
        &self,
        scope: &Scope,
        condition: &Condition,
        params: &mut ParamCollector<'_>,
    ) -> Result<Predicate> {
        Ok(match condition {
            Condition::Compare { left, op, right } => {
                let (path, op, value) = match (left, right) {
                    (Operand::Path(_), Operand::Path(_)) => {
                        return Err(Error::resolution(
                            "comparing two properties is not supported".to_string(),
                        ))
                    }
                    (Operand::Path(path), value) => (path, *op, value),
                    (value, Operand::Path(path)) => (path, op.flipped(), value),
                    _ => {
                        return Err(Error::resolution(
                            "a comparison needs a property on one side".to_string(),
                        ))
                    }
                };
                let field = scope.field_path(self.catalog, path)?;
                let scalar = self.catalog.resolve_path(&scope.entity, &field)?.field.scalar;
                let arg = self.operand_arg(value, Some(scalar), false, params)?;
                Predicate::Clause(Clause {
                    field,
                    op: compare_op(op),
                    args: vec![arg],
                })
            }
            Condition::In {
                path,
                negated,
                list,
            } => {
                let field = scope.field_path(self.catalog, path)?;
                let scalar = self.catalog.resolve_path(&scope.entity, &field)?.field.scalar;
                let args = match list {
                    InList::Parameter(parameter) => {
                        vec![self.parameter_arg(&parameter.kind, Some(scalar), true, params)?]
                    }
                    InList::Items(items) => items
                        .iter()
                        .map(|item| self.operand_arg(item, Some(scalar), false, params))
                        .collect::<Result<_>>()?,
                };
                Predicate::Clause(Clause {
                    field,
                    op: if *negated { ClauseOp::NotIn } else { ClauseOp::In },
                    args,
                })
            }
            Condition::Like {
                path,
                negated,
                pattern,
            } => {
                let field = scope.field_path(self.catalog, path)?;
                let arg = self.operand_arg(pattern, Some(ScalarType::String), false, params)?;
                Predicate::Clause(Clause {
                    field,
                    op: if *negated {
                        ClauseOp::NotLike
                    } else {
                        ClauseOp::Like
                    },
                    args: vec![arg],
                })
            }
            Condition::IsNull { path, negated } => Predicate::Clause(Clause {
                field: scope.field_path(self.catalog, path)?,
                op: if *negated {
                    ClauseOp::IsNotNull
                } else {
                    ClauseOp::IsNull
                },
                args: Vec::new(),
            }),
            Condition::And(items) => Predicate::And(
                items
                    .iter()
                    .map(|item| self.condition(scope, item, params))
                    .collect::<Result<_>>()?,
            ),
            Condition::Or(items) => Predicate::Or(
                items
                    .iter()
                    .map(|item| self.condition(scope, item, params))
                    .collect::<Result<_>>()?,
            ),
            Condition::Not(inner) => {
                Predicate::Not(Box::new(self.condition(scope, inner, params)?))
            }
        })
    }

    fn operand_arg(
        &self,
        operand: &Operand,
        scalar: Option<ScalarType>,
        collection: bool,
        params: &mut ParamCollector<'_>,
    ) -> Result<Arg> {
        match operand {
            Operand::Parameter(parameter) => {
                self.parameter_arg(&parameter.kind, scalar, collection, params)
            }
            Operand::Literal(value) => Ok(Arg::Literal(value.clone())),
            Operand::Path(path) => Err(Error::resolution(format!(
                "property '{}' is not allowed here",
                path.dotted()
            ))),
        }
    }

    fn parameter_arg(
        &self,
        kind: &ParameterKind,
        scalar: Option<ScalarType>,
        collection: bool,
        params: &mut ParamCollector<'_>,
    ) -> Result<Arg> {
        let index = params.slot(kind)?;
        params.note(index, scalar, collection);
        Ok(Arg::Param(index))
    }

    fn fetch(&self, entity: &str, relations: &[String]) -> Result<Vec<String>> {
        let mut fetch = Vec::with_capacity(relations.len());
        for relation in relations {
            self.catalog.resolve_relation_path(entity, relation)?;
            if !fetch.contains(relation) {
                fetch.push(relation.clone());
            }
        }
        Ok(fetch)
    }

    fn count_plan(
        &self,
        entity: &str,
        text: &str,
        declared: &[String],
        signature: &str,
    ) -> Result<CountPlan> {
        let Statement::Select(select) = parse(text)? else {
            return Err(Error::resolution(format!(
                "count query of '{}' must be a select",
                signature
            )));
        };
        self.check_root(entity, &select.from.name, signature)?;
        let scope = self.scope(entity, &select)?;
        let mut params = ParamCollector::new(declared, signature);
        let predicate = match &select.condition {
            Some(condition) => Some(self.condition(&scope, condition, &mut params)?),
            None => None,
        };
        Ok(CountPlan {
            predicate,
            joins: scope.joins,
            distinct: select.distinct,
        })
    }

    /// Validate a projection over full entities, extend the fetch graph with
    /// the relations it reads, and return the root columns it needs when it
    /// needs nothing else.
    fn entity_projection(
        &self,
        entity: &str,
        name: &str,
        fetch: &mut Vec<String>,
    ) -> Result<Option<Vec<String>>> {
        self.catalog.projections().check_acyclic(name)?;
        let def = self.catalog.projection(name)?;
        self.check_projection_sources(entity, def, "", fetch)?;
        Ok(if fetch.is_empty() {
            def.narrow_columns()
        } else {
            None
        })
    }

    fn check_projection_sources(
        &self,
        entity: &str,
        def: &ProjectionDef,
        prefix: &str,
        fetch: &mut Vec<String>,
    ) -> Result<()> {
        for field in &def.fields {
            match field {
                ProjectionField::Property { source, .. } => {
                    self.projected_path(entity, &def.name, source, prefix, fetch)?;
                }
                ProjectionField::Computed { template, .. } => {
                    for path in template.paths() {
                        self.projected_path(entity, &def.name, path, prefix, fetch)?;
                    }
                }
                ProjectionField::Nested {
                    relation,
                    projection,
                    ..
                } => {
                    let hops = self
                        .catalog
                        .resolve_relation_path(entity, relation)
                        .map_err(|_| {
                            Error::projection(format!(
                                "'{}' nests '{}' through unknown relation '{}' of '{}'",
                                def.name, projection, relation, entity
                            ))
                        })?;
                    let full = join_path(prefix, relation);
                    add_relation_prefixes(&full, fetch);
                    let target = hops
                        .last()
                        .map(|hop| hop.target.clone())
                        .unwrap_or_else(|| entity.to_string());
                    let nested = self.catalog.projection(projection)?;
                    self.check_projection_sources(&target, nested, &full, fetch)?;
                }
            }
        }
        Ok(())
    }

    fn projected_path(
        &self,
        entity: &str,
        projection: &str,
        source: &str,
        prefix: &str,
        fetch: &mut Vec<String>,
    ) -> Result<()> {
        let resolved = self.catalog.resolve_path(entity, source).map_err(|_| {
            Error::projection(format!(
                "'{}' reads '{}' which '{}' does not map",
                projection, source, entity
            ))
        })?;
        if resolved.is_nested() {
            add_relation_prefixes(&join_path(prefix, &resolved.relations.join(".")), fetch);
        }
        Ok(())
    }

    fn column_projection(&self, name: &str, columns: &[Column]) -> Result<()> {
        self.catalog.projections().check_acyclic(name)?;
        let def = self.catalog.projection(name)?;
        for field in &def.fields {
            if let ProjectionField::Property { source, .. } = field {
                if !columns.iter().any(|c| c.name == *source) {
                    return Err(Error::projection(format!(
                        "'{}' reads '{}' which the query does not select",
                        name, source
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Name resolution context of one explicit statement.
struct Scope {
    entity: String,
    alias: Option<String>,
    /// Join alias to relation path.
    join_aliases: Vec<(String, String)>,
    joins: Vec<JoinSpec>,
}

impl Scope {
    fn is_root(&self, name: &str) -> bool {
        self.alias.as_deref() == Some(name) || (self.alias.is_none() && name == self.entity)
    }

    /// Rewrite a statement path relative to the root entity.
    fn relative(&self, path: &Path) -> String {
        let head = path.head();
        let rest = &path.segments[1.min(path.segments.len())..];
        if path.segments.len() > 1 && self.is_root(head) {
            return rest.join(".");
        }
        if let Some((_, relation)) = self.join_aliases.iter().find(|(a, _)| a == head) {
            return if rest.is_empty() {
                relation.clone()
            } else {
                format!("{}.{}", relation, rest.join("."))
            };
        }
        path.dotted()
    }

    fn field_path(&self, catalog: &Catalog, path: &Path) -> Result<String> {
        let relative = self.relative(path);
        Ok(catalog.resolve_path(&self.entity, &relative)?.path)
    }

    fn relation_path(&self, path: &Path) -> Result<String> {
        let relative = self.relative(path);
        if relative.is_empty() {
            return Err(Error::resolution(format!(
                "join target '{}' names no relation",
                path.dotted()
            )));
        }
        Ok(relative)
    }
}

/// Declared parameters and the placeholders that use them.
struct ParamCollector<'m> {
    declared: &'m [String],
    signature: &'m str,
    slots: Vec<Option<ParamSlot>>,
}

impl<'m> ParamCollector<'m> {
    fn new(declared: &'m [String], signature: &'m str) -> Self {
        Self {
            declared,
            signature,
            slots: vec![None; declared.len()],
        }
    }

    fn slot(&mut self, kind: &ParameterKind) -> Result<usize> {
        match kind {
            ParameterKind::Named(name) => {
                self.declared.iter().position(|d| d == name).ok_or_else(|| {
                    Error::binding(format!(
                        "placeholder ':{}' of '{}' has no matching parameter",
                        name, self.signature
                    ))
                })
            }
            ParameterKind::Positional(position) => {
                let index = (*position as usize).checked_sub(1).ok_or_else(|| {
                    Error::binding(format!("'{}' uses placeholder ?0", self.signature))
                })?;
                if self.declared.is_empty() {
                    if index >= self.slots.len() {
                        self.slots.resize(index + 1, None);
                    }
                } else if index >= self.declared.len() {
                    return Err(Error::binding(format!(
                        "placeholder ?{} of '{}' exceeds its {} parameter(s)",
                        position,
                        self.signature,
                        self.declared.len()
                    )));
                }
                Ok(index)
            }
        }
    }

    fn note(&mut self, index: usize, scalar: Option<ScalarType>, collection: bool) {
        if self.slots[index].is_none() {
            let name = self
                .declared
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("?{}", index + 1));
            self.slots[index] = Some(ParamSlot {
                name,
                scalar,
                collection,
            });
        }
    }

    fn finish(self) -> Result<Vec<ParamSlot>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    let name = self
                        .declared
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| format!("?{}", index + 1));
                    Error::binding(format!(
                        "parameter '{}' of '{}' is not used by its query",
                        name, self.signature
                    ))
                })
            })
            .collect()
    }
}

fn parse(text: &str) -> Result<Statement> {
    ormrepo_lang::parse(text)
        .map_err(|e| Error::resolution(format!("invalid query: {}", e.format_with_source(text))))
}

fn compare_op(op: CompareOp) -> ClauseOp {
    match op {
        CompareOp::Eq => ClauseOp::Eq,
        CompareOp::Ne => ClauseOp::Ne,
        CompareOp::Lt => ClauseOp::Lt,
        CompareOp::Le => ClauseOp::Le,
        CompareOp::Gt => ClauseOp::Gt,
        CompareOp::Ge => ClauseOp::Ge,
    }
}

fn returns_shape(returns: Returns) -> ResultShape {
    match returns {
        Returns::Many => ResultShape::Many,
        Returns::One => ResultShape::One,
        Returns::Page => ResultShape::Page,
        Returns::Slice => ResultShape::Slice,
    }
}

fn accepts_sort(method: &QueryMethod) -> bool {
    method.sorted || matches!(method.returns, Returns::Page | Returns::Slice)
}

fn check_projectable(signature: &str, shape: ResultShape) -> Result<()> {
    match shape {
        ResultShape::Many | ResultShape::One | ResultShape::Page | ResultShape::Slice => Ok(()),
        other => Err(Error::resolution(format!(
            "'{}' returns {} and cannot be projected",
            signature,
            other.name()
        ))),
    }
}

fn check_count_matches(
    signature: &str,
    predicate: &Option<Predicate>,
    joins: &[JoinSpec],
    count: &CountPlan,
) -> Result<()> {
    let required = |joins: &[JoinSpec]| -> HashSet<String> {
        joins
            .iter()
            .filter(|j| j.required)
            .map(|j| j.relation.clone())
            .collect()
    };
    if count.predicate != *predicate || required(&count.joins) != required(joins) {
        return Err(Error::resolution(format!(
            "count query of '{}' does not filter like its content query",
            signature
        )));
    }
    Ok(())
}

fn join_path(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}.{}", prefix, path)
    }
}

/// Add `a`, `a.b`, ... for the relation path `a.b` to the fetch graph.
fn add_relation_prefixes(path: &str, fetch: &mut Vec<String>) {
    let mut current = String::new();
    for segment in path.split('.') {
        if !current.is_empty() {
            current.push('.');
        }
        current.push_str(segment);
        if !fetch.contains(&current) {
            fetch.push(current.clone());
        }
    }
}
