use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    aggregate::Aggregate,
    collection::{Collection, Range, Sort},
    error::Error,
    filter::Filter,
    intersection::{Intersection, IntersectionRole},
    pushdown::{push_filter, BackendPushDown, Scope},
    relationship::{expand_filter, merge_aggregate_intersection, pull_path},
    schema::EntitySchema,
    sql::{ColumnRef, Join, JoinKind, Operand, Params, Stage, Statement},
};

/// A collection's query state detached from the collection, with dotted
/// paths already expanded into intersections and every flag cleared.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub schema: Arc<EntitySchema>,
    pub filter: Option<Filter>,
    pub sorts: Vec<Sort>,
    pub range: Option<Range>,
    pub aggregates: Vec<Aggregate>,
    pub intersections: Vec<Intersection>,
    pub distinct: bool,
}

impl Prepared {
    pub fn new(collection: &Collection) -> Result<Self, Error> {
        Self::build(collection, collection.aggregates.clone())
    }

    /// For a scalar calculation over the whole filtered set: the collection's
    /// sorts and range do not apply.
    pub fn scalar(collection: &Collection, aggregates: Vec<Aggregate>) -> Result<Self, Error> {
        let mut prepared = Self::build(collection, aggregates)?;
        prepared.sorts.clear();
        prepared.range = None;
        Ok(prepared)
    }

    fn build(collection: &Collection, mut aggregates: Vec<Aggregate>) -> Result<Self, Error> {
        let context = collection.context();
        let schema = context.schema(collection.entity())?;
        let mut intersections = collection.intersections.clone();

        let mut reserved: HashSet<String> = intersections
            .iter()
            .flat_map(|i| i.pull_up.iter().map(|p| p.alias.clone()))
            .collect();
        reserved.extend(collection.aggregates.iter().map(|a| a.alias().to_string()));

        let filter = match collection.filter.clone() {
            Some(mut filter) => {
                filter.reset_satisfaction();
                expand_filter(context, &schema, filter, &reserved, &mut intersections)?
            }
            None => None,
        };

        for aggregate in aggregates.iter_mut() {
            aggregate.reset();
            if reserved.contains(aggregate.column()) {
                continue;
            }
            if let Some(intersection) = pull_path(context, &schema, aggregate.column())? {
                merge_aggregate_intersection(
                    &mut intersections,
                    intersection.with_role(IntersectionRole::Aggregate),
                );
            }
        }

        Ok(Self {
            schema,
            filter,
            sorts: collection.sorts.clone(),
            range: collection.range,
            aggregates,
            intersections,
            distinct: collection.distinct,
        })
    }

    /// Some explicit intersection multiplies outer rows.
    pub fn fans_out(&self) -> bool {
        self.intersections.iter().any(Intersection::fans_out)
    }
}

/// Where each selected column of a result row goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Id,
    /// Merged into the entry as augmentation data under this name.
    Augment(String),
    /// A column of an auto-hydrated join, written to the object cache.
    Hydrate { join: usize, column: String },
}

/// Which parts of a collection the backend took over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeFlags {
    pub filter: bool,
    pub sorts: bool,
    pub range: bool,
    pub aggregates: bool,
    pub intersections: Vec<bool>,
}

impl NativeFlags {
    /// Every restriction ran natively; the backend result set is final.
    pub fn restricts_completely(&self) -> bool {
        self.filter && self.intersections.iter().all(|native| *native)
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub schema: Arc<EntitySchema>,
    pub statement: Statement,
    pub params: Params,
    pub outputs: Vec<Output>,
    pub hydrate: Vec<Arc<EntitySchema>>,
    pub native: NativeFlags,
}

struct JoinPlan {
    join: Join,
    /// Pulled columns as the parent scope should see them.
    extras: Vec<(String, Operand)>,
    hydrate: Vec<(String, Arc<EntitySchema>)>,
}

/// Builds one statement for a prepared collection, taking over as much as the
/// backend's push-down table allows and flagging the rest for the in-memory
/// pass.
pub struct Planner<'a> {
    push: &'a BackendPushDown,
    params: Params,
    aliases: HashSet<String>,
}

impl<'a> Planner<'a> {
    pub fn new(push: &'a BackendPushDown) -> Self {
        Self {
            push,
            params: Params::new(),
            aliases: HashSet::new(),
        }
    }

    fn alias(&mut self, base: &str) -> String {
        let mut alias = base.to_string();
        let mut suffix = 1;
        while !self.aliases.insert(alias.clone()) {
            suffix += 1;
            alias = format!("{}{}", base, suffix);
        }
        alias
    }

    pub fn plan(mut self, prepared: &mut Prepared) -> Result<QueryPlan, Error> {
        let schema = prepared.schema.clone();
        let capabilities = self.push.capabilities();
        let root = self.alias(&schema.entity);
        let mut statement = Statement::new(&schema.table, &root);
        let mut scope = Scope::new(&schema, &root);
        let mut outputs = vec![Output::Id];
        let mut native = NativeFlags {
            intersections: vec![false; prepared.intersections.len()],
            ..NativeFlags::default()
        };
        let mut hydrate = Vec::new();
        statement.select(Operand::Column(statement.column_ref(&schema.id_column)), None);

        let mut aggregate_joins = Vec::new();
        for (index, intersection) in prepared.intersections.iter_mut().enumerate() {
            if intersection.is_noop() {
                native.intersections[index] = true;
                continue;
            }
            let Some(plan) = self.plan_join(intersection, &scope, false)? else {
                continue;
            };
            if intersection.role == IntersectionRole::Aggregate {
                aggregate_joins.push((index, plan));
                continue;
            }
            for (name, operand) in &plan.extras {
                scope.add(name, operand.clone(), Stage::Where);
                statement.select(operand.clone(), Some(name.clone()));
                outputs.push(Output::Augment(name.clone()));
            }
            hydrate.extend(plan.hydrate);
            statement.add_join(plan.join);
            native.intersections[index] = true;
        }

        let fan_out = prepared.fans_out();
        let aggregate_roles = prepared
            .intersections
            .iter()
            .filter(|i| i.role == IntersectionRole::Aggregate)
            .count();
        if !prepared.aggregates.is_empty()
            && capabilities.grouping
            && !fan_out
            && aggregate_roles == aggregate_joins.len()
            && aggregate_joins.len() <= 1
        {
            let mut aggregate_scope = scope.clone();
            if let Some((_, plan)) = aggregate_joins.first() {
                for (name, operand) in &plan.extras {
                    aggregate_scope.add(name, operand.clone(), Stage::Where);
                }
            }
            let dotted_only = aggregate_joins.is_empty()
                || prepared
                    .aggregates
                    .iter()
                    .all(|a| a.relationship_path().is_some());
            let operands = if dotted_only {
                self.aggregate_operands(&prepared.aggregates, &aggregate_scope)
            } else {
                None
            };

            if let Some(operands) = operands {
                if let Some((index, plan)) = aggregate_joins.pop() {
                    statement.add_join(plan.join);
                    native.intersections[index] = true;
                }
                for (aggregate, operand) in prepared.aggregates.iter_mut().zip(operands) {
                    statement.select(operand.clone(), Some(aggregate.alias().to_string()));
                    outputs.push(Output::Augment(aggregate.alias().to_string()));
                    scope.add(aggregate.alias(), operand, Stage::Having);
                    aggregate.mark_calculated();
                }
                statement
                    .group_by
                    .push(Operand::Column(statement.column_ref(&schema.id_column)));
                native.aggregates = true;
            }
        }

        native.filter = match prepared.filter.as_mut() {
            Some(filter) => {
                if let Some(expr) = push_filter(filter, self.push, &scope, &mut self.params) {
                    statement.add_filter(expr);
                }
                filter.was_satisfied_by_backend()
            }
            None => true,
        };

        let sorts: Option<Vec<_>> = prepared
            .sorts
            .iter()
            .map(|sort| scope.resolve(&sort.column).map(|(operand, _)| (operand, sort.direction)))
            .collect();
        native.sorts = match sorts {
            _ if prepared.sorts.is_empty() => true,
            Some(sorts) if capabilities.sorting => {
                statement.sorts = sorts;
                true
            }
            _ => false,
        };

        native.range = match prepared.range {
            None => true,
            Some(range) => {
                let feasible = capabilities.limits
                    && native.sorts
                    && native.restricts_completely()
                    && (prepared.aggregates.is_empty() || native.aggregates)
                    && !(prepared.distinct && fan_out);
                if feasible {
                    statement.limit = Some((range.offset, range.count));
                }
                feasible
            }
        };
        statement.distinct = prepared.distinct && !fan_out && !native.aggregates;

        let mut hydrated = Vec::with_capacity(hydrate.len());
        for (join, (alias, target)) in hydrate.into_iter().enumerate() {
            for column in target.column_names() {
                statement.select(
                    Operand::Column(ColumnRef::new(alias.clone(), column)),
                    Some(format!("{}__{}", alias, column)),
                );
                outputs.push(Output::Hydrate {
                    join,
                    column: column.to_string(),
                });
            }
            hydrated.push(target);
        }

        tracing::debug!(
            entity = %schema.entity,
            filter = native.filter,
            sorts = native.sorts,
            range = native.range,
            aggregates = native.aggregates,
            "planned collection"
        );

        Ok(QueryPlan {
            schema,
            statement,
            params: self.params,
            outputs,
            hydrate: hydrated,
            native,
        })
    }

    /// Plan for a scalar calculation. All or nothing: `None` when any part
    /// of the restriction or any aggregate has to run in memory.
    pub fn plan_aggregates(mut self, prepared: &mut Prepared) -> Result<Option<QueryPlan>, Error> {
        let schema = prepared.schema.clone();
        if !self.push.capabilities().grouping || prepared.aggregates.is_empty() || prepared.fans_out() {
            return Ok(None);
        }
        let root = self.alias(&schema.entity);
        let mut statement = Statement::new(&schema.table, &root);
        let mut scope = Scope::new(&schema, &root);

        let mut aggregate_joins = 0;
        for intersection in prepared.intersections.iter_mut() {
            if intersection.is_noop() {
                continue;
            }
            let Some(plan) = self.plan_join(intersection, &scope, false)? else {
                return Ok(None);
            };
            if intersection.role == IntersectionRole::Aggregate {
                aggregate_joins += 1;
                for (name, operand) in &plan.extras {
                    scope.add(name, operand.clone(), Stage::Where);
                }
            }
            statement.add_join(plan.join);
        }
        if aggregate_joins > 1
            || (aggregate_joins == 1
                && prepared.aggregates.iter().any(|a| a.relationship_path().is_none()))
        {
            return Ok(None);
        }

        if let Some(filter) = prepared.filter.as_mut() {
            if let Some(expr) = push_filter(filter, self.push, &scope, &mut self.params) {
                statement.add_filter(expr);
            }
            if !filter.was_satisfied_by_backend() {
                return Ok(None);
            }
        }

        let Some(operands) = self.aggregate_operands(&prepared.aggregates, &scope) else {
            return Ok(None);
        };
        let mut outputs = Vec::with_capacity(operands.len());
        for (aggregate, operand) in prepared.aggregates.iter_mut().zip(operands) {
            statement.select(operand, Some(aggregate.alias().to_string()));
            outputs.push(Output::Augment(aggregate.alias().to_string()));
            aggregate.mark_calculated();
        }

        Ok(Some(QueryPlan {
            schema,
            statement,
            params: self.params,
            outputs,
            hydrate: Vec::new(),
            native: NativeFlags {
                filter: true,
                sorts: true,
                range: true,
                aggregates: true,
                intersections: vec![true; prepared.intersections.len()],
            },
        }))
    }

    fn aggregate_operands(&self, aggregates: &[Aggregate], scope: &Scope<'_>) -> Option<Vec<Operand>> {
        aggregates
            .iter()
            .map(|aggregate| {
                let implementation = self.push.aggregate(aggregate.kind())?;
                if !implementation.can_calculate(aggregate, scope) {
                    return None;
                }
                implementation.calculate(aggregate, scope)
            })
            .collect()
    }

    /// `None` when any part of the joined collection would need the
    /// in-memory pass; the whole intersection then runs in memory.
    fn plan_join(
        &mut self,
        intersection: &mut Intersection,
        parent: &Scope<'_>,
        under_left: bool,
    ) -> Result<Option<JoinPlan>, Error> {
        if !self.push.capabilities().joins {
            return Ok(None);
        }
        let mut child = Prepared::new(&intersection.collection)?;
        if child.range.is_some() || !child.aggregates.is_empty() {
            return Ok(None);
        }
        let Some(parent_column) = parent.physical(&intersection.parent_column) else {
            return Ok(None);
        };
        if !child.schema.has_column(&intersection.child_column) {
            return Ok(None);
        }

        let kind = if !intersection.pull_up.is_empty()
            || intersection.role == IntersectionRole::Aggregate
        {
            intersection.kind
        } else if intersection.auto_hydrate && intersection.kind == JoinKind::Inner {
            JoinKind::Inner
        } else {
            JoinKind::Semi
        };
        if under_left && kind == JoinKind::Inner {
            return Ok(None);
        }

        let alias = self.alias(intersection.alias_base());
        let mut statement = Statement::new(&child.schema.table, &alias);
        let mut scope = Scope::new(&child.schema, &alias);
        let mut hydrate = Vec::new();
        let child_left = under_left || kind == JoinKind::Left;

        for nested in child.intersections.iter_mut() {
            if nested.is_noop() {
                continue;
            }
            let Some(plan) = self.plan_join(nested, &scope, child_left)? else {
                return Ok(None);
            };
            for (name, operand) in plan.extras {
                scope.add(&name, operand, Stage::Where);
            }
            hydrate.extend(plan.hydrate);
            statement.add_join(plan.join);
        }

        if let Some(filter) = child.filter.as_mut() {
            let expr = push_filter(filter, self.push, &scope, &mut self.params);
            if !filter.was_satisfied_by_backend() {
                return Ok(None);
            }
            if let Some(expr) = expr {
                statement.add_filter(expr);
            }
        }

        let mut extras = Vec::with_capacity(intersection.pull_up.len());
        for pull in &intersection.pull_up {
            match scope.resolve(&pull.column) {
                Some((operand, Stage::Where)) => extras.push((pull.alias.clone(), operand)),
                _ => return Ok(None),
            }
        }

        if kind == JoinKind::Semi {
            hydrate.clear();
        } else if intersection.auto_hydrate {
            hydrate.insert(0, (alias.clone(), child.schema.clone()));
        }

        Ok(Some(JoinPlan {
            join: Join {
                statement,
                kind,
                parent: parent_column,
                child_column: intersection.child_column.clone(),
            },
            extras,
            hydrate,
        }))
    }
}
