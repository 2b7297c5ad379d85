use std::sync::Arc;

use crate::{
    aggregate::{Aggregate, AggregateKind},
    pushdown::{AggregatePushDown, BackendKind, PushDownRegistry, Scope},
    sql::Operand,
};

struct SqlFunction {
    function: &'static str,
    distinct: bool,
}

impl AggregatePushDown for SqlFunction {
    fn calculate(&self, aggregate: &Aggregate, scope: &Scope<'_>) -> Option<Operand> {
        let (argument, _) = scope.resolve(aggregate.column())?;
        Some(Operand::Aggregate {
            function: self.function,
            argument: Box::new(argument),
            distinct: self.distinct,
        })
    }
}

pub(super) fn register(registry: &mut PushDownRegistry) {
    for (kind, function, distinct) in [
        (AggregateKind::Count, "COUNT", false),
        (AggregateKind::CountDistinct, "COUNT", true),
        (AggregateKind::Sum, "SUM", false),
        (AggregateKind::Average, "AVG", false),
        (AggregateKind::Min, "MIN", false),
        (AggregateKind::Max, "MAX", false),
    ] {
        registry.register_aggregate(
            BackendKind::Sqlite,
            kind,
            Arc::new(SqlFunction { function, distinct }),
        );
    }
}
