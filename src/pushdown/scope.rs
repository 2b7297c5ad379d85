use std::collections::HashMap;

use crate::{
    schema::EntitySchema,
    sql::{ColumnRef, Operand, Stage},
};

/// Names a push-down implementation may resolve while translating one
/// collection: the physical columns of its entity plus columns pulled up from
/// native joins and aliases of natively calculated aggregates.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    schema: &'a EntitySchema,
    alias: String,
    extras: HashMap<String, (Operand, Stage)>,
}

impl<'a> Scope<'a> {
    pub fn new(schema: &'a EntitySchema, alias: &str) -> Self {
        Self {
            schema,
            alias: alias.to_string(),
            extras: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        self.schema
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn add(&mut self, name: &str, operand: Operand, stage: Stage) {
        self.extras.insert(name.to_string(), (operand, stage));
    }

    pub fn resolve(&self, column: &str) -> Option<(Operand, Stage)> {
        if self.schema.has_column(column) {
            return Some((
                Operand::Column(ColumnRef::new(self.alias.clone(), column)),
                Stage::Where,
            ));
        }
        self.extras.get(column).cloned()
    }

    /// Physical columns only.
    pub fn physical(&self, column: &str) -> Option<ColumnRef> {
        self.schema
            .has_column(column)
            .then(|| ColumnRef::new(self.alias.clone(), column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn test_resolution_order() {
        let schema = EntitySchema::new("Company", "tblCompany")
            .id("CompanyID")
            .column("Name", ColumnType::Text);
        let mut scope = Scope::new(&schema, "Company");
        scope.add("SumOfBalance", Operand::Raw("SUM(x)".into()), Stage::Having);

        assert!(matches!(
            scope.resolve("Name"),
            Some((Operand::Column(_), Stage::Where))
        ));
        assert!(matches!(scope.resolve("SumOfBalance"), Some((_, Stage::Having))));
        assert!(scope.resolve("Nope").is_none());
        assert!(scope.physical("SumOfBalance").is_none());
    }
}
