use crate::{
    sql::{ColumnRef, Dialect},
    value::Value,
};

/// Named parameter bag shared by a statement and all of its sub-statements.
///
/// Names are unique per bag: a second use of `Name` becomes `Name1`, then `Name2`.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under a unique name derived from `base` and returns the name.
    pub fn add(&mut self, base: &str, value: Value) -> String {
        let base = sanitize(base);
        let mut name = base.clone();
        let mut suffix = 0;
        while self.entries.iter().any(|(existing, _)| *existing == name) {
            suffix += 1;
            name = format!("{}{}", base, suffix);
        }
        self.entries.push((name.clone(), value));
        name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sanitize(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "p".to_string()
    } else {
        cleaned
    }
}

/// Turns expression trees into text, numbering placeholders in first-emission order.
pub struct Renderer<'a> {
    dialect: &'a dyn Dialect,
    params: &'a Params,
    order: Vec<String>,
    values: Vec<Value>,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn Dialect, params: &'a Params) -> Self {
        Self {
            dialect,
            params,
            order: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    pub fn column(&self, column: &ColumnRef) -> String {
        format!(
            "{}.{}",
            self.quote(&column.table),
            self.quote(&column.column)
        )
    }

    /// A parameter used twice keeps its first placeholder.
    pub fn param(&mut self, name: &str) -> String {
        let index = match self.order.iter().position(|existing| existing == name) {
            Some(position) => position + 1,
            None => {
                self.order.push(name.to_string());
                self.values
                    .push(self.params.get(name).cloned().unwrap_or(Value::Null));
                self.order.len()
            }
        };
        self.dialect.placeholder(index)
    }

    pub fn finish(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqliteDialect;

    #[test]
    fn test_param_names_are_unique() {
        let mut params = Params::new();
        assert_eq!(params.add("Name", Value::Int(1)), "Name");
        assert_eq!(params.add("Name", Value::Int(2)), "Name1");
        assert_eq!(params.add("Name", Value::Int(3)), "Name2");
        assert_eq!(params.add("Contacts.Name", Value::Int(4)), "Contacts_Name");
        assert_eq!(params.get("Name1"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_placeholders_follow_emission_order() {
        let mut params = Params::new();
        let a = params.add("a", Value::Int(1));
        let b = params.add("b", Value::Int(2));
        params.add("unused", Value::Int(3));

        let dialect = SqliteDialect;
        let mut renderer = Renderer::new(&dialect, &params);
        assert_eq!(renderer.param(&b), "?1");
        assert_eq!(renderer.param(&a), "?2");
        assert_eq!(renderer.param(&b), "?1");
        assert_eq!(renderer.finish(), vec![Value::Int(2), Value::Int(1)]);
    }
}
