/// Quoting and syntax rules of a relational backend.
pub trait Dialect: Send + Sync {
    fn quote_identifier(&self, identifier: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn limit(&self, offset: usize, count: usize) -> String;

    fn boolean(&self, value: bool) -> String;

    /// Negation of a rendered condition that treats an unknown (`NULL`)
    /// operand as false before inverting.
    fn negate(&self, condition: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn limit(&self, offset: usize, count: usize) -> String {
        format!("LIMIT {} OFFSET {}", count, offset)
    }

    fn boolean(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }

    fn negate(&self, condition: &str) -> String {
        format!("NOT COALESCE({}, 0)", condition)
    }
}
