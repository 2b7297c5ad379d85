use std::fmt::Display;

#[derive(Debug)]
pub enum Error {
    /// Nothing native and nothing in memory can satisfy the request.
    Unsupported(String),
    /// A bulk write was requested but the active filter was not fully pushed down.
    InfeasibleBatch(String),
    NotFound {
        entity: String,
        id: String,
    },
    /// A native statement failed; carries the offending SQL.
    Statement {
        sql: String,
        message: String,
    },
    Schema(String),
    /// An integer aggregate left the 64-bit range.
    Overflow(String),
    Serialize(String),
    Deserialize(String),
    Storage(String),
}

impl Error {
    pub fn statement(sql: impl Into<String>, err: impl Display) -> Self {
        Error::Statement {
            sql: sql.into(),
            message: err.to_string(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unsupported(what) => write!(f, "Unsupported operation: {}", what),
            Error::InfeasibleBatch(why) => write!(f, "Batch operation not possible: {}", why),
            Error::NotFound { entity, id } => write!(f, "{} with identifier {} not found", entity, id),
            Error::Statement { sql, message } => {
                write!(f, "Statement failed: {} (sql: {})", message, sql)
            }
            Error::Schema(err) => write!(f, "Schema error: {}", err),
            Error::Overflow(what) => write!(f, "Overflow: {}", what),
            Error::Serialize(err) => write!(f, "Serialization error: {}", err),
            Error::Deserialize(err) => write!(f, "Deserialization error: {}", err),
            Error::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for Error {}
