use serde::Deserialize;

/// Behaviour switches shared by every repository implementation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// When false no predicate, sort, limit, join or aggregate is handed to the
    /// backend and everything is evaluated in memory.
    pub push_down: bool,
    /// How many uncached records a cursor hydrates per backend round trip.
    pub hydrate_batch_size: usize,
    /// Keep the text of executed statements (see `SqliteRepository::statements`).
    /// Off by default; when on, only the most recent `statement_log_size` are kept.
    pub log_statements: bool,
    pub statement_log_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            push_down: true,
            hydrate_batch_size: 50,
            log_statements: false,
            statement_log_size: 256,
        }
    }
}

impl RepositoryConfig {
    pub fn without_push_down() -> Self {
        Self {
            push_down: false,
            ..Self::default()
        }
    }

    /// Defaults with the statement log switched on.
    pub fn with_statement_log() -> Self {
        Self {
            log_statements: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub repository: RepositoryConfig,
}

fn default_max_connections() -> u32 {
    5
}

impl SqliteConfig {
    /// A private in-memory database. Every connection to `sqlite::memory:`
    /// opens a database of its own, so the pool holds exactly one connection
    /// and never retires it (see `is_memory`).
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            repository: RepositoryConfig::default(),
        }
    }

    pub fn file(path: &str) -> Self {
        Self {
            url: format!("sqlite:{}", path),
            max_connections: default_max_connections(),
            repository: RepositoryConfig::default(),
        }
    }

    /// The database lives only as long as a connection to it stays open.
    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}
