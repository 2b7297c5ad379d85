use crate::{collection::Collection, sql::JoinKind};

/// A column of the joined collection copied onto the outer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullUp {
    pub column: String,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionRole {
    /// Requested by the caller.
    Explicit,
    /// Generated from a predicate whose column crossed a relationship.
    Filter,
    /// Generated to feed an aggregate over a dotted column.
    Aggregate,
}

/// Correlates `parent_column` of the owning collection with `child_column`
/// of another collection.
///
/// Without pull-ups an intersection only restricts the outer rows (a
/// semi-join). With pull-ups every match becomes its own cursor entry carrying
/// the pulled columns as augmentation data.
#[derive(Debug, Clone)]
pub struct Intersection {
    pub collection: Collection,
    pub parent_column: String,
    pub child_column: String,
    pub pull_up: Vec<PullUp>,
    pub auto_hydrate: bool,
    pub kind: JoinKind,
    pub role: IntersectionRole,
    /// Relationship name, used to alias the join.
    pub name: Option<String>,
}

impl Intersection {
    pub fn new(collection: Collection, parent_column: &str, child_column: &str) -> Self {
        Self {
            collection,
            parent_column: parent_column.to_string(),
            child_column: child_column.to_string(),
            pull_up: Vec::new(),
            auto_hydrate: false,
            kind: JoinKind::Inner,
            role: IntersectionRole::Explicit,
            name: None,
        }
    }

    /// Copy `column` of each match onto the outer record as `alias`.
    pub fn pull(mut self, column: &str, alias: &str) -> Self {
        self.pull_up.push(PullUp {
            column: column.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    /// Keep outer rows without a match; their pulled columns read `NULL`.
    pub fn left(mut self) -> Self {
        self.kind = JoinKind::Left;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub(crate) fn with_role(mut self, role: IntersectionRole) -> Self {
        self.role = role;
        self
    }

    pub(crate) fn hydrating(mut self, auto_hydrate: bool) -> Self {
        self.auto_hydrate = auto_hydrate;
        self
    }

    /// Restricts without multiplying rows.
    pub fn is_semi(&self) -> bool {
        self.pull_up.is_empty() && self.role != IntersectionRole::Aggregate
    }

    /// A left intersection that pulls nothing changes nothing.
    pub fn is_noop(&self) -> bool {
        self.kind == JoinKind::Left && self.pull_up.is_empty()
    }

    /// One outer entry per match.
    pub fn fans_out(&self) -> bool {
        !self.pull_up.is_empty() && self.role != IntersectionRole::Aggregate
    }

    pub fn alias_base(&self) -> &str {
        self.name.as_deref().unwrap_or(self.collection.entity())
    }
}
