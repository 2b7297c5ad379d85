//! Expansion of dotted column paths (`Contacts.Name`) into intersections.

use std::collections::HashSet;

use crate::{
    context::Context,
    error::Error,
    filter::{ColumnFilter, Filter},
    intersection::{Intersection, IntersectionRole},
    schema::EntitySchema,
};

/// Outcome of offering a leaf to the resolver.
#[derive(Debug)]
pub enum Resolution {
    Unchanged,
    /// The leaf moved into the joined collection; drop it from the local tree.
    ReplacedByIntersection(Intersection),
}

/// Names that look dotted but are resolved locally (pulled-up aliases).
fn crosses_relationship(schema: &EntitySchema, leaf: &ColumnFilter, reserved: &HashSet<String>) -> bool {
    if reserved.contains(leaf.column()) {
        return false;
    }
    leaf.relationship_path()
        .is_some_and(|(hop, _)| schema.relationship(hop).is_some())
}

pub fn resolve_leaf(
    context: &Context,
    schema: &EntitySchema,
    leaf: &ColumnFilter,
    reserved: &HashSet<String>,
) -> Result<Resolution, Error> {
    if !crosses_relationship(schema, leaf, reserved) {
        return Ok(Resolution::Unchanged);
    }
    let Some((hop, rest)) = leaf.relationship_path() else {
        return Ok(Resolution::Unchanged);
    };
    let Some(relationship) = schema.relationship(hop) else {
        return Ok(Resolution::Unchanged);
    };
    let moved = Filter::Column(leaf.rewritten_to(rest));

    let intersection = match &relationship.through {
        None => Intersection::new(
            context.collection(&relationship.target).filter(moved),
            &relationship.source_column,
            &relationship.target_column,
        )
        .hydrating(relationship.cardinality.is_to_one()),
        Some(through) => {
            let target = Intersection::new(
                context.collection(&relationship.target).filter(moved),
                &through.target_column,
                &relationship.target_column,
            )
            .named(&relationship.name)
            .with_role(IntersectionRole::Filter);
            Intersection::new(
                context.collection(&through.entity).intersect_with(target),
                &relationship.source_column,
                &through.source_column,
            )
        }
    };

    tracing::trace!(
        entity = %schema.entity,
        column = %leaf.column(),
        relationship = %relationship.name,
        "predicate replaced by intersection"
    );
    Ok(Resolution::ReplacedByIntersection(
        intersection
            .named(&relationship.name)
            .with_role(IntersectionRole::Filter),
    ))
}

/// Replaces every relationship-crossing leaf at a conjunctive position with an
/// intersection appended to `intersections`. Leaves crossing the same hop
/// share one intersection, so their predicates must hold on the same joined
/// row. A crossing leaf under `Or` or `Not` cannot be expressed as a join.
pub(crate) fn expand_filter(
    context: &Context,
    schema: &EntitySchema,
    filter: Filter,
    reserved: &HashSet<String>,
    intersections: &mut Vec<Intersection>,
) -> Result<Option<Filter>, Error> {
    match filter {
        Filter::Column(leaf) => match resolve_leaf(context, schema, &leaf, reserved)? {
            Resolution::Unchanged => Ok(Some(Filter::Column(leaf))),
            Resolution::ReplacedByIntersection(intersection) => {
                merge_filter_intersection(intersections, intersection);
                Ok(None)
            }
        },
        Filter::And(children) => {
            let mut kept = Vec::with_capacity(children.len());
            let had_children = !children.is_empty();
            for child in children {
                if let Some(child) = expand_filter(context, schema, child, reserved, intersections)? {
                    kept.push(child);
                }
            }
            if had_children && kept.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Filter::And(kept)))
            }
        }
        other => {
            if let Some(leaf) = other
                .leaves()
                .into_iter()
                .find(|leaf| crosses_relationship(schema, leaf, reserved))
            {
                return Err(Error::Unsupported(format!(
                    "'{}' crosses a relationship inside OR/NOT",
                    leaf.column()
                )));
            }
            Ok(Some(other))
        }
    }
}

fn merge_filter_intersection(intersections: &mut Vec<Intersection>, mut incoming: Intersection) {
    let shareable = |i: &Intersection| {
        i.role == IntersectionRole::Filter && i.collection.intersections.is_empty()
    };
    if shareable(&incoming) {
        if let Some(existing) = intersections.iter_mut().find(|existing| {
            shareable(existing)
                && existing.name == incoming.name
                && existing.parent_column == incoming.parent_column
                && existing.child_column == incoming.child_column
        }) {
            if let Some(filter) = incoming.collection.take_filter() {
                existing.collection.add_filter(filter);
            }
            return;
        }
    }
    intersections.push(incoming);
}

/// Left intersection that pulls the terminal column of `path` up under the
/// alias `path`. `None` when the first segment is not a relationship.
pub(crate) fn pull_path(
    context: &Context,
    schema: &EntitySchema,
    path: &str,
) -> Result<Option<Intersection>, Error> {
    let Some((hop, rest)) = path.split_once('.') else {
        return Ok(None);
    };
    let Some(relationship) = schema.relationship(hop) else {
        return Ok(None);
    };

    let target_schema = context.schema(&relationship.target)?;
    let mut target = context.collection(&relationship.target);
    if let Some(nested) = pull_path(context, &target_schema, rest)? {
        target = target.intersect_with(nested);
    }

    let intersection = match &relationship.through {
        None => Intersection::new(target, &relationship.source_column, &relationship.target_column),
        Some(through) => {
            let link = context.collection(&through.entity).intersect_with(
                Intersection::new(target, &through.target_column, &relationship.target_column)
                    .pull(rest, rest)
                    .left()
                    .named(&relationship.name),
            );
            Intersection::new(link, &relationship.source_column, &through.source_column)
        }
    };
    Ok(Some(intersection.pull(rest, path).left().named(hop)))
}

/// Adds an aggregate feeding intersection, sharing a single-hop join when one
/// already exists for the same relationship.
pub(crate) fn merge_aggregate_intersection(
    intersections: &mut Vec<Intersection>,
    incoming: Intersection,
) {
    let simple = |i: &Intersection| {
        i.role == IntersectionRole::Aggregate && i.collection.intersections.is_empty()
    };
    if simple(&incoming) {
        if let Some(existing) = intersections.iter_mut().find(|existing| {
            simple(existing)
                && existing.name == incoming.name
                && existing.parent_column == incoming.parent_column
                && existing.child_column == incoming.child_column
        }) {
            for pull in incoming.pull_up {
                if !existing.pull_up.iter().any(|p| p.alias == pull.alias) {
                    existing.pull_up.push(pull);
                }
            }
            return;
        }
    }
    intersections.push(incoming);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ToValue;
    use crate::{
        filter,
        repository::MemoryRepository,
        schema::{ColumnType, SchemaRegistry, Through},
    };

    fn context() -> Context {
        let schemas = SchemaRegistry::new()
            .with(
                EntitySchema::new("Company", "tblCompany")
                    .id("CompanyID")
                    .column("Name", ColumnType::Text)
                    .has_many("Contacts", "Contact", "CompanyID", "CompanyID"),
            )
            .with(
                EntitySchema::new("Contact", "tblContact")
                    .id("ContactID")
                    .column("CompanyID", ColumnType::Integer)
                    .column("Name", ColumnType::Text)
                    .belongs_to("Company", "Company", "CompanyID", "CompanyID")
                    .has_many_through(
                        "Tags",
                        "Tag",
                        "ContactID",
                        Through {
                            entity: "ContactTag".into(),
                            source_column: "ContactID".into(),
                            target_column: "TagID".into(),
                        },
                        "TagID",
                    ),
            )
            .with(
                EntitySchema::new("ContactTag", "tblContactTag")
                    .id("ContactTagID")
                    .column("ContactID", ColumnType::Integer)
                    .column("TagID", ColumnType::Integer),
            )
            .with(
                EntitySchema::new("Tag", "tblTag")
                    .id("TagID")
                    .column("Name", ColumnType::Text),
            );
        Context::new(schemas, MemoryRepository::new())
    }

    #[test]
    fn test_leaf_becomes_intersection() {
        let context = context();
        let schema = context.schema("Company").unwrap();
        let leaf = ColumnFilter::new(
            "Contacts.Name",
            crate::filter::ColumnPredicate::Equals("Jo".to_value()),
        );
        match resolve_leaf(&context, &schema, &leaf, &HashSet::new()).unwrap() {
            Resolution::ReplacedByIntersection(intersection) => {
                assert_eq!(intersection.parent_column, "CompanyID");
                assert_eq!(intersection.child_column, "CompanyID");
                assert_eq!(intersection.role, IntersectionRole::Filter);
                assert!(!intersection.auto_hydrate);
                let moved = intersection.collection.filter_ref().unwrap();
                assert_eq!(moved.leaves()[0].column(), "Name");
                assert!(moved.leaves()[0].is_rewritten());
            }
            Resolution::Unchanged => panic!("expected an intersection"),
        }

        let plain = ColumnFilter::new("Name", crate::filter::ColumnPredicate::Equals("Jo".to_value()));
        assert!(matches!(
            resolve_leaf(&context, &schema, &plain, &HashSet::new()).unwrap(),
            Resolution::Unchanged
        ));
    }

    #[test]
    fn test_same_hop_shares_one_intersection() {
        let context = context();
        let schema = context.schema("Company").unwrap();
        let mut intersections = Vec::new();
        let remaining = expand_filter(
            &context,
            &schema,
            Filter::and(vec![
                filter!("Contacts.Name", "Jo"),
                filter!("Name", "Acme"),
                Filter::greater_than("Contacts.ContactID", 3),
            ]),
            &HashSet::new(),
            &mut intersections,
        )
        .unwrap()
        .unwrap();

        assert_eq!(remaining, Filter::and(vec![filter!("Name", "Acme")]));
        assert_eq!(intersections.len(), 1);
        assert_eq!(
            intersections[0].collection.filter_ref().unwrap().leaves().len(),
            2
        );
    }

    #[test]
    fn test_crossing_under_or_is_unsupported() {
        let context = context();
        let schema = context.schema("Company").unwrap();
        let result = expand_filter(
            &context,
            &schema,
            Filter::or(vec![filter!("Contacts.Name", "Jo"), filter!("Name", "Acme")]),
            &HashSet::new(),
            &mut Vec::new(),
        );
        assert!(matches!(result, Err(Error::Unsupported(_))));

        let mut reserved = HashSet::new();
        reserved.insert("Contacts.Name".to_string());
        let result = expand_filter(
            &context,
            &schema,
            Filter::or(vec![filter!("Contacts.Name", "Jo")]),
            &reserved,
            &mut Vec::new(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_many_to_many_expands_two_hops() {
        let context = context();
        let schema = context.schema("Contact").unwrap();
        let leaf = ColumnFilter::new(
            "Tags.Name",
            crate::filter::ColumnPredicate::Equals("vip".to_value()),
        );
        let Resolution::ReplacedByIntersection(link) =
            resolve_leaf(&context, &schema, &leaf, &HashSet::new()).unwrap()
        else {
            panic!("expected an intersection");
        };
        assert_eq!(link.collection.entity(), "ContactTag");
        assert_eq!(link.parent_column, "ContactID");
        assert_eq!(link.child_column, "ContactID");
        let target = &link.collection.intersections[0];
        assert_eq!(target.collection.entity(), "Tag");
        assert_eq!(target.parent_column, "TagID");
        assert_eq!(target.child_column, "TagID");
    }

    #[test]
    fn test_pull_path_for_aggregates() {
        let context = context();
        let schema = context.schema("Company").unwrap();
        let intersection = pull_path(&context, &schema, "Contacts.Tags.Name")
            .unwrap()
            .unwrap();
        assert_eq!(intersection.pull_up[0].column, "Tags.Name");
        assert_eq!(intersection.pull_up[0].alias, "Contacts.Tags.Name");
        assert_eq!(intersection.kind, crate::sql::JoinKind::Left);
        let nested = &intersection.collection.intersections[0];
        assert_eq!(nested.pull_up[0].alias, "Tags.Name");
        assert!(pull_path(&context, &schema, "Name").unwrap().is_none());
    }
}
