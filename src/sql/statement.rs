use crate::{
    collection::SortDirection,
    sql::{ColumnRef, Dialect, Operand, Params, Renderer, SqlExpr},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    /// Rendered as `parent IN (SELECT child ...)`; never multiplies rows.
    Semi,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub operand: Operand,
    pub alias: Option<String>,
}

/// A nested statement correlated with its parent on `parent = alias.child_column`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub statement: Statement,
    pub kind: JoinKind,
    pub parent: ColumnRef,
    pub child_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub table: String,
    pub alias: String,
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<Join>,
    pub filter: Option<SqlExpr>,
    pub group_by: Vec<Operand>,
    pub sorts: Vec<(Operand, SortDirection)>,
    /// `(offset, count)`
    pub limit: Option<(usize, usize)>,
    pub distinct: bool,
}

impl Statement {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            distinct: false,
        }
    }

    pub fn column_ref(&self, column: &str) -> ColumnRef {
        ColumnRef::new(self.alias.clone(), column)
    }

    pub fn select(&mut self, operand: Operand, alias: Option<String>) {
        self.columns.push(SelectColumn { operand, alias });
    }

    /// A second condition promotes the tree to `And`.
    pub fn add_filter(&mut self, expr: SqlExpr) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
    }

    pub fn add_join(&mut self, join: Join) {
        self.joins.push(join);
    }

    pub fn render_select(&self, dialect: &dyn Dialect, params: &Params) -> (String, Vec<Value>) {
        let mut r = Renderer::new(dialect, params);
        let sql = self.write_select(&mut r);
        (sql, r.finish())
    }

    /// `UPDATE table SET ... WHERE id IN (SELECT alias.id FROM ...)`. The
    /// assignments pair a column with the name of a parameter in `params`.
    pub fn render_update(
        &self,
        dialect: &dyn Dialect,
        params: &Params,
        id_column: &str,
        assignments: &[(String, String)],
    ) -> (String, Vec<Value>) {
        let mut r = Renderer::new(dialect, params);
        let sets: Vec<String> = assignments
            .iter()
            .map(|(column, param)| format!("{} = {}", r.quote(column), r.param(param)))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", r.quote(&self.table), sets.join(", "));
        sql.push_str(&self.write_id_scope(&mut r, id_column));
        (sql, r.finish())
    }

    pub fn render_delete(
        &self,
        dialect: &dyn Dialect,
        params: &Params,
        id_column: &str,
    ) -> (String, Vec<Value>) {
        let mut r = Renderer::new(dialect, params);
        let mut sql = format!("DELETE FROM {}", r.quote(&self.table));
        sql.push_str(&self.write_id_scope(&mut r, id_column));
        (sql, r.finish())
    }

    fn write_id_scope(&self, r: &mut Renderer<'_>, id_column: &str) -> String {
        if self.filter.is_none() && self.joins.is_empty() {
            return String::new();
        }
        let mut scope = self.clone();
        scope.columns = vec![SelectColumn {
            operand: Operand::Column(self.column_ref(id_column)),
            alias: None,
        }];
        scope.sorts.clear();
        scope.limit = None;
        scope.distinct = false;
        format!(" WHERE {} IN ({})", r.quote(id_column), scope.write_select(r))
    }

    pub(crate) fn write_select(&self, r: &mut Renderer<'_>) -> String {
        let columns: Vec<String> = if self.columns.is_empty() {
            vec![format!("{}.*", r.quote(&self.alias))]
        } else {
            self.columns
                .iter()
                .map(|column| match &column.alias {
                    Some(alias) => format!("{} AS {}", column.operand.render(r), r.quote(alias)),
                    None => column.operand.render(r),
                })
                .collect()
        };

        let mut sql = format!(
            "SELECT {}{} FROM {} AS {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            r.quote(&self.table),
            r.quote(&self.alias)
        );

        let (where_part, having_part) = match self.filter.clone() {
            Some(filter) => filter.split(),
            None => (None, None),
        };

        let mut conditions = Vec::new();
        for join in &self.joins {
            sql.push_str(&write_join(join, r, &mut conditions));
        }
        if let Some(expr) = where_part {
            conditions.push(expr.render(r));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.group_by.is_empty() {
            let groups: Vec<String> = self.group_by.iter().map(|g| g.render(r)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }
        if let Some(expr) = having_part {
            sql.push_str(" HAVING ");
            sql.push_str(&expr.render(r));
        }
        if !self.sorts.is_empty() {
            let sorts: Vec<String> = self
                .sorts
                .iter()
                .map(|(operand, direction)| {
                    format!(
                        "{} {}",
                        operand.render(r),
                        match direction {
                            SortDirection::Ascending => "ASC",
                            SortDirection::Descending => "DESC",
                        }
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&sorts.join(", "));
        }
        if let Some((offset, count)) = self.limit {
            sql.push(' ');
            sql.push_str(&r.dialect().limit(offset, count));
        }
        sql
    }
}

// Inner and left joins are flattened into the parent FROM clause; their
// conditions go to the ON clause (left) or the parent WHERE (inner). Semi
// joins become an IN condition on the parent.
fn write_join(join: &Join, r: &mut Renderer<'_>, parent_conditions: &mut Vec<String>) -> String {
    let child = &join.statement;
    let child_key = r.column(&child.column_ref(&join.child_column));

    if join.kind == JoinKind::Semi {
        let mut scope = child.clone();
        scope.columns = vec![SelectColumn {
            operand: Operand::Column(child.column_ref(&join.child_column)),
            alias: None,
        }];
        let subquery = scope.write_select(r);
        parent_conditions.push(format!("{} IN ({})", r.column(&join.parent), subquery));
        return String::new();
    }

    let mut on = vec![format!("{} = {}", r.column(&join.parent), child_key)];
    let mut own_conditions = Vec::new();
    let mut nested = String::new();
    for inner in &child.joins {
        nested.push_str(&write_join(inner, r, &mut own_conditions));
    }
    if let Some(filter) = &child.filter {
        own_conditions.push(filter.render(r));
    }

    let keyword = match join.kind {
        JoinKind::Left => {
            on.append(&mut own_conditions);
            "LEFT JOIN"
        }
        _ => {
            parent_conditions.append(&mut own_conditions);
            "INNER JOIN"
        }
    };

    format!(
        " {} {} AS {} ON {}{}",
        keyword,
        r.quote(&child.table),
        r.quote(&child.alias),
        on.join(" AND "),
        nested
    )
}
