use crate::sql::Renderer;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Whether a condition applies before aggregation (WHERE) or after it (HAVING).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Where,
    Having,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Param(String),
    Aggregate {
        function: &'static str,
        argument: Box<Operand>,
        distinct: bool,
    },
    List(Vec<Operand>),
    Raw(String),
}

impl Operand {
    pub fn render(&self, r: &mut Renderer<'_>) -> String {
        match self {
            Operand::Column(column) => r.column(column),
            Operand::Param(name) => r.param(name),
            Operand::Aggregate {
                function,
                argument,
                distinct,
            } => format!(
                "{}({}{})",
                function,
                if *distinct { "DISTINCT " } else { "" },
                argument.render(r)
            ),
            Operand::List(items) => {
                let items: Vec<String> = items.iter().map(|item| item.render(r)).collect();
                format!("({})", items.join(", "))
            }
            Operand::Raw(sql) => sql.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::In => "IN",
        }
    }
}

/// Piece of a literal condition: raw text or an operand rendered in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Sql(String),
    Operand(Operand),
}

impl Fragment {
    pub fn sql(text: impl Into<String>) -> Self {
        Fragment::Sql(text.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
        stage: Stage,
    },
    Literal {
        fragments: Vec<Fragment>,
        stage: Stage,
    },
    Group(Box<SqlExpr>),
}

impl SqlExpr {
    pub fn compare(left: Operand, op: CompareOp, right: Operand, stage: Stage) -> Self {
        SqlExpr::Compare {
            left,
            op,
            right,
            stage,
        }
    }

    pub fn literal(fragments: Vec<Fragment>, stage: Stage) -> Self {
        SqlExpr::Literal { fragments, stage }
    }

    /// `Having` when any node in the tree is.
    pub fn stage(&self) -> Stage {
        let having = match self {
            SqlExpr::And(children) | SqlExpr::Or(children) => {
                children.iter().any(|c| c.stage() == Stage::Having)
            }
            SqlExpr::Not(child) | SqlExpr::Group(child) => child.stage() == Stage::Having,
            SqlExpr::Compare { stage, .. } | SqlExpr::Literal { stage, .. } => {
                *stage == Stage::Having
            }
        };
        if having { Stage::Having } else { Stage::Where }
    }

    /// AND-compose, promoting a single expression into an `And`.
    pub fn and(self, other: SqlExpr) -> Self {
        match self {
            SqlExpr::And(mut children) => {
                children.push(other);
                SqlExpr::And(children)
            }
            single => SqlExpr::And(vec![single, other]),
        }
    }

    /// Splits into the WHERE part and the HAVING part. `And` distributes its
    /// children; any other node moves whole to HAVING if it touches an aggregate.
    pub fn split(self) -> (Option<SqlExpr>, Option<SqlExpr>) {
        match self {
            SqlExpr::And(children) => {
                let mut before = Vec::new();
                let mut after = Vec::new();
                for child in children {
                    let (w, h) = child.split();
                    before.extend(w);
                    after.extend(h);
                }
                (collapse(before), collapse(after))
            }
            other => match other.stage() {
                Stage::Where => (Some(other), None),
                Stage::Having => (None, Some(other)),
            },
        }
    }

    pub fn render(&self, r: &mut Renderer<'_>) -> String {
        match self {
            SqlExpr::And(children) => join(children, " AND ", r, true),
            SqlExpr::Or(children) => join(children, " OR ", r, false),
            SqlExpr::Not(child) => {
                let inner = child.render(r);
                r.dialect().negate(&inner)
            }
            SqlExpr::Compare {
                left, op, right, ..
            } => format!("{} {} {}", left.render(r), op.as_sql(), right.render(r)),
            SqlExpr::Literal { fragments, .. } => fragments
                .iter()
                .map(|fragment| match fragment {
                    Fragment::Sql(text) => text.clone(),
                    Fragment::Operand(operand) => operand.render(r),
                })
                .collect(),
            SqlExpr::Group(child) => format!("({})", child.render(r)),
        }
    }
}

fn collapse(mut parts: Vec<SqlExpr>) -> Option<SqlExpr> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(SqlExpr::And(parts)),
    }
}

fn join(children: &[SqlExpr], separator: &str, r: &mut Renderer<'_>, empty: bool) -> String {
    match children.len() {
        0 => r.dialect().boolean(empty),
        1 => children[0].render(r),
        _ => {
            let parts: Vec<String> = children.iter().map(|c| c.render(r)).collect();
            format!("({})", parts.join(separator))
        }
    }
}
