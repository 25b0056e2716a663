pub mod column;
pub mod format;

use std::sync::Arc;

use crate::snapshot::{NodeId, SnapshotSet};

pub use self::column::{Column, ColumnSet, Part, Stat};
pub use self::format::Format;

/// One formatted row, identity first.
pub type DisplayRow = Vec<String>;

/// Header plus rows handed to a renderer each tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<DisplayRow>,
}

/// Projects node state into rows sorted by node identity (byte order).
///
/// Missing metrics render from the zero snapshot, so every node yields a full
/// row. Pure: the same input always produces the same output.
pub fn project(columns: &ColumnSet, state: &[(NodeId, Arc<SnapshotSet>)]) -> Vec<DisplayRow> {
    let mut ordered: Vec<&(NodeId, Arc<SnapshotSet>)> = state.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    ordered
        .into_iter()
        .map(|(id, set)| project_row(columns, id, set))
        .collect()
}

/// Builds the header row and the sorted rows together.
pub fn table(columns: &ColumnSet, state: &[(NodeId, Arc<SnapshotSet>)]) -> Table {
    Table {
        headers: columns.headers(),
        rows: project(columns, state),
    }
}

fn project_row(columns: &ColumnSet, id: &NodeId, set: &SnapshotSet) -> DisplayRow {
    let mut row = Vec::with_capacity(columns.width());
    row.push(id.to_string());

    for column in &columns.columns {
        let cell = column
            .parts
            .iter()
            .map(|part| part.render(set.stat(&part.metric)))
            .collect::<Vec<_>>()
            .join(&column.separator);
        row.push(cell);
    }

    row
}
